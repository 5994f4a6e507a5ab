//! Persisted inventory snapshot file
//!
//! ```text
//! ┌────────────┬─────────────┬──────────────────┬───────────────┬──────────────┬───────────┐
//! │ Magic (8)  │ Version (2) │ Fingerprint (8)  │ Payload len(8)│ xxh3 (8)     │ Payload   │
//! └────────────┴─────────────┴──────────────────┴───────────────┴──────────────┴───────────┘
//! ```
//!
//! The payload is MessagePack. The fingerprint is the source-tree key the
//! snapshot was built for; the checksum covers the payload. Files are
//! replaced atomically (temp file, fsync, rename), so a reader sees either
//! the previous snapshot or the new one.

use crate::error::{DurabilityError, DurabilityResult};
use crate::log::write_atomic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

/// Magic bytes: "TALLYSNP"
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"TALLYSNP";

/// Current snapshot file version
pub const SNAPSHOT_FILE_VERSION: u16 = 1;

/// Header size: magic (8) + version (2) + fingerprint (8) + len (8) + checksum (8)
pub const SNAPSHOT_FILE_HEADER_SIZE: usize = 34;

/// A decoded snapshot file
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot<T> {
    /// Source-tree fingerprint recorded at write time
    pub fingerprint: u64,
    /// Decoded payload
    pub value: T,
}

/// Encode and atomically write a snapshot. Returns the file size.
pub fn write_snapshot<T: Serialize>(
    path: &Path,
    fingerprint: u64,
    value: &T,
) -> DurabilityResult<u64> {
    let payload = rmp_serde::to_vec_named(value)?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_FILE_HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_FILE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&fingerprint.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&xxh3_64(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, &bytes)?;
    debug!(
        target: "tally::durability",
        path = %path.display(),
        fingerprint = format_args!("{:016x}", fingerprint),
        bytes = bytes.len(),
        "Wrote snapshot file"
    );
    Ok(bytes.len() as u64)
}

/// Read and validate a snapshot.
///
/// `Ok(None)` when no file exists. Any structural, checksum or decoding
/// failure is reported as corruption; the caller must not use the file.
pub fn read_snapshot<T: DeserializeOwned>(
    path: &Path,
) -> DurabilityResult<Option<StoredSnapshot<T>>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let display = path.display().to_string();

    if bytes.len() < SNAPSHOT_FILE_HEADER_SIZE {
        return Err(DurabilityError::corrupt(
            display,
            format!("file too small: {} bytes", bytes.len()),
        ));
    }
    if bytes[..8] != SNAPSHOT_MAGIC {
        return Err(DurabilityError::corrupt(display, "invalid magic"));
    }
    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != SNAPSHOT_FILE_VERSION {
        return Err(DurabilityError::UnsupportedVersion {
            path: display,
            version,
        });
    }
    let fingerprint = read_u64(&bytes[10..18]);
    let len = read_u64(&bytes[18..26]);
    let stored_checksum = read_u64(&bytes[26..34]);
    let payload = &bytes[SNAPSHOT_FILE_HEADER_SIZE..];

    if payload.len() as u64 != len {
        return Err(DurabilityError::corrupt(
            display,
            format!("payload length {} != recorded {}", payload.len(), len),
        ));
    }
    let computed = xxh3_64(payload);
    if computed != stored_checksum {
        return Err(DurabilityError::corrupt(
            display,
            format!(
                "checksum mismatch: stored {:016x}, computed {:016x}",
                stored_checksum, computed
            ),
        ));
    }
    let value = rmp_serde::from_slice(payload)
        .map_err(|e| DurabilityError::corrupt(display, format!("decode failed: {}", e)))?;
    Ok(Some(StoredSnapshot { fingerprint, value }))
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
