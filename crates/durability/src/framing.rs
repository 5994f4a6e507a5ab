//! Record framing
//!
//! ```text
//! ┌─────────────────┬──────────────────────┬──────────┐
//! │ Length (4, LE)  │ Payload (Length)     │ CRC32 (4)│
//! └─────────────────┴──────────────────────┴──────────┘
//! ```
//!
//! Decoding stops at the first frame that is incomplete or fails its CRC.
//! Everything before that point is intact; everything after it is a torn
//! tail from an interrupted append.

/// Bytes added around every payload
pub const FRAME_OVERHEAD: usize = 8;

/// Frame a payload
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame
}

/// Intact frames at the start of a buffer
#[derive(Debug, Default)]
pub struct Frames<'a> {
    /// Payloads in order
    pub payloads: Vec<&'a [u8]>,
    /// Bytes covered by intact frames
    pub valid_len: usize,
}

impl Frames<'_> {
    /// Whether bytes follow the last intact frame
    pub fn is_torn(&self, total_len: usize) -> bool {
        self.valid_len < total_len
    }
}

/// Decode every intact frame
pub fn decode_all(bytes: &[u8]) -> Frames<'_> {
    let mut frames = Frames::default();
    let mut cursor = 0;
    while let Some((payload, consumed)) = decode_one(&bytes[cursor..]) {
        frames.payloads.push(payload);
        cursor += consumed;
    }
    frames.valid_len = cursor;
    frames
}

fn decode_one(bytes: &[u8]) -> Option<(&[u8], usize)> {
    let len_bytes: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let end = 4usize.checked_add(len)?;
    let payload = bytes.get(4..end)?;
    let crc_bytes: [u8; 4] = bytes.get(end..end + 4)?.try_into().ok()?;
    if crc32fast::hash(payload) != u32::from_le_bytes(crc_bytes) {
        return None;
    }
    Some((payload, end + 4))
}
