//! Core identifier and metadata types
//!
//! A [`TestCaseId`] is the join key for every other record in the system:
//! classifications, history, risk scores and execution results are all keyed
//! by it. Its string form matches the node id the external framework prints,
//! so static and dynamic inventories can be compared directly.

use crate::limits::MAX_FILE_STEM_LEN;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the components of a node id (`path::Class::test`).
pub const NODE_SEPARATOR: &str = "::";

// ============================================================================
// TestCaseId
// ============================================================================

/// Stable identifier of one runnable test case.
///
/// Composed of the originating file path, the test or scenario name and an
/// optional parameter suffix, e.g. `tests/behavior/login.feature::test_login[0]`.
/// Identical inputs always produce identical identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCaseId(String);

impl TestCaseId {
    /// Wrap an already-composed node id
    pub fn new(id: impl Into<String>) -> Self {
        TestCaseId(id.into())
    }

    /// Compose `path::segment::segment...`
    pub fn from_parts<'a>(path: &str, segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut id = path.to_string();
        for segment in segments {
            id.push_str(NODE_SEPARATOR);
            id.push_str(segment);
        }
        TestCaseId(id)
    }

    /// Borrow the node id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The originating file path (everything before the first `::`)
    pub fn source_path(&self) -> &str {
        self.0.split(NODE_SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Parameter id inside trailing brackets, if any (`test_x[3]` -> `3`)
    pub fn param_id(&self) -> Option<&str> {
        let last = self.0.rsplit(NODE_SEPARATOR).next()?;
        let open = last.find('[')?;
        last.strip_suffix(']').map(|s| &s[open + 1..])
    }

    /// A filesystem-safe stem of bounded length.
    ///
    /// Characters outside `[A-Za-z0-9._-]` become `_`. Stems longer than
    /// [`MAX_FILE_STEM_LEN`] are truncated and suffixed with the xxh3 hash of
    /// the full identifier so distinct ids never collide.
    pub fn file_stem(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.len() <= MAX_FILE_STEM_LEN {
            return sanitized;
        }
        let hash = xxhash_rust::xxh3::xxh3_64(self.0.as_bytes());
        let keep = MAX_FILE_STEM_LEN - 17;
        format!("{}-{:016x}", &sanitized[..keep], hash)
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestCaseId {
    fn from(s: &str) -> Self {
        TestCaseId::new(s)
    }
}

impl From<String> for TestCaseId {
    fn from(s: String) -> Self {
        TestCaseId(s)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Test category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Isolated unit tests
    Unit,
    /// Tests spanning several components
    Integration,
    /// Scenarios expanded from specification documents
    Behavior,
    /// Benchmarks and load tests
    Performance,
    /// Property-based tests
    Property,
}

impl Category {
    /// All categories in report order
    pub const ALL: [Category; 5] = [
        Category::Unit,
        Category::Integration,
        Category::Behavior,
        Category::Performance,
        Category::Property,
    ];

    /// Marker / directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unit => "unit",
            Category::Integration => "integration",
            Category::Behavior => "behavior",
            Category::Performance => "performance",
            Category::Property => "property",
        }
    }

    /// Map a marker name to a category, if it names one
    pub fn from_marker(name: &str) -> Option<Self> {
        match name {
            "unit" => Some(Category::Unit),
            "integration" => Some(Category::Integration),
            "behavior" | "behaviour" | "bdd" => Some(Category::Behavior),
            "performance" | "benchmark" => Some(Category::Performance),
            "property" => Some(Category::Property),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_marker(s).ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Speed marker
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// `@fast`
    Fast,
    /// `@medium`
    Medium,
    /// `@slow`
    Slow,
    /// No speed marker found
    #[default]
    Unmarked,
}

impl Speed {
    /// All speeds in report order
    pub const ALL: [Speed; 4] = [Speed::Fast, Speed::Medium, Speed::Slow, Speed::Unmarked];

    /// Marker name
    pub fn as_str(&self) -> &'static str {
        match self {
            Speed::Fast => "fast",
            Speed::Medium => "medium",
            Speed::Slow => "slow",
            Speed::Unmarked => "unmarked",
        }
    }

    /// Map a marker name to a speed. `unmarked` is never a marker.
    pub fn from_marker(name: &str) -> Option<Self> {
        match name {
            "fast" => Some(Speed::Fast),
            "medium" => Some(Speed::Medium),
            "slow" => Some(Speed::Slow),
            _ => None,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category and speed attached to a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    /// Test category
    pub category: Category,
    /// Speed marker
    pub speed: Speed,
}

impl Classification {
    /// Create a classification
    pub fn new(category: Category, speed: Speed) -> Self {
        Classification { category, speed }
    }
}

// ============================================================================
// History
// ============================================================================

/// Outcome of one execution of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Test passed
    Pass,
    /// Assertion failure
    Fail,
    /// Error outside the assertion (fixture, collection, crash)
    Error,
    /// The batch containing the test exceeded its deadline
    Timeout,
}

impl Outcome {
    /// Whether this outcome counts against the test in risk scoring
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Pass)
    }
}

/// One entry of a test's execution history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// What happened
    pub outcome: Outcome,
    /// Wall time attributed to the test
    pub duration_ms: u64,
    /// When the execution finished
    pub at: Timestamp,
}

impl HistoryEntry {
    /// Create an entry stamped now
    pub fn now(outcome: Outcome, duration_ms: u64) -> Self {
        HistoryEntry {
            outcome,
            duration_ms,
            at: Timestamp::now(),
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Class of a non-fatal finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Test source had syntax errors; classification is partial
    UnparsableFile,
    /// Part of a file could not be classified statically
    ClassificationWarning,
    /// Specification document was rejected as a whole
    ParseError,
    /// Source files exist but no test case was found
    EmptyInventory,
    /// A persisted snapshot was rejected and rebuilt
    CacheCorruption,
}

/// A non-fatal finding attached to an inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Finding class
    pub kind: DiagnosticKind,
    /// File the finding is about
    pub path: String,
    /// 1-based line, when known
    pub line: Option<usize>,
    /// Description
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic
    pub fn new(
        kind: DiagnosticKind,
        path: impl Into<String>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_composes_node_id() {
        let id = TestCaseId::from_parts("tests/unit/test_a.py", ["TestA", "test_x"]);
        assert_eq!(id.as_str(), "tests/unit/test_a.py::TestA::test_x");
        assert_eq!(id.source_path(), "tests/unit/test_a.py");
    }

    #[test]
    fn test_param_id() {
        let id = TestCaseId::new("f.feature::test_login[2]");
        assert_eq!(id.param_id(), Some("2"));
        assert_eq!(TestCaseId::new("a.py::test_b").param_id(), None);
    }

    #[test]
    fn test_file_stem_short_ids_are_sanitized() {
        let id = TestCaseId::new("tests/a.py::test_b[x y]");
        assert_eq!(id.file_stem(), "tests_a.py__test_b_x_y_");
    }

    #[test]
    fn test_file_stem_long_ids_are_bounded_and_distinct() {
        let long_a = TestCaseId::new(format!("f.feature::test_{}[0]", "a".repeat(400)));
        let long_b = TestCaseId::new(format!("f.feature::test_{}[1]", "a".repeat(400)));
        let a = long_a.file_stem();
        let b = long_b.file_stem();
        assert_eq!(a.len(), MAX_FILE_STEM_LEN);
        assert_eq!(b.len(), MAX_FILE_STEM_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_category_markers() {
        assert_eq!(Category::from_marker("integration"), Some(Category::Integration));
        assert_eq!(Category::from_marker("slow"), None);
        assert_eq!("property".parse::<Category>(), Ok(Category::Property));
    }

    #[test]
    fn test_speed_markers() {
        assert_eq!(Speed::from_marker("slow"), Some(Speed::Slow));
        assert_eq!(Speed::from_marker("unmarked"), None);
        assert_eq!(Speed::default(), Speed::Unmarked);
    }

    #[test]
    fn test_outcome_failure_classes() {
        assert!(!Outcome::Pass.is_failure());
        assert!(Outcome::Fail.is_failure());
        assert!(Outcome::Error.is_failure());
        assert!(Outcome::Timeout.is_failure());
    }

    #[test]
    fn test_serde_names_are_stable() {
        let c = Classification::new(Category::Behavior, Speed::Fast);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"category":"behavior","speed":"fast"}"#);
        let id = TestCaseId::new("a.py::test_b");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""a.py::test_b""#);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn file_stem_is_bounded_and_safe(raw in "\\PC{0,300}") {
                let stem = TestCaseId::new(raw).file_stem();
                prop_assert!(stem.len() <= MAX_FILE_STEM_LEN);
                prop_assert!(stem
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
            }

            #[test]
            fn long_ids_keep_distinct_stems(suffix_a in 0u32..1000, suffix_b in 0u32..1000) {
                prop_assume!(suffix_a != suffix_b);
                let base = "tests/behavior/checkout.feature::test_".to_string() + &"x".repeat(200);
                let a = TestCaseId::new(format!("{}[{}]", base, suffix_a));
                let b = TestCaseId::new(format!("{}[{}]", base, suffix_b));
                prop_assert_ne!(a.file_stem(), b.file_stem());
            }
        }
    }
}
