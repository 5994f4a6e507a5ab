//! Static test classification for Tally
//!
//! Reads test sources without executing them and attaches a category,
//! a speed and a complexity estimate to every case they define:
//! - source / tree: Python logical lines and block structure
//! - markers / parametrize: Marker recognition and parametrized expansion
//! - classifier: Marker resolution for Python test files
//! - feature: Tag resolution for specification documents
//! - query: Counting and selection over classified cases

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod complexity;
pub mod expr;
pub mod feature;
pub mod markers;
pub mod parametrize;
pub mod query;
pub mod source;
pub mod tree;

pub use classifier::{classify, CaseInfo, FileClassification};
pub use complexity::{complexity, ComplexityInputs};
pub use feature::classify_document;
pub use markers::{MarkSyntax, Marker};
pub use query::{counts_by_category, counts_by_speed, select, Selection};
