//! Specification documents for Tally
//!
//! This crate turns Gherkin `.feature` files into an in-memory tree and
//! derives, for every scenario and every example row, the identifier the
//! external framework will generate for it at run time:
//! - document: Feature -> Scenario / Outline -> Example rows
//! - parser: Line-oriented parser with atomic failure per document
//! - identify: Canonical identifier generation (pytest-bdd naming)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod identify;
pub mod parser;

pub use document::{
    ExampleRow, ExamplesTable, Scenario, ScenarioKind, SpecificationDocument, Step, TableRow,
};
pub use error::{ParseError, ParseResult};
pub use identify::{expand, identify, identify_all, python_name, ExpandedCase, IdentifierScheme};
pub use parser::{parse, parse_dir, parse_str, ParsedTree};
