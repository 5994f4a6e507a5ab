//! Specification parse errors

use std::io;
use thiserror::Error;

/// Errors that reject a whole specification document
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Document path
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// No `Feature:` header was found
    #[error("{path}: missing Feature header")]
    MissingFeature {
        /// Document path
        path: String,
    },

    /// A line that is not valid at this position
    #[error("{path}:{line}: unexpected line: {text}")]
    UnexpectedLine {
        /// Document path
        path: String,
        /// 1-based line number
        line: usize,
        /// Offending text (trimmed)
        text: String,
    },

    /// `Examples:` appeared outside a Scenario Outline
    #[error("{path}:{line}: Examples block outside a Scenario Outline")]
    ExamplesOutsideOutline {
        /// Document path
        path: String,
        /// 1-based line number
        line: usize,
    },

    /// An examples row does not have as many cells as the header
    #[error("{path}:{line}: malformed examples table: expected {expected} cells, found {found}")]
    MalformedExamplesTable {
        /// Document path
        path: String,
        /// 1-based line number of the offending row
        line: usize,
        /// Header cell count
        expected: usize,
        /// Row cell count
        found: usize,
    },

    /// A doc string was opened and never closed
    #[error("{path}:{line}: unterminated doc string")]
    UnterminatedDocString {
        /// Document path
        path: String,
        /// 1-based line of the opening delimiter
        line: usize,
    },
}

impl ParseError {
    /// Path of the rejected document
    pub fn path(&self) -> &str {
        match self {
            ParseError::Io { path, .. }
            | ParseError::MissingFeature { path }
            | ParseError::UnexpectedLine { path, .. }
            | ParseError::ExamplesOutsideOutline { path, .. }
            | ParseError::MalformedExamplesTable { path, .. }
            | ParseError::UnterminatedDocString { path, .. } => path,
        }
    }

    /// Offending line, when the error points at one
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::UnexpectedLine { line, .. }
            | ParseError::ExamplesOutsideOutline { line, .. }
            | ParseError::MalformedExamplesTable { line, .. }
            | ParseError::UnterminatedDocString { line, .. } => Some(*line),
            ParseError::Io { .. } | ParseError::MissingFeature { .. } => None,
        }
    }
}

impl From<ParseError> for tally_core::Error {
    fn from(e: ParseError) -> Self {
        let path = e.path().to_string();
        tally_core::Error::parse(path, e.to_string())
    }
}

/// Result type for parsing
pub type ParseResult<T> = Result<T, ParseError>;
