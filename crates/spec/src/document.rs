//! In-memory specification tree
//!
//! ```text
//! SpecificationDocument
//! ├── background: Option<Vec<Step>>
//! └── scenarios
//!     ├── Scenario                      -> 1 test case
//!     └── Scenario Outline
//!         └── Examples tables (rows)    -> 1 test case per row
//! ```
//!
//! Documents are immutable once parsed.

use serde::{Deserialize, Serialize};

/// A Given/When/Then step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// `Given`, `When`, `Then`, `And`, `But` or `*`
    pub keyword: String,
    /// Step text after the keyword
    pub text: String,
    /// 1-based line number
    pub line: usize,
}

/// One data row of an examples table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Cell values in column order
    pub cells: Vec<String>,
    /// 1-based line number
    pub line: usize,
}

/// An `Examples:` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplesTable {
    /// Tags placed on the examples block
    pub tags: Vec<String>,
    /// Column names
    pub header: Vec<String>,
    /// Data rows
    pub rows: Vec<TableRow>,
    /// 1-based line of the `Examples:` keyword
    pub line: usize,
}

/// Scenario flavour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// Plain scenario
    Scenario,
    /// Parametrized template with examples tables
    Outline {
        /// Examples blocks in document order
        examples: Vec<ExamplesTable>,
    },
}

/// A `Scenario:` or `Scenario Outline:` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name as written
    pub name: String,
    /// Tags placed directly on the scenario (without `@`)
    pub tags: Vec<String>,
    /// Steps in order
    pub steps: Vec<Step>,
    /// 1-based line of the scenario keyword
    pub line: usize,
    /// Plain scenario or outline
    pub kind: ScenarioKind,
}

/// An example row bound to its column values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleRow {
    /// 0-based position among all rows of the outline
    pub index: usize,
    /// `(column, value)` pairs in column order
    pub values: Vec<(String, String)>,
    /// Steps with `<placeholder>`s substituted
    pub steps: Vec<Step>,
    /// Tags of the examples block the row came from
    pub tags: Vec<String>,
    /// 1-based line of the row
    pub line: usize,
}

impl Scenario {
    /// Whether this is an outline
    pub fn is_outline(&self) -> bool {
        matches!(self.kind, ScenarioKind::Outline { .. })
    }

    /// Total data rows across all examples tables (0 for plain scenarios)
    pub fn row_count(&self) -> usize {
        match &self.kind {
            ScenarioKind::Scenario => 0,
            ScenarioKind::Outline { examples } => examples.iter().map(|t| t.rows.len()).sum(),
        }
    }

    /// Number of runnable test cases this node expands to.
    ///
    /// An outline without rows is still collected once.
    pub fn case_count(&self) -> usize {
        match self.row_count() {
            0 => 1,
            n => n,
        }
    }

    /// Expand every examples row, substituting placeholders in step text.
    ///
    /// Substitution is for readability only; identity comes from
    /// [`crate::identify`].
    pub fn example_rows(&self) -> Vec<ExampleRow> {
        let ScenarioKind::Outline { examples } = &self.kind else {
            return Vec::new();
        };
        let mut rows = Vec::with_capacity(self.row_count());
        for table in examples {
            for row in &table.rows {
                let values: Vec<(String, String)> = table
                    .header
                    .iter()
                    .cloned()
                    .zip(row.cells.iter().cloned())
                    .collect();
                let steps = self
                    .steps
                    .iter()
                    .map(|step| Step {
                        keyword: step.keyword.clone(),
                        text: substitute(&step.text, &values),
                        line: step.line,
                    })
                    .collect();
                rows.push(ExampleRow {
                    index: rows.len(),
                    values,
                    steps,
                    tags: table.tags.clone(),
                    line: row.line,
                });
            }
        }
        rows
    }
}

fn substitute(text: &str, values: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (column, value) in values {
        out = out.replace(&format!("<{}>", column), value);
    }
    out
}

/// A parsed `.feature` document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationDocument {
    /// Path as discovered (relative to the inventory root)
    pub path: String,
    /// Feature name
    pub feature: String,
    /// Tags on the feature (without `@`)
    pub tags: Vec<String>,
    /// Background steps, if a Background block exists
    pub background: Option<Vec<Step>>,
    /// Scenarios and outlines in document order
    pub scenarios: Vec<Scenario>,
}

impl SpecificationDocument {
    /// Number of plain scenarios
    pub fn scenario_count(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.is_outline()).count()
    }

    /// Number of runnable test cases the document expands to
    pub fn case_count(&self) -> usize {
        self.scenarios.iter().map(Scenario::case_count).sum()
    }
}
