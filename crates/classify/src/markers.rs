//! Marker recognition
//!
//! Accepted spellings:
//!
//! ```text
//! @pytest.mark.slow            @pytest.mark.slow(reason="io")
//! @mark.slow                   (when pytest is imported)
//! @parametrize(...)            (when pytest is imported)
//! pytestmark = pytest.mark.integration
//! pytestmark = [pytest.mark.integration, pytest.mark.slow]
//! pytest.param(1, marks=pytest.mark.slow)
//! ```

use crate::expr::{is_identifier, matching_close, sequence_items};
use crate::tree::ModuleTree;
use tally_core::{Category, Speed};

/// A recognized marker application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Marker name (`slow`, `integration`, `parametrize`, ...)
    pub name: String,
    /// Text between the call parentheses, for call forms
    pub args: Option<String>,
}

impl Marker {
    /// Whether this is a `parametrize` marker
    pub fn is_parametrize(&self) -> bool {
        self.name == "parametrize"
    }
}

/// Which bare spellings the module's imports make valid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkSyntax {
    /// `pytest` is imported in some form
    pub pytest_imported: bool,
    /// `param` was imported from pytest
    pub param_imported: bool,
}

impl MarkSyntax {
    /// Derive the accepted spellings from a module's imports
    pub fn for_module(tree: &ModuleTree) -> Self {
        MarkSyntax {
            pytest_imported: tree.imports_pytest(),
            param_imported: tree.imports_from_pytest("param"),
        }
    }

    /// Recognize one marker expression
    pub fn marker(&self, expr: &str) -> Option<Marker> {
        let expr = expr.trim();
        let (head, args) = match expr.find('(') {
            Some(open) => {
                let close = matching_close(expr, open)?;
                if close != expr.len() - 1 {
                    return None;
                }
                (expr[..open].trim(), Some(expr[open + 1..close].to_string()))
            }
            None => (expr, None),
        };

        let name = if let Some(name) = head.strip_prefix("pytest.mark.") {
            name
        } else if let Some(name) = head.strip_prefix("mark.") {
            if !self.pytest_imported {
                return None;
            }
            name
        } else if head == "parametrize" && self.pytest_imported {
            head
        } else {
            return None;
        };
        is_identifier(name).then(|| Marker {
            name: name.to_string(),
            args,
        })
    }

    /// Markers in a `pytestmark` or `marks=` value: one marker or a list
    pub fn markers(&self, expr: &str) -> Vec<Marker> {
        match sequence_items(expr) {
            Some(items) => items.into_iter().filter_map(|i| self.marker(i)).collect(),
            None => self.marker(expr).into_iter().collect(),
        }
    }

    /// Whether `callee` spells `pytest.param`
    pub fn is_param_call(&self, callee: &str) -> bool {
        callee == "pytest.param" || (callee == "param" && self.param_imported)
    }
}

/// First speed marker in application order
pub fn speed_of(markers: &[Marker]) -> Option<Speed> {
    markers.iter().find_map(|m| Speed::from_marker(&m.name))
}

/// First category marker in application order
pub fn category_of(markers: &[Marker]) -> Option<Category> {
    markers.iter().find_map(|m| Category::from_marker(&m.name))
}
