//! Directory convention for test categories
//!
//! Tests without an explicit category marker take the category of the
//! directory they live in (`tests/unit/...` is a unit test). The mapping is
//! configurable through the `[layout]` section of `tally.toml`.

use crate::Category;
use serde::{Deserialize, Serialize};

/// Ordered mapping from directory prefixes to categories.
///
/// The first matching prefix wins. Paths are compared with `/` separators
/// and a prefix matches at the start of the path or after any `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLayout {
    /// `(directory, category)` pairs, most specific first
    pub directories: Vec<(String, Category)>,
    /// Category used when no directory matches
    pub fallback: Category,
}

impl Default for CategoryLayout {
    fn default() -> Self {
        CategoryLayout {
            directories: vec![
                ("tests/unit".to_string(), Category::Unit),
                ("tests/integration".to_string(), Category::Integration),
                ("tests/behavior".to_string(), Category::Behavior),
                ("tests/performance".to_string(), Category::Performance),
                ("tests/property".to_string(), Category::Property),
            ],
            fallback: Category::Unit,
        }
    }
}

impl CategoryLayout {
    /// Category implied by the path's directory, if any prefix matches
    pub fn infer(&self, path: &str) -> Option<Category> {
        let normalized = path.replace('\\', "/");
        self.directories.iter().find_map(|(dir, category)| {
            let dir = dir.trim_end_matches('/');
            let prefixed = format!("{}/", dir);
            let nested = format!("/{}/", dir);
            if normalized.starts_with(&prefixed) || normalized.contains(&nested) {
                Some(*category)
            } else {
                None
            }
        })
    }

    /// Category implied by the path, falling back to the configured default
    pub fn infer_or_fallback(&self, path: &str) -> Category {
        self.infer(path).unwrap_or(self.fallback)
    }
}
