//! Python test source classification
//!
//! Collection follows the framework's defaults: module-level functions named
//! `test*`, and `test*` methods of `Test*` classes that define no
//! `__init__`, nested classes included.
//!
//! Marker resolution, most specific first:
//!
//! ```text
//! pytest.param(..., marks=...)   per parametrized case
//! function decorators
//! class decorators / class pytestmark, innermost class first
//! module pytestmark
//! ```
//!
//! The first level that carries a speed marker decides the speed, the first
//! level that carries a category marker decides the category. Without a
//! category marker the directory layout decides.

use crate::complexity::{complexity, ComplexityInputs};
use crate::markers::{category_of, speed_of, MarkSyntax, Marker};
use crate::parametrize::{self, Expansion};
use crate::source::logical_lines;
use crate::tree::{self, ClassDef, Decorator, FunctionDef, ModuleTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::{CategoryLayout, Classification, Diagnostic, DiagnosticKind, Speed, TestCaseId};
use tracing::{debug, warn};

/// Per-case classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInfo {
    /// Category and speed
    pub classification: Classification,
    /// Structural complexity in `[0, 1]`
    pub complexity: f64,
    /// 1-based line of the test definition
    pub line: usize,
    /// Every marker name that applies, most specific first
    pub markers: Vec<String>,
}

/// Classification of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileClassification {
    /// Path relative to the inventory root
    pub path: String,
    /// Cases found in the file
    pub cases: BTreeMap<TestCaseId, CaseInfo>,
    /// Imported modules, in first-seen order
    pub imports: Vec<String>,
    /// Non-fatal findings
    pub diagnostics: Vec<Diagnostic>,
}

impl FileClassification {
    /// Empty result for `path`
    pub fn empty(path: impl Into<String>) -> Self {
        FileClassification {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Classification of every case
    pub fn classifications(&self) -> impl Iterator<Item = (&TestCaseId, &Classification)> {
        self.cases.iter().map(|(id, info)| (id, &info.classification))
    }
}

/// Classify a Python test file.
///
/// Syntax errors never fail the call: whatever precedes the error is
/// classified and an [`DiagnosticKind::UnparsableFile`] diagnostic is
/// attached.
pub fn classify(path: &str, source: &str, layout: &CategoryLayout) -> FileClassification {
    let scan = logical_lines(source);
    let module = tree::build(&scan.lines);
    let mut result = FileClassification::empty(path);

    if let Some(issue) = &scan.issue {
        warn!(
            target: "tally::classify",
            path,
            line = issue.line,
            reason = %issue.message,
            "Partial classification of unparsable file"
        );
        result.diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnparsableFile,
            path,
            Some(issue.line),
            issue.message.clone(),
        ));
    }

    for import in &module.imports {
        if !result.imports.contains(&import.module) {
            result.imports.push(import.module.clone());
        }
    }

    let mut walker = Walker {
        path,
        layout,
        syntax: MarkSyntax::for_module(&module),
        result,
    };
    walker.module(&module);
    let result = walker.result;

    debug!(
        target: "tally::classify",
        path,
        cases = result.cases.len(),
        imports = result.imports.len(),
        "Classified source file"
    );
    result
}

/// Markers contributed by one scope
struct Scope {
    markers: Vec<Marker>,
}

struct Walker<'a> {
    path: &'a str,
    layout: &'a CategoryLayout,
    syntax: MarkSyntax,
    result: FileClassification,
}

impl<'a> Walker<'a> {
    fn module(&mut self, module: &ModuleTree) {
        let module_scope = Scope {
            markers: module
                .pytestmark
                .as_deref()
                .map(|expr| self.syntax.markers(expr))
                .unwrap_or_default(),
        };
        let mut scopes = vec![module_scope];
        for function in &module.functions {
            if is_test_function(&function.name) {
                self.function(function, &[], &scopes);
            }
        }
        for class in &module.classes {
            self.class(class, &mut Vec::new(), &mut scopes);
        }
    }

    fn class(&mut self, class: &ClassDef, names: &mut Vec<String>, scopes: &mut Vec<Scope>) {
        if !class.name.starts_with("Test") || class.has_init {
            return;
        }
        let mut markers = self.decorator_markers(&class.decorators);
        if let Some(expr) = &class.pytestmark {
            markers.extend(self.syntax.markers(expr));
        }
        names.push(class.name.clone());
        scopes.push(Scope { markers });

        for function in &class.functions {
            if is_test_function(&function.name) {
                self.function(function, names, scopes);
            }
        }
        for nested in &class.classes {
            self.class(nested, names, scopes);
        }

        scopes.pop();
        names.pop();
    }

    fn function(&mut self, function: &FunctionDef, classes: &[String], scopes: &[Scope]) {
        let own = self.decorator_markers(&function.decorators);

        // Most specific scope first: function, innermost class, ..., module.
        let mut levels: Vec<&[Marker]> = Vec::with_capacity(scopes.len() + 1);
        levels.push(&own);
        levels.extend(scopes.iter().rev().map(|s| s.markers.as_slice()));

        let layers: Vec<&Marker> = levels
            .iter()
            .flat_map(|markers| parametrize_layers(markers))
            .collect();
        let parametrize_names: Vec<&str> = layers
            .iter()
            .filter_map(|m| m.args.as_deref())
            .collect();

        let inputs = ComplexityInputs {
            lines: function.line_span(),
            asserts: function.asserts,
            fixtures: fixture_count(&function.params, &parametrize_names),
            parametrize: layers.len(),
        };
        let score = complexity(inputs);

        let mut segments: Vec<&str> = classes.iter().map(String::as_str).collect();
        segments.push(&function.name);

        let cases = match parametrize::expand(&layers, &self.syntax) {
            Expansion::None => vec![(None, Vec::new())],
            Expansion::Cases(cases) => cases.into_iter().map(|c| (Some(c.id), c.marks)).collect(),
            Expansion::Unresolved(reason) => {
                self.result.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ClassificationWarning,
                    self.path,
                    Some(function.line),
                    format!("{}: {}", function.name, reason),
                ));
                vec![(None, Vec::new())]
            }
        };

        for (param_id, param_marks) in cases {
            let mut case_levels: Vec<&[Marker]> = Vec::with_capacity(levels.len() + 1);
            case_levels.push(&param_marks);
            case_levels.extend(levels.iter().copied());

            let speed = case_levels
                .iter()
                .find_map(|markers| speed_of(markers))
                .unwrap_or(Speed::Unmarked);
            let category = case_levels
                .iter()
                .find_map(|markers| category_of(markers))
                .unwrap_or_else(|| self.layout.infer_or_fallback(self.path));

            let mut markers: Vec<String> = Vec::new();
            for marker in case_levels.iter().flat_map(|m| m.iter()) {
                if !marker.is_parametrize() && !markers.contains(&marker.name) {
                    markers.push(marker.name.clone());
                }
            }

            let id = match &param_id {
                Some(param) => {
                    let mut segs = segments.clone();
                    let last = format!("{}[{}]", function.name, param);
                    segs.pop();
                    segs.push(&last);
                    TestCaseId::from_parts(self.path, segs)
                }
                None => TestCaseId::from_parts(self.path, segments.iter().copied()),
            };
            self.result.cases.insert(
                id,
                CaseInfo {
                    classification: Classification::new(category, speed),
                    complexity: score,
                    line: function.line,
                    markers,
                },
            );
        }
    }

    fn decorator_markers(&self, decorators: &[Decorator]) -> Vec<Marker> {
        decorators
            .iter()
            .filter_map(|d| self.syntax.marker(&d.expr))
            .collect()
    }
}

/// Parametrize markers of one scope, closest to the function first
fn parametrize_layers(markers: &[Marker]) -> impl Iterator<Item = &Marker> {
    markers.iter().rev().filter(|m| m.is_parametrize())
}

fn is_test_function(name: &str) -> bool {
    name.starts_with("test")
}

/// Parameters that are fixtures: not `self`/`cls`/`request` and not
/// supplied by a parametrize layer
fn fixture_count(params: &[String], parametrize_args: &[&str]) -> usize {
    params
        .iter()
        .filter(|p| !matches!(p.as_str(), "self" | "cls" | "request"))
        .filter(|p| {
            !parametrize_args
                .iter()
                .any(|args| argnames_contain(args, p))
        })
        .count()
}

fn argnames_contain(args: &str, name: &str) -> bool {
    crate::expr::parse_args(args)
        .arg(0, "argnames")
        .map_or(false, |names| {
            names
                .trim_matches(|c| matches!(c, '\'' | '"' | '[' | ']' | '(' | ')'))
                .split(|c| matches!(c, ',' | '\'' | '"'))
                .any(|n| n.trim() == name)
        })
}
