//! Block tree over logical lines
//!
//! Recovers the parts of a Python module's structure that test collection
//! depends on: classes (nested), functions with their decorators and
//! parameters, `pytestmark` assignments and imports. Bodies of anything else
//! (`if`, `with`, nested functions) are skipped.

use crate::expr::{matching_close, split_top_level};
use crate::source::LogicalLine;

/// A decorator expression without the leading `@`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    /// Expression text
    pub expr: String,
    /// 1-based line
    pub line: usize,
}

/// A `def` or `async def`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// 1-based line of the `def`
    pub line: usize,
    /// 1-based last line of the body
    pub end_line: usize,
    /// Decorators, top to bottom
    pub decorators: Vec<Decorator>,
    /// Parameter names without `*`/`**`, annotations or defaults
    pub params: Vec<String>,
    /// Assertion statements and assertion helper calls in the body
    pub asserts: usize,
}

impl FunctionDef {
    /// Physical lines spanned by the definition
    pub fn line_span(&self) -> usize {
        self.end_line + 1 - self.line
    }
}

/// A `class` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDef {
    /// Class name
    pub name: String,
    /// 1-based line of the `class`
    pub line: usize,
    /// Decorators, top to bottom
    pub decorators: Vec<Decorator>,
    /// Methods
    pub functions: Vec<FunctionDef>,
    /// Nested classes
    pub classes: Vec<ClassDef>,
    /// Right-hand side of a class-level `pytestmark = ...`
    pub pytestmark: Option<String>,
    /// Whether the class defines `__init__`
    pub has_init: bool,
}

/// One import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Module path as written (`pkg.mod`, `.sibling`)
    pub module: String,
    /// Names pulled in by `from ... import` (empty for plain `import`)
    pub names: Vec<String>,
}

/// Structure of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTree {
    /// Every import in the file, at any depth
    pub imports: Vec<Import>,
    /// Right-hand side of a module-level `pytestmark = ...`
    pub pytestmark: Option<String>,
    /// Module-level functions
    pub functions: Vec<FunctionDef>,
    /// Module-level classes
    pub classes: Vec<ClassDef>,
}

impl ModuleTree {
    /// Whether `pytest` (or something from it) is imported
    pub fn imports_pytest(&self) -> bool {
        self.imports
            .iter()
            .any(|i| i.module == "pytest" || i.module.starts_with("pytest."))
    }

    /// Whether `name` was imported with `from pytest... import name`
    pub fn imports_from_pytest(&self, name: &str) -> bool {
        self.imports.iter().any(|i| {
            (i.module == "pytest" || i.module.starts_with("pytest."))
                && i.names.iter().any(|n| n == name)
        })
    }
}

#[derive(Default)]
struct Block {
    functions: Vec<FunctionDef>,
    classes: Vec<ClassDef>,
    pytestmark: Option<String>,
}

/// Build the tree for a sequence of logical lines
pub fn build(lines: &[LogicalLine]) -> ModuleTree {
    let mut pos = 0;
    let block = parse_block(lines, &mut pos, 0);
    ModuleTree {
        imports: lines.iter().flat_map(|l| parse_import(&l.text)).collect(),
        pytestmark: block.pytestmark,
        functions: block.functions,
        classes: block.classes,
    }
}

fn parse_block(lines: &[LogicalLine], pos: &mut usize, indent: usize) -> Block {
    let mut block = Block::default();
    let mut decorators = Vec::new();

    while let Some(line) = lines.get(*pos) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            // Unexpected indentation: not part of any construct we track.
            *pos += 1;
            continue;
        }
        let text = line.text.as_str();

        if let Some(expr) = text.strip_prefix('@') {
            decorators.push(Decorator {
                expr: expr.trim().to_string(),
                line: line.line,
            });
            *pos += 1;
            continue;
        }

        if let Some(header) = def_header(text) {
            *pos += 1;
            let body = skip_body(lines, pos, indent);
            block.functions.push(FunctionDef {
                name: header.0,
                line: line.line,
                end_line: body.last().map_or(line.end_line, |l| l.end_line),
                decorators: std::mem::take(&mut decorators),
                params: header.1,
                asserts: count_asserts(inline_body(text))
                    + body.iter().map(|l| count_asserts(&l.text)).sum::<usize>(),
            });
            continue;
        }

        if let Some(name) = class_header(text) {
            *pos += 1;
            let mut class = ClassDef {
                name,
                line: line.line,
                decorators: std::mem::take(&mut decorators),
                ..ClassDef::default()
            };
            let body_indent = lines.get(*pos).map(|l| l.indent).filter(|i| *i > indent);
            if let Some(body_indent) = body_indent {
                let inner = parse_block(lines, pos, body_indent);
                class.has_init = inner.functions.iter().any(|f| f.name == "__init__");
                class.functions = inner.functions;
                class.classes = inner.classes;
                class.pytestmark = inner.pytestmark;
            }
            block.classes.push(class);
            continue;
        }

        decorators.clear();
        if let Some(rhs) = pytestmark_rhs(text) {
            block.pytestmark = Some(rhs.to_string());
        }
        *pos += 1;
        skip_body(lines, pos, indent);
    }
    block
}

/// Consume and return every following line indented deeper than `indent`
fn skip_body<'a>(lines: &'a [LogicalLine], pos: &mut usize, indent: usize) -> &'a [LogicalLine] {
    let start = *pos;
    while lines.get(*pos).map_or(false, |l| l.indent > indent) {
        *pos += 1;
    }
    &lines[start..*pos]
}

/// `def name(params):` -> `(name, params)`
fn def_header(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text
        .strip_prefix("async def ")
        .or_else(|| text.strip_prefix("def "))?
        .trim_start();
    let open = rest.find('(')?;
    let name = rest[..open].trim().to_string();
    let close = matching_close(rest, open)?;
    let params = split_top_level(&rest[open + 1..close], ',')
        .into_iter()
        .filter_map(|p| {
            let p = p.trim_start_matches('*');
            let end = p.find([':', '=']).unwrap_or(p.len());
            let name = p[..end].trim();
            (!name.is_empty() && name != "/").then(|| name.to_string())
        })
        .collect();
    Some((name, params))
}

/// Statement after the header colon of a one-line `def`
fn inline_body(text: &str) -> &str {
    let Some(open) = text.find('(') else {
        return "";
    };
    let Some(close) = matching_close(text, open) else {
        return "";
    };
    text[close + 1..]
        .split_once(':')
        .map_or("", |(_, body)| body.trim())
}

fn class_header(text: &str) -> Option<String> {
    let rest = text.strip_prefix("class ")?;
    let end = rest.find(['(', ':'])?;
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn pytestmark_rhs(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("pytestmark")?.trim_start();
    let rest = rest.strip_prefix('=')?;
    (!rest.starts_with('=')).then(|| rest.trim())
}

fn count_asserts(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let statement = text == "assert"
        || text.starts_with("assert ")
        || text.starts_with("assert(");
    if statement {
        1
    } else {
        text.matches(".assert").count()
    }
}

fn parse_import(text: &str) -> Vec<Import> {
    if let Some(rest) = text.strip_prefix("import ") {
        return split_top_level(rest, ',')
            .into_iter()
            .map(|item| Import {
                module: strip_alias(item).to_string(),
                names: Vec::new(),
            })
            .collect();
    }
    if let Some(rest) = text.strip_prefix("from ") {
        if let Some((module, names)) = rest.split_once(" import ") {
            let names = names.trim().trim_start_matches('(').trim_end_matches(')');
            return vec![Import {
                module: module.trim().to_string(),
                names: split_top_level(names, ',')
                    .into_iter()
                    .map(|n| strip_alias(n).to_string())
                    .collect(),
            }];
        }
    }
    Vec::new()
}

fn strip_alias(item: &str) -> &str {
    item.split_once(" as ").map_or(item, |(name, _)| name).trim()
}
