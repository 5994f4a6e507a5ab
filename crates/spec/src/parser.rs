//! Gherkin parser
//!
//! Line-oriented state machine over the four block types the inventory cares
//! about: Feature header, Background, Scenario and Scenario Outline with its
//! Examples tables. Tags, comments, doc strings and step data tables are
//! recognized so that they are never mistaken for structure.
//!
//! A document either parses completely or fails as a whole. Returning a
//! partial scenario list would undercount silently, which is exactly the
//! failure mode the inventory exists to prevent.

use crate::document::{
    ExamplesTable, Scenario, ScenarioKind, SpecificationDocument, Step, TableRow,
};
use crate::error::{ParseError, ParseResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STEP_KEYWORDS: [&str; 6] = ["Given", "When", "Then", "And", "But", "*"];
const DOC_STRING_DELIMITERS: [&str; 2] = ["\"\"\"", "```"];

/// Parse a `.feature` file from disk
pub fn parse(path: &Path) -> ParseResult<SpecificationDocument> {
    let display = path.to_string_lossy().replace('\\', "/");
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: display.clone(),
        source,
    })?;
    parse_str(&display, &text)
}

/// Parse document text. `path` is recorded in the document and in errors.
pub fn parse_str(path: &str, text: &str) -> ParseResult<SpecificationDocument> {
    let mut parser = Parser::new(path);
    for (idx, raw) in text.lines().enumerate() {
        parser.line(idx + 1, raw)?;
    }
    let doc = parser.finish()?;
    debug!(
        target: "tally::spec",
        path = %doc.path,
        scenarios = doc.scenarios.len(),
        cases = doc.case_count(),
        "Parsed specification document"
    );
    Ok(doc)
}

/// Documents and per-document failures found under a directory
#[derive(Debug, Default)]
pub struct ParsedTree {
    /// Successfully parsed documents, sorted by path
    pub documents: Vec<SpecificationDocument>,
    /// Documents that were rejected
    pub errors: Vec<ParseError>,
}

impl ParsedTree {
    /// Runnable test cases across all parsed documents
    pub fn case_count(&self) -> usize {
        self.documents.iter().map(SpecificationDocument::case_count).sum()
    }
}

/// Parse every `.feature` file under `root`.
///
/// Document paths are recorded relative to `root`. A rejected document never
/// aborts its siblings.
pub fn parse_dir(root: &Path) -> std::io::Result<ParsedTree> {
    let mut files = Vec::new();
    collect_features(root, &mut files)?;
    files.sort();

    let mut tree = ParsedTree::default();
    for file in files {
        let rel = file
            .strip_prefix(root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        let result = std::fs::read_to_string(&file)
            .map_err(|source| ParseError::Io {
                path: rel.clone(),
                source,
            })
            .and_then(|text| parse_str(&rel, &text));
        match result {
            Ok(doc) => tree.documents.push(doc),
            Err(e) => {
                warn!(target: "tally::spec", error = %e, "Rejected specification document");
                tree.errors.push(e);
            }
        }
    }
    Ok(tree)
}

fn collect_features(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_features(&path, out)?;
        } else if path.extension().map_or(false, |e| e == "feature") {
            out.push(path);
        }
    }
    Ok(())
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Before `Feature:`
    Preamble,
    /// Feature or Rule description
    Feature,
    Background,
    Scenario,
    Examples { header_seen: bool },
}

struct Parser<'a> {
    path: &'a str,
    feature: Option<(String, Vec<String>)>,
    background: Option<Vec<Step>>,
    scenarios: Vec<Scenario>,
    pending_tags: Vec<String>,
    section: Section,
    /// Open doc string: (delimiter, opening line)
    doc_string: Option<(&'static str, usize)>,
}

impl<'a> Parser<'a> {
    fn new(path: &'a str) -> Self {
        Parser {
            path,
            feature: None,
            background: None,
            scenarios: Vec::new(),
            pending_tags: Vec::new(),
            section: Section::Preamble,
            doc_string: None,
        }
    }

    fn unexpected(&self, line: usize, text: &str) -> ParseError {
        ParseError::UnexpectedLine {
            path: self.path.to_string(),
            line,
            text: text.to_string(),
        }
    }

    fn line(&mut self, line: usize, raw: &str) -> ParseResult<()> {
        let text = raw.trim();

        if let Some((delimiter, _)) = self.doc_string {
            if text.starts_with(delimiter) {
                self.doc_string = None;
            }
            return Ok(());
        }
        if text.is_empty() || text.starts_with('#') {
            return Ok(());
        }
        if text.starts_with('@') {
            let tags = parse_tags(text).ok_or_else(|| self.unexpected(line, text))?;
            self.pending_tags.extend(tags);
            return Ok(());
        }

        if let Some(name) = strip_keyword(text, &["Feature:"]) {
            if self.feature.is_some() {
                return Err(self.unexpected(line, text));
            }
            let tags = std::mem::take(&mut self.pending_tags);
            self.feature = Some((name.to_string(), tags));
            self.section = Section::Feature;
            return Ok(());
        }
        if self.section == Section::Preamble {
            return Err(self.unexpected(line, text));
        }

        if strip_keyword(text, &["Background:"]).is_some() {
            self.pending_tags.clear();
            self.background.get_or_insert_with(Vec::new);
            self.section = Section::Background;
            return Ok(());
        }
        if strip_keyword(text, &["Rule:"]).is_some() {
            self.pending_tags.clear();
            self.section = Section::Feature;
            return Ok(());
        }
        if let Some(name) = strip_keyword(text, &["Scenario Outline:", "Scenario Template:"]) {
            self.open_scenario(
                name,
                line,
                ScenarioKind::Outline {
                    examples: Vec::new(),
                },
            );
            return Ok(());
        }
        if let Some(name) = strip_keyword(text, &["Scenario:", "Example:"]) {
            self.open_scenario(name, line, ScenarioKind::Scenario);
            return Ok(());
        }
        if strip_keyword(text, &["Examples:", "Scenarios:"]).is_some() {
            return self.open_examples(line);
        }
        if let Some((keyword, rest)) = split_step(text) {
            return self.step(line, keyword, rest, text);
        }
        if text.starts_with('|') {
            return self.table_line(line, text);
        }
        if let Some(delimiter) = DOC_STRING_DELIMITERS
            .iter()
            .find(|d| text.starts_with(**d))
        {
            if !self.has_current_step() {
                return Err(self.unexpected(line, text));
            }
            self.doc_string = Some((delimiter, line));
            return Ok(());
        }

        // Free-form description text is allowed only before the first step
        // of a block.
        let description_allowed = match self.section {
            Section::Preamble => false,
            Section::Feature => true,
            Section::Background | Section::Scenario => !self.has_current_step(),
            Section::Examples { header_seen } => !header_seen,
        };
        if description_allowed {
            Ok(())
        } else {
            Err(self.unexpected(line, text))
        }
    }

    fn open_scenario(&mut self, name: &str, line: usize, kind: ScenarioKind) {
        let tags = std::mem::take(&mut self.pending_tags);
        self.scenarios.push(Scenario {
            name: name.to_string(),
            tags,
            steps: Vec::new(),
            line,
            kind,
        });
        self.section = Section::Scenario;
    }

    fn open_examples(&mut self, line: usize) -> ParseResult<()> {
        let in_outline = matches!(
            self.section,
            Section::Scenario | Section::Examples { .. }
        ) && self.scenarios.last().map_or(false, Scenario::is_outline);
        if !in_outline {
            return Err(ParseError::ExamplesOutsideOutline {
                path: self.path.to_string(),
                line,
            });
        }
        let tags = std::mem::take(&mut self.pending_tags);
        if let Some(ScenarioKind::Outline { examples }) =
            self.scenarios.last_mut().map(|s| &mut s.kind)
        {
            examples.push(ExamplesTable {
                tags,
                header: Vec::new(),
                rows: Vec::new(),
                line,
            });
        }
        self.section = Section::Examples { header_seen: false };
        Ok(())
    }

    fn step(&mut self, line: usize, keyword: &str, rest: &str, text: &str) -> ParseResult<()> {
        let step = Step {
            keyword: keyword.to_string(),
            text: rest.to_string(),
            line,
        };
        match self.section {
            Section::Background => {
                self.background.get_or_insert_with(Vec::new).push(step);
                Ok(())
            }
            Section::Scenario => match self.scenarios.last_mut() {
                Some(scenario) => {
                    scenario.steps.push(step);
                    Ok(())
                }
                None => Err(self.unexpected(line, text)),
            },
            _ => Err(self.unexpected(line, text)),
        }
    }

    fn table_line(&mut self, line: usize, text: &str) -> ParseResult<()> {
        let cells = parse_cells(text).ok_or_else(|| self.unexpected(line, text))?;
        match self.section {
            Section::Examples { header_seen } => {
                let path = self.path;
                let table = self
                    .scenarios
                    .last_mut()
                    .and_then(|s| match &mut s.kind {
                        ScenarioKind::Outline { examples } => examples.last_mut(),
                        ScenarioKind::Scenario => None,
                    })
                    .ok_or_else(|| ParseError::ExamplesOutsideOutline {
                        path: path.to_string(),
                        line,
                    })?;
                if !header_seen {
                    table.header = cells;
                    self.section = Section::Examples { header_seen: true };
                    return Ok(());
                }
                if cells.len() != table.header.len() {
                    return Err(ParseError::MalformedExamplesTable {
                        path: path.to_string(),
                        line,
                        expected: table.header.len(),
                        found: cells.len(),
                    });
                }
                table.rows.push(TableRow { cells, line });
                Ok(())
            }
            // Step argument table: structure-neutral.
            Section::Background | Section::Scenario if self.has_current_step() => Ok(()),
            _ => Err(self.unexpected(line, text)),
        }
    }

    fn has_current_step(&self) -> bool {
        match self.section {
            Section::Background => self.background.as_ref().map_or(false, |b| !b.is_empty()),
            Section::Scenario => self.scenarios.last().map_or(false, |s| !s.steps.is_empty()),
            _ => false,
        }
    }

    fn finish(self) -> ParseResult<SpecificationDocument> {
        if let Some((_, line)) = self.doc_string {
            return Err(ParseError::UnterminatedDocString {
                path: self.path.to_string(),
                line,
            });
        }
        let Some((feature, tags)) = self.feature else {
            return Err(ParseError::MissingFeature {
                path: self.path.to_string(),
            });
        };
        Ok(SpecificationDocument {
            path: self.path.to_string(),
            feature,
            tags,
            background: self.background,
            scenarios: self.scenarios,
        })
    }
}

// ============================================================================
// Lexical helpers
// ============================================================================

fn strip_keyword<'t>(text: &'t str, keywords: &[&str]) -> Option<&'t str> {
    keywords
        .iter()
        .find_map(|k| text.strip_prefix(k))
        .map(str::trim)
}

fn split_step(text: &str) -> Option<(&str, &str)> {
    STEP_KEYWORDS.iter().find_map(|keyword| {
        let rest = text.strip_prefix(keyword)?;
        if rest.starts_with(' ') || rest.starts_with('\t') {
            Some((*keyword, rest.trim()))
        } else {
            None
        }
    })
}

/// `@a @b # comment` -> `["a", "b"]`. `None` if a token is not a tag.
fn parse_tags(text: &str) -> Option<Vec<String>> {
    let mut tags = Vec::new();
    for token in text.split_whitespace() {
        if token.starts_with('#') {
            break;
        }
        let tag = token.strip_prefix('@')?;
        if tag.is_empty() {
            return None;
        }
        tags.push(tag.to_string());
    }
    Some(tags)
}

/// `| a | b\|c |` -> `["a", "b|c"]`. `None` if the row is not closed.
fn parse_cells(text: &str) -> Option<Vec<String>> {
    let inner = text.strip_prefix('|')?.strip_suffix('|')?;

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('|') => current.push('|'),
                Some('n') => current.push('\n'),
                Some('\\') => current.push('\\'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '|' => cells.push(std::mem::take(&mut current).trim().to_string()),
            other => current.push(other),
        }
    }
    cells.push(current.trim().to_string());
    Some(cells)
}
