//! Python logical-line scanner
//!
//! Joins physical lines into logical lines the way the Python tokenizer
//! does: open brackets, backslash continuations and triple-quoted strings
//! extend a line. Comments are removed, string literals are kept verbatim.
//!
//! Scanning stops at the first lexical error. Lines completed before it are
//! still returned so the caller can classify what was readable.

/// One logical line of Python source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Indentation width of the first physical line (tabs to multiples of 8)
    pub indent: usize,
    /// Text with comments removed and continuations joined
    pub text: String,
    /// 1-based first physical line
    pub line: usize,
    /// 1-based last physical line
    pub end_line: usize,
}

/// A lexical error that stopped scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line where the problem was detected
    pub line: usize,
    /// Description
    pub message: String,
}

/// Result of scanning a file
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Complete logical lines in order
    pub lines: Vec<LogicalLine>,
    /// First lexical error, if any
    pub issue: Option<SyntaxIssue>,
}

#[derive(Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
    raw: bool,
    line: usize,
}

/// Split `source` into logical lines
pub fn logical_lines(source: &str) -> Scan {
    let mut scan = Scan::default();
    let mut buffer = String::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut string: Option<OpenString> = None;
    let mut start = 0usize;
    let mut indent = 0usize;
    let mut continued = false;

    for (idx, physical) in source.lines().enumerate() {
        let line_no = idx + 1;
        let fresh = !continued && brackets.is_empty() && string.is_none();
        if fresh {
            let body = physical.trim_start();
            if body.is_empty() || body.starts_with('#') {
                continue;
            }
            indent = indent_width(physical);
            start = line_no;
            buffer.clear();
        }
        continued = false;

        let text = if fresh { physical.trim_start() } else { physical };
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if let Some(open) = string.as_mut() {
                buffer.push(c);
                if c == '\\' && !open.raw {
                    if let Some(next) = chars.next() {
                        buffer.push(next);
                    } else if !open.triple {
                        // Escaped newline inside a short string
                        continued = true;
                    }
                    continue;
                }
                if c == open.quote {
                    if !open.triple {
                        string = None;
                    } else if chars.peek() == Some(&open.quote) {
                        chars.next();
                        if chars.peek() == Some(&open.quote) {
                            chars.next();
                            buffer.push(open.quote);
                            buffer.push(open.quote);
                            string = None;
                        } else {
                            buffer.push(open.quote);
                        }
                    }
                }
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' => {
                    let raw = raw_prefix(&buffer);
                    buffer.push(c);
                    let triple = if chars.peek() == Some(&c) {
                        chars.next();
                        if chars.peek() == Some(&c) {
                            chars.next();
                            buffer.push(c);
                            buffer.push(c);
                            true
                        } else {
                            // Empty string literal
                            buffer.push(c);
                            continue;
                        }
                    } else {
                        false
                    };
                    string = Some(OpenString {
                        quote: c,
                        triple,
                        raw,
                        line: line_no,
                    });
                }
                '(' | '[' | '{' => {
                    brackets.push((c, line_no));
                    buffer.push(c);
                }
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match brackets.pop() {
                        Some((open, _)) if open == expected => buffer.push(c),
                        _ => {
                            scan.issue = Some(SyntaxIssue {
                                line: line_no,
                                message: format!("unmatched '{}'", c),
                            });
                            return scan;
                        }
                    }
                }
                '\\' if chars.peek().is_none() => continued = true,
                other => buffer.push(other),
            }
        }

        if let Some(open) = string {
            if open.triple {
                buffer.push('\n');
                continue;
            }
            if !continued {
                scan.issue = Some(SyntaxIssue {
                    line: open.line,
                    message: "unterminated string literal".to_string(),
                });
                return scan;
            }
        }
        if continued || !brackets.is_empty() {
            buffer.push(' ');
            continue;
        }

        let text = buffer.trim_end().to_string();
        if !text.is_empty() {
            scan.lines.push(LogicalLine {
                indent,
                text,
                line: start,
                end_line: line_no,
            });
        }
    }

    if let Some(open) = string {
        scan.issue = Some(SyntaxIssue {
            line: open.line,
            message: "unterminated triple-quoted string".to_string(),
        });
    } else if let Some((open, line)) = brackets.last() {
        scan.issue = Some(SyntaxIssue {
            line: *line,
            message: format!("'{}' was never closed", open),
        });
    }
    scan
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

/// Whether the identifier just before a quote is a raw string prefix
fn raw_prefix(buffer: &str) -> bool {
    let prefix: String = buffer
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    prefix.len() <= 2 && prefix.chars().any(|c| c == 'r' || c == 'R')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_brackets_join_lines() {
        let scan = logical_lines("x = foo(\n    1,\n    2,\n)\ny = 3\n");
        assert!(scan.issue.is_none());
        assert_eq!(scan.lines.len(), 2);
        assert_eq!(scan.lines[0].line, 1);
        assert_eq!(scan.lines[0].end_line, 4);
        assert_eq!(scan.lines[1].text, "y = 3");
    }

    #[test]
    fn test_comments_removed_strings_kept() {
        let scan = logical_lines("a = '# not a comment'  # comment\n");
        assert_eq!(scan.lines[0].text, "a = '# not a comment'");
    }

    #[test]
    fn test_triple_quoted_docstring_spans_lines() {
        let src = "def f():\n    \"\"\"Doc\n    def g(): pass\n    \"\"\"\n    return 1\n";
        let scan = logical_lines(src);
        assert!(scan.issue.is_none());
        assert_eq!(scan.lines.len(), 3);
        assert_eq!(scan.lines[1].indent, 4);
        assert_eq!(scan.lines[1].end_line, 4);
    }

    #[test]
    fn test_backslash_continuation() {
        let scan = logical_lines("x = 1 + \\\n    2\n");
        assert_eq!(scan.lines.len(), 1);
        assert_eq!(scan.lines[0].end_line, 2);
    }

    #[test]
    fn test_tabs_and_empty_strings() {
        let scan = logical_lines("if x:\n\ty = ''\n");
        assert_eq!(scan.lines[1].indent, 8);
        assert_eq!(scan.lines[1].text, "y = ''");
    }

    #[test]
    fn test_unclosed_bracket_keeps_prefix() {
        let scan = logical_lines("import os\ndef broken(:\n    x = [1, 2\n");
        assert_eq!(scan.lines.len(), 1);
        let issue = scan.issue.unwrap();
        assert_eq!(issue.line, 3);
    }

    #[test]
    fn test_unmatched_close_reported() {
        let scan = logical_lines("a = 1\nb = 2)\n");
        assert_eq!(scan.lines.len(), 1);
        assert_eq!(scan.issue.unwrap().line, 2);
    }

    #[test]
    fn test_raw_string_backslash() {
        let scan = logical_lines("p = r'\\d'\nq = 1\n");
        assert!(scan.issue.is_none());
        assert_eq!(scan.lines.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_never_panics_and_lines_ordered(src in "[a-z():\\[\\]'\"#\\\\ \n\t=,]{0,200}") {
            let scan = logical_lines(&src);
            for pair in scan.lines.windows(2) {
                prop_assert!(pair[0].end_line < pair[1].line);
            }
        }
    }
}
