//! Expression helpers over logical-line text
//!
//! Just enough structure to read decorator calls and literal argument
//! lists: top-level splitting that respects brackets and strings, call
//! argument extraction and string literal decoding.

/// Split on `sep` at bracket depth 0 and outside strings.
///
/// Items are trimmed and empty items (trailing commas) are dropped.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                items.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    items.push(s[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}

/// Byte index of the bracket closing the one at `open`
pub fn matching_close(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Arguments of a call expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs<'a> {
    /// Positional arguments in order
    pub positional: Vec<&'a str>,
    /// `name=value` arguments in order
    pub keywords: Vec<(&'a str, &'a str)>,
}

impl<'a> CallArgs<'a> {
    /// Keyword argument by name
    pub fn keyword(&self, name: &str) -> Option<&'a str> {
        self.keywords
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    /// Positional argument `index`, or the keyword `name`
    pub fn arg(&self, index: usize, name: &str) -> Option<&'a str> {
        self.positional
            .get(index)
            .copied()
            .or_else(|| self.keyword(name))
    }
}

/// Split `callee(args)` into the callee and its arguments.
///
/// `None` unless the whole expression is a single call.
pub fn call(expr: &str) -> Option<(&str, CallArgs<'_>)> {
    let expr = expr.trim();
    let open = expr.find('(')?;
    let close = matching_close(expr, open)?;
    if close != expr.len() - 1 {
        return None;
    }
    Some((expr[..open].trim(), parse_args(&expr[open + 1..close])))
}

/// Parse the text between a call's parentheses
pub fn parse_args(inner: &str) -> CallArgs<'_> {
    let mut args = CallArgs::default();
    for item in split_top_level(inner, ',') {
        match keyword_split(item) {
            Some((name, value)) => args.keywords.push((name, value)),
            None => args.positional.push(item),
        }
    }
    args
}

fn keyword_split(item: &str) -> Option<(&str, &str)> {
    let eq = item.find('=')?;
    let name = item[..eq].trim();
    if item[eq + 1..].starts_with('=') || !is_identifier(name) {
        return None;
    }
    Some((name, item[eq + 1..].trim()))
}

/// Items of a `[...]` or `(...)` literal
pub fn sequence_items(expr: &str) -> Option<Vec<&str>> {
    let expr = expr.trim();
    let first = expr.chars().next()?;
    if first != '[' && first != '(' {
        return None;
    }
    let close = matching_close(expr, 0)?;
    if close != expr.len() - 1 {
        return None;
    }
    Some(split_top_level(&expr[1..close], ','))
}

/// Decode a single string literal, including `r`/`b`/`u`/`f` prefixes
pub fn string_literal(expr: &str) -> Option<String> {
    let expr = expr.trim();
    let quote_at = expr.find(['\'', '"'])?;
    let prefix = &expr[..quote_at];
    if prefix.len() > 2 || !prefix.chars().all(|c| "rRbBuUfF".contains(c)) {
        return None;
    }
    let raw = prefix.contains(['r', 'R']);
    let body = &expr[quote_at..];
    let quote = &body[..1];
    let triple = body.len() >= 6 && body.starts_with(&quote.repeat(3));
    let delim = if triple { quote.repeat(3) } else { quote.to_string() };
    let inner = body.strip_prefix(delim.as_str())?.strip_suffix(delim.as_str())?;

    if raw {
        return Some(inner.to_string());
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// Python identifier check (ASCII subset)
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_nesting_and_strings() {
        assert_eq!(
            split_top_level("1, (2, 3), 'a,b', [4, 5],", ','),
            vec!["1", "(2, 3)", "'a,b'", "[4, 5]"]
        );
    }

    #[test]
    fn test_call_args() {
        let (callee, args) =
            call("pytest.mark.parametrize('x, y', [(1, 2)], ids=['one'])").unwrap();
        assert_eq!(callee, "pytest.mark.parametrize");
        assert_eq!(args.positional, vec!["'x, y'", "[(1, 2)]"]);
        assert_eq!(args.keyword("ids"), Some("['one']"));
        assert_eq!(args.arg(1, "argvalues"), Some("[(1, 2)]"));
    }

    #[test]
    fn test_comparison_is_not_keyword() {
        let (_, args) = call("f(a == b)").unwrap();
        assert_eq!(args.positional, vec!["a == b"]);
    }

    #[test]
    fn test_call_must_span_expression() {
        assert!(call("f(1)(2)").is_none());
        assert!(call("pytest.mark.slow").is_none());
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(string_literal("'abc'").as_deref(), Some("abc"));
        assert_eq!(string_literal("r'\\d+'").as_deref(), Some("\\d+"));
        assert_eq!(string_literal("\"a\\\"b\"").as_deref(), Some("a\"b"));
        assert_eq!(string_literal("'''x'''").as_deref(), Some("x"));
        assert_eq!(string_literal("''").as_deref(), Some(""));
        assert!(string_literal("name").is_none());
        assert!(string_literal("foo('x')").is_none());
    }

    #[test]
    fn test_sequence_items() {
        assert_eq!(sequence_items("[1, 2]").unwrap(), vec!["1", "2"]);
        assert_eq!(sequence_items("(1,)").unwrap(), vec!["1"]);
        assert!(sequence_items("CASES").is_none());
        assert!(sequence_items("(1)+(2)").is_none());
    }
}
