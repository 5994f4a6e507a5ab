//! `parametrize` expansion
//!
//! Reproduces how the framework turns stacked `parametrize` markers into
//! case ids. Each layer yields one id per value set: an explicit `ids=`
//! entry or `pytest.param(id=...)` wins, otherwise every argument value
//! contributes its own id (literals by value, anything else as
//! `{argname}{index}`) joined with `-`. Layers combine as a cartesian product
//! in application order, the layer closest to the function first.

use crate::expr::{call, parse_args, sequence_items, string_literal};
use crate::markers::{MarkSyntax, Marker};

/// One parametrized case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamCase {
    /// Bracketed id without the brackets
    pub id: String,
    /// Marks attached with `pytest.param(..., marks=...)`
    pub marks: Vec<Marker>,
}

/// Outcome of expanding a function's parametrize layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Not parametrized
    None,
    /// Statically resolved cases
    Cases(Vec<ParamCase>),
    /// Values are computed at run time and cannot be enumerated
    Unresolved(String),
}

/// Expand `layers` given in application order (closest to the function first)
pub fn expand(layers: &[&Marker], syntax: &MarkSyntax) -> Expansion {
    if layers.is_empty() {
        return Expansion::None;
    }
    let mut combined = vec![ParamCase {
        id: String::new(),
        marks: Vec::new(),
    }];
    for layer in layers {
        let cases = match layer_cases(layer, syntax) {
            Ok(cases) => cases,
            Err(reason) => return Expansion::Unresolved(reason),
        };
        let mut next = Vec::with_capacity(combined.len() * cases.len());
        for outer in &combined {
            for inner in &cases {
                let id = if outer.id.is_empty() {
                    inner.id.clone()
                } else {
                    format!("{}-{}", outer.id, inner.id)
                };
                let mut marks = outer.marks.clone();
                marks.extend(inner.marks.iter().cloned());
                next.push(ParamCase { id, marks });
            }
        }
        combined = next;
    }
    Expansion::Cases(combined)
}

fn layer_cases(marker: &Marker, syntax: &MarkSyntax) -> Result<Vec<ParamCase>, String> {
    let inner = marker.args.as_deref().unwrap_or("");
    let args = parse_args(inner);
    let argnames = args
        .arg(0, "argnames")
        .and_then(parse_argnames)
        .ok_or_else(|| "parametrize argnames are not a literal".to_string())?;
    let values = args
        .arg(1, "argvalues")
        .and_then(sequence_items)
        .ok_or_else(|| "parametrize argvalues are computed at run time".to_string())?;
    let explicit_ids: Option<Vec<Option<String>>> = args.keyword("ids").and_then(|ids| {
        sequence_items(ids).map(|items| {
            items
                .into_iter()
                .map(string_literal)
                .collect()
        })
    });

    if values.is_empty() {
        let id = argnames
            .iter()
            .map(|name| format!("{}0", name))
            .collect::<Vec<_>>()
            .join("-");
        return Ok(vec![ParamCase {
            id,
            marks: Vec::new(),
        }]);
    }

    let mut cases = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let mut marks = Vec::new();
        let mut param_id = None;
        let mut param_values: Option<Vec<&str>> = None;

        if let Some((callee, param_args)) = call(value) {
            if syntax.is_param_call(callee) {
                param_id = param_args.keyword("id").and_then(string_literal);
                if let Some(m) = param_args.keyword("marks") {
                    marks = syntax.markers(m);
                }
                param_values = Some(param_args.positional.clone());
            }
        }

        let elements: Option<Vec<&str>> = match param_values {
            Some(v) => Some(v),
            None if argnames.len() == 1 => Some(vec![value]),
            None => sequence_items(value),
        };

        let id = param_id
            .or_else(|| {
                explicit_ids
                    .as_ref()
                    .and_then(|ids| ids.get(index).cloned().flatten())
            })
            .unwrap_or_else(|| auto_id(&argnames, elements.as_deref(), index));
        cases.push(ParamCase { id, marks });
    }
    disambiguate(&mut cases);
    Ok(cases)
}

fn parse_argnames(expr: &str) -> Option<Vec<String>> {
    if let Some(names) = string_literal(expr) {
        return Some(
            names
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        );
    }
    sequence_items(expr)?
        .into_iter()
        .map(string_literal)
        .collect()
}

fn auto_id(argnames: &[String], elements: Option<&[&str]>, index: usize) -> String {
    argnames
        .iter()
        .enumerate()
        .map(|(pos, name)| {
            elements
                .and_then(|e| e.get(pos))
                .and_then(|v| literal_id(v))
                .unwrap_or_else(|| format!("{}{}", name, index))
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Id of a literal value, `None` for anything the framework would number
fn literal_id(value: &str) -> Option<String> {
    let value = value.trim();
    if matches!(value, "True" | "False" | "None") {
        return Some(value.to_string());
    }
    if let Some(s) = string_literal(value) {
        return Some(ascii_escaped(&s));
    }
    if let Ok(int) = value.replace('_', "").parse::<i64>() {
        return Some(int.to_string());
    }
    if value.parse::<f64>().is_ok() {
        return Some(value.to_string());
    }
    None
}

fn ascii_escaped(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c if (c as u32) < 0x100 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if (c as u32) < 0x10000 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out
}

/// Suffix repeated ids with a per-id counter
fn disambiguate(cases: &mut [ParamCase]) {
    use std::collections::HashMap;
    let mut totals: HashMap<String, usize> = HashMap::new();
    for case in cases.iter() {
        *totals.entry(case.id.clone()).or_default() += 1;
    }
    let mut seen: HashMap<String, usize> = HashMap::new();
    for case in cases.iter_mut() {
        if totals.get(&case.id).copied().unwrap_or(0) < 2 {
            continue;
        }
        let counter = seen.entry(case.id.clone()).or_default();
        let sep = if case.id.ends_with(|c: char| c.is_ascii_digit()) {
            "_"
        } else {
            ""
        };
        let renamed = format!("{}{}{}", case.id, sep, counter);
        *counter += 1;
        case.id = renamed;
    }
}
