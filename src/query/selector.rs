//! Selector text: `key=value,key!=value,key in (a,b),key notin (a),key,!key,key>3`.
//!
//! Label and field selectors handed to the store use this grammar, and so do `filter`
//! parameters of query strings.

use crate::error::QueryError;
use crate::query::types::{value_text, Filter, Operator};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static SET_REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[^\s!=<>()]+)\s+(?P<op>in|notin)\s*\((?P<values>[^()]*)\)$")
        .expect("static selector pattern")
});

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/')
}

/// Split on commas that are not inside parentheses.
fn split_requirements(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

pub fn parse_selector(input: &str) -> Result<Vec<Filter>, QueryError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }
    split_requirements(input)
        .into_iter()
        .map(|raw| parse_requirement(input, raw.trim()))
        .collect()
}

fn parse_requirement(input: &str, raw: &str) -> Result<Filter, QueryError> {
    let invalid = |reason: &str| QueryError::Selector { input: input.to_string(), reason: reason.to_string() };
    let check_key = |key: &str| {
        if key.is_empty() || !key.chars().all(is_key_char) {
            Err(invalid(&format!("invalid key '{}'", key)))
        } else {
            Ok(())
        }
    };

    if raw.is_empty() {
        return Err(invalid("empty requirement"));
    }
    if let Some(caps) = SET_REQUIREMENT.captures(raw) {
        let key = &caps["key"];
        check_key(key)?;
        let operator = if &caps["op"] == "in" { Operator::In } else { Operator::NotIn };
        let values: Vec<Value> = caps["values"]
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Value::String(v.to_string()))
            .collect();
        if values.is_empty() {
            return Err(invalid("set requirement needs at least one value"));
        }
        return Ok(Filter::new(key, operator, values));
    }
    if let Some(key) = raw.strip_prefix('!') {
        let key = key.trim();
        check_key(key)?;
        return Ok(Filter::missing(key));
    }

    let Some(at) = raw.find(['=', '!', '<', '>']) else {
        check_key(raw)?;
        return Ok(Filter::exists(raw));
    };
    let key = raw[..at].trim();
    check_key(key)?;
    let rest = &raw[at..];
    let (operator, width) = [
        ("==", Operator::Equals),
        ("!=", Operator::NotEquals),
        (">=", Operator::GreaterThanOrEqual),
        ("<=", Operator::LessThanOrEqual),
        ("=", Operator::Equals),
        (">", Operator::GreaterThan),
        ("<", Operator::LessThan),
    ]
    .into_iter()
    .find(|(symbol, _)| rest.starts_with(symbol))
    .map(|(symbol, op)| (op, symbol.len()))
    .ok_or_else(|| invalid(&format!("unknown operator in '{}'", raw)))?;
    let value = rest[width..].trim();
    if value.contains(['=', '!', '<', '>', '(', ')']) {
        return Err(invalid(&format!("malformed value '{}'", value)));
    }
    Ok(Filter::new(key, operator, vec![Value::String(value.to_string())]))
}

/// Render filters back to selector text.
pub fn to_selector(filters: &[Filter]) -> String {
    filters.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Evaluate a set-based filter against a label map. Comparison operators never match labels.
pub fn matches_labels(filter: &Filter, labels: &BTreeMap<String, String>) -> bool {
    let value = labels.get(&filter.field);
    let listed = |v: &String| filter.values.iter().any(|f| value_text(f) == *v);
    match filter.operator {
        Operator::Equals | Operator::In => value.is_some_and(listed),
        Operator::NotEquals | Operator::NotIn => !value.is_some_and(listed),
        Operator::Exists => value.is_some(),
        Operator::DoesNotExist => value.is_none(),
        _ => false,
    }
}
