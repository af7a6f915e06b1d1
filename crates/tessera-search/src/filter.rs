//! Predicate evaluation for the in-memory engine.
//!
//! The query pipeline treats filters as opaque strings and hands them to the
//! engine untouched. [`MemoryEngine`](crate::engine::MemoryEngine) needs to
//! evaluate them itself, so it understands a small subset:
//!
//! ```text
//! <column> <op> <literal> [AND <column> <op> <literal> ...]
//! ```
//!
//! with operators `=`, `!=`, `<`, `<=`, `>`, `>=` and literals that are
//! numbers, `true`/`false`, or single- or double-quoted strings.

use serde_json::Value;
use std::cmp::Ordering;
use tessera_core::{Error, Result};

use crate::types::Row;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// One `column op literal` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOperator,
    pub value: Value,
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<FilterCondition>,
}

impl Predicate {
    /// Parse a predicate string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("filter predicate is empty"));
        }
        let conditions = split_and(trimmed)
            .into_iter()
            .map(parse_condition)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    /// The parsed conditions.
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// Whether `row` satisfies every condition.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|cond| evaluate_condition(row, cond))
    }
}

// Splits on the keyword AND outside quotes, case-insensitively.
fn split_and(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None => {
                let at_word = i + 5 <= bytes.len()
                    && bytes[i].is_ascii_whitespace()
                    && bytes[i + 1..i + 4].eq_ignore_ascii_case(b"and")
                    && bytes[i + 4].is_ascii_whitespace();
                if at_word {
                    parts.push(input[start..i].trim());
                    start = i + 5;
                    i += 4;
                }
            }
        }
        i += 1;
    }
    parts.push(input[start..].trim());
    parts
}

fn parse_condition(clause: &str) -> Result<FilterCondition> {
    const OPS: [(&str, FilterOperator); 6] = [
        ("!=", FilterOperator::Ne),
        ("<=", FilterOperator::Lte),
        (">=", FilterOperator::Gte),
        ("=", FilterOperator::Eq),
        ("<", FilterOperator::Lt),
        (">", FilterOperator::Gt),
    ];

    let (pos, token, op) = OPS
        .iter()
        .filter_map(|(token, op)| clause.find(token).map(|pos| (pos, *token, *op)))
        .min_by_key(|(pos, token, _)| (*pos, usize::MAX - token.len()))
        .ok_or_else(|| Error::validation(format!("no comparison operator in '{clause}'")))?;

    let column = clause[..pos].trim();
    if column.is_empty() || column.contains(char::is_whitespace) {
        return Err(Error::validation(format!("invalid column in '{clause}'")));
    }
    let value = parse_literal(clause[pos + token.len()..].trim())?;

    Ok(FilterCondition {
        column: column.to_string(),
        op,
        value,
    })
}

fn parse_literal(raw: &str) -> Result<Value> {
    if raw.len() >= 2 {
        let first = raw.as_bytes()[0];
        if (first == b'\'' || first == b'"') && raw.as_bytes()[raw.len() - 1] == first {
            return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
        }
    }
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Ok(Value::from(f));
        }
    }
    Err(Error::validation(format!("unsupported literal '{raw}'")))
}

fn evaluate_condition(row: &Row, cond: &FilterCondition) -> bool {
    let Some(field) = row.get(&cond.column) else {
        return false;
    };
    match cond.op {
        FilterOperator::Eq => json_eq(field, &cond.value),
        FilterOperator::Ne => !json_eq(field, &cond.value),
        FilterOperator::Lt => json_cmp(field, &cond.value) == Some(Ordering::Less),
        FilterOperator::Lte => {
            matches!(json_cmp(field, &cond.value), Some(Ordering::Less | Ordering::Equal))
        }
        FilterOperator::Gt => json_cmp(field, &cond.value) == Some(Ordering::Greater),
        FilterOperator::Gte => {
            matches!(json_cmp(field, &cond.value), Some(Ordering::Greater | Ordering::Equal))
        }
    }
}

fn json_eq(field: &Value, literal: &Value) -> bool {
    match (field, literal) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        },
        _ => field == literal,
    }
}

fn json_cmp(field: &Value, literal: &Value) -> Option<Ordering> {
    match (field, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
