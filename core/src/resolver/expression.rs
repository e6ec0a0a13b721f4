//! Expression evaluation for `${...}` / `{{...}}` templates
//!
//! Precedence, outermost first:
//!
//! 1. ternary `cond ? a : b`
//! 2. nullish chain `a ?? b ?? c` (first value that is neither null nor undefined)
//! 3. falsy chain `a || b` (first truthy value, else the last alternative)
//! 4. filter pipeline `value | name(args) | ...`
//! 5. operand: a literal or a property path with optional `!` negation
//!
//! Operators are only recognised at the top level, outside quotes and brackets.

use serde_json::Value as JsonValue;

use super::errors::ResolveError;
use super::filters::{FilterCall, FilterRegistry};
use super::path::resolve_path;
use super::value::is_truthy_opt;

/// Evaluate an expression against a resolution scope
///
/// Returns `Ok(None)` when the expression is undefined (a missing path).
pub fn evaluate(
    expr: &str,
    scope: &JsonValue,
    filters: &FilterRegistry,
) -> Result<Option<JsonValue>, ResolveError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }

    if let Some((question, colon)) = find_ternary(expr) {
        let condition = evaluate(&expr[..question], scope, filters)?;
        return if is_truthy_opt(condition.as_ref()) {
            evaluate(&expr[question + 1..colon], scope, filters)
        } else {
            evaluate(&expr[colon + 1..], scope, filters)
        };
    }

    let alternatives = split_top_level(expr, Operator::Nullish);
    if alternatives.len() > 1 {
        let mut last = None;
        for alternative in alternatives {
            last = evaluate(alternative, scope, filters)?;
            if matches!(&last, Some(v) if !v.is_null()) {
                return Ok(last);
            }
        }
        return Ok(last);
    }

    let alternatives = split_top_level(expr, Operator::Or);
    if alternatives.len() > 1 {
        let mut last = None;
        for alternative in alternatives {
            last = evaluate(alternative, scope, filters)?;
            if is_truthy_opt(last.as_ref()) {
                return Ok(last);
            }
        }
        return Ok(last);
    }

    let stages = split_top_level(expr, Operator::Pipe);
    if stages.len() > 1 {
        let value = evaluate_operand(stages[0])?.resolve(scope);
        let chain = stages[1..]
            .iter()
            .map(|stage| FilterCall::parse(stage))
            .collect::<Result<Vec<_>, _>>()?;
        return filters
            .apply(value.unwrap_or(JsonValue::Null), &chain)
            .map(Some);
    }

    Ok(evaluate_operand(expr)?.resolve(scope))
}

/// A parsed operand: either a literal or a path to look up
enum Operand<'a> {
    Literal(JsonValue),
    Path(&'a str),
    /// `!`-prefixed operand with its negation count
    Negated(usize, Box<Operand<'a>>),
}

impl Operand<'_> {
    fn resolve(self, scope: &JsonValue) -> Option<JsonValue> {
        match self {
            Operand::Literal(value) => Some(value),
            Operand::Path(path) => resolve_path(path, scope),
            Operand::Negated(count, inner) => {
                let truthy = is_truthy_opt(inner.resolve(scope).as_ref());
                Some(JsonValue::Bool(if count % 2 == 1 { !truthy } else { truthy }))
            }
        }
    }
}

fn evaluate_operand(source: &str) -> Result<Operand<'_>, ResolveError> {
    let source = source.trim();

    let body = source.trim_start_matches('!');
    if body.len() < source.len() {
        let count = source.len() - body.len();
        return Ok(Operand::Negated(count, Box::new(evaluate_operand(body)?)));
    }

    if let Some(text) = parse_string_literal(source) {
        return Ok(Operand::Literal(JsonValue::String(text)));
    }

    match source {
        "true" => return Ok(Operand::Literal(JsonValue::Bool(true))),
        "false" => return Ok(Operand::Literal(JsonValue::Bool(false))),
        "null" => return Ok(Operand::Literal(JsonValue::Null)),
        _ => {}
    }

    if looks_numeric(source) {
        if let Ok(i) = source.parse::<i64>() {
            return Ok(Operand::Literal(JsonValue::from(i)));
        }
        if let Some(number) = source
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return Ok(Operand::Literal(JsonValue::Number(number)));
        }
    }

    Ok(Operand::Path(source))
}

fn looks_numeric(source: &str) -> bool {
    let digits = source.strip_prefix('-').unwrap_or(source);
    digits.starts_with(|c: char| c.is_ascii_digit())
        || (digits.starts_with('.') && digits[1..].starts_with(|c: char| c.is_ascii_digit()))
}

/// Unquote a complete single- or double-quoted literal
fn parse_string_literal(source: &str) -> Option<String> {
    let quote = source.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if source.len() < 2 || !source.ends_with(quote) {
        return None;
    }

    let inner = &source[1..source.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            c if c == quote => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/* ===================== Top-level scanning ===================== */

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Nullish,
    Or,
    Pipe,
}

/// Byte offsets of top-level characters, skipping quoted text and brackets
fn top_level_positions(expr: &str) -> Vec<usize> {
    let bytes = expr.as_bytes();
    let mut positions = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                _ if depth == 0 => positions.push(i),
                _ => {}
            },
        }
        i += 1;
    }

    positions
}

/// Split on a binary operator occurring at the top level
fn split_top_level(expr: &str, op: Operator) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let positions = top_level_positions(expr);
    let at = |i: usize| bytes.get(i).copied();

    let mut parts = Vec::new();
    let mut start = 0;
    let mut skip_until = 0;

    for &i in &positions {
        if i < skip_until {
            continue;
        }
        let matched = match op {
            Operator::Nullish => at(i) == Some(b'?') && at(i + 1) == Some(b'?'),
            Operator::Or => at(i) == Some(b'|') && at(i + 1) == Some(b'|'),
            Operator::Pipe => {
                at(i) == Some(b'|')
                    && at(i + 1) != Some(b'|')
                    && (i == 0 || at(i - 1) != Some(b'|'))
            }
        };
        if !matched {
            continue;
        }

        let width = if op == Operator::Pipe { 1 } else { 2 };
        parts.push(&expr[start..i]);
        start = i + width;
        skip_until = start;
    }

    parts.push(&expr[start..]);
    parts
}

/// Locate the top-level `?` and its matching `:` of a ternary
///
/// A `?` that is part of `??` does not start a ternary. Nested ternaries in the
/// consequent are balanced so `a ? b ? c : d : e` splits at the outer colon.
fn find_ternary(expr: &str) -> Option<(usize, usize)> {
    let bytes = expr.as_bytes();
    let positions = top_level_positions(expr);
    let at = |i: usize| bytes.get(i).copied();
    let is_lone_question =
        |i: usize| at(i) == Some(b'?') && at(i + 1) != Some(b'?') && (i == 0 || at(i - 1) != Some(b'?'));

    let question = positions.iter().copied().find(|&i| is_lone_question(i))?;

    let mut pending = 0usize;
    for &i in positions.iter().filter(|&&i| i > question) {
        if is_lone_question(i) {
            pending += 1;
        } else if at(i) == Some(b':') {
            if pending == 0 {
                return Some((question, i));
            }
            pending -= 1;
        }
    }

    None
}
