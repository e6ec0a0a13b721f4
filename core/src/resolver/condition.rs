//! Fallback condition evaluator
//!
//! Guards that resolve to a plain (non-boolean) string are evaluated with a small
//! closed grammar instead of a general-purpose evaluator: `||`, `&&`, `!`,
//! comparisons, parentheses, literals and paths rooted at `context`, `input`,
//! `state` or `results`. Anything outside that grammar is an error, and
//! [`evaluate_or_false`] turns every error into `false`.

use std::cmp::Ordering;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::path::{lookup, PathSegment};
use super::value::is_truthy_opt;

#[derive(Parser)]
#[grammar = "resolver/condition.pest"]
struct ConditionParser;

/// Names a condition may reference
pub const BOUND_NAMES: [&str; 4] = ["context", "input", "state", "results"];

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("invalid condition: {0}")]
    Parse(String),

    #[error("unknown name '{0}' (conditions may reference context, input, state or results)")]
    UnboundName(String),

    #[error("invalid number literal '{0}'")]
    Number(String),

    #[error("unexpected {0:?} in condition")]
    Unexpected(Rule),
}

/// Evaluate a condition string to a boolean
pub fn evaluate(source: &str, scope: &JsonValue) -> Result<bool, ConditionError> {
    let mut pairs = ConditionParser::parse(Rule::condition, source)
        .map_err(|e| ConditionError::Parse(e.to_string()))?;

    let expr = pairs
        .next()
        .and_then(|condition| condition.into_inner().next())
        .ok_or_else(|| ConditionError::Parse("empty condition".to_string()))?;

    let value = eval_pair(expr, scope)?;
    Ok(is_truthy_opt(value.as_ref()))
}

/// Evaluate a condition, treating any failure as `false`
pub fn evaluate_or_false(source: &str, scope: &JsonValue) -> bool {
    match evaluate(source, scope) {
        Ok(result) => result,
        Err(error) => {
            tracing::debug!(condition = source, %error, "condition evaluation failed, treating as false");
            false
        }
    }
}

fn eval_pair(pair: Pair<Rule>, scope: &JsonValue) -> Result<Option<JsonValue>, ConditionError> {
    match pair.as_rule() {
        Rule::or_expr => {
            let mut last = None;
            for operand in pair.into_inner() {
                last = eval_pair(operand, scope)?;
                if is_truthy_opt(last.as_ref()) {
                    break;
                }
            }
            Ok(last)
        }
        Rule::and_expr => {
            let mut last = Some(JsonValue::Bool(true));
            for operand in pair.into_inner() {
                last = eval_pair(operand, scope)?;
                if !is_truthy_opt(last.as_ref()) {
                    break;
                }
            }
            Ok(last)
        }
        Rule::unary => {
            let mut negations = 0usize;
            let mut value = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::not_op => negations += 1,
                    _ => value = eval_pair(inner, scope)?,
                }
            }
            if negations == 0 {
                return Ok(value);
            }
            let truthy = is_truthy_opt(value.as_ref());
            Ok(Some(JsonValue::Bool(if negations % 2 == 1 { !truthy } else { truthy })))
        }
        Rule::comparison => {
            let mut inner = pair.into_inner();
            let left = match inner.next() {
                Some(operand) => eval_pair(operand, scope)?,
                None => return Ok(None),
            };
            let (Some(op), Some(right)) = (inner.next(), inner.next()) else {
                return Ok(left);
            };
            let right = eval_pair(right, scope)?;
            Ok(Some(JsonValue::Bool(compare(op.as_str(), left.as_ref(), right.as_ref()))))
        }
        Rule::null => Ok(Some(JsonValue::Null)),
        Rule::boolean => Ok(Some(JsonValue::Bool(pair.as_str() == "true"))),
        Rule::number => {
            let text = pair.as_str();
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Some(JsonValue::from(i)));
            }
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(|n| Some(JsonValue::Number(n)))
                .ok_or_else(|| ConditionError::Number(text.to_string()))
        }
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Some(JsonValue::String(unescape(raw))))
        }
        Rule::path => eval_path(pair, scope),
        other => Err(ConditionError::Unexpected(other)),
    }
}

fn eval_path(pair: Pair<Rule>, scope: &JsonValue) -> Result<Option<JsonValue>, ConditionError> {
    let mut inner = pair.into_inner();
    let root_name = inner
        .next()
        .map(|p| p.as_str())
        .ok_or(ConditionError::Unexpected(Rule::path))?;

    let root = match root_name {
        "context" => scope,
        name if BOUND_NAMES.contains(&name) => match scope.get(name) {
            Some(value) => value,
            None => return Ok(None),
        },
        name => return Err(ConditionError::UnboundName(name.to_string())),
    };

    let mut segments = Vec::new();
    for accessor in inner {
        match accessor.as_rule() {
            Rule::member => segments.push(PathSegment::Key(accessor.as_str().to_string())),
            Rule::index => {
                let index = accessor
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| ConditionError::Number(accessor.as_str().to_string()))?;
                segments.push(PathSegment::Index(index));
            }
            other => return Err(ConditionError::Unexpected(other)),
        }
    }

    Ok(lookup(root, &segments))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
    out
}

fn numeric_pair(left: &JsonValue, right: &JsonValue) -> Option<(f64, f64)> {
    Some((left.as_f64()?, right.as_f64()?))
}

fn strict_eq(left: Option<&JsonValue>, right: Option<&JsonValue>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(l), Some(r)) => match numeric_pair(l, r) {
            Some((a, b)) => a == b,
            None => l == r,
        },
        _ => false,
    }
}

/// `null` and undefined are loosely equal to each other and nothing else
fn loose_eq(left: Option<&JsonValue>, right: Option<&JsonValue>) -> bool {
    let is_nullish = |v: Option<&JsonValue>| v.map_or(true, JsonValue::is_null);
    if is_nullish(left) || is_nullish(right) {
        return is_nullish(left) && is_nullish(right);
    }
    strict_eq(left, right)
}

fn ordering(left: Option<&JsonValue>, right: Option<&JsonValue>) -> Option<Ordering> {
    match (left?, right?) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (l, r) => {
            let (a, b) = numeric_pair(l, r)?;
            a.partial_cmp(&b)
        }
    }
}

fn compare(op: &str, left: Option<&JsonValue>, right: Option<&JsonValue>) -> bool {
    match op {
        "==" => loose_eq(left, right),
        "!=" => !loose_eq(left, right),
        "===" => strict_eq(left, right),
        "!==" => !strict_eq(left, right),
        "<" => ordering(left, right) == Some(Ordering::Less),
        ">" => ordering(left, right) == Some(Ordering::Greater),
        "<=" => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        ">=" => matches!(ordering(left, right), Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}
