//! Property path traversal
//!
//! A path is a dot-separated list of segments, each optionally followed by one or
//! more `[n]` indexes: `user.addresses[0].city`. A leading `!` negates the
//! resolved value.

use serde_json::Value as JsonValue;

use super::value::is_truthy_opt;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a path into segments, returning `None` if it is malformed
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let part = part.trim();
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !name.is_empty() {
            segments.push(PathSegment::Key(name.to_string()));
        } else if rest.is_empty() {
            return None;
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            if !rest.starts_with('[') {
                return None;
            }
            let inner = rest[1..close].trim();
            segments.push(parse_bracket(inner)?);
            rest = &rest[close + 1..];
        }
    }

    Some(segments)
}

/// Bracket contents are either a numeric index or a quoted key
fn parse_bracket(inner: &str) -> Option<PathSegment> {
    if let Ok(index) = inner.parse::<usize>() {
        return Some(PathSegment::Index(index));
    }
    let quoted = (inner.starts_with('"') && inner.ends_with('"'))
        || (inner.starts_with('\'') && inner.ends_with('\''));
    if quoted && inner.len() >= 2 {
        return Some(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
    }
    None
}

/// Walk `segments` from `root`
///
/// Returns `None` as soon as a segment is missing or the current value cannot be
/// descended into. Objects are indexed by key; arrays accept a numeric key or an
/// index, and arrays and strings expose `length`.
pub fn lookup<'a>(root: &'a JsonValue, segments: &[PathSegment]) -> Option<JsonValue> {
    let mut current: &'a JsonValue = root;

    for (position, segment) in segments.iter().enumerate() {
        let last = position + 1 == segments.len();
        current = match (current, segment) {
            (JsonValue::Object(map), PathSegment::Key(key)) => map.get(key)?,
            (JsonValue::Array(items), PathSegment::Index(index)) => items.get(*index)?,
            (JsonValue::Array(items), PathSegment::Key(key)) => {
                if key == "length" && last {
                    return Some(JsonValue::from(items.len()));
                }
                items.get(key.parse::<usize>().ok()?)?
            }
            (JsonValue::String(s), PathSegment::Key(key)) if key == "length" && last => {
                return Some(JsonValue::from(s.chars().count()));
            }
            _ => return None,
        };
    }

    Some(current.clone())
}

/// Resolve a path expression, honouring leading `!` negation
///
/// Each `!` flips the truthiness of the resolved value, so `!missing` is `true`.
/// Returns `None` for a missing (or malformed) non-negated path.
pub fn resolve_path(expr: &str, scope: &JsonValue) -> Option<JsonValue> {
    let trimmed = expr.trim();
    let body = trimmed.trim_start_matches('!');
    let negations = trimmed.len() - body.len();

    let value = parse_path(body).and_then(|segments| lookup(scope, &segments));

    if negations == 0 {
        return value;
    }

    let truthy = is_truthy_opt(value.as_ref());
    let negated = if negations % 2 == 1 { !truthy } else { truthy };
    Some(JsonValue::Bool(negated))
}
