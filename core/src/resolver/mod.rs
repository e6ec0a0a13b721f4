//! Interpolation resolver
//!
//! Resolves template values against a flattened resolution scope. Arrays and
//! objects are resolved element by element (object key order is preserved),
//! strings are scanned for `${expr}` / `{{expr}}` wrappers, and every other value
//! passes through unchanged.
//!
//! A string that is exactly one wrapper keeps the native type of the resolved
//! value. Wrappers embedded in literal text are replaced by their string form,
//! and a wrapper that resolves to undefined is left in the output verbatim.

pub mod condition;
pub mod errors;
pub mod expression;
pub mod filter_args;
pub mod filters;
pub mod path;
pub mod value;


use serde_json::Value as JsonValue;

pub use errors::ResolveError;
pub use filters::{FilterCall, FilterFn, FilterRegistry};
pub use value::{is_truthy, to_display_string};

/// Template resolver bound to a filter registry
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    filters: FilterRegistry,
}

impl Resolver {
    pub fn new(filters: FilterRegistry) -> Self {
        Self { filters }
    }

    /// The registry used by filter pipelines (shared, open for registration)
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Resolve a template, mapping undefined to `null`
    pub fn resolve(&self, template: &JsonValue, scope: &JsonValue) -> Result<JsonValue, ResolveError> {
        Ok(self.resolve_optional(template, scope)?.unwrap_or(JsonValue::Null))
    }

    /// Resolve a template, returning `None` when it is a single wrapper that
    /// resolves to undefined
    pub fn resolve_optional(
        &self,
        template: &JsonValue,
        scope: &JsonValue,
    ) -> Result<Option<JsonValue>, ResolveError> {
        match template {
            JsonValue::String(text) => self.resolve_string(text, scope),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Some(JsonValue::Array(items))),
            JsonValue::Object(fields) => {
                let mut resolved = serde_json::Map::with_capacity(fields.len());
                for (key, value) in fields {
                    resolved.insert(key.clone(), self.resolve(value, scope)?);
                }
                Ok(Some(JsonValue::Object(resolved)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    /// Evaluate a bare expression (no wrapper)
    pub fn evaluate(&self, expr: &str, scope: &JsonValue) -> Result<Option<JsonValue>, ResolveError> {
        expression::evaluate(expr, scope, &self.filters)
    }

    /// Evaluate a guard or loop condition to a boolean
    ///
    /// Booleans pass through. Anything else is resolved first; a resolved string
    /// that is not a boolean is handed to the closed condition grammar, where any
    /// failure counts as `false`. Other values are judged by truthiness.
    pub fn evaluate_guard(&self, guard: &JsonValue, scope: &JsonValue) -> Result<bool, ResolveError> {
        if let JsonValue::Bool(b) = guard {
            return Ok(*b);
        }

        Ok(match self.resolve_optional(guard, scope)? {
            Some(JsonValue::Bool(b)) => b,
            Some(JsonValue::String(text)) => condition::evaluate_or_false(&text, scope),
            other => value::is_truthy_opt(other.as_ref()),
        })
    }

    fn resolve_string(&self, text: &str, scope: &JsonValue) -> Result<Option<JsonValue>, ResolveError> {
        let segments = scan_template(text);

        if let [Segment::Expr { expr, .. }] = segments.as_slice() {
            return self.evaluate(expr, scope);
        }

        if !segments.iter().any(|s| matches!(s, Segment::Expr { .. })) {
            return Ok(Some(JsonValue::String(text.to_string())));
        }

        let mut out = String::with_capacity(text.len());
        for segment in segments {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Expr { raw, expr } => match self.evaluate(expr, scope)? {
                    Some(value) => out.push_str(&to_display_string(&value)),
                    None => out.push_str(raw),
                },
            }
        }
        Ok(Some(JsonValue::String(out)))
    }
}

/* ===================== Template scanning ===================== */

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    /// `raw` is the whole wrapper, `expr` the text inside it
    Expr { raw: &'a str, expr: &'a str },
}

/// Split a string into literal text and `${...}` / `{{...}}` occurrences
///
/// Closing delimiters inside quoted strings are ignored; an unterminated
/// wrapper is kept as literal text.
fn scan_template(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        let opener = match (bytes[i], bytes[i + 1]) {
            (b'$', b'{') => Some(false),
            (b'{', b'{') => Some(true),
            _ => None,
        };

        let Some(double) = opener else {
            i += 1;
            continue;
        };

        match find_close(bytes, i + 2, double) {
            Some(close) => {
                if literal_start < i {
                    segments.push(Segment::Literal(&text[literal_start..i]));
                }
                let width = if double { 2 } else { 1 };
                segments.push(Segment::Expr {
                    raw: &text[i..close + width],
                    expr: &text[i + 2..close],
                });
                i = close + width;
                literal_start = i;
            }
            None => i += 1,
        }
    }

    if literal_start < text.len() {
        segments.push(Segment::Literal(&text[literal_start..]));
    }
    segments
}

/// Offset of the closing `}` (or `}}`) for a wrapper whose body starts at `start`
fn find_close(bytes: &[u8], start: usize, double: bool) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'"' | b'\'' => quote = Some(b),
            b'{' => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b'}' if !double => return Some(i),
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }

    None
}
