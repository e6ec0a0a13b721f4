//! Filter pipeline
//!
//! Filters are pure value transforms applied with `value | name(arg, ...)`. The
//! registry is shared (cloning it shares the table), so filters registered at
//! runtime are visible to every resolver holding it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use serde_json::Value as JsonValue;

use super::errors::ResolveError;
use super::filter_args::parse_args;
use super::value::{is_truthy, number_value, to_display_string, type_name};

/// Signature of a filter: the piped value plus literal arguments
pub type FilterFn = Arc<dyn Fn(&JsonValue, &[JsonValue]) -> Result<JsonValue> + Send + Sync>;

/// A parsed `name(args)` pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<JsonValue>,
}

impl FilterCall {
    /// Parse one pipeline stage such as `upper` or `join(", ")`
    pub fn parse(source: &str) -> Result<Self, ResolveError> {
        let source = source.trim();
        let syntax = |reason: &str| ResolveError::FilterSyntax {
            filter: source.to_string(),
            reason: reason.to_string(),
        };

        let name_end = source
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(source.len());
        let name = &source[..name_end];

        if name.is_empty() {
            return Err(syntax("missing filter name"));
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(syntax("filter names cannot start with a digit"));
        }

        let rest = source[name_end..].trim_start();
        if rest.is_empty() {
            return Ok(Self {
                name: name.to_string(),
                args: Vec::new(),
            });
        }

        if !rest.starts_with('(') {
            return Err(syntax("expected '(' after filter name"));
        }
        if !rest.ends_with(')') || rest.len() < 2 {
            return Err(syntax("unclosed argument list"));
        }

        let args = parse_args(&rest[1..rest.len() - 1]).map_err(|reason| syntax(reason.as_str()))?;
        Ok(Self {
            name: name.to_string(),
            args,
        })
    }
}

/// Registry of named filters
#[derive(Clone)]
pub struct FilterRegistry {
    filters: Arc<RwLock<HashMap<String, FilterFn>>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FilterRegistry {
    /// Create a registry with no filters
    pub fn empty() -> Self {
        Self {
            filters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a registry preloaded with the built-in filters
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        register_builtins(&registry);
        registry
    }

    /// Register (or replace) a filter
    pub fn register<F>(&self, name: impl Into<String>, filter: F)
    where
        F: Fn(&JsonValue, &[JsonValue]) -> Result<JsonValue> + Send + Sync + 'static,
    {
        let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
        filters.insert(name.into(), Arc::new(filter));
    }

    /// Check whether a filter is registered
    pub fn contains(&self, name: &str) -> bool {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        filters.contains_key(name)
    }

    /// Registered filter names, sorted
    pub fn names(&self) -> Vec<String> {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = filters.keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Option<FilterFn> {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        filters.get(name).cloned()
    }

    /// Apply a chain of parsed filter calls, left to right
    pub fn apply(&self, value: JsonValue, chain: &[FilterCall]) -> Result<JsonValue, ResolveError> {
        chain.iter().try_fold(value, |current, call| {
            let filter = self
                .get(&call.name)
                .ok_or_else(|| ResolveError::UnknownFilter(call.name.clone()))?;
            filter(&current, &call.args).map_err(|source| ResolveError::FilterFailed {
                filter: call.name.clone(),
                source,
            })
        })
    }

    /// Parse and apply a chain of filter sources such as `["trim", "split(',')"]`
    pub fn apply_sources(&self, value: JsonValue, chain: &[&str]) -> Result<JsonValue, ResolveError> {
        let calls = chain
            .iter()
            .map(|source| FilterCall::parse(source))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply(value, &calls)
    }
}

/* ===================== Built-in filters ===================== */

fn register_builtins(registry: &FilterRegistry) {
    // Strings
    registry.register("upper", |v, _| map_string(v, |s| s.to_uppercase()));
    registry.register("lower", |v, _| map_string(v, |s| s.to_lowercase()));
    registry.register("trim", |v, _| map_string(v, |s| s.trim().to_string()));
    registry.register("capitalize", |v, _| map_string(v, capitalize));
    registry.register("split", split);
    registry.register("join", join);
    registry.register("length", length);

    // Arrays
    registry.register("first", |v, _| Ok(first_or_last(v, true)));
    registry.register("last", |v, _| Ok(first_or_last(v, false)));
    registry.register("slice", slice);
    registry.register("reverse", reverse);
    registry.register("sort", sort);

    // Numbers
    registry.register("abs", |v, _| map_number(v, f64::abs));
    registry.register("floor", |v, _| map_number(v, f64::floor));
    registry.register("ceil", |v, _| map_number(v, f64::ceil));
    registry.register("round", round);

    // Type coercion
    registry.register("string", |v, _| Ok(JsonValue::String(to_display_string(v))));
    registry.register("number", |v, _| Ok(to_number(v)));
    registry.register("boolean", |v, _| Ok(JsonValue::Bool(is_truthy(v))));

    // Objects
    registry.register("keys", |v, _| match v {
        JsonValue::Object(map) => Ok(JsonValue::Array(
            map.keys().cloned().map(JsonValue::String).collect(),
        )),
        JsonValue::Array(items) => Ok(JsonValue::Array(
            (0..items.len()).map(|i| JsonValue::String(i.to_string())).collect(),
        )),
        other => bail!("keys expects an object, got {}", type_name(other)),
    });
    registry.register("values", |v, _| match v {
        JsonValue::Object(map) => Ok(JsonValue::Array(map.values().cloned().collect())),
        JsonValue::Array(items) => Ok(JsonValue::Array(items.clone())),
        other => bail!("values expects an object, got {}", type_name(other)),
    });

    // Utility
    registry.register("default", |v, args| {
        let fallback = args.first().cloned().unwrap_or(JsonValue::Null);
        Ok(match v {
            JsonValue::Null => fallback,
            JsonValue::String(s) if s.is_empty() => fallback,
            other => other.clone(),
        })
    });
    registry.register("json", |v, args| {
        let pretty = args.first().map(is_truthy).unwrap_or(false);
        let text = if pretty {
            serde_json::to_string_pretty(v)?
        } else {
            serde_json::to_string(v)?
        };
        Ok(JsonValue::String(text))
    });
}

fn map_string(value: &JsonValue, f: impl Fn(&str) -> String) -> Result<JsonValue> {
    match value {
        JsonValue::Null => Ok(JsonValue::Null),
        JsonValue::String(s) => Ok(JsonValue::String(f(s))),
        other => Ok(JsonValue::String(f(&to_display_string(other)))),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn string_arg(args: &[JsonValue], index: usize, default: &str) -> String {
    args.get(index)
        .map(to_display_string)
        .unwrap_or_else(|| default.to_string())
}

fn split(value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
    let text = match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => return Ok(JsonValue::Array(Vec::new())),
        other => to_display_string(other),
    };
    let separator = string_arg(args, 0, ",");
    let parts: Vec<JsonValue> = if separator.is_empty() {
        text.chars().map(|c| JsonValue::String(c.to_string())).collect()
    } else {
        text.split(separator.as_str())
            .map(|part| JsonValue::String(part.to_string()))
            .collect()
    };
    Ok(JsonValue::Array(parts))
}

fn join(value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
    let separator = string_arg(args, 0, ",");
    match value {
        JsonValue::Array(items) => Ok(JsonValue::String(
            items
                .iter()
                .map(|item| match item {
                    JsonValue::Null => String::new(),
                    other => to_display_string(other),
                })
                .collect::<Vec<_>>()
                .join(&separator),
        )),
        JsonValue::String(s) => Ok(JsonValue::String(s.clone())),
        other => bail!("join expects an array, got {}", type_name(other)),
    }
}

fn length(value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
    let len = match value {
        JsonValue::String(s) => s.chars().count(),
        JsonValue::Array(items) => items.len(),
        JsonValue::Object(map) => map.len(),
        JsonValue::Null => 0,
        other => bail!("length is not defined for {}", type_name(other)),
    };
    Ok(JsonValue::from(len))
}

fn first_or_last(value: &JsonValue, first: bool) -> JsonValue {
    match value {
        JsonValue::Array(items) => {
            let item = if first { items.first() } else { items.last() };
            item.cloned().unwrap_or(JsonValue::Null)
        }
        JsonValue::String(s) => {
            let c = if first { s.chars().next() } else { s.chars().last() };
            c.map(|c| JsonValue::String(c.to_string()))
                .unwrap_or(JsonValue::Null)
        }
        _ => JsonValue::Null,
    }
}

/// Normalize a possibly negative index against `len`
fn clamp_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

fn int_arg(args: &[JsonValue], index: usize) -> Result<Option<i64>> {
    match args.get(index) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|f| Some(f.trunc() as i64))
            .ok_or_else(|| anyhow!("expected a numeric argument, got {}", type_name(v))),
    }
}

fn slice(value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
    let start = int_arg(args, 0)?.unwrap_or(0);
    let end = int_arg(args, 1)?;

    match value {
        JsonValue::Array(items) => {
            let from = clamp_index(start, items.len());
            let to = end.map(|e| clamp_index(e, items.len())).unwrap_or(items.len());
            Ok(JsonValue::Array(
                items.get(from..to.max(from)).map(<[_]>::to_vec).unwrap_or_default(),
            ))
        }
        JsonValue::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let from = clamp_index(start, chars.len());
            let to = end.map(|e| clamp_index(e, chars.len())).unwrap_or(chars.len());
            Ok(JsonValue::String(
                chars.get(from..to.max(from)).map(|c| c.iter().collect()).unwrap_or_default(),
            ))
        }
        other => bail!("slice expects an array or string, got {}", type_name(other)),
    }
}

fn reverse(value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
    match value {
        JsonValue::Array(items) => Ok(JsonValue::Array(items.iter().rev().cloned().collect())),
        JsonValue::String(s) => Ok(JsonValue::String(s.chars().rev().collect())),
        other => bail!("reverse expects an array or string, got {}", type_name(other)),
    }
}

fn sort(value: &JsonValue, _args: &[JsonValue]) -> Result<JsonValue> {
    let JsonValue::Array(items) = value else {
        bail!("sort expects an array, got {}", type_name(value));
    };

    let mut sorted = items.clone();
    if sorted.iter().all(JsonValue::is_number) {
        sorted.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        sorted.sort_by_key(to_display_string);
    }
    Ok(JsonValue::Array(sorted))
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn map_number(value: &JsonValue, f: impl Fn(f64) -> f64) -> Result<JsonValue> {
    let n = as_number(value)
        .ok_or_else(|| anyhow!("expected a number, got {}", type_name(value)))?;
    Ok(number_value(f(n)))
}

fn round(value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue> {
    let digits = int_arg(args, 0)?.unwrap_or(0).clamp(0, 15) as i32;
    let factor = 10f64.powi(digits);
    map_number(value, |n| (n * factor).round() / factor)
}

fn to_number(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => JsonValue::from(0),
        JsonValue::String(s) if s.trim().is_empty() => JsonValue::from(0),
        other => as_number(other).map(number_value).unwrap_or(JsonValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(value: JsonValue, chain: &[&str]) -> JsonValue {
        FilterRegistry::with_builtins()
            .apply_sources(value, chain)
            .expect("filter chain failed")
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(apply(json!("  Hello "), &["trim", "upper"]), json!("HELLO"));
        assert_eq!(apply(json!("MiXeD"), &["lower"]), json!("mixed"));
        assert_eq!(apply(json!("word"), &["capitalize"]), json!("Word"));
        assert_eq!(apply(json!("a,b,c"), &["split"]), json!(["a", "b", "c"]));
        assert_eq!(apply(json!("a - b"), &["split(' - ')"]), json!(["a", "b"]));
        assert_eq!(apply(json!(["a", "b"]), &["join(\" | \")"]), json!("a | b"));
        assert_eq!(apply(json!("héllo"), &["length"]), json!(5));
    }

    #[test]
    fn test_array_filters() {
        assert_eq!(apply(json!([3, 1, 2]), &["first"]), json!(3));
        assert_eq!(apply(json!([3, 1, 2]), &["last"]), json!(2));
        assert_eq!(apply(json!([3, 1, 2]), &["sort"]), json!([1, 2, 3]));
        assert_eq!(apply(json!(["b", "a"]), &["sort"]), json!(["a", "b"]));
        assert_eq!(apply(json!([1, 2, 3]), &["reverse"]), json!([3, 2, 1]));
        assert_eq!(apply(json!([1, 2, 3, 4]), &["slice(1, 3)"]), json!([2, 3]));
        assert_eq!(apply(json!([1, 2, 3, 4]), &["slice(-2)"]), json!([3, 4]));
        assert_eq!(apply(json!("abcdef"), &["slice(0, 3)"]), json!("abc"));
        assert_eq!(apply(json!([]), &["first"]), json!(null));
    }

    #[test]
    fn test_numeric_filters() {
        assert_eq!(apply(json!(-4), &["abs"]), json!(4));
        assert_eq!(apply(json!(2.6), &["floor"]), json!(2));
        assert_eq!(apply(json!(2.1), &["ceil"]), json!(3));
        assert_eq!(apply(json!(2.5), &["round"]), json!(3));
        assert_eq!(apply(json!(3.14159), &["round(2)"]), json!(3.14));
    }

    #[test]
    fn test_coercion_filters() {
        assert_eq!(apply(json!(42), &["string"]), json!("42"));
        assert_eq!(apply(json!(" 7 "), &["number"]), json!(7));
        assert_eq!(apply(json!("abc"), &["number"]), json!(null));
        assert_eq!(apply(json!(""), &["boolean"]), json!(false));
        assert_eq!(apply(json!("x"), &["boolean"]), json!(true));
    }

    #[test]
    fn test_object_and_utility_filters() {
        assert_eq!(apply(json!({"b": 1, "a": 2}), &["keys"]), json!(["b", "a"]));
        assert_eq!(apply(json!({"b": 1, "a": 2}), &["values"]), json!([1, 2]));
        assert_eq!(apply(json!(null), &["default('none')"]), json!("none"));
        assert_eq!(apply(json!(0), &["default('none')"]), json!(0));
        assert_eq!(apply(json!({"a": [1]}), &["json"]), json!(r#"{"a":[1]}"#));
    }

    #[test]
    fn test_unknown_filter_is_an_error() {
        let registry = FilterRegistry::with_builtins();
        let err = registry.apply_sources(json!("x"), &["shout"]).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownFilter(ref name) if name == "shout"));
    }

    #[test]
    fn test_malformed_filter_syntax() {
        assert!(matches!(
            FilterCall::parse("join(','"),
            Err(ResolveError::FilterSyntax { .. })
        ));
        assert!(matches!(
            FilterCall::parse("join ','"),
            Err(ResolveError::FilterSyntax { .. })
        ));
        assert!(matches!(
            FilterCall::parse("slice(start)"),
            Err(ResolveError::FilterSyntax { .. })
        ));
        assert!(matches!(FilterCall::parse(""), Err(ResolveError::FilterSyntax { .. })));
    }

    #[test]
    fn test_failing_filter_reports_name() {
        let registry = FilterRegistry::with_builtins();
        let err = registry.apply_sources(json!("x"), &["sort"]).unwrap_err();
        assert!(matches!(err, ResolveError::FilterFailed { ref filter, .. } if filter == "sort"));
    }

    #[test]
    fn test_runtime_registration_is_shared() {
        let registry = FilterRegistry::with_builtins();
        let shared = registry.clone();
        registry.register("double", |v, _| {
            let n = v.as_f64().ok_or_else(|| anyhow!("not a number"))?;
            Ok(number_value(n * 2.0))
        });

        assert!(shared.contains("double"));
        assert_eq!(shared.apply_sources(json!(21), &["double"]).unwrap(), json!(42));
    }
}
