//! Tokenizer for filter argument lists
//!
//! Arguments are literals only: quoted strings (single or double quotes, with
//! backslash escapes), integers and floats, `true`, `false` and `null`. Nothing
//! inside the parentheses is evaluated.

use serde_json::Value as JsonValue;

/// Parse the text between a filter's parentheses into literal values
pub fn parse_args(source: &str) -> Result<Vec<JsonValue>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut args = Vec::new();
    let mut pos = skip_whitespace(&chars, 0);

    if pos == chars.len() {
        return Ok(args);
    }

    loop {
        let (value, next) = parse_literal(&chars, pos)?;
        args.push(value);
        pos = skip_whitespace(&chars, next);

        match chars.get(pos) {
            None => return Ok(args),
            Some(',') => {
                pos = skip_whitespace(&chars, pos + 1);
                if pos == chars.len() {
                    return Err("trailing comma in filter arguments".to_string());
                }
            }
            Some(c) => return Err(format!("unexpected '{}' in filter arguments", c)),
        }
    }
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

fn parse_literal(chars: &[char], pos: usize) -> Result<(JsonValue, usize), String> {
    match chars[pos] {
        quote @ ('"' | '\'') => parse_quoted(chars, pos, quote),
        c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => parse_number(chars, pos),
        c if c.is_ascii_alphabetic() => parse_keyword(chars, pos),
        c => Err(format!("unexpected '{}' in filter arguments", c)),
    }
}

fn parse_quoted(chars: &[char], start: usize, quote: char) -> Result<(JsonValue, usize), String> {
    let mut out = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| "unterminated escape in filter argument".to_string())?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                pos += 2;
            }
            c if c == quote => return Ok((JsonValue::String(out), pos + 1)),
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    Err("unterminated string in filter arguments".to_string())
}

fn parse_number(chars: &[char], start: usize) -> Result<(JsonValue, usize), String> {
    let mut end = start;
    while end < chars.len()
        && (chars[end].is_ascii_digit() || matches!(chars[end], '-' | '+' | '.' | 'e' | 'E'))
    {
        end += 1;
    }
    let text: String = chars[start..end].iter().collect();

    if let Ok(i) = text.parse::<i64>() {
        return Ok((JsonValue::from(i), end));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            let number = serde_json::Number::from_f64(f)
                .ok_or_else(|| format!("invalid number '{}'", text))?;
            Ok((JsonValue::Number(number), end))
        }
        _ => Err(format!("invalid number '{}' in filter arguments", text)),
    }
}

fn parse_keyword(chars: &[char], start: usize) -> Result<(JsonValue, usize), String> {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    let word: String = chars[start..end].iter().collect();

    let value = match word.as_str() {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        "null" => JsonValue::Null,
        _ => {
            return Err(format!(
                "'{}' is not a literal; filter arguments must be quoted strings, numbers or booleans",
                word
            ))
        }
    };
    Ok((value, end))
}
