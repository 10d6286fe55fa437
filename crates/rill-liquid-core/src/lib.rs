#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The standard Liquid filter set, a filesystem loader and a ready-made
//! default environment for `rill-liquid-engine`.
//!
//! Most applications only need [`default_environment`]:
//!
//! ```
//! use serde_json::json;
//!
//! let env = rill_liquid_core::default_environment();
//! let template = env.parse("t", "{{ 'liquid' | upcase }}").unwrap();
//! assert_eq!(template.render(&json!({})).unwrap(), "LIQUID");
//! ```

pub use rill_liquid_engine::{
    coerce_i64, escape_html, is_blank, is_empty, is_truthy, to_output_string, ChoiceLoader,
    DictLoader, DropObject, Environment, EnvironmentBuilder, Error, Filter, FilterKwargs,
    FilterRegistry, FilterRegistryBuilder, Limits, Loader, Mode, Object, Tag, TagRegistry,
    TagRegistryBuilder, Template, TemplateSource, Undefined, UndefinedPolicy, Value,
};

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

static STANDARD: Lazy<FilterRegistry> = Lazy::new(|| {
    let mut builder = FilterRegistryBuilder::new();
    install_standard_filters(&mut builder);
    builder.build()
});

/// Returns the frozen standard filter registry. Cloning is cheap.
pub fn standard_filters() -> FilterRegistry {
    STANDARD.clone()
}

/// An environment with the standard filters and tags installed.
pub fn default_environment() -> Environment {
    Environment::builder().filters(standard_filters()).build()
}

/// Converts parsed JSON into the engine's value model.
pub fn json_to_value(value: &serde_json::Value) -> Value {
    Value::from(value.clone())
}

/// Converts an engine value back into JSON. Drops project through their
/// `to_liquid` capability; undefined values become `null`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    value.to_json()
}

/// Installs the standard Liquid filters into an existing builder, so
/// applications can layer their own filters on top.
pub fn install_standard_filters(builder: &mut FilterRegistryBuilder) {
    builder
        .register("abs", filter_abs)
        .register("append", filter_append)
        .register("at_least", filter_at_least)
        .register("at_most", filter_at_most)
        .register("capitalize", filter_capitalize)
        .register("ceil", filter_ceil)
        .register("compact", filter_compact)
        .register("concat", filter_concat)
        .register("default", filter_default)
        .register("divided_by", filter_divided_by)
        .register("downcase", filter_downcase)
        .register("escape", filter_escape)
        .register("escape_once", filter_escape_once)
        .register("first", filter_first)
        .register("floor", filter_floor)
        .register("join", filter_join)
        .register("last", filter_last)
        .register("lstrip", filter_lstrip)
        .register("map", filter_map)
        .register("minus", filter_minus)
        .register("modulo", filter_modulo)
        .register("newline_to_br", filter_newline_to_br)
        .register("plus", filter_plus)
        .register("prepend", filter_prepend)
        .register("remove", filter_remove)
        .register("remove_first", filter_remove_first)
        .register("replace", filter_replace)
        .register("replace_first", filter_replace_first)
        .register("reverse", filter_reverse)
        .register("round", filter_round)
        .register("rstrip", filter_rstrip)
        .register("size", filter_size)
        .register("slice", filter_slice)
        .register("sort", filter_sort)
        .register("sort_natural", filter_sort_natural)
        .register("split", filter_split)
        .register("strip", filter_strip)
        .register("strip_html", filter_strip_html)
        .register("strip_newlines", filter_strip_newlines)
        .register("times", filter_times)
        .register("truncate", filter_truncate)
        .register("truncatewords", filter_truncatewords)
        .register("uniq", filter_uniq)
        .register("upcase", filter_upcase)
        .register("url_decode", filter_url_decode)
        .register("url_encode", filter_url_encode)
        .register("where", filter_where);
}

// ---------------------------------------------------------------------
// Numeric plumbing.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Liquid numeric coercion: numeric strings parse, nil and junk strings
/// coerce to zero, everything else is a value-typed failure (skipping
/// the filter).
fn to_number(value: &Value) -> Result<Num, Error> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Num::Int(i))
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Ok(Num::Float(f))
            } else {
                Ok(Num::Int(0))
            }
        }
        Value::Nil | Value::Undefined(_) => Ok(Num::Int(0)),
        other => Err(Error::filter_value(format!(
            "expected a number, found {}",
            other.type_name()
        ))),
    }
}

fn number_arg(name: &'static str, args: &[Value], index: usize) -> Result<Num, Error> {
    let value = args.get(index).ok_or_else(|| {
        Error::filter_argument(format!("{name} expects an argument at position {index}"))
    })?;
    to_number(value)
}

fn binop(left: Num, right: Num, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Value {
    match (left, right) {
        (Num::Int(a), Num::Int(b)) => Value::Int(int_op(a, b)),
        _ => Value::Float(float_op(left.as_f64(), right.as_f64())),
    }
}

fn string_arg(name: &'static str, args: &[Value], index: usize) -> Result<String, Error> {
    let value = args.get(index).ok_or_else(|| {
        Error::filter_argument(format!("{name} expects an argument at position {index}"))
    })?;
    to_output_string(value)
}

fn optional_string_arg(args: &[Value], index: usize, fallback: &str) -> Result<String, Error> {
    match args.get(index) {
        Some(value) => to_output_string(value),
        None => Ok(fallback.to_string()),
    }
}

fn array_input(value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Range(start, stop) => {
            if start > stop {
                Ok(Vec::new())
            } else {
                Ok((*start..=*stop).map(Value::Int).collect())
            }
        }
        other => Err(Error::filter_value(format!(
            "expected an array, found {}",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------
// Math filters.
// ---------------------------------------------------------------------

fn filter_abs(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(match to_number(left)? {
        Num::Int(i) => Value::Int(i.saturating_abs()),
        Num::Float(f) => Value::Float(f.abs()),
    })
}

fn filter_plus(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let right = number_arg("plus", args, 0)?;
    Ok(binop(to_number(left)?, right, i64::saturating_add, |a, b| a + b))
}

fn filter_minus(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let right = number_arg("minus", args, 0)?;
    Ok(binop(to_number(left)?, right, i64::saturating_sub, |a, b| a - b))
}

fn filter_times(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let right = number_arg("times", args, 0)?;
    Ok(binop(to_number(left)?, right, i64::saturating_mul, |a, b| a * b))
}

fn filter_divided_by(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let left = to_number(left)?;
    let right = number_arg("divided_by", args, 0)?;
    match (left, right) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                Err(Error::filter_argument("divided_by: division by zero"))
            } else {
                // Integer division floors, matching the reference engine.
                Ok(Value::Int(a.div_euclid(b)))
            }
        }
        _ => {
            let divisor = right.as_f64();
            if divisor == 0.0 {
                Err(Error::filter_argument("divided_by: division by zero"))
            } else {
                Ok(Value::Float(left.as_f64() / divisor))
            }
        }
    }
}

fn filter_modulo(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let left = to_number(left)?;
    let right = number_arg("modulo", args, 0)?;
    match (left, right) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                Err(Error::filter_argument("modulo: division by zero"))
            } else {
                Ok(Value::Int(a.rem_euclid(b)))
            }
        }
        _ => {
            let divisor = right.as_f64();
            if divisor == 0.0 {
                Err(Error::filter_argument("modulo: division by zero"))
            } else {
                Ok(Value::Float(left.as_f64() % divisor))
            }
        }
    }
}

fn filter_ceil(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(match to_number(left)? {
        Num::Int(i) => Value::Int(i),
        Num::Float(f) => Value::Int(f.ceil() as i64),
    })
}

fn filter_floor(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(match to_number(left)? {
        Num::Int(i) => Value::Int(i),
        Num::Float(f) => Value::Int(f.floor() as i64),
    })
}

fn filter_round(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let value = to_number(left)?;
    match args.first() {
        None => Ok(match value {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Int(f.round() as i64),
        }),
        Some(digits) => {
            let digits = coerce_i64(digits).clamp(0, 15) as u32;
            let factor = 10f64.powi(digits as i32);
            Ok(Value::Float((value.as_f64() * factor).round() / factor))
        }
    }
}

fn filter_at_least(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let floor = number_arg("at_least", args, 0)?;
    let value = to_number(left)?;
    Ok(if value.as_f64() < floor.as_f64() {
        floor.to_value()
    } else {
        value.to_value()
    })
}

fn filter_at_most(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let ceiling = number_arg("at_most", args, 0)?;
    let value = to_number(left)?;
    Ok(if value.as_f64() > ceiling.as_f64() {
        ceiling.to_value()
    } else {
        value.to_value()
    })
}

// ---------------------------------------------------------------------
// String filters.
// ---------------------------------------------------------------------

fn filter_append(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut text = to_output_string(left)?;
    text.push_str(&string_arg("append", args, 0)?);
    Ok(Value::String(text))
}

fn filter_prepend(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut text = string_arg("prepend", args, 0)?;
    text.push_str(&to_output_string(left)?);
    Ok(Value::String(text))
}

fn filter_capitalize(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

fn filter_upcase(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(to_output_string(left)?.to_uppercase()))
}

fn filter_downcase(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(to_output_string(left)?.to_lowercase()))
}

fn filter_strip(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(to_output_string(left)?.trim().to_string()))
}

fn filter_lstrip(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(
        to_output_string(left)?.trim_start().to_string(),
    ))
}

fn filter_rstrip(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(to_output_string(left)?.trim_end().to_string()))
}

fn filter_strip_newlines(
    left: &Value,
    _args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    Ok(Value::String(
        text.chars().filter(|c| *c != '\n' && *c != '\r').collect(),
    ))
}

fn filter_newline_to_br(
    left: &Value,
    _args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?.replace("\r\n", "\n");
    Ok(Value::String(text.replace('\n', "<br />\n")))
}

fn filter_replace(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let from = string_arg("replace", args, 0)?;
    let to = optional_string_arg(args, 1, "")?;
    Ok(Value::String(text.replace(&from, &to)))
}

fn filter_replace_first(
    left: &Value,
    args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let from = string_arg("replace_first", args, 0)?;
    let to = optional_string_arg(args, 1, "")?;
    Ok(Value::String(text.replacen(&from, &to, 1)))
}

fn filter_remove(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let target = string_arg("remove", args, 0)?;
    Ok(Value::String(text.replace(&target, "")))
}

fn filter_remove_first(
    left: &Value,
    args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let target = string_arg("remove_first", args, 0)?;
    Ok(Value::String(text.replacen(&target, "", 1)))
}

fn filter_truncate(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let length = match args.first() {
        Some(value) => coerce_i64(value).max(0) as usize,
        None => 50,
    };
    let ellipsis = optional_string_arg(args, 1, "...")?;

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= length {
        return Ok(Value::String(text));
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    let mut out: String = chars[..keep.min(chars.len())].iter().collect();
    out.push_str(&ellipsis);
    Ok(Value::String(out))
}

fn filter_truncatewords(
    left: &Value,
    args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let count = match args.first() {
        Some(value) => coerce_i64(value).max(1) as usize,
        None => 15,
    };
    let ellipsis = optional_string_arg(args, 1, "...")?;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= count {
        return Ok(Value::String(text));
    }
    let mut out = words[..count].join(" ");
    out.push_str(&ellipsis);
    Ok(Value::String(out))
}

fn filter_split(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let separator = string_arg("split", args, 0)?;
    if text.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let mut parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(separator.as_str())
            .map(|part| Value::String(part.to_string()))
            .collect()
    };
    // Trailing empty fields are dropped, as in Ruby's String#split.
    while matches!(parts.last(), Some(Value::String(s)) if s.is_empty()) {
        parts.pop();
    }
    Ok(Value::Array(parts))
}

fn filter_escape(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(escape_html(&to_output_string(left)?)))
}

fn filter_escape_once(
    left: &Value,
    _args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (index, ch) in chars.iter().enumerate() {
        match ch {
            '&' if is_entity(&chars[index..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(*other),
        }
    }
    Ok(Value::String(out))
}

/// Recognises `&name;`, `&#123;` and `&#xAF;` forms at the head of the
/// window.
fn is_entity(window: &[char]) -> bool {
    let mut index = 1;
    if window.get(index) == Some(&'#') {
        index += 1;
        if window.get(index) == Some(&'x') || window.get(index) == Some(&'X') {
            index += 1;
        }
        let digits_start = index;
        while matches!(window.get(index), Some(c) if c.is_ascii_hexdigit()) {
            index += 1;
        }
        return index > digits_start && window.get(index) == Some(&';');
    }
    let name_start = index;
    while matches!(window.get(index), Some(c) if c.is_ascii_alphanumeric()) {
        index += 1;
    }
    index > name_start && window.get(index) == Some(&';')
}

fn filter_strip_html(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            other if !in_tag => out.push(other),
            _ => {}
        }
    }
    Ok(Value::String(out))
}

fn filter_url_encode(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    Ok(Value::String(out))
}

fn filter_url_decode(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                out.push(b' ');
                index += 1;
            }
            b'%' if index + 2 < bytes.len() => {
                let hex: Option<u8> = std::str::from_utf8(&bytes[index + 1..index + 3])
                    .ok()
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok());
                match hex {
                    Some(decoded) => {
                        out.push(decoded);
                        index += 3;
                    }
                    None => {
                        out.push(b'%');
                        index += 1;
                    }
                }
            }
            other => {
                out.push(other);
                index += 1;
            }
        }
    }
    Ok(Value::String(String::from_utf8_lossy(&out).into_owned()))
}

// ---------------------------------------------------------------------
// Array filters.
// ---------------------------------------------------------------------

fn filter_join(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let items = array_input(left)?;
    let glue = optional_string_arg(args, 0, " ")?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        parts.push(to_output_string(item)?);
    }
    Ok(Value::String(parts.join(&glue)))
}

fn filter_first(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    match left {
        Value::Array(items) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map_or(Value::Nil, |c| Value::String(c.to_string()))),
        other => Err(Error::filter_value(format!(
            "expected an array or string, found {}",
            other.type_name()
        ))),
    }
}

fn filter_last(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    match left {
        Value::Array(items) => Ok(items.last().cloned().unwrap_or(Value::Nil)),
        Value::String(s) => Ok(s
            .chars()
            .next_back()
            .map_or(Value::Nil, |c| Value::String(c.to_string()))),
        other => Err(Error::filter_value(format!(
            "expected an array or string, found {}",
            other.type_name()
        ))),
    }
}

fn filter_reverse(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = array_input(left)?;
    items.reverse();
    Ok(Value::Array(items))
}

fn filter_compact(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let items = array_input(left)?;
    Ok(Value::Array(
        items
            .into_iter()
            .filter(|item| !matches!(item, Value::Nil | Value::Undefined(_)))
            .collect(),
    ))
}

fn filter_concat(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = array_input(left)?;
    match args.first() {
        Some(Value::Array(extra)) => {
            items.extend(extra.iter().cloned());
            Ok(Value::Array(items))
        }
        Some(other) => Err(Error::filter_argument(format!(
            "concat expects an array argument, found {}",
            other.type_name()
        ))),
        None => Err(Error::filter_argument("concat expects an array argument")),
    }
}

fn filter_uniq(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let items = array_input(left)?;
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    Ok(Value::Array(unique))
}

fn filter_map(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let items = array_input(left)?;
    let key = string_arg("map", args, 0)?;
    Ok(Value::Array(
        items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::Nil),
                Value::Drop(drop) => drop.liquid_get(&key).unwrap_or(Value::Nil),
                _ => Value::Nil,
            })
            .collect(),
    ))
}

fn filter_where(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let items = array_input(left)?;
    let key = string_arg("where", args, 0)?;
    let target = args.get(1).cloned();
    Ok(Value::Array(
        items
            .into_iter()
            .filter(|item| {
                let found = match item {
                    Value::Object(map) => map.get(&key).cloned(),
                    Value::Drop(drop) => drop.liquid_get(&key),
                    _ => None,
                };
                match (&target, found) {
                    (Some(expected), Some(actual)) => actual == *expected,
                    (None, Some(actual)) => is_truthy(&actual),
                    _ => false,
                }
            })
            .collect(),
    ))
}

fn sort_ordering(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => return x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.type_name().cmp(b.type_name()),
    }
}

fn filter_sort(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = array_input(left)?;
    match args.first() {
        None => items.sort_by(sort_ordering),
        Some(key) => {
            let key = to_output_string(key)?;
            items.sort_by(|a, b| {
                let left = property_of(a, &key);
                let right = property_of(b, &key);
                sort_ordering(&left, &right)
            });
        }
    }
    Ok(Value::Array(items))
}

fn filter_sort_natural(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = array_input(left)?;
    let key = match args.first() {
        Some(value) => Some(to_output_string(value)?),
        None => None,
    };
    items.sort_by(|a, b| {
        let (left, right) = match &key {
            Some(key) => (property_of(a, key), property_of(b, key)),
            None => (a.clone(), b.clone()),
        };
        match (&left, &right) {
            (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            _ => sort_ordering(&left, &right),
        }
    });
    Ok(Value::Array(items))
}

fn property_of(item: &Value, key: &str) -> Value {
    match item {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Nil),
        Value::Drop(drop) => drop.liquid_get(key).unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

fn filter_size(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::Int(match left {
        Value::String(s) => s.chars().count() as i64,
        Value::Array(items) => items.len() as i64,
        Value::Object(map) => map.len() as i64,
        Value::Range(start, stop) => {
            if start > stop {
                0
            } else {
                stop - start + 1
            }
        }
        _ => 0,
    }))
}

fn filter_slice(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let offset = match args.first() {
        Some(value) => coerce_i64(value),
        None => return Err(Error::filter_argument("slice expects an offset")),
    };
    let length = match args.get(1) {
        Some(value) => coerce_i64(value).max(0) as usize,
        None => 1,
    };

    match left {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let start = resolve_offset(offset, chars.len());
            let end = (start + length).min(chars.len());
            Ok(Value::String(chars[start.min(chars.len())..end].iter().collect()))
        }
        Value::Array(items) => {
            let start = resolve_offset(offset, items.len());
            let end = (start + length).min(items.len());
            Ok(Value::Array(items[start.min(items.len())..end].to_vec()))
        }
        other => Err(Error::filter_value(format!(
            "expected an array or string, found {}",
            other.type_name()
        ))),
    }
}

fn resolve_offset(offset: i64, len: usize) -> usize {
    if offset < 0 {
        len.saturating_sub(offset.unsigned_abs() as usize)
    } else {
        offset as usize
    }
}

// ---------------------------------------------------------------------
// Misc filters.
// ---------------------------------------------------------------------

fn filter_default(left: &Value, args: &[Value], kwargs: &FilterKwargs) -> Result<Value, Error> {
    let fallback = args.first().cloned().unwrap_or(Value::Nil);
    let allow_false = kwargs
        .get("allow_false")
        .map(is_truthy)
        .unwrap_or(false);

    let use_fallback = match left {
        Value::Nil | Value::Undefined(_) => true,
        Value::Bool(false) => !allow_false,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    Ok(if use_fallback { fallback } else { left.clone() })
}

// ---------------------------------------------------------------------
// Filesystem loader.
// ---------------------------------------------------------------------

/// Loads template sources from one or more directories, optionally
/// appending a default extension to extensionless names. Names that
/// escape the search roots are treated as not found.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    search_paths: Vec<PathBuf>,
    extension: Option<String>,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![root.into()],
            extension: None,
        }
    }

    pub fn with_search_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths: paths,
            extension: None,
        }
    }

    /// Appends `extension` (e.g. `"liquid"`) to names without one.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    fn candidate(&self, base: &Path, name: &str) -> PathBuf {
        let mut path = base.join(name);
        if path.extension().is_none() {
            if let Some(ext) = &self.extension {
                path.set_extension(ext);
            }
        }
        path
    }
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<TemplateSource, Error> {
        if name.split(['/', '\\']).any(|part| part == "..") {
            return Err(Error::template_not_found(name));
        }
        for base in &self.search_paths {
            let path = self.candidate(base, name);
            if path.is_file() {
                let source = std::fs::read_to_string(&path).map_err(|err| {
                    Error::wrap(
                        format!("failed to read template '{}'", path.display()),
                        Box::new(err),
                    )
                })?;
                return Ok(TemplateSource::new(source, name));
            }
        }
        Err(Error::template_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kwargs() -> FilterKwargs {
        FilterKwargs::new()
    }

    #[test]
    fn integer_division_floors() {
        let out = filter_divided_by(&Value::Int(7), &[Value::Int(2)], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(3));

        let out = filter_divided_by(&Value::Int(7), &[Value::Float(2.0)], &kwargs()).unwrap();
        assert_eq!(out, Value::Float(3.5));

        assert!(filter_divided_by(&Value::Int(1), &[Value::Int(0)], &kwargs()).is_err());
    }

    #[test]
    fn numeric_strings_coerce() {
        let out = filter_plus(&Value::String("4".into()), &[Value::Int(3)], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(7));

        let out = filter_plus(&Value::String("oops".into()), &[Value::Int(3)], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn round_with_digits_keeps_floats() {
        let out = filter_round(&Value::Float(3.14159), &[Value::Int(2)], &kwargs()).unwrap();
        assert_eq!(out, Value::Float(3.14));

        let out = filter_round(&Value::Float(2.7), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn truncate_counts_the_ellipsis() {
        let out = filter_truncate(
            &Value::String("Ground control to Major Tom.".into()),
            &[Value::Int(20)],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("Ground control to...".into()));
    }

    #[test]
    fn truncatewords_joins_with_single_spaces() {
        let out = filter_truncatewords(
            &Value::String("one  two\tthree four".into()),
            &[Value::Int(3)],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("one two three...".into()));
    }

    #[test]
    fn split_drops_trailing_empties() {
        let out = filter_split(
            &Value::String("a,b,,".into()),
            &[Value::String(",".into())],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(
            out,
            Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
            ])
        );
    }

    #[test]
    fn split_empty_separator_splits_chars() {
        let out = filter_split(
            &Value::String("abc".into()),
            &[Value::String(String::new())],
            &kwargs(),
        )
        .unwrap();
        let Value::Array(items) = out else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn escape_once_leaves_existing_entities() {
        let out = filter_escape_once(
            &Value::String("&lt;p&gt; & <p>".into()),
            &[],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("&lt;p&gt; &amp; &lt;p&gt;".into()));
    }

    #[test]
    fn strip_html_removes_tags() {
        let out = filter_strip_html(
            &Value::String("<b>bold</b> and <i>italic</i>".into()),
            &[],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("bold and italic".into()));
    }

    #[test]
    fn url_round_trip() {
        let encoded =
            filter_url_encode(&Value::String("a b&c=d".into()), &[], &kwargs()).unwrap();
        assert_eq!(encoded, Value::String("a+b%26c%3Dd".into()));

        let decoded = filter_url_decode(&encoded, &[], &kwargs()).unwrap();
        assert_eq!(decoded, Value::String("a b&c=d".into()));
    }

    #[test]
    fn where_filters_by_property() {
        let items = Value::Array(vec![
            serde_json::json!({"title": "a", "featured": true}).into(),
            serde_json::json!({"title": "b", "featured": false}).into(),
            serde_json::json!({"title": "c", "featured": true}).into(),
        ]);
        let out = filter_where(&items, &[Value::String("featured".into())], &kwargs()).unwrap();
        let Value::Array(found) = out else {
            panic!("expected array");
        };
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn sort_orders_numbers_before_strings() {
        let items = Value::Array(vec![
            Value::String("b".into()),
            Value::Int(2),
            Value::String("a".into()),
            Value::Int(1),
        ]);
        let out = filter_sort(&items, &[], &kwargs()).unwrap();
        assert_eq!(
            out,
            Value::Array(vec![
                Value::Int(1),
                Value::Int(2),
                Value::String("a".into()),
                Value::String("b".into()),
            ])
        );
    }

    #[test]
    fn default_respects_allow_false() {
        let mut kw = FilterKwargs::new();
        kw.insert("allow_false".into(), Value::Bool(true));
        let out = filter_default(&Value::Bool(false), &[Value::Int(9)], &kw).unwrap();
        assert_eq!(out, Value::Bool(false));

        let out = filter_default(&Value::Bool(false), &[Value::Int(9)], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(9));
    }

    #[test]
    fn slice_handles_negative_offsets() {
        let out = filter_slice(
            &Value::String("Liquid".into()),
            &[Value::Int(-3), Value::Int(2)],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("ui".into()));
    }
}
