// SPDX-License-Identifier: Apache-2.0 OR MIT
//! String-shaped Jekyll filters.

use heck::ToKebabCase;
use rill_liquid_core::{
    escape_html, to_output_string, Error, FilterKwargs, FilterRegistryBuilder, Value,
};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("slugify", slugify)
        .register("xml_escape", xml_escape)
        .register("cgi_escape", cgi_escape)
        .register("uri_escape", uri_escape)
        .register("normalize_whitespace", normalize_whitespace)
        .register("number_of_words", number_of_words);
}

/// Lowercased, hyphen-separated form of the input, matching Jekyll's
/// default slugify mode.
fn slugify(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    Ok(Value::String(text.to_kebab_case()))
}

fn xml_escape(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::String(escape_html(&to_output_string(left)?)))
}

/// CGI escaping: spaces become `+`, everything outside the unreserved
/// set is percent-encoded.
fn cgi_escape(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
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

/// URI escaping keeps the reserved URI characters intact so whole URLs
/// stay usable.
fn uri_escape(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    const KEEP: &[u8] = b":/?#[]@!$&'()*+,;=-_.~";
    let text = to_output_string(left)?;
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(Value::String(out))
}

fn normalize_whitespace(
    left: &Value,
    _args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    Ok(Value::String(
        text.split_whitespace().collect::<Vec<_>>().join(" "),
    ))
}

fn number_of_words(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let text = to_output_string(left)?;
    Ok(Value::Int(text.split_whitespace().count() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kwargs() -> FilterKwargs {
        FilterKwargs::new()
    }

    #[test]
    fn slugify_kebab_cases() {
        let out = slugify(&Value::String("The _Config.yml File".into()), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("the-config-yml-file".into()));
    }

    #[test]
    fn uri_escape_keeps_reserved_characters() {
        let out = uri_escape(
            &Value::String("http://example.com/a b?q=1".into()),
            &[],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(
            out,
            Value::String("http://example.com/a%20b?q=1".into())
        );
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        let out = normalize_whitespace(&Value::String("a\t b\n\nc".into()), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("a b c".into()));
    }

    #[test]
    fn number_of_words_counts() {
        let out = number_of_words(&Value::String("one two  three".into()), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::Int(3));
    }
}
