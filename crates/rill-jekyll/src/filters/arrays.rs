// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Array and data filters from Jekyll.

use rill_liquid_core::{
    coerce_i64, to_output_string, value_to_json, Error, FilterKwargs, FilterRegistryBuilder,
    Value,
};

use super::expect_array;

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("array_to_sentence_string", array_to_sentence_string)
        .register("push", push)
        .register("pop", pop)
        .register("shift", shift)
        .register("unshift", unshift)
        .register("to_integer", to_integer)
        .register("jsonify", jsonify)
        .register("inspect", inspect);
}

/// Joins an array into an English sentence: `a, b, and c`. The connector
/// word is configurable as the first argument.
fn array_to_sentence_string(
    left: &Value,
    args: &[Value],
    _kwargs: &FilterKwargs,
) -> Result<Value, Error> {
    let items = expect_array("array_to_sentence_string", left)?;
    let connector = match args.first() {
        Some(value) => to_output_string(value)?,
        None => "and".to_string(),
    };

    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        parts.push(to_output_string(item)?);
    }
    let sentence = match parts.len() {
        0 => String::new(),
        1 => parts.remove(0),
        2 => format!("{} {connector} {}", parts[0], parts[1]),
        _ => {
            let (last, rest) = parts.split_last().expect("len checked above");
            format!("{}, {connector} {last}", rest.join(", "))
        }
    };
    Ok(Value::String(sentence))
}

fn push(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = expect_array("push", left)?;
    items.push(args.first().cloned().unwrap_or(Value::Nil));
    Ok(Value::Array(items))
}

fn pop(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = expect_array("pop", left)?;
    items.pop();
    Ok(Value::Array(items))
}

fn shift(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = expect_array("shift", left)?;
    if !items.is_empty() {
        items.remove(0);
    }
    Ok(Value::Array(items))
}

fn unshift(left: &Value, args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    let mut items = expect_array("unshift", left)?;
    items.insert(0, args.first().cloned().unwrap_or(Value::Nil));
    Ok(Value::Array(items))
}

fn to_integer(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    Ok(Value::Int(coerce_i64(left)))
}

fn jsonify(left: &Value, _args: &[Value], _kwargs: &FilterKwargs) -> Result<Value, Error> {
    serde_json::to_string(&value_to_json(left))
        .map(Value::String)
        .map_err(|err| Error::wrap("jsonify failed", Box::new(err)))
}

/// Debug representation, rendered as compact JSON like Jekyll's
/// `inspect` output for data values.
fn inspect(left: &Value, args: &[Value], kwargs: &FilterKwargs) -> Result<Value, Error> {
    jsonify(left, args, kwargs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kwargs() -> FilterKwargs {
        FilterKwargs::new()
    }

    fn strings(values: &[&str]) -> Value {
        Value::Array(values.iter().map(|s| Value::String((*s).to_string())).collect())
    }

    #[test]
    fn sentences_use_the_oxford_comma() {
        let out =
            array_to_sentence_string(&strings(&["a", "b", "c"]), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("a, b, and c".into()));

        let out = array_to_sentence_string(&strings(&["a", "b"]), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("a and b".into()));

        let out = array_to_sentence_string(&strings(&["a"]), &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("a".into()));
    }

    #[test]
    fn sentence_connector_is_configurable() {
        let out = array_to_sentence_string(
            &strings(&["x", "y"]),
            &[Value::String("or".into())],
            &kwargs(),
        )
        .unwrap();
        assert_eq!(out, Value::String("x or y".into()));
    }

    #[test]
    fn push_pop_shift_unshift() {
        let base = strings(&["b"]);
        let pushed = push(&base, &[Value::String("c".into())], &kwargs()).unwrap();
        assert_eq!(pushed, strings(&["b", "c"]));

        let popped = pop(&pushed, &[], &kwargs()).unwrap();
        assert_eq!(popped, strings(&["b"]));

        let fronted = unshift(&base, &[Value::String("a".into())], &kwargs()).unwrap();
        assert_eq!(fronted, strings(&["a", "b"]));

        let shifted = shift(&fronted, &[], &kwargs()).unwrap();
        assert_eq!(shifted, strings(&["b"]));
    }

    #[test]
    fn jsonify_round_trips_values() {
        let value = Value::Array(vec![Value::Int(1), Value::String("x".into())]);
        let out = jsonify(&value, &[], &kwargs()).unwrap();
        assert_eq!(out, Value::String("[1,\"x\"]".into()));
    }

    #[test]
    fn to_integer_truncates() {
        assert_eq!(
            to_integer(&Value::Float(3.9), &[], &kwargs()).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            to_integer(&Value::String("12".into()), &[], &kwargs()).unwrap(),
            Value::Int(12)
        );
    }
}
