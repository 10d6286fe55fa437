// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use rill_liquid_engine::{
    coerce_i64, to_output_string, DictLoader, Environment, FilterRegistry, Mode, Value,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EngineCase {
    name: String,
    template: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    error: Option<ExpectedError>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    partials: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpectedError {
    Single(String),
    Multiple(Vec<String>),
}

impl ExpectedError {
    fn matches(&self, message: &str) -> bool {
        match self {
            ExpectedError::Single(pattern) => message.contains(pattern),
            ExpectedError::Multiple(patterns) => {
                patterns.iter().any(|pattern| message.contains(pattern))
            }
        }
    }

    fn description(&self) -> String {
        match self {
            ExpectedError::Single(pattern) => pattern.clone(),
            ExpectedError::Multiple(patterns) => patterns.join("' or '"),
        }
    }
}

/// The handful of filters the manifest relies on; the full standard set
/// lives in the core crate, which has its own suites.
fn filters() -> FilterRegistry {
    let mut builder = FilterRegistry::builder();
    builder
        .register("plus", |left, args, _| {
            let addend = args.first().map(coerce_i64).unwrap_or(0);
            Ok(Value::Int(coerce_i64(left) + addend))
        })
        .register("upcase", |left, _, _| {
            Ok(Value::String(to_output_string(left)?.to_uppercase()))
        })
        .register("join", |left, args, _| {
            let glue = match args.first() {
                Some(value) => to_output_string(value)?,
                None => " ".to_string(),
            };
            let Value::Array(items) = left else {
                return Ok(left.clone());
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(to_output_string(item)?);
            }
            Ok(Value::String(parts.join(&glue)))
        });
    builder.build()
}

fn environment_for(case: &EngineCase) -> Environment {
    let mode = match case.mode.as_deref() {
        Some("warn") => Mode::Warn,
        Some("lax") => Mode::Lax,
        _ => Mode::Strict,
    };
    let mut loader = DictLoader::default();
    for (name, source) in &case.partials {
        loader = loader.with(name.clone(), source.clone());
    }
    Environment::builder()
        .mode(mode)
        .filters(filters())
        .loader(loader)
        .build()
}

#[test]
fn engine_test_cases_match_reference_semantics() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let root = manifest_dir
        .parent()
        .expect("workspace root missing")
        .parent()
        .expect("workspace root missing");
    let path = root.join("test-cases/rill-liquid-engine.json");
    let bytes = fs::read(&path).expect("missing engine test cases");
    let cases: Vec<EngineCase> = serde_json::from_slice(&bytes).expect("invalid engine test cases");

    for case in cases {
        let env = environment_for(&case);
        let parse_result = env.parse(&case.name, &case.template);

        let template = match parse_result {
            Ok(template) => template,
            Err(err) => {
                if let Some(expected_err) = case.error.as_ref() {
                    let msg = err.to_string();
                    assert!(
                        expected_err.matches(&msg),
                        "{} expected parse error containing '{}', got '{}'",
                        case.name,
                        expected_err.description(),
                        msg
                    );
                    continue;
                }
                panic!("parse {} failed: {}", case.name, err);
            }
        };

        if let Some(expected_err) = case.error.as_ref() {
            match template.render(&case.data) {
                Ok(output) => panic!(
                    "{} expected error '{}' but rendered '{}'",
                    case.name,
                    expected_err.description(),
                    output
                ),
                Err(err) => {
                    let msg = err.to_string();
                    assert!(
                        expected_err.matches(&msg),
                        "{} expected error containing '{}', got '{}'",
                        case.name,
                        expected_err.description(),
                        msg
                    );
                }
            }
            continue;
        }

        let rendered = template
            .render(&case.data)
            .unwrap_or_else(|err| panic!("render {} failed: {}", case.name, err));
        let expected = case.expected.unwrap_or_default();
        assert_eq!(rendered, expected, "case {} mismatch", case.name);
    }
}
