// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Behavioural parity suite: the invariants templates can rely on,
//! exercised through the public API.

use rill_liquid_engine::{
    coerce_i64, to_output_string, DictLoader, Environment, Error, FilterRegistry, Mode,
    UndefinedPolicy, Value,
};
use serde_json::json;

fn filters() -> FilterRegistry {
    let mut builder = FilterRegistry::builder();
    builder
        .register("plus", |left, args, _| {
            let addend = args.first().map(coerce_i64).unwrap_or(0);
            Ok(Value::Int(coerce_i64(left) + addend))
        })
        .register("times", |left, args, _| {
            let factor = args.first().map(coerce_i64).unwrap_or(1);
            Ok(Value::Int(coerce_i64(left) * factor))
        })
        .register("default", |left, args, _| {
            let fallback = args.first().cloned().unwrap_or(Value::Nil);
            let use_fallback = matches!(
                left,
                Value::Nil | Value::Undefined(_) | Value::Bool(false)
            ) || matches!(left, Value::String(s) if s.is_empty());
            Ok(if use_fallback { fallback } else { left.clone() })
        })
        .register("newline_to_br", |left, _, _| {
            Ok(Value::String(
                to_output_string(left)?.replace('\n', "<br />\n"),
            ))
        });
    builder.build()
}

#[test]
fn tag_free_templates_render_as_themselves() {
    let source = "line one\n\tline two <em>markup</em> & more\n";
    let env = Environment::builder().build();
    let template = env.parse("roundtrip", source).unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), source);
}

#[test]
fn repeated_renders_are_deterministic() {
    let env = Environment::builder().build();
    let template = env
        .parse(
            "det",
            "{% cycle 'a','b' %}{% cycle 'a','b' %}-{% for i in xs %}{{ i }}{% endfor %}",
        )
        .unwrap();
    let data = json!({"xs": [1, 2, 3]});
    let first = template.render(&data).unwrap();
    let second = template.render(&data).unwrap();
    // Cycle counters reset between renders; output is identical.
    assert_eq!(first, "ab-123");
    assert_eq!(first, second);
}

#[test]
fn filter_chains_apply_left_to_right() {
    let env = Environment::builder().filters(filters()).build();
    let chained = env.parse("chain", "{{ 2 | plus: 3 | times: 4 }}").unwrap();
    let staged = env
        .parse("staged", "{% assign t = 2 | plus: 3 %}{{ t | times: 4 }}")
        .unwrap();
    assert_eq!(
        chained.render(&json!({})).unwrap(),
        staged.render(&json!({})).unwrap()
    );
    assert_eq!(chained.render(&json!({})).unwrap(), "20");
}

#[test]
fn assign_inside_for_leaks_to_the_enclosing_template() {
    let env = Environment::builder().build();
    let template = env
        .parse(
            "leak",
            "{% for i in (1..3) %}{% assign last = i %}{% endfor %}{{ last }}",
        )
        .unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "3");
}

#[test]
fn loop_variables_do_not_leak() {
    let env = Environment::builder().build();
    let template = env
        .parse("noleak", "{% for i in (1..3) %}{% endfor %}[{{ i }}]")
        .unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "[]");
}

#[test]
fn include_reads_outer_variables_render_does_not() {
    let env = Environment::builder()
        .loader(DictLoader::default().with("probe", "<{{ secret }}>"))
        .build();

    let include = env.parse("i", "{% include 'probe' %}").unwrap();
    assert_eq!(
        include.render(&json!({"secret": "s"})).unwrap(),
        "<s>"
    );

    let render = env.parse("r", "{% render 'probe' %}").unwrap();
    assert_eq!(render.render(&json!({"secret": "s"})).unwrap(), "<>");
}

#[test]
fn variables_assigned_in_render_stay_invisible() {
    let env = Environment::builder()
        .loader(DictLoader::default().with("setter", "{% assign inner = 'x' %}"))
        .build();
    let template = env
        .parse("t", "{% render 'setter' %}[{{ inner }}]")
        .unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "[]");
}

#[test]
fn blank_matches_empty_collections_and_whitespace() {
    let env = Environment::builder().build();
    let template = env
        .parse(
            "blank",
            "{% if a == blank %}1{% endif %}{% if b == blank %}2{% endif %}{% if c == blank %}3{% endif %}",
        )
        .unwrap();
    let output = template
        .render(&json!({"a": " \t ", "b": [], "c": {}}))
        .unwrap();
    assert_eq!(output, "123");
}

#[test]
fn empty_does_not_match_whitespace() {
    let env = Environment::builder().build();
    let template = env
        .parse("empty", "{% if a == empty %}yes{% else %}no{% endif %}")
        .unwrap();
    assert_eq!(template.render(&json!({"a": " "})).unwrap(), "no");
    assert_eq!(template.render(&json!({"a": ""})).unwrap(), "yes");
}

#[test]
fn descending_ranges_yield_nothing() {
    let env = Environment::builder().build();
    let template = env
        .parse("desc", "[{% for i in (5..1) %}{{ i }}{% endfor %}]")
        .unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "[]");
}

#[test]
fn continue_offset_iterates_a_prefix_exactly_once() {
    let env = Environment::builder().build();
    let template = env
        .parse(
            "cont",
            "{% for i in arr limit:2 %}{{ i }}{% endfor %}{% for i in arr limit:2 offset:continue %}{{ i }}{% endfor %}",
        )
        .unwrap();
    assert_eq!(
        template.render(&json!({"arr": [1, 2, 3, 4, 5]})).unwrap(),
        "1234"
    );
}

#[test]
fn unknown_tags_follow_the_mode_contract() {
    let lax = Environment::builder().mode(Mode::Lax).build();
    let template = lax.parse("lax", "{% nosuch %}").unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "");

    let strict = Environment::builder().mode(Mode::Strict).build();
    let err = strict.parse("strict", "{% nosuch %}").unwrap_err();
    assert!(matches!(err, Error::Syntax { .. }));
}

#[test]
fn warn_mode_collects_warnings_and_keeps_rendering() {
    let env = Environment::builder()
        .mode(Mode::Warn)
        .undefined(UndefinedPolicy::Strict)
        .build();
    let template = env.parse("warn", "a{{ missing }}b").unwrap();
    let (output, warnings) = template.render_with_warnings(&json!({})).unwrap();
    assert_eq!(output, "ab");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("missing"));
}

#[test]
fn strict_undefined_raises_on_use() {
    let env = Environment::builder()
        .undefined(UndefinedPolicy::Strict)
        .build();
    let template = env.parse("strict", "{{ nope }}").unwrap();
    let err = template.render(&json!({})).unwrap_err();
    assert!(matches!(err, Error::Undefined { .. }));
}

#[test]
fn strict_default_permits_the_default_filter_only() {
    let env = Environment::builder()
        .undefined(UndefinedPolicy::StrictDefault)
        .filters(filters())
        .build();

    let with_default = env
        .parse("ok", "{{ nope | default: 'fallback' }}")
        .unwrap();
    assert_eq!(with_default.render(&json!({})).unwrap(), "fallback");

    let bare = env.parse("bare", "{{ nope }}").unwrap();
    assert!(matches!(
        bare.render(&json!({})).unwrap_err(),
        Error::Undefined { .. }
    ));
}

#[test]
fn debug_undefined_names_the_path() {
    let env = Environment::builder()
        .undefined(UndefinedPolicy::Debug)
        .build();
    let template = env.parse("dbg", "{{ user.name }}").unwrap();
    let output = template.render(&json!({})).unwrap();
    assert!(output.contains("user.name"));
}

#[test]
fn whitespace_only_tag_blocks_are_suppressed() {
    let env = Environment::builder().build();
    let template = env
        .parse("sup", "a{% if true %}\n   \n{% endif %}b")
        .unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "ab");
}

#[test]
fn html_producing_filters_bypass_autoescape() {
    let env = Environment::builder()
        .autoescape(true)
        .filters(filters())
        .build();
    let template = env.parse("br", "{{ text | newline_to_br }}").unwrap();
    assert_eq!(
        template.render(&json!({"text": "a\nb"})).unwrap(),
        "a<br />\nb"
    );

    let plain = env.parse("plain", "{{ text }}").unwrap();
    assert_eq!(
        plain.render(&json!({"text": "<a>"})).unwrap(),
        "&lt;a&gt;"
    );
}

#[test]
fn filter_errors_follow_the_mode_contract() {
    let mut builder = FilterRegistry::builder();
    builder.register("explode", |_, _, _| {
        Err(Error::filter_argument("explode always fails"))
    });
    let explode = builder.build();

    let strict = Environment::builder().filters(explode.clone()).build();
    let template = strict.parse("s", "a{{ 1 | explode }}b").unwrap();
    assert!(template.render(&json!({})).is_err());

    let lax = Environment::builder()
        .mode(Mode::Lax)
        .filters(explode)
        .build();
    let template = lax.parse("l", "a{{ 1 | explode }}b").unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "ab");
}

#[test]
fn filter_value_errors_skip_a_single_filter() {
    let mut builder = FilterRegistry::builder();
    builder
        .register("reject", |_, _, _| {
            Err(Error::filter_value("left value not allowed"))
        })
        .register("plus", |left, args, _| {
            let addend = args.first().map(coerce_i64).unwrap_or(0);
            Ok(Value::Int(coerce_i64(left) + addend))
        });
    let env = Environment::builder().filters(builder.build()).build();
    let template = env.parse("skip", "{{ 1 | reject | plus: 1 }}").unwrap();
    assert_eq!(template.render(&json!({})).unwrap(), "2");
}

#[test]
fn syntax_errors_carry_line_numbers() {
    let env = Environment::builder().build();
    let err = env.parse("lines", "ok\nok\n{% if %}").unwrap_err();
    assert_eq!(err.line(), Some(3));
}
