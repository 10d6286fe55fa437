#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Core lexer, parser and evaluator for Liquid templates.
//!
//! Templates compile through [`Environment::parse`] into a [`Template`]
//! bound to its environment, then render against caller-supplied data:
//!
//! ```
//! use rill_liquid_engine::Environment;
//! use serde_json::json;
//!
//! let env = Environment::builder().build();
//! let template = env.parse("hello", "Hello {{ name }}!").unwrap();
//! let output = template.render(&json!({ "name": "World" })).unwrap();
//! assert_eq!(output, "Hello World!");
//! ```
//!
//! The engine ships no filters of its own; the companion core crate
//! registers the standard Liquid filter set.

pub mod ast;
mod context;
mod environment;
mod error;
pub mod expression;
mod filters;
pub mod lexer;
mod loader;
mod parser;
pub mod tags;
mod telemetry;
mod value;

use std::time::Instant;

use ast::ParseTree;

pub use context::{forloop_object, tablerowloop_object, Context, PathSegment};
pub use environment::{Environment, EnvironmentBuilder, EnvironmentData, Limits, Mode};
pub use error::Error;
pub use filters::{Filter, FilterKwargs, FilterRegistry, FilterRegistryBuilder};
pub use loader::{ChoiceLoader, DictLoader, Loader, TemplateSource};
pub use parser::{
    expect_end_tag, parse_assignment_expression, parse_boolean_expression,
    parse_filtered_expression, parse_filters, parse_loop_expression, parse_primary,
    require_expression, take_expression, Parser,
};
pub use tags::{standard_tags, Tag, TagRegistry, TagRegistryBuilder};
pub use telemetry::{disable as disable_telemetry, enable as enable_telemetry};
pub use value::{
    coerce_i64, compare, escape_html, is_blank, is_empty, is_truthy, require_defined,
    to_output_string, DropObject, Object, Undefined, UndefinedPolicy, Value,
};

/// A parsed template bound to the environment that compiled it.
#[derive(Clone)]
pub struct Template {
    name: String,
    source: String,
    tree: ParseTree,
    parse_warnings: Vec<String>,
    env: Environment,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

impl Template {
    pub(crate) fn new(
        name: &str,
        source: &str,
        tree: ParseTree,
        parse_warnings: Vec<String>,
        env: Environment,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            tree,
            parse_warnings,
            env,
        }
    }

    /// Parses template source against a fresh default environment. Most
    /// callers should build one [`Environment`] and use
    /// [`Environment::parse`] so templates share registries and caches.
    pub fn parse(name: &str, source: &str) -> Result<Self, Error> {
        Environment::builder().build().parse(name, source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed statement tree.
    pub fn tree(&self) -> &ParseTree {
        &self.tree
    }

    /// Warnings recorded while parsing under warn mode.
    pub fn parse_warnings(&self) -> &[String] {
        &self.parse_warnings
    }

    /// Renders the template against a JSON object of render globals.
    pub fn render(&self, data: &serde_json::Value) -> Result<String, Error> {
        let globals = json_globals(data)?;
        self.render_value(globals)
    }

    /// Renders against an already-converted globals map.
    pub fn render_value(&self, globals: Object) -> Result<String, Error> {
        self.render_in(globals).map(|(output, _)| output)
    }

    /// Renders and returns the warnings collected during parse and
    /// render. Warnings only accumulate under warn mode.
    pub fn render_with_warnings(
        &self,
        data: &serde_json::Value,
    ) -> Result<(String, Vec<String>), Error> {
        let globals = json_globals(data)?;
        self.render_in(globals)
    }

    fn render_in(&self, globals: Object) -> Result<(String, Vec<String>), Error> {
        let started = Instant::now();
        let mut ctx = Context::new(self.env.clone(), globals);
        let mut buffer = String::new();
        let result = self.tree.render(&mut ctx, &mut buffer);
        telemetry::record_render(&self.name, self.source.len(), started.elapsed(), result.is_ok());
        result?;

        let mut warnings = self.parse_warnings.clone();
        warnings.extend(ctx.take_warnings());
        Ok((buffer, warnings))
    }
}

fn json_globals(data: &serde_json::Value) -> Result<Object, Error> {
    match Value::from(data.clone()) {
        Value::Object(map) => Ok(map),
        Value::Nil => Ok(Object::new()),
        other => Err(Error::type_error(format!(
            "render data must be an object, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_output_statements() {
        let template = Template::parse("t", "Hello {{ name }}!").unwrap();
        assert_eq!(
            template.render(&json!({"name": "World"})).unwrap(),
            "Hello World!"
        );
    }

    #[test]
    fn pure_literal_templates_round_trip() {
        let source = "no tags\nhere at all\t<b>even html</b>";
        let template = Template::parse("t", source).unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), source);
    }

    #[test]
    fn renders_if_elsif_else_chains() {
        let template = Template::parse(
            "t",
            "{% if a %}A{% elsif b %}B{% else %}C{% endif %}",
        )
        .unwrap();
        assert_eq!(template.render(&json!({"a": true})).unwrap(), "A");
        assert_eq!(template.render(&json!({"b": true})).unwrap(), "B");
        assert_eq!(template.render(&json!({})).unwrap(), "C");
    }

    #[test]
    fn renders_for_loops_over_ranges() {
        let template =
            Template::parse("t", "{% for i in (1..3) %}{{ i }}{% endfor %}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "123");
    }

    #[test]
    fn for_else_fires_on_empty_iterables() {
        let template = Template::parse(
            "t",
            "{% for x in items %}{{ x }}{% else %}none{% endfor %}",
        )
        .unwrap();
        assert_eq!(template.render(&json!({"items": []})).unwrap(), "none");
    }

    #[test]
    fn assign_and_filters_combine() {
        let env = Environment::builder()
            .filters({
                let mut builder = FilterRegistry::builder();
                builder.register("plus", |left, args, _| {
                    let base = coerce_i64(left);
                    let addend = args.first().map(coerce_i64).unwrap_or(0);
                    Ok(Value::Int(base + addend))
                });
                builder.build()
            })
            .build();
        let template = env
            .parse("t", "{% assign x = 2 %}{{ x | plus: 3 }}")
            .unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "5");
    }

    #[test]
    fn unknown_filters_pass_through_unless_strict() {
        let template = Template::parse("t", "{{ 'x' | nosuch }}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "x");

        let env = Environment::builder().strict_filters(true).build();
        let template = env.parse("t", "{{ 'x' | nosuch }}").unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::UnknownFilter { .. }));
    }

    #[test]
    fn render_data_must_be_an_object() {
        let template = Template::parse("t", "x").unwrap();
        assert!(template.render(&json!([1, 2])).is_err());
        assert_eq!(template.render(&json!(null)).unwrap(), "x");
    }

    #[test]
    fn capture_assigns_rendered_blocks() {
        let template = Template::parse(
            "t",
            "{% capture greeting %}Hi {{ name }}{% endcapture %}[{{ greeting }}]",
        )
        .unwrap();
        assert_eq!(
            template.render(&json!({"name": "Ada"})).unwrap(),
            "[Hi Ada]"
        );
    }

    #[test]
    fn increment_and_decrement_counters() {
        let template = Template::parse(
            "t",
            "{% increment n %}{% increment n %}{% decrement n %}{% decrement m %}",
        )
        .unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "011-1");
    }

    #[test]
    fn raw_blocks_render_verbatim() {
        let template =
            Template::parse("t", "{% raw %}{{ not a var }}{% endraw %}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "{{ not a var }}");
    }

    #[test]
    fn comments_render_nothing() {
        let template = Template::parse(
            "t",
            "a{% comment %} text {{ x }} {% unregistered %} {% endcomment %}b",
        )
        .unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "ab");
    }

    #[test]
    fn liquid_tag_runs_line_oriented_tags() {
        let template = Template::parse(
            "t",
            "{% liquid\nassign x = 4\nif x == 4\necho 'four'\nendif\n%}",
        )
        .unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "four");
    }

    #[test]
    fn include_shares_scope_and_render_isolates() {
        let env = Environment::builder()
            .loader(
                DictLoader::default()
                    .with("show_x", "{{ x }}")
                    .with("set_y", "{% assign y = 1 %}"),
            )
            .build();

        let template = env.parse("t", "{% include 'show_x' %}").unwrap();
        assert_eq!(template.render(&json!({"x": "seen"})).unwrap(), "seen");

        let template = env.parse("t", "{% render 'show_x' %}").unwrap();
        assert_eq!(template.render(&json!({"x": "seen"})).unwrap(), "");
    }

    #[test]
    fn render_disables_include_inside_the_partial() {
        let env = Environment::builder()
            .loader(
                DictLoader::default()
                    .with("outer", "{% include 'inner' %}")
                    .with("inner", "inner"),
            )
            .build();
        let template = env.parse("t", "{% render 'outer' %}").unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn autoescape_escapes_unsafe_output_only() {
        let env = Environment::builder().autoescape(true).build();
        let template = env.parse("t", "<b>{{ name }}</b>").unwrap();
        assert_eq!(
            template.render(&json!({"name": "<i>"})).unwrap(),
            "<b>&lt;i&gt;</b>"
        );

        let template = env.parse("t", "{{ '<i>' }}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "<i>");
    }

    #[test]
    fn loop_iteration_limit_trips() {
        let env = Environment::builder().loop_iteration_limit(5).build();
        let template = env
            .parse("t", "{% for i in (1..100) %}{{ i }}{% endfor %}")
            .unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::LoopIterationLimit { .. }));
    }

    #[test]
    fn output_stream_limit_trips() {
        let env = Environment::builder().output_stream_limit(8).build();
        let template = env.parse("t", "0123456789abcdef").unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::OutputStreamLimit { .. }));
    }

    #[test]
    fn recursive_includes_hit_the_depth_limit() {
        let env = Environment::builder()
            .loader(DictLoader::default().with("loop", "{% include 'loop' %}"))
            .build();
        let template = env.parse("t", "{% include 'loop' %}").unwrap();
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, Error::ContextDepth { .. }));
    }
}
