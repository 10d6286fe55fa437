// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::environment::{Environment, Mode};
use crate::error::Error;
use crate::filters::Filter;
use crate::value::{Object, Undefined, Value};
use crate::Template;

/// One resolved element of an identifier path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

/// Per-render mutable state.
///
/// A context is constructed at render start, threaded through every node's
/// `render` call and discarded at render end. It must not be shared across
/// concurrent renders.
pub struct Context {
    env: Environment,
    globals: Object,
    scopes: Vec<Object>,
    counters: HashMap<String, i64>,
    cycles: HashMap<String, usize>,
    stop_indexes: HashMap<String, usize>,
    disabled_tags: HashSet<String>,
    warnings: Vec<String>,
    depth: usize,
    loop_iterations: usize,
    output_bytes: usize,
}

impl Context {
    /// Creates a context for a fresh render. `globals` layer over the
    /// environment-wide globals and stay read-only for the render.
    pub fn new(env: Environment, globals: Object) -> Self {
        let mut merged = env.globals.clone();
        for (key, value) in globals {
            merged.insert(key, value);
        }
        Self {
            env,
            globals: merged,
            scopes: vec![Object::new()],
            counters: HashMap::new(),
            cycles: HashMap::new(),
            stop_indexes: HashMap::new(),
            disabled_tags: HashSet::new(),
            warnings: Vec::new(),
            depth: 1,
            loop_iterations: 0,
            output_bytes: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn mode(&self) -> Mode {
        self.env.mode
    }

    pub fn autoescape(&self) -> bool {
        self.env.autoescape
    }

    pub fn strict_filters(&self) -> bool {
        self.env.strict_filters
    }

    pub fn filter(&self, name: &str) -> Option<Arc<Filter>> {
        self.env.filters().get(name)
    }

    /// Builds the undefined sentinel for a failed lookup of `path`.
    pub fn undefined(&self, path: &str) -> Value {
        Value::Undefined(Undefined::new(self.env.undefined, path))
    }

    /// Resolves an already-evaluated identifier path: scopes top-down,
    /// then globals, then the configured undefined policy.
    pub fn get(&self, segments: &[PathSegment], repr: &str) -> Result<Value, Error> {
        let Some(first) = segments.first() else {
            return Ok(self.undefined(repr));
        };
        let root_name = match first {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        };
        let Some(mut value) = self.resolve_name(&root_name) else {
            return Ok(self.undefined(repr));
        };

        for segment in &segments[1..] {
            match descend(&value, segment) {
                Some(next) => value = next,
                None => return Ok(self.undefined(repr)),
            }
        }
        Ok(value)
    }

    /// Looks a bare name up in the scope stack, then the globals.
    pub fn resolve_name(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    /// Writes into the outermost scope: `assign` and `capture` results are
    /// visible for the rest of the render, even when set inside a loop.
    pub fn assign(&mut self, name: &str, value: Value) {
        self.scopes[0].insert(name.to_string(), value);
    }

    /// Writes into the innermost scope: loop variables and include
    /// parameters that disappear when their scope pops.
    pub fn set_local(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Object::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Cycle counter for the `cycle` tag, keyed per group and value shape.
    pub fn cycle(&mut self, key: &str, length: usize) -> usize {
        let counter = self.cycles.entry(key.to_string()).or_insert(0);
        let index = *counter % length.max(1);
        *counter += 1;
        index
    }

    /// Named counter for `increment`: returns the pre-increment value,
    /// starting at zero.
    pub fn increment(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }

    /// Named counter for `decrement`: returns the post-decrement value, so
    /// the first call yields -1. Counters are shared with `increment`.
    pub fn decrement(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter -= 1;
        *counter
    }

    /// Last-iterated stop index for `offset: continue`.
    pub fn stop_index(&self, key: &str) -> usize {
        self.stop_indexes.get(key).copied().unwrap_or(0)
    }

    pub fn set_stop_index(&mut self, key: &str, index: usize) {
        self.stop_indexes.insert(key.to_string(), index);
    }

    pub fn tag_disabled(&self, name: &str) -> bool {
        self.disabled_tags.contains(name)
    }

    pub fn warn(&mut self, err: Error) {
        self.warnings.push(err.to_string());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Writes through the output-size accounting. Every buffer write in a
    /// render passes through here, including intermediate block buffers.
    pub fn write(&mut self, buffer: &mut String, text: &str) -> Result<(), Error> {
        self.output_bytes += text.len();
        if let Some(limit) = self.env.limits.output_stream_limit {
            if self.output_bytes > limit {
                return Err(Error::output_limit(format!(
                    "render exceeded {limit} bytes"
                )));
            }
        }
        buffer.push_str(text);
        Ok(())
    }

    /// Accounts for one loop iteration against the environment limit.
    pub fn tick_loop(&mut self) -> Result<(), Error> {
        self.loop_iterations += 1;
        if let Some(limit) = self.env.limits.loop_iteration_limit {
            if self.loop_iterations > limit {
                return Err(Error::loop_limit(format!(
                    "render exceeded {limit} loop iterations"
                )));
            }
        }
        Ok(())
    }

    /// Iterations left before the loop limit trips, if one is set.
    pub fn remaining_loop_budget(&self) -> Option<usize> {
        self.env
            .limits
            .loop_iteration_limit
            .map(|limit| limit.saturating_sub(self.loop_iterations))
    }

    /// Guards `include`/`render` nesting against runaway recursion.
    pub fn enter_partial(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.env.limits.max_context_depth {
            return Err(Error::context_depth(format!(
                "template nesting exceeded {} levels; possible recursive include",
                self.env.limits.max_context_depth
            )));
        }
        Ok(())
    }

    pub fn leave_partial(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Loads a template through the environment's loader and cache.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, Error> {
        self.env.get_template(name)
    }

    /// Builds the isolated context used by the `render` tag: environment
    /// globals plus the explicitly-passed namespace, with `include`
    /// disabled and the resource accounting carried over.
    pub fn spawn_isolated(&self, namespace: Object) -> Context {
        let mut disabled = HashSet::new();
        disabled.insert("include".to_string());
        Context {
            env: self.env.clone(),
            globals: self.env.globals.clone(),
            scopes: vec![namespace],
            counters: HashMap::new(),
            cycles: HashMap::new(),
            stop_indexes: HashMap::new(),
            disabled_tags: disabled,
            warnings: Vec::new(),
            depth: self.depth,
            loop_iterations: self.loop_iterations,
            output_bytes: self.output_bytes,
        }
    }

    /// Folds a finished child context's accounting and warnings back in.
    pub fn absorb(&mut self, child: Context) {
        self.loop_iterations = child.loop_iterations;
        self.output_bytes = child.output_bytes;
        self.warnings.extend(child.warnings);
    }
}

/// Resolves one path segment against a value. `None` means undefined.
fn descend(value: &Value, segment: &PathSegment) -> Option<Value> {
    match value {
        Value::Object(map) => match segment {
            PathSegment::Key(key) => map.get(key).cloned().or_else(|| {
                if key == "size" {
                    Some(Value::Int(map.len() as i64))
                } else {
                    None
                }
            }),
            PathSegment::Index(index) => map.get(&index.to_string()).cloned(),
        },
        Value::Array(items) => match segment {
            PathSegment::Index(index) => {
                let at = if *index < 0 {
                    items.len().checked_sub(index.unsigned_abs() as usize)?
                } else {
                    *index as usize
                };
                items.get(at).cloned()
            }
            PathSegment::Key(key) => match key.as_str() {
                "size" => Some(Value::Int(items.len() as i64)),
                "first" => items.first().cloned(),
                "last" => items.last().cloned(),
                _ => None,
            },
        },
        Value::String(text) => match segment {
            PathSegment::Key(key) if key == "size" => {
                Some(Value::Int(text.chars().count() as i64))
            }
            _ => None,
        },
        Value::Range(start, stop) => match segment {
            PathSegment::Key(key) if key == "size" => {
                if start > stop {
                    Some(Value::Int(0))
                } else {
                    Some(Value::Int(stop - start + 1))
                }
            }
            _ => None,
        },
        Value::Drop(drop) => {
            let key = match segment {
                PathSegment::Key(key) => key.clone(),
                PathSegment::Index(index) => index.to_string(),
            };
            drop.liquid_get(&key)
                .or_else(|| drop.to_liquid().and_then(|projected| descend(&projected, segment)))
        }
        _ => None,
    }
}

/// Builds the `forloop` drop for one iteration.
pub fn forloop_object(index: usize, length: usize, parent: Option<Value>) -> Value {
    let mut map = Object::new();
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == length));
    map.insert("index".to_string(), Value::Int(index as i64 + 1));
    map.insert("index0".to_string(), Value::Int(index as i64));
    map.insert("rindex".to_string(), Value::Int((length - index) as i64));
    map.insert("rindex0".to_string(), Value::Int((length - index) as i64 - 1));
    map.insert("length".to_string(), Value::Int(length as i64));
    map.insert("parentloop".to_string(), parent.unwrap_or(Value::Nil));
    Value::Object(map)
}

/// Builds the `tablerowloop` drop for one cell.
pub fn tablerowloop_object(index: usize, length: usize, cols: usize, row: usize) -> Value {
    let col = index % cols;
    let Value::Object(mut map) = forloop_object(index, length, None) else {
        unreachable!("forloop_object always returns an object");
    };
    map.shift_remove("parentloop");
    map.insert("col".to_string(), Value::Int(col as i64 + 1));
    map.insert("col0".to_string(), Value::Int(col as i64));
    map.insert("col_first".to_string(), Value::Bool(col == 0));
    map.insert(
        "col_last".to_string(),
        Value::Bool(col + 1 == cols || index + 1 == length),
    );
    map.insert("row".to_string(), Value::Int(row as i64));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::value::UndefinedPolicy;

    fn context() -> Context {
        Context::new(Environment::builder().build(), Object::new())
    }

    #[test]
    fn assign_targets_the_outermost_scope() {
        let mut ctx = context();
        ctx.push_scope();
        ctx.assign("x", Value::Int(1));
        ctx.pop_scope();
        assert_eq!(ctx.resolve_name("x"), Some(Value::Int(1)));
    }

    #[test]
    fn locals_disappear_with_their_scope() {
        let mut ctx = context();
        ctx.push_scope();
        ctx.set_local("i", Value::Int(7));
        assert_eq!(ctx.resolve_name("i"), Some(Value::Int(7)));
        ctx.pop_scope();
        assert_eq!(ctx.resolve_name("i"), None);
    }

    #[test]
    fn inner_scopes_shadow_outer_names() {
        let mut ctx = context();
        ctx.assign("x", Value::Int(1));
        ctx.push_scope();
        ctx.set_local("x", Value::Int(2));
        assert_eq!(ctx.resolve_name("x"), Some(Value::Int(2)));
        ctx.pop_scope();
        assert_eq!(ctx.resolve_name("x"), Some(Value::Int(1)));
    }

    #[test]
    fn negative_indexes_count_from_the_end() {
        let items = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(descend(&items, &PathSegment::Index(-1)), Some(Value::Int(3)));
        assert_eq!(descend(&items, &PathSegment::Index(5)), None);
    }

    #[test]
    fn size_first_last_specials() {
        let items = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            descend(&items, &PathSegment::Key("size".into())),
            Some(Value::Int(2))
        );
        assert_eq!(
            descend(&items, &PathSegment::Key("first".into())),
            Some(Value::Int(1))
        );
        assert_eq!(
            descend(&Value::String("abcd".into()), &PathSegment::Key("size".into())),
            Some(Value::Int(4))
        );
    }

    #[test]
    fn missing_names_apply_the_undefined_policy() {
        let env = Environment::builder()
            .undefined(UndefinedPolicy::Strict)
            .build();
        let ctx = Context::new(env, Object::new());
        let value = ctx
            .get(&[PathSegment::Key("missing".into())], "missing")
            .unwrap();
        assert!(matches!(value, Value::Undefined(_)));
    }

    #[test]
    fn increment_and_decrement_share_counters() {
        let mut ctx = context();
        assert_eq!(ctx.increment("n"), 0);
        assert_eq!(ctx.increment("n"), 1);
        assert_eq!(ctx.decrement("n"), 1);
        assert_eq!(ctx.decrement("other"), -1);
    }

    #[test]
    fn cycle_counters_wrap() {
        let mut ctx = context();
        assert_eq!(ctx.cycle("g", 3), 0);
        assert_eq!(ctx.cycle("g", 3), 1);
        assert_eq!(ctx.cycle("g", 3), 2);
        assert_eq!(ctx.cycle("g", 3), 0);
    }

    #[test]
    fn forloop_object_exposes_all_fields() {
        let Value::Object(map) = forloop_object(1, 3, None) else {
            panic!("expected object");
        };
        assert_eq!(map.get("index"), Some(&Value::Int(2)));
        assert_eq!(map.get("rindex"), Some(&Value::Int(2)));
        assert_eq!(map.get("rindex0"), Some(&Value::Int(1)));
        assert_eq!(map.get("first"), Some(&Value::Bool(false)));
        assert_eq!(map.get("last"), Some(&Value::Bool(false)));
    }

    #[test]
    fn spawn_isolated_hides_render_scope_and_disables_include() {
        let mut ctx = context();
        ctx.assign("secret", Value::Int(41));
        let sub = ctx.spawn_isolated(Object::new());
        assert_eq!(sub.resolve_name("secret"), None);
        assert!(sub.tag_disabled("include"));
    }
}
