// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::filters::FilterRegistry;
use crate::lexer::LexerOptions;
use crate::loader::Loader;
use crate::parser;
use crate::tags::{standard_tags, TagRegistry};
use crate::telemetry;
use crate::value::{Object, UndefinedPolicy, Value};
use crate::Template;

/// Engine-wide error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The first error aborts rendering.
    Strict,
    /// Recoverable errors are recorded as warnings and rendering
    /// continues; syntax errors remain fatal.
    Warn,
    /// Recoverable errors are silently absorbed.
    Lax,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Strict
    }
}

/// Resource bounds enforced per render.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum `include`/`render` nesting depth.
    pub max_context_depth: usize,
    /// Total loop iterations allowed across one render, carried into
    /// nested renders. `None` disables the check.
    pub loop_iteration_limit: Option<usize>,
    /// Total bytes written across one render, including intermediate
    /// block buffers. `None` disables the check.
    pub output_stream_limit: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_context_depth: 30,
            loop_iteration_limit: None,
            output_stream_limit: None,
        }
    }
}

/// The frozen configuration behind an [`Environment`] handle.
pub struct EnvironmentData {
    pub mode: Mode,
    pub undefined: UndefinedPolicy,
    pub autoescape: bool,
    pub strict_filters: bool,
    pub globals: Object,
    pub limits: Limits,
    options: LexerOptions,
    tags: TagRegistry,
    filters: FilterRegistry,
    loader: Option<Arc<dyn Loader>>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl EnvironmentData {
    pub fn lexer_options(&self) -> &LexerOptions {
        &self.options
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }
}

/// Assembly of everything shared between renders: registries, policies,
/// delimiters, globals, loader and the template cache.
///
/// An `Environment` is a cheap-to-clone handle; clones share the same
/// frozen configuration and template cache. Reads are safe to share
/// across threads; cache fills serialize behind a write lock.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentData>,
}

impl Deref for Environment {
    type Target = EnvironmentData;

    fn deref(&self) -> &EnvironmentData {
        &self.inner
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("mode", &self.mode)
            .field("undefined", &self.undefined)
            .field("autoescape", &self.autoescape)
            .field("strict_filters", &self.strict_filters)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Environment {
    /// Starts configuring a new environment.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Compiles template source into a bound template.
    pub fn parse(&self, name: &str, source: &str) -> Result<Template, Error> {
        let started = Instant::now();
        let result = parser::parse_template(source, self);
        telemetry::record_parse(name, source.len(), started.elapsed(), result.is_ok());
        let (tree, warnings) = result.map_err(|err| err.with_template(name))?;
        Ok(Template::new(name, source, tree, warnings, self.clone()))
    }

    /// Resolves a template by name through the loader, caching compiled
    /// templates. Reads are concurrent; the fill path takes the write
    /// lock.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, Error> {
        {
            let cache = self
                .inner
                .cache
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(template) = cache.get(name) {
                return Ok(template.clone());
            }
        }

        let Some(loader) = &self.inner.loader else {
            return Err(Error::template_not_found(name));
        };
        let source = loader.load(name)?;
        let template = Arc::new(self.parse(&source.name, &source.source)?);

        let mut cache = self
            .inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        cache.insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Drops all cached templates, e.g. after a loader's sources change.
    pub fn clear_template_cache(&self) {
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Fluent configuration for [`Environment`]. `build` freezes the
/// registries and returns the shared handle templates hold on to.
pub struct EnvironmentBuilder {
    mode: Mode,
    undefined: UndefinedPolicy,
    autoescape: bool,
    strict_filters: bool,
    globals: Object,
    limits: Limits,
    options: LexerOptions,
    tags: Option<TagRegistry>,
    filters: FilterRegistry,
    loader: Option<Arc<dyn Loader>>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            undefined: UndefinedPolicy::default(),
            autoescape: false,
            strict_filters: false,
            globals: Object::new(),
            limits: Limits::default(),
            options: LexerOptions::default(),
            tags: None,
            filters: FilterRegistry::empty(),
            loader: None,
        }
    }
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn undefined(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined = policy;
        self
    }

    #[must_use]
    pub fn autoescape(mut self, autoescape: bool) -> Self {
        self.autoescape = autoescape;
        self
    }

    #[must_use]
    pub fn strict_filters(mut self, strict_filters: bool) -> Self {
        self.strict_filters = strict_filters;
        self
    }

    /// Replaces the environment-wide globals supplied to every render.
    #[must_use]
    pub fn globals(mut self, globals: Object) -> Self {
        self.globals = globals;
        self
    }

    /// Adds one environment-wide global.
    #[must_use]
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn max_context_depth(mut self, depth: usize) -> Self {
        self.limits.max_context_depth = depth;
        self
    }

    #[must_use]
    pub fn loop_iteration_limit(mut self, limit: usize) -> Self {
        self.limits.loop_iteration_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn output_stream_limit(mut self, limit: usize) -> Self {
        self.limits.output_stream_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn tag_start_string(mut self, delim: impl Into<String>) -> Self {
        self.options.tag_start = delim.into();
        self
    }

    #[must_use]
    pub fn tag_end_string(mut self, delim: impl Into<String>) -> Self {
        self.options.tag_end = delim.into();
        self
    }

    #[must_use]
    pub fn statement_start_string(mut self, delim: impl Into<String>) -> Self {
        self.options.statement_start = delim.into();
        self
    }

    #[must_use]
    pub fn statement_end_string(mut self, delim: impl Into<String>) -> Self {
        self.options.statement_end = delim.into();
        self
    }

    #[must_use]
    pub fn strip_tags(mut self, strip: bool) -> Self {
        self.options.strip_tags = strip;
        self
    }

    #[must_use]
    pub fn trim_blocks(mut self, trim: bool) -> Self {
        self.options.trim_blocks = trim;
        self
    }

    #[must_use]
    pub fn lstrip_blocks(mut self, lstrip: bool) -> Self {
        self.options.lstrip_blocks = lstrip;
        self
    }

    /// Replaces the tag registry. Defaults to [`standard_tags`].
    #[must_use]
    pub fn tags(mut self, tags: TagRegistry) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Replaces the filter registry. The engine ships none by default;
    /// the core crate provides the standard set.
    #[must_use]
    pub fn filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn loader<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    #[must_use]
    pub fn loader_arc(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            inner: Arc::new(EnvironmentData {
                mode: self.mode,
                undefined: self.undefined,
                autoescape: self.autoescape,
                strict_filters: self.strict_filters,
                globals: self.globals,
                limits: self.limits,
                options: self.options,
                tags: self.tags.unwrap_or_else(standard_tags),
                filters: self.filters,
                loader: self.loader,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DictLoader;

    #[test]
    fn builder_defaults_are_strict_and_lax_undefined() {
        let env = Environment::builder().build();
        assert_eq!(env.mode, Mode::Strict);
        assert_eq!(env.undefined, UndefinedPolicy::Lax);
        assert!(!env.autoescape);
        assert!(!env.tags().is_empty());
        assert!(env.filters().is_empty());
    }

    #[test]
    fn get_template_caches_compiled_templates() {
        let env = Environment::builder()
            .loader(DictLoader::default().with("page", "cached {{ x }}"))
            .build();
        let first = env.get_template("page").unwrap();
        let second = env.get_template("page").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn get_template_without_loader_is_not_found() {
        let env = Environment::builder().build();
        assert!(matches!(
            env.get_template("anything"),
            Err(Error::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn clear_template_cache_forces_a_reload() {
        let env = Environment::builder()
            .loader(DictLoader::default().with("page", "x"))
            .build();
        let first = env.get_template("page").unwrap();
        env.clear_template_cache();
        let second = env.get_template("page").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn environment_clones_share_the_template_cache() {
        let env = Environment::builder()
            .loader(DictLoader::default().with("page", "x"))
            .build();
        let sibling = env.clone();
        let first = env.get_template("page").unwrap();
        let second = sibling.get_template("page").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Warn).unwrap(), "\"warn\"");
    }
}
