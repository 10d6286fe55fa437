// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;

/// A template source handed back by a loader.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub source: String,
    /// The name the source was resolved as; usually the requested name,
    /// but filesystem loaders may substitute the matched file name.
    pub name: String,
}

impl TemplateSource {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }
}

/// Pluggable template-source provider consumed by `include`/`render` and
/// [`crate::Environment::get_template`].
pub trait Loader: Send + Sync {
    fn load(&self, name: &str) -> Result<TemplateSource, Error>;
}

/// In-memory loader backed by a name → source map.
#[derive(Debug, Clone, Default)]
pub struct DictLoader {
    templates: HashMap<String, String>,
}

impl DictLoader {
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Adds one template, for fluent test setup.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }
}

impl Loader for DictLoader {
    fn load(&self, name: &str) -> Result<TemplateSource, Error> {
        match self.templates.get(name) {
            Some(source) => Ok(TemplateSource::new(source.clone(), name)),
            None => Err(Error::template_not_found(name)),
        }
    }
}

/// Tries a list of loaders in order, returning the first hit.
#[derive(Clone, Default)]
pub struct ChoiceLoader {
    loaders: Vec<Arc<dyn Loader>>,
}

impl ChoiceLoader {
    pub fn new(loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self { loaders }
    }

    #[must_use]
    pub fn with<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }
}

impl Loader for ChoiceLoader {
    fn load(&self, name: &str) -> Result<TemplateSource, Error> {
        for loader in &self.loaders {
            match loader.load(name) {
                Ok(source) => return Ok(source),
                Err(Error::TemplateNotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::template_not_found(name))
    }
}
