// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::value::Value;

/// Keyword arguments passed to a filter, in declaration order.
pub type FilterKwargs = IndexMap<String, Value>;

/// Signature implemented by filter functions invoked from templates.
///
/// The first argument is the piped-in value, followed by the evaluated
/// positional and keyword arguments.
pub type Filter =
    dyn Fn(&Value, &[Value], &FilterKwargs) -> Result<Value, Error> + Send + Sync;

/// Registry that maps filter names to callable filters. Cloning is cheap
/// and the frozen map is safe for concurrent reads.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    map: Arc<HashMap<String, Arc<Filter>>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            map: Arc::new(HashMap::new()),
        }
    }

    /// Returns a new builder for constructing registries.
    pub fn builder() -> FilterRegistryBuilder {
        FilterRegistryBuilder::new()
    }

    /// Fetches a filter by name.
    pub fn get(&self, name: &str) -> Option<Arc<Filter>> {
        self.map.get(name).cloned()
    }

    /// Reports whether the registry contains no filters.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered filter names.
    pub fn filter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Helper for constructing registries before freezing them into an
/// immutable map.
#[derive(Default)]
pub struct FilterRegistryBuilder {
    map: HashMap<String, Arc<Filter>>,
}

impl FilterRegistryBuilder {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registers a filter under the provided name.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(&Value, &[Value], &FilterKwargs) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.map.insert(name.into(), Arc::new(filter));
        self
    }

    /// Extends the builder with all filters from another registry.
    pub fn extend(&mut self, other: &FilterRegistry) -> &mut Self {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    /// Finalises the builder into an immutable registry.
    pub fn build(self) -> FilterRegistry {
        FilterRegistry {
            map: Arc::new(self.map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trip() {
        let mut builder = FilterRegistry::builder();
        builder.register("echo", |left, _, _| Ok(left.clone()));
        let registry = builder.build();

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.filter_names(), vec!["echo".to_string()]);
    }

    #[test]
    fn extend_overrides_existing_names() {
        let mut first = FilterRegistry::builder();
        first.register("pick", |_, _, _| Ok(Value::Int(1)));
        let first = first.build();

        let mut second = FilterRegistry::builder();
        second.register("pick", |_, _, _| Ok(Value::Int(2)));
        second.extend(&first);
        let merged = second.build();

        let filter = merged.get("pick").unwrap();
        let result = filter(&Value::Nil, &[], &FilterKwargs::new()).unwrap();
        assert_eq!(result, Value::Int(1));
    }
}
