// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The tag contract and the built-in tag set.
//!
//! A tag receives the token stream positioned on its own `TagName` token
//! and must consume through its closing tag, calling back into the parser
//! for any blocks it owns.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::Node;
use crate::error::Error;
use crate::lexer::TokenStream;
use crate::parser::Parser;

pub mod assignment;
pub mod control;
pub mod inclusion;
pub mod iteration;
pub mod output;

/// Parse-time contract implemented by every tag.
pub trait Tag: Send + Sync {
    /// The name that opens the tag, e.g. `"if"`.
    fn name(&self) -> &'static str;

    /// The closing tag name for block tags, e.g. `"endif"`.
    fn end(&self) -> Option<&'static str> {
        None
    }

    /// Parses the tag starting from its `TagName` token and returns the
    /// finished node, leaving the stream past the closing tag.
    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error>;
}

/// Registry mapping tag names to implementations. Frozen after
/// environment configuration; cloning is cheap and reads are safe to
/// share across threads.
#[derive(Clone, Default)]
pub struct TagRegistry {
    map: Arc<HashMap<String, Arc<dyn Tag>>>,
}

impl TagRegistry {
    pub fn empty() -> Self {
        Self {
            map: Arc::new(HashMap::new()),
        }
    }

    pub fn builder() -> TagRegistryBuilder {
        TagRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tag>> {
        self.map.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns a sorted list of the registered tag names.
    pub fn tag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
pub struct TagRegistryBuilder {
    map: HashMap<String, Arc<dyn Tag>>,
}

impl TagRegistryBuilder {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registers a tag under its own name.
    pub fn register<T: Tag + 'static>(&mut self, tag: T) -> &mut Self {
        self.map.insert(tag.name().to_string(), Arc::new(tag));
        self
    }

    pub fn build(self) -> TagRegistry {
        TagRegistry {
            map: Arc::new(self.map),
        }
    }
}

/// The built-in tag set: control flow, iteration, assignment, inclusion
/// and output tags.
pub fn standard_tags() -> TagRegistry {
    let mut builder = TagRegistryBuilder::new();
    builder
        .register(control::IfTag)
        .register(control::UnlessTag)
        .register(control::CaseTag)
        .register(control::BreakTag)
        .register(control::ContinueTag)
        .register(iteration::ForTag)
        .register(iteration::TableRowTag)
        .register(iteration::CycleTag)
        .register(assignment::AssignTag)
        .register(assignment::CaptureTag)
        .register(assignment::IncrementTag)
        .register(assignment::DecrementTag)
        .register(inclusion::IncludeTag)
        .register(inclusion::RenderTag)
        .register(output::EchoTag)
        .register(output::LiquidTag)
        .register(output::RawTag)
        .register(output::CommentTag);
    builder.build()
}
