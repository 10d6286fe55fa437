#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Rill Jekyll provides a partial re-implementation of selected filters
//! from the Jekyll static-site generator, tailored for use with the Rill
//! Liquid engine.

use once_cell::sync::Lazy;
use rill_liquid_core::{
    install_standard_filters, FilterRegistry, FilterRegistryBuilder,
};

mod filters;

static JEKYLL: Lazy<FilterRegistry> = Lazy::new(|| {
    let mut builder = FilterRegistryBuilder::new();
    install_all(&mut builder);
    builder.build()
});

/// Installs both the standard Liquid filters and the Jekyll extensions
/// into the provided registry builder. Sequencing the standard set first
/// mirrors how Jekyll augments core Liquid without replacing it.
pub fn install_all(builder: &mut FilterRegistryBuilder) {
    install_standard_filters(builder);
    install_jekyll_filters(builder);
}

/// Registers only the Jekyll filters into an existing registry builder.
pub fn install_jekyll_filters(builder: &mut FilterRegistryBuilder) {
    filters::install_all(builder);
}

/// Returns a registry populated with the standard Liquid filters plus
/// the Jekyll extensions.
pub fn jekyll_filters() -> FilterRegistry {
    JEKYLL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_liquid_core::Environment;
    use serde_json::json;

    #[test]
    fn template_with_jekyll_filters() {
        let env = Environment::builder().filters(jekyll_filters()).build();
        let template = env
            .parse("t", "{{ title | slugify | prepend: '/posts/' }}")
            .unwrap();
        let rendered = template
            .render(&json!({"title": "Hello Rill World"}))
            .unwrap();
        assert_eq!(rendered, "/posts/hello-rill-world");
    }

    #[test]
    fn standard_filters_remain_available() {
        let env = Environment::builder().filters(jekyll_filters()).build();
        let template = env.parse("t", "{{ 'x' | upcase }}").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "X");
    }
}
