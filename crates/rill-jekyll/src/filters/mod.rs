// SPDX-License-Identifier: Apache-2.0 OR MIT
use rill_liquid_core::{Error, FilterRegistryBuilder, Value};

mod arrays;
mod strings;

pub fn install_all(builder: &mut FilterRegistryBuilder) {
    strings::register(builder);
    arrays::register(builder);
}

pub(crate) fn expect_array(name: &'static str, value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Nil | Value::Undefined(_) => Ok(Vec::new()),
        other => Err(Error::filter_value(format!(
            "{name} expects an array, found {}",
            other.type_name()
        ))),
    }
}
