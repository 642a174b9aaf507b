//! Adaptor and transform registration tables.
//!
//! The CLI never matches on concrete adaptor types; it looks a name up in
//! one of these tables and hands the node's `options` mapping to whatever
//! factory is registered under that name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_yaml::Mapping;
use transporter_core::{ReaderAdaptor, TransformFn, TransporterError, WriterAdaptor};

type ReaderFactory = Box<dyn Fn(&Mapping) -> Result<Box<dyn ReaderAdaptor>, TransporterError> + Send + Sync>;
type WriterFactory = Box<dyn Fn(&Mapping) -> Result<Box<dyn WriterAdaptor>, TransporterError> + Send + Sync>;
type TransformFactory = Box<dyn Fn(&Mapping) -> Result<Arc<dyn TransformFn>, TransporterError> + Send + Sync>;

#[derive(Default)]
pub struct ReaderRegistry {
    factories: HashMap<String, ReaderFactory>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Mapping) -> Result<Box<dyn ReaderAdaptor>, TransporterError> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn build(&self, name: &str, options: &Mapping) -> Result<Box<dyn ReaderAdaptor>, TransporterError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TransporterError::Configuration(format!("no reader adaptor registered as {name:?}")))?;
        factory(options)
    }
}

#[derive(Default)]
pub struct WriterRegistry {
    factories: HashMap<String, WriterFactory>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Mapping) -> Result<Box<dyn WriterAdaptor>, TransporterError> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn build(&self, name: &str, options: &Mapping) -> Result<Box<dyn WriterAdaptor>, TransporterError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TransporterError::Configuration(format!("no writer adaptor registered as {name:?}")))?;
        factory(options)
    }
}

#[derive(Default)]
pub struct TransformRegistry {
    factories: HashMap<String, TransformFactory>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&Mapping) -> Result<Arc<dyn TransformFn>, TransporterError> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn build(&self, name: &str, options: &Mapping) -> Result<Arc<dyn TransformFn>, TransporterError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TransporterError::Configuration(format!("no transform registered as {name:?}")))?;
        factory(options)
    }
}

/// Read a string option, or fail with a configuration error naming the key.
pub fn require_str<'a>(options: &'a Mapping, key: &str) -> Result<&'a str, TransporterError> {
    options
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TransporterError::Configuration(format!("missing required option {key:?}")))
}

pub fn optional_str<'a>(options: &'a Mapping, key: &str) -> Option<&'a str> {
    options.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_name_is_a_configuration_error() {
        let registry = ReaderRegistry::new();
        let err = registry.build("nope", &Mapping::new()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
