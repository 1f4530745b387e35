use std::collections::BTreeMap;

use crate::config::BlockParameters;
use crate::error::{SimError, SimResult};

pub type Factory<T> = Box<dyn Fn(BlockParameters<'_>) -> SimResult<Box<T>> + Send + Sync>;

/// Maps the `<block>.type` tag of a configuration block to a constructor.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register<F>(&mut self, tag: &str, factory: F) -> &mut Self
    where
        F: Fn(BlockParameters<'_>) -> SimResult<Box<T>> + Send + Sync + 'static,
    {
        self.factories.insert(tag.to_string(), Box::new(factory));
        self
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the instance described by `params`. Unknown tags and constructor
    /// failures are reported against the block key.
    pub fn instantiate(&self, params: BlockParameters<'_>) -> SimResult<Box<T>> {
        let block = params.key();
        let tag = params
            .get_string("type")
            .map_err(|err| SimError::instantiation(block, err))?;
        let factory = self
            .factories
            .get(&tag)
            .ok_or_else(|| SimError::UnknownType {
                kind: self.kind,
                tag: tag.clone(),
                block: block.to_string(),
            })?;
        factory(params).map_err(|err| SimError::instantiation(block, err))
    }
}

impl<T: ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
