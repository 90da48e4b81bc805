//! Name → constructor registry for builders and streamers (C10, spec §4.9).
//!
//! Grounded on the teacher's function-pointer dispatch cache
//! (`distance::IndexMetric`, SPEC_FULL §4.2's `OnceLock`-backed `select_*`
//! pattern): a lazily-populated, lock-protected map rather than a build-time
//! match statement, so callers can register their own component names without
//! touching this crate. Constructors produce `Box<dyn Any + Send + Sync>`
//! since the registered types (`FlatBuilder`, `HnswGraph`, …) share no common
//! trait — callers downcast to the concrete type they asked the registry for
//! by name.
//!
//! [`Factory::with_defaults`] pre-registers the components this crate can
//! build from an [`IndexMeta`] alone: `"FlatBuilder"` and `"HnswGraph"` (with
//! [`crate::index::hnsw::HnswParams::default`]). `HnswRabitqGraph` (needs a
//! `RabitqReformer`) and [`crate::storage::mmap::MmapStorage`] (needs a file
//! path) take more than a meta to build, so they aren't registered here;
//! build them directly through their own constructors.

use crate::error::{Error, Result};
use crate::index::meta::IndexMeta;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered constructor: builds a component from an [`IndexMeta`].
pub type Constructor = Arc<dyn Fn(&IndexMeta) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Maps component names to constructors.
#[derive(Default)]
pub struct Factory {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl Factory {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the constructor for `name`.
    pub fn register(
        &self,
        name: impl Into<String>,
        ctor: impl Fn(&IndexMeta) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync + 'static,
    ) {
        self.constructors.write().insert(name.into(), Arc::new(ctor));
    }

    /// Builds the component registered under `name`, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoExist`] if `name` isn't registered, or
    /// [`Error::Internal`] if the constructed value isn't a `T`.
    pub fn create<T: 'static>(&self, name: &str, meta: &IndexMeta) -> Result<Box<T>> {
        let ctor = {
            let table = self.constructors.read();
            table.get(name).cloned().ok_or_else(|| Error::NoExist(name.to_string()))?
        };
        ctor(meta)?
            .downcast::<T>()
            .map_err(|_| Error::Internal(format!("'{name}' constructor returned the wrong type")))
    }

    /// An empty registry with `"FlatBuilder"`/`"HnswGraph"` pre-registered
    /// (see the module docs for what's excluded and why).
    #[must_use]
    pub fn with_defaults() -> Self {
        let factory = Self::new();
        factory.register("FlatBuilder", |meta| {
            Ok(Box::new(crate::index::flat::FlatBuilder::new(meta.clone())) as Box<dyn Any + Send + Sync>)
        });
        factory.register("HnswGraph", |meta| {
            let graph = crate::index::hnsw::HnswGraph::new(
                meta.clone(),
                crate::index::hnsw::HnswParams::default(),
                0,
            )?;
            Ok(Box::new(graph) as Box<dyn Any + Send + Sync>)
        });
        factory
    }

    /// Names currently registered, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    /// Whether `name` has a constructor registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DataType, MetricKind};

    fn test_meta() -> IndexMeta {
        IndexMeta::new(DataType::Fp32, 8, MetricKind::SquaredEuclidean)
    }

    #[test]
    fn create_returns_downcast_value() {
        let factory = Factory::new();
        factory.register("EchoDim", |meta| Ok(Box::new(meta.dim)));
        let dim = factory.create::<usize>("EchoDim", &test_meta()).unwrap();
        assert_eq!(*dim, 8);
    }

    #[test]
    fn unregistered_name_is_no_exist() {
        let factory = Factory::new();
        let err = factory.create::<usize>("Nope", &test_meta()).unwrap_err();
        assert_eq!(err.code(), "VEC-003");
    }

    #[test]
    fn wrong_downcast_type_is_internal_error() {
        let factory = Factory::new();
        factory.register("EchoDim", |meta| Ok(Box::new(meta.dim)));
        let err = factory.create::<String>("EchoDim", &test_meta()).unwrap_err();
        assert_eq!(err.code(), "VEC-010");
    }

    #[test]
    fn with_defaults_registers_flat_builder_and_hnsw_graph() {
        let factory = Factory::with_defaults();
        assert!(factory.contains("FlatBuilder"));
        assert!(factory.contains("HnswGraph"));

        let meta = test_meta();
        let builder = factory.create::<crate::index::flat::FlatBuilder>("FlatBuilder", &meta).unwrap();
        builder.emplace(1, &[0u8; 32]).unwrap();

        let graph = factory.create::<crate::index::hnsw::HnswGraph>("HnswGraph", &meta).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn names_lists_every_registration() {
        let factory = Factory::new();
        factory.register("A", |_| Ok(Box::new(())));
        factory.register("B", |_| Ok(Box::new(())));
        let mut names = factory.names();
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
