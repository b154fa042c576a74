//! Process-wide context registry
//!
//! The engine can only carry a small integer across into host callbacks, so
//! host data is kept here, keyed by the slab index the context was tagged
//! with. One lock guards both the slab and the record table for every store
//! type.
//!
//! Lookups copy the record out (an engine clone and an `Arc` of the data)
//! and drop the lock before returning. Callers never run user code while
//! the lock is held.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::engine::Engine;
use crate::slab::{Slab, SlabError, SlabIndex};

/// Errors returned by registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No record is registered under the index
    #[error("no store registered at index {0}")]
    UnknownIndex(SlabIndex),

    /// Data was requested with a type other than the one it was bound with
    #[error("store data type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested type
        expected: &'static str,
        /// Type the record was created with
        found: &'static str,
    },

    /// The slab rejected the release
    #[error(transparent)]
    Slab(#[from] SlabError),
}

/// Host-side state attached to one store
#[derive(Clone)]
pub struct Record {
    engine: Engine,
    data: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Record {
    /// Engine the store was created from
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Name of the type the data was bound with
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed data
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        Arc::clone(&self.data)
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                expected: type_name::<T>(),
                found: self.type_name,
            })
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("engine", &self.engine)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    slab: Slab,
    records: FxHashMap<SlabIndex, Record>,
}

/// Index-keyed table of store records
#[derive(Default)]
pub struct ContextRegistry {
    inner: Mutex<RegistryInner>,
}

static REGISTRY: LazyLock<ContextRegistry> = LazyLock::new(ContextRegistry::new);

/// The registry shared by every store in the process
pub fn registry() -> &'static ContextRegistry {
    &REGISTRY
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` and return the index it is reachable under
    pub fn register<T: Send + Sync + 'static>(&self, engine: &Engine, data: T) -> SlabIndex {
        let record = Record {
            engine: engine.clone(),
            data: Arc::new(data),
            type_name: type_name::<T>(),
        };

        let index = {
            let mut inner = self.inner.lock();
            let index = inner.slab.allocate();
            inner.records.insert(index, record);
            index
        };

        tracing::debug!(%index, data_type = type_name::<T>(), "registered store record");
        index
    }

    /// Copy out the record registered at `index`
    pub fn lookup(&self, index: SlabIndex) -> Result<Record, RegistryError> {
        self.inner
            .lock()
            .records
            .get(&index)
            .cloned()
            .ok_or(RegistryError::UnknownIndex(index))
    }

    /// Typed access to the data registered at `index`
    pub fn data<T: Send + Sync + 'static>(&self, index: SlabIndex) -> Result<Arc<T>, RegistryError> {
        self.lookup(index)?.downcast::<T>()
    }

    /// Engine of the store registered at `index`
    pub fn engine(&self, index: SlabIndex) -> Result<Engine, RegistryError> {
        Ok(self.lookup(index)?.engine)
    }

    /// Remove the record at `index` and free the index for reuse
    pub fn unregister(&self, index: SlabIndex) -> Result<(), RegistryError> {
        let record = {
            let mut inner = self.inner.lock();
            let record = inner
                .records
                .remove(&index)
                .ok_or(RegistryError::UnknownIndex(index))?;
            inner.slab.release(index)?;
            record
        };

        tracing::debug!(%index, data_type = record.type_name, "unregistered store record");
        // Data destructors may re-enter the registry
        drop(record);
        Ok(())
    }

    /// Check whether a record is registered at `index`
    pub fn contains(&self, index: SlabIndex) -> bool {
        self.inner.lock().records.contains_key(&index)
    }

    /// Number of registered records
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
