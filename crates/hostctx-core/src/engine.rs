//! Shared engine handle
//!
//! Wraps the native engine together with the configuration it was built
//! from, so store operations can tell a config mismatch apart from an engine
//! failure, and tracks how many stores are alive.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;

/// Errors that can occur while building an engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The native engine rejected the configuration
    #[error("failed to create engine: {0}")]
    Create(String),

    /// The configuration source could not be parsed
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

struct EngineInner {
    native: wasmtime::Engine,
    config: EngineConfig,
    live_stores: AtomicUsize,
}

/// Reference-counted handle to compiled code and runtime configuration
///
/// Cloning acquires another reference; the engine is destroyed when the last
/// clone (including the ones held by live stores) is dropped.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine from `config`
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let native = wasmtime::Engine::new(&config.to_native())
            .map_err(|e| EngineError::Create(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                native,
                config,
                live_stores: AtomicUsize::new(0),
            }),
        })
    }

    /// Get the native engine
    pub fn native_handle(&self) -> &wasmtime::Engine {
        &self.inner.native
    }

    /// Advance the global epoch by one tick
    ///
    /// Safe to call from any thread, including from host functions running
    /// inside a store of this engine.
    pub fn increment_epoch(&self) {
        self.inner.native.increment_epoch();
    }

    /// Get the configuration this engine was built from
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of stores currently alive on this engine
    pub fn live_stores(&self) -> usize {
        self.inner.live_stores.load(Ordering::Acquire)
    }

    /// Check whether two handles refer to the same engine
    pub fn same(a: &Engine, b: &Engine) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Reserve a store slot, honoring `max_stores`
    pub(crate) fn try_acquire_store(&self) -> bool {
        let max = self.inner.config.max_stores.unwrap_or(usize::MAX);
        self.inner
            .live_stores
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .is_ok()
    }

    /// Give back a slot taken by [`Engine::try_acquire_store`]
    pub(crate) fn release_store(&self) {
        self.inner.live_stores.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                native: wasmtime::Engine::default(),
                config: EngineConfig::default(),
                live_stores: AtomicUsize::new(0),
            }),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("live_stores", &self.live_stores())
            .finish()
    }
}
