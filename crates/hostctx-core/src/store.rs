//! Store handle with attached host data
//!
//! A [`StoreWithData`] owns one native context and one registry index for
//! its whole life. The pair is created together and torn down together:
//!
//! 1. register the data, obtaining the index;
//! 2. build the native context tagged with that index;
//! 3. on teardown, destroy the native context first (its destructors may
//!    still call back into the registry), then unregister.
//!
//! Teardown runs once. Whichever of [`StoreWithData::close`] or `Drop`
//! comes first does the work; the other is a no-op.

use std::marker::PhantomData;
use std::sync::Arc;

use wasmtime::{AsContext, AsContextMut, StoreContext, StoreContextMut};

use crate::bridge::{self, EpochAction};
use crate::config::StoreLimitsConfig;
use crate::engine::Engine;
use crate::native::{self, ContextTag, NativeContext};
use crate::registry::{registry, RegistryError};
use crate::slab::SlabIndex;

/// Errors returned by store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The native context could not be created
    #[error("failed to allocate store context: {0}")]
    Allocation(String),

    /// The operation needs an engine feature that was not enabled
    #[error("engine is not configured for {0}")]
    ConfigMismatch(&'static str),

    /// The store has already been closed
    #[error("store used after close")]
    Closed,

    /// Registry lookup or release failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The native engine reported an error
    #[error(transparent)]
    Engine(#[from] wasmtime::Error),
}

/// Anything that can reach a store's host data
///
/// Implemented by [`StoreWithData`] and by [`Caller`](crate::Caller), so
/// helpers can accept either the store itself or a host-function caller.
pub trait StoreLike<T: Send + Sync + 'static>: AsContextMut<Data = ContextTag> {
    /// Registry index of the store
    fn index(&self) -> Result<SlabIndex, StoreError>;

    /// Host data bound to the store
    fn data(&self) -> Result<Arc<T>, StoreError> {
        Ok(registry().data::<T>(self.index()?)?)
    }
}

struct Live {
    context: NativeContext,
    index: SlabIndex,
}

/// Native execution context bound to host data of type `T`
pub struct StoreWithData<T> {
    engine: Engine,
    live: Option<Live>,
    _data: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> StoreWithData<T> {
    /// Create a store on `engine` holding `data`
    ///
    /// Fails with [`StoreError::Allocation`] if the engine cannot build
    /// another context; no registry record is left behind in that case.
    pub fn new(engine: &Engine, data: T) -> Result<Self, StoreError> {
        let index = registry().register(engine, data);

        let context = match native::create_context(engine, index) {
            Ok(context) => context,
            Err(err) => {
                registry().unregister(index)?;
                return Err(err);
            }
        };

        Ok(Self {
            engine: engine.clone(),
            live: Some(Live { context, index }),
            _data: PhantomData,
        })
    }

    /// Host data bound to this store
    pub fn data(&self) -> Result<Arc<T>, StoreError> {
        Ok(registry().data::<T>(self.index()?)?)
    }

    /// Install an epoch-deadline callback that sees this store's data
    ///
    /// The callback runs on the thread executing guest code whenever the
    /// deadline is reached. See [`EpochAction`].
    pub fn epoch_deadline_callback<F>(&mut self, callback: F) -> Result<(), StoreError>
    where
        F: FnMut(&T) -> EpochAction + Send + Sync + 'static,
    {
        let live = self.live.as_mut().ok_or(StoreError::Closed)?;
        native::require_epoch(self.engine.config())?;
        bridge::install_epoch_callback(&mut live.context, callback);
        Ok(())
    }
}

impl<T> StoreWithData<T> {
    /// Engine this store was created from
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Registry index of this store
    pub fn index(&self) -> Result<SlabIndex, StoreError> {
        self.live.as_ref().map(|live| live.index).ok_or(StoreError::Closed)
    }

    /// Check whether the store has been closed
    pub fn is_closed(&self) -> bool {
        self.live.is_none()
    }

    /// Non-owning view of the native context
    pub fn context(&self) -> Result<StoreContext<'_, ContextTag>, StoreError> {
        self.live
            .as_ref()
            .map(|live| live.context.as_context())
            .ok_or(StoreError::Closed)
    }

    /// Mutable view of the native context
    pub fn context_mut(&mut self) -> Result<StoreContextMut<'_, ContextTag>, StoreError> {
        self.live
            .as_mut()
            .map(|live| live.context.as_context_mut())
            .ok_or(StoreError::Closed)
    }

    /// Set the remaining fuel budget
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), StoreError> {
        let live = self.live.as_mut().ok_or(StoreError::Closed)?;
        native::set_fuel(&self.engine, &mut live.context, fuel)
    }

    /// Remaining fuel budget
    pub fn get_fuel(&self) -> Result<u64, StoreError> {
        let live = self.live.as_ref().ok_or(StoreError::Closed)?;
        native::get_fuel(&self.engine, &live.context)
    }

    /// Trap running code once the engine epoch advances `ticks` times
    pub fn set_epoch_deadline(&mut self, ticks: u64) -> Result<(), StoreError> {
        let live = self.live.as_mut().ok_or(StoreError::Closed)?;
        native::set_epoch_deadline(&self.engine, &mut live.context, ticks)
    }

    /// Go back to trapping when the epoch deadline is reached
    pub fn epoch_deadline_trap(&mut self) -> Result<(), StoreError> {
        let live = self.live.as_mut().ok_or(StoreError::Closed)?;
        live.context.epoch_deadline_trap();
        Ok(())
    }

    /// Install resource limits; a negative bound means "no limit"
    pub fn limiter(
        &mut self,
        max_memory_bytes: i64,
        max_table_elements: i64,
        max_instances: i64,
        max_tables: i64,
        max_memories: i64,
    ) -> Result<(), StoreError> {
        self.set_limits(StoreLimitsConfig::from_signed(
            max_memory_bytes,
            max_table_elements,
            max_instances,
            max_tables,
            max_memories,
        ))
    }

    /// Install resource limits
    pub fn set_limits(&mut self, limits: StoreLimitsConfig) -> Result<(), StoreError> {
        let live = self.live.as_mut().ok_or(StoreError::Closed)?;
        native::set_limits(&mut live.context, limits);
        Ok(())
    }

    /// Release the native context and the registry record
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) -> Result<(), StoreError> {
        let Some(Live { context, index }) = self.live.take() else {
            return Ok(());
        };

        native::destroy_context(context);
        registry().unregister(index)?;
        tracing::debug!(%index, "store closed");
        Ok(())
    }

    fn live(&self) -> &Live {
        match &self.live {
            Some(live) => live,
            None => panic!("{}", StoreError::Closed),
        }
    }

    fn live_mut(&mut self) -> &mut Live {
        match &mut self.live {
            Some(live) => live,
            None => panic!("{}", StoreError::Closed),
        }
    }
}

impl<T: Send + Sync + 'static> StoreLike<T> for StoreWithData<T> {
    fn index(&self) -> Result<SlabIndex, StoreError> {
        StoreWithData::index(self)
    }
}

/// Panics if the store has been closed
impl<T> AsContext for StoreWithData<T> {
    type Data = ContextTag;

    fn as_context(&self) -> StoreContext<'_, ContextTag> {
        self.live().context.as_context()
    }
}

/// Panics if the store has been closed
impl<T> AsContextMut for StoreWithData<T> {
    fn as_context_mut(&mut self) -> StoreContextMut<'_, ContextTag> {
        self.live_mut().context.as_context_mut()
    }
}

impl<T> Drop for StoreWithData<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!(error = %err, "store teardown failed");
            if !std::thread::panicking() {
                panic!("store teardown failed: {err}");
            }
        }
    }
}

impl<T> std::fmt::Debug for StoreWithData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWithData")
            .field("index", &self.live.as_ref().map(|live| live.index))
            .field("engine", &self.engine)
            .finish()
    }
}
