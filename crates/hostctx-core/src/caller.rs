//! Host-function view of a store
//!
//! Host functions registered with the engine receive a
//! `wasmtime::Caller<'_, ContextTag>`. Wrapping it in [`Caller`] gives back
//! typed access to the data of the store the call came from.

use std::marker::PhantomData;
use std::sync::Arc;

use wasmtime::{AsContext, AsContextMut, StoreContext, StoreContextMut};

use crate::engine::Engine;
use crate::native::ContextTag;
use crate::registry::registry;
use crate::slab::SlabIndex;
use crate::store::{StoreError, StoreLike};

/// Typed view of the store a host function was called from
pub struct Caller<'a, T> {
    inner: wasmtime::Caller<'a, ContextTag>,
    _data: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> Caller<'a, T> {
    /// Wrap the engine's caller handle
    pub fn new(inner: wasmtime::Caller<'a, ContextTag>) -> Self {
        Self {
            inner,
            _data: PhantomData,
        }
    }

    /// Registry index of the calling store
    pub fn index(&self) -> SlabIndex {
        self.inner.data().index()
    }

    /// Host data bound to the calling store
    pub fn data(&self) -> Result<Arc<T>, StoreError> {
        Ok(registry().data::<T>(self.index())?)
    }

    /// Engine of the calling store
    pub fn engine(&self) -> Result<Engine, StoreError> {
        Ok(registry().engine(self.index())?)
    }

    /// Get the wrapped engine handle back
    pub fn into_inner(self) -> wasmtime::Caller<'a, ContextTag> {
        self.inner
    }
}

impl<'a, T: Send + Sync + 'static> From<wasmtime::Caller<'a, ContextTag>> for Caller<'a, T> {
    fn from(inner: wasmtime::Caller<'a, ContextTag>) -> Self {
        Caller::new(inner)
    }
}

impl<T: Send + Sync + 'static> StoreLike<T> for Caller<'_, T> {
    fn index(&self) -> Result<SlabIndex, StoreError> {
        Ok(Caller::index(self))
    }
}

impl<T> AsContext for Caller<'_, T> {
    type Data = ContextTag;

    fn as_context(&self) -> StoreContext<'_, ContextTag> {
        self.inner.as_context()
    }
}

impl<T> AsContextMut for Caller<'_, T> {
    fn as_context_mut(&mut self) -> StoreContextMut<'_, ContextTag> {
        self.inner.as_context_mut()
    }
}
