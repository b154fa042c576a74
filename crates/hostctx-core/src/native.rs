//! Boundary to the native engine
//!
//! Every call that crosses into wasmtime for context management lives here.
//! The context's host payload is a [`ContextTag`]: the slab index plus the
//! limiter the engine consults on growth. Host data is never handed to the
//! engine.

use crate::config::{EngineConfig, StoreLimitsConfig};
use crate::engine::Engine;
use crate::slab::SlabIndex;
use crate::store::StoreError;

/// Engine-side payload of a native context
#[derive(Debug)]
pub struct ContextTag {
    index: SlabIndex,
    limits: wasmtime::StoreLimits,
    _slot: StoreSlot,
}

/// Live-store slot on the engine, returned when the context is dropped
#[derive(Debug)]
struct StoreSlot(Engine);

impl StoreSlot {
    fn acquire(engine: &Engine) -> Option<Self> {
        engine.try_acquire_store().then(|| StoreSlot(engine.clone()))
    }
}

impl Drop for StoreSlot {
    fn drop(&mut self) {
        self.0.release_store();
    }
}

impl ContextTag {
    /// Registry index this context was created under
    pub fn index(&self) -> SlabIndex {
        self.index
    }
}

/// Owned native execution context
pub type NativeContext = wasmtime::Store<ContextTag>;

/// Build a native context tagged with `index`
///
/// Fails when the engine is at its `max_stores` cap.
pub(crate) fn create_context(engine: &Engine, index: SlabIndex) -> Result<NativeContext, StoreError> {
    let Some(slot) = StoreSlot::acquire(engine) else {
        let max = engine.config().max_stores.unwrap_or(usize::MAX);
        return Err(StoreError::Allocation(format!(
            "engine store limit of {max} reached"
        )));
    };

    let tag = ContextTag {
        index,
        limits: wasmtime::StoreLimits::default(),
        _slot: slot,
    };
    let mut context = wasmtime::Store::new(engine.native_handle(), tag);
    install_limiter(&mut context);

    tracing::debug!(%index, "created native context");
    Ok(context)
}

/// Tear down a native context
///
/// The engine slot goes back with the tag, however the context is dropped.
pub(crate) fn destroy_context(context: NativeContext) {
    let index = context.data().index;
    drop(context);
    tracing::debug!(%index, "destroyed native context");
}

/// Route the engine's growth checks to the limits held in the tag
fn install_limiter(context: &mut NativeContext) {
    context.limiter(|tag| &mut tag.limits);
}

/// Replace the limits consulted for future growth and instantiation
///
/// The engine snapshots instance, table and memory counts when the limiter
/// is installed, so the hook is installed again after the swap.
pub(crate) fn set_limits(context: &mut NativeContext, limits: StoreLimitsConfig) {
    context.data_mut().limits = limits.to_native();
    install_limiter(context);
}

fn require(enabled: bool, feature: &'static str) -> Result<(), StoreError> {
    if enabled {
        Ok(())
    } else {
        tracing::warn!(feature, "rejected call: engine not configured for {feature}");
        Err(StoreError::ConfigMismatch(feature))
    }
}

fn require_fuel(config: &EngineConfig) -> Result<(), StoreError> {
    require(config.consume_fuel, "fuel consumption")
}

/// Reject epoch calls on an engine built without epoch interruption
pub(crate) fn require_epoch(config: &EngineConfig) -> Result<(), StoreError> {
    require(config.epoch_interruption, "epoch interruption")
}

/// Set the remaining fuel of `context`
pub(crate) fn set_fuel(engine: &Engine, context: &mut NativeContext, fuel: u64) -> Result<(), StoreError> {
    require_fuel(engine.config())?;
    context.set_fuel(fuel)?;
    Ok(())
}

/// Read the remaining fuel of `context`
pub(crate) fn get_fuel(engine: &Engine, context: &NativeContext) -> Result<u64, StoreError> {
    require_fuel(engine.config())?;
    Ok(context.get_fuel()?)
}

/// Arm the epoch deadline `ticks` increments past the current epoch
pub(crate) fn set_epoch_deadline(
    engine: &Engine,
    context: &mut NativeContext,
    ticks: u64,
) -> Result<(), StoreError> {
    require_epoch(engine.config())?;
    context.set_epoch_deadline(ticks);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy_tracks_live_stores() {
        let engine = Engine::default();

        let context = create_context(&engine, SlabIndex::new(3)).unwrap();
        assert_eq!(context.data().index(), SlabIndex::new(3));
        assert_eq!(engine.live_stores(), 1);

        destroy_context(context);
        assert_eq!(engine.live_stores(), 0);
    }

    #[test]
    fn test_dropped_context_returns_slot() {
        let engine = Engine::new(EngineConfig {
            max_stores: Some(1),
            ..Default::default()
        })
        .unwrap();

        drop(create_context(&engine, SlabIndex::new(0)).unwrap());
        assert_eq!(engine.live_stores(), 0);

        let context = create_context(&engine, SlabIndex::new(1)).unwrap();
        assert_eq!(engine.live_stores(), 1);
        drop(context);
        assert_eq!(engine.live_stores(), 0);
    }

    #[test]
    fn test_create_fails_at_store_cap() {
        let engine = Engine::new(EngineConfig {
            max_stores: Some(1),
            ..Default::default()
        })
        .unwrap();

        let first = create_context(&engine, SlabIndex::new(0)).unwrap();
        assert!(matches!(
            create_context(&engine, SlabIndex::new(1)),
            Err(StoreError::Allocation(_))
        ));
        assert_eq!(engine.live_stores(), 1);

        destroy_context(first);
        let second = create_context(&engine, SlabIndex::new(1)).unwrap();
        destroy_context(second);
        assert_eq!(engine.live_stores(), 0);
    }

    #[test]
    fn test_fuel_requires_config() {
        let engine = Engine::default();
        let mut context = create_context(&engine, SlabIndex::new(0)).unwrap();

        assert!(matches!(
            set_fuel(&engine, &mut context, 10),
            Err(StoreError::ConfigMismatch("fuel consumption"))
        ));
        assert!(matches!(
            get_fuel(&engine, &context),
            Err(StoreError::ConfigMismatch("fuel consumption"))
        ));
    }

    #[test]
    fn test_epoch_deadline_requires_config() {
        let engine = Engine::default();
        let mut context = create_context(&engine, SlabIndex::new(0)).unwrap();

        assert!(matches!(
            set_epoch_deadline(&engine, &mut context, 1),
            Err(StoreError::ConfigMismatch("epoch interruption"))
        ));
    }
}
