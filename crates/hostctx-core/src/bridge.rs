//! Engine-to-host callback entry points
//!
//! Callbacks fired by the engine only receive the native context. They
//! recover the registry index from its tag, copy the host data out of the
//! registry and release the lock before calling user code, so a callback
//! can create or close other stores without deadlocking.

use wasmtime::{StoreContextMut, Trap, UpdateDeadline};

use crate::native::{ContextTag, NativeContext};
use crate::registry::registry;

/// Decision returned by an epoch-deadline callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochAction {
    /// Keep running and re-arm the deadline this many ticks ahead
    Continue(u64),

    /// Stop the running code with an interrupt trap
    Interrupt,
}

impl EpochAction {
    fn into_update(self) -> wasmtime::Result<UpdateDeadline> {
        match self {
            EpochAction::Continue(ticks) => Ok(UpdateDeadline::Continue(ticks)),
            EpochAction::Interrupt => Err(Trap::Interrupt.into()),
        }
    }
}

/// Resolve the host data of the context a callback fired in
fn resolve<T: Send + Sync + 'static>(
    context: &StoreContextMut<'_, ContextTag>,
) -> wasmtime::Result<std::sync::Arc<T>> {
    let index = context.data().index();
    Ok(registry().data::<T>(index)?)
}

/// Install `callback` as the epoch-deadline handler of `context`
pub(crate) fn install_epoch_callback<T, F>(context: &mut NativeContext, mut callback: F)
where
    T: Send + Sync + 'static,
    F: FnMut(&T) -> EpochAction + Send + Sync + 'static,
{
    context.epoch_deadline_callback(move |ctx| {
        let data = resolve::<T>(&ctx)?;
        let action = callback(&data);
        tracing::trace!(index = %ctx.data().index(), ?action, "epoch deadline reached");
        action.into_update()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_maps_to_update() {
        let update = EpochAction::Continue(3).into_update().unwrap();
        assert!(matches!(update, UpdateDeadline::Continue(3)));
    }

    #[test]
    fn test_interrupt_maps_to_trap() {
        match EpochAction::Interrupt.into_update() {
            Ok(_) => panic!("interrupt must not re-arm the deadline"),
            Err(err) => assert_eq!(err.downcast_ref::<Trap>(), Some(&Trap::Interrupt)),
        }
    }
}
