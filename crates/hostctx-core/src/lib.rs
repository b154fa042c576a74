//! hostctx core
//!
//! Attaches host data to engine stores and manages their lifecycle:
//! - Slab allocator handing out dense context indices
//! - Process-wide context registry keyed by those indices
//! - Store handle bundling a native context with its registry record
//! - One-shot teardown shared by explicit close and `Drop`
//! - Bridge for epoch, fuel and limiter callbacks coming back from the engine
//!
//! ```no_run
//! use hostctx_core::{Engine, EngineConfig, StoreWithData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::with_fuel())?;
//! let mut store = StoreWithData::new(&engine, String::from("session-1"))?;
//!
//! store.set_fuel(10_000)?;
//! assert_eq!(store.data()?.as_str(), "session-1");
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod caller;
pub mod config;
pub mod engine;
pub mod native;
pub mod registry;
pub mod slab;
pub mod store;

pub use bridge::EpochAction;
pub use caller::Caller;
pub use config::{EngineConfig, StoreLimitsConfig};
pub use engine::{Engine, EngineError};
pub use native::{ContextTag, NativeContext};
pub use registry::{registry, ContextRegistry, Record, RegistryError};
pub use slab::{Slab, SlabError, SlabIndex};
pub use store::{StoreError, StoreLike, StoreWithData};
