//! Engine and store configuration
//!
//! Both structs deserialize with serde so hosts can keep them in their own
//! config files; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Options for creating an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable fuel accounting for stores created from this engine
    pub consume_fuel: bool,

    /// Enable epoch-deadline interruption
    pub epoch_interruption: bool,

    /// Maximum number of live stores (None = unlimited)
    pub max_stores: Option<usize>,
}

impl EngineConfig {
    /// Create a config with fuel accounting enabled
    pub fn with_fuel() -> Self {
        Self {
            consume_fuel: true,
            ..Default::default()
        }
    }

    /// Create a config with epoch interruption enabled
    pub fn with_epoch_interruption() -> Self {
        Self {
            epoch_interruption: true,
            ..Default::default()
        }
    }

    /// Parse a config from TOML text
    ///
    /// ```toml
    /// consume_fuel = true
    /// epoch_interruption = false
    /// max_stores = 64
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, EngineError> {
        toml::from_str(source).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }

    /// Build the native engine configuration
    pub(crate) fn to_native(&self) -> wasmtime::Config {
        let mut config = wasmtime::Config::new();
        config.consume_fuel(self.consume_fuel);
        config.epoch_interruption(self.epoch_interruption);
        config
    }
}

/// Resource bounds enforced while code runs inside a store
///
/// Each field is `None` for "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLimitsConfig {
    /// Maximum linear memory size in bytes
    pub max_memory_bytes: Option<usize>,

    /// Maximum number of elements in a single table
    pub max_table_elements: Option<usize>,

    /// Maximum number of instances
    pub max_instances: Option<usize>,

    /// Maximum number of tables
    pub max_tables: Option<usize>,

    /// Maximum number of linear memories
    pub max_memories: Option<usize>,
}

impl StoreLimitsConfig {
    /// Create limits from signed bounds where any negative value means
    /// "no limit"
    pub fn from_signed(
        max_memory_bytes: i64,
        max_table_elements: i64,
        max_instances: i64,
        max_tables: i64,
        max_memories: i64,
    ) -> Self {
        fn bound(value: i64) -> Option<usize> {
            usize::try_from(value).ok()
        }

        Self {
            max_memory_bytes: bound(max_memory_bytes),
            max_table_elements: bound(max_table_elements),
            max_instances: bound(max_instances),
            max_tables: bound(max_tables),
            max_memories: bound(max_memories),
        }
    }

    /// Check if every bound is unlimited
    pub fn is_unlimited(&self) -> bool {
        *self == Self::default()
    }

    /// Build the limiter consulted by the engine
    pub(crate) fn to_native(self) -> wasmtime::StoreLimits {
        let mut builder = wasmtime::StoreLimitsBuilder::new()
            .instances(self.max_instances.unwrap_or(usize::MAX))
            .tables(self.max_tables.unwrap_or(usize::MAX))
            .memories(self.max_memories.unwrap_or(usize::MAX));

        if let Some(bytes) = self.max_memory_bytes {
            builder = builder.memory_size(bytes);
        }
        if let Some(elements) = self.max_table_elements {
            builder = builder.table_elements(elements);
        }

        builder.build()
    }
}
