//! Boundary configuration.

use membrane_abi::HOST_MODULE;
use membrane_host::RealmConfig;
use serde::{Deserialize, Serialize};

/// Settings for loading and running a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Namespace the capability imports are linked under.
    pub import_module: String,
    /// Compile byte streams as they are read instead of buffering them.
    pub streaming_compilation: bool,
    /// Execution budget per store; `None` disables fuel metering.
    pub fuel: Option<u64>,
    /// Initial handle table capacity.
    pub heap_capacity: usize,
    /// Settings of the realm created for the module.
    pub realm: RealmConfig,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            import_module: HOST_MODULE.to_string(),
            streaming_compilation: true,
            fuel: None,
            heap_capacity: 128,
            realm: RealmConfig::default(),
        }
    }
}

impl BoundaryConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
