//! Realm configuration.

use serde::{Deserialize, Serialize};

/// Settings of a host realm.
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Origin reported for the document; relative fetch URLs resolve
    /// against it.
    pub origin: String,
    /// When false, the storage getters throw `SecurityError`.
    pub storage_enabled: bool,
    /// Byte budget of each storage area (keys plus values, UTF-8).
    pub storage_quota_bytes: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            storage_enabled: true,
            storage_quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl RealmConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
