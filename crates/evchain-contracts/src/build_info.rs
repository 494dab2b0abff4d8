//! Build/runtime metadata attached to events by collaborators.
//!
//! The log stores `build` as an opaque map; `BuildInfo` is the conventional
//! shape the runner and its bridges use.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub tool: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
}

impl BuildInfo {
    /// Metadata for the running binary.
    pub fn current(tool: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("tool".to_string(), Value::String(self.tool.clone()));
        map.insert("version".to_string(), Value::String(self.version.clone()));
        map.insert("platform".to_string(), Value::String(self.platform.clone()));
        map.insert("arch".to_string(), Value::String(self.arch.clone()));
        map
    }
}
