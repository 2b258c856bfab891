//! Target configuration loaded from `releng.toml` at the fleet root.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BuildError, BuildResult};
use crate::target::{BuildTarget, TargetRegistry};

/// Default configuration file name, resolved against the fleet root.
pub const CONFIG_FILE: &str = "releng.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct RelengConfig {
    /// Targets in declaration order.
    #[serde(rename = "target", default)]
    pub targets: Vec<BuildTarget>,
}

/// Load the target configuration from `fleet_root/releng.toml`.
pub fn load_registry(fleet_root: &Path) -> BuildResult<TargetRegistry> {
    let path = fleet_root.join(CONFIG_FILE);
    let text = fs::read_to_string(&path).map_err(|e| BuildError::Config {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    let config: RelengConfig = toml::from_str(&text).map_err(|e| BuildError::Config {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    TargetRegistry::new(config.targets)
}
