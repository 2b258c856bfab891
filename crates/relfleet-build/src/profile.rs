//! The immutable configuration bundle threaded through a build run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Verbosity handed to build backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
}

/// JVM-style memory settings forwarded to backends as build options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySettings {
    pub stack: String,
    pub min_heap: String,
    pub max_heap: String,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            stack: "16M".to_string(),
            min_heap: "512M".to_string(),
            max_heap: "1024M".to_string(),
        }
    }
}

/// Configuration for one build run. Constructed once per invocation and
/// never mutated mid-run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildProfile {
    /// Build-identity qualifier injected as a version suffix.
    pub qualifier: Option<String>,
    /// Run the backend's clean phase first.
    pub clean: bool,
    /// Deploy artifacts after building.
    pub deploy: bool,
    /// Release build: validate upfront that every resolved target declares
    /// a non-snapshot version.
    pub release: bool,
    pub skip_tests: bool,
    /// Omit long-running targets, for a fast follow-up pass.
    pub skip_expensive: bool,
    pub offline: bool,
    pub verbosity: Verbosity,
    pub memory: MemorySettings,
    /// Copy produced artifacts to this directory after each target.
    pub copy_artifacts: Option<PathBuf>,
    /// Remove the local artifact repository before building.
    pub clean_local_repo: bool,
    /// Location of the local artifact repository.
    pub local_repo: Option<PathBuf>,
    /// Backend settings file, forwarded verbatim.
    pub settings_file: Option<PathBuf>,
    /// Global backend settings file, forwarded verbatim.
    pub global_settings_file: Option<PathBuf>,
}

impl BuildProfile {
    /// Assembled memory options in the conventional `-Xss/-Xms/-Xmx` form.
    pub fn build_opts(&self) -> String {
        format!(
            "-Xss{} -Xms{} -Xmx{}",
            self.memory.stack, self.memory.min_heap, self.memory.max_heap
        )
    }
}
