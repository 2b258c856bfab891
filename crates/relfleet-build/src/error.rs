//! Error types for build orchestration and workflows.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the build graph orchestrator and the release and
/// bootstrap workflows.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A dependency cycle was detected among build targets. Cycles are a
    /// configuration error, never a runtime condition to recover from.
    #[error("dependency cycle detected involving targets: {targets:?}")]
    DependencyCycle { targets: Vec<String> },

    /// A requested or referenced target is not declared.
    #[error("unknown build target: {target}")]
    UnknownTarget { target: String },

    /// Two targets share a name in the configuration.
    #[error("duplicate build target: {target}")]
    DuplicateTarget { target: String },

    /// No components were requested.
    #[error("no build targets requested")]
    NoTargetsRequested,

    /// Release-mode validation found an unreleased dependency.
    #[error("release build requires release versions, but {target} declares {version}")]
    NonReleaseDependency { target: String, version: String },

    /// A target declares no command for its backend kind.
    #[error("target {target} has no command for its {backend} backend")]
    MissingCommand { target: String, backend: String },

    /// An external build backend failed; `detail` is its diagnostic verbatim.
    #[error("backend failed for target {target}: {detail}")]
    Backend { target: String, detail: String },

    /// The target configuration file could not be read or parsed.
    #[error("configuration {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    /// Guard failures checked before any mutation.
    #[error("state mismatch: {0}")]
    StateMismatch(String),

    /// Bubbled-up fleet-level error.
    #[error(transparent)]
    Fleet(#[from] relfleet_core::FleetError),

    /// Bubbled-up validation error.
    #[error("validation error: {0}")]
    Validation(#[from] relfleet_core::ValidationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_displays_target_names() {
        let err = BuildError::DependencyCycle {
            targets: vec!["compiler".to_string(), "runtime".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("compiler"));
        assert!(msg.contains("runtime"));
    }

    #[test]
    fn backend_error_surfaces_diagnostic_verbatim() {
        let err = BuildError::Backend {
            target: "docs".to_string(),
            detail: "error: linker exited with code 1".to_string(),
        };
        assert!(err.to_string().contains("linker exited with code 1"));
    }

    #[test]
    fn non_release_error_names_target_and_version() {
        let err = BuildError::NonReleaseDependency {
            target: "runtime".to_string(),
            version: "1.2.0-SNAPSHOT".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("runtime"));
        assert!(msg.contains("1.2.0-SNAPSHOT"));
    }
}
