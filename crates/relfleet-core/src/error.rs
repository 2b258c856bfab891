//! Error taxonomy for fleet-level operations.

use std::path::PathBuf;

/// Errors caught before any repository is mutated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("missing mandatory parameter: {name}")]
    MissingParameter { name: String },

    #[error("{what} must be a release version, got snapshot version {version}")]
    SnapshotVersion { what: String, version: String },

    #[error("from-version and to-version are both {version}, nothing to rewrite")]
    SameVersion { version: String },

    #[error("no descriptor in the fleet declares version {version}")]
    VersionNotFound { version: String },
}

/// Errors produced by fleet discovery and git-level operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("git failure in {repo}: {detail}")]
    Git { repo: PathBuf, detail: String },

    #[error("cannot map remote URL to requested scheme: {url}")]
    UnknownRemoteScheme { url: String },

    #[error("descriptor {file}: {detail}")]
    Descriptor { file: PathBuf, detail: String },

    #[error("state mismatch: {0}")]
    StateMismatch(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fleet-level operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_error_displays_repo_and_detail() {
        let err = FleetError::Git {
            repo: PathBuf::from("/fleet/runtime"),
            detail: "merge conflict in lib.rs".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/fleet/runtime"));
        assert!(msg.contains("merge conflict"));
    }

    #[test]
    fn snapshot_version_error_displays_version() {
        let err = ValidationError::SnapshotVersion {
            what: "baseline".to_string(),
            version: "2.0.0-SNAPSHOT".to_string(),
        };
        assert!(err.to_string().contains("2.0.0-SNAPSHOT"));
    }

    #[test]
    fn validation_error_converts_to_fleet_error() {
        let err: FleetError = ValidationError::MissingParameter {
            name: "branch".to_string(),
        }
        .into();
        assert!(err.to_string().contains("branch"));
    }
}
