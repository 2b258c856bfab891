//! relfleet core library
//!
//! Fleet-level primitives for release engineering over a multi-repository
//! product: discovery of the repository fleet, uniform git operations with
//! per-repository outcome reporting, reproducible build qualifiers, and
//! structural version rewriting across build descriptors.

pub mod confirm;
pub mod error;
pub mod fleet;
pub mod git;
pub mod ops;
pub mod qualifier;
pub mod telemetry;
pub mod versions;

pub use confirm::{AutoConfirmer, Confirmer, DenyConfirmer, StdinConfirmer};
pub use error::{FleetError, Result, ValidationError};
pub use fleet::{Fleet, Repository};
pub use git::HeadCommit;
pub use ops::{apply, convert_remote_url, FleetOp, FleetReport, RemoteKind, RepoOutcome};
pub use qualifier::{
    compute_now_qualifier, compute_qualifier, has_changed, DEFAULT_RECORD_FILE,
};
pub use telemetry::init_tracing;
pub use versions::{is_snapshot, Change, ChangeSet, VersionRewriteSpec};

/// relfleet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
