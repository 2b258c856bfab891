//! Build orchestration for a fleet: target configuration, dependency
//! ordering, backend invocation, and the release and bootstrap workflows.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod profile;
pub mod release;
pub mod target;

pub use backend::{BackendOutput, BuildBackend, ProcessBackend};
pub use bootstrap::{
    BootstrapBuild, BootstrapOutcome, BootstrapParams, BootstrapState, BootstrapWorkflow,
};
pub use config::{load_registry, RelengConfig, CONFIG_FILE};
pub use error::{BuildError, BuildResult};
pub use graph::build_order;
pub use orchestrator::{BuildSummary, Builder};
pub use profile::{BuildProfile, MemorySettings, Verbosity};
pub use release::{
    ReleaseBuild, ReleaseOutcome, ReleaseParams, ReleaseState, ReleaseWorkflow,
};
pub use target::{BackendKind, BuildTarget, TargetRegistry};
