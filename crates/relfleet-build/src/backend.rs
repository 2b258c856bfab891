//! Build backend invocation.
//!
//! [`BuildBackend`] is the seam between the orchestrator and external
//! build tools: inject [`ProcessBackend`] for real builds, or a stub for
//! tests. The process contract hands the target's command the serialized
//! [`BuildProfile`] in `RELFLEET_PROFILE` plus flat convenience variables,
//! and reports the exit status with captured diagnostics.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::error::{BuildError, BuildResult};
use crate::profile::{BuildProfile, Verbosity};
use crate::target::{BackendKind, BuildTarget};

/// Result of one backend invocation.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub target: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// External build backend, one invocation per target.
#[async_trait::async_trait]
pub trait BuildBackend: Send + Sync {
    async fn invoke(&self, target: &BuildTarget, profile: &BuildProfile)
        -> BuildResult<BackendOutput>;
}

/// Runs backend commands as subprocesses in the target's directory.
pub struct ProcessBackend {
    fleet_root: PathBuf,
}

impl ProcessBackend {
    pub fn new(fleet_root: impl Into<PathBuf>) -> Self {
        Self {
            fleet_root: fleet_root.into(),
        }
    }
}

#[async_trait::async_trait]
impl BuildBackend for ProcessBackend {
    async fn invoke(
        &self,
        target: &BuildTarget,
        profile: &BuildProfile,
    ) -> BuildResult<BackendOutput> {
        let command = match target.backend {
            BackendKind::Tool | BackendKind::Source => &target.command,
            BackendKind::Bootstrap => &target.bootstrap_command,
        };
        let Some((exe, args)) = command.split_first() else {
            return Err(BuildError::MissingCommand {
                target: target.name.clone(),
                backend: target.backend.name().to_string(),
            });
        };

        let profile_json =
            serde_json::to_string(profile).map_err(|e| BuildError::Backend {
                target: target.name.clone(),
                detail: format!("profile serialization failed: {e}"),
            })?;

        let start = Instant::now();
        let child = Command::new(exe)
            .args(args)
            .current_dir(self.fleet_root.join(&target.path))
            .env("RELFLEET_PROFILE", profile_json)
            .env("RELFLEET_TARGET", &target.name)
            .env("RELFLEET_VERSION", &target.version)
            .env(
                "RELFLEET_QUALIFIER",
                profile.qualifier.as_deref().unwrap_or(""),
            )
            .env("RELFLEET_BUILD_OPTS", profile.build_opts())
            .env("RELFLEET_SKIP_TESTS", flag(profile.skip_tests))
            .env("RELFLEET_OFFLINE", flag(profile.offline))
            .env("RELFLEET_DEPLOY", flag(profile.deploy))
            .env("RELFLEET_CLEAN", flag(profile.clean))
            .env(
                "RELFLEET_QUIET",
                flag(profile.verbosity == Verbosity::Quiet),
            )
            .env(
                "RELFLEET_DEBUG",
                flag(profile.verbosity == Verbosity::Debug),
            )
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::Backend {
                target: target.name.clone(),
                detail: format!("failed to spawn {exe}: {e}"),
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BuildError::Backend {
                target: target.name.clone(),
                detail: format!("waiting for {exe} failed: {e}"),
            })?;

        Ok(BackendOutput {
            target: target.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}
