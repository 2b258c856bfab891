//! The bootstrap workflow.
//!
//! Rebuilds self-hosting targets from a previously released baseline: the
//! fleet's descriptors are moved from the baseline version to the current
//! development version in the working tree (not committed), then the
//! requested targets are built with their bootstrap commands.

use tracing::info;

use relfleet_core::confirm::Confirmer;
use relfleet_core::error::ValidationError;
use relfleet_core::versions::{self, is_snapshot, VersionRewriteSpec};
use relfleet_core::Fleet;

use crate::backend::BuildBackend;
use crate::error::BuildResult;
use crate::orchestrator::Builder;
use crate::profile::BuildProfile;
use crate::target::TargetRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Start,
    ValidateBaseline,
    /// Descriptors moved from the baseline to the current version.
    VersionBumpFromBaseline,
    Build,
    Done,
    Aborted,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Completed,
    Aborted { at: BootstrapState },
}

/// Versions for one bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapParams {
    /// Current development version of the fleet.
    pub current_version: String,
    /// Released baseline version the descriptors still reference.
    pub baseline_version: String,
}

pub struct BootstrapBuild<'a> {
    pub registry: &'a TargetRegistry,
    pub profile: BuildProfile,
    pub requested: Vec<String>,
    pub backend: &'a dyn BuildBackend,
}

pub struct BootstrapWorkflow<'a> {
    fleet: &'a Fleet,
    params: BootstrapParams,
    state: BootstrapState,
}

impl<'a> BootstrapWorkflow<'a> {
    pub fn new(fleet: &'a Fleet, params: BootstrapParams) -> Self {
        Self {
            fleet,
            params,
            state: BootstrapState::Start,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    pub async fn run(
        &mut self,
        confirmer: &dyn Confirmer,
        build: BootstrapBuild<'_>,
    ) -> BuildResult<BootstrapOutcome> {
        self.state = BootstrapState::ValidateBaseline;
        self.validate()?;
        let p = self.params.clone();

        if !confirmer.confirm(
            &format!(
                "Set versions from baseline {} to {} in the working tree (uncommitted).",
                p.baseline_version, p.current_version,
            ),
            1,
        ) {
            return Ok(self.abort(BootstrapState::VersionBumpFromBaseline));
        }
        self.state = BootstrapState::VersionBumpFromBaseline;
        let changes = versions::rewrite(
            self.fleet,
            &VersionRewriteSpec {
                from: p.baseline_version.clone(),
                to: p.current_version.clone(),
                commit: false,
                dry_run: false,
            },
        )?;
        // Descriptors that never mention the baseline would bootstrap
        // against nothing.
        if changes.is_empty() {
            return Err(ValidationError::VersionNotFound {
                version: p.baseline_version.clone(),
            }
            .into());
        }
        info!(changes = changes.len(), "descriptors moved off the baseline");

        self.state = BootstrapState::Build;
        Builder::new(self.fleet.root().path.clone(), build.registry)
            .build(&build.profile, &build.requested, build.backend)
            .await?;

        self.state = BootstrapState::Done;
        Ok(BootstrapOutcome::Completed)
    }

    fn validate(&self) -> BuildResult<()> {
        let p = &self.params;
        for (name, value) in [
            ("current version", &p.current_version),
            ("baseline version", &p.baseline_version),
        ] {
            if value.is_empty() {
                return Err(ValidationError::MissingParameter {
                    name: name.to_string(),
                }
                .into());
            }
        }
        if is_snapshot(&p.baseline_version) {
            return Err(ValidationError::SnapshotVersion {
                what: "baseline version".to_string(),
                version: p.baseline_version.clone(),
            }
            .into());
        }
        if p.baseline_version == p.current_version {
            return Err(ValidationError::SameVersion {
                version: p.baseline_version.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn abort(&mut self, at: BootstrapState) -> BootstrapOutcome {
        info!(?at, "bootstrap aborted by operator");
        self.state = BootstrapState::Aborted;
        BootstrapOutcome::Aborted { at }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;
    use std::sync::Mutex;

    use relfleet_core::confirm::{AutoConfirmer, DenyConfirmer};

    use super::*;
    use crate::backend::BackendOutput;
    use crate::error::BuildError;
    use crate::target::testutil::target;
    use crate::target::BuildTarget;

    struct RecordingBackend {
        invoked: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl BuildBackend for RecordingBackend {
        async fn invoke(
            &self,
            target: &BuildTarget,
            _profile: &BuildProfile,
        ) -> BuildResult<BackendOutput> {
            self.invoked.lock().unwrap().push(target.name.clone());
            Ok(BackendOutput {
                target: target.name.clone(),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 1,
                success: true,
            })
        }
    }

    fn run(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", "2023-01-01T12:00:00 +0000")
            .env("GIT_COMMITTER_DATE", "2023-01-01T12:00:00 +0000")
            .output()
            .expect("git runs");
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    fn make_fleet(tmp: &Path, properties: &str) -> Fleet {
        let root = tmp.join("fleet");
        std::fs::create_dir_all(&root).unwrap();
        run(&root, &["init", "-b", "main"]);
        run(&root, &["config", "user.name", "test-user"]);
        run(&root, &["config", "user.email", "test@example.com"]);
        std::fs::write(root.join("build.properties"), properties).unwrap();
        run(&root, &["add", "build.properties"]);
        run(&root, &["commit", "-m", "initial"]);
        Fleet::discover(&root).unwrap()
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    fn build<'a>(
        registry: &'a TargetRegistry,
        backend: &'a RecordingBackend,
    ) -> BootstrapBuild<'a> {
        BootstrapBuild {
            registry,
            profile: BuildProfile::default(),
            requested: vec!["compiler".to_string()],
            backend,
        }
    }

    #[test]
    fn snapshot_baseline_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_fleet(dir.path(), "version=2.0.0\n");
        let registry = TargetRegistry::new(vec![target("compiler", &[])]).unwrap();
        let backend = RecordingBackend {
            invoked: Mutex::new(Vec::new()),
        };

        let mut workflow = BootstrapWorkflow::new(
            &fleet,
            BootstrapParams {
                current_version: "2.1.0-SNAPSHOT".to_string(),
                baseline_version: "2.0.0-SNAPSHOT".to_string(),
            },
        );
        let err = block_on(workflow.run(&AutoConfirmer, build(&registry, &backend))).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::SnapshotVersion { .. })
        ));
        assert!(backend.invoked.lock().unwrap().is_empty());
    }

    #[test]
    fn baseline_equal_to_current_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_fleet(dir.path(), "version=2.0.0\n");
        let registry = TargetRegistry::new(vec![target("compiler", &[])]).unwrap();
        let backend = RecordingBackend {
            invoked: Mutex::new(Vec::new()),
        };

        let mut workflow = BootstrapWorkflow::new(
            &fleet,
            BootstrapParams {
                current_version: "2.0.0".to_string(),
                baseline_version: "2.0.0".to_string(),
            },
        );
        let err = block_on(workflow.run(&AutoConfirmer, build(&registry, &backend))).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::SameVersion { .. })
        ));
    }

    #[test]
    fn missing_baseline_in_descriptors_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Descriptor references a different version entirely.
        let fleet = make_fleet(dir.path(), "version=9.9.9\n");
        let registry = TargetRegistry::new(vec![target("compiler", &[])]).unwrap();
        let backend = RecordingBackend {
            invoked: Mutex::new(Vec::new()),
        };

        let mut workflow = BootstrapWorkflow::new(
            &fleet,
            BootstrapParams {
                current_version: "2.1.0-SNAPSHOT".to_string(),
                baseline_version: "2.0.0".to_string(),
            },
        );
        let err = block_on(workflow.run(&AutoConfirmer, build(&registry, &backend))).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::VersionNotFound { .. })
        ));
        assert!(backend.invoked.lock().unwrap().is_empty());
    }

    #[test]
    fn refusal_aborts_before_touching_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_fleet(dir.path(), "version=2.0.0\n");
        let registry = TargetRegistry::new(vec![target("compiler", &[])]).unwrap();
        let backend = RecordingBackend {
            invoked: Mutex::new(Vec::new()),
        };

        let mut workflow = BootstrapWorkflow::new(
            &fleet,
            BootstrapParams {
                current_version: "2.1.0-SNAPSHOT".to_string(),
                baseline_version: "2.0.0".to_string(),
            },
        );
        let outcome =
            block_on(workflow.run(&DenyConfirmer, build(&registry, &backend))).unwrap();
        assert_eq!(
            outcome,
            BootstrapOutcome::Aborted {
                at: BootstrapState::VersionBumpFromBaseline
            }
        );
        assert_eq!(workflow.state(), BootstrapState::Aborted);
        let props =
            std::fs::read_to_string(fleet.root().path.join("build.properties")).unwrap();
        assert_eq!(props, "version=2.0.0\n");
    }

    #[test]
    fn bootstrap_moves_descriptors_and_builds() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_fleet(dir.path(), "version=2.0.0\n");
        let registry = TargetRegistry::new(vec![target("compiler", &[])]).unwrap();
        let backend = RecordingBackend {
            invoked: Mutex::new(Vec::new()),
        };

        let mut workflow = BootstrapWorkflow::new(
            &fleet,
            BootstrapParams {
                current_version: "2.1.0-SNAPSHOT".to_string(),
                baseline_version: "2.0.0".to_string(),
            },
        );
        let outcome =
            block_on(workflow.run(&AutoConfirmer, build(&registry, &backend))).unwrap();
        assert_eq!(outcome, BootstrapOutcome::Completed);
        assert_eq!(workflow.state(), BootstrapState::Done);
        assert_eq!(*backend.invoked.lock().unwrap(), vec!["compiler"]);

        // Uncommitted working-tree change only.
        let props =
            std::fs::read_to_string(fleet.root().path.join("build.properties")).unwrap();
        assert_eq!(props, "version=2.1.0-SNAPSHOT\n");
        let status = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&fleet.root().path)
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&status.stdout).contains("build.properties"));
    }
}
