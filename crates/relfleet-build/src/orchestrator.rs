//! The dependency-ordered build driver.
//!
//! Resolves requested targets to a deterministic build order, validates
//! release constraints upfront, then dispatches each target to its backend
//! sequentially. Unlike fleet git operations, a backend failure aborts the
//! remaining sequence immediately.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use relfleet_core::versions::is_snapshot;

use crate::backend::BuildBackend;
use crate::error::{BuildError, BuildResult};
use crate::graph::build_order;
use crate::profile::BuildProfile;
use crate::target::TargetRegistry;

/// What a build run did, in execution order.
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub built: Vec<String>,
    /// Targets omitted by the skip-expensive flag.
    pub skipped: Vec<String>,
}

/// Drives targets through their backends in dependency order.
pub struct Builder<'a> {
    registry: &'a TargetRegistry,
    fleet_root: PathBuf,
    /// Include the transitive dependency closure of requested targets.
    with_deps: bool,
}

impl<'a> Builder<'a> {
    pub fn new(fleet_root: impl Into<PathBuf>, registry: &'a TargetRegistry) -> Self {
        Self {
            registry,
            fleet_root: fleet_root.into(),
            with_deps: true,
        }
    }

    /// Restrict the run to exactly the requested targets.
    pub fn without_deps(mut self) -> Self {
        self.with_deps = false;
        self
    }

    /// Build the requested targets with `profile`, dispatching through
    /// `backend`.
    ///
    /// In release mode every resolved target's declared version is checked
    /// before any backend is invoked, so a snapshot dependency aborts with
    /// zero side effects.
    pub async fn build(
        &self,
        profile: &BuildProfile,
        requested: &[String],
        backend: &dyn BuildBackend,
    ) -> BuildResult<BuildSummary> {
        let order = build_order(self.registry, requested, self.with_deps)?;

        if profile.release {
            for name in &order {
                let target = self.lookup(name)?;
                if is_snapshot(&target.version) {
                    return Err(BuildError::NonReleaseDependency {
                        target: target.name.clone(),
                        version: target.version.clone(),
                    });
                }
            }
        }

        if profile.clean_local_repo {
            if let Some(repo) = &profile.local_repo {
                if repo.exists() {
                    info!(repo = %repo.display(), "cleaning local artifact repository");
                    fs::remove_dir_all(repo)?;
                }
            }
        }

        let mut summary = BuildSummary::default();
        for name in &order {
            let target = self.lookup(name)?;

            if profile.skip_expensive && target.expensive {
                info!(target = %name, "skipping expensive target");
                summary.skipped.push(name.clone());
                continue;
            }

            info!(target = %name, backend = target.backend.name(), "building");
            let output = backend.invoke(target, profile).await?;
            if !output.success {
                warn!(target = %name, exit_code = output.exit_code, "backend failed");
                return Err(BuildError::Backend {
                    target: name.clone(),
                    detail: if output.stderr.trim().is_empty() {
                        format!("exited with code {}", output.exit_code)
                    } else {
                        output.stderr.trim().to_string()
                    },
                });
            }

            if let (Some(dest), Some(artifact_dir)) =
                (&profile.copy_artifacts, &target.artifact_dir)
            {
                let src = self.fleet_root.join(&target.path).join(artifact_dir);
                if src.is_dir() {
                    copy_tree(&src, dest)?;
                    info!(target = %name, dest = %dest.display(), "copied artifacts");
                }
            }

            summary.built.push(name.clone());
        }

        Ok(summary)
    }

    fn lookup(&self, name: &str) -> BuildResult<&crate::target::BuildTarget> {
        self.registry
            .get(name)
            .ok_or_else(|| BuildError::UnknownTarget {
                target: name.to_string(),
            })
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let to = dest.join(entry.file_name());
        if entry.path().is_dir() {
            copy_tree(&entry.path(), &to)?;
        } else {
            fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}
