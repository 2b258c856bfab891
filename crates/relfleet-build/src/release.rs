//! The release workflow.
//!
//! Moves the whole fleet from a development version to a tagged release and
//! back onto the next development version, as a linear state machine. Every
//! mutating step is gated through the injected [`Confirmer`]; a refusal
//! aborts the run and records where it stopped. The workflow is not
//! resumable: an abort or failure leaves repositories for the operator to
//! inspect.

use std::path::Path;

use tracing::info;

use relfleet_core::confirm::Confirmer;
use relfleet_core::error::ValidationError;
use relfleet_core::versions::{self, is_snapshot, VersionRewriteSpec};
use relfleet_core::Fleet;

use crate::backend::BuildBackend;
use crate::error::{BuildError, BuildResult};
use crate::orchestrator::Builder;
use crate::profile::BuildProfile;
use crate::target::TargetRegistry;

/// Steps of the release state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    Start,
    /// Release branch checked out, develop merged in, versions set to the
    /// release version.
    VersionBumpRelease,
    /// Optional release build on the release branch.
    BuildReleaseBranch,
    TagRelease,
    MergeBackToDevelop,
    /// Versions on develop set to the next development version.
    VersionBumpDevelop,
    Push,
    Done,
    Aborted,
}

/// How a release run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Completed,
    /// The operator refused a confirmation; `at` is the step that was about
    /// to run.
    Aborted { at: ReleaseState },
}

/// Branches and versions for one release.
#[derive(Debug, Clone)]
pub struct ReleaseParams {
    pub release_branch: String,
    pub develop_branch: String,
    /// Version currently on the develop branch.
    pub cur_develop_version: String,
    /// Version to release and tag.
    pub next_release_version: String,
    /// Development version to move to afterwards.
    pub next_develop_version: String,
}

/// Build to run on the release branch before tagging.
pub struct ReleaseBuild<'a> {
    pub registry: &'a TargetRegistry,
    pub profile: BuildProfile,
    pub requested: Vec<String>,
    pub backend: &'a dyn BuildBackend,
}

pub struct ReleaseWorkflow<'a> {
    fleet: &'a Fleet,
    params: ReleaseParams,
    state: ReleaseState,
}

impl<'a> ReleaseWorkflow<'a> {
    pub fn new(fleet: &'a Fleet, params: ReleaseParams) -> Self {
        Self {
            fleet,
            params,
            state: ReleaseState::Start,
        }
    }

    /// Step the workflow was last in.
    pub fn state(&self) -> ReleaseState {
        self.state
    }

    /// Run the release to completion or the first refusal.
    pub async fn run(
        &mut self,
        confirmer: &dyn Confirmer,
        build: Option<ReleaseBuild<'_>>,
    ) -> BuildResult<ReleaseOutcome> {
        self.validate()?;
        if let Ok(exe) = std::env::current_exe() {
            guard_exe_location(&exe, &self.fleet.root().path)?;
        }
        let p = self.params.clone();

        if !confirmer.confirm(
            &format!(
                "Checkout {rel}, merge {dev} into it, and set versions from {from} to {to} \
                 across the fleet.",
                rel = p.release_branch,
                dev = p.develop_branch,
                from = p.cur_develop_version,
                to = p.next_release_version,
            ),
            1,
        ) {
            return Ok(self.abort(ReleaseState::VersionBumpRelease));
        }
        self.state = ReleaseState::VersionBumpRelease;
        self.checkout_all(&p.release_branch)?;
        self.merge_all(&p.develop_branch)?;
        versions::rewrite(
            self.fleet,
            &VersionRewriteSpec {
                from: p.cur_develop_version.clone(),
                to: p.next_release_version.clone(),
                commit: true,
                dry_run: false,
            },
        )?;

        if let Some(build) = build {
            self.state = ReleaseState::BuildReleaseBranch;
            info!("building the release branch");
            let mut profile = build.profile;
            profile.release = true;
            Builder::new(self.fleet.root().path.clone(), build.registry)
                .build(&profile, &build.requested, build.backend)
                .await?;
        }

        if !confirmer.confirm(
            &format!("Create tag {} in every repository.", p.next_release_version),
            1,
        ) {
            return Ok(self.abort(ReleaseState::TagRelease));
        }
        self.state = ReleaseState::TagRelease;
        let message = format!("Release {}", p.next_release_version);
        for repo in self.fleet.iter_all() {
            relfleet_core::git::tag(&repo.path, &p.next_release_version, Some(&message))?;
        }

        if !confirmer.confirm(
            &format!(
                "Checkout {dev} and merge {rel} back into it.",
                dev = p.develop_branch,
                rel = p.release_branch,
            ),
            1,
        ) {
            return Ok(self.abort(ReleaseState::MergeBackToDevelop));
        }
        self.state = ReleaseState::MergeBackToDevelop;
        self.checkout_all(&p.develop_branch)?;
        self.merge_all(&p.release_branch)?;

        self.state = ReleaseState::VersionBumpDevelop;
        versions::rewrite(
            self.fleet,
            &VersionRewriteSpec {
                from: p.next_release_version.clone(),
                to: p.next_develop_version.clone(),
                commit: true,
                dry_run: false,
            },
        )?;

        if !confirmer.confirm(
            &format!(
                "Push {dev} and {rel} (with tags) in every repository.",
                dev = p.develop_branch,
                rel = p.release_branch,
            ),
            1,
        ) {
            return Ok(self.abort(ReleaseState::Push));
        }
        self.state = ReleaseState::Push;
        for repo in self.fleet.iter_all() {
            relfleet_core::git::push_branch(&repo.path, &p.develop_branch)?;
            relfleet_core::git::push_branch(&repo.path, &p.release_branch)?;
        }

        self.state = ReleaseState::Done;
        info!(version = %p.next_release_version, "release complete");
        Ok(ReleaseOutcome::Completed)
    }

    fn validate(&self) -> BuildResult<()> {
        let p = &self.params;
        for (name, value) in [
            ("release branch", &p.release_branch),
            ("develop branch", &p.develop_branch),
            ("current develop version", &p.cur_develop_version),
            ("next release version", &p.next_release_version),
            ("next develop version", &p.next_develop_version),
        ] {
            if value.is_empty() {
                return Err(ValidationError::MissingParameter {
                    name: name.to_string(),
                }
                .into());
            }
        }
        if is_snapshot(&p.next_release_version) {
            return Err(ValidationError::SnapshotVersion {
                what: "next release version".to_string(),
                version: p.next_release_version.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn abort(&mut self, at: ReleaseState) -> ReleaseOutcome {
        info!(?at, "release aborted by operator");
        self.state = ReleaseState::Aborted;
        ReleaseOutcome::Aborted { at }
    }

    fn checkout_all(&self, branch: &str) -> BuildResult<()> {
        for repo in self.fleet.iter_all() {
            relfleet_core::git::checkout(&repo.path, branch)?;
        }
        Ok(())
    }

    fn merge_all(&self, branch: &str) -> BuildResult<()> {
        for repo in self.fleet.iter_all() {
            relfleet_core::git::merge(&repo.path, branch)?;
        }
        Ok(())
    }
}

/// Releasing a fleet that contains the running executable would rewrite the
/// tool out from under itself.
fn guard_exe_location(exe: &Path, fleet_root: &Path) -> BuildResult<()> {
    if exe.starts_with(fleet_root) {
        return Err(BuildError::StateMismatch(format!(
            "running executable {} resides inside the fleet at {}",
            exe.display(),
            fleet_root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use relfleet_core::confirm::{AutoConfirmer, DenyConfirmer};
    use relfleet_core::git;

    use super::*;

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

    fn init_repo(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        run(dir, &["init", "-b", "main"]);
        run(dir, &["config", "user.name", "test-user"]);
        run(dir, &["config", "user.email", "test@example.com"]);
        run(dir, &["commit", "--allow-empty", "-m", "initial"]);
    }

    fn add_bare_origin(repo: &Path, store: &Path) -> PathBuf {
        let bare = store.join(format!(
            "{}.git",
            repo.file_name().unwrap().to_string_lossy()
        ));
        run(
            repo,
            &["clone", "--bare", ".", &bare.to_string_lossy()],
        );
        run(repo, &["remote", "add", "origin", &bare.to_string_lossy()]);
        run(repo, &["fetch", "origin"]);
        bare
    }

    /// Root plus one member, both with develop and release branches, the
    /// member carrying a versioned build.properties on develop.
    fn make_release_fleet(tmp: &Path) -> Fleet {
        let root = tmp.join("fleet");
        init_repo(&root);
        let member = root.join("app");
        init_repo(&member);
        std::fs::write(member.join("build.properties"), "version=2.1.0-SNAPSHOT\n").unwrap();
        run(&member, &["add", "build.properties"]);
        run(&member, &["commit", "-m", "add version"]);

        std::fs::write(
            root.join(".gitmodules"),
            "[submodule \"app\"]\n\tpath = app\n\turl = ../app\n\tbranch = develop\n",
        )
        .unwrap();
        run(&root, &["add", ".gitmodules"]);
        run(&root, &["commit", "-m", "declare member"]);

        for repo in [&root, &member] {
            run(repo, &["branch", "develop"]);
            run(repo, &["branch", "release"]);
            run(repo, &["checkout", "develop"]);
        }
        Fleet::discover(&root).unwrap()
    }

    #[test]
    fn exe_inside_the_fleet_is_a_state_mismatch() {
        let err =
            guard_exe_location(Path::new("/fleet/tools/relfleet"), Path::new("/fleet"))
                .unwrap_err();
        assert!(matches!(err, BuildError::StateMismatch(_)));
        assert!(
            guard_exe_location(Path::new("/usr/local/bin/relfleet"), Path::new("/fleet")).is_ok()
        );
    }

    #[test]
    fn snapshot_release_version_is_rejected_upfront() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_release_fleet(dir.path());
        let mut workflow = ReleaseWorkflow::new(
            &fleet,
            ReleaseParams {
                release_branch: "release".to_string(),
                develop_branch: "develop".to_string(),
                cur_develop_version: "2.1.0-SNAPSHOT".to_string(),
                next_release_version: "2.1.0-SNAPSHOT".to_string(),
                next_develop_version: "2.2.0-SNAPSHOT".to_string(),
            },
        );
        let err = tokio_test_block_on(workflow.run(&AutoConfirmer, None)).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Validation(ValidationError::SnapshotVersion { .. })
        ));
    }

    #[test]
    fn refusing_the_first_gate_leaves_the_fleet_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_release_fleet(dir.path());
        let member = fleet.members()[0].path.clone();
        let before = git::head_commit(&member).unwrap();

        let mut workflow = ReleaseWorkflow::new(&fleet, params());
        let outcome = tokio_test_block_on(workflow.run(&DenyConfirmer, None)).unwrap();

        assert_eq!(
            outcome,
            ReleaseOutcome::Aborted {
                at: ReleaseState::VersionBumpRelease
            }
        );
        assert_eq!(workflow.state(), ReleaseState::Aborted);
        assert_eq!(git::current_branch(&member).unwrap(), "develop");
        assert_eq!(git::head_commit(&member).unwrap().hash, before.hash);
    }

    #[test]
    fn full_release_tags_and_moves_to_next_develop_version() {
        let dir = tempfile::tempdir().unwrap();
        let fleet = make_release_fleet(dir.path());
        let store = tempfile::tempdir().unwrap();
        add_bare_origin(&fleet.root().path, store.path());
        let member = fleet.members()[0].path.clone();
        add_bare_origin(&member, store.path());

        let mut workflow = ReleaseWorkflow::new(&fleet, params());
        let outcome = tokio_test_block_on(workflow.run(&AutoConfirmer, None)).unwrap();

        assert_eq!(outcome, ReleaseOutcome::Completed);
        assert_eq!(workflow.state(), ReleaseState::Done);

        // Develop carries the next development version.
        assert_eq!(git::current_branch(&member).unwrap(), "develop");
        let props = std::fs::read_to_string(member.join("build.properties")).unwrap();
        assert_eq!(props, "version=2.2.0-SNAPSHOT\n");

        // The release branch carries the released version, tagged.
        git::checkout(&member, "release").unwrap();
        let props = std::fs::read_to_string(member.join("build.properties")).unwrap();
        assert_eq!(props, "version=2.1.0\n");
        let tags = git::run_git(&member, &["tag", "--list"]).unwrap();
        assert!(tags.contains("2.1.0"));
    }

    fn params() -> ReleaseParams {
        ReleaseParams {
            release_branch: "release".to_string(),
            develop_branch: "develop".to_string(),
            cur_develop_version: "2.1.0-SNAPSHOT".to_string(),
            next_release_version: "2.1.0".to_string(),
            next_develop_version: "2.2.0-SNAPSHOT".to_string(),
        }
    }

    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
