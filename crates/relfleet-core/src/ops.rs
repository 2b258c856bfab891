//! Uniform git operations over every member of a fleet.
//!
//! [`apply`] runs one [`FleetOp`] against each member in declaration order
//! and collects per-repository outcomes. A failing repository never blocks
//! the rest; callers judge overall success from the [`FleetReport`].
//! Confirmation of destructive operations is a caller concern — see
//! [`crate::confirm`].

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{FleetError, Result};
use crate::fleet::{Fleet, Repository};
use crate::git;

/// Remote URL scheme for [`FleetOp::SetRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Ssh,
    Http,
}

/// One git-level operation applied uniformly across the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetOp {
    /// Leave any detached-HEAD state by returning to the tracked branch.
    Checkout,
    /// Hard-reset the working tree; `to_remote` also discards unpushed
    /// commits by resetting to the tracked remote branch.
    Reset { to_remote: bool },
    /// Remove untracked files and directories.
    Clean,
    /// Fetch and fast-forward to the latest remote commit on the tracked
    /// branch. `depth` bounds fetch history.
    Update { depth: Option<u32> },
    /// Set each local branch to track its configured remote branch.
    Track,
    /// Merge the named branch into the current branch.
    Merge { branch: String },
    /// Create an annotated tag.
    Tag {
        name: String,
        message: Option<String>,
    },
    /// Push the current branch to its remote.
    Push,
    /// Rewrite the remote URL scheme by convention.
    SetRemote { kind: RemoteKind },
}

impl FleetOp {
    /// True for operations that irreversibly destroy local work.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            FleetOp::Reset { to_remote: true } | FleetOp::Clean
        )
    }

    /// How many consecutive confirmations a prompt should require before
    /// running this operation. Zero means no prompt is warranted.
    pub fn severity(&self) -> u8 {
        match self {
            FleetOp::Reset { to_remote: true } => 3,
            FleetOp::Reset { to_remote: false } | FleetOp::Clean => 2,
            FleetOp::Checkout | FleetOp::Merge { .. } | FleetOp::Tag { .. } | FleetOp::Push => 1,
            FleetOp::Update { .. } | FleetOp::Track | FleetOp::SetRemote { .. } => 0,
        }
    }

    /// Short human-readable description for logs and prompts.
    pub fn describe(&self) -> String {
        match self {
            FleetOp::Checkout => "checkout tracked branch".to_string(),
            FleetOp::Reset { to_remote: true } => "reset to remote branch".to_string(),
            FleetOp::Reset { to_remote: false } => "reset to local HEAD".to_string(),
            FleetOp::Clean => "clean untracked files".to_string(),
            FleetOp::Update { .. } => "update from remote".to_string(),
            FleetOp::Track => "set tracking branch".to_string(),
            FleetOp::Merge { branch } => format!("merge branch {branch}"),
            FleetOp::Tag { name, .. } => format!("create tag {name}"),
            FleetOp::Push => "push current branch".to_string(),
            FleetOp::SetRemote { kind: RemoteKind::Ssh } => "set remotes to SSH".to_string(),
            FleetOp::SetRemote { kind: RemoteKind::Http } => "set remotes to HTTP".to_string(),
        }
    }
}

/// Outcome of one operation on one repository.
#[derive(Debug)]
pub struct RepoOutcome {
    pub repo: PathBuf,
    pub result: Result<()>,
}

/// Ordered per-repository outcomes of a fleet-wide operation.
#[derive(Debug)]
pub struct FleetReport {
    pub operation: String,
    pub outcomes: Vec<RepoOutcome>,
}

impl FleetReport {
    /// True when every repository succeeded.
    pub fn overall_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Paths and errors of the repositories that failed, in fleet order.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &FleetError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.repo, e)))
    }
}

/// Apply `op` to every member of the fleet, repository by repository.
pub fn apply(fleet: &Fleet, op: &FleetOp) -> FleetReport {
    let mut outcomes = Vec::with_capacity(fleet.members().len());
    for repo in fleet.members() {
        let result = apply_one(repo, op);
        match &result {
            Ok(()) => info!(repo = %repo.name, op = %op.describe(), "ok"),
            Err(e) => warn!(repo = %repo.name, op = %op.describe(), error = %e, "failed"),
        }
        outcomes.push(RepoOutcome {
            repo: repo.path.clone(),
            result,
        });
    }
    FleetReport {
        operation: op.describe(),
        outcomes,
    }
}

fn apply_one(repo: &Repository, op: &FleetOp) -> Result<()> {
    match op {
        FleetOp::Checkout => git::checkout(&repo.path, &repo.branch),
        FleetOp::Reset { to_remote: false } => git::reset_hard(&repo.path, None),
        FleetOp::Reset { to_remote: true } => {
            git::fetch(&repo.path, None)?;
            git::reset_hard(&repo.path, Some(&format!("origin/{}", repo.branch)))
        }
        FleetOp::Clean => git::clean(&repo.path),
        FleetOp::Update { depth } => {
            git::fetch(&repo.path, *depth)?;
            git::checkout(&repo.path, &repo.branch)?;
            git::merge_ff_only(&repo.path, &format!("origin/{}", repo.branch))
        }
        FleetOp::Track => git::set_upstream(&repo.path, &repo.branch, &repo.branch),
        FleetOp::Merge { branch } => git::merge(&repo.path, branch),
        FleetOp::Tag { name, message } => git::tag(&repo.path, name, message.as_deref()),
        FleetOp::Push => git::push(&repo.path),
        FleetOp::SetRemote { kind } => {
            let url = git::remote_url(&repo.path)?;
            let converted = convert_remote_url(&url, *kind)?;
            git::set_remote_url(&repo.path, &converted)
        }
    }
}

/// Convert a remote URL between HTTP(S) and SSH scp-like forms.
///
/// `https://host/org/repo.git` ⇄ `git@host:org/repo.git`. URLs already in
/// the requested form pass through unchanged.
pub fn convert_remote_url(url: &str, to: RemoteKind) -> Result<String> {
    match to {
        RemoteKind::Ssh => {
            if url.starts_with("git@") {
                return Ok(url.to_string());
            }
            let rest = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .ok_or_else(|| FleetError::UnknownRemoteScheme {
                    url: url.to_string(),
                })?;
            let (host, path) =
                rest.split_once('/')
                    .ok_or_else(|| FleetError::UnknownRemoteScheme {
                        url: url.to_string(),
                    })?;
            Ok(format!("git@{host}:{path}"))
        }
        RemoteKind::Http => {
            if url.starts_with("https://") || url.starts_with("http://") {
                return Ok(url.to_string());
            }
            let rest = url
                .strip_prefix("git@")
                .ok_or_else(|| FleetError::UnknownRemoteScheme {
                    url: url.to_string(),
                })?;
            let (host, path) =
                rest.split_once(':')
                    .ok_or_else(|| FleetError::UnknownRemoteScheme {
                        url: url.to_string(),
                    })?;
            Ok(format!("https://{host}/{path}"))
        }
    }
}
