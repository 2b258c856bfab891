//! Git plumbing for fleet repositories.
//!
//! Every helper shells out to the `git` binary in a given working directory
//! and returns trimmed stdout. Failures carry the command and stderr so
//! callers can surface the diagnostic verbatim.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{FleetError, Result};

/// Hash and author date of a repository's HEAD commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadCommit {
    pub hash: String,
    pub author_date: DateTime<Utc>,
}

/// Run `git` with the given arguments in `repo_dir`, returning trimmed stdout.
pub fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| FleetError::Git {
            repo: repo_dir.to_path_buf(),
            detail: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::Git {
            repo: repo_dir.to_path_buf(),
            detail: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Name of the currently checked-out branch, or `HEAD` when detached.
pub fn current_branch(repo_dir: &Path) -> Result<String> {
    run_git(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// Hash and author date of the HEAD commit.
pub fn head_commit(repo_dir: &Path) -> Result<HeadCommit> {
    let line = run_git(repo_dir, &["log", "-1", "--format=%H%x09%at"])?;
    let (hash, epoch) = line.split_once('\t').ok_or_else(|| FleetError::Git {
        repo: repo_dir.to_path_buf(),
        detail: format!("unexpected git log output: {line}"),
    })?;
    let secs: i64 = epoch.trim().parse().map_err(|_| FleetError::Git {
        repo: repo_dir.to_path_buf(),
        detail: format!("unparsable author date: {epoch}"),
    })?;
    let author_date = Utc
        .timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| FleetError::Git {
            repo: repo_dir.to_path_buf(),
            detail: format!("author date out of range: {secs}"),
        })?;
    Ok(HeadCommit {
        hash: hash.to_string(),
        author_date,
    })
}

/// Fetch from `origin`, optionally limiting history depth.
pub fn fetch(repo_dir: &Path, depth: Option<u32>) -> Result<()> {
    let depth_arg;
    let mut args = vec!["fetch", "origin"];
    if let Some(d) = depth {
        depth_arg = format!("--depth={d}");
        args.push(&depth_arg);
    }
    run_git(repo_dir, &args).map(|_| ())
}

/// Check out a branch or other ref.
pub fn checkout(repo_dir: &Path, reference: &str) -> Result<()> {
    run_git(repo_dir, &["checkout", reference]).map(|_| ())
}

/// Hard-reset the working tree. With `Some(target)` resets to that ref,
/// otherwise to the local HEAD.
pub fn reset_hard(repo_dir: &Path, target: Option<&str>) -> Result<()> {
    match target {
        Some(t) => run_git(repo_dir, &["reset", "--hard", t]).map(|_| ()),
        None => run_git(repo_dir, &["reset", "--hard"]).map(|_| ()),
    }
}

/// Remove untracked files and directories.
pub fn clean(repo_dir: &Path) -> Result<()> {
    run_git(repo_dir, &["clean", "-fd"]).map(|_| ())
}

/// Fast-forward the current branch to `reference`. Diverged history is an
/// error, not a merge commit.
pub fn merge_ff_only(repo_dir: &Path, reference: &str) -> Result<()> {
    run_git(repo_dir, &["merge", "--ff-only", reference]).map(|_| ())
}

/// Merge a branch into the current branch.
pub fn merge(repo_dir: &Path, branch: &str) -> Result<()> {
    run_git(repo_dir, &["merge", "--no-edit", branch]).map(|_| ())
}

/// Create an annotated tag. Falls back to the tag name as message.
pub fn tag(repo_dir: &Path, name: &str, message: Option<&str>) -> Result<()> {
    let msg = message.unwrap_or(name);
    run_git(repo_dir, &["tag", "-a", name, "-m", msg]).map(|_| ())
}

/// Push the named branch (with tags) to `origin`.
pub fn push_branch(repo_dir: &Path, branch: &str) -> Result<()> {
    run_git(repo_dir, &["push", "--follow-tags", "origin", branch]).map(|_| ())
}

/// Push the current branch to `origin`.
pub fn push(repo_dir: &Path) -> Result<()> {
    let branch = current_branch(repo_dir)?;
    push_branch(repo_dir, &branch)
}

/// URL of the `origin` remote.
pub fn remote_url(repo_dir: &Path) -> Result<String> {
    run_git(repo_dir, &["remote", "get-url", "origin"])
}

/// Rewrite the URL of the `origin` remote.
pub fn set_remote_url(repo_dir: &Path, url: &str) -> Result<()> {
    run_git(repo_dir, &["remote", "set-url", "origin", url]).map(|_| ())
}

/// Point `branch` at `origin/<remote_branch>` as its upstream.
pub fn set_upstream(repo_dir: &Path, branch: &str, remote_branch: &str) -> Result<()> {
    let upstream = format!("origin/{remote_branch}");
    run_git(
        repo_dir,
        &["branch", &format!("--set-upstream-to={upstream}"), branch],
    )
    .map(|_| ())
}

/// Stage exactly `paths` and commit them with `message`.
pub fn commit_paths(repo_dir: &Path, paths: &[&str], message: &str) -> Result<()> {
    let mut add_args = vec!["add", "--"];
    add_args.extend_from_slice(paths);
    run_git(repo_dir, &add_args)?;
    run_git(repo_dir, &["commit", "-m", message]).map(|_| ())
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;
    use std::process::Command;

    pub fn git(repo_dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_dir)
            .env("GIT_AUTHOR_DATE", "2023-01-01T12:00:00 +0000")
            .env("GIT_COMMITTER_DATE", "2023-01-01T12:00:00 +0000")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn git_at(repo_dir: &Path, date: &str, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_dir)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn init_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]);
        git(dir, &["config", "user.name", "test-user"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["commit", "--allow-empty", "-m", "initial"]);
    }

    pub fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        dir
    }
}
