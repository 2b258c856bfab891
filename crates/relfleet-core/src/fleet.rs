//! Fleet discovery and the repository model.
//!
//! A fleet is the root repository plus every nested sub-repository declared
//! in `.gitmodules` files, discovered recursively. Membership is re-read
//! from disk on every [`Fleet::discover`] call so operations never act on a
//! stale view; order follows declaration order, which keeps reports and
//! batch operations reproducible.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;

use crate::error::{FleetError, Result};
use crate::git::{self, HeadCommit};

/// Branch assumed for members whose `.gitmodules` entry omits one.
pub const DEFAULT_BRANCH: &str = "main";

/// One checked-out repository in the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Submodule name (root: directory name).
    pub name: String,
    /// Absolute working-tree path.
    pub path: PathBuf,
    /// Branch this repository is expected to track.
    pub branch: String,
}

impl Repository {
    /// Currently checked-out branch, `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String> {
        git::current_branch(&self.path)
    }

    /// Hash and author date of HEAD.
    pub fn head_commit(&self) -> Result<HeadCommit> {
        git::head_commit(&self.path)
    }

    /// URL of the `origin` remote.
    pub fn remote_url(&self) -> Result<String> {
        git::remote_url(&self.path)
    }
}

/// The root repository and its transitively nested members.
#[derive(Debug, Clone)]
pub struct Fleet {
    root: Repository,
    members: Vec<Repository>,
}

impl Fleet {
    /// Discover the fleet rooted at `root_dir`.
    ///
    /// Reads the root's `.gitmodules`, then each member's, recursively.
    /// Declared members whose working tree is absent (not yet initialised)
    /// are skipped with a warning.
    pub fn discover(root_dir: &Path) -> Result<Fleet> {
        let path = root_dir
            .canonicalize()
            .map_err(|_| FleetError::NotARepository {
                path: root_dir.to_path_buf(),
            })?;
        if !git::is_git_repo(&path) {
            return Err(FleetError::NotARepository { path });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let branch = git::current_branch(&path)?;
        let root = Repository { name, path, branch };

        let mut members = Vec::new();
        collect_members(&root.path, &mut members)?;

        Ok(Fleet { root, members })
    }

    pub fn root(&self) -> &Repository {
        &self.root
    }

    /// Nested members in declaration order, outer before inner.
    pub fn members(&self) -> &[Repository] {
        &self.members
    }

    /// Root followed by all members.
    pub fn iter_all(&self) -> impl Iterator<Item = &Repository> {
        std::iter::once(&self.root).chain(self.members.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn collect_members(repo_dir: &Path, out: &mut Vec<Repository>) -> Result<()> {
    let gitmodules = repo_dir.join(".gitmodules");
    if !gitmodules.is_file() {
        return Ok(());
    }

    for (name, rel_path) in read_gitmodules(&gitmodules)? {
        let path = repo_dir.join(&rel_path);
        if !path.is_dir() || !git::is_git_repo(&path) {
            warn!(member = %name, path = %path.display(), "skipping uninitialised fleet member");
            continue;
        }
        let branch = config_get(&gitmodules, &format!("submodule.{name}.branch"))
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        let path = path.canonicalize()?;
        out.push(Repository {
            name,
            path: path.clone(),
            branch,
        });
        collect_members(&path, out)?;
    }
    Ok(())
}

/// `(name, path)` pairs from a `.gitmodules` file, in declaration order.
fn read_gitmodules(file: &Path) -> Result<Vec<(String, String)>> {
    let output = Command::new("git")
        .args([
            "config",
            "-f",
            &file.to_string_lossy(),
            "--get-regexp",
            r"^submodule\..*\.path$",
        ])
        .output()
        .map_err(|e| FleetError::Git {
            repo: file.to_path_buf(),
            detail: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Exit code 1 with no diagnostics means no matching keys.
        if !stderr.trim().is_empty() {
            return Err(FleetError::Git {
                repo: file.to_path_buf(),
                detail: format!("reading {} failed: {}", file.display(), stderr.trim()),
            });
        }
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        let name = key
            .strip_prefix("submodule.")
            .and_then(|k| k.strip_suffix(".path"))
            .unwrap_or(key);
        entries.push((name.to_string(), value.to_string()));
    }
    Ok(entries)
}

fn config_get(file: &Path, key: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["config", "-f", &file.to_string_lossy(), "--get", key])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}
