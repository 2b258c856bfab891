//! Structural version rewriting across fleet build descriptors.
//!
//! Two descriptor dialects are scanned: `Cargo.toml` manifests (edited via
//! `toml_edit`, preserving formatting and comments byte-for-byte) and
//! `*.properties` files (line-structural, only `version` / `*.version`
//! keys). A version string showing up in any other position — a
//! description, a comment, an unrelated key — is never touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use toml_edit::{DocumentMut, Item, Value};
use tracing::{debug, info};

use crate::error::{FleetError, Result, ValidationError};
use crate::fleet::Fleet;
use crate::git;

/// One rewrite pass over all descriptor files in the fleet.
#[derive(Debug, Clone)]
pub struct VersionRewriteSpec {
    pub from: String,
    pub to: String,
    /// Commit each modified repository after rewriting.
    pub commit: bool,
    /// Report would-be changes without touching any file.
    pub dry_run: bool,
}

/// A single rewritten version occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Repository working tree the file belongs to.
    pub repo: PathBuf,
    /// Absolute path of the descriptor file.
    pub file: PathBuf,
    /// Structural position, e.g. `package.version` or `version (line 3)`.
    pub location: String,
    pub old: String,
    pub new: String,
}

/// Every change of a rewrite pass, in fleet order. Identical content for
/// dry and real runs.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Distinct descriptor files touched, in order of first appearance.
    pub fn files(&self) -> Vec<&Path> {
        let mut seen = Vec::new();
        for c in &self.changes {
            if !seen.contains(&c.file.as_path()) {
                seen.push(c.file.as_path());
            }
        }
        seen
    }
}

/// True for the snapshot (unreleased) version convention.
pub fn is_snapshot(version: &str) -> bool {
    version.ends_with("-SNAPSHOT")
}

/// Rewrite `spec.from` to `spec.to` in every descriptor across the fleet.
///
/// With `spec.commit`, each modified repository receives one commit holding
/// exactly its own changed descriptors; sub-repositories have independent
/// histories, so there is never a fleet-wide commit.
pub fn rewrite(fleet: &Fleet, spec: &VersionRewriteSpec) -> Result<ChangeSet> {
    validate(spec)?;

    let all_paths: Vec<&PathBuf> = fleet.iter_all().map(|r| &r.path).collect();
    let mut changeset = ChangeSet::default();
    // repo path → descriptor paths relative to that repo
    let mut touched: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();

    for repo in fleet.iter_all() {
        let nested: Vec<&PathBuf> = all_paths
            .iter()
            .copied()
            .filter(|p| **p != repo.path)
            .collect();
        for file in descriptor_files(&repo.path, &nested)? {
            let text = fs::read_to_string(&file)?;
            let (rewritten, edits) = match dialect_of(&file) {
                Dialect::CargoToml => rewrite_cargo_toml(&file, &text, &spec.from, &spec.to)?,
                Dialect::Properties => rewrite_properties(&text, &spec.from, &spec.to),
            };
            if edits.is_empty() {
                continue;
            }

            for (location, old, new) in edits {
                debug!(file = %file.display(), %location, %old, %new, "version match");
                changeset.changes.push(Change {
                    repo: repo.path.clone(),
                    file: file.clone(),
                    location,
                    old,
                    new,
                });
            }

            if !spec.dry_run {
                fs::write(&file, rewritten)?;
                let rel = file
                    .strip_prefix(&repo.path)
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .into_owned();
                touched.entry(repo.path.clone()).or_default().push(rel);
            }
        }
    }

    if !spec.dry_run && spec.commit {
        let message = format!("Set versions from {} to {}", spec.from, spec.to);
        for (repo_path, files) in &touched {
            let refs: Vec<&str> = files.iter().map(String::as_str).collect();
            git::commit_paths(repo_path, &refs, &message)?;
            info!(repo = %repo_path.display(), files = files.len(), "committed version bump");
        }
    }

    Ok(changeset)
}

fn validate(spec: &VersionRewriteSpec) -> Result<()> {
    for (name, value) in [("from-version", &spec.from), ("to-version", &spec.to)] {
        if value.is_empty() {
            return Err(ValidationError::MissingParameter {
                name: name.to_string(),
            }
            .into());
        }
    }
    if spec.from == spec.to {
        return Err(ValidationError::SameVersion {
            version: spec.from.clone(),
        }
        .into());
    }
    Ok(())
}

enum Dialect {
    CargoToml,
    Properties,
}

fn dialect_of(file: &Path) -> Dialect {
    if file.extension().is_some_and(|e| e == "properties") {
        Dialect::Properties
    } else {
        Dialect::CargoToml
    }
}

fn is_descriptor(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == "Cargo.toml")
        || path.extension().is_some_and(|e| e == "properties")
}

/// Descriptor files under `repo_dir`, skipping `.git`, build output, and
/// nested member working trees (they are scanned as their own repository).
fn descriptor_files(repo_dir: &Path, nested: &[&PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(repo_dir, nested, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, nested: &[&PathBuf], out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            if name == ".git" || name == "target" {
                continue;
            }
            if nested.iter().any(|n| n.as_path() == path) {
                continue;
            }
            walk(&path, nested, out)?;
        } else if is_descriptor(&path) {
            out.push(path);
        }
    }
    Ok(())
}

type Edit = (String, String, String);

/// Structurally rewrite version values in a Cargo manifest.
///
/// Touches `package.version`, `workspace.package.version`, and the
/// `version` of dependency entries equal to `from`. Formatting, comments
/// and key order are preserved.
fn rewrite_cargo_toml(
    file: &Path,
    text: &str,
    from: &str,
    to: &str,
) -> Result<(String, Vec<Edit>)> {
    let mut doc: DocumentMut = text.parse().map_err(|e| FleetError::Descriptor {
        file: file.to_path_buf(),
        detail: format!("invalid TOML: {e}"),
    })?;
    let mut edits = Vec::new();

    for section in ["package", "workspace.package"] {
        if let Some(v) = lookup_mut(&mut doc, section).and_then(|i| i.get_mut("version")) {
            if let Some(value) = v.as_value_mut() {
                try_replace(value, from, to, &format!("{section}.version"), &mut edits);
            }
        }
    }

    for table in [
        "dependencies",
        "dev-dependencies",
        "build-dependencies",
        "workspace.dependencies",
    ] {
        if let Some(item) = lookup_mut(&mut doc, table) {
            rewrite_dep_table(item, table, from, to, &mut edits);
        }
    }

    Ok((doc.to_string(), edits))
}

fn lookup_mut<'a>(doc: &'a mut DocumentMut, dotted: &str) -> Option<&'a mut Item> {
    let mut parts = dotted.split('.');
    let mut item = doc.get_mut(parts.next()?)?;
    for part in parts {
        item = item.get_mut(part)?;
    }
    Some(item)
}

fn rewrite_dep_table(item: &mut Item, prefix: &str, from: &str, to: &str, edits: &mut Vec<Edit>) {
    let Some(table) = item.as_table_like_mut() else {
        return;
    };
    for (key, entry) in table.iter_mut() {
        let name = key.get().to_string();
        if let Some(value) = entry.as_value_mut() {
            if value.is_str() {
                try_replace(value, from, to, &format!("{prefix}.{name}"), edits);
                continue;
            }
        }
        if let Some(dep) = entry.as_table_like_mut() {
            if let Some(v) = dep.get_mut("version").and_then(Item::as_value_mut) {
                try_replace(v, from, to, &format!("{prefix}.{name}.version"), edits);
            }
        }
    }
}

fn try_replace(value: &mut Value, from: &str, to: &str, location: &str, edits: &mut Vec<Edit>) {
    if value.as_str() != Some(from) {
        return;
    }
    let decor = value.decor().clone();
    *value = Value::from(to);
    *value.decor_mut() = decor;
    edits.push((location.to_string(), from.to_string(), to.to_string()));
}

/// Line-structural rewrite of a properties file. Only keys named `version`
/// or ending in `.version` whose value equals `from` are rewritten; every
/// other byte passes through unchanged.
fn rewrite_properties(text: &str, from: &str, to: &str) -> (String, Vec<Edit>) {
    let mut out = String::with_capacity(text.len());
    let mut edits = Vec::new();

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let body_end = line.trim_end_matches(['\n', '\r']).len();
        let (body, eol) = line.split_at(body_end);

        if body.trim_start().starts_with(['#', '!']) {
            out.push_str(line);
            continue;
        }
        let Some((key_part, value_part)) = body.split_once('=') else {
            out.push_str(line);
            continue;
        };
        let key = key_part.trim();
        let is_version_key = key == "version" || key.ends_with(".version");
        if !is_version_key || value_part.trim() != from {
            out.push_str(line);
            continue;
        }

        let lead = &value_part[..value_part.len() - value_part.trim_start().len()];
        let trimmed = value_part.trim();
        let trail = &value_part[lead.len() + trimmed.len()..];
        out.push_str(key_part);
        out.push('=');
        out.push_str(lead);
        out.push_str(to);
        out.push_str(trail);
        out.push_str(eol);
        edits.push((
            format!("{key} (line {})", idx + 1),
            from.to_string(),
            to.to_string(),
        ));
    }

    (out, edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::testutil::make_fleet;
    use crate::git::testutil::git;

    const MANIFEST: &str = r#"# build descriptor
[package]
name = "runtime"
version = "1.2.0-SNAPSHOT"   # fleet version
description = "runtime, somehow also 1.2.0-SNAPSHOT"

[dependencies]
fleet-common = { path = "../common", version = "1.2.0-SNAPSHOT" }
serde = "1.0"

[dev-dependencies]
fleet-testkit = "1.2.0-SNAPSHOT"
"#;

    fn spec(dry_run: bool, commit: bool) -> VersionRewriteSpec {
        VersionRewriteSpec {
            from: "1.2.0-SNAPSHOT".to_string(),
            to: "1.2.0".to_string(),
            commit,
            dry_run,
        }
    }

    #[test]
    fn snapshot_convention() {
        assert!(is_snapshot("1.2.0-SNAPSHOT"));
        assert!(!is_snapshot("1.2.0"));
    }

    #[test]
    fn rejects_identical_versions() {
        let (_dir, fleet) = make_fleet(&[]);
        let bad = VersionRewriteSpec {
            from: "1.0".into(),
            to: "1.0".into(),
            commit: false,
            dry_run: true,
        };
        let err = rewrite(&fleet, &bad).unwrap_err();
        assert!(matches!(
            err,
            FleetError::Validation(ValidationError::SameVersion { .. })
        ));
    }

    #[test]
    fn cargo_rewrite_spares_non_version_fields() {
        let (dir, fleet) = make_fleet(&["a"]);
        let manifest = dir.path().join("a/Cargo.toml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let changes = rewrite(&fleet, &spec(false, false)).unwrap();
        let locations: Vec<&str> = changes.changes.iter().map(|c| c.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "package.version",
                "dependencies.fleet-common.version",
                "dev-dependencies.fleet-testkit",
            ]
        );

        let text = std::fs::read_to_string(&manifest).unwrap();
        assert!(text.contains("version = \"1.2.0\"   # fleet version"));
        assert!(
            text.contains("somehow also 1.2.0-SNAPSHOT"),
            "description must be untouched"
        );
        assert!(text.contains("serde = \"1.0\""));
    }

    #[test]
    fn rewrite_round_trip_is_byte_identical() {
        let (dir, fleet) = make_fleet(&["a"]);
        let manifest = dir.path().join("a/Cargo.toml");
        std::fs::write(&manifest, MANIFEST).unwrap();
        let props = dir.path().join("a/build.properties");
        std::fs::write(&props, "# fleet build\nversion = 1.2.0-SNAPSHOT\nbaseline.version=1.1.0\ngreeting=1.2.0-SNAPSHOT\n").unwrap();

        rewrite(&fleet, &spec(false, false)).unwrap();
        let back = VersionRewriteSpec {
            from: "1.2.0".to_string(),
            to: "1.2.0-SNAPSHOT".to_string(),
            commit: false,
            dry_run: false,
        };
        rewrite(&fleet, &back).unwrap();

        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), MANIFEST);
        assert_eq!(
            std::fs::read_to_string(&props).unwrap(),
            "# fleet build\nversion = 1.2.0-SNAPSHOT\nbaseline.version=1.1.0\ngreeting=1.2.0-SNAPSHOT\n"
        );
    }

    #[test]
    fn properties_rewrite_only_touches_version_keys() {
        let (dir, fleet) = make_fleet(&["a"]);
        let props = dir.path().join("a/gradle.properties");
        std::fs::write(
            &props,
            "toolchain.version=1.2.0-SNAPSHOT\n# version = 1.2.0-SNAPSHOT\ngreeting=1.2.0-SNAPSHOT\n",
        )
        .unwrap();

        let changes = rewrite(&fleet, &spec(false, false)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.changes[0].location, "toolchain.version (line 1)");
        let text = std::fs::read_to_string(&props).unwrap();
        assert!(text.starts_with("toolchain.version=1.2.0\n"));
        assert!(text.contains("# version = 1.2.0-SNAPSHOT"));
        assert!(text.contains("greeting=1.2.0-SNAPSHOT"));
    }

    #[test]
    fn dry_run_reports_identical_changes_without_writing() {
        let (dir, fleet) = make_fleet(&["a"]);
        let manifest = dir.path().join("a/Cargo.toml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let dry = rewrite(&fleet, &spec(true, false)).unwrap();
        assert_eq!(std::fs::read_to_string(&manifest).unwrap(), MANIFEST);

        let real = rewrite(&fleet, &spec(false, false)).unwrap();
        assert_eq!(dry.changes, real.changes);
        assert_ne!(std::fs::read_to_string(&manifest).unwrap(), MANIFEST);
    }

    #[test]
    fn commit_creates_one_commit_per_modified_repo() {
        let (dir, fleet) = make_fleet(&["a", "b"]);
        for member in ["a", "b"] {
            let manifest = dir.path().join(member).join("Cargo.toml");
            std::fs::write(&manifest, MANIFEST).unwrap();
            git(&dir.path().join(member), &["add", "Cargo.toml"]);
            git(&dir.path().join(member), &["commit", "-m", "add manifest"]);
        }

        let changes = rewrite(&fleet, &spec(false, true)).unwrap();
        assert!(!changes.is_empty());

        for member in ["a", "b"] {
            let repo = dir.path().join(member);
            let subject = git::run_git(&repo, &["log", "-1", "--format=%s"]).unwrap();
            assert_eq!(subject, "Set versions from 1.2.0-SNAPSHOT to 1.2.0");
            let status = git::run_git(&repo, &["status", "--porcelain"]).unwrap();
            assert!(status.is_empty(), "work tree should be clean: {status}");
        }
    }

    #[test]
    fn nested_member_files_are_attributed_to_the_member() {
        let (dir, fleet) = make_fleet(&["a"]);
        // Root descriptor and member descriptor both match.
        std::fs::write(dir.path().join("Cargo.toml"), MANIFEST).unwrap();
        std::fs::write(dir.path().join("a/Cargo.toml"), MANIFEST).unwrap();

        let changes = rewrite(&fleet, &spec(true, false)).unwrap();
        let root_changes = changes
            .changes
            .iter()
            .filter(|c| c.repo == fleet.root().path)
            .count();
        let member_changes = changes
            .changes
            .iter()
            .filter(|c| c.repo == fleet.members()[0].path)
            .count();
        assert_eq!(root_changes, 3);
        assert_eq!(member_changes, 3);
        assert_eq!(changes.files().len(), 2);
    }
}
