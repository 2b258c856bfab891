//! Build target model and the declaration-ordered registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// How a target is realised by an external backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Regular build-tool invocation (`command`).
    Tool,
    /// Fixed external bootstrap procedure (`bootstrap_command`) instead of
    /// a full build — self-hosting toolchains build themselves from a
    /// prior release.
    Bootstrap,
    /// Full from-source build via `command`.
    Source,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Tool => "tool",
            BackendKind::Bootstrap => "bootstrap",
            BackendKind::Source => "source",
        }
    }
}

/// A named, independently buildable component of the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTarget {
    pub name: String,
    /// Declared component version, checked by release-mode validation.
    pub version: String,
    /// Names of targets that must build first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub backend: BackendKind,
    /// Working directory relative to the fleet root.
    pub path: String,
    /// Backend invocation for tool and source targets.
    #[serde(default)]
    pub command: Vec<String>,
    /// Backend invocation for bootstrap targets.
    #[serde(default)]
    pub bootstrap_command: Vec<String>,
    /// Directory (relative to `path`) holding produced artifacts.
    #[serde(default)]
    pub artifact_dir: Option<String>,
    /// Long-running target skipped by the skip-expensive profile flag.
    #[serde(default)]
    pub expensive: bool,
}

/// All declared targets, in declaration order, indexed by name.
///
/// Declaration order is the deterministic tie-break for topological
/// ordering, so it must survive construction.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<BuildTarget>,
    index: HashMap<String, usize>,
}

impl TargetRegistry {
    /// Build a registry, rejecting duplicate names and dangling
    /// dependency references.
    pub fn new(targets: Vec<BuildTarget>) -> BuildResult<Self> {
        let mut index = HashMap::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            if index.insert(target.name.clone(), i).is_some() {
                return Err(BuildError::DuplicateTarget {
                    target: target.name.clone(),
                });
            }
        }
        for target in &targets {
            for dep in &target.dependencies {
                if !index.contains_key(dep) {
                    return Err(BuildError::UnknownTarget {
                        target: dep.clone(),
                    });
                }
            }
        }
        Ok(Self { targets, index })
    }

    pub fn get(&self, name: &str) -> Option<&BuildTarget> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    /// Declaration index of a target, used as the topological tie-break.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Target names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{registry, target};
    use super::*;

    #[test]
    fn registry_preserves_declaration_order() {
        let reg = registry(&[("c", &[]), ("b", &["c"]), ("a", &["b"])]);
        let names: Vec<&str> = reg.names().collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(reg.position("b"), Some(1));
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let err = TargetRegistry::new(vec![target("x", &[]), target("x", &[])]).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateTarget { .. }));
    }

    #[test]
    fn registry_rejects_dangling_dependency() {
        let err = TargetRegistry::new(vec![target("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, BuildError::UnknownTarget { .. }));
    }
}
