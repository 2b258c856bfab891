//! Dependency closure and topological build ordering.
//!
//! Ordering uses Kahn's algorithm with declaration order as the tie-break
//! among ready targets, so the build order is reproducible across runs
//! with an identical target set and dependencies always build before
//! dependents.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{BuildError, BuildResult};
use crate::target::TargetRegistry;

/// Resolve the set of targets to build and return it in build order.
///
/// With `with_deps` the transitive dependency closure of the requested
/// targets is included; otherwise exactly the requested set is built (its
/// internal dependency edges still order it).
pub fn build_order(
    registry: &TargetRegistry,
    requested: &[String],
    with_deps: bool,
) -> BuildResult<Vec<String>> {
    if requested.is_empty() {
        return Err(BuildError::NoTargetsRequested);
    }
    for name in requested {
        if registry.get(name).is_none() {
            return Err(BuildError::UnknownTarget {
                target: name.clone(),
            });
        }
    }

    let selected = if with_deps {
        transitive_closure(registry, requested)
    } else {
        requested.iter().cloned().collect()
    };

    topological_order(registry, &selected)
}

fn transitive_closure(registry: &TargetRegistry, requested: &[String]) -> HashSet<String> {
    let mut selected: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = requested.iter().map(String::as_str).collect();
    while let Some(name) = queue.pop_front() {
        if !selected.insert(name.to_string()) {
            continue;
        }
        if let Some(target) = registry.get(name) {
            for dep in &target.dependencies {
                queue.push_back(dep);
            }
        }
    }
    selected
}

fn topological_order(
    registry: &TargetRegistry,
    selected: &HashSet<String>,
) -> BuildResult<Vec<String>> {
    // Declaration-ordered view of the selection.
    let ordered: Vec<&str> = registry
        .names()
        .filter(|n| selected.contains(*n))
        .collect();

    let mut in_degree: HashMap<&str, usize> = ordered.iter().map(|n| (*n, 0)).collect();
    for name in &ordered {
        let target = registry.get(name).expect("selected target is registered");
        // Deduplicated: a dependency listed twice is still one edge.
        let deps: HashSet<&str> = target.dependencies.iter().map(String::as_str).collect();
        // Edges leaving the selection are ignored in no-deps mode.
        let count = deps.iter().filter(|d| selected.contains(**d)).count();
        *in_degree.get_mut(name).expect("selected") = count;
    }

    let mut sorted = Vec::with_capacity(ordered.len());
    let mut emitted: HashSet<&str> = HashSet::new();

    while sorted.len() < ordered.len() {
        // First declaration-order target with no unresolved dependency.
        let next = ordered
            .iter()
            .find(|n| !emitted.contains(**n) && in_degree[**n] == 0)
            .copied();
        let Some(name) = next else {
            let mut remaining: Vec<String> = ordered
                .iter()
                .filter(|n| !emitted.contains(**n))
                .map(|n| n.to_string())
                .collect();
            remaining.sort();
            return Err(BuildError::DependencyCycle { targets: remaining });
        };

        emitted.insert(name);
        sorted.push(name.to_string());
        for dependent in &ordered {
            let target = registry.get(dependent).expect("selected");
            if target.dependencies.iter().any(|d| d == name) {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg = deg.saturating_sub(1);
                }
            }
        }
    }

    Ok(sorted)
}
