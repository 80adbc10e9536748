//! Cross-file dependency graph backing `getDependencyTree`, `generateMermaid`,
//! and `getImpactedFiles` (spec §6). Built from each shard's `ImportInfo`
//! records as files are indexed.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::Serialize;

use crate::uri::Uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Dependencies,
    Dependents,
}

/// Bidirectional file-level dependency graph. Forward edges point from a
/// file to the files it imports; reverse edges are maintained alongside so
/// invalidation (`getImpactedFiles`) doesn't need to rescan every shard.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: DashMap<Uri, Arc<DashSet<Uri>>>,
    reverse: DashMap<Uri, Arc<DashSet<Uri>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { forward: DashMap::new(), reverse: DashMap::new() }
    }

    pub fn add_dependency(&self, dependent: &Uri, dependency: &Uri) {
        self.forward
            .entry(dependent.clone())
            .or_insert_with(|| Arc::new(DashSet::new()))
            .insert(dependency.clone());
        self.reverse
            .entry(dependency.clone())
            .or_insert_with(|| Arc::new(DashSet::new()))
            .insert(dependent.clone());
    }

    /// Replaces `uri`'s outgoing edges wholesale — called each time `uri` is
    /// re-indexed, since its import list may have changed.
    pub fn set_dependencies(&self, uri: &Uri, dependencies: &[Uri]) {
        self.remove_file(uri);
        for dependency in dependencies {
            self.add_dependency(uri, dependency);
        }
    }

    pub fn get_dependencies(&self, uri: &Uri) -> Vec<Uri> {
        self.forward.get(uri).map(|deps| deps.iter().map(|d| d.key().clone()).collect()).unwrap_or_default()
    }

    pub fn get_dependents(&self, uri: &Uri) -> Vec<Uri> {
        self.reverse.get(uri).map(|deps| deps.iter().map(|d| d.key().clone()).collect()).unwrap_or_default()
    }

    pub fn remove_file(&self, uri: &Uri) {
        if let Some((_, deps)) = self.forward.remove(uri) {
            for dep in deps.iter() {
                if let Some(reverse_deps) = self.reverse.get(dep.key()) {
                    reverse_deps.remove(uri);
                }
            }
        }
        if let Some((_, dependents)) = self.reverse.remove(uri) {
            for dependent in dependents.iter() {
                if let Some(forward_deps) = self.forward.get(dependent.key()) {
                    forward_deps.remove(uri);
                }
            }
        }
    }

    pub fn clear(&self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// BFS over `direction`'s edges, bounded by `max_depth` (`None` = unbounded).
    /// Builds the full tree used by both `getDependencyTree` and `generateMermaid`.
    pub fn tree(&self, root: &Uri, direction: Direction, max_depth: Option<usize>) -> DependencyTree {
        let mut visited = std::collections::HashSet::new();
        let mut edges = Vec::new();
        let mut queue = VecDeque::new();

        visited.insert(root.clone());
        queue.push_back((root.clone(), 0usize));

        while let Some((current, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            let neighbors = match direction {
                Direction::Dependencies => self.get_dependencies(&current),
                Direction::Dependents => self.get_dependents(&current),
            };
            for neighbor in neighbors {
                edges.push((current.clone(), neighbor.clone()));
                if visited.insert(neighbor.clone()) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        DependencyTree { root: root.clone(), direction, nodes: visited.into_iter().collect(), edges }
    }

    /// All files transitively impacted by a change to `uri` — its transitive
    /// dependents, via BFS over reverse edges (teacher's `get_dependents`).
    pub fn impacted_files(&self, uri: &Uri, max_depth: Option<usize>) -> Vec<Uri> {
        self.tree(uri, Direction::Dependents, max_depth)
            .nodes
            .into_iter()
            .filter(|n| n != uri)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DependencyTree {
    pub root: Uri,
    pub direction: Direction,
    pub nodes: Vec<Uri>,
    pub edges: Vec<(Uri, Uri)>,
}

/// Renders a tree as a Mermaid flowchart (`generateMermaid`).
pub fn generate_mermaid(tree: &DependencyTree) -> String {
    let mut out = String::from("flowchart LR\n");
    for (from, to) in &tree.edges {
        out.push_str(&format!("    \"{}\" --> \"{}\"\n", from.as_str(), to.as_str()));
    }
    if tree.edges.is_empty() {
        out.push_str(&format!("    \"{}\"\n", tree.root.as_str()));
    }
    out
}
