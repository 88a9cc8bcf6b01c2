//! Project dependency graph.
//!
//! A fixed-capacity adjacency matrix with a synthetic "all" root at index 0.
//! `edge[target][dependent]` means `target` depends on `dependent`, i.e.
//! `dependent` must be built first. Node 0 is preconnected as depending on
//! every node added afterward, which gives iteration a single orthogonal
//! entry point for "build everything".

use crate::error::{BuildError, Result};

/// Largest number of projects the graph can hold. The matrix is allocated at
/// this size regardless of how many projects are actually added.
pub const MAX_NODES: usize = 256;

/// Name of the synthetic root every graph starts with.
pub const ALL_PROJECTS: &str = "All";

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IterMode: u8 {
        const BOTTOM_UP   = 0b001;
        const MINIMAL     = 0b010;
        const SKIP_TARGET = 0b100;
    }
}

pub struct DependGraph {
    edges: Vec<[bool; MAX_NODES]>,
    names: Vec<String>,
}

impl DependGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            edges: Vec::with_capacity(MAX_NODES),
            names: Vec::with_capacity(MAX_NODES),
        };
        graph.clear();
        graph
    }

    /// Resets the graph to just the "all" root, which is wired to depend on
    /// every node added from now on.
    pub fn clear(&mut self) {
        self.edges.clear();
        self.names.clear();
        let mut root_row = [false; MAX_NODES];
        for slot in root_row.iter_mut().skip(1) {
            *slot = true;
        }
        self.edges.push(root_row);
        self.names.push(ALL_PROJECTS.to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|existing| existing.eq_ignore_ascii_case(name))
    }

    pub fn name_at(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| BuildError::IndexError(format!("illegal graph index {index}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Adds a new node, failing if one with the same name (case-insensitive)
    /// already exists. Node 0's row is already wired to depend on every slot,
    /// including this new one, so nothing else needs updating.
    pub fn add_node(&mut self, name: &str) -> Result<usize> {
        if self.contains(name) {
            return Err(BuildError::AlreadyExists(format!(
                "project '{name}' already exists in dependency graph"
            )));
        }
        if self.names.len() >= MAX_NODES {
            return Err(BuildError::Full(format!(
                "dependency graph exceeds the {MAX_NODES}-node limit"
            )));
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.edges.push([false; MAX_NODES]);
        Ok(index)
    }

    /// Marks `target` as depending on `dependent`. Both must already exist.
    /// Idempotent: setting an existing edge again is a no-op.
    pub fn add_edge(&mut self, target: &str, dependent: &str) -> Result<()> {
        let target_idx = self
            .index_of(target)
            .ok_or_else(|| BuildError::NotFound(format!("target project '{target}' was not found in dependency graph")))?;
        let dependent_idx = self.index_of(dependent).ok_or_else(|| {
            BuildError::NotFound(format!(
                "dependent project '{dependent}' was not found in dependency graph (for {target})"
            ))
        })?;
        self.edges[target_idx][dependent_idx] = true;
        Ok(())
    }

    pub fn has_edge(&self, target: usize, dependent: usize) -> Result<bool> {
        if target >= self.names.len() || dependent >= self.names.len() {
            return Err(BuildError::IndexError("illegal index for dependency graph".into()));
        }
        Ok(self.edges[target][dependent])
    }

    pub fn has_any_dependents(&self, node: usize) -> Result<bool> {
        if node >= self.names.len() {
            return Err(BuildError::IndexError("illegal element index for dependency graph".into()));
        }
        Ok(self.edges[node][..self.names.len()].iter().any(|&b| b))
    }

    /// Reports `i depends on j` and `j depends on i` pairs. Returns true if
    /// any cycle (including a self-dependency) was found. O(n^2), which is
    /// sufficient because a correct traversal never needs more than pairwise
    /// checks once this passes.
    pub fn detect_cycles(&self) -> bool {
        let mut found = false;
        let n = self.names.len();
        for i in 0..n {
            for j in i..n {
                if self.edges[i][j] && self.edges[j][i] {
                    found = true;
                    if i == j {
                        eprintln!("Project '{}' depends upon itself", self.names[i]);
                    } else {
                        eprintln!(
                            "Circular dependency between projects '{}' and '{}'",
                            self.names[i], self.names[j]
                        );
                    }
                }
            }
        }
        found
    }

    /// Walks the graph from `start`, invoking `callback(name, depth)` for
    /// each non-root node reached. Returning `false` from the callback aborts
    /// the whole traversal early and the call returns `false`.
    pub fn iterate<F>(&self, start: &str, mode: IterMode, mut callback: F) -> Result<bool>
    where
        F: FnMut(&str, i32) -> bool,
    {
        let start_idx = self
            .index_of(start)
            .ok_or_else(|| BuildError::NotFound(format!("project '{start}' was not found in dependency graph")))?;

        let mut done = vec![false; self.names.len()];
        // The start node is depth 0, whether or not it is ever itself
        // invoked (the "all" root never is, so its children land on 1).
        let init_level: i32 = 0;
        let skip = if mode.contains(IterMode::SKIP_TARGET) && start_idx != 0 {
            Some(start_idx)
        } else {
            None
        };
        let minimal = mode.contains(IterMode::MINIMAL);

        if mode.contains(IterMode::BOTTOM_UP) {
            Ok(self.iterate_bottom_up(start_idx, &mut done, init_level, minimal, skip, &mut callback))
        } else {
            Ok(self.iterate_top_down(start_idx, &mut done, init_level, minimal, skip, &mut callback))
        }
    }

    fn iterate_bottom_up<F>(
        &self,
        cur: usize,
        done: &mut [bool],
        level: i32,
        minimal: bool,
        skip: Option<usize>,
        callback: &mut F,
    ) -> bool
    where
        F: FnMut(&str, i32) -> bool,
    {
        done[cur] = true;
        // Descend in reverse node-insertion order: nodes added later tend to
        // sit deeper in the dependency chain, and visiting them first lets a
        // shared dependency get minimal-marked at its true (deepest) depth
        // instead of the shallowest path that happens to reach it.
        for index in (0..self.names.len()).rev() {
            if minimal && done[index] {
                continue;
            }
            if self.edges[cur][index] {
                if !self.iterate_bottom_up(index, done, level + 1, minimal, skip, callback) {
                    return false;
                }
            }
        }

        if cur == 0 || Some(cur) == skip {
            return true;
        }
        callback(&self.names[cur], level)
    }

    fn iterate_top_down<F>(
        &self,
        cur: usize,
        done: &mut [bool],
        level: i32,
        minimal: bool,
        skip: Option<usize>,
        callback: &mut F,
    ) -> bool
    where
        F: FnMut(&str, i32) -> bool,
    {
        done[cur] = true;
        if cur != 0 && Some(cur) != skip && !callback(&self.names[cur], level) {
            return false;
        }
        for index in (0..self.names.len()).rev() {
            if minimal && done[index] {
                continue;
            }
            if self.edges[cur][index]
                && !self.iterate_top_down(index, done, level + 1, minimal, skip, callback)
            {
                return false;
            }
        }
        true
    }
}

impl Default for DependGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_count_matches_distinct_names() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        assert_eq!(g.len(), 3); // "All" root + A + B
        assert!(g.add_node("a").is_err());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_edge("A", "A").unwrap();
        assert!(g.detect_cycles());
    }

    #[test]
    fn mutual_dependency_is_a_cycle() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        g.add_edge("A", "B").unwrap();
        g.add_edge("B", "A").unwrap();
        assert!(g.detect_cycles());
    }

    #[test]
    fn acyclic_graph_passes() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        g.add_edge("B", "A").unwrap();
        assert!(!g.detect_cycles());
    }

    #[test]
    fn bottom_up_minimal_visits_each_once_dependents_first() {
        // B depends on A. Root depends on both. A is reached through B's
        // subtree before the root's direct edge to it is considered, so it
        // is minimal-marked at the deeper depth: ("A", 2), ("B", 1).
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        g.add_edge("B", "A").unwrap();

        let mut seen = Vec::new();
        g.iterate(ALL_PROJECTS, IterMode::BOTTOM_UP | IterMode::MINIMAL, |name, depth| {
            seen.push((name.to_string(), depth));
            true
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![("A".to_string(), 2), ("B".to_string(), 1)]
        );
    }

    #[test]
    fn skip_target_omits_only_the_start_node() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        g.add_edge("B", "A").unwrap();

        let mut seen = Vec::new();
        g.iterate(
            "B",
            IterMode::BOTTOM_UP | IterMode::MINIMAL | IterMode::SKIP_TARGET,
            |name, _| {
                seen.push(name.to_string());
                true
            },
        )
        .unwrap();
        assert_eq!(seen, vec!["A".to_string()]);
    }

    #[test]
    fn callback_returning_false_aborts_traversal() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.add_node("B").unwrap();
        g.add_edge("B", "A").unwrap();

        let result = g
            .iterate(ALL_PROJECTS, IterMode::MINIMAL, |_, _| false)
            .unwrap();
        assert!(!result);
    }

    #[test]
    fn depends_on_self_via_clear_resets_root_wiring() {
        let mut g = DependGraph::new();
        g.add_node("A").unwrap();
        g.clear();
        assert_eq!(g.len(), 1);
        assert!(g.add_node("A").is_ok());
    }
}
