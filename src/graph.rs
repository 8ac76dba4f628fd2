//! Import graphs over stored import edges
//!
//! The traversal is breadth-first from the root package. Node 0 is the root;
//! every newly seen import path gets the next index and edges are recorded in
//! discovery order. A path that already has a node is never expanded again,
//! which is what breaks cycles.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::registry::is_standard_import_path;
use crate::storage::Database;

/// How much of the standard library a graph shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepLevel {
    #[default]
    ShowAll,
    /// Standard library packages appear as leaves.
    HideStandardDeps,
    /// Standard library packages do not appear at all.
    HideStandardAll,
}

impl FromStr for DepLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" | "show-all" => Ok(DepLevel::ShowAll),
            "hide-deps" | "hide-standard-deps" => Ok(DepLevel::HideStandardDeps),
            "hide-all" | "hide-standard-all" => Ok(DepLevel::HideStandardAll),
            other => Err(format!(
                "unknown graph level {other:?}, expected one of: all, hide-deps, hide-all"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<(usize, usize)>,
}

/// Source of direct import lists for the traversal.
pub trait ImportLookup: Send + Sync {
    fn imports_of(&self, import_path: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

impl ImportLookup for Database {
    fn imports_of(&self, import_path: &str) -> impl Future<Output = Result<Vec<String>>> + Send {
        Database::imports_of(self, import_path)
    }
}

/// Build the graph rooted at `root`, whose direct imports are `root_imports`.
pub async fn build_graph<L: ImportLookup>(
    lookup: &L,
    root: &str,
    root_imports: Vec<String>,
    level: DepLevel,
) -> Result<ImportGraph> {
    let mut nodes = vec![root.to_string()];
    let mut index = HashMap::from([(root.to_string(), 0usize)]);
    let mut edges = Vec::new();
    let mut queue = VecDeque::from([(0usize, Some(root_imports))]);

    while let Some((from, imports)) = queue.pop_front() {
        let imports = match imports {
            Some(imports) => imports,
            None => lookup.imports_of(&nodes[from]).await?,
        };
        for path in imports {
            let standard = is_standard_import_path(&path);
            if standard && level == DepLevel::HideStandardAll {
                continue;
            }
            let to = match index.get(&path) {
                Some(&to) => to,
                None => {
                    let to = nodes.len();
                    index.insert(path.clone(), to);
                    nodes.push(path);
                    if !(standard && level == DepLevel::HideStandardDeps) {
                        queue.push_back((to, None));
                    }
                    to
                }
            };
            edges.push((from, to));
        }
    }

    Ok(ImportGraph { nodes, edges })
}

/// Graph builder with a bounded number of concurrent traversals. Requests over
/// the bound are rejected with [`Error::Overloaded`] instead of queueing.
#[derive(Clone)]
pub struct GraphBuilder<L> {
    lookup: L,
    gate: Arc<Semaphore>,
}

impl<L: ImportLookup> GraphBuilder<L> {
    pub fn new(lookup: L, concurrency: usize) -> Self {
        Self {
            lookup,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub async fn build(&self, root: &str, root_imports: Vec<String>, level: DepLevel) -> Result<ImportGraph> {
        let _permit = self.gate.try_acquire().map_err(|_| Error::Overloaded)?;
        tracing::debug!("Building {:?} import graph for {}", level, root);
        build_graph(&self.lookup, root, root_imports, level).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Edges(HashMap<&'static str, Vec<&'static str>>);

    impl ImportLookup for Edges {
        async fn imports_of(&self, import_path: &str) -> Result<Vec<String>> {
            Ok(self
                .0
                .get(import_path)
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default())
        }
    }

    fn lookup() -> Edges {
        Edges(HashMap::from([
            ("strings", vec!["unicode"]),
            ("example.com/n", vec!["strings", "example.com/root"]),
        ]))
    }

    fn root_imports() -> Vec<String> {
        vec!["strings".to_string(), "example.com/n".to_string()]
    }

    #[tokio::test]
    async fn test_show_all() {
        let graph = build_graph(&lookup(), "example.com/root", root_imports(), DepLevel::ShowAll)
            .await
            .unwrap();
        assert_eq!(graph.nodes, ["example.com/root", "strings", "example.com/n", "unicode"]);
        assert_eq!(graph.edges, [(0, 1), (0, 2), (1, 3), (2, 1), (2, 0)]);
    }

    #[tokio::test]
    async fn test_hide_standard_deps() {
        let graph = build_graph(&lookup(), "example.com/root", root_imports(), DepLevel::HideStandardDeps)
            .await
            .unwrap();
        assert_eq!(graph.nodes, ["example.com/root", "strings", "example.com/n"]);
        assert_eq!(graph.edges, [(0, 1), (0, 2), (2, 1), (2, 0)]);
    }

    #[tokio::test]
    async fn test_hide_standard_all() {
        let graph = build_graph(&lookup(), "example.com/root", root_imports(), DepLevel::HideStandardAll)
            .await
            .unwrap();
        assert_eq!(graph.nodes, ["example.com/root", "example.com/n"]);
        assert_eq!(graph.edges, [(0, 1), (1, 0)]);
    }

    #[tokio::test]
    async fn test_gate_rejects_without_waiting() {
        let builder = GraphBuilder::new(lookup(), 1);
        let _held = builder.gate.clone().try_acquire_owned().unwrap();
        let err = builder
            .build("example.com/root", root_imports(), DepLevel::ShowAll)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Overloaded));
    }

    #[test]
    fn test_level_names() {
        assert_eq!("hide-deps".parse::<DepLevel>().unwrap(), DepLevel::HideStandardDeps);
        assert_eq!("all".parse::<DepLevel>().unwrap(), DepLevel::ShowAll);
        assert!("none".parse::<DepLevel>().is_err());
    }
}
