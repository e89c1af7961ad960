//! Task dependency graph
//!
//! Units are named nodes; an edge `upstream -> downstream` means the
//! downstream unit may only start once the upstream unit has succeeded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::units::{DIM_PRODUCT, DIM_TIME, DIM_VENDOR, FACT_PURCHASE};

/// Directed acyclic graph of named tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskGraph {
    tasks: Vec<String>,
    edges: Vec<(String, String)>,
}

impl TaskGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// The purchasing star schema: every dimension fans in to the fact table.
    pub fn purchasing() -> Self {
        let mut graph = Self::new();
        for task in [DIM_TIME, DIM_PRODUCT, DIM_VENDOR, FACT_PURCHASE] {
            graph.tasks.push(task.to_string());
        }
        for upstream in [DIM_TIME, DIM_PRODUCT, DIM_VENDOR] {
            graph
                .edges
                .push((upstream.to_string(), FACT_PURCHASE.to_string()));
        }
        graph
    }

    /// Declare a task
    pub fn task(mut self, name: impl Into<String>) -> Self {
        self.tasks.push(name.into());
        self
    }

    /// Declare that `downstream` depends on `upstream`
    pub fn edge(mut self, upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        self.edges.push((upstream.into(), downstream.into()));
        self
    }

    /// Task names in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(String::as_str)
    }

    /// Whether a task with this name is declared
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t == name)
    }

    /// Direct upstream dependencies of a task
    pub fn upstream_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, down)| down == name)
            .map(|(up, _)| up.as_str())
            .collect()
    }

    /// Every task reachable downstream of `name`, excluding itself
    pub fn downstream_of(&self, name: &str) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        let mut frontier = vec![name];
        while let Some(current) = frontier.pop() {
            for (up, down) in &self.edges {
                if up == current && !found.contains(&down.as_str()) {
                    found.push(down.as_str());
                    frontier.push(down.as_str());
                }
            }
        }
        found
    }

    /// Group tasks into layers that may run concurrently.
    ///
    /// Every task appears in a later layer than all of its upstream tasks.
    /// Within a layer, tasks keep their declaration order.
    pub fn layers(&self) -> Result<Vec<Vec<String>>> {
        self.validate()?;

        let mut indegree: HashMap<&str, usize> =
            self.tasks.iter().map(|t| (t.as_str(), 0)).collect();
        for (_, down) in &self.edges {
            if let Some(count) = indegree.get_mut(down.as_str()) {
                *count += 1;
            }
        }

        let mut layers = Vec::new();
        let mut placed = 0;
        let mut ready: Vec<&str> = self
            .tasks
            .iter()
            .map(String::as_str)
            .filter(|t| indegree[t] == 0)
            .collect();

        while !ready.is_empty() {
            placed += ready.len();
            let mut next = Vec::new();
            for task in &ready {
                for (up, down) in &self.edges {
                    if up.as_str() != *task {
                        continue;
                    }
                    if let Some(count) = indegree.get_mut(down.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(down.as_str());
                        }
                    }
                }
            }
            next.sort_by_key(|t| self.tasks.iter().position(|x| x.as_str() == *t));
            layers.push(ready.iter().map(|t| t.to_string()).collect());
            ready = next;
        }

        if placed != self.tasks.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(t, _)| *t)
                .collect();
            return Err(Error::InvalidGraph {
                message: format!("dependency cycle through {}", stuck.join(", ")),
            });
        }

        Ok(layers)
    }

    /// Reject duplicate tasks, dangling edges and self-loops
    pub fn validate(&self) -> Result<()> {
        for (i, task) in self.tasks.iter().enumerate() {
            if self.tasks[..i].contains(task) {
                return Err(Error::InvalidGraph {
                    message: format!("task '{}' declared twice", task),
                });
            }
        }
        for (up, down) in &self.edges {
            for end in [up, down] {
                if !self.contains(end) {
                    return Err(Error::InvalidGraph {
                        message: format!("edge {} -> {} names unknown task '{}'", up, down, end),
                    });
                }
            }
            if up == down {
                return Err(Error::InvalidGraph {
                    message: format!("task '{}' depends on itself", up),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchasing_graph_layers() {
        let layers = TaskGraph::purchasing().layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec![DIM_TIME.to_string(), DIM_PRODUCT.to_string(), DIM_VENDOR.to_string()],
                vec![FACT_PURCHASE.to_string()],
            ]
        );
    }

    #[test]
    fn test_purchasing_graph_edges() {
        let graph = TaskGraph::purchasing();
        let mut upstream = graph.upstream_of(FACT_PURCHASE);
        upstream.sort();
        assert_eq!(upstream, vec![DIM_PRODUCT, DIM_TIME, DIM_VENDOR]);
        assert!(graph.upstream_of(DIM_PRODUCT).is_empty());
        assert_eq!(graph.downstream_of(DIM_VENDOR), vec![FACT_PURCHASE]);
        assert!(graph.downstream_of(FACT_PURCHASE).is_empty());
    }

    #[test]
    fn test_chain_layers() {
        let graph = TaskGraph::new()
            .task("c")
            .task("b")
            .task("a")
            .edge("a", "b")
            .edge("b", "c");
        let layers = graph.layers().unwrap();
        assert_eq!(layers, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(graph.downstream_of("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let graph = TaskGraph::new()
            .task("a")
            .task("b")
            .task("root")
            .edge("a", "b")
            .edge("b", "a");
        let err = graph.layers().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_unknown_task_rejected() {
        let graph = TaskGraph::new().task("a").edge("a", "missing");
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let graph = TaskGraph::new().task("a").task("a");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_self_loop_rejected() {
        let graph = TaskGraph::new().task("a").edge("a", "a");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_graph_serialization() {
        let json = serde_json::to_value(TaskGraph::purchasing()).unwrap();
        assert_eq!(json["tasks"].as_array().unwrap().len(), 4);
        assert_eq!(json["edges"].as_array().unwrap().len(), 3);
    }
}
