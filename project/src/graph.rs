//! Workflow source parsing and validation.
//!
//! The source is a YAML mapping of node key to declaration:
//!
//! ```yaml
//! trial-data:
//!   type: data
//!   title: Trial data
//!   output: [raw]
//! normalize:
//!   type: compute
//!   title: Normalize
//!   input: [raw]
//!   output: [clean]
//! ```
//!
//! Any well-formed document parses; unknown type strings become
//! `NodeKind::Unknown`. Nodes are connected through artifact names: node A
//! feeds node B when one of A's outputs appears among B's inputs.

use std::collections::{BTreeMap, VecDeque};

use labtrail_proto::WorkflowNode;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub nodes: BTreeMap<String, WorkflowNode>,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("workflow source: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("artifact `{artifact}` is produced by both `{first}` and `{second}`")]
    DuplicateOutput { artifact: String, first: String, second: String },
    #[error("workflow contains a cycle through `{node}`")]
    Cycle { node: String },
}

/// Parse and validate a workflow source document.
pub fn parse_source(source: &str) -> Result<Graph, GraphError> {
    let nodes: Option<BTreeMap<String, WorkflowNode>> = serde_yaml::from_str(source)?;
    let graph = Graph { nodes: nodes.unwrap_or_default() };
    validate(&graph)?;
    Ok(graph)
}

/// Structural validation: every artifact has at most one producer, and the
/// derived node graph is acyclic. Inputs nothing produces are allowed; they
/// are externally supplied data.
fn validate(graph: &Graph) -> Result<(), GraphError> {
    let mut producers: BTreeMap<&str, &str> = BTreeMap::new();
    for (key, node) in &graph.nodes {
        for artifact in &node.output {
            if let Some(first) = producers.insert(artifact, key) {
                return Err(GraphError::DuplicateOutput {
                    artifact: artifact.clone(),
                    first: first.to_string(),
                    second: key.clone(),
                });
            }
        }
    }

    // Kahn's algorithm over artifact edges.
    let mut indegree: BTreeMap<&str, usize> = graph.nodes.keys().map(|k| (k.as_str(), 0)).collect();
    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, node) in &graph.nodes {
        for artifact in &node.input {
            if let Some(&producer) = producers.get(artifact.as_str()) {
                edges.entry(producer).or_default().push(key);
                *indegree.get_mut(key.as_str()).expect("key present") += 1;
            }
        }
    }

    let mut ready: VecDeque<&str> = indegree.iter().filter(|(_, &d)| d == 0).map(|(&k, _)| k).collect();
    let mut visited = 0usize;
    while let Some(key) = ready.pop_front() {
        visited += 1;
        for &next in edges.get(key).into_iter().flatten() {
            let d = indegree.get_mut(next).expect("key present");
            *d -= 1;
            if *d == 0 {
                ready.push_back(next);
            }
        }
    }

    if visited < graph.nodes.len() {
        let node = indegree.iter().find(|(_, &d)| d > 0).map(|(&k, _)| k.to_string()).unwrap_or_default();
        return Err(GraphError::Cycle { node });
    }
    Ok(())
}
