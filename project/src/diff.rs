//! Minimal structural difference between two workflow revisions.
//!
//! The diff drives event emission: one event per atomic change, so the
//! result is kept in ordered maps to make emission order deterministic.

use std::collections::{BTreeMap, BTreeSet};

use labtrail_proto::WorkflowNode;

use crate::graph::Graph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleChange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeDiff {
    pub title: Option<TitleChange>,
    /// Item → true when added in the new revision, false when removed.
    pub input: BTreeMap<String, bool>,
    /// Same structure as `input`.
    pub output: BTreeMap<String, bool>,
}

impl NodeDiff {
    pub fn is_empty(&self) -> bool { self.title.is_none() && self.input.is_empty() && self.output.is_empty() }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    pub added: BTreeMap<String, WorkflowNode>,
    pub removed: BTreeMap<String, WorkflowNode>,
    pub changed: BTreeMap<String, NodeDiff>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool { self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() }
}

pub fn diff_graph(a: &Graph, b: &Graph) -> GraphDiff {
    let mut diff = GraphDiff::default();

    for (key, node) in &b.nodes {
        if !a.nodes.contains_key(key) {
            diff.added.insert(key.clone(), node.clone());
        }
    }

    for (key, node) in &a.nodes {
        match b.nodes.get(key) {
            None => {
                diff.removed.insert(key.clone(), node.clone());
            }
            Some(new) => {
                let node_diff = diff_node(node, new);
                if !node_diff.is_empty() {
                    diff.changed.insert(key.clone(), node_diff);
                }
            }
        }
    }

    diff
}

pub fn diff_node(a: &WorkflowNode, b: &WorkflowNode) -> NodeDiff {
    let mut diff = NodeDiff::default();
    if a.title != b.title {
        diff.title = Some(TitleChange { from: a.title.clone(), to: b.title.clone() });
    }
    diff.input = set_delta(&a.input, &b.input);
    diff.output = set_delta(&a.output, &b.output);
    diff
}

/// The lists are ordered in the source but compared as sets.
fn set_delta(a: &[String], b: &[String]) -> BTreeMap<String, bool> {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.iter().map(String::as_str).collect();

    let mut delta = BTreeMap::new();
    for item in b.difference(&a) {
        delta.insert(item.to_string(), true);
    }
    for item in a.difference(&b) {
        delta.insert(item.to_string(), false);
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::parse_source;

    #[test]
    fn identical_graphs_diff_empty() {
        let g = parse_source("a: {type: data, title: A, output: [x]}").unwrap();
        assert!(diff_graph(&g, &g).is_empty());
    }

    #[test]
    fn added_and_removed_keys() {
        let a = parse_source("a: {type: data, title: A}").unwrap();
        let b = parse_source("b: {type: manual, title: B}").unwrap();
        let diff = diff_graph(&a, &b);
        assert_eq!(diff.added.keys().collect::<Vec<_>>(), ["b"]);
        assert_eq!(diff.removed.keys().collect::<Vec<_>>(), ["a"]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn rename_and_input_growth() {
        let a = parse_source("a: {type: data, title: A, input: [], output: [x]}").unwrap();
        let b = parse_source("a: {type: data, title: B, input: [y], output: [x]}").unwrap();
        let diff = diff_graph(&a, &b);

        let node = &diff.changed["a"];
        assert_eq!(node.title, Some(TitleChange { from: "A".into(), to: "B".into() }));
        assert_eq!(node.input, BTreeMap::from([("y".to_string(), true)]));
        assert!(node.output.is_empty());
    }

    #[test]
    fn input_reorder_is_not_a_change() {
        let a = parse_source("a: {title: A, input: [x, y]}").unwrap();
        let b = parse_source("a: {title: A, input: [y, x]}").unwrap();
        assert!(diff_graph(&a, &b).is_empty());
    }

    #[test]
    fn output_removal_maps_to_false() {
        let a = parse_source("a: {title: A, output: [x, y]}").unwrap();
        let b = parse_source("a: {title: A, output: [x]}").unwrap();
        let diff = diff_graph(&a, &b);
        assert_eq!(diff.changed["a"].output, BTreeMap::from([("y".to_string(), false)]));
    }

    #[test]
    fn type_change_alone_is_not_tracked() {
        // The projection rebuilds type from node.added only; a bare kind
        // change without retitling produces no diff entry.
        let a = parse_source("a: {type: data, title: A}").unwrap();
        let b = parse_source("a: {type: manual, title: A}").unwrap();
        assert!(diff_graph(&a, &b).is_empty());
    }
}
