mod client;
mod diff;
mod graph;
mod service;

pub use client::ProjectClient;
pub use diff::{diff_graph, diff_node, GraphDiff, NodeDiff, TitleChange};
pub use graph::{parse_source, Graph, GraphError};
pub use service::{ProjectService, WorkflowRevision};
