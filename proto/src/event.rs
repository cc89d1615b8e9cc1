use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use crate::id::{ObjectId, ProjectId, RevisionId};

/// Event kind strings as they travel on the bus and land in the log.
pub mod kind {
    pub const PROJECT_CREATED: &str = "project.created";
    pub const PROJECT_UPDATED: &str = "project.updated";
    pub const PROJECT_DELETED: &str = "project.deleted";
    pub const NODE_ADDED: &str = "node.added";
    pub const NODE_REMOVED: &str = "node.removed";
    pub const NODE_RENAMED: &str = "node.renamed";
    pub const NODE_INPUT_ADDED: &str = "node.input-added";
    pub const NODE_INPUT_REMOVED: &str = "node.input-removed";
    pub const NODE_OUTPUT_ADDED: &str = "node.output-added";
    pub const NODE_OUTPUT_REMOVED: &str = "node.output-removed";
    pub const NODE_UPDATED_NOTES: &str = "node.updated-notes";
    pub const NODE_ADDED_FILES: &str = "node.added-files";
    pub const NODE_REMOVED_FILES: &str = "node.removed-files";
}

/// The envelope published on `events.project` for every meaningful mutation.
///
/// `data` is a JSON document whose shape is fixed per `kind`; consumers must
/// tolerate unknown keys so payloads can grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub project: ProjectId,
    /// Wall-clock seconds.
    pub time: i64,
    pub kind: String,
    /// Account id of the actor that caused the mutation.
    pub author: String,
    pub data: Vec<u8>,
}

impl Event {
    pub fn new<T: Serialize>(project: ProjectId, time: i64, kind: &str, author: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self { project, time, kind: kind.to_string(), author: author.to_string(), data: serde_json::to_vec(payload)? })
    }

    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> { serde_json::from_slice(&self.data) }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({} {} by {} {}b)", self.project, self.kind, self.author, self.data.len())
    }
}

//  Typed payloads for the event catalog. Field names are the wire contract.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUpdated {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDeleted {}

/// Payload for `node.added` and `node.removed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeChange {
    pub workflow: RevisionId,
    pub node: NodeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBody {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRenamed {
    pub workflow: RevisionId,
    pub node: RenameBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameBody {
    pub key: String,
    pub from: String,
    pub to: String,
}

/// Payload for `node.input-added` and `node.input-removed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInputDelta {
    pub workflow: RevisionId,
    pub node: InputBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBody {
    pub key: String,
    pub input: String,
}

/// Payload for `node.output-added` and `node.output-removed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutputDelta {
    pub workflow: RevisionId,
    pub node: OutputBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBody {
    pub key: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesUpdated {
    pub id: String,
    pub notes: String,
}

/// Payload for `node.added-files` and `node.removed-files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesChanged {
    pub id: String,
    pub files: Vec<FileRef>,
}

/// A file attachment on a node: the object id owned by the data registry
/// plus the user-visible name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: ObjectId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_added_payload_shape() {
        let revision = RevisionId::new();
        let payload = NodeChange {
            workflow: revision,
            node: NodeBody {
                key: "a".into(),
                kind: "DATA".into(),
                title: "A".into(),
                input: vec![],
                output: vec!["x".into()],
            },
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["node"]["key"], "a");
        assert_eq!(json["node"]["type"], "DATA");
        assert_eq!(json["workflow"], revision.to_string());
    }

    #[test]
    fn payload_decode_tolerates_unknown_keys() {
        let raw = r#"{"workflow":"01ARZ3NDEKTSV4RRFFQ69G5FAV","node":{"key":"a","from":"A","to":"B"},"extra":1}"#;
        let event = Event {
            project: ProjectId::new(),
            time: 0,
            kind: kind::NODE_RENAMED.to_string(),
            author: "u1".into(),
            data: raw.as_bytes().to_vec(),
        };
        let payload: NodeRenamed = event.decode_data().unwrap();
        assert_eq!(payload.node.to, "B");
    }
}
