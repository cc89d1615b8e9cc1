//! Request/reply message sets for every service endpoint.
//!
//! These are the schema the bus carries, bincode-framed by the caller glue.
//! One struct pair per method, mirroring the subject names in
//! [`crate::subject`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::event::FileRef;
use crate::id::{CommitSeq, EventSeq, ObjectId, ProjectId, RevisionId};
use crate::workflow::{NodeKind, WorkflowNode};

//  ---- project service ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub account: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectResponse {
    pub project: ProjectView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProjectRequest {
    pub account: String,
    pub id: ProjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProjectResponse {
    pub project: ProjectView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProjectsRequest {
    pub account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<ProjectView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    pub account: String,
    pub id: ProjectId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProjectResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub account: String,
    pub id: ProjectId,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkflowResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProjectRequest {
    pub account: String,
    pub id: ProjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteProjectResponse {}

/// A project as returned to callers; carries only the current workflow
/// revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: ProjectId,
    pub account: String,
    pub name: String,
    pub description: String,
    pub created: i64,
    pub modified: i64,
    pub workflow: WorkflowView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowView {
    pub id: Option<RevisionId>,
    pub source: String,
    pub modified: i64,
    pub nodes: BTreeMap<String, WorkflowNode>,
}

//  ---- commitlog service ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub project: ProjectId,
    pub author: String,
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReply {
    pub id: CommitSeq,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub project: ProjectId,
    /// Commit to return; `None` selects the newest one.
    pub commit: Option<CommitSeq>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryReply {
    /// `None` when the project has no commits yet.
    pub commit: Option<CommitView>,
    /// Feed back as `commit` to page further into the past.
    pub next: Option<CommitSeq>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitView {
    pub id: CommitSeq,
    pub msg: String,
    pub author: String,
    pub time: i64,
    /// Events this commit sealed, newest-first.
    pub events: Vec<EventView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventView {
    pub id: EventSeq,
    pub time: i64,
    pub kind: String,
    pub author: String,
    pub data: Vec<u8>,
}

impl fmt::Display for EventView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {} by {}", self.id, self.kind, self.author) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub project: ProjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReply {
    /// Unsealed events, newest-first.
    pub events: Vec<EventView>,
}

//  ---- nodes service ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    pub project: ProjectId,
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTitleRequest {
    pub project: ProjectId,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetNotesRequest {
    pub project: ProjectId,
    pub id: String,
    pub account: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFilesRequest {
    pub project: ProjectId,
    pub id: String,
    pub account: String,
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFilesRequest {
    pub project: ProjectId,
    pub id: String,
    pub account: String,
    pub file_ids: Vec<ObjectId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReply {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNodeRequest {
    pub project: ProjectId,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNodeReply {
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
    pub notes: String,
    pub files: Vec<FileRef>,
    pub created: i64,
    pub modified: i64,
}

//  ---- data service ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectState {
    Created,
    InProgress,
    Done,
    Error,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectState::Created => "CREATED",
            ObjectState::InProgress => "INPROGRESS",
            ObjectState::Done => "DONE",
            ObjectState::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReply {
    pub id: ObjectId,
    pub signed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReply {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeRequest {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeReply {
    pub id: ObjectId,
    pub state: ObjectState,
    pub error: String,
    pub import_url: String,
    pub create_time: i64,
    pub modified_time: i64,
    pub import_time: i64,
    pub put_time: i64,
    pub hash: String,
    pub size: i64,
    pub mediatype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateObjectRequest {
    pub id: ObjectId,
    pub state: ObjectState,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub import_time: i64,
    #[serde(default)]
    pub put_time: i64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mediatype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateObjectReply {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetObjectRequest {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetObjectReply {
    pub signed_url: String,
}
