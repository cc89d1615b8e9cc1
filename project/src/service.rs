use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use labtrail_bus::{publish_event, route, Bus};
use labtrail_proto::event::{kind, InputBody, NodeBody, NodeChange, NodeInputDelta, NodeOutputDelta, NodeRenamed, OutputBody, ProjectCreated, ProjectDeleted, ProjectUpdated, RenameBody};
use labtrail_proto::{
    subject, CreateProjectRequest, CreateProjectResponse, DeleteProjectRequest, DeleteProjectResponse, Event,
    GetProjectRequest, GetProjectResponse, ListProjectsRequest, ListProjectsResponse, ProjectId, ProjectView,
    RevisionId, Status, UpdateProjectRequest, UpdateProjectResponse, UpdateWorkflowRequest, UpdateWorkflowResponse,
    WorkflowNode, WorkflowView,
};
use labtrail_storage_common::{codec, Direction, KeyRange, StorageCollection, StorageEngine, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diff::{diff_graph, GraphDiff};
use crate::graph::{parse_source, Graph};

const PROJECTS: &str = "projects";
/// Uniqueness index for `(account, lowercase name)` → project id.
const PROJECT_NAMES: &str = "project_names";

/// One immutable workflow revision; the project's current workflow is the
/// last element of the revision list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRevision {
    pub id: RevisionId,
    pub source: String,
    pub modified: i64,
    pub nodes: BTreeMap<String, WorkflowNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectRecord {
    id: ProjectId,
    account: String,
    name: String,
    norm_name: String,
    description: String,
    created: i64,
    modified: i64,
    workflows: Vec<WorkflowRevision>,
}

impl ProjectRecord {
    fn view(&self) -> ProjectView {
        let workflow = match self.workflows.last() {
            Some(revision) => WorkflowView {
                id: Some(revision.id),
                source: revision.source.clone(),
                modified: revision.modified,
                nodes: revision.nodes.clone(),
            },
            None => WorkflowView::default(),
        };
        ProjectView {
            id: self.id,
            account: self.account.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created: self.created,
            modified: self.modified,
            workflow,
        }
    }

    fn current_graph(&self) -> Graph {
        Graph { nodes: self.workflows.last().map(|revision| revision.nodes.clone()).unwrap_or_default() }
    }
}

pub struct ProjectService {
    engine: Arc<dyn StorageEngine>,
    bus: Arc<dyn Bus>,
}

fn store_error(err: StoreError) -> Status {
    match err {
        StoreError::Backend(e) => Status::unavailable(format!("datastore: {e}")),
        other => Status::internal(other.to_string()),
    }
}

fn name_key(account: &str, name: &str) -> Vec<u8> {
    let mut key = account.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(name.to_lowercase().as_bytes());
    key
}

impl ProjectService {
    pub fn new(engine: Arc<dyn StorageEngine>, bus: Arc<dyn Bus>) -> Arc<Self> { Arc::new(Self { engine, bus }) }

    /// Register the service's request endpoints on the bus.
    pub async fn serve(self: &Arc<Self>) -> Result<(), Status> {
        let bus = self.bus.clone();
        bus.serve(subject::project::CREATE, route(self.clone(), |s, _ctx, req| async move { s.create_project(req).await }))
            .await?;
        bus.serve(subject::project::GET, route(self.clone(), |s, _ctx, req| async move { s.get_project(req).await })).await?;
        bus.serve(subject::project::LIST, route(self.clone(), |s, _ctx, req| async move { s.list_projects(req).await }))
            .await?;
        bus.serve(subject::project::UPDATE, route(self.clone(), |s, _ctx, req| async move { s.update_project(req).await }))
            .await?;
        bus.serve(
            subject::project::UPDATE_WORKFLOW,
            route(self.clone(), |s, _ctx, req| async move { s.update_workflow(req).await }),
        )
        .await?;
        bus.serve(subject::project::DELETE, route(self.clone(), |s, _ctx, req| async move { s.delete_project(req).await }))
            .await?;
        Ok(())
    }

    async fn projects(&self) -> Result<Arc<dyn StorageCollection>, Status> {
        self.engine.collection(&PROJECTS.into()).await.map_err(store_error)
    }

    async fn names(&self) -> Result<Arc<dyn StorageCollection>, Status> {
        self.engine.collection(&PROJECT_NAMES.into()).await.map_err(store_error)
    }

    async fn fetch(&self, id: ProjectId, account: &str) -> Result<ProjectRecord, Status> {
        let projects = self.projects().await?;
        let raw = projects.get(&id.to_bytes()).await.map_err(store_error)?;
        let record: ProjectRecord = match raw {
            Some(bytes) => codec::decode(&bytes).map_err(store_error)?,
            None => return Err(Status::not_found("project not found")),
        };
        if record.account != account {
            return Err(Status::not_found("project not found"));
        }
        Ok(record)
    }

    /// The authoritative state write has already happened when events go
    /// out, so publish failures are logged and swallowed.
    async fn publish_change<T: Serialize>(&self, project: ProjectId, event_kind: &str, author: &str, payload: &T) {
        let event = match Event::new(project, Utc::now().timestamp(), event_kind, author, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(project = %project, kind = event_kind, "event payload encoding failed: {e}");
                return;
            }
        };
        if let Err(e) = publish_event(self.bus.as_ref(), &event).await {
            warn!(project = %project, kind = event_kind, "event publish failed: {e}");
        }
    }

    pub async fn create_project(&self, req: CreateProjectRequest) -> Result<CreateProjectResponse, Status> {
        if req.account.is_empty() {
            return Err(Status::invalid_argument("account required"));
        }
        if req.name.is_empty() {
            return Err(Status::invalid_argument("name required"));
        }

        let now = Utc::now().timestamp();
        let record = ProjectRecord {
            id: ProjectId::new(),
            account: req.account.clone(),
            name: req.name.clone(),
            norm_name: req.name.to_lowercase(),
            description: req.description,
            created: now,
            modified: now,
            workflows: Vec::new(),
        };

        let names = self.names().await?;
        match names.insert_new(&name_key(&record.account, &record.name), &record.id.to_bytes()).await {
            Ok(()) => {}
            Err(StoreError::KeyExists) => return Err(Status::already_exists("project already exists")),
            Err(e) => return Err(store_error(e)),
        }

        let projects = self.projects().await?;
        projects.put(&record.id.to_bytes(), &codec::encode(&record).map_err(store_error)?).await.map_err(store_error)?;

        debug!(project = %record.id, account = %record.account, "project created");
        self.publish_change(record.id, kind::PROJECT_CREATED, &record.account, &ProjectCreated { name: record.name.clone() })
            .await;

        Ok(CreateProjectResponse { project: record.view() })
    }

    pub async fn get_project(&self, req: GetProjectRequest) -> Result<GetProjectResponse, Status> {
        let record = self.fetch(req.id, &req.account).await?;
        Ok(GetProjectResponse { project: record.view() })
    }

    pub async fn list_projects(&self, req: ListProjectsRequest) -> Result<ListProjectsResponse, Status> {
        let projects = self.projects().await?;
        let rows = projects.range(KeyRange::all(), Direction::Forward).await.map_err(store_error)?;
        let mut out = Vec::new();
        for (_, raw) in rows {
            let record: ProjectRecord = codec::decode(&raw).map_err(store_error)?;
            if record.account == req.account {
                out.push(record.view());
            }
        }
        Ok(ListProjectsResponse { projects: out })
    }

    pub async fn update_project(&self, req: UpdateProjectRequest) -> Result<UpdateProjectResponse, Status> {
        if req.name.is_empty() {
            return Err(Status::invalid_argument("name required"));
        }

        let mut record = self.fetch(req.id, &req.account).await?;

        let new_norm = req.name.to_lowercase();
        if new_norm != record.norm_name {
            let names = self.names().await?;
            match names.insert_new(&name_key(&record.account, &req.name), &record.id.to_bytes()).await {
                Ok(()) => {}
                Err(StoreError::KeyExists) => return Err(Status::already_exists("project already exists")),
                Err(e) => return Err(store_error(e)),
            }
            names.remove(&name_key(&record.account, &record.norm_name)).await.map_err(store_error)?;
        }

        record.name = req.name.clone();
        record.norm_name = new_norm;
        record.description = req.description.clone();
        record.modified = Utc::now().timestamp();

        let projects = self.projects().await?;
        projects.put(&record.id.to_bytes(), &codec::encode(&record).map_err(store_error)?).await.map_err(store_error)?;

        self.publish_change(
            record.id,
            kind::PROJECT_UPDATED,
            &req.account,
            &ProjectUpdated { name: req.name, description: req.description },
        )
        .await;

        Ok(UpdateProjectResponse {})
    }

    pub async fn update_workflow(&self, req: UpdateWorkflowRequest) -> Result<UpdateWorkflowResponse, Status> {
        let graph = parse_source(&req.source).map_err(|e| Status::invalid_argument(e.to_string()))?;

        let mut record = self.fetch(req.id, &req.account).await?;
        let previous = record.current_graph();

        let diff = diff_graph(&previous, &graph);
        if diff.is_empty() {
            return Err(Status::failed_precondition("nothing changed"));
        }

        let revision = WorkflowRevision {
            id: RevisionId::new(),
            source: req.source,
            modified: Utc::now().timestamp(),
            nodes: graph.nodes,
        };
        let revision_id = revision.id;
        record.workflows.push(revision);

        let projects = self.projects().await?;
        projects.put(&record.id.to_bytes(), &codec::encode(&record).map_err(store_error)?).await.map_err(store_error)?;

        debug!(project = %record.id, revision = %revision_id, "workflow revision appended");
        self.emit_diff(record.id, &req.account, revision_id, &diff).await;

        Ok(UpdateWorkflowResponse {})
    }

    /// One event per atomic change: added nodes, removed nodes, then per
    /// changed node a rename followed by input and output deltas. Emission
    /// order is storage order, since the bus preserves publish order per
    /// publisher.
    async fn emit_diff(&self, project: ProjectId, author: &str, revision: RevisionId, diff: &GraphDiff) {
        for (key, node) in &diff.added {
            let payload = NodeChange { workflow: revision, node: node_body(key, node) };
            self.publish_change(project, kind::NODE_ADDED, author, &payload).await;
        }

        for (key, node) in &diff.removed {
            let payload = NodeChange { workflow: revision, node: node_body(key, node) };
            self.publish_change(project, kind::NODE_REMOVED, author, &payload).await;
        }

        for (key, node_diff) in &diff.changed {
            if let Some(change) = &node_diff.title {
                let payload = NodeRenamed {
                    workflow: revision,
                    node: RenameBody { key: key.clone(), from: change.from.clone(), to: change.to.clone() },
                };
                self.publish_change(project, kind::NODE_RENAMED, author, &payload).await;
            }

            for (item, added) in &node_diff.input {
                let event_kind = if *added { kind::NODE_INPUT_ADDED } else { kind::NODE_INPUT_REMOVED };
                let payload = NodeInputDelta { workflow: revision, node: InputBody { key: key.clone(), input: item.clone() } };
                self.publish_change(project, event_kind, author, &payload).await;
            }

            for (item, added) in &node_diff.output {
                let event_kind = if *added { kind::NODE_OUTPUT_ADDED } else { kind::NODE_OUTPUT_REMOVED };
                let payload = NodeOutputDelta { workflow: revision, node: OutputBody { key: key.clone(), output: item.clone() } };
                self.publish_change(project, event_kind, author, &payload).await;
            }
        }
    }

    pub async fn delete_project(&self, req: DeleteProjectRequest) -> Result<DeleteProjectResponse, Status> {
        let record = self.fetch(req.id, &req.account).await?;

        let projects = self.projects().await?;
        projects.remove(&record.id.to_bytes()).await.map_err(store_error)?;
        let names = self.names().await?;
        names.remove(&name_key(&record.account, &record.norm_name)).await.map_err(store_error)?;

        // The project's event and commit collections stay behind.
        self.publish_change(record.id, kind::PROJECT_DELETED, &req.account, &ProjectDeleted {}).await;

        Ok(DeleteProjectResponse {})
    }
}

fn node_body(key: &str, node: &WorkflowNode) -> NodeBody {
    NodeBody {
        key: key.to_string(),
        kind: node.kind.as_str().to_string(),
        title: node.title.clone(),
        input: node.input.clone(),
        output: node.output.clone(),
    }
}
