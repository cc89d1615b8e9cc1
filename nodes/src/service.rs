use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use labtrail_bus::{decode_event, publish_event, route, Bus};
use labtrail_proto::event::{kind, FilesChanged, NodeChange, NodeRenamed, NotesUpdated};
use labtrail_proto::{
    subject, AddFilesRequest, Code, CreateNodeRequest, Event, FileRef, GetNodeReply, GetNodeRequest, NodeKind,
    NodeReply, ProjectId, RemoveFilesRequest, SetNotesRequest, SetTitleRequest, Status,
};
use labtrail_storage_common::{codec, CollectionId, StorageCollection, StorageEngine, StoreError};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A projected node at rest, keyed by node key in the per-project
/// collection.
///
/// Kind and title are rebuildable from the event stream; notes and files
/// live only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    key: String,
    project: ProjectId,
    kind: NodeKind,
    title: String,
    notes: String,
    files: Vec<FileRef>,
    created: i64,
    modified: i64,
}

pub struct NodeService {
    engine: Arc<dyn StorageEngine>,
    bus: Arc<dyn Bus>,
}

fn store_error(err: StoreError) -> Status {
    match err {
        StoreError::Backend(e) => Status::unavailable(format!("datastore: {e}")),
        other => Status::internal(other.to_string()),
    }
}

fn node_collection(project: ProjectId) -> CollectionId { project.to_string().into() }

impl NodeService {
    pub fn new(engine: Arc<dyn StorageEngine>, bus: Arc<dyn Bus>) -> Arc<Self> { Arc::new(Self { engine, bus }) }

    pub async fn serve(self: &Arc<Self>) -> Result<(), Status> {
        let bus = self.bus.clone();
        bus.serve(subject::nodes::CREATE, route(self.clone(), |s, _ctx, req| async move { s.create(req).await })).await?;
        bus.serve(subject::nodes::SET_TITLE, route(self.clone(), |s, _ctx, req| async move { s.set_title(req).await }))
            .await?;
        bus.serve(subject::nodes::SET_NOTES, route(self.clone(), |s, _ctx, req| async move { s.set_notes(req).await }))
            .await?;
        bus.serve(subject::nodes::ADD_FILES, route(self.clone(), |s, _ctx, req| async move { s.add_files(req).await }))
            .await?;
        bus.serve(subject::nodes::REMOVE_FILES, route(self.clone(), |s, _ctx, req| async move { s.remove_files(req).await }))
            .await?;
        bus.serve(subject::nodes::GET, route(self.clone(), |s, _ctx, req| async move { s.get(req).await })).await?;
        Ok(())
    }

    /// Rebuilds node state from `events.>`: `node.added` creates (replays
    /// are idempotent), `node.renamed` retitles, everything else is ignored.
    pub async fn run_event_consumer(self: &Arc<Self>) -> Result<JoinHandle<()>, Status> {
        let mut sub = self.bus.subscribe(subject::EVENTS_ALL).await?;
        let service = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(delivery) = sub.next().await {
                let envelope = match decode_event(&delivery.payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("event decode failed: {e}");
                        continue;
                    }
                };
                if let Err(e) = service.apply_event(&envelope).await {
                    warn!(project = %envelope.project, kind = %envelope.kind, "projection update failed: {e}");
                }
            }
        }))
    }

    async fn apply_event(&self, envelope: &Event) -> Result<(), Status> {
        match envelope.kind.as_str() {
            kind::NODE_ADDED => {
                let payload: NodeChange = envelope.decode_data().map_err(|e| Status::internal(e.to_string()))?;
                let req = CreateNodeRequest {
                    project: envelope.project,
                    id: payload.node.key,
                    kind: NodeKind::parse(&payload.node.kind),
                    title: payload.node.title,
                };
                match self.create(req).await {
                    Ok(_) => Ok(()),
                    // Redelivery or replay; the node is already there.
                    Err(status) if status.code == Code::AlreadyExists => Ok(()),
                    Err(e) => Err(e),
                }
            }
            kind::NODE_RENAMED => {
                let payload: NodeRenamed = envelope.decode_data().map_err(|e| Status::internal(e.to_string()))?;
                let req = SetTitleRequest { project: envelope.project, id: payload.node.key, title: payload.node.to };
                self.set_title(req).await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    async fn nodes(&self, project: ProjectId) -> Result<Arc<dyn StorageCollection>, Status> {
        self.engine.collection(&node_collection(project)).await.map_err(store_error)
    }

    async fn fetch(&self, project: ProjectId, id: &str) -> Result<NodeRecord, Status> {
        let nodes = self.nodes(project).await?;
        match nodes.get(id.as_bytes()).await.map_err(store_error)? {
            Some(raw) => codec::decode(&raw).map_err(store_error),
            None => Err(Status::not_found("node does not exist")),
        }
    }

    async fn put(&self, record: &NodeRecord) -> Result<(), Status> {
        let nodes = self.nodes(record.project).await?;
        nodes.put(record.key.as_bytes(), &codec::encode(record).map_err(store_error)?).await.map_err(store_error)
    }

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

    pub async fn create(&self, req: CreateNodeRequest) -> Result<NodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }

        let now = Utc::now().timestamp();
        let record = NodeRecord {
            key: req.id.clone(),
            project: req.project,
            kind: req.kind,
            title: req.title,
            notes: String::new(),
            files: Vec::new(),
            created: now,
            modified: now,
        };

        let nodes = self.nodes(req.project).await?;
        match nodes.insert_new(record.key.as_bytes(), &codec::encode(&record).map_err(store_error)?).await {
            Ok(()) => {
                debug!(project = %req.project, node = %record.key, "node created");
                Ok(NodeReply {})
            }
            Err(StoreError::KeyExists) => Err(Status::already_exists("node already exists")),
            Err(e) => Err(store_error(e)),
        }
    }

    pub async fn set_title(&self, req: SetTitleRequest) -> Result<NodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }
        let mut record = self.fetch(req.project, &req.id).await?;
        record.title = req.title;
        record.modified = Utc::now().timestamp();
        self.put(&record).await?;
        Ok(NodeReply {})
    }

    pub async fn set_notes(&self, req: SetNotesRequest) -> Result<NodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }
        let mut record = self.fetch(req.project, &req.id).await?;
        record.notes = req.notes.clone();
        record.modified = Utc::now().timestamp();
        self.put(&record).await?;

        self.publish_change(
            req.project,
            kind::NODE_UPDATED_NOTES,
            &req.account,
            &NotesUpdated { id: req.id, notes: req.notes },
        )
        .await;
        Ok(NodeReply {})
    }

    pub async fn add_files(&self, req: AddFilesRequest) -> Result<NodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }
        if req.files.is_empty() {
            return Err(Status::invalid_argument("no files specified"));
        }

        let mut record = self.fetch(req.project, &req.id).await?;
        record.files.extend(req.files.iter().cloned());
        record.modified = Utc::now().timestamp();
        self.put(&record).await?;

        self.publish_change(req.project, kind::NODE_ADDED_FILES, &req.account, &FilesChanged { id: req.id, files: req.files })
            .await;
        Ok(NodeReply {})
    }

    pub async fn remove_files(&self, req: RemoveFilesRequest) -> Result<NodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }
        if req.file_ids.is_empty() {
            return Err(Status::invalid_argument("no files specified"));
        }

        let mut record = self.fetch(req.project, &req.id).await?;

        // Every requested id must be attached; otherwise nothing changes.
        let index: BTreeMap<_, _> = record.files.iter().map(|f| (f.id, f.clone())).collect();
        let mut removed = Vec::with_capacity(req.file_ids.len());
        for id in &req.file_ids {
            match index.get(id) {
                Some(file) => removed.push(file.clone()),
                None => return Err(Status::not_found(format!("file `{id}` does not exist"))),
            }
        }

        record.files.retain(|f| !req.file_ids.contains(&f.id));
        record.modified = Utc::now().timestamp();
        self.put(&record).await?;

        self.publish_change(req.project, kind::NODE_REMOVED_FILES, &req.account, &FilesChanged { id: req.id, files: removed })
            .await;
        Ok(NodeReply {})
    }

    pub async fn get(&self, req: GetNodeRequest) -> Result<GetNodeReply, Status> {
        if req.id.trim().is_empty() {
            return Err(Status::invalid_argument("project and id required"));
        }
        let record = self.fetch(req.project, &req.id).await?;
        Ok(GetNodeReply {
            id: record.key,
            kind: record.kind,
            title: record.title,
            notes: record.notes,
            files: record.files,
            created: record.created,
            modified: record.modified,
        })
    }
}
