use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use labtrail_bus::{decode_event, route, Bus};
use labtrail_proto::{
    subject, CommitReply, CommitRequest, CommitSeq, CommitView, EventSeq, EventView, HistoryReply, HistoryRequest,
    PendingReply, PendingRequest, ProjectId, Status,
};
use labtrail_storage_common::{codec, CollectionId, Direction, KeyRange, StorageCollection, StorageEngine, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMIT_RETRIES: usize = 3;

/// An event at rest in `<project>_events`; the sequence number is the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEvent {
    time: i64,
    kind: String,
    author: String,
    data: Vec<u8>,
}

/// A commit at rest in `<project>_commit`; the sequence number is the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCommit {
    msg: String,
    author: String,
    time: i64,
    parent: Option<CommitSeq>,
    /// Newest event sealed by this commit.
    event: EventSeq,
}

pub struct CommitLogService {
    engine: Arc<dyn StorageEngine>,
    bus: Arc<dyn Bus>,
    /// Per-project critical section for commit sealing.
    commit_locks: Mutex<BTreeMap<ProjectId, Arc<Mutex<()>>>>,
}

fn store_error(err: StoreError) -> Status {
    match err {
        StoreError::Backend(e) => Status::unavailable(format!("datastore: {e}")),
        other => Status::internal(other.to_string()),
    }
}

fn events_collection(project: ProjectId) -> CollectionId { format!("{project}_events").into() }

fn commit_collection(project: ProjectId) -> CollectionId { format!("{project}_commit").into() }

fn event_view(key: &[u8], raw: &[u8]) -> Result<EventView, Status> {
    let seq = EventSeq::from_key(key).ok_or_else(|| Status::internal("malformed event key"))?;
    let stored: StoredEvent = codec::decode(raw).map_err(store_error)?;
    Ok(EventView { id: seq, time: stored.time, kind: stored.kind, author: stored.author, data: stored.data })
}

impl CommitLogService {
    pub fn new(engine: Arc<dyn StorageEngine>, bus: Arc<dyn Bus>) -> Arc<Self> {
        Arc::new(Self { engine, bus, commit_locks: Mutex::new(BTreeMap::new()) })
    }

    pub async fn serve(self: &Arc<Self>) -> Result<(), Status> {
        let bus = self.bus.clone();
        bus.serve(subject::commitlog::COMMIT, route(self.clone(), |s, _ctx, req| async move { s.commit(req).await })).await?;
        bus.serve(subject::commitlog::HISTORY, route(self.clone(), |s, _ctx, req| async move { s.history(req).await }))
            .await?;
        bus.serve(subject::commitlog::PENDING, route(self.clone(), |s, _ctx, req| async move { s.pending(req).await }))
            .await?;
        Ok(())
    }

    /// Subscribe to `events.>` and record every envelope into its project's
    /// event collection. The returned task runs until the bus closes.
    pub async fn run_event_sink(self: &Arc<Self>) -> Result<JoinHandle<()>, Status> {
        let mut sub = self.bus.subscribe(subject::EVENTS_ALL).await?;
        let service = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(delivery) = sub.next().await {
                if let Err(e) = service.ingest(&delivery.payload).await {
                    warn!("event ingest failed: {e}");
                }
            }
        }))
    }

    async fn ingest(&self, payload: &[u8]) -> Result<(), Status> {
        let envelope = decode_event(payload)?;
        let events = self.engine.collection(&events_collection(envelope.project)).await.map_err(store_error)?;
        let stored =
            StoredEvent { time: envelope.time, kind: envelope.kind.clone(), author: envelope.author, data: envelope.data };
        let seq = events.append(&codec::encode(&stored).map_err(store_error)?).await.map_err(store_error)?;
        debug!(project = %envelope.project, kind = %envelope.kind, seq, "event recorded");
        Ok(())
    }

    async fn project_lock(&self, project: ProjectId) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().await;
        locks.entry(project).or_default().clone()
    }

    /// Seal the unsealed suffix of the project's event stream into a new
    /// commit. Runs under the per-project lock; the insert itself is
    /// create-if-absent, retried from the top when another writer (e.g.
    /// another process on the same datastore) claimed the sequence first.
    pub async fn commit(&self, req: CommitRequest) -> Result<CommitReply, Status> {
        let msg = req.msg.trim();
        if msg.is_empty() {
            return Err(Status::invalid_argument("message required"));
        }

        let lock = self.project_lock(req.project).await;
        let _guard = lock.lock().await;

        let commits = self.engine.collection(&commit_collection(req.project)).await.map_err(store_error)?;
        let events = self.engine.collection(&events_collection(req.project)).await.map_err(store_error)?;

        for _ in 0..COMMIT_RETRIES {
            let latest = match commits.last().await.map_err(store_error)? {
                Some((key, raw)) => {
                    let seq = CommitSeq::from_key(&key).ok_or_else(|| Status::internal("malformed commit key"))?;
                    let stored: StoredCommit = codec::decode(&raw).map_err(store_error)?;
                    Some((seq, stored))
                }
                None => None,
            };

            let head = match events.last().await.map_err(store_error)? {
                Some((key, _)) => EventSeq::from_key(&key).ok_or_else(|| Status::internal("malformed event key"))?,
                None => return Err(Status::failed_precondition("nothing to commit")),
            };
            if let Some((_, latest)) = &latest {
                if head <= latest.event {
                    return Err(Status::failed_precondition("nothing to commit"));
                }
            }

            let seq = CommitSeq(latest.as_ref().map(|(seq, _)| seq.0 + 1).unwrap_or(1));
            let stored = StoredCommit {
                msg: msg.to_string(),
                author: req.author.clone(),
                time: Utc::now().timestamp(),
                parent: latest.as_ref().map(|(seq, _)| *seq),
                event: head,
            };

            match commits.insert_new(&seq.to_key(), &codec::encode(&stored).map_err(store_error)?).await {
                Ok(()) => {
                    debug!(project = %req.project, commit = %seq, event = %head, "commit sealed");
                    return Ok(CommitReply { id: seq });
                }
                Err(StoreError::KeyExists) => continue,
                Err(e) => return Err(store_error(e)),
            }
        }

        Err(Status::aborted("commit conflict"))
    }

    /// One page of history: the selected commit (newest when unspecified),
    /// its sealed event window newest-first, and the parent commit id for
    /// the next page.
    pub async fn history(&self, req: HistoryRequest) -> Result<HistoryReply, Status> {
        let commits = self.engine.collection(&commit_collection(req.project)).await.map_err(store_error)?;
        let events = self.engine.collection(&events_collection(req.project)).await.map_err(store_error)?;

        let (seq, stored) = match req.commit {
            None => match commits.last().await.map_err(store_error)? {
                None => return Ok(HistoryReply { commit: None, next: None }),
                Some((key, raw)) => {
                    let seq = CommitSeq::from_key(&key).ok_or_else(|| Status::internal("malformed commit key"))?;
                    let stored: StoredCommit = codec::decode(&raw).map_err(store_error)?;
                    (seq, stored)
                }
            },
            Some(seq) => match commits.get(&seq.to_key()).await.map_err(store_error)? {
                None => return Err(Status::not_found("commit not found")),
                Some(raw) => (seq, codec::decode::<StoredCommit>(&raw).map_err(store_error)?),
            },
        };

        let parent = match stored.parent {
            Some(parent_seq) => match commits.get(&parent_seq.to_key()).await.map_err(store_error)? {
                Some(raw) => Some((parent_seq, codec::decode::<StoredCommit>(&raw).map_err(store_error)?)),
                None => return Err(Status::internal("commit chain is broken")),
            },
            None => None,
        };

        let window = KeyRange {
            after: parent.as_ref().map(|(_, p)| p.event.to_key().to_vec()),
            upto: Some(stored.event.to_key().to_vec()),
        };
        let rows = events.range(window, Direction::Reverse).await.map_err(store_error)?;
        let mut views = Vec::with_capacity(rows.len());
        for (key, raw) in &rows {
            views.push(event_view(key, raw)?);
        }

        Ok(HistoryReply {
            commit: Some(CommitView { id: seq, msg: stored.msg, author: stored.author, time: stored.time, events: views }),
            next: parent.map(|(seq, _)| seq),
        })
    }

    /// The unsealed suffix: all events newer than the latest commit's
    /// pointer, newest-first.
    pub async fn pending(&self, req: PendingRequest) -> Result<PendingReply, Status> {
        let commits = self.engine.collection(&commit_collection(req.project)).await.map_err(store_error)?;
        let events = self.engine.collection(&events_collection(req.project)).await.map_err(store_error)?;

        let after = match commits.last().await.map_err(store_error)? {
            Some((_, raw)) => {
                let stored: StoredCommit = codec::decode(&raw).map_err(store_error)?;
                Some(stored.event.to_key().to_vec())
            }
            None => None,
        };

        let rows = events.range(KeyRange { after, upto: None }, Direction::Reverse).await.map_err(store_error)?;
        let mut views = Vec::with_capacity(rows.len());
        for (key, raw) in &rows {
            views.push(event_view(key, raw)?);
        }
        Ok(PendingReply { events: views })
    }
}
