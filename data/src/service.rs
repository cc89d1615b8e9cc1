use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use labtrail_bus::{route, Bus};
use labtrail_objectstore::{ObjectStore, ObjectStoreError};
use labtrail_proto::{
    subject, DescribeReply, DescribeRequest, GetObjectReply, GetObjectRequest, ImportReply, ImportRequest, ObjectId,
    ObjectState, Status, UpdateObjectReply, UpdateObjectRequest, UploadReply, UploadRequest,
};
use labtrail_storage_common::{codec, StorageCollection, StorageEngine, StoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

const OBJECTS: &str = "objects";
const URL_EXPIRY: Duration = Duration::from_secs(60 * 60);
const IMPORT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectRecord {
    id: ObjectId,
    state: ObjectState,
    error: String,
    bucket: String,
    storage: String,
    import_url: String,
    create_time: i64,
    modified_time: i64,
    import_time: i64,
    put_time: i64,
    hash: String,
    size: i64,
    mediatype: String,
    /// Optimistic concurrency counter; every update must win a
    /// compare-and-swap against the version it read.
    version: u64,
}

struct FileMeta {
    size: i64,
    mediatype: String,
    hash: String,
}

pub struct DataService {
    engine: Arc<dyn StorageEngine>,
    bus: Arc<dyn Bus>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

fn store_error(err: StoreError) -> Status {
    match err {
        StoreError::Backend(e) => Status::unavailable(format!("datastore: {e}")),
        other => Status::internal(other.to_string()),
    }
}

fn signing_error(err: ObjectStoreError) -> Status {
    match err {
        ObjectStoreError::SignedUrlUnsupported => Status::unimplemented("signed urls are not supported"),
        other => Status::unavailable(format!("object store: {other}")),
    }
}

pub fn sha256_hex(hasher: Sha256) -> String { format!("sha256:{:x}", hasher.finalize()) }

impl DataService {
    pub fn new(engine: Arc<dyn StorageEngine>, bus: Arc<dyn Bus>, store: Arc<dyn ObjectStore>, bucket: &str) -> Arc<Self> {
        Arc::new(Self { engine, bus, store, bucket: bucket.to_string() })
    }

    pub async fn serve(self: &Arc<Self>) -> Result<(), Status> {
        let bus = self.bus.clone();
        bus.serve(subject::data::UPLOAD, route(self.clone(), |s, _ctx, req| async move { s.upload(req).await })).await?;
        bus.serve(subject::data::IMPORT, route(self.clone(), |s, _ctx, req| async move { s.import(req).await })).await?;
        bus.serve(subject::data::DESCRIBE, route(self.clone(), |s, _ctx, req| async move { s.describe(req).await })).await?;
        bus.serve(subject::data::UPDATE, route(self.clone(), |s, _ctx, req| async move { s.update(req).await })).await?;
        bus.serve(subject::data::GET, route(self.clone(), |s, _ctx, req| async move { s.get(req).await })).await?;
        Ok(())
    }

    async fn objects(&self) -> Result<Arc<dyn StorageCollection>, Status> {
        self.engine.collection(&OBJECTS.into()).await.map_err(store_error)
    }

    async fn fetch_raw(&self, id: ObjectId) -> Result<(ObjectRecord, Vec<u8>), Status> {
        let objects = self.objects().await?;
        match objects.get(&id.to_bytes()).await.map_err(store_error)? {
            Some(raw) => {
                let record: ObjectRecord = codec::decode(&raw).map_err(store_error)?;
                Ok((record, raw))
            }
            None => Err(Status::not_found("object not found")),
        }
    }

    async fn insert_created(&self, import_url: &str) -> Result<ObjectRecord, Status> {
        let now = Utc::now().timestamp();
        let record = ObjectRecord {
            id: ObjectId::new(),
            state: ObjectState::Created,
            error: String::new(),
            bucket: self.bucket.clone(),
            storage: self.store.name().to_string(),
            import_url: import_url.to_string(),
            create_time: now,
            modified_time: now,
            import_time: 0,
            put_time: 0,
            hash: String::new(),
            size: 0,
            mediatype: String::new(),
            version: 0,
        };
        let objects = self.objects().await?;
        match objects.insert_new(&record.id.to_bytes(), &codec::encode(&record).map_err(store_error)?).await {
            Ok(()) => Ok(record),
            Err(StoreError::KeyExists) => Err(Status::already_exists("object already exists")),
            Err(e) => Err(store_error(e)),
        }
    }

    /// Register an object and hand the caller a signed PUT URL; the caller
    /// performs the PUT out of band and reports back through `Update`.
    pub async fn upload(&self, _req: UploadRequest) -> Result<UploadReply, Status> {
        let record = self.insert_created("").await?;

        let object = self.store.bucket(&self.bucket).object(&record.id.to_string());
        let signed_url = object.signed_put_url(URL_EXPIRY).map_err(signing_error)?;

        debug!(object = %record.id, "upload registered");
        Ok(UploadReply { id: record.id, signed_url })
    }

    /// Register an object whose content is fetched asynchronously from a
    /// remote URL.
    pub async fn import(self: &Arc<Self>, req: ImportRequest) -> Result<ImportReply, Status> {
        if req.url.is_empty() {
            return Err(Status::invalid_argument("url required"));
        }

        let record = self.insert_created(&req.url).await?;
        let id = record.id;

        let service = self.clone();
        tokio::spawn(async move { service.fetch(record).await });

        Ok(ImportReply { id })
    }

    /// The import task: mark in-progress, stream the remote body into
    /// storage while hashing, then apply the terminal update. Failures land
    /// in the ERROR state with the cause recorded on the object.
    async fn fetch(&self, object: ObjectRecord) {
        let started = self
            .update(UpdateObjectRequest {
                id: object.id,
                state: ObjectState::InProgress,
                import_time: Utc::now().timestamp(),
                ..blank_update(object.id)
            })
            .await;
        if let Err(e) = started {
            error!(object = %object.id, "failed to set import in progress: {e}");
            return;
        }

        let result = match tokio::time::timeout(IMPORT_TIMEOUT, self.transfer(&object)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("import timed out")),
        };

        match result {
            Ok(meta) => {
                let done = self
                    .update(UpdateObjectRequest {
                        id: object.id,
                        state: ObjectState::Done,
                        put_time: Utc::now().timestamp(),
                        hash: meta.hash,
                        size: meta.size,
                        mediatype: meta.mediatype,
                        ..blank_update(object.id)
                    })
                    .await;
                if let Err(e) = done {
                    // Log loudly so the state can be repaired by hand.
                    error!(object = %object.id, "failed to set DONE state: {e}");
                }
            }
            Err(cause) => {
                let failed = self
                    .update(UpdateObjectRequest {
                        id: object.id,
                        state: ObjectState::Error,
                        error: cause.to_string(),
                        ..blank_update(object.id)
                    })
                    .await;
                if let Err(e) = failed {
                    error!(object = %object.id, "failed to set ERROR state: {e}; original error: {cause}");
                }
            }
        }
    }

    async fn transfer(&self, object: &ObjectRecord) -> anyhow::Result<FileMeta> {
        let resp = reqwest::get(&object.import_url).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("http error: {status}\n{body}");
        }
        let mediatype = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut writer = self.store.bucket(&object.bucket).object(&object.id.to_string()).writer().await?;

        // Stream the body through the hash and into storage.
        let mut hasher = Sha256::new();
        let mut size: i64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            size += chunk.len() as i64;
            writer.write_all(&chunk).await?;
        }
        writer.shutdown().await?;

        Ok(FileMeta { size, mediatype, hash: sha256_hex(hasher) })
    }

    pub async fn describe(&self, req: DescribeRequest) -> Result<DescribeReply, Status> {
        let (record, _) = self.fetch_raw(req.id).await?;
        Ok(DescribeReply {
            id: record.id,
            state: record.state,
            error: record.error,
            import_url: record.import_url,
            create_time: record.create_time,
            modified_time: record.modified_time,
            import_time: record.import_time,
            put_time: record.put_time,
            hash: record.hash,
            size: record.size,
            mediatype: record.mediatype,
        })
    }

    /// Advance the object state machine. Each call is an optimistic
    /// compare-and-swap on the version it read; a losing writer gets
    /// `Unavailable` and must refetch.
    pub async fn update(&self, req: UpdateObjectRequest) -> Result<UpdateObjectReply, Status> {
        let (record, raw) = self.fetch_raw(req.id).await?;

        if record.state == ObjectState::Done {
            return Err(Status::failed_precondition("object is done"));
        }

        let mut next = record.clone();
        match req.state {
            ObjectState::InProgress => {
                if !matches!(record.state, ObjectState::Created | ObjectState::Error) {
                    return Err(Status::failed_precondition(format!(
                        "object cannot transition to INPROGRESS from {}",
                        record.state
                    )));
                }
                next.state = ObjectState::InProgress;
                next.error = String::new();
                next.import_time = req.import_time;
            }
            ObjectState::Error => {
                if record.state != ObjectState::InProgress {
                    return Err(Status::failed_precondition(format!(
                        "object cannot transition to ERROR from {}",
                        record.state
                    )));
                }
                next.state = ObjectState::Error;
                next.error = req.error;
            }
            ObjectState::Done => {
                if record.state != ObjectState::InProgress {
                    return Err(Status::failed_precondition(format!(
                        "object cannot transition to DONE from {}",
                        record.state
                    )));
                }
                next.state = ObjectState::Done;
                next.put_time = req.put_time;
                next.hash = req.hash;
                next.size = req.size;
                next.mediatype = req.mediatype;
            }
            ObjectState::Created => {
                return Err(Status::failed_precondition("object cannot transition to CREATED"));
            }
        }

        next.version = record.version + 1;
        next.modified_time = Utc::now().timestamp();

        let objects = self.objects().await?;
        let encoded = codec::encode(&next).map_err(store_error)?;
        match objects.compare_and_swap(&req.id.to_bytes(), Some(&raw), Some(&encoded)).await {
            Ok(()) => {
                debug!(object = %req.id, state = %next.state, version = next.version, "object updated");
                Ok(UpdateObjectReply {})
            }
            Err(StoreError::CasConflict) => {
                warn!(object = %req.id, "object update lost a version race");
                Err(Status::unavailable("object update conflict"))
            }
            Err(e) => Err(store_error(e)),
        }
    }

    /// Signed GET URL for the object's content.
    pub async fn get(&self, req: GetObjectRequest) -> Result<GetObjectReply, Status> {
        let (record, _) = self.fetch_raw(req.id).await?;
        let object = self.store.bucket(&record.bucket).object(&record.id.to_string());
        let signed_url = object.signed_get_url(URL_EXPIRY).map_err(signing_error)?;
        Ok(GetObjectReply { signed_url })
    }
}

fn blank_update(id: ObjectId) -> UpdateObjectRequest {
    UpdateObjectRequest {
        id,
        state: ObjectState::Created,
        error: String::new(),
        import_time: 0,
        put_time: 0,
        hash: String::new(),
        size: 0,
        mediatype: String::new(),
    }
}
