use std::sync::Arc;

use chrono::Utc;
use labtrail_bus::{call, Bus};
use labtrail_proto::{
    subject, DescribeReply, DescribeRequest, GetObjectReply, GetObjectRequest, ImportReply, ImportRequest, ObjectId,
    ObjectState, Status, UpdateObjectReply, UpdateObjectRequest, UploadReply, UploadRequest,
};
use sha2::{Digest, Sha256};

use crate::service::sha256_hex;

/// Typed client for the data registry endpoints.
#[derive(Clone)]
pub struct DataClient {
    bus: Arc<dyn Bus>,
}

impl DataClient {
    pub fn new(bus: Arc<dyn Bus>) -> Self { Self { bus } }

    pub async fn upload(&self) -> Result<UploadReply, Status> {
        call(self.bus.as_ref(), subject::data::UPLOAD, &UploadRequest {}).await
    }

    pub async fn import(&self, url: &str) -> Result<ObjectId, Status> {
        let rep: ImportReply = call(self.bus.as_ref(), subject::data::IMPORT, &ImportRequest { url: url.into() }).await?;
        Ok(rep.id)
    }

    pub async fn describe(&self, id: ObjectId) -> Result<DescribeReply, Status> {
        call(self.bus.as_ref(), subject::data::DESCRIBE, &DescribeRequest { id }).await
    }

    pub async fn update(&self, req: UpdateObjectRequest) -> Result<(), Status> {
        let _: UpdateObjectReply = call(self.bus.as_ref(), subject::data::UPDATE, &req).await?;
        Ok(())
    }

    pub async fn get(&self, id: ObjectId) -> Result<String, Status> {
        let rep: GetObjectReply = call(self.bus.as_ref(), subject::data::GET, &GetObjectRequest { id }).await?;
        Ok(rep.signed_url)
    }

    /// Drive the whole upload sequence: register the object, PUT the body
    /// to the signed URL, and seal the record with the observed hash and
    /// size. On a transfer failure the object is parked in ERROR before the
    /// cause is returned.
    pub async fn upload_body(&self, mediatype: &str, body: Vec<u8>) -> Result<ObjectId, Status> {
        let reply = self.upload().await?;
        let id = reply.id;

        self.update(UpdateObjectRequest {
            id,
            state: ObjectState::InProgress,
            import_time: Utc::now().timestamp(),
            ..update_defaults(id)
        })
        .await?;

        match put_signed(&reply.signed_url, mediatype, &body).await {
            Ok(()) => {}
            Err(cause) => {
                self.update(UpdateObjectRequest { id, state: ObjectState::Error, error: cause.clone(), ..update_defaults(id) })
                    .await?;
                return Err(Status::unavailable(cause));
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(&body);

        self.update(UpdateObjectRequest {
            id,
            state: ObjectState::Done,
            put_time: Utc::now().timestamp(),
            hash: sha256_hex(hasher),
            size: body.len() as i64,
            mediatype: mediatype.into(),
            ..update_defaults(id)
        })
        .await?;

        Ok(id)
    }
}

async fn put_signed(url: &str, mediatype: &str, body: &[u8]) -> Result<(), String> {
    let client = reqwest::Client::new();
    let mut req = client.put(url).body(body.to_vec());
    if !mediatype.is_empty() {
        req = req.header(reqwest::header::CONTENT_TYPE, mediatype);
    }
    let resp = req.send().await.map_err(|e| format!("request error: {e}"))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("http error: {status}\n{text}"));
    }
    Ok(())
}

fn update_defaults(id: ObjectId) -> UpdateObjectRequest {
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
