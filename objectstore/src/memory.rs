use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Object, ObjectBucket, ObjectStore, ObjectStoreError};

type Blobs = Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>;

/// In-memory store for tests. Signs synthetic `memory://` URLs so the signed
/// upload/download paths can be exercised without a cloud backend.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Blobs,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Direct access for test assertions.
    pub fn contents(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(&(bucket.to_string(), name.to_string())).cloned()
    }

    pub fn put_blob(&self, bucket: &str, name: &str, data: impl Into<Vec<u8>>) {
        self.blobs.lock().unwrap().insert((bucket.to_string(), name.to_string()), data.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str { "memory" }

    fn bucket(&self, name: &str) -> Arc<dyn ObjectBucket> {
        Arc::new(MemoryBucket { blobs: self.blobs.clone(), name: name.to_string() })
    }

    async fn close(&self) -> Result<(), ObjectStoreError> { Ok(()) }
}

struct MemoryBucket {
    blobs: Blobs,
    name: String,
}

#[async_trait]
impl ObjectBucket for MemoryBucket {
    fn name(&self) -> &str { &self.name }

    async fn create(&self) -> Result<(), ObjectStoreError> { Ok(()) }

    async fn delete(&self) -> Result<(), ObjectStoreError> {
        self.blobs.lock().unwrap().retain(|(bucket, _), _| bucket != &self.name);
        Ok(())
    }

    fn object(&self, name: &str) -> Arc<dyn Object> {
        Arc::new(MemoryObject { blobs: self.blobs.clone(), bucket: self.name.clone(), name: name.to_string() })
    }
}

struct MemoryObject {
    blobs: Blobs,
    bucket: String,
    name: String,
}

impl MemoryObject {
    fn key(&self) -> (String, String) { (self.bucket.clone(), self.name.clone()) }
}

#[async_trait]
impl Object for MemoryObject {
    fn name(&self) -> &str { &self.name }

    fn bucket(&self) -> &str { &self.bucket }

    async fn exists(&self) -> Result<bool, ObjectStoreError> { Ok(self.blobs.lock().unwrap().contains_key(&self.key())) }

    async fn delete(&self) -> Result<(), ObjectStoreError> {
        self.blobs.lock().unwrap().remove(&self.key());
        Ok(())
    }

    async fn writer(&self) -> Result<Box<dyn AsyncWrite + Send + Unpin>, ObjectStoreError> {
        Ok(Box::new(MemoryWriter { blobs: self.blobs.clone(), key: self.key(), buf: Vec::new() }))
    }

    async fn reader(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>, ObjectStoreError> {
        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(&self.key())
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", self.bucket, self.name)))?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn signed_get_url(&self, expiry: Duration) -> Result<String, ObjectStoreError> {
        Ok(format!("memory://{}/{}?verb=GET&expires={}", self.bucket, self.name, expiry.as_secs()))
    }

    fn signed_put_url(&self, expiry: Duration) -> Result<String, ObjectStoreError> {
        Ok(format!("memory://{}/{}?verb=PUT&expires={}", self.bucket, self.name, expiry.as_secs()))
    }
}

/// Buffers writes and commits the blob on shutdown, so partially written
/// objects are never observable.
struct MemoryWriter {
    blobs: Blobs,
    key: (String, String),
    buf: Vec<u8>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        self.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let data = std::mem::take(&mut self.buf);
        self.blobs.lock().unwrap().insert(self.key.clone(), data);
        Poll::Ready(Ok(()))
    }
}
