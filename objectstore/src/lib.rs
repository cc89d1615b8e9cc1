//! Object storage behind the data registry.
//!
//! Backends are polymorphic over store → bucket → object; signed URLs are an
//! optional capability a backend may refuse with a distinct error, letting a
//! gateway fall back to proxying the transfer itself.

mod local;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use local::LocalStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("signed urls are not supported")]
    SignedUrlUnsupported,
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// An object storage system (local filesystem, S3-compatible, GCS, ...).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the storage provider, recorded on object metadata.
    fn name(&self) -> &'static str;

    fn bucket(&self, name: &str) -> Arc<dyn ObjectBucket>;

    async fn close(&self) -> Result<(), ObjectStoreError>;
}

/// A container of objects.
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self) -> Result<(), ObjectStoreError>;

    async fn delete(&self) -> Result<(), ObjectStoreError>;

    fn object(&self, name: &str) -> Arc<dyn Object>;
}

#[async_trait]
pub trait Object: Send + Sync {
    fn name(&self) -> &str;

    fn bucket(&self) -> &str;

    async fn exists(&self) -> Result<bool, ObjectStoreError>;

    async fn delete(&self) -> Result<(), ObjectStoreError>;

    /// Writer replacing the object contents. The write is visible once the
    /// writer is shut down.
    async fn writer(&self) -> Result<Box<dyn AsyncWrite + Send + Unpin>, ObjectStoreError>;

    async fn reader(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>, ObjectStoreError>;

    /// Time-limited URL granting direct GET access.
    /// `ObjectStoreError::SignedUrlUnsupported` when the backend cannot sign.
    fn signed_get_url(&self, expiry: Duration) -> Result<String, ObjectStoreError>;

    /// Time-limited URL granting direct PUT access.
    fn signed_put_url(&self, expiry: Duration) -> Result<String, ObjectStoreError>;
}
