use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Object, ObjectBucket, ObjectStore, ObjectStoreError};

/// Filesystem-backed store: `<base>/<bucket>/<object>`. Cannot sign URLs.
pub struct LocalStore {
    base: Arc<PathBuf>,
}

impl LocalStore {
    pub fn new(base: impl Into<PathBuf>) -> Self { Self { base: Arc::new(base.into()) } }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str { "local" }

    fn bucket(&self, name: &str) -> Arc<dyn ObjectBucket> {
        Arc::new(LocalBucket { base: self.base.clone(), name: name.to_string() })
    }

    async fn close(&self) -> Result<(), ObjectStoreError> { Ok(()) }
}

struct LocalBucket {
    base: Arc<PathBuf>,
    name: String,
}

#[async_trait]
impl ObjectBucket for LocalBucket {
    fn name(&self) -> &str { &self.name }

    async fn create(&self) -> Result<(), ObjectStoreError> {
        fs::create_dir_all(self.base.join(&self.name)).await?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), ObjectStoreError> {
        fs::remove_dir_all(self.base.join(&self.name)).await?;
        Ok(())
    }

    fn object(&self, name: &str) -> Arc<dyn Object> {
        Arc::new(LocalObject { base: self.base.clone(), bucket: self.name.clone(), name: name.to_string() })
    }
}

struct LocalObject {
    base: Arc<PathBuf>,
    bucket: String,
    name: String,
}

impl LocalObject {
    fn path(&self) -> PathBuf { self.base.join(&self.bucket).join(&self.name) }
}

#[async_trait]
impl Object for LocalObject {
    fn name(&self) -> &str { &self.name }

    fn bucket(&self) -> &str { &self.bucket }

    async fn exists(&self) -> Result<bool, ObjectStoreError> {
        match fs::metadata(self.path()).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self) -> Result<(), ObjectStoreError> {
        fs::remove_file(self.path()).await?;
        Ok(())
    }

    async fn writer(&self) -> Result<Box<dyn AsyncWrite + Send + Unpin>, ObjectStoreError> {
        let path = self.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let file = fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn reader(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>, ObjectStoreError> {
        match fs::File::open(self.path()).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(format!("{}/{}", self.bucket, self.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn signed_get_url(&self, _expiry: Duration) -> Result<String, ObjectStoreError> { Err(ObjectStoreError::SignedUrlUnsupported) }

    fn signed_put_url(&self, _expiry: Duration) -> Result<String, ObjectStoreError> { Err(ObjectStoreError::SignedUrlUnsupported) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_then_read_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalStore::new(dir.path());
        let object = store.bucket("experiments").object("raw.csv");

        assert!(!object.exists().await?);
        let mut w = object.writer().await?;
        w.write_all(b"a,b\n1,2\n").await?;
        w.shutdown().await?;

        assert!(object.exists().await?);
        let mut contents = Vec::new();
        object.reader().await?.read_to_end(&mut contents).await?;
        assert_eq!(contents, b"a,b\n1,2\n");

        object.delete().await?;
        assert!(!object.exists().await?);
        Ok(())
    }

    #[tokio::test]
    async fn signing_is_reported_unsupported() {
        let store = LocalStore::new("/tmp/unused");
        let object = store.bucket("b").object("o");
        match object.signed_put_url(Duration::from_secs(3600)) {
            Err(ObjectStoreError::SignedUrlUnsupported) => {}
            other => panic!("expected SignedUrlUnsupported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_object_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let object = store.bucket("b").object("absent");
        match object.reader().await {
            Err(ObjectStoreError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}
