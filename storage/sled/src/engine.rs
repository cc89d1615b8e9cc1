use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use labtrail_storage_common::{CollectionId, StorageCollection, StorageEngine, StoreError};
use sled::Config;

use crate::collection::SledStorageCollection;

pub struct SledStorageEngine {
    db: sled::Db,
}

impl SledStorageEngine {
    pub fn with_path(path: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&path).map_err(StoreError::backend)?;
        let db = sled::open(path.join("sled")).map_err(StoreError::backend)?;
        Ok(Self { db })
    }

    /// Temporary database for tests; never flushed to a real path.
    pub fn new_test() -> Result<Self, StoreError> {
        let db = Config::new().temporary(true).flush_every_ms(None).open().map_err(StoreError::backend)?;
        Ok(Self { db })
    }

    fn tree_name(id: &CollectionId) -> String { format!("collection_{id}") }
}

#[async_trait]
impl StorageEngine for SledStorageEngine {
    async fn collection(&self, id: &CollectionId) -> Result<Arc<dyn StorageCollection>, StoreError> {
        let tree = self.db.open_tree(Self::tree_name(id)).map_err(StoreError::backend)?;
        Ok(Arc::new(SledStorageCollection::new(tree)))
    }

    async fn drop_collection(&self, id: &CollectionId) -> Result<bool, StoreError> {
        self.db.drop_tree(Self::tree_name(id)).map_err(StoreError::backend)
    }
}
