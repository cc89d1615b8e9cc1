use std::ops::Bound;

use async_trait::async_trait;
use labtrail_storage_common::{Direction, KeyRange, StorageCollection, StoreError};

pub struct SledStorageCollection {
    tree: sled::Tree,
}

impl SledStorageCollection {
    pub fn new(tree: sled::Tree) -> Self { Self { tree } }

    fn bounds(range: &KeyRange) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let start = match &range.after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let end = match &range.upto {
            Some(key) => Bound::Included(key.clone()),
            None => Bound::Unbounded,
        };
        (start, end)
    }
}

#[async_trait]
impl StorageCollection for SledStorageCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree.get(key).map_err(StoreError::backend)?.map(|ivec| ivec.to_vec()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.tree.insert(key, value).map_err(StoreError::backend)?;
        Ok(())
    }

    async fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        match self.tree.compare_and_swap(key, None as Option<&[u8]>, Some(value)).map_err(StoreError::backend)? {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::KeyExists),
        }
    }

    async fn compare_and_swap(&self, key: &[u8], old: Option<&[u8]>, new: Option<&[u8]>) -> Result<(), StoreError> {
        match self.tree.compare_and_swap(key, old, new).map_err(StoreError::backend)? {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::CasConflict),
        }
    }

    async fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree.remove(key).map_err(StoreError::backend)?.map(|ivec| ivec.to_vec()))
    }

    async fn append(&self, value: &[u8]) -> Result<u64, StoreError> {
        // Claim the next sequence with a create-if-absent CAS; a loser simply
        // re-reads the tail and tries the following slot.
        loop {
            let next = match self.tree.last().map_err(StoreError::backend)? {
                Some((key, _)) => {
                    let bytes: [u8; 8] = key.as_ref().try_into().map_err(StoreError::backend)?;
                    u64::from_be_bytes(bytes) + 1
                }
                None => 1,
            };
            let claimed = self
                .tree
                .compare_and_swap(next.to_be_bytes(), None as Option<&[u8]>, Some(value))
                .map_err(StoreError::backend)?;
            if claimed.is_ok() {
                return Ok(next);
            }
        }
    }

    async fn last(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self.tree.last().map_err(StoreError::backend)?.map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    async fn range(&self, range: KeyRange, direction: Direction) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let iter = self.tree.range::<Vec<u8>, _>(Self::bounds(&range));
        let mut out = Vec::new();
        match direction {
            Direction::Forward => {
                for entry in iter {
                    let (k, v) = entry.map_err(StoreError::backend)?;
                    out.push((k.to_vec(), v.to_vec()));
                }
            }
            Direction::Reverse => {
                for entry in iter.rev() {
                    let (k, v) = entry.map_err(StoreError::backend)?;
                    out.push((k.to_vec(), v.to_vec()));
                }
            }
        }
        Ok(out)
    }
}
