use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::StoreError;

/// Name of a stored collection, e.g. `projects` or `<project_id>_events`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for CollectionId {
    fn from(val: &str) -> Self { CollectionId(val.to_string()) }
}

impl From<String> for CollectionId {
    fn from(val: String) -> Self { CollectionId(val) }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Ground-truth datastore for a service. Implementations must be cheap to
/// share behind an `Arc` and safe under concurrent handlers.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn collection(&self, id: &CollectionId) -> Result<Arc<dyn StorageCollection>, StoreError>;

    /// Drops a whole collection; returns whether it existed.
    async fn drop_collection(&self, id: &CollectionId) -> Result<bool, StoreError>;
}

/// Half-open key window `(after, upto]` over a collection's byte-ordered
/// keyspace. `None` bounds are unbounded on that side.
#[derive(Debug, Clone, Default)]
pub struct KeyRange {
    pub after: Option<Vec<u8>>,
    pub upto: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn all() -> Self { Self::default() }

    pub fn after(key: impl Into<Vec<u8>>) -> Self { Self { after: Some(key.into()), upto: None } }

    pub fn window(after: impl Into<Vec<u8>>, upto: impl Into<Vec<u8>>) -> Self {
        Self { after: Some(after.into()), upto: Some(upto.into()) }
    }

    pub fn upto(key: impl Into<Vec<u8>>) -> Self { Self { after: None, upto: Some(key.into()) } }

    pub fn contains(&self, key: &[u8]) -> bool {
        if let Some(after) = &self.after {
            if key <= after.as_slice() {
                return false;
            }
        }
        if let Some(upto) = &self.upto {
            if key > upto.as_slice() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// An ordered key/value collection.
///
/// Keys sort bytewise; sequence-keyed collections use big-endian u64 keys so
/// key order is assignment order.
#[async_trait]
pub trait StorageCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Insert only if the key is absent; `StoreError::KeyExists` otherwise.
    async fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Atomic compare-and-swap. `old == None` asserts absence, `new == None`
    /// deletes. `StoreError::CasConflict` when the current value differs.
    async fn compare_and_swap(&self, key: &[u8], old: Option<&[u8]>, new: Option<&[u8]>) -> Result<(), StoreError>;

    async fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Appends under the next monotonic u64 sequence key and returns the
    /// assigned sequence number. Concurrent appends never reuse a sequence.
    async fn append(&self, value: &[u8]) -> Result<u64, StoreError>;

    /// The greatest entry, if any.
    async fn last(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError>;

    async fn range(&self, range: KeyRange, direction: Direction) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range_window_is_half_open() {
        let range = KeyRange::window(vec![2u8], vec![5u8]);
        assert!(!range.contains(&[2u8]));
        assert!(range.contains(&[3u8]));
        assert!(range.contains(&[5u8]));
        assert!(!range.contains(&[6u8]));
    }
}
