pub mod codec;
mod error;
mod traits;

pub use error::StoreError;
pub use traits::{CollectionId, Direction, KeyRange, StorageCollection, StorageEngine};
