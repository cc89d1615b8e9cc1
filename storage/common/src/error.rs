use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key already exists")]
    KeyExists,
    #[error("compare-and-swap conflict")]
    CasConflict,
    #[error("serialization error: {0}")]
    Serialization(bincode::Error),
    #[error("storage error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self { StoreError::Backend(Box::new(err)) }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self { StoreError::Serialization(e) }
}
