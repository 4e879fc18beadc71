pub mod bus;
pub mod repository;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
