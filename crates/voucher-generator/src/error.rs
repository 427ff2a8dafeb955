use thiserror::Error;
use voucher_core::StorageError;

pub type Result<T> = std::result::Result<T, GeneratorError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("generator has been closed")]
    Closed,
}
