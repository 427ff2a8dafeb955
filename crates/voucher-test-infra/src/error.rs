use thiserror::Error;

pub type Result<T> = std::result::Result<T, TestInfraError>;

/// Failures while standing up a disposable ledger backend.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("container failed to start: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
    #[error("mysql not reachable after {attempts} attempts: {source}")]
    MySqlUnreachable { attempts: u32, source: sqlx::Error },
    #[error("applying ledger schema failed: {0}")]
    Schema(sqlx::Error),
    #[error("redis connection failed: {0}")]
    Redis(#[from] redis::RedisError),
}
