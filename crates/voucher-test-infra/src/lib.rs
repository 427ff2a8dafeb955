//! Disposable ledger backends for integration tests.

pub mod error;
pub mod mysql;
pub mod redis;

pub use error::{Result, TestInfraError};
pub use mysql::{LedgerOptions, MySqlLedger};
pub use self::redis::RedisServer;
