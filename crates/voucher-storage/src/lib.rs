//! Ledger backends implementing [`UniquenessStore`].

pub mod memory;
pub mod mysql;
pub mod redis;

pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use self::redis::RedisStore;
pub use voucher_core::error::Result;
pub use voucher_core::{Batch, BatchId, Code, StorageError, UniquenessStore};
