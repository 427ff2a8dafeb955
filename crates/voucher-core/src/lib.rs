//! Core types and traits for voucher code issuance.
//!
//! This crate provides the types shared by the generator and the store
//! adapters: the [`Code`] itself, the [`Batch`] it is reconciled in, and the
//! [`UniquenessStore`] contract every backend implements.

pub mod batch;
pub mod code;
pub mod error;
pub mod store;

pub use batch::{Batch, BatchId};
pub use code::{Code, ALPHABET};
pub use error::{CoreError, StorageError};
pub use store::UniquenessStore;
