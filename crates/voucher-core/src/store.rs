use crate::batch::{Batch, BatchId};
use crate::code::Code;
use crate::error::Result;
use async_trait::async_trait;

/// A durable ledger of every code ever accepted.
///
/// Implementations must make [`reconcile`](UniquenessStore::reconcile)
/// atomic: the membership check and the insert of the novel codes happen as
/// one transaction, so two concurrent calls (from this process or any other)
/// can never both accept the same code.
#[async_trait]
pub trait UniquenessStore: Send + Sync + 'static {
    /// Records the novel candidates of `batch` and returns exactly those.
    ///
    /// A code already in the ledger is never returned again, and a candidate
    /// repeated within the batch is returned at most once. Order of the
    /// returned codes is unspecified.
    async fn reconcile(&self, batch: &Batch) -> Result<Vec<Code>>;

    /// Returns the batch that reserved `code`, or `None` if it was never issued.
    async fn lookup(&self, code: &Code) -> Result<Option<BatchId>>;

    /// Releases the connection resources held by the store.
    ///
    /// Calling this more than once is not an error.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
