use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;
use voucher_core::error::Result;
use voucher_core::{Batch, BatchId, Code, StorageError, UniquenessStore};

/// In-memory implementation of the [`UniquenessStore`] trait.
///
/// A single mutex guards the whole ledger and is held for the full batch,
/// which is what makes `reconcile` atomic. Clones share the same ledger, so
/// several generators can be pointed at one store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    ledger: Arc<Mutex<HashMap<Code, BatchId>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(HashMap::with_capacity(capacity))),
            closed: Arc::default(),
        }
    }

    /// Number of codes ever accepted.
    pub fn len(&self) -> usize {
        self.ledger.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl UniquenessStore for InMemoryStore {
    async fn reconcile(&self, batch: &Batch) -> Result<Vec<Code>> {
        self.ensure_open()?;

        let mut ledger = self.ledger.lock();
        let mut accepted = Vec::with_capacity(batch.len());

        for code in batch.candidates() {
            if ledger.contains_key(code) {
                continue;
            }
            ledger.insert(code.clone(), batch.id());
            accepted.push(code.clone());
        }

        trace!(
            batch_id = %batch.id(),
            candidates = batch.len(),
            accepted = accepted.len(),
            "reconciled batch in memory"
        );

        Ok(accepted)
    }

    async fn lookup(&self, code: &Code) -> Result<Option<BatchId>> {
        self.ensure_open()?;
        Ok(self.ledger.lock().get(code).copied())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Code {
        Code::new_unchecked(s)
    }

    fn batch(id: u64, codes: &[&str]) -> Batch {
        Batch::new(BatchId::new(id), codes.iter().map(|c| code(c)).collect())
    }

    #[tokio::test]
    async fn accepts_novel_codes() {
        let store = InMemoryStore::new();

        let accepted = store.reconcile(&batch(1, &["abc", "def"])).await.unwrap();

        assert_eq!(accepted, vec![code("abc"), code("def")]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rejects_previously_accepted_codes() {
        let store = InMemoryStore::new();
        store.reconcile(&batch(1, &["abc"])).await.unwrap();

        let accepted = store.reconcile(&batch(2, &["abc", "xyz"])).await.unwrap();

        assert_eq!(accepted, vec![code("xyz")]);
        assert_eq!(store.lookup(&code("abc")).await.unwrap(), Some(BatchId::new(1)));
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_are_accepted_once() {
        let store = InMemoryStore::new();

        let accepted = store
            .reconcile(&batch(1, &["abc", "abc", "def", "abc"]))
            .await
            .unwrap();

        assert_eq!(accepted, vec![code("abc"), code("def")]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn codes_are_case_sensitive() {
        let store = InMemoryStore::new();

        let accepted = store.reconcile(&batch(1, &["abc", "ABC"])).await.unwrap();

        assert_eq!(accepted.len(), 2);
    }

    #[tokio::test]
    async fn lookup_unknown_code() {
        let store = InMemoryStore::new();
        assert_eq!(store.lookup(&code("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_the_ledger() {
        let store = InMemoryStore::new();
        let other = store.clone();

        store.reconcile(&batch(1, &["abc"])).await.unwrap();
        let accepted = other.reconcile(&batch(2, &["abc"])).await.unwrap();

        assert!(accepted.is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_reconcile() {
        let store = InMemoryStore::new();

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(store.is_closed());
        let err = store.reconcile(&batch(1, &["abc"])).await.unwrap_err();
        assert_eq!(err, StorageError::Closed);
    }

    #[tokio::test]
    async fn concurrent_batches_never_share_a_code() {
        let store = InMemoryStore::new();
        let mut handles = vec![];

        for i in 0..8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let codes: Vec<Code> = (0..50).map(|n| code(&format!("c{n}"))).collect();
                store
                    .reconcile(&Batch::new(BatchId::new(i), codes))
                    .await
                    .unwrap()
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap().len();
        }

        assert_eq!(total, 50);
        assert_eq!(store.len(), 50);
    }
}
