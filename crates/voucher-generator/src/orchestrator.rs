use crate::draw::RandomDraw;
use crate::error::{GeneratorError, Result};
use crate::length::LengthController;
use crate::settings::GeneratorSettings;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};
use voucher_core::{Batch, Code, UniquenessStore};

/// Drives the draw → reconcile → adapt loop against a [`UniquenessStore`].
///
/// One orchestrator owns its random generator, its length controller and its
/// store handle. Batches run strictly one after another; separate
/// orchestrators sharing a store rely on the store's atomicity alone.
///
/// Codes returned by a single [`generate`](Self::generate) call can differ in
/// length when the length grew part-way through. Anything storing them in a
/// fixed-width column must size it for the final [`code_length`](Self::code_length).
#[derive(Debug)]
pub struct BatchOrchestrator<S, R = StdRng> {
    settings: GeneratorSettings,
    draw: RandomDraw<R>,
    length: LengthController,
    store: S,
    closed: bool,
}

impl<S: UniquenessStore> BatchOrchestrator<S, StdRng> {
    /// Creates an orchestrator whose random generator is seeded from OS entropy.
    ///
    /// Fails with [`GeneratorError::InvalidConfig`] before touching the store
    /// if `settings` are invalid.
    pub fn new(settings: GeneratorSettings, store: S) -> Result<Self> {
        Self::with_draw(settings, store, RandomDraw::from_entropy())
    }
}

impl<S: UniquenessStore, R: Rng> BatchOrchestrator<S, R> {
    /// Creates an orchestrator drawing from the supplied generator.
    pub fn with_draw(settings: GeneratorSettings, store: S, draw: RandomDraw<R>) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            length: LengthController::new(
                settings.initial_code_length,
                settings.collision_threshold,
            ),
            settings,
            draw,
            store,
            closed: false,
        })
    }

    /// Current code length. Persist this after a run and feed it back as the
    /// next run's initial length.
    pub fn code_length(&self) -> usize {
        self.length.code_length()
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issues exactly `number_of_codes` new codes.
    ///
    /// Store failures abort the call and are returned as-is. Batches committed
    /// before the failure stay reserved in the store and are not returned.
    pub async fn generate(&mut self, number_of_codes: usize) -> Result<Vec<Code>> {
        if self.closed {
            return Err(GeneratorError::Closed);
        }

        let mut issued = Vec::with_capacity(number_of_codes.min(self.settings.batch_size));

        while issued.len() < number_of_codes {
            let size = self.settings.batch_size.min(number_of_codes - issued.len());
            let code_length = self.length.code_length();

            let id = self.draw.batch_id();
            let candidates = self.draw.candidates(code_length, size).collect();
            let batch = Batch::new(id, candidates);

            let accepted = self.store.reconcile(&batch).await?;
            let accepted_count = accepted.len().min(size);
            issued.extend(accepted.into_iter().take(accepted_count));

            debug!(
                batch_id = %id,
                code_length,
                size,
                accepted = accepted_count,
                "reconciled batch"
            );

            if self.length.observe(size, accepted_count) {
                info!(
                    batch_id = %id,
                    collisions = size - accepted_count,
                    size,
                    code_length = self.length.code_length(),
                    "collision threshold exceeded, growing code length"
                );
            }
        }

        Ok(issued)
    }

    /// Releases the store handle.
    ///
    /// Once the store has closed successfully, later calls return `Ok(())`
    /// without reaching it. A failed close can be retried.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.store.close().await?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use voucher_core::error::Result as StoreResult;
    use voucher_core::{BatchId, StorageError};
    use voucher_storage::InMemoryStore;

    /// Records the size and code length of every batch it forwards.
    #[derive(Debug, Clone, Default)]
    struct RecordingStore {
        inner: InMemoryStore,
        batches: Arc<Mutex<Vec<(usize, usize)>>>,
        closes: Arc<AtomicUsize>,
    }

    impl RecordingStore {
        fn calls(&self) -> usize {
            self.batches.lock().unwrap().len()
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(|(size, _)| *size).collect()
        }

        fn batch_lengths(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(|(_, len)| *len).collect()
        }
    }

    #[async_trait]
    impl UniquenessStore for RecordingStore {
        async fn reconcile(&self, batch: &Batch) -> StoreResult<Vec<Code>> {
            let code_length = batch.candidates().first().map_or(0, Code::len);
            self.batches.lock().unwrap().push((batch.len(), code_length));
            self.inner.reconcile(batch).await
        }

        async fn lookup(&self, code: &Code) -> StoreResult<Option<BatchId>> {
            self.inner.lookup(code).await
        }

        async fn close(&self) -> StoreResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close().await
        }
    }

    /// Rejects 60% (rounded down) of every batch.
    #[derive(Debug, Clone, Default)]
    struct RejectingStore {
        recorder: RecordingStore,
    }

    #[async_trait]
    impl UniquenessStore for RejectingStore {
        async fn reconcile(&self, batch: &Batch) -> StoreResult<Vec<Code>> {
            let keep = batch.len() - batch.len() * 3 / 5;
            let trimmed = Batch::new(batch.id(), batch.candidates()[..keep].to_vec());
            let mut accepted = self.recorder.reconcile(&trimmed).await?;
            accepted.truncate(keep);
            Ok(accepted)
        }

        async fn lookup(&self, code: &Code) -> StoreResult<Option<BatchId>> {
            self.recorder.lookup(code).await
        }
    }

    /// Succeeds `healthy_calls` times, then reports the backend unavailable.
    #[derive(Debug, Clone)]
    struct FailingStore {
        inner: InMemoryStore,
        healthy_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UniquenessStore for FailingStore {
        async fn reconcile(&self, batch: &Batch) -> StoreResult<Vec<Code>> {
            let remaining = self.healthy_calls.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StorageError::Unavailable("connection reset".to_string()));
            }
            self.healthy_calls.store(remaining - 1, Ordering::SeqCst);
            self.inner.reconcile(batch).await
        }

        async fn lookup(&self, code: &Code) -> StoreResult<Option<BatchId>> {
            self.inner.lookup(code).await
        }
    }

    /// Fails the first `failures` close attempts.
    #[derive(Debug, Clone)]
    struct StubbornStore {
        inner: InMemoryStore,
        failures: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl UniquenessStore for StubbornStore {
        async fn reconcile(&self, batch: &Batch) -> StoreResult<Vec<Code>> {
            self.inner.reconcile(batch).await
        }

        async fn lookup(&self, code: &Code) -> StoreResult<Option<BatchId>> {
            self.inner.lookup(code).await
        }

        async fn close(&self) -> StoreResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Timeout("close timed out".to_string()));
            }
            self.inner.close().await
        }
    }

    fn settings(length: usize, batch_size: usize, threshold: f64) -> GeneratorSettings {
        GeneratorSettings::builder()
            .initial_code_length(length)
            .batch_size(batch_size)
            .collision_threshold(threshold)
            .build()
    }

    fn orchestrator<S: UniquenessStore>(
        settings: GeneratorSettings,
        store: S,
    ) -> BatchOrchestrator<S, StdRng> {
        let draw = RandomDraw::with_rng(StdRng::seed_from_u64(42));
        BatchOrchestrator::with_draw(settings, store, draw).unwrap()
    }

    fn assert_distinct(codes: &[Code]) {
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[tokio::test]
    async fn two_full_batches_without_collisions() {
        let store = RecordingStore::default();
        let mut generator = orchestrator(settings(8, 5, 0.5), store.clone());

        let codes = generator.generate(10).await.unwrap();

        assert_eq!(codes.len(), 10);
        assert_distinct(&codes);
        assert_eq!(store.batch_sizes(), vec![5, 5]);
        assert_eq!(generator.code_length(), 8);
        assert!(codes.iter().all(|c| c.len() == 8));
    }

    #[tokio::test]
    async fn heavy_rejection_grows_length_for_next_batch() {
        let store = RejectingStore::default();
        let mut generator = orchestrator(settings(6, 10, 0.5), store.clone());

        let codes = generator.generate(10).await.unwrap();

        assert_eq!(codes.len(), 10);
        assert_distinct(&codes);
        // 10 → 4 accepted (ratio 0.6, grows); 6 → 3 (0.5, holds); 3 → 2; 1 → 1.
        assert_eq!(store.recorder.batch_sizes(), vec![4, 3, 2, 1]);
        assert_eq!(store.recorder.batch_lengths(), vec![6, 7, 7, 7]);
        assert_eq!(generator.code_length(), 7);
    }

    #[tokio::test]
    async fn zero_codes_never_touches_the_store() {
        let store = RecordingStore::default();
        let mut generator = orchestrator(settings(6, 5, 0.5), store.clone());

        let codes = generator.generate(0).await.unwrap();

        assert!(codes.is_empty());
        assert_eq!(store.calls(), 0);
        assert_eq!(generator.code_length(), 6);
    }

    #[tokio::test]
    async fn threshold_of_one_fails_before_any_store_call() {
        let store = RecordingStore::default();

        let result = BatchOrchestrator::new(settings(6, 5, 1.0), store.clone());

        assert!(matches!(result, Err(GeneratorError::InvalidConfig(_))));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn last_batch_is_capped_to_remaining_need() {
        let store = RecordingStore::default();
        let mut generator = orchestrator(settings(8, 4, 0.5), store.clone());

        let codes = generator.generate(10).await.unwrap();

        assert_eq!(codes.len(), 10);
        assert_eq!(store.batch_sizes(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn saturated_length_grows_until_demand_is_met() {
        let store = RecordingStore::default();
        // Length 1 only has 62 codes.
        let mut generator = orchestrator(settings(1, 50, 0.01), store.clone());

        let codes = generator.generate(500).await.unwrap();

        assert_eq!(codes.len(), 500);
        assert_distinct(&codes);
        assert!(generator.code_length() > 1);

        let lengths = store.batch_lengths();
        assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn sequential_runs_never_reissue_codes() {
        let store = InMemoryStore::new();

        let mut first = orchestrator(settings(2, 100, 0.05), store.clone());
        let first_codes = first.generate(1_000).await.unwrap();
        let carried_length = first.code_length();

        let mut second = BatchOrchestrator::new(settings(carried_length, 100, 0.05), store.clone())
            .unwrap();
        let second_codes = second.generate(1_000).await.unwrap();

        assert!(second.code_length() >= carried_length);

        let mut all = first_codes;
        all.extend(second_codes);
        assert_eq!(all.len(), 2_000);
        assert_distinct(&all);
        assert_eq!(store.len(), 2_000);
    }

    #[tokio::test]
    async fn concurrent_generators_share_a_store_safely() {
        let store = InMemoryStore::new();
        let mut handles = vec![];

        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut generator = BatchOrchestrator::new(settings(2, 25, 0.2), store).unwrap();
                generator.generate(300).await.unwrap()
            }));
        }

        let mut all = vec![];
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        assert_eq!(all.len(), 1_200);
        assert_distinct(&all);
    }

    #[tokio::test]
    async fn returned_codes_are_recorded_in_the_store() {
        let store = InMemoryStore::new();
        let mut generator = orchestrator(settings(6, 10, 0.5), store.clone());

        let codes = generator.generate(25).await.unwrap();

        for code in &codes {
            assert!(store.lookup(code).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn store_failure_aborts_and_keeps_committed_batches() {
        let inner = InMemoryStore::new();
        let store = FailingStore {
            inner: inner.clone(),
            healthy_calls: Arc::new(AtomicUsize::new(1)),
        };
        let mut generator = orchestrator(settings(8, 5, 0.5), store);

        let err = generator.generate(20).await.unwrap_err();

        assert_eq!(
            err,
            GeneratorError::Storage(StorageError::Unavailable("connection reset".to_string()))
        );
        assert_eq!(inner.len(), 5);
        assert_eq!(generator.code_length(), 8);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = RecordingStore::default();
        let mut generator = orchestrator(settings(6, 5, 0.5), store.clone());

        generator.close().await.unwrap();
        generator.close().await.unwrap();

        assert_eq!(store.closes.load(Ordering::SeqCst), 1);
        assert_eq!(generator.generate(1).await.unwrap_err(), GeneratorError::Closed);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn failed_close_is_retried() {
        let store = StubbornStore {
            inner: InMemoryStore::new(),
            failures: Arc::new(AtomicUsize::new(1)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let mut generator = orchestrator(settings(6, 5, 0.5), store.clone());

        assert!(generator.close().await.is_err());
        assert_eq!(generator.generate(2).await.unwrap().len(), 2);

        generator.close().await.unwrap();
        generator.close().await.unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert!(store.inner.is_closed());
    }

    #[tokio::test]
    async fn huge_request_does_not_reserve_up_front() {
        let store = FailingStore {
            inner: InMemoryStore::new(),
            healthy_calls: Arc::new(AtomicUsize::new(1)),
        };
        let mut generator = orchestrator(settings(8, 5, 0.5), store);

        // Would abort on allocation if the whole request were reserved.
        let err = generator.generate(usize::MAX).await.unwrap_err();

        assert!(matches!(err, GeneratorError::Storage(_)));
    }
}
