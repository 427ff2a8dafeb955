use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::{Arc, LazyLock};
use tracing::debug;
use voucher_core::error::Result;
use voucher_core::{Batch, BatchId, Code, StorageError, UniquenessStore};

/// `ARGV[1]` is the batch id, the rest are candidates. Redis runs scripts
/// without interleaving other commands, so the whole batch is atomic.
static RECONCILE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
        local accepted = {}
        for i = 2, #ARGV do
          if redis.call('HSETNX', KEYS[1], ARGV[i], ARGV[1]) == 1 then
            accepted[#accepted + 1] = ARGV[i]
          end
        end
        return accepted
        "#,
    )
});

/// A Redis-backed [`UniquenessStore`].
///
/// The ledger is a single hash mapping each code to the id of the batch
/// that reserved it. Clones share one connection slot; closing any clone
/// drops the connection for all of them.
#[derive(Debug, Clone)]
pub struct RedisStore {
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
    key_prefix: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> StorageError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        StorageError::Timeout(message)
    } else if err.is_io_error() {
        StorageError::Unavailable(message)
    } else {
        StorageError::Operation(message)
    }
}

impl RedisStore {
    /// Creates a new Redis store using the default `vc:` key prefix.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self::with_prefix(conn, "vc:")
    }

    /// Creates a new Redis store with a custom key prefix.
    pub fn with_prefix(conn: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a multiplexed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| map_redis_error("open client", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("connect", e))?;
        Ok(Self::new(conn))
    }

    /// A handle onto the shared connection, or `Closed` once closed.
    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn.lock().clone().ok_or(StorageError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    fn ledger_key(&self) -> String {
        format!("{}ledger", self.key_prefix)
    }
}

#[async_trait]
impl UniquenessStore for RedisStore {
    async fn reconcile(&self, batch: &Batch) -> Result<Vec<Code>> {
        let mut conn = self.connection()?;

        let mut invocation = RECONCILE_SCRIPT.key(self.ledger_key());
        invocation.arg(batch.id().get());
        for code in batch.candidates() {
            invocation.arg(code.as_str());
        }

        let accepted: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("reconcile", e))?;

        debug!(
            batch_id = %batch.id(),
            candidates = batch.len(),
            accepted = accepted.len(),
            "reconciled batch in redis"
        );

        Ok(accepted.into_iter().map(Code::new_unchecked).collect())
    }

    async fn lookup(&self, code: &Code) -> Result<Option<BatchId>> {
        let mut conn = self.connection()?;
        let batch_id: Option<u64> = conn
            .hget(self.ledger_key(), code.as_str())
            .await
            .map_err(|e| map_redis_error("lookup", e))?;
        Ok(batch_id.map(BatchId::new))
    }

    async fn close(&self) -> Result<()> {
        if self.conn.lock().take().is_some() {
            debug!(key_prefix = %self.key_prefix, "closed redis connection");
        }
        Ok(())
    }
}
