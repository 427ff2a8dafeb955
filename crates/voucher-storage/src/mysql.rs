use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, trace};
use voucher_core::error::Result;
use voucher_core::{Batch, BatchId, Code, StorageError, UniquenessStore};

/// Width of the `code` column in `ddl/mysql/voucher_codes.sql`.
pub const MAX_CODE_LENGTH: usize = 64;

/// Rows per multi-row statement; keeps bind counts well under MySQL's 65535.
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

/// MySQL implementation of the [`UniquenessStore`] contract.
///
/// Each batch runs in one transaction: a multi-row `INSERT IGNORE` tags the
/// novel codes with the batch id, then a `SELECT` on that batch id reads the
/// accepted subset back. InnoDB holds the primary-key locks until commit, so
/// a concurrent transaction inserting the same code blocks and then sees it
/// as a duplicate. Candidates are deduplicated and inserted in sorted order,
/// so overlapping batches always lock keys in the same order.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn check_width(batch: &Batch) -> Result<()> {
    match batch.candidates().iter().find(|c| c.len() > MAX_CODE_LENGTH) {
        Some(code) => Err(StorageError::InvalidData(format!(
            "code of length {} exceeds column width {}",
            code.len(),
            MAX_CODE_LENGTH
        ))),
        None => Ok(()),
    }
}

/// Distinct candidates in ascending order.
fn sorted_distinct(batch: &Batch) -> Vec<&Code> {
    let mut codes: Vec<&Code> = batch.candidates().iter().collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolClosed => StorageError::Closed,
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StorageError::Unavailable(message)
        }
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl UniquenessStore for MySqlStore {
    async fn reconcile(&self, batch: &Batch) -> Result<Vec<Code>> {
        check_width(batch)?;

        let codes = sorted_distinct(batch);
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let batch_id = batch.id().get();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut accepted = Vec::with_capacity(codes.len());

        for chunk in codes.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut insert =
                QueryBuilder::<MySql>::new("INSERT IGNORE INTO voucher_codes (code, batch_id) ");
            insert.push_values(chunk, |mut row, code| {
                row.push_bind(code.as_str()).push_bind(batch_id);
            });
            let inserted = insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();

            if inserted == 0 {
                trace!(candidates = chunk.len(), "every candidate already issued");
                continue;
            }

            let mut select =
                QueryBuilder::<MySql>::new("SELECT code FROM voucher_codes WHERE batch_id = ");
            select.push_bind(batch_id);
            select.push(" AND code IN (");
            let mut list = select.separated(", ");
            for code in chunk {
                list.push_bind(code.as_str());
            }
            list.push_unseparated(")");

            let rows = select
                .build()
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            if rows.len() as u64 != inserted {
                return Err(StorageError::InvalidData(format!(
                    "batch {} inserted {} codes but reads back {}",
                    batch.id(),
                    inserted,
                    rows.len()
                )));
            }
            for row in rows {
                let code: String = row.try_get("code").map_err(map_sqlx_error)?;
                accepted.push(Code::new_unchecked(code));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(
            batch_id = %batch.id(),
            candidates = batch.len(),
            accepted = accepted.len(),
            "committed batch"
        );

        Ok(accepted)
    }

    async fn lookup(&self, code: &Code) -> Result<Option<BatchId>> {
        let row = sqlx::query(
            r#"
            SELECT batch_id
            FROM voucher_codes
            WHERE code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let batch_id: u64 = row.try_get("batch_id").map_err(map_sqlx_error)?;
        Ok(Some(BatchId::new(batch_id)))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
