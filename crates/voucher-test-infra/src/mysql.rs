use crate::{Result, TestInfraError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const DATABASE: &str = "voucher";
const USER: &str = "voucher";
const PASSWORD: &str = "voucher";

/// How a [`MySqlLedger`] waits for the server to accept connections.
#[derive(Debug, Clone, TypedBuilder)]
pub struct LedgerOptions {
    #[builder(default = 20)]
    connect_attempts: u32,
    #[builder(default = Duration::from_millis(500))]
    retry_delay: Duration,
    #[builder(default = 5)]
    max_connections: u32,
}

/// A throwaway MySQL server with the ledger schema already applied.
///
/// The container is stopped when the ledger is dropped.
pub struct MySqlLedger {
    _container: ContainerAsync<GenericImage>,
    pool: MySqlPool,
}

impl MySqlLedger {
    /// Starts MySQL, waits for it, and runs `schema` (a single DDL statement).
    pub async fn start(schema: &str) -> Result<Self> {
        Self::start_with(schema, LedgerOptions::builder().build()).await
    }

    pub async fn start_with(schema: &str, options: LedgerOptions) -> Result<Self> {
        let container = GenericImage::new("mysql", "8.4")
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", DATABASE)
            .with_env_var("MYSQL_USER", USER)
            .with_env_var("MYSQL_PASSWORD", PASSWORD)
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        let url = format!(
            "mysql://{USER}:{PASSWORD}@{}:{}/{DATABASE}",
            container.get_host().await?,
            container.get_host_port_ipv4(3306).await?
        );
        let pool = connect(&url, &options).await?;

        sqlx::query(schema)
            .execute(&pool)
            .await
            .map_err(TestInfraError::Schema)?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    /// Pool connected to the ledger database. Clones share connections.
    pub fn pool(&self) -> MySqlPool {
        self.pool.clone()
    }
}

// The entrypoint restarts mysqld once after initialisation, so the first
// "ready" log line can precede a short window of refused connections.
async fn connect(url: &str, options: &LedgerOptions) -> Result<MySqlPool> {
    let mut attempt = 1;
    loop {
        match MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .connect(url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(source) if attempt >= options.connect_attempts => {
                return Err(TestInfraError::MySqlUnreachable {
                    attempts: attempt,
                    source,
                });
            }
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(options.retry_delay).await;
            }
        }
    }
}
