mod cli;
mod length_file;

use crate::cli::{StorageBackendArg, CLI};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voucher_generator::{BatchOrchestrator, GeneratorSettings};
use voucher_storage::{InMemoryStore, MySqlStore, RedisStore, UniquenessStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = CLI::try_parse()?;

    let persisted = match &config.length_file {
        Some(path) => length_file::read(path).await?,
        None => None,
    };
    let settings = GeneratorSettings::builder()
        .initial_code_length(length_file::starting_length(config.code_length, persisted))
        .batch_size(config.batch_size)
        .collision_threshold(config.collision_threshold)
        .build();

    info!(
        count = config.count,
        code_length = settings.initial_code_length,
        batch_size = settings.batch_size,
        collision_threshold = settings.collision_threshold,
        storage_backend = %config.storage,
        "issuing voucher codes"
    );

    match config.storage {
        StorageBackendArg::InMemory => issue(&config, settings, InMemoryStore::new()).await,
        StorageBackendArg::Mysql => {
            let dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlStore::connect(dsn)
                .await
                .context("connecting to mysql")?;
            issue(&config, settings, store).await
        }
        StorageBackendArg::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("redis url is required when storage backend is redis")?;
            let store = RedisStore::connect(url)
                .await
                .context("connecting to redis")?;
            issue(&config, settings, store).await
        }
    }
}

async fn issue<S: UniquenessStore>(
    config: &CLI,
    settings: GeneratorSettings,
    store: S,
) -> Result<()> {
    let mut generator = BatchOrchestrator::new(settings, store)?;
    let mut stdout = std::io::stdout().lock();
    run(
        &mut generator,
        config.count,
        config.length_file.as_deref(),
        &mut stdout,
    )
    .await
}

/// Generates, persists the reached code length, prints, then closes.
///
/// The length file is written before anything else can fail: even a failed
/// run may have grown the length in batches that were already committed.
async fn run<S: UniquenessStore, W: Write>(
    generator: &mut BatchOrchestrator<S>,
    count: usize,
    length_file: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let generated = generator.generate(count).await;
    let final_length = generator.code_length();

    if let Some(path) = length_file {
        length_file::write(path, final_length).await?;
    }

    let codes = match generated {
        Ok(codes) => codes,
        Err(err) => {
            if let Err(close_err) = generator.close().await {
                warn!(error = %close_err, "closing store failed");
            }
            return Err(err.into());
        }
    };

    for code in &codes {
        writeln!(out, "{code}")?;
    }
    out.flush()?;

    generator.close().await.context("closing store")?;

    info!(issued = codes.len(), code_length = final_length, "done");
    Ok(())
}
