use anyhow::{Context, Result};
use std::path::Path;

/// Reads the code length stored by a previous run, if any.
pub async fn read(path: &Path) -> Result<Option<usize>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", path.display()));
        }
    };

    let length = contents
        .trim()
        .parse()
        .with_context(|| format!("{} does not hold a code length", path.display()))?;
    Ok(Some(length))
}

pub async fn write(path: &Path, code_length: usize) -> Result<()> {
    tokio::fs::write(path, format!("{code_length}\n"))
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Length to start from: never shorter than what a previous run reached.
pub fn starting_length(requested: usize, persisted: Option<usize>) -> usize {
    persisted.map_or(requested, |persisted| persisted.max(requested))
}
