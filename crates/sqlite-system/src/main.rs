use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use sqlmate::configuration::DATABASE_ENV;

mod server;
mod tools;

use tools::SqliteTools;

/// The database comes from the environment only. Arguments are forwarded from
/// the assistant's configuration and never name the database.
fn database_path() -> PathBuf {
    std::env::var(DATABASE_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| "./database.db".to_string())
        .into()
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let extra: Vec<String> = std::env::args().skip(1).collect();
    if !extra.is_empty() {
        tracing::warn!(args = ?extra, "ignoring command line arguments");
    }

    let path = database_path();
    let tools = SqliteTools::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    tracing::info!(database = %path.display(), "sqlite tool provider ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if let Some(mut response) = server::handle_line(&tools, &line) {
            response.push('\n');
            stdout.write_all(response.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
