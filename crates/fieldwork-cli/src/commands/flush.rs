use std::path::Path;
use std::sync::Arc;

use fieldwork_core::config::ServerConfig;
use fieldwork_core::sync::{DriverConfig, HttpApiClient, SyncDriver};

use crate::commands::common::open_stores;
use crate::error::CliError;

pub async fn run_flush(
    workers: Option<usize>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let server = ServerConfig::from_env().ok_or(CliError::SyncNotConfigured)?;

    let stores = open_stores(db_path)?;
    let mut config = DriverConfig::default();
    if let Some(workers) = workers {
        config = config.with_workers(workers.max(1));
    }

    let api = HttpApiClient::new(&server, config.request_timeout)?;
    let driver = SyncDriver::new(
        stores.queue.clone(),
        stores.detector(),
        stores.records.clone(),
        Arc::new(api),
        config,
    );

    let stats = driver.run_until_idle().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!(
        "Flushed: {} delivered, {} retried, {} failed, {} conflicted",
        stats.delivered, stats.retried, stats.failed, stats.conflicted
    );

    let remaining = stores.queue.counts()?;
    if remaining.pending > 0 {
        println!("{} operation(s) still pending (backing off)", remaining.pending);
    }
    if remaining.failed > 0 {
        println!(
            "{} failed operation(s) need attention; see `fieldwork queue list --status failed`",
            remaining.failed
        );
    }
    if remaining.conflicted > 0 {
        println!(
            "{} conflicted operation(s); see `fieldwork conflicts list`",
            remaining.conflicted
        );
    }
    Ok(())
}
