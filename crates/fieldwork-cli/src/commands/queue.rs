use std::path::Path;

use fieldwork_core::models::OperationStatus;

use crate::cli::StatusArg;
use crate::commands::common::{
    format_operation_lines, open_stores, operation_to_item, parse_operation_id, OperationListItem,
};
use crate::error::CliError;

pub fn run_list(
    status: Option<StatusArg>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let stores = open_stores(db_path)?;
    let operations = stores.queue.list(status.map(OperationStatus::from), limit)?;

    if as_json {
        let items = operations
            .iter()
            .map(operation_to_item)
            .collect::<Vec<OperationListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_operation_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_stats(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let stores = open_stores(db_path)?;
    let counts = stores.queue.counts()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("pending     {}", counts.pending);
    println!("in flight   {}", counts.in_flight);
    println!("failed      {}", counts.failed);
    println!("conflicted  {}", counts.conflicted);
    println!("total       {}", counts.total());
    Ok(())
}

pub fn run_retry(id: &str, db_path: &Path) -> Result<(), CliError> {
    let operation_id = parse_operation_id(id)?;
    let stores = open_stores(db_path)?;
    let operation = stores.queue.requeue_failed(&operation_id)?;
    println!("{}", operation.id);
    Ok(())
}

pub fn run_cancel(id: &str, db_path: &Path) -> Result<(), CliError> {
    let operation_id = parse_operation_id(id)?;
    let stores = open_stores(db_path)?;

    let operation = stores
        .queue
        .get(&operation_id)?
        .ok_or_else(|| CliError::OperationNotFound(id.to_string()))?;

    // Only records the server has never seen are safe to withdraw
    if operation.status != OperationStatus::Pending {
        return Err(CliError::NotCancellable(
            operation.id.to_string(),
            operation.status.to_string(),
        ));
    }

    stores.queue.ack(&operation_id)?;
    println!("{}", operation.id);
    Ok(())
}
