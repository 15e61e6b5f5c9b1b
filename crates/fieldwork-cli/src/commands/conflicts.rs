use std::path::Path;

use fieldwork_core::models::{ConflictStatus, ConflictStrategy};
use fieldwork_core::sync::ConflictResolver;
use serde::Serialize;
use serde_json::Value;

use crate::cli::StrategyArg;
use crate::commands::common::{
    conflict_to_item, format_conflict_lines, open_stores, parse_conflict_id, read_payload_arg,
    short_id, ConflictListItem,
};
use crate::error::CliError;

pub fn run_list(limit: usize, all: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let stores = open_stores(db_path)?;
    let conflicts = if all {
        stores.conflicts.list(None, limit)?
    } else {
        stores.conflicts.list(Some(ConflictStatus::Open), limit)?
    };

    if as_json {
        let items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No {}conflicts.", if all { "" } else { "open " });
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConflictDetail {
    id: String,
    resource_id: String,
    data_type: String,
    status: String,
    detected_at: i64,
    fields: Vec<FieldDetail>,
    resolved_payload: Option<Value>,
}

#[derive(Debug, Serialize)]
struct FieldDetail {
    path: String,
    client: Option<Value>,
    server: Option<Value>,
}

pub fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let conflict_id = parse_conflict_id(id)?;
    let stores = open_stores(db_path)?;
    let conflict = stores
        .conflicts
        .get(&conflict_id)?
        .ok_or_else(|| CliError::ConflictNotFound(id.to_string()))?;

    let fields = ConflictResolver::fields(&conflict);

    if as_json {
        let detail = ConflictDetail {
            id: conflict.id.to_string(),
            resource_id: conflict.resource_id.clone(),
            data_type: conflict.data_type.clone(),
            status: conflict.status.to_string(),
            detected_at: conflict.detected_at,
            fields: fields
                .into_iter()
                .map(|field| FieldDetail {
                    path: field.path,
                    client: field.client,
                    server: field.server,
                })
                .collect(),
            resolved_payload: conflict.resolved_payload.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!(
        "{}  {}/{}  {}",
        short_id(&conflict.id.to_string()),
        conflict.data_type,
        conflict.resource_id,
        conflict.status
    );
    for field in fields {
        println!("  {}", field.path);
        println!("    client: {}", render_side(field.client.as_ref()));
        println!("    server: {}", render_side(field.server.as_ref()));
    }
    if let Some(payload) = &conflict.resolved_payload {
        println!("  resolved as: {payload}");
    }
    Ok(())
}

pub fn run_resolve(
    id: &str,
    strategy: Option<StrategyArg>,
    payload: Option<&str>,
    file: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let conflict_id = parse_conflict_id(id)?;
    let stores = open_stores(db_path)?;
    let resolver = stores.resolver();

    let manual = read_payload_arg(payload, file)?;
    let reconciled = match (strategy, manual) {
        (Some(strategy), None) => resolver.resolve(&conflict_id, strategy.into())?,
        (None, Some(payload)) => resolver.resolve_manual(&conflict_id, payload)?,
        // Merge is the default, safest strategy: nothing is dropped
        (None, None) => resolver.resolve(&conflict_id, ConflictStrategy::Merge)?,
        (Some(_), Some(_)) => return Err(CliError::AmbiguousResolution),
    };

    println!("{}", serde_json::to_string_pretty(&reconciled)?);
    Ok(())
}

pub fn run_dismiss(id: &str, db_path: &Path) -> Result<(), CliError> {
    let conflict_id = parse_conflict_id(id)?;
    let stores = open_stores(db_path)?;
    stores.resolver().dismiss(&conflict_id)?;
    println!("{conflict_id}");
    Ok(())
}

fn render_side(value: Option<&Value>) -> String {
    value.map_or_else(|| "(no value)".to_string(), Value::to_string)
}
