use std::path::Path;

use chrono::Utc;

use crate::commands::common::{format_relative_time, open_stores};
use crate::error::CliError;

pub fn run_show(
    data_type: &str,
    resource_id: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let stores = open_stores(db_path)?;
    let Some(record) = stores.records.get(data_type, resource_id)? else {
        println!("No cached record for {data_type}/{resource_id}.");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    println!(
        "{}/{}  updated {}",
        record.data_type,
        record.resource_id,
        format_relative_time(record.updated_at, now_ms)
    );
    println!("{}", serde_json::to_string_pretty(&record.payload)?);
    Ok(())
}
