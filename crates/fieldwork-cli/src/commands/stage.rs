use std::path::Path;

use serde_json::{Map, Value};

use crate::cli::{PriorityArg, StageOp};
use crate::commands::common::{open_stores, read_payload, read_payload_arg};
use crate::error::CliError;

pub fn run_stage(
    op_type: StageOp,
    data_type: &str,
    resource_id: &str,
    payload: Option<&str>,
    file: Option<&Path>,
    priority: PriorityArg,
    db_path: &Path,
) -> Result<(), CliError> {
    // Deletes carry no snapshot; everything else needs one
    let payload = if op_type == StageOp::Delete {
        read_payload_arg(payload, file)?.unwrap_or(Value::Object(Map::new()))
    } else {
        read_payload(payload, file)?
    };

    let stores = open_stores(db_path)?;
    let operation = stores.queue.enqueue(
        op_type.into(),
        data_type,
        resource_id,
        payload,
        priority.into(),
    )?;

    println!("{}", operation.id);
    Ok(())
}
