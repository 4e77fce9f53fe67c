use std::path::Path;

use anyhow::Error;
use uuid::Uuid;

use crate::{
    config::Config,
    error::ToUserError,
    flow::ImportFlow,
    pipeline::ImportRequest,
    record::RawRow,
    schema::FieldSchema,
};

/// Reads an upload as written by the spreadsheet parser: a JSON array of row
/// objects, plus the event's field configuration when the event has one.
pub async fn load_request(
    rows_path: impl AsRef<Path>,
    schema_path: Option<&Path>,
    event_id: &str,
    flow: ImportFlow,
) -> Result<ImportRequest, Error> {
    let rows_path = rows_path.as_ref();
    let raw_rows = tokio::fs::read(rows_path).await.user_error(format!(
        "Could not read the uploaded rows from {}",
        rows_path.display()
    ))?;
    let rows: Vec<RawRow> = serde_json::from_slice(&raw_rows)
        .user_error("The uploaded rows are not a JSON array of objects")?;

    let schema = match schema_path {
        Some(path) => {
            let raw = tokio::fs::read(path).await.user_error(format!(
                "Could not read the event field configuration from {}",
                path.display()
            ))?;
            serde_json::from_slice::<FieldSchema>(&raw)
                .user_error("The event field configuration is not valid")?
        }
        None => FieldSchema::Classic,
    };

    Ok(ImportRequest {
        upload_id: Uuid::now_v7().to_string(),
        event_id: event_id.to_string(),
        flow,
        schema,
        rows,
    })
}

pub async fn load_from_config(config: &Config) -> Result<ImportRequest, Error> {
    load_request(
        &config.rows_path,
        config.schema_path.as_deref().map(Path::new),
        &config.event_id,
        config.import_flow,
    )
    .await
}
