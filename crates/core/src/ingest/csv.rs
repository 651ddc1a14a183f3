use crate::features::preprocess::ID_COLUMN;
use anyhow::{Context, Result};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Reader options shared by files and in-memory extracts: header row, schema inferred from
/// every row, empty cells read as missing, `id` always text.
fn read_options() -> CsvReadOptions {
    let mut overwrite = Schema::default();
    overwrite.with_column(ID_COLUMN.into(), DataType::String);

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_schema_overwrite(Some(Arc::new(overwrite)))
}

/// Parses a headered CSV extract held in memory.
pub fn read_table(data: &[u8]) -> Result<DataFrame> {
    read_options()
        .into_reader_with_file_handle(Cursor::new(data.to_vec()))
        .finish()
        .context("failed to parse CSV extract")
}

pub fn load_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let df = read_options()
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("failed to open {}", path.display()))?
        .finish()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "loaded table"
    );
    Ok(df)
}
