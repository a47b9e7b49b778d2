//! LanceDB connection and table housekeeping.
use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;
use tracing::info;

use kidsafe_core::error::Error;

use crate::schema::{build_arrow_schema, vector_dim};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.contains(&name.to_string()))
}

/// Open `name` empty and ready for a fresh build, creating it when missing.
///
/// Existing rows are deleted; an existing table with a different vector
/// width is rejected rather than silently dropped.
pub async fn reset_table(conn: &Connection, name: &str, dim: i32) -> Result<Table> {
    if table_exists(conn, name).await? {
        let table = conn.open_table(name).execute().await?;
        let existing = vector_dim(&*table.schema().await?);
        if existing != Some(dim) {
            return Err(Error::InvalidConfig(format!("LanceDB table '{name}' holds {existing:?}-dim vectors, embedder produces {dim}; choose another vector.table")).into());
        }
        table.delete("true").await?;
        info!("Cleared LanceDB table {}", name);
        return Ok(table);
    }
    let schema = build_arrow_schema(dim);
    let iter = RecordBatchIterator::new(vec![].into_iter(), Arc::clone(&schema));
    let table = conn.create_table(name, Box::new(iter)).execute().await?;
    info!("Created LanceDB table {} ({} dims)", name, dim);
    Ok(table)
}
