//! Append-only record sinks for execution rows.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use spreadbot_core::RecordSink;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Table names end up in file names and SQL, so they are kept to identifier
/// characters.
pub(crate) fn validate_table(table: &str) -> Result<&str> {
    if table.is_empty() || table.len() > 63 {
        bail!("table name must be 1-63 characters: {table:?}");
    }
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("table name must contain only alphanumeric or underscore: {table:?}");
    }
    Ok(table)
}

/// Row stored by a sink, keyed by its table and id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub table: String,
    pub id: String,
    pub record: Value,
}

/// Keeps rows in memory; a later write with an existing id is ignored.
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    rows: Mutex<Vec<StoredRecord>>,
}

impl InMemoryRecordSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row in insertion order.
    pub async fn rows(&self) -> Vec<StoredRecord> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn put(&self, table: &str, id: &str, record: Value) -> Result<()> {
        validate_table(table)?;
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|r| r.table == table && r.id == id) {
            tracing::warn!(table, id, "record already stored, keeping existing row");
            return Ok(());
        }
        rows.push(StoredRecord {
            table: table.to_string(),
            id: id.to_string(),
            record,
        });
        Ok(())
    }
}

/// One `<table>.jsonl` file per table, one JSON object per line.
///
/// The record id is written as the `id` field of each line.
#[derive(Debug)]
pub struct JsonLinesRecordSink {
    dir: PathBuf,
    /// Serializes appends so lines from concurrent writers never interleave.
    write_lock: Mutex<()>,
}

impl JsonLinesRecordSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, table: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.jsonl", validate_table(table)?)))
    }

    /// Reads every row of `table`; a missing file is an empty table.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or a line is not JSON.
    pub async fn read_table(&self, table: &str) -> Result<Vec<Value>> {
        let path = self.path_for(table)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Malformed line {} in {}", n + 1, path.display()))
            })
            .collect()
    }
}

#[async_trait]
impl RecordSink for JsonLinesRecordSink {
    async fn put(&self, table: &str, id: &str, record: Value) -> Result<()> {
        let path = self.path_for(table)?;

        let line = match record {
            Value::Object(mut fields) => {
                fields.insert("id".to_string(), Value::String(id.to_string()));
                Value::Object(fields)
            }
            other => serde_json::json!({ "id": id, "record": other }),
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create records dir {}", self.dir.display()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::debug!(table, id, "record appended");
        Ok(())
    }
}
