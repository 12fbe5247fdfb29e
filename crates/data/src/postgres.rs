//! `PostgreSQL` record sink.
//!
//! Each table holds `(id TEXT PRIMARY KEY, record JSONB, recorded_at TIMESTAMPTZ)`.
//! Rows are append-only: writing an id that already exists keeps the stored
//! record.

use crate::records::validate_table;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use spreadbot_core::RecordSink;
use sqlx::{postgres::PgPoolOptions, PgPool};

fn create_table_sql(table: &str) -> Result<String> {
    let table = validate_table(table)?;
    Ok(format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY,
            record JSONB NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
    ))
}

fn insert_sql(table: &str) -> Result<String> {
    let table = validate_table(table)?;
    Ok(format!(
        r#"
        INSERT INTO "{table}" (id, record)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#
    ))
}

#[derive(Debug, Clone)]
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `database_url`.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates `table` if it does not exist.
    ///
    /// # Errors
    /// Returns an error for an invalid table name or a failed statement.
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        sqlx::query(&create_table_sql(table)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Loads one record by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let table = validate_table(table)?;
        let row: Option<(Value,)> =
            sqlx::query_as(&format!(r#"SELECT record FROM "{table}" WHERE id = $1"#))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn put(&self, table: &str, id: &str, record: Value) -> Result<()> {
        let result = sqlx::query(&insert_sql(table)?)
            .bind(id)
            .bind(&record)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            tracing::warn!(table, id, "record already stored, keeping existing row");
        } else {
            tracing::debug!(table, id, "record inserted");
        }
        Ok(())
    }
}
