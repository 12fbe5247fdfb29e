//! Storage backends for spread automation.
//!
//! This crate provides:
//! - Secret stores for credentials and the cached session
//! - Record sinks for execution rows (memory, JSON lines, `PostgreSQL`)

pub mod postgres;
pub mod records;
pub mod secrets;

pub use postgres::PgRecordSink;
pub use records::{InMemoryRecordSink, JsonLinesRecordSink, StoredRecord};
pub use secrets::{FileSecretStore, InMemorySecretStore};
