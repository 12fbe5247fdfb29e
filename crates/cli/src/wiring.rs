//! Builds runtime collaborators from [`AppConfig`].

use anyhow::{Context, Result};
use spreadbot_core::{AppConfig, RecordSink, SecretStore, StorageBackend};
use spreadbot_data::{
    FileSecretStore, InMemoryRecordSink, InMemorySecretStore, JsonLinesRecordSink, PgRecordSink,
};
use spreadbot_tastytrade::{
    CredentialStore, SessionManager, TastytradeClient, TastytradeClientConfig,
};
use std::num::NonZeroU32;
use std::sync::Arc;

pub fn client(config: &AppConfig) -> Result<TastytradeClient> {
    let rps = NonZeroU32::new(config.tastytrade.requests_per_second)
        .context("tastytrade.requests_per_second must be positive")?;
    let client = TastytradeClient::new(
        TastytradeClientConfig::default()
            .with_base_url(config.tastytrade.api_url.clone())
            .with_rate_limit(rps)
            .with_timeout_secs(config.tastytrade.timeout_secs),
    )?;
    Ok(client)
}

/// Secrets live on disk except for the memory backend.
pub fn secret_store(config: &AppConfig) -> Arc<dyn SecretStore> {
    match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemorySecretStore::new()),
        StorageBackend::File | StorageBackend::Postgres => {
            Arc::new(FileSecretStore::new(&config.storage.secrets_dir))
        }
    }
}

/// Sink for execution records.
///
/// # Errors
/// Returns an error if the Postgres backend is selected without a
/// `database_url`, or the database cannot be reached.
pub async fn record_sink(config: &AppConfig) -> Result<Arc<dyn RecordSink>> {
    let storage = &config.storage;
    let sink: Arc<dyn RecordSink> = match storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryRecordSink::new()),
        StorageBackend::File => Arc::new(JsonLinesRecordSink::new(&storage.records_dir)),
        StorageBackend::Postgres => {
            let url = storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let sink = PgRecordSink::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            sink.ensure_table(&storage.executions_table).await?;
            Arc::new(sink)
        }
    };
    Ok(sink)
}

/// Connects a session, reusing the cached token when it still validates.
pub async fn session(config: &AppConfig) -> Result<SessionManager> {
    let store = CredentialStore::new(secret_store(config));
    let session = SessionManager::connect(client(config)?, store)
        .await
        .context("Failed to establish tastytrade session")?;
    Ok(session)
}
