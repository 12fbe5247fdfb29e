//! Session lifecycle: cache-aside token reuse with single-flight renewal.
//!
//! On [`SessionManager::connect`] the cached [`SessionState`] is restored from
//! the secret store and validated. An absent or refused token triggers one
//! full login; the new state is written back to the store before the client
//! starts sending it.
//!
//! Renewal is guarded by a mutex and a generation counter. A caller that saw
//! generation `g` fail validation only logs in if the generation is still `g`
//! once it holds the lock; otherwise it adopts the state the winning renewal
//! produced. A failed renewal is kept under the same lock, so callers that
//! were already waiting on it get its error instead of logging in again.

use crate::auth::{CredentialStore, Credentials, SessionState};
use crate::client::TastytradeClient;
use crate::error::{Result, TastytradeError};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Outcome of the most recent failed renewal.
#[derive(Debug)]
struct FailedRenewal {
    /// Value of the failure counter once this failure was recorded.
    attempt: u64,
    status_code: u16,
    message: String,
}

impl FailedRenewal {
    fn to_error(&self) -> TastytradeError {
        TastytradeError::authentication(self.status_code, self.message.clone())
    }
}

/// Owns the authenticated client and the process-wide session state.
pub struct SessionManager {
    client: TastytradeClient,
    store: CredentialStore,
    credentials: Credentials,
    state: RwLock<Option<SessionState>>,
    renewal: Mutex<Option<FailedRenewal>>,
    generation: AtomicU64,
    failures: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client", &self.client)
            .field("username", &self.credentials.username())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager without touching the network or the session cache.
    #[must_use]
    pub fn new(client: TastytradeClient, store: CredentialStore, credentials: Credentials) -> Self {
        Self {
            client,
            store,
            credentials,
            state: RwLock::new(None),
            renewal: Mutex::new(None),
            generation: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Loads credentials, restores the cached session, and ensures it is valid.
    ///
    /// # Errors
    /// Returns [`TastytradeError::CredentialStore`] if credentials cannot be
    /// read, or [`TastytradeError::Authentication`] if login fails.
    pub async fn connect(client: TastytradeClient, store: CredentialStore) -> Result<Self> {
        let credentials = store.load_credentials().await?;
        let manager = Self::new(client, store, credentials);
        manager.restore_cached().await?;
        manager.ensure_valid().await?;
        Ok(manager)
    }

    /// Installs the cached session, if any, without validating it.
    ///
    /// # Returns
    /// `true` if a cached token was installed.
    ///
    /// # Errors
    /// Returns error if the secret store fails.
    pub async fn restore_cached(&self) -> Result<bool> {
        let Some(cached) = self.store.load_session().await? else {
            return Ok(false);
        };
        if !cached.has_token() {
            return Ok(false);
        }
        debug!("restored cached session");
        self.client
            .set_session_token(Some(cached.session_token.clone()));
        *self.state.write().await = Some(cached);
        Ok(true)
    }

    /// The authenticated client shared by all outbound calls.
    #[must_use]
    pub fn client(&self) -> &TastytradeClient {
        &self.client
    }

    /// Current session state, if established.
    pub async fn current(&self) -> Option<SessionState> {
        self.state.read().await.clone()
    }

    /// Validates the installed token with a lightweight round-trip.
    ///
    /// # Errors
    /// Returns error only if the validation request could not be sent.
    pub async fn is_valid(&self) -> Result<bool> {
        let valid = self.client.validate_session().await?;
        debug!(valid, "session validated");
        Ok(valid)
    }

    /// Returns a valid session, renewing at most once.
    ///
    /// # Errors
    /// Returns [`TastytradeError::Authentication`] if the single renewal
    /// attempt fails, including one started by a concurrent caller.
    pub async fn ensure_valid(&self) -> Result<SessionState> {
        let observed = self.generation.load(Ordering::Acquire);
        let observed_failures = self.failures.load(Ordering::Acquire);
        if self.is_valid().await? {
            if let Some(state) = self.current().await {
                return Ok(state);
            }
        }
        info!("session token absent or invalid, renewing");
        self.renew_if_current(observed, observed_failures).await
    }

    /// Performs a full login with `credentials` and persists the new state.
    ///
    /// # Errors
    /// Returns error if login, the streamer token request, or persisting the
    /// state fails. The previous token stays installed in that case.
    pub async fn renew(&self, credentials: &Credentials) -> Result<SessionState> {
        let mut guard = self.renewal.lock().await;
        self.renew_locked(&mut guard, credentials).await
    }

    /// Drops the installed token so the next [`Self::ensure_valid`] renews.
    pub async fn invalidate(&self) {
        let _guard = self.renewal.lock().await;
        self.client.set_session_token(None);
        *self.state.write().await = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    async fn renew_if_current(
        &self,
        observed: u64,
        observed_failures: u64,
    ) -> Result<SessionState> {
        let mut guard = self.renewal.lock().await;
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(state) = self.current().await {
                debug!("adopting session renewed by a concurrent caller");
                return Ok(state);
            }
        }
        if let Some(failed) = guard.as_ref().filter(|f| f.attempt > observed_failures) {
            debug!("sharing failed renewal of a concurrent caller");
            return Err(failed.to_error());
        }
        self.renew_locked(&mut guard, &self.credentials).await
    }

    async fn renew_locked(
        &self,
        outcome: &mut MutexGuard<'_, Option<FailedRenewal>>,
        credentials: &Credentials,
    ) -> Result<SessionState> {
        match self.login_and_install(credentials).await {
            Ok(state) => {
                **outcome = None;
                Ok(state)
            }
            Err(err) => {
                let attempt = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(error = %err, attempt, "session renewal failed");
                let (status_code, message) = match &err {
                    TastytradeError::Authentication {
                        status_code,
                        message,
                    } => (*status_code, message.clone()),
                    other => (other.status_code().unwrap_or(0), other.to_string()),
                };
                **outcome = Some(FailedRenewal {
                    attempt,
                    status_code,
                    message,
                });
                Err(err)
            }
        }
    }

    async fn login_and_install(&self, credentials: &Credentials) -> Result<SessionState> {
        let session_token = self.client.login(credentials).await?;
        let streamer = self
            .client
            .quote_streamer_token_for(&session_token)
            .await
            .map_err(|e| match e {
                TastytradeError::Api {
                    status_code,
                    message,
                } => TastytradeError::authentication(status_code, message),
                other => other,
            })?;

        let state = SessionState {
            session_token,
            streamer_token: streamer.token,
            dxlink_url: streamer.dxlink_url,
        };

        self.store.save_session(&state).await?;

        self.client
            .set_session_token(Some(state.session_token.clone()));
        *self.state.write().await = Some(state.clone());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        info!(
            username = self.credentials.username(),
            generation, "session renewed"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::MemoryStore;
    use crate::auth::{CREDENTIALS_KEY, SESSION_CACHE_KEY};
    use crate::client::TastytradeClientConfig;
    use async_trait::async_trait;
    use nonzero_ext::nonzero;
    use spreadbot_core::SecretStore;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TastytradeClient {
        TastytradeClient::new(
            TastytradeClientConfig::default()
                .with_base_url(server.uri())
                .with_rate_limit(nonzero!(1000u32)),
        )
        .unwrap()
    }

    fn cached_state(token: &str) -> String {
        serde_json::json!({
            "session_token": token,
            "streamer_token": "old-stream",
            "dxlink_url": "wss://old"
        })
        .to_string()
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {"session-token": "fresh"}
            })))
            .expect(expected_calls)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/quote-streamer-tokens"))
            .and(header("Authorization", "fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"token": "stream", "dxlink-url": "wss://tasty-openapi-ws.dxfeed.com/realtime"}
            })))
            .mount(server)
            .await;
    }

    async fn mount_validate(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/sessions/validate"))
            .and(header("Authorization", "fresh"))
            .respond_with(ResponseTemplate::new(201))
            .with_priority(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sessions/validate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(server)
            .await;
    }

    // ==================== Connect Tests ====================

    #[tokio::test]
    async fn test_connect_reuses_valid_cached_session() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 0).await;

        let store = Arc::new(MemoryStore::with_credentials());
        store.put(SESSION_CACHE_KEY, &cached_state("fresh")).await.unwrap();

        let manager = SessionManager::connect(client_for(&server), CredentialStore::new(store))
            .await
            .unwrap();
        let state = manager.current().await.unwrap();
        assert_eq!(state.session_token, "fresh");
        assert_eq!(state.dxlink_url, "wss://old");
    }

    #[tokio::test]
    async fn test_connect_without_cache_logs_in_and_persists() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 1).await;

        let store = Arc::new(MemoryStore::with_credentials());
        let manager =
            SessionManager::connect(client_for(&server), CredentialStore::new(store.clone()))
                .await
                .unwrap();

        assert!(manager.client().has_session_token());
        let persisted = store.get(SESSION_CACHE_KEY).await.unwrap().unwrap();
        let persisted: SessionState = serde_json::from_str(&persisted).unwrap();
        assert_eq!(persisted.session_token, "fresh");
        assert_eq!(persisted.streamer_token, "stream");
    }

    #[tokio::test]
    async fn test_connect_renews_stale_cached_session_once() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 1).await;

        let store = Arc::new(MemoryStore::with_credentials());
        store.put(SESSION_CACHE_KEY, &cached_state("stale")).await.unwrap();

        let manager = SessionManager::connect(client_for(&server), CredentialStore::new(store))
            .await
            .unwrap();
        assert_eq!(manager.current().await.unwrap().session_token, "fresh");
    }

    #[tokio::test]
    async fn test_connect_fails_without_credentials() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::default());

        let err = SessionManager::connect(client_for(&server), CredentialStore::new(store))
            .await
            .unwrap_err();
        assert!(matches!(err, TastytradeError::CredentialStore(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_authentication_error() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad login"))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::with_credentials());
        let err = SessionManager::connect(client_for(&server), CredentialStore::new(store))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TastytradeError::Authentication {
                status_code: 401,
                ..
            }
        ));
    }

    // ==================== Renewal Tests ====================

    #[tokio::test]
    async fn test_concurrent_callers_share_one_renewal() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 1).await;

        let store = Arc::new(MemoryStore::with_credentials());
        store.put(SESSION_CACHE_KEY, &cached_state("stale")).await.unwrap();

        let credentials = CredentialStore::new(store.clone());
        let creds = credentials.load_credentials().await.unwrap();
        let manager = Arc::new(SessionManager::new(client_for(&server), credentials, creds));
        assert!(manager.restore_cached().await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.ensure_valid().await }));
        }
        for handle in handles {
            let state = handle.await.unwrap().unwrap();
            assert_eq!(state.session_token, "fresh");
        }
        // MockServer verifies the single login on drop.
    }

    /// Store whose session writes always fail.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl SecretStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key).await
        }

        async fn put(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only")
        }
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_previous_token() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 1).await;

        let inner = MemoryStore::with_credentials();
        inner
            .put(SESSION_CACHE_KEY, &cached_state("stale"))
            .await
            .unwrap();
        let store = CredentialStore::new(Arc::new(ReadOnlyStore(inner)));
        let creds = store.load_credentials().await.unwrap();
        let manager = SessionManager::new(client_for(&server), store, creds);
        manager.restore_cached().await.unwrap();

        let err = manager.ensure_valid().await.unwrap_err();
        assert!(matches!(err, TastytradeError::CredentialStore(_)));
        assert_eq!(manager.current().await.unwrap().session_token, "stale");
    }

    #[tokio::test]
    async fn test_invalidate_forces_renewal() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        mount_login(&server, 2).await;

        let store = Arc::new(MemoryStore::with_credentials());
        let manager = SessionManager::connect(client_for(&server), CredentialStore::new(store))
            .await
            .unwrap();

        manager.invalidate().await;
        assert!(!manager.client().has_session_token());
        assert!(manager.current().await.is_none());

        let state = manager.ensure_valid().await.unwrap();
        assert_eq!(state.session_token, "fresh");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_login() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("invalid credentials")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::with_credentials());
        store.put(SESSION_CACHE_KEY, &cached_state("stale")).await.unwrap();

        let credentials = CredentialStore::new(store.clone());
        let creds = credentials.load_credentials().await.unwrap();
        let manager = Arc::new(SessionManager::new(client_for(&server), credentials, creds));
        assert!(manager.restore_cached().await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.ensure_valid().await }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(
                err,
                TastytradeError::Authentication {
                    status_code: 401,
                    ..
                }
            ));
        }
        assert_eq!(manager.current().await.unwrap().session_token, "stale");
        // MockServer verifies the single login on drop.
    }

    #[tokio::test]
    async fn test_later_caller_retries_after_failed_login() {
        let server = MockServer::start().await;
        mount_validate(&server).await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("locked"))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_login(&server, 1).await;

        let store = Arc::new(MemoryStore::with_credentials());
        let credentials = CredentialStore::new(store.clone());
        let creds = credentials.load_credentials().await.unwrap();
        let manager = SessionManager::new(client_for(&server), credentials, creds);

        assert!(manager.ensure_valid().await.is_err());
        let state = manager.ensure_valid().await.unwrap();
        assert_eq!(state.session_token, "fresh");
    }

    #[test]
    fn test_credentials_key_constant() {
        assert_eq!(CREDENTIALS_KEY, "credentials");
    }
}
