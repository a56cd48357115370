//! Remote session lifecycle: sign-in, single-flight connect, health checks
//! and bounded reconnection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clinisync_common::BackoffStrategy;
use clinisync_domain::{
    AccessToken, CallContext, CliniSyncError, Credentials, RemoteConfig, Result, SessionSnapshot,
    SyncConfig, SyncTrigger,
};
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

use super::audit::{AuditRecorder, CallTrace};
use super::ports::{AccountingApi, CredentialStore, RemoteRequest, RemoteResponse};

/// Path of the cheap read used as a health check.
pub const HEALTH_CHECK_PATH: &str = "/v1/taxes";

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_reconnect_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Deadline for sign-in and health check calls.
    pub call_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(sync: &SyncConfig, remote: &RemoteConfig) -> Self {
        Self {
            max_reconnect_attempts: sync.max_reconnect_attempts,
            backoff: BackoffStrategy::doubling(
                Duration::from_millis(sync.reconnect_delay_ms),
                Duration::from_millis(sync.reconnect_max_delay_ms),
            ),
            call_timeout: remote.call_deadline(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<AccessToken>,
    connected: bool,
    last_health_check_at: Option<DateTime<Utc>>,
    last_sign_in_at: Option<DateTime<Utc>>,
    /// Consecutive failed connects since the last success or manual reset.
    reconnect_attempts: u32,
    last_error: Option<String>,
    /// Bumped after every connect attempt; waiters compare it to learn that
    /// someone else already connected on their behalf.
    generation: u64,
    last_connect: Option<Result<()>>,
    shut_down: bool,
}

/// Owns authentication to the remote accounting service.
///
/// One instance per process, shared by reference with every synchronizer
/// and scheduler job.
pub struct SessionManager {
    api: Arc<dyn AccountingApi>,
    credentials: Arc<dyn CredentialStore>,
    audit: AuditRecorder,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    connect_lock: Mutex<()>,
    shutdown_signal: Notify,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn AccountingApi>,
        credentials: Arc<dyn CredentialStore>,
        audit: AuditRecorder,
        settings: SessionSettings,
    ) -> Self {
        Self {
            api,
            credentials,
            audit,
            settings,
            state: RwLock::new(SessionState::default()),
            connect_lock: Mutex::new(()),
            shutdown_signal: Notify::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot {
            connected: state.connected,
            last_health_check_at: state.last_health_check_at,
            last_sign_in_at: state.last_sign_in_at,
            reconnect_attempts: state.reconnect_attempts,
            max_reconnect_attempts: self.settings.max_reconnect_attempts,
            last_error: state.last_error.clone(),
        }
    }

    /// Sign in with the stored credentials.
    ///
    /// # Errors
    /// `ConfigMissing` without stored credentials, `AuthRejected` when the
    /// remote refuses them, `SdkUnavailable` when no client can be built.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        self.connect_locked().await
    }

    /// Live token, connecting first if needed. Concurrent callers share one
    /// in-flight sign-in.
    pub async fn ensure_connected(&self) -> Result<AccessToken> {
        if let Some(token) = self.live_token() {
            return Ok(token);
        }
        self.check_can_connect()?;

        let observed = self.state.read().generation;
        let _guard = self.connect_lock.lock().await;

        if let Some(shared) = self.shared_outcome(observed) {
            return shared;
        }
        self.check_can_connect()?;

        self.connect_locked().await?;
        self.live_token().ok_or(CliniSyncError::Disconnected)
    }

    /// Check the remote with a cheap read; on failure mark the session down
    /// and reconnect.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        if self.state.read().shut_down {
            return Err(CliniSyncError::Disconnected);
        }
        let Some(token) = self.live_token() else {
            debug!("Session is down; health check goes straight to reconnect");
            return self.reconnect().await;
        };

        let request = RemoteRequest::get(HEALTH_CHECK_PATH);
        let started = Instant::now();
        let result = self.timed(self.api.send(&token, &request)).await;
        let duration = started.elapsed();
        self.state.write().last_health_check_at = Some(Utc::now());

        let failure = match &result {
            Ok(response) if response.is_success() => None,
            Ok(response) if matches!(response.status, 401 | 403) => Some(
                CliniSyncError::AuthRejected(format!("health check returned HTTP {}", response.status)),
            ),
            Ok(response) => Some(CliniSyncError::RemoteRejected {
                status: response.status,
                code: None,
                detail: "health check failed".to_string(),
            }),
            Err(err) => Some(err.clone()),
        };
        self.audit_session_call(
            "health_check",
            &request,
            result.as_ref().ok(),
            duration,
            failure.as_ref(),
        )
        .await;

        match failure {
            None => Ok(()),
            Some(err) => {
                let reason = err.to_string();
                warn!(reason = %reason, "Health check failed; reconnecting");
                self.invalidate(&reason);
                self.reconnect().await
            }
        }
    }

    /// Reconnect with backoff, up to the configured number of consecutive
    /// attempts. Once exhausted, no further sign-in is attempted until
    /// [`force_reconnect`](Self::force_reconnect) resets the counter.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        loop {
            self.check_can_connect()?;

            match self.connect_locked().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let failed = self.state.read().reconnect_attempts;
                    if failed >= self.settings.max_reconnect_attempts {
                        warn!(attempts = failed, error = %err, "Reconnect attempts exhausted");
                        return Err(CliniSyncError::ReconnectExhausted {
                            attempts: failed,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = self.settings.backoff.delay_for(failed.saturating_sub(1));
                    debug!(attempt = failed, delay_ms = delay.as_millis(), "Reconnect backoff");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.shutdown_signal.notified() => {
                            return Err(CliniSyncError::Disconnected);
                        }
                    }
                }
            }
        }
    }

    /// Reset the attempt counter and reconnect.
    pub async fn force_reconnect(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.reconnect_attempts = 0;
            state.connected = false;
            state.token = None;
        }
        info!("Manual reconnect requested");
        self.reconnect().await
    }

    /// Drop the current token, e.g. after the remote answered 401.
    pub fn invalidate(&self, reason: &str) {
        let mut state = self.state.write();
        if state.connected {
            warn!(reason = %reason, "Remote session invalidated");
        }
        state.connected = false;
        state.token = None;
        state.last_error = Some(reason.to_string());
    }

    /// Sign in with `credentials` without touching the live session.
    pub async fn test_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.sign_in_with(credentials).await.map(|_| ())
    }

    /// Stop connecting. In-flight calls finish on their own deadlines.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.write();
            state.shut_down = true;
            state.connected = false;
            state.token = None;
        }
        self.shutdown_signal.notify_waiters();
        info!("Session manager shut down");
    }

    fn live_token(&self) -> Option<AccessToken> {
        let state = self.state.read();
        match &state.token {
            Some(token) if state.connected && !token.is_expired(Utc::now()) => Some(token.clone()),
            _ => None,
        }
    }

    fn check_can_connect(&self) -> Result<()> {
        let state = self.state.read();
        if state.shut_down {
            return Err(CliniSyncError::Disconnected);
        }
        if state.reconnect_attempts >= self.settings.max_reconnect_attempts {
            return Err(CliniSyncError::ReconnectExhausted {
                attempts: state.reconnect_attempts,
                last_error: state.last_error.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Outcome of a connect that completed while we waited for the lock.
    fn shared_outcome(&self, observed_generation: u64) -> Option<Result<AccessToken>> {
        let state = self.state.read();
        if state.generation == observed_generation {
            return None;
        }
        let outcome = match (&state.token, &state.last_connect) {
            (Some(token), _) if state.connected => Ok(token.clone()),
            (_, Some(Err(err))) => Err(err.clone()),
            _ => Err(CliniSyncError::Disconnected),
        };
        Some(outcome)
    }

    /// Caller holds `connect_lock`.
    async fn connect_locked(&self) -> Result<()> {
        let outcome = match self.credentials.load_active().await {
            Ok(Some(credentials)) => self.sign_in_with(&credentials).await,
            Ok(None) => {
                Err(CliniSyncError::ConfigMissing("no active credentials stored".to_string()))
            }
            Err(err) => Err(err),
        };

        let now = Utc::now();
        let result = {
            let mut state = self.state.write();
            state.generation += 1;
            let result = match outcome {
                Ok(token) => {
                    state.token = Some(token);
                    state.connected = true;
                    state.reconnect_attempts = 0;
                    state.last_error = None;
                    state.last_sign_in_at = Some(now);
                    Ok(())
                }
                Err(err) => {
                    state.token = None;
                    state.connected = false;
                    state.reconnect_attempts = state.reconnect_attempts.saturating_add(1);
                    state.last_error = Some(err.to_string());
                    Err(err)
                }
            };
            state.last_connect = Some(result.clone());
            result
        };

        match &result {
            Ok(()) => {
                info!("Connected to remote accounting service");
                if let Err(err) = self.credentials.record_sign_in(now).await {
                    warn!(error = %err, "Failed to record sign-in time");
                }
            }
            Err(err) => warn!(error = %err, "Connect to remote accounting service failed"),
        }
        result
    }

    async fn sign_in_with(&self, credentials: &Credentials) -> Result<AccessToken> {
        let request = RemoteRequest::post(
            "/auth",
            json!({ "username": credentials.username, "access_key": credentials.access_key }),
        );
        let started = Instant::now();
        let result = self.timed(self.api.sign_in(credentials)).await;
        self.audit_session_call("sign_in", &request, None, started.elapsed(), result.as_ref().err())
            .await;
        result
    }

    async fn timed<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(CliniSyncError::timeout()))
    }

    async fn audit_session_call(
        &self,
        operation: &str,
        request: &RemoteRequest,
        response: Option<&RemoteResponse>,
        duration: Duration,
        failure: Option<&CliniSyncError>,
    ) {
        let context = CallContext::new(SyncTrigger::Session);
        let entry = self.audit.entry(CallTrace {
            operation,
            target: None,
            remote_id: None,
            request,
            response,
            duration,
            failure: failure.map(|err| (err.kind_code().to_string(), err.to_string())),
            stamp: None,
            context: &context,
        });
        self.audit.record(entry).await;
    }
}
