//! Background session health monitoring
//!
//! Periodically checks the remote accounting service through
//! [`SessionManager::health_check`], which reconnects on failure, and
//! notifies a [`HealthStatusListener`] when the observed status changes.
//!
//! # Architecture
//!
//! - `SessionHealthMonitor`: lifecycle coordinator (owns the task handle)
//! - `health_worker()`: the loop itself, testable without the coordinator
//! - `HealthStatusListener`: downstream hook for the host application
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use clinisync_core::SessionManager;
//! use clinisync_domain::{HealthStatus, Result};
//! use clinisync_infra::integrations::accounting::{HealthStatusListener, SessionHealthMonitor};
//!
//! struct LogListener;
//!
//! #[async_trait]
//! impl HealthStatusListener for LogListener {
//!     async fn on_health_changed(&self, status: HealthStatus) {
//!         tracing::info!(?status, "accounting session health");
//!     }
//! }
//!
//! # async fn example(session: Arc<SessionManager>) -> Result<()> {
//! let mut monitor = SessionHealthMonitor::new(session, Arc::new(LogListener), 300);
//! monitor.start().await?;
//! // ... application runs ...
//! monitor.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clinisync_core::SessionManager;
use clinisync_domain::{CliniSyncError, HealthStatus, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Upper bound for one check, reconnect attempts and backoff included.
const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(120);

/// Listener for health status changes
///
/// Only called when the status actually changes, not on every check.
#[async_trait]
pub trait HealthStatusListener: Send + Sync {
    async fn on_health_changed(&self, status: HealthStatus);
}

/// Listener that only logs. Used when the host does not register one.
pub struct LoggingHealthListener;

#[async_trait]
impl HealthStatusListener for LoggingHealthListener {
    async fn on_health_changed(&self, status: HealthStatus) {
        info!(status = ?status, "accounting session health changed");
    }
}

/// Session health monitor with explicit lifecycle
pub struct SessionHealthMonitor {
    session: Arc<SessionManager>,
    listener: Arc<dyn HealthStatusListener>,
    interval: Duration,
    check_timeout: Duration,
    task_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl SessionHealthMonitor {
    pub fn new(
        session: Arc<SessionManager>,
        listener: Arc<dyn HealthStatusListener>,
        interval_secs: u64,
    ) -> Self {
        Self {
            session,
            listener,
            interval: Duration::from_secs(interval_secs.max(1)),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            task_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the monitoring task.
    ///
    /// # Errors
    /// `Internal` when the monitor is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.task_handle.is_some() {
            return Err(CliniSyncError::Internal("Health monitor already running".to_string()));
        }

        self.cancellation = CancellationToken::new();
        let cancel = self.cancellation.clone();
        let session = Arc::clone(&self.session);
        let listener = Arc::clone(&self.listener);
        let interval = self.interval;
        let check_timeout = self.check_timeout;

        info!(interval_secs = interval.as_secs(), "Starting session health monitor");

        let handle = tokio::spawn(async move {
            health_worker(session, listener, interval, check_timeout, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Signal the worker and wait up to five seconds for it to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .map_err(|_| {
                    CliniSyncError::Internal("Health monitor shutdown timeout".to_string())
                })?
                .map_err(|e| CliniSyncError::Internal(format!("Task join failed: {e}")))?;
        }

        info!("Session health monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }
}

/// Map one check result onto a status. A check refused because the engine
/// is shutting down says nothing about the remote.
fn classify(result: std::result::Result<Result<()>, tokio::time::error::Elapsed>) -> HealthStatus {
    match result {
        Ok(Ok(())) => HealthStatus::Healthy,
        Ok(Err(CliniSyncError::Disconnected)) => HealthStatus::Unknown,
        Ok(Err(e)) => {
            warn!(error = %e, "Session health check failed");
            HealthStatus::Unhealthy
        }
        Err(_) => {
            warn!("Session health check timeout");
            HealthStatus::Unknown
        }
    }
}

async fn health_worker(
    session: Arc<SessionManager>,
    listener: Arc<dyn HealthStatusListener>,
    interval: Duration,
    check_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut current_status = HealthStatus::Unknown;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Health monitor worker shutting down");
                break;
            }
            () = tokio::time::sleep(interval) => {}
        }

        // A failing check can sit in reconnect backoff; cancellation must not wait for it.
        let new_status = tokio::select! {
            () = cancel.cancelled() => {
                info!("Health monitor worker shutting down mid-check");
                break;
            }
            result = tokio::time::timeout(check_timeout, session.health_check()) => classify(result),
        };

        if new_status != current_status {
            info!(
                previous_status = ?current_status,
                new_status = ?new_status,
                "Session health status changed"
            );
            listener.on_health_changed(new_status).await;
            current_status = new_status;
        }
    }
}
