//! Engine runtime
//!
//! Wires the SQLCipher repositories, the HTTP accounting client and the
//! [`SyncService`] together, then starts the background pieces: the session
//! health monitor, the reconciliation scheduler and the on-demand queue.
//!
//! The host application supplies its primary store as an [`EntityStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clinisync_core::EntityStore;
//! use clinisync_domain::{EntityKind, Result};
//! use clinisync_infra::{config, SyncRuntime};
//!
//! # async fn example(store: Arc<dyn EntityStore>) -> Result<()> {
//! let runtime = SyncRuntime::start(config::load()?, store, None).await?;
//! runtime.queue().submit(EntityKind::Invoice, "inv-24")?;
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use clinisync_common::CredentialCipher;
use clinisync_core::{EnginePorts, EngineSettings, EntityStore, SyncService};
use clinisync_domain::{CliniSyncError, Config, Result};
use tracing::{info, instrument, warn};

use crate::database::{DbManager, SqlCipherAuditLog, SqlCipherCredentialStore, SqlCipherSyncLedger};
use crate::errors::InfraError;
use crate::integrations::accounting::{
    HealthStatusListener, HttpAccountingClient, LoggingHealthListener, SessionHealthMonitor,
};
use crate::scheduling::{ReconciliationScheduler, ReconciliationSchedulerConfig};
use crate::sync::{OnDemandQueueConfig, OnDemandSyncQueue};

/// A running sync engine.
pub struct SyncRuntime {
    db: Arc<DbManager>,
    service: Arc<SyncService>,
    monitor: SessionHealthMonitor,
    scheduler: ReconciliationScheduler,
    queue: OnDemandSyncQueue,
}

impl SyncRuntime {
    /// Open the database, build the engine and start every background task.
    ///
    /// A failed first sign-in is logged, not returned: the engine still
    /// starts so credentials can be saved through [`SyncService::save_credentials`].
    ///
    /// # Errors
    /// - `Config` for a wrong database key, a missing credential key or an
    ///   invalid remote URL or cron expression
    /// - `Database` when the schema cannot be applied
    #[instrument(skip_all, fields(db = %config.database.path))]
    pub async fn start(
        config: Config,
        store: Arc<dyn EntityStore>,
        listener: Option<Arc<dyn HealthStatusListener>>,
    ) -> Result<Self> {
        let db = Arc::new(open_database(&config).await?);
        let cipher = credential_cipher(&config)?;

        let ports = EnginePorts {
            api: Arc::new(HttpAccountingClient::new(&config.remote)?),
            credentials: Arc::new(SqlCipherCredentialStore::new(Arc::clone(&db), cipher)),
            ledger: Arc::new(SqlCipherSyncLedger::new(Arc::clone(&db))),
            audit_log: Arc::new(SqlCipherAuditLog::new(Arc::clone(&db))),
            store,
        };
        let service = Arc::new(SyncService::new(ports, EngineSettings::from_config(&config)));

        if let Err(err) = service.session().connect().await {
            warn!(error = %err, "Initial sign-in failed; reconciliation waits for a session");
        }

        let listener = listener.unwrap_or_else(|| Arc::new(LoggingHealthListener));
        let mut monitor = SessionHealthMonitor::new(
            Arc::clone(service.session()),
            listener,
            config.sync.health_check_interval_secs,
        );
        monitor.start().await?;

        let mut scheduler = ReconciliationScheduler::new(
            ReconciliationSchedulerConfig::from_sync_config(&config.sync),
            Arc::clone(&service),
        );
        if let Err(err) = scheduler.start().await {
            stop_monitor(&mut monitor).await;
            service.shutdown();
            return Err(err.into());
        }

        let mut queue = OnDemandSyncQueue::new(Arc::clone(&service), OnDemandQueueConfig::default());
        if let Err(err) = queue.start() {
            if let Err(stop_err) = scheduler.stop().await {
                warn!(error = %stop_err, "Scheduler did not stop cleanly after a failed start");
            }
            stop_monitor(&mut monitor).await;
            service.shutdown();
            return Err(err);
        }

        info!(connected = service.session().is_connected(), "Sync runtime started");
        Ok(Self { db, service, monitor, scheduler, queue })
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }

    pub fn queue(&self) -> &OnDemandSyncQueue {
        &self.queue
    }

    pub fn database(&self) -> &Arc<DbManager> {
        &self.db
    }

    /// Close the session, then stop accepting work and cancel the timers.
    /// Closing first wakes any reconnect backoff so no component waits it
    /// out. Every component is stopped even when an earlier one fails; the
    /// first failure is returned.
    #[instrument(skip_all)]
    pub async fn shutdown(mut self) -> Result<()> {
        self.service.shutdown();
        let queue = self.queue.stop().await;
        let scheduler = self.scheduler.stop().await.map_err(CliniSyncError::from);
        let monitor = self.monitor.stop().await;

        info!("Sync runtime stopped");
        queue.and(scheduler).and(monitor)
    }
}

async fn stop_monitor(monitor: &mut SessionHealthMonitor) {
    if let Err(err) = monitor.stop().await {
        warn!(error = %err, "Health monitor did not stop cleanly after a failed start");
    }
}

async fn open_database(config: &Config) -> Result<DbManager> {
    let database = config.database.clone();
    tokio::task::spawn_blocking(move || {
        let db = DbManager::from_config(&database)?;
        db.run_migrations()?;
        Ok(db)
    })
    .await
    .map_err(|e| CliniSyncError::from(InfraError::from(e)))?
}

/// The credential key falls back to the database key so one secret is
/// enough for a default install.
fn credential_cipher(config: &Config) -> Result<CredentialCipher> {
    let passphrase = config
        .remote
        .credential_key
        .as_deref()
        .or(config.database.encryption_key.as_deref())
        .ok_or_else(|| {
            CliniSyncError::Config(
                "remote.credential_key or database.encryption_key is required to protect stored credentials"
                    .to_string(),
            )
        })?;
    CredentialCipher::new(passphrase).map_err(|e| CliniSyncError::from(InfraError::from(e)))
}

#[cfg(test)]
mod tests {
    use clinisync_domain::{DatabaseConfig, RemoteConfig};

    use super::*;

    fn config(credential_key: Option<&str>, db_key: Option<&str>) -> Config {
        Config {
            database: DatabaseConfig {
                path: "unused.db".into(),
                pool_size: 1,
                encryption_key: db_key.map(ToOwned::to_owned),
            },
            remote: RemoteConfig {
                credential_key: credential_key.map(ToOwned::to_owned),
                ..RemoteConfig::default()
            },
            sync: Default::default(),
            logging: Default::default(),
        }
    }

    #[test]
    fn credential_key_falls_back_to_database_key() {
        let from_db = credential_cipher(&config(None, Some("database-passphrase"))).unwrap();
        let explicit = CredentialCipher::new("database-passphrase").unwrap();
        assert_eq!(from_db.fingerprint(), explicit.fingerprint());

        let preferred =
            credential_cipher(&config(Some("credential-passphrase"), Some("database-passphrase")))
                .unwrap();
        assert_ne!(preferred.fingerprint(), explicit.fingerprint());
    }

    #[test]
    fn missing_keys_are_a_configuration_error() {
        assert!(matches!(credential_cipher(&config(None, None)), Err(CliniSyncError::Config(_))));
    }
}
