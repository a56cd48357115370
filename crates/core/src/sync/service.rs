//! Public entry point of the sync engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clinisync_domain::constants::DEFAULT_PENDING_ERRORS_LIMIT;
use clinisync_domain::{
    AuditEntry, AuditQuery, CallContext, CliniSyncError, Config, Credentials,
    DuplicateCreatePolicy, EntityKind, EntityRef, KindStatusCounts, OperationStats, Result,
    SessionSnapshot, SyncRecord, SyncTrigger,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::audit::AuditRecorder;
use super::executor::CallExecutor;
use super::fiscal::{FiscalCheck, FiscalRefreshReport, FiscalStatusRefresher};
use super::ports::{AccountingApi, AuditLog, CredentialStore, EntityStore, SyncLedger};
use super::reconciler::{Reconciler, RunReport};
use super::session::{SessionManager, SessionSettings};
use super::synchronizer::{EntitySynchronizer, SyncOutcome};

/// Adapters the engine runs on.
#[derive(Clone)]
pub struct EnginePorts {
    pub api: Arc<dyn AccountingApi>,
    pub credentials: Arc<dyn CredentialStore>,
    pub ledger: Arc<dyn SyncLedger>,
    pub audit_log: Arc<dyn AuditLog>,
    pub store: Arc<dyn EntityStore>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub session: SessionSettings,
    /// Deadline for each entity call.
    pub call_timeout: Duration,
    pub duplicate_create_policy: DuplicateCreatePolicy,
    pub pending_errors_limit: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session: SessionSettings::from_config(&config.sync, &config.remote),
            call_timeout: config.remote.call_deadline(),
            duplicate_create_policy: config.sync.duplicate_create_policy,
            pending_errors_limit: DEFAULT_PENDING_ERRORS_LIMIT,
        }
    }
}

/// Ledger counts per kind plus the session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub kinds: BTreeMap<EntityKind, KindStatusCounts>,
    pub session: SessionSnapshot,
}

pub struct SyncService {
    session: Arc<SessionManager>,
    synchronizer: Arc<EntitySynchronizer>,
    reconciler: Arc<Reconciler>,
    fiscal: FiscalStatusRefresher,
    ledger: Arc<dyn SyncLedger>,
    audit_log: Arc<dyn AuditLog>,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn EntityStore>,
    pending_errors_limit: usize,
}

impl SyncService {
    pub fn new(ports: EnginePorts, settings: EngineSettings) -> Self {
        let audit = AuditRecorder::new(ports.audit_log.clone());
        let session = Arc::new(SessionManager::new(
            ports.api.clone(),
            ports.credentials.clone(),
            audit.clone(),
            settings.session,
        ));
        let executor = Arc::new(CallExecutor::new(
            ports.api,
            session.clone(),
            ports.ledger.clone(),
            audit,
            settings.call_timeout,
        ));
        let fiscal = FiscalStatusRefresher::new(executor.clone(), ports.store.clone());
        let synchronizer = Arc::new(EntitySynchronizer::new(
            executor,
            ports.ledger.clone(),
            ports.store.clone(),
            settings.duplicate_create_policy,
        ));
        let reconciler = Arc::new(Reconciler::new(
            synchronizer.clone(),
            session.clone(),
            ports.ledger.clone(),
            ports.store.clone(),
        ));

        Self {
            session,
            synchronizer,
            reconciler,
            fiscal,
            ledger: ports.ledger,
            audit_log: ports.audit_log,
            credentials: ports.credentials,
            store: ports.store,
            pending_errors_limit: settings.pending_errors_limit,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Sync one entity now.
    ///
    /// # Errors
    /// Whatever stopped the sync; the ledger row carries the same message
    /// unless the failure was a connectivity one.
    pub async fn sync_now(&self, kind: EntityKind, entity_id: &str) -> Result<SyncOutcome> {
        self.sync_with_context(kind, entity_id, CallContext::new(SyncTrigger::OnDemand)).await
    }

    pub async fn sync_with_context(
        &self,
        kind: EntityKind,
        entity_id: &str,
        context: CallContext,
    ) -> Result<SyncOutcome> {
        if entity_id.trim().is_empty() {
            return Err(CliniSyncError::InvalidInput("entity id is empty".to_string()));
        }
        self.synchronizer.sync(&EntityRef::new(kind, entity_id), &context).await
    }

    pub async fn reconcile(&self, kind: EntityKind, batch_size: usize) -> Result<RunReport> {
        self.reconciler.run(kind, batch_size).await
    }

    /// Ask the remote for the tax authority's verdict on up to `limit`
    /// issued invoices or credit notes still pending one.
    pub async fn refresh_fiscal_status(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<FiscalRefreshReport> {
        self.fiscal.refresh(kind, limit).await
    }

    pub async fn check_fiscal_status(&self, kind: EntityKind, entity_id: &str) -> Result<FiscalCheck> {
        let context = CallContext::new(SyncTrigger::OnDemand);
        self.fiscal.check(&EntityRef::new(kind, entity_id), &context).await
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus> {
        let mut kinds = self.ledger.status_counts().await?;
        for kind in EntityKind::ALL {
            kinds.entry(kind).or_default();
        }
        Ok(SyncStatus { kinds, session: self.session.snapshot() })
    }

    /// Most recent failures, newest first.
    pub async fn get_pending_errors(&self, limit: Option<usize>) -> Result<Vec<SyncRecord>> {
        self.ledger.list_errors(limit.unwrap_or(self.pending_errors_limit)).await
    }

    /// Reset the reconnect counter and sign in again.
    #[instrument(skip(self))]
    pub async fn force_reconnect(&self) -> Result<SessionSnapshot> {
        self.session.force_reconnect().await?;
        Ok(self.session.snapshot())
    }

    /// Store new credentials and reconnect with them. A failed reconnect is
    /// logged; the credentials stay saved.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        if credentials.username.trim().is_empty() || credentials.access_key.trim().is_empty() {
            return Err(CliniSyncError::InvalidInput(
                "username and access key are required".to_string(),
            ));
        }
        self.credentials.save(credentials).await?;
        info!("Accounting credentials saved");

        if let Err(err) = self.session.force_reconnect().await {
            warn!(error = %err, "Reconnect with the new credentials failed");
        }
        Ok(())
    }

    /// Sign in with `credentials` without storing them or touching the
    /// live session.
    pub async fn test_connection(&self, credentials: &Credentials) -> Result<()> {
        self.session.test_credentials(credentials).await
    }

    pub async fn audit_trail(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        self.audit_log.query(query).await
    }

    pub async fn operation_stats(&self, since: DateTime<Utc>) -> Result<Vec<OperationStats>> {
        self.audit_log.operation_stats(since).await
    }

    /// Give every entity of `kind` without a remote id a `Pending` ledger
    /// row so the next reconciliation picks it up. Returns how many rows
    /// were added.
    pub async fn enqueue_unsynced(&self, kind: EntityKind, limit: usize) -> Result<usize> {
        let mut added = 0;
        for entity_id in self.store.list_unsynced(kind, limit).await? {
            if self.ledger.get(kind, &entity_id).await?.is_none() {
                self.ledger.ensure_pending(kind, &entity_id).await?;
                added += 1;
            }
        }
        info!(%kind, added, "Queued unsynced entities");
        Ok(added)
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use clinisync_domain::{constants, DatabaseConfig, EntitySnapshot, RemoteConfig, SyncState};

    use super::*;
    use crate::sync::ports::RemoteResponse;
    use crate::testing::{fixtures, sample_credentials, ServiceHarness};

    #[test]
    fn call_deadlines_leave_room_for_transport_retries() {
        let config = Config {
            database: DatabaseConfig { path: "c.db".into(), pool_size: 1, encryption_key: None },
            remote: RemoteConfig { request_timeout_secs: 20, ..RemoteConfig::default() },
            sync: Default::default(),
            logging: Default::default(),
        };

        let settings = EngineSettings::from_config(&config);

        let every_attempt = Duration::from_secs(20) * constants::REMOTE_CALL_ATTEMPTS;
        assert!(settings.call_timeout > every_attempt, "got {:?}", settings.call_timeout);
        assert_eq!(settings.session.call_timeout, settings.call_timeout);
    }

    #[tokio::test]
    async fn status_covers_every_kind() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.service.session().connect().await.unwrap();
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));
        harness.service.sync_now(EntityKind::Product, "p-1").await.unwrap();

        let status = harness.service.get_sync_status().await.unwrap();

        assert_eq!(status.kinds.len(), EntityKind::ALL.len());
        assert_eq!(status.kinds[&EntityKind::Product].synced, 1);
        assert_eq!(status.kinds[&EntityKind::Invoice].total(), 0);
        assert!(status.session.connected);
    }

    #[tokio::test]
    async fn pending_errors_are_newest_first() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.ledger.mark_error(EntityKind::Invoice, "inv-1", "first").await.unwrap();
        harness.ledger.mark_error(EntityKind::Product, "p-1", "second").await.unwrap();
        harness.ledger.backdate_attempt(EntityKind::Invoice, "inv-1", chrono::Duration::minutes(5));

        let errors = harness.service.get_pending_errors(None).await.unwrap();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].entity_id, "p-1");
        assert_eq!(errors[0].state, SyncState::Error);
    }

    #[tokio::test]
    async fn sync_now_propagates_config_missing() {
        let harness = ServiceHarness::new(None);
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));

        let err = harness.service.sync_now(EntityKind::Product, "p-1").await.unwrap_err();

        assert!(matches!(err, CliniSyncError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn saving_credentials_reconnects() {
        let harness = ServiceHarness::new(None);
        assert!(harness.service.session().connect().await.is_err());

        harness.service.save_credentials(&sample_credentials()).await.unwrap();

        assert!(harness.service.session().is_connected());
        assert_eq!(harness.credentials.saved().unwrap().username, "clinic@example.com");
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected() {
        let harness = ServiceHarness::new(None);
        let mut credentials = sample_credentials();
        credentials.access_key = " ".into();

        let err = harness.service.save_credentials(&credentials).await.unwrap_err();

        assert!(matches!(err, CliniSyncError::InvalidInput(_)));
        assert!(harness.credentials.saved().is_none());
    }

    #[tokio::test]
    async fn enqueue_unsynced_adds_only_unknown_rows() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-2", "MED-2")));
        harness.ledger.mark_error(EntityKind::Product, "p-2", "boom").await.unwrap();

        let added = harness.service.enqueue_unsynced(EntityKind::Product, 100).await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(harness.ledger.record(EntityKind::Product, "p-1").unwrap().state, SyncState::Pending);
    }

    #[tokio::test]
    async fn synced_invoice_can_be_checked_for_its_fiscal_verdict() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.service.session().connect().await.unwrap();
        harness.store.insert(EntitySnapshot::Invoice(fixtures::invoice("inv-1", None)));
        harness.service.sync_now(EntityKind::Invoice, "inv-1").await.unwrap();
        let remote_id = harness.ledger.record(EntityKind::Invoice, "inv-1").unwrap().remote_id.unwrap();

        let report = harness.service.refresh_fiscal_status(EntityKind::Invoice, 50).await.unwrap();

        assert_eq!((report.candidates, report.accepted), (1, 1));
        let last = harness.api.requests().pop().unwrap();
        assert_eq!(last.path, format!("/v1/invoices/{remote_id}/errors"));
        let stamp = harness.store.assignment(EntityKind::Invoice, "inv-1").unwrap().stamp.unwrap();
        assert_eq!(stamp.status.as_deref(), Some("accepted"));

        let again = harness.service.refresh_fiscal_status(EntityKind::Invoice, 50).await.unwrap();
        assert_eq!(again.candidates, 0);
        let check = harness.service.check_fiscal_status(EntityKind::Invoice, "inv-1").await.unwrap();
        assert_eq!(check.remote_id, remote_id);
    }

    #[tokio::test]
    async fn audit_trail_filters_by_entity() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.service.session().connect().await.unwrap();
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));
        harness.api.push_response(Ok(RemoteResponse { status: 201, body: serde_json::json!({"id": "R-P"}) }));
        harness.service.sync_now(EntityKind::Product, "p-1").await.unwrap();

        let trail = harness
            .service
            .audit_trail(&AuditQuery {
                entity_kind: Some(EntityKind::Product),
                entity_id: Some("p-1".into()),
                ..AuditQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].operation, "create_product");
        assert_eq!(trail[0].remote_id.as_deref(), Some("R-P"));
    }
}
