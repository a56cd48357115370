//! On-demand sync queue.
//!
//! Business writes submit `(kind, id)` right after a local mutation and move
//! on. A single worker drains the queue in submission order through
//! [`SyncService::sync_with_context`]; failures are published on a
//! broadcast channel instead of being dropped. Whatever fails stays in the
//! ledger for the next scheduled reconciliation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clinisync_core::SyncService;
//! use clinisync_domain::{EntityKind, Result};
//! use clinisync_infra::sync::{OnDemandQueueConfig, OnDemandSyncQueue};
//!
//! # async fn example(service: Arc<SyncService>) -> Result<()> {
//! let mut queue = OnDemandSyncQueue::new(service, OnDemandQueueConfig::default());
//! let mut failures = queue.failures();
//! queue.start()?;
//!
//! queue.submit(EntityKind::Invoice, "inv-24")?;
//! if let Ok(failure) = failures.recv().await {
//!     tracing::warn!(entity_id = %failure.entity_id, error = %failure.error, "sync failed");
//! }
//! queue.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clinisync_core::SyncService;
use clinisync_domain::{CallContext, CliniSyncError, EntityKind, Result, SyncTrigger};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct OnDemandQueueConfig {
    /// Submissions buffered before `submit` reports the queue as full.
    pub capacity: usize,
    /// Deadline for one entity sync, reconnects included.
    pub sync_timeout: Duration,
    /// Buffered failures per subscriber before the slowest one lags.
    pub failure_buffer: usize,
    pub join_timeout: Duration,
}

impl Default for OnDemandQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            sync_timeout: Duration::from_secs(120),
            failure_buffer: 64,
            join_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct SyncRequest {
    kind: EntityKind,
    entity_id: String,
    context: CallContext,
}

/// A submitted sync that did not succeed.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub kind: EntityKind,
    pub entity_id: String,
    pub error: CliniSyncError,
    pub correlation_id: uuid::Uuid,
    pub failed_at: DateTime<Utc>,
}

pub struct OnDemandSyncQueue {
    service: Arc<SyncService>,
    config: OnDemandQueueConfig,
    sender: Mutex<Option<mpsc::Sender<SyncRequest>>>,
    failures: broadcast::Sender<SyncFailure>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl OnDemandSyncQueue {
    pub fn new(service: Arc<SyncService>, config: OnDemandQueueConfig) -> Self {
        let (failures, _) = broadcast::channel(config.failure_buffer.max(1));
        Self {
            service,
            config,
            sender: Mutex::new(None),
            failures,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Subscribe to failures of syncs submitted after this call.
    pub fn failures(&self) -> broadcast::Receiver<SyncFailure> {
        self.failures.subscribe()
    }

    /// Spawn the worker.
    ///
    /// # Errors
    /// `InvalidInput` when the queue is already running.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CliniSyncError::InvalidInput("On-demand queue already running".into()));
        }

        self.cancellation = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(self.config.capacity.max(1));
        *self.sender.lock() = Some(sender);

        let worker = QueueWorker {
            service: Arc::clone(&self.service),
            failures: self.failures.clone(),
            sync_timeout: self.config.sync_timeout,
        };
        let cancel = self.cancellation.clone();
        self.task_handle = Some(tokio::spawn(async move { worker.run(receiver, cancel).await }));

        info!(capacity = self.config.capacity, "On-demand sync queue started");
        Ok(())
    }

    /// Queue a sync of one entity. Returns as soon as the request is buffered.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty id or a full queue
    /// - `Disconnected` when the queue is not running
    pub fn submit(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        self.submit_with_context(kind, entity_id, CallContext::new(SyncTrigger::OnDemand))
    }

    pub fn submit_with_context(
        &self,
        kind: EntityKind,
        entity_id: &str,
        context: CallContext,
    ) -> Result<()> {
        if entity_id.trim().is_empty() {
            return Err(CliniSyncError::InvalidInput("entity id is empty".to_string()));
        }

        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(CliniSyncError::Disconnected);
        };

        let request = SyncRequest { kind, entity_id: entity_id.to_string(), context };
        sender.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(request) => CliniSyncError::InvalidInput(format!(
                "on-demand queue is full; {} {} left for reconciliation",
                request.kind, request.entity_id
            )),
            mpsc::error::TrySendError::Closed(_) => CliniSyncError::Disconnected,
        })?;
        debug!(%kind, entity_id, "Queued on-demand sync");
        Ok(())
    }

    /// Stop accepting work, finish the request in progress and drop the rest.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        self.sender.lock().take();
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(self.config.join_timeout, handle)
                .await
                .map_err(|_| CliniSyncError::Internal("On-demand queue shutdown timeout".into()))?
                .map_err(|e| CliniSyncError::Internal(format!("Task join failed: {e}")))?;
        }

        info!("On-demand sync queue stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }
}

impl Drop for OnDemandSyncQueue {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("OnDemandSyncQueue dropped while running; cancelling worker");
            self.cancellation.cancel();
        }
    }
}

struct QueueWorker {
    service: Arc<SyncService>,
    failures: broadcast::Sender<SyncFailure>,
    sync_timeout: Duration,
}

impl QueueWorker {
    async fn run(self, mut receiver: mpsc::Receiver<SyncRequest>, cancel: CancellationToken) {
        loop {
            let request = tokio::select! {
                () = cancel.cancelled() => break,
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.process(request).await;
        }

        receiver.close();
        let mut dropped = 0usize;
        while receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            info!(dropped, "On-demand queue stopped with work left for reconciliation");
        }
        debug!("On-demand queue worker exiting");
    }

    async fn process(&self, request: SyncRequest) {
        let SyncRequest { kind, entity_id, context } = request;
        let correlation_id = context.correlation_id;

        let result = tokio::time::timeout(
            self.sync_timeout,
            self.service.sync_with_context(kind, &entity_id, context),
        )
        .await
        .unwrap_or_else(|_| Err(CliniSyncError::timeout()));

        match result {
            Ok(outcome) => {
                debug!(%kind, entity_id, remote_id = %outcome.remote_id, "On-demand sync finished");
            }
            Err(error) => {
                warn!(%kind, entity_id, error = %error, "On-demand sync failed");
                // No subscribers is fine; the ledger still has the failure.
                let _ = self.failures.send(SyncFailure {
                    kind,
                    entity_id,
                    error,
                    correlation_id,
                    failed_at: Utc::now(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clinisync_core::sync::ports::RemoteResponse;
    use clinisync_core::testing::{fixtures, sample_credentials, ServiceHarness};
    use clinisync_domain::{EntitySnapshot, SyncState};
    use serde_json::json;

    use super::*;

    fn running_queue(harness: ServiceHarness) -> (OnDemandSyncQueue, HarnessParts) {
        let parts = HarnessParts { ledger: harness.ledger.clone(), api: harness.api.clone() };
        let mut queue = OnDemandSyncQueue::new(
            Arc::new(harness.service),
            OnDemandQueueConfig { sync_timeout: Duration::from_secs(5), ..Default::default() },
        );
        queue.start().unwrap();
        (queue, parts)
    }

    struct HarnessParts {
        ledger: Arc<clinisync_core::testing::InMemorySyncLedger>,
        api: Arc<clinisync_core::testing::ScriptedAccountingApi>,
    }

    #[tokio::test]
    async fn submitted_entity_is_synced_in_background() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));
        let (mut queue, parts) = running_queue(harness);

        queue.submit(EntityKind::Product, "p-1").unwrap();

        let synced = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if parts
                    .ledger
                    .record(EntityKind::Product, "p-1")
                    .is_some_and(|record| record.state == SyncState::Synced)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(synced.is_ok(), "entity was not synced");
        queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_published() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        harness.store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));
        harness.api.push_response(Ok(RemoteResponse {
            status: 400,
            body: json!({"Errors": [{"Code": "duplicated", "Message": "Code already exists"}]}),
        }));
        let (mut queue, parts) = running_queue(harness);
        let mut failures = queue.failures();

        queue.submit(EntityKind::Product, "p-1").unwrap();

        let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .expect("failure published")
            .expect("channel open");
        assert_eq!(failure.entity_id, "p-1");
        assert!(matches!(failure.error, CliniSyncError::RemoteRejected { status: 400, .. }));
        assert_eq!(parts.ledger.record(EntityKind::Product, "p-1").unwrap().state, SyncState::Error);
        assert!(!parts.api.requests().is_empty());
        queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn submit_requires_a_running_queue_and_an_id() {
        let harness = ServiceHarness::new(Some(sample_credentials()));
        let mut queue = OnDemandSyncQueue::new(Arc::new(harness.service), Default::default());

        assert!(matches!(
            queue.submit(EntityKind::Invoice, "inv-1"),
            Err(CliniSyncError::Disconnected)
        ));

        queue.start().unwrap();
        assert!(matches!(queue.submit(EntityKind::Invoice, " "), Err(CliniSyncError::InvalidInput(_))));
        assert!(queue.start().is_err());

        queue.stop().await.unwrap();
        assert!(!queue.is_running());
        assert!(matches!(
            queue.submit(EntityKind::Invoice, "inv-1"),
            Err(CliniSyncError::Disconnected)
        ));
    }
}
