//! Batch reconciliation of one entity kind.

use std::collections::HashSet;
use std::sync::Arc;

use clinisync_domain::{CallContext, EntityKind, EntityRef, Result, SyncState, SyncTrigger};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ports::{EntityStore, SyncLedger};
use super::session::SessionManager;
use super::synchronizer::EntitySynchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another run of the same kind is still in progress.
    AlreadyRunning,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub kind: EntityKind,
    pub candidates: usize,
    pub synced: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
    /// Connectivity error that stopped the run early.
    pub aborted: Option<String>,
}

impl RunReport {
    fn new(kind: EntityKind) -> Self {
        Self { kind, candidates: 0, synced: 0, failed: 0, skipped: None, aborted: None }
    }

    fn skipped(kind: EntityKind, reason: SkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::new(kind) }
    }
}

pub struct Reconciler {
    synchronizer: Arc<EntitySynchronizer>,
    session: Arc<SessionManager>,
    ledger: Arc<dyn SyncLedger>,
    store: Arc<dyn EntityStore>,
    running: Mutex<HashSet<EntityKind>>,
}

/// Releases the per-kind run slot on drop, including when the run future
/// is cancelled by a job timeout.
struct RunSlot<'a> {
    running: &'a Mutex<HashSet<EntityKind>>,
    kind: EntityKind,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.kind);
    }
}

impl Reconciler {
    pub fn new(
        synchronizer: Arc<EntitySynchronizer>,
        session: Arc<SessionManager>,
        ledger: Arc<dyn SyncLedger>,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self { synchronizer, session, ledger, store, running: Mutex::new(HashSet::new()) }
    }

    pub fn is_running(&self, kind: EntityKind) -> bool {
        self.running.lock().contains(&kind)
    }

    /// Sync up to `batch_size` pending or failed entities of `kind`,
    /// oldest attempt first.
    ///
    /// Per-entity failures are counted and the run continues; a
    /// connectivity failure ends it.
    ///
    /// # Errors
    /// Only when candidates cannot be listed.
    pub async fn run(&self, kind: EntityKind, batch_size: usize) -> Result<RunReport> {
        let Some(_slot) = self.claim(kind) else {
            debug!(%kind, "Reconciliation already running; skipping");
            return Ok(RunReport::skipped(kind, SkipReason::AlreadyRunning));
        };
        if !self.session.is_connected() {
            debug!(%kind, "Remote session is down; skipping reconciliation");
            return Ok(RunReport::skipped(kind, SkipReason::Disconnected));
        }

        let candidates = self.candidates(kind, batch_size).await?;
        let mut report = RunReport::new(kind);
        report.candidates = candidates.len();

        for entity_id in candidates {
            let target = EntityRef::new(kind, entity_id);
            let context = CallContext::new(SyncTrigger::Scheduled);
            match self.synchronizer.sync(&target, &context).await {
                Ok(_) => report.synced += 1,
                Err(err) if err.is_connectivity() => {
                    warn!(%kind, error = %err, "Lost the remote session; ending reconciliation early");
                    report.aborted = Some(err.to_string());
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(entity = %target, error = %err, "Entity failed to sync");
                }
            }
        }

        info!(
            %kind,
            candidates = report.candidates,
            synced = report.synced,
            failed = report.failed,
            aborted = report.aborted.is_some(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    fn claim(&self, kind: EntityKind) -> Option<RunSlot<'_>> {
        self.running
            .lock()
            .insert(kind)
            .then_some(RunSlot { running: &self.running, kind })
    }

    /// Ledger rows needing sync first, then entities the ledger has not
    /// seen yet, which get a `Pending` row.
    async fn candidates(&self, kind: EntityKind, batch_size: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .ledger
            .list_pending(kind, batch_size)
            .await?
            .into_iter()
            .map(|record| record.entity_id)
            .collect();
        if ids.len() >= batch_size {
            return Ok(ids);
        }

        let mut seen: HashSet<String> = ids.iter().cloned().collect();
        for entity_id in self.store.list_unsynced(kind, batch_size).await? {
            if ids.len() >= batch_size {
                break;
            }
            if !seen.insert(entity_id.clone()) {
                continue;
            }
            match self.ledger.get(kind, &entity_id).await? {
                Some(record) if record.state == SyncState::Synced => continue,
                Some(_) => {}
                None => self.ledger.ensure_pending(kind, &entity_id).await?,
            }
            ids.push(entity_id);
        }
        Ok(ids)
    }
}
