//! Pushes one entity to the remote: dependencies first, then create or
//! update, then write the assignment back.

use std::collections::HashMap;
use std::sync::Arc;

use clinisync_domain::constants::GENERIC_COUNTERPARTY_IDENTIFICATION;
use clinisync_domain::{
    CallContext, CliniSyncError, DuplicateCreatePolicy, EntityKind, EntityRef, EntitySnapshot,
    FiscalStamp, RemoteAssignment, Result, SyncTrigger,
};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use super::executor::{CallExecutor, CallIntent, CallOutcome, RemoteCall};
use super::mapping::{
    generic_counterparty_payload, mapping_for, reference_of, Dependency, ResolvedDependencies,
    ResolvedDependency,
};
use super::ports::{EntityStore, RemoteRequest, SyncLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    /// An earlier create with an unknown outcome had in fact succeeded.
    Adopted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub target: EntityRef,
    pub remote_id: String,
    pub action: SyncAction,
    pub document_name: Option<String>,
    pub stamp: Option<FiscalStamp>,
}

/// One async lock per entity. Slots are dropped once nobody holds or waits
/// on them.
#[derive(Default)]
struct EntityLocks {
    slots: parking_lot::Mutex<HashMap<EntityRef, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    async fn acquire(&self, target: &EntityRef) -> EntityGuard<'_> {
        let slot = self.slots.lock().entry(target.clone()).or_default().clone();
        let held = slot.lock_owned().await;
        EntityGuard { locks: self, target: target.clone(), held: Some(held) }
    }
}

struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    target: EntityRef,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut slots = self.locks.slots.lock();
        if slots.get(&self.target).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.target);
        }
    }
}

pub struct EntitySynchronizer {
    executor: Arc<CallExecutor>,
    ledger: Arc<dyn SyncLedger>,
    store: Arc<dyn EntityStore>,
    policy: DuplicateCreatePolicy,
    /// Remote id of the final-consumer customer, once known. The lock also
    /// keeps two syncs from creating it twice.
    generic_counterparty: Mutex<Option<String>>,
    /// Held from the ledger read until the assignment is written back, so
    /// the scheduler, the queue and on-demand calls never create one entity
    /// twice.
    locks: EntityLocks,
}

impl EntitySynchronizer {
    pub fn new(
        executor: Arc<CallExecutor>,
        ledger: Arc<dyn SyncLedger>,
        store: Arc<dyn EntityStore>,
        policy: DuplicateCreatePolicy,
    ) -> Self {
        Self {
            executor,
            ledger,
            store,
            policy,
            generic_counterparty: Mutex::new(None),
            locks: EntityLocks::default(),
        }
    }

    /// Sync `target` and, first, anything it depends on.
    ///
    /// # Errors
    /// Connectivity errors propagate without touching the ledger. Every other
    /// failure is recorded on the target's ledger row and returned.
    #[instrument(skip_all, fields(entity = %target, correlation_id = %context.correlation_id))]
    pub async fn sync(&self, target: &EntityRef, context: &CallContext) -> Result<SyncOutcome> {
        let _guard = self.locks.acquire(target).await;
        self.sync_locked(target.clone(), context.clone()).await
    }

    /// Body of [`Self::sync`]; the caller holds the target's lock.
    fn sync_locked(&self, target: EntityRef, context: CallContext) -> BoxFuture<'_, Result<SyncOutcome>> {
        async move {
            self.executor.session().ensure_connected().await?;

            let snapshot = match self.store.load(target.kind, &target.id).await? {
                Some(snapshot) => snapshot,
                None => {
                    let err = CliniSyncError::NotFound(format!("{target} not found"));
                    self.executor.record_failure(&target, &err.to_string()).await;
                    return Err(err);
                }
            };

            let mapping = mapping_for(target.kind);
            if let Err(err) = mapping.validate(&snapshot) {
                self.executor.record_failure(&target, &err.to_string()).await;
                return Err(err);
            }

            let mut resolved = ResolvedDependencies::default();
            for dependency in mapping.dependencies(&snapshot) {
                let child = context.child(SyncTrigger::Dependency);
                match self.resolve(&dependency, &child).await {
                    Ok(found) => resolved.insert(dependency, found),
                    Err(err) if err.is_connectivity() => return Err(err),
                    Err(err) => {
                        let message = format!("dependency {dependency}: {err}");
                        self.executor.record_failure(&target, &message).await;
                        return Err(err);
                    }
                }
            }

            let payload = match mapping.to_payload(&snapshot, &resolved) {
                Ok(payload) => payload,
                Err(err) => {
                    self.executor.record_failure(&target, &err.to_string()).await;
                    return Err(err);
                }
            };

            let record = self.ledger.get(target.kind, &target.id).await?;
            let known_remote_id = snapshot
                .remote_id()
                .map(str::to_string)
                .or_else(|| record.as_ref().and_then(|record| record.remote_id.clone()));
            let endpoint = target.kind.endpoint();

            let (outcome, action) = match known_remote_id {
                Some(remote_id) => {
                    let call = RemoteCall {
                        operation: format!("update_{}", target.kind),
                        request: RemoteRequest::put(endpoint.item_path(&remote_id), payload),
                        target: Some(target.clone()),
                        known_remote_id: Some(remote_id),
                        intent: CallIntent::Update,
                        context,
                    };
                    (self.executor.execute(call).await?, SyncAction::Updated)
                }
                None => {
                    let outcome_unknown = record.as_ref().is_some_and(|record| record.outcome_unknown);
                    if outcome_unknown {
                        if let Some(adopted) = self.recover_unknown_create(&target, &snapshot, &context).await? {
                            return Ok(adopted);
                        }
                    }
                    let call = RemoteCall {
                        operation: format!("create_{}", target.kind),
                        request: RemoteRequest::post(endpoint.collection, payload),
                        target: Some(target.clone()),
                        known_remote_id: None,
                        intent: CallIntent::Create,
                        context,
                    };
                    (self.executor.execute(call).await?, SyncAction::Created)
                }
            };

            self.finish(target, outcome, action).await
        }
        .boxed()
    }

    /// A previous create may have reached the remote. Look it up by natural
    /// key where the kind has one; otherwise apply the duplicate policy.
    async fn recover_unknown_create(
        &self,
        target: &EntityRef,
        snapshot: &EntitySnapshot,
        context: &CallContext,
    ) -> Result<Option<SyncOutcome>> {
        let endpoint = target.kind.endpoint();
        if let (Some(param), Some(key)) = (endpoint.natural_key_param, snapshot.natural_key()) {
            let call = RemoteCall {
                operation: format!("find_{}", target.kind),
                request: RemoteRequest::get(endpoint.collection).with_query(param, key),
                target: Some(target.clone()),
                known_remote_id: None,
                intent: CallIntent::Lookup,
                context: context.clone(),
            };
            let found = match self.executor.execute(call).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_connectivity() => return Err(err),
                Err(err) => {
                    self.executor.record_failure(target, &err.to_string()).await;
                    return Err(err);
                }
            };
            return match found.remote_id {
                Some(remote_id) => {
                    info!(entity = %target, remote_id = %remote_id, "Adopting remote object from an earlier create");
                    self.executor.adopt_remote_id(target, &remote_id).await?;
                    let outcome = CallOutcome { remote_id: Some(remote_id), ..found };
                    self.finish(target.clone(), outcome, SyncAction::Adopted).await.map(Some)
                }
                None => {
                    debug!(entity = %target, "No remote match; the earlier create did not land");
                    Ok(None)
                }
            };
        }

        match self.policy {
            DuplicateCreatePolicy::RequireReview => {
                let err = CliniSyncError::DuplicateCreateRisk(format!(
                    "{target}: an earlier create may have succeeded; verify on the remote before retrying"
                ));
                self.executor.record_failure(target, &err.to_string()).await;
                Err(err)
            }
            DuplicateCreatePolicy::RetryCreate => {
                warn!(entity = %target, "Retrying a create whose earlier outcome is unknown; a duplicate is possible");
                Ok(None)
            }
        }
    }

    async fn finish(
        &self,
        target: EntityRef,
        outcome: CallOutcome,
        action: SyncAction,
    ) -> Result<SyncOutcome> {
        let remote_id = outcome.remote_id.ok_or_else(|| {
            CliniSyncError::Internal(format!("{target} synced without a remote id"))
        })?;
        let assignment = RemoteAssignment {
            remote_id: remote_id.clone(),
            document_name: outcome.document_name.clone(),
            stamp: outcome.stamp.clone(),
        };
        if let Err(err) = self.store.store_remote_assignment(target.kind, &target.id, &assignment).await {
            warn!(entity = %target, error = %err, "Failed to write remote assignment back to the store");
        }
        info!(entity = %target, remote_id = %remote_id, ?action, "Entity synced");
        Ok(SyncOutcome {
            target,
            remote_id,
            action,
            document_name: outcome.document_name,
            stamp: outcome.stamp,
        })
    }

    async fn resolve(&self, dependency: &Dependency, context: &CallContext) -> Result<ResolvedDependency> {
        let target = match dependency {
            Dependency::GenericCounterparty => {
                return Ok(ResolvedDependency {
                    remote_id: self.generic_counterparty_id(context).await?,
                    reference: GENERIC_COUNTERPARTY_IDENTIFICATION.to_string(),
                });
            }
            Dependency::Entity(target) => target,
        };

        let _guard = self.locks.acquire(target).await;
        let snapshot = self
            .store
            .load(target.kind, &target.id)
            .await?
            .ok_or_else(|| CliniSyncError::NotFound(format!("{target} not found")))?;
        let reference = reference_of(&snapshot);

        let known = match snapshot.remote_id() {
            Some(remote_id) => Some(remote_id.to_string()),
            None => self
                .ledger
                .get(target.kind, &target.id)
                .await?
                .and_then(|record| record.remote_id),
        };
        if let Some(remote_id) = known {
            debug!(entity = %target, "Dependency already on the remote");
            return Ok(ResolvedDependency { remote_id, reference });
        }

        let synced = self.sync_locked(target.clone(), context.clone()).await?;
        Ok(ResolvedDependency { remote_id: synced.remote_id, reference })
    }

    async fn generic_counterparty_id(&self, context: &CallContext) -> Result<String> {
        let mut cached = self.generic_counterparty.lock().await;
        if let Some(remote_id) = cached.as_ref() {
            return Ok(remote_id.clone());
        }

        let endpoint = EntityKind::Customer.endpoint();
        let lookup = RemoteCall {
            operation: "find_generic_counterparty".to_string(),
            request: RemoteRequest::get(endpoint.collection)
                .with_query("identification", GENERIC_COUNTERPARTY_IDENTIFICATION),
            target: None,
            known_remote_id: None,
            intent: CallIntent::Lookup,
            context: context.clone(),
        };
        let remote_id = match self.executor.execute(lookup).await?.remote_id {
            Some(remote_id) => remote_id,
            None => {
                info!("Creating the generic final-consumer customer");
                let create = RemoteCall {
                    operation: "create_generic_counterparty".to_string(),
                    request: RemoteRequest::post(endpoint.collection, generic_counterparty_payload()),
                    target: None,
                    known_remote_id: None,
                    intent: CallIntent::Create,
                    context: context.clone(),
                };
                self.executor.execute(create).await?.remote_id.ok_or_else(|| {
                    CliniSyncError::Internal("generic counterparty created without an id".to_string())
                })?
            }
        };

        *cached = Some(remote_id.clone());
        Ok(remote_id)
    }
}
