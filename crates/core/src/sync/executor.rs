//! Executes one remote call: session, deadline, classification, audit and
//! ledger bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clinisync_domain::{CallContext, CliniSyncError, EntityRef, FiscalStamp, Result};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::audit::{AuditRecorder, CallTrace};
use super::ports::{AccountingApi, RemoteRequest, RemoteResponse, SyncLedger};
use super::response;
use super::session::SessionManager;

/// What a call means for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallIntent {
    /// POST of a new entity; an id is expected back.
    Create,
    /// PUT of an entity that already has a remote id.
    Update,
    /// Search by natural key.
    Lookup,
    /// GET of an object already known by its remote id.
    Read,
}

impl CallIntent {
    const fn writes_ledger(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteCall {
    /// Audit operation name, e.g. `create_invoice`.
    pub operation: String,
    pub request: RemoteRequest,
    pub target: Option<EntityRef>,
    /// Remote id the target already has (updates).
    pub known_remote_id: Option<String>,
    pub intent: CallIntent,
    pub context: CallContext,
}

#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub status: u16,
    pub body: Value,
    /// Assigned id for creates and updates, first match for lookups.
    pub remote_id: Option<String>,
    pub stamp: Option<FiscalStamp>,
    pub document_name: Option<String>,
    pub duration: Duration,
}

struct Accepted {
    remote_id: Option<String>,
    stamp: Option<FiscalStamp>,
    document_name: Option<String>,
}

pub struct CallExecutor {
    api: Arc<dyn AccountingApi>,
    session: Arc<SessionManager>,
    ledger: Arc<dyn SyncLedger>,
    audit: AuditRecorder,
    call_timeout: Duration,
}

impl CallExecutor {
    pub fn new(
        api: Arc<dyn AccountingApi>,
        session: Arc<SessionManager>,
        ledger: Arc<dyn SyncLedger>,
        audit: AuditRecorder,
        call_timeout: Duration,
    ) -> Self {
        Self { api, session, ledger, audit, call_timeout }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Run `call` and record it.
    ///
    /// Session failures surface before anything is sent and leave no audit
    /// entry or ledger change. Every attempted call writes exactly one audit
    /// entry.
    ///
    /// # Errors
    /// Connectivity errors from the session, `NetworkOrTimeout` for transport
    /// failures and deadlines, `AuthRejected` for 401/403, `RemoteRejected`
    /// for other refusals.
    pub async fn execute(&self, call: RemoteCall) -> Result<CallOutcome> {
        let token = self.session.ensure_connected().await?;

        let tracked = call.target.as_ref().filter(|_| call.intent.writes_ledger());
        if let Some(target) = tracked {
            if let Err(err) = self.ledger.mark_attempting(target.kind, &target.id).await {
                warn!(entity = %target, error = %err, "Failed to stamp sync attempt");
            }
        }

        let started = Instant::now();
        let sent = tokio::time::timeout(self.call_timeout, self.api.send(&token, &call.request))
            .await
            .unwrap_or_else(|_| Err(CliniSyncError::timeout()));
        let duration = started.elapsed();

        let classified = match &sent {
            Ok(reply) => self.classify(&call, reply),
            Err(err) => Err(err.clone()),
        };

        let entry = self.audit.entry(CallTrace {
            operation: &call.operation,
            target: call.target.as_ref(),
            remote_id: classified
                .as_ref()
                .ok()
                .and_then(|accepted| accepted.remote_id.as_deref())
                .or(call.known_remote_id.as_deref()),
            request: &call.request,
            response: sent.as_ref().ok(),
            duration,
            failure: classified.as_ref().err().map(|err| (error_code(err), err.to_string())),
            stamp: classified.as_ref().ok().and_then(|accepted| accepted.stamp.clone()),
            context: &call.context,
        });
        self.audit.record(entry).await;

        match classified {
            Ok(accepted) => {
                if let (Some(target), Some(remote_id)) = (tracked, accepted.remote_id.as_deref()) {
                    if let Err(err) =
                        self.ledger.mark_synced(target.kind, &target.id, remote_id).await
                    {
                        error!(
                            entity = %target,
                            remote_id,
                            error = %err,
                            "Remote call succeeded but the ledger write failed"
                        );
                    }
                }
                debug!(operation = %call.operation, elapsed_ms = duration.as_millis(), "Remote call succeeded");
                let reply = sent?;
                Ok(CallOutcome {
                    status: reply.status,
                    body: reply.body,
                    remote_id: accepted.remote_id,
                    stamp: accepted.stamp,
                    document_name: accepted.document_name,
                    duration,
                })
            }
            Err(err) => {
                if let Some(target) = tracked {
                    let ambiguous = call.intent == CallIntent::Create
                        && matches!(err, CliniSyncError::NetworkOrTimeout(_));
                    self.write_failure(target, &err.to_string(), ambiguous).await;
                }
                warn!(operation = %call.operation, error = %err, "Remote call failed");
                Err(err)
            }
        }
    }

    /// Mark `target` synced with an id found rather than created.
    pub async fn adopt_remote_id(&self, target: &EntityRef, remote_id: &str) -> Result<()> {
        self.ledger.mark_synced(target.kind, &target.id, remote_id).await
    }

    /// Record a failure that happened before any call was sent.
    pub async fn record_failure(&self, target: &EntityRef, message: &str) {
        self.write_failure(target, message, false).await;
    }

    async fn write_failure(&self, target: &EntityRef, message: &str, ambiguous: bool) {
        if let Err(write_err) = self.ledger.mark_error(target.kind, &target.id, message).await {
            error!(entity = %target, error = %write_err, "Failed to record sync error");
        }
        if ambiguous {
            warn!(entity = %target, "Create outcome unknown; next attempt will check for a duplicate");
            if let Err(write_err) =
                self.ledger.set_outcome_unknown(target.kind, &target.id, true).await
            {
                error!(entity = %target, error = %write_err, "Failed to flag unknown create outcome");
            }
        }
    }

    fn classify(&self, call: &RemoteCall, reply: &RemoteResponse) -> Result<Accepted> {
        if reply.is_success() {
            let remote_id = match call.intent {
                CallIntent::Lookup => response::first_search_result(&reply.body),
                CallIntent::Read => call.known_remote_id.clone(),
                CallIntent::Create => Some(response::remote_id(&reply.body).ok_or_else(|| {
                    CliniSyncError::Internal(format!(
                        "remote accepted {} without returning an id",
                        call.operation
                    ))
                })?),
                CallIntent::Update => {
                    let returned = response::remote_id(&reply.body);
                    match (&call.known_remote_id, returned) {
                        (Some(known), Some(returned)) if *known != returned => {
                            error!(
                                operation = %call.operation,
                                entity = ?call.target,
                                known_remote_id = %known,
                                returned_remote_id = %returned,
                                "Remote answered an update with a different id; keeping the assigned one"
                            );
                            Some(known.clone())
                        }
                        (known, returned) => known.clone().or(returned),
                    }
                }
            };
            return Ok(Accepted {
                remote_id,
                stamp: response::fiscal_stamp(&reply.body),
                document_name: response::document_name(&reply.body),
            });
        }

        let structured = response::structured_error(&reply.body);
        let err = match reply.status {
            401 | 403 => {
                let detail = structured
                    .map(|(_, detail)| detail)
                    .unwrap_or_else(|| format!("HTTP {}", reply.status));
                self.session.invalidate(&detail);
                CliniSyncError::AuthRejected(detail)
            }
            429 => CliniSyncError::NetworkOrTimeout("rate limited".to_string()),
            status => match structured {
                Some((code, detail)) => CliniSyncError::RemoteRejected { status, code, detail },
                None if status >= 500 => CliniSyncError::NetworkOrTimeout(format!("HTTP {status}")),
                None => CliniSyncError::RemoteRejected {
                    status,
                    code: None,
                    detail: body_excerpt(&reply.body),
                },
            },
        };
        Err(err)
    }
}

/// Remote error code when the remote named one.
fn error_code(err: &CliniSyncError) -> String {
    match err {
        CliniSyncError::RemoteRejected { code: Some(code), .. } => code.clone(),
        other => other.kind_code().to_string(),
    }
}

fn body_excerpt(body: &Value) -> String {
    const MAX: usize = 300;
    let text = match body {
        Value::String(text) => text.clone(),
        Value::Null => "empty response body".to_string(),
        other => other.to_string(),
    };
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
