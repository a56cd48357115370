//! Builds redacted audit entries and appends them without ever failing the
//! call they describe.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clinisync_common::Redactor;
use clinisync_domain::constants::REDACTION_MARKER;
use clinisync_domain::{AuditEntry, CallContext, EntityRef, FiscalStamp};
use tracing::warn;
use uuid::Uuid;

use super::ports::{AuditLog, RemoteRequest, RemoteResponse};

/// Everything known about one finished remote call.
pub struct CallTrace<'a> {
    pub operation: &'a str,
    pub target: Option<&'a EntityRef>,
    pub remote_id: Option<&'a str>,
    pub request: &'a RemoteRequest,
    pub response: Option<&'a RemoteResponse>,
    pub duration: Duration,
    /// `(code, detail)` for failed calls.
    pub failure: Option<(String, String)>,
    pub stamp: Option<FiscalStamp>,
    pub context: &'a CallContext,
}

#[derive(Clone)]
pub struct AuditRecorder {
    log: Arc<dyn AuditLog>,
    redactor: Redactor,
}

impl AuditRecorder {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log, redactor: Redactor::new(REDACTION_MARKER) }
    }

    pub const fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn entry(&self, trace: CallTrace<'_>) -> AuditEntry {
        let success = trace.failure.is_none();
        let (error_code, error_detail) = match trace.failure {
            Some((code, detail)) => (Some(code), Some(self.redactor.redact_text(&detail))),
            None => (None, None),
        };

        AuditEntry {
            id: Uuid::now_v7(),
            operation: trace.operation.to_string(),
            entity_kind: trace.target.map(|target| target.kind),
            entity_id: trace.target.map(|target| target.id.clone()),
            remote_id: trace.remote_id.map(str::to_string),
            endpoint: endpoint_label(trace.request),
            method: trace.request.method,
            request_body: trace.request.body.as_ref().map(|body| self.redactor.redact(body)),
            response_code: trace.response.map(|response| response.status),
            response_body: trace.response.map(|response| self.redactor.redact(&response.body)),
            duration_ms: u64::try_from(trace.duration.as_millis()).unwrap_or(u64::MAX),
            success,
            error_code,
            error_detail,
            trigger: trace.context.trigger,
            actor: trace.context.actor.clone(),
            correlation_id: trace.context.correlation_id,
            stamp: trace.stamp,
            created_at: Utc::now(),
        }
    }

    /// Append the entry; a failing audit store is logged and ignored.
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.log.append(&entry).await {
            warn!(
                error = %err,
                operation = %entry.operation,
                endpoint = %entry.endpoint,
                "Failed to append audit entry"
            );
        }
    }
}

/// `path?key=value` form of the request target.
fn endpoint_label(request: &RemoteRequest) -> String {
    if request.query.is_empty() {
        return request.path.clone();
    }
    let query: Vec<String> =
        request.query.iter().map(|(key, value)| format!("{key}={value}")).collect();
    format!("{}?{}", request.path, query.join("&"))
}

#[cfg(test)]
mod tests {
    use clinisync_domain::{EntityKind, SyncTrigger};
    use serde_json::json;

    use super::*;
    use crate::testing::InMemoryAuditLog;

    #[tokio::test]
    async fn entries_are_redacted_and_labelled() {
        let log = Arc::new(InMemoryAuditLog::default());
        let recorder = AuditRecorder::new(log.clone());
        let target = EntityRef::new(EntityKind::Customer, "cust-1");
        let request = RemoteRequest::post("/v1/customers", json!({"name": ["Ana"], "token": "t"}))
            .with_query("dry", "1");
        let response = RemoteResponse { status: 201, body: json!({"id": "C1"}) };
        let context = CallContext::new(SyncTrigger::OnDemand).with_actor("nurse-7");

        let entry = recorder.entry(CallTrace {
            operation: "create_customer",
            target: Some(&target),
            remote_id: Some("C1"),
            request: &request,
            response: Some(&response),
            duration: Duration::from_millis(12),
            failure: None,
            stamp: None,
            context: &context,
        });
        recorder.record(entry).await;

        let stored = log.entries();
        assert_eq!(stored.len(), 1);
        let entry = &stored[0];
        assert!(entry.success);
        assert_eq!(entry.endpoint, "/v1/customers?dry=1");
        assert_eq!(entry.request_body.as_ref().unwrap()["token"], REDACTION_MARKER);
        assert_eq!(entry.response_code, Some(201));
        assert_eq!(entry.actor.as_deref(), Some("nurse-7"));
        assert_eq!(entry.entity_kind, Some(EntityKind::Customer));
    }

    #[tokio::test]
    async fn failing_audit_store_does_not_propagate() {
        let log = Arc::new(InMemoryAuditLog::default());
        log.fail_appends(true);
        let recorder = AuditRecorder::new(log.clone());
        let request = RemoteRequest::get("/v1/taxes");
        let context = CallContext::new(SyncTrigger::Session);

        let entry = recorder.entry(CallTrace {
            operation: "health_check",
            target: None,
            remote_id: None,
            request: &request,
            response: None,
            duration: Duration::ZERO,
            failure: Some(("network_or_timeout".into(), "timeout".into())),
            stamp: None,
            context: &context,
        });
        recorder.record(entry).await;
        assert!(log.entries().is_empty());
    }
}
