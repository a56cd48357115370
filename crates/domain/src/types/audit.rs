//! Audit log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::sync::{EntityKind, FiscalStamp};

/// HTTP verb of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

crate::impl_tagged_enum_conversions!(HttpMethod {
    Get => "get",
    Post => "post",
    Put => "put",
});

impl HttpMethod {
    /// Safe to resend without side effects on the remote.
    pub const fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Put)
    }
}

/// What caused a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Reconciliation run.
    Scheduled,
    /// Direct `sync_now` or the on-demand queue.
    OnDemand,
    /// A dependent entity pulled this one in.
    Dependency,
    /// Session sign-in or health check.
    Session,
}

crate::impl_tagged_enum_conversions!(SyncTrigger {
    Scheduled => "scheduled",
    OnDemand => "on_demand",
    Dependency => "dependency",
    Session => "session",
});

/// Who and what an attempt runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub trigger: SyncTrigger,
    /// Application user that caused the mutation, when known.
    pub actor: Option<String>,
    /// Correlates every call made by one run or one `sync_now`.
    pub correlation_id: Uuid,
}

impl CallContext {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self { trigger, actor: None, correlation_id: Uuid::now_v7() }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Same correlation and actor, different trigger.
    #[must_use]
    pub fn child(&self, trigger: SyncTrigger) -> Self {
        Self { trigger, actor: self.actor.clone(), correlation_id: self.correlation_id }
    }
}

/// One remote call attempt. Insert-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub operation: String,
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub remote_id: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    /// Redacted before the entry is built.
    pub request_body: Option<Value>,
    /// `None` when no HTTP response was received.
    pub response_code: Option<u16>,
    pub response_body: Option<Value>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub trigger: SyncTrigger,
    pub actor: Option<String>,
    pub correlation_id: Uuid,
    pub stamp: Option<FiscalStamp>,
    pub created_at: DateTime<Utc>,
}

/// Filter for audit queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub operation: Option<String>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    /// Zero means no limit.
    pub limit: usize,
}

/// Per-operation call statistics over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
}
