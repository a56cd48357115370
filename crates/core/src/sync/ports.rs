//! Port interfaces for the synchronization engine

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinisync_domain::{
    AccessToken, AuditEntry, AuditQuery, Credentials, EntityKind, EntitySnapshot, HttpMethod,
    IssuedDocument, KindStatusCounts, OperationStats, RemoteAssignment, Result, SyncRecord,
};
use serde_json::Value;

/// One HTTP request to the remote accounting API, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: HttpMethod::Get, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: HttpMethod::Post, path: path.into(), query: Vec::new(), body: Some(body) }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { method: HttpMethod::Put, path: path.into(), query: Vec::new(), body: Some(body) }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Any HTTP response, successful or not. Status classification is the
/// call executor's job, not the transport's.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport to the remote accounting service.
#[async_trait]
pub trait AccountingApi: Send + Sync {
    /// Exchange credentials for an access token.
    ///
    /// Fails with `AuthRejected` when the remote refuses the credentials and
    /// `NetworkOrTimeout` when it cannot be reached.
    async fn sign_in(&self, credentials: &Credentials) -> Result<AccessToken>;

    /// Send an authenticated request. Non-2xx statuses are returned as
    /// `Ok`; only transport failures are errors (`NetworkOrTimeout`).
    async fn send(&self, token: &AccessToken, request: &RemoteRequest) -> Result<RemoteResponse>;
}

/// Durable, encrypted store of the active remote credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_active(&self) -> Result<Option<Credentials>>;

    /// Store new credentials and make them the active set.
    async fn save(&self, credentials: &Credentials) -> Result<()>;

    async fn record_sign_in(&self, at: DateTime<Utc>) -> Result<()>;
}

/// Per-entity synchronization state.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    async fn get(&self, kind: EntityKind, entity_id: &str) -> Result<Option<SyncRecord>>;

    /// Create a `Pending` row if none exists. Existing rows are untouched.
    async fn ensure_pending(&self, kind: EntityKind, entity_id: &str) -> Result<()>;

    /// Stamp the attempt time, creating a `Pending` row if none exists.
    /// The state of an existing row is unchanged.
    async fn mark_attempting(&self, kind: EntityKind, entity_id: &str) -> Result<()>;

    /// Upsert `Synced`, clear the last error and the outcome-unknown flag,
    /// and set the remote id if it was unset. A different, already-set
    /// remote id is kept.
    async fn mark_synced(&self, kind: EntityKind, entity_id: &str, remote_id: &str) -> Result<()>;

    /// Upsert `Error` with the message and the current time.
    async fn mark_error(&self, kind: EntityKind, entity_id: &str, error: &str) -> Result<()>;

    /// Flag or clear an ambiguous create outcome.
    async fn set_outcome_unknown(
        &self,
        kind: EntityKind,
        entity_id: &str,
        unknown: bool,
    ) -> Result<()>;

    /// Up to `limit` `Pending`/`Error` rows, oldest attempt first, never
    /// attempted rows before attempted ones, insertion order on ties.
    async fn list_pending(&self, kind: EntityKind, limit: usize) -> Result<Vec<SyncRecord>>;

    /// Most recent `Error` rows across all kinds.
    async fn list_errors(&self, limit: usize) -> Result<Vec<SyncRecord>>;

    async fn status_counts(&self) -> Result<BTreeMap<EntityKind, KindStatusCounts>>;
}

/// Append-only audit trail of remote calls.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;

    /// Newest first.
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>>;

    async fn operation_stats(&self, since: DateTime<Utc>) -> Result<Vec<OperationStats>>;
}

/// Read access to the primary store's business entities.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load(&self, kind: EntityKind, entity_id: &str) -> Result<Option<EntitySnapshot>>;

    /// Write the remote id (and fiscal stamp, for documents) back onto the
    /// entity. Stores without such fields may ignore it.
    async fn store_remote_assignment(
        &self,
        kind: EntityKind,
        entity_id: &str,
        assignment: &RemoteAssignment,
    ) -> Result<()>;

    /// Ids of entities of `kind` that carry no remote id, oldest first.
    async fn list_unsynced(&self, kind: EntityKind, limit: usize) -> Result<Vec<String>>;

    /// The fiscal document `entity_id` with its remote id and last known
    /// stamp. `None` when it is missing or not on the remote yet.
    async fn issued_document(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<IssuedDocument>>;

    /// Issued documents of `kind` still waiting for a tax-authority verdict,
    /// oldest first.
    async fn list_unsettled_documents(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<IssuedDocument>>;
}
