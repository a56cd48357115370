//! In-memory port implementations and fixtures for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clinisync_common::BackoffStrategy;
use clinisync_domain::{
    AccessToken, AuditEntry, AuditQuery, CliniSyncError, Counterparty, CreditNote,
    CreditNoteReason, Credentials, DocumentLine, DuplicateCreatePolicy, EntityKind,
    EntitySnapshot, HttpMethod, Invoice, IssuedDocument, JournalEntry, JournalLine, JournalType,
    KindStatusCounts, Money, OperationStats, PaymentReceipt, PersonType, Product,
    ProductCategory, RemoteAssignment, Result, SyncRecord, SyncState,
};
use parking_lot::Mutex;
use serde_json::json;

use crate::sync::{
    AccountingApi, AuditLog, AuditRecorder, CallExecutor, CredentialStore, EnginePorts,
    EngineSettings, EntityStore, EntitySynchronizer, Reconciler, RemoteRequest, RemoteResponse,
    SessionManager, SessionSettings, SyncLedger, SyncService,
};

pub fn sample_credentials() -> Credentials {
    Credentials {
        username: "clinic@example.com".to_string(),
        access_key: "c2VjcmV0LWFjY2Vzcy1rZXk=".to_string(),
        partner_id: Some("CliniSync".to_string()),
    }
}

/// Remote double. Scripted results are consumed first; afterwards creates
/// get fresh ids, updates echo the id in the path and searches find nothing.
#[derive(Default)]
pub struct ScriptedAccountingApi {
    sign_ins: Mutex<VecDeque<Result<AccessToken>>>,
    responses: Mutex<VecDeque<Result<RemoteResponse>>>,
    requests: Mutex<Vec<RemoteRequest>>,
    sign_in_calls: AtomicUsize,
    next_id: AtomicUsize,
    sign_in_delay: Mutex<Duration>,
    send_delay: Mutex<Duration>,
}

impl ScriptedAccountingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sign_in(&self, result: Result<AccessToken>) {
        self.sign_ins.lock().push_back(result);
    }

    pub fn push_response(&self, result: Result<RemoteResponse>) {
        self.responses.lock().push_back(result);
    }

    pub fn set_sign_in_delay(&self, delay: Duration) {
        *self.sign_in_delay.lock() = delay;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    fn default_response(&self, request: &RemoteRequest) -> RemoteResponse {
        match request.method {
            HttpMethod::Post => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                RemoteResponse { status: 201, body: json!({ "id": format!("R-{id}") }) }
            }
            HttpMethod::Put => {
                let id = request.path.rsplit('/').next().unwrap_or_default();
                RemoteResponse { status: 200, body: json!({ "id": id }) }
            }
            HttpMethod::Get if request.query.is_empty() => {
                RemoteResponse { status: 200, body: json!([]) }
            }
            HttpMethod::Get => RemoteResponse { status: 200, body: json!({ "results": [] }) },
        }
    }
}

#[async_trait]
impl AccountingApi for ScriptedAccountingApi {
    async fn sign_in(&self, _credentials: &Credentials) -> Result<AccessToken> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sign_in_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.sign_ins.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(AccessToken {
                value: "test-token".to_string(),
                expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            })
        })
    }

    async fn send(&self, _token: &AccessToken, request: &RemoteRequest) -> Result<RemoteResponse> {
        self.requests.lock().push(request.clone());
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_response(request)))
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    active: Mutex<Option<Credentials>>,
    sign_ins: Mutex<Vec<DateTime<Utc>>>,
}

impl InMemoryCredentialStore {
    pub fn new(active: Option<Credentials>) -> Self {
        Self { active: Mutex::new(active), sign_ins: Mutex::new(Vec::new()) }
    }

    pub fn saved(&self) -> Option<Credentials> {
        self.active.lock().clone()
    }

    pub fn sign_ins(&self) -> Vec<DateTime<Utc>> {
        self.sign_ins.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load_active(&self) -> Result<Option<Credentials>> {
        Ok(self.active.lock().clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.active.lock() = Some(credentials.clone());
        Ok(())
    }

    async fn record_sign_in(&self, at: DateTime<Utc>) -> Result<()> {
        self.sign_ins.lock().push(at);
        Ok(())
    }
}

/// Ledger with the same ordering and write-once rules as the SQL one.
#[derive(Default)]
pub struct InMemorySyncLedger {
    /// `(insertion sequence, record)` keyed by kind and entity id.
    rows: Mutex<BTreeMap<(EntityKind, String), (u64, SyncRecord)>>,
    sequence: AtomicUsize,
}

impl InMemorySyncLedger {
    pub fn record(&self, kind: EntityKind, entity_id: &str) -> Option<SyncRecord> {
        self.rows.lock().get(&(kind, entity_id.to_string())).map(|(_, record)| record.clone())
    }

    /// Move the last attempt (and update) time into the past.
    pub fn backdate_attempt(&self, kind: EntityKind, entity_id: &str, by: chrono::Duration) {
        if let Some((_, record)) = self.rows.lock().get_mut(&(kind, entity_id.to_string())) {
            record.last_attempt_at = record.last_attempt_at.map(|at| at - by);
            record.updated_at -= by;
        }
    }

    fn upsert(&self, kind: EntityKind, entity_id: &str, apply: impl FnOnce(&mut SyncRecord)) {
        let now = Utc::now();
        let mut rows = self.rows.lock();
        let (_, record) = rows.entry((kind, entity_id.to_string())).or_insert_with(|| {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst) as u64;
            (seq, SyncRecord {
                kind,
                entity_id: entity_id.to_string(),
                remote_id: None,
                state: SyncState::Pending,
                last_error: None,
                last_attempt_at: None,
                outcome_unknown: false,
                created_at: now,
                updated_at: now,
            })
        });
        apply(record);
        record.updated_at = now;
    }
}

#[async_trait]
impl SyncLedger for InMemorySyncLedger {
    async fn get(&self, kind: EntityKind, entity_id: &str) -> Result<Option<SyncRecord>> {
        Ok(self.record(kind, entity_id))
    }

    async fn ensure_pending(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        self.upsert(kind, entity_id, |_| {});
        Ok(())
    }

    async fn mark_attempting(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        self.upsert(kind, entity_id, |record| record.last_attempt_at = Some(Utc::now()));
        Ok(())
    }

    async fn mark_synced(&self, kind: EntityKind, entity_id: &str, remote_id: &str) -> Result<()> {
        self.upsert(kind, entity_id, |record| {
            record.state = SyncState::Synced;
            record.last_error = None;
            record.outcome_unknown = false;
            record.last_attempt_at = Some(Utc::now());
            match record.remote_id.as_deref() {
                None => record.remote_id = Some(remote_id.to_string()),
                Some(stored) if stored != remote_id => tracing::error!(
                    %kind,
                    entity_id,
                    stored_remote_id = stored,
                    rejected_remote_id = remote_id,
                    "Ledger already holds a different remote id; keeping it"
                ),
                Some(_) => {}
            }
        });
        Ok(())
    }

    async fn mark_error(&self, kind: EntityKind, entity_id: &str, error: &str) -> Result<()> {
        self.upsert(kind, entity_id, |record| {
            record.state = SyncState::Error;
            record.last_error = Some(error.to_string());
            record.last_attempt_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn set_outcome_unknown(
        &self,
        kind: EntityKind,
        entity_id: &str,
        unknown: bool,
    ) -> Result<()> {
        self.upsert(kind, entity_id, |record| record.outcome_unknown = unknown);
        Ok(())
    }

    async fn list_pending(&self, kind: EntityKind, limit: usize) -> Result<Vec<SyncRecord>> {
        let rows = self.rows.lock();
        let mut pending: Vec<&(u64, SyncRecord)> = rows
            .values()
            .filter(|(_, record)| record.kind == kind && record.needs_sync())
            .collect();
        pending.sort_by_key(|(seq, record)| {
            (record.last_attempt_at.is_some(), record.last_attempt_at, *seq)
        });
        Ok(pending.into_iter().take(limit).map(|(_, record)| record.clone()).collect())
    }

    async fn list_errors(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        let rows = self.rows.lock();
        let mut errors: Vec<&SyncRecord> = rows
            .values()
            .map(|(_, record)| record)
            .filter(|record| record.state == SyncState::Error)
            .collect();
        errors.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(errors.into_iter().take(limit).cloned().collect())
    }

    async fn status_counts(&self) -> Result<BTreeMap<EntityKind, KindStatusCounts>> {
        let mut counts: BTreeMap<EntityKind, KindStatusCounts> = BTreeMap::new();
        for (_, record) in self.rows.lock().values() {
            counts.entry(record.kind).or_default().record(record.state, 1);
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    failing: Mutex<bool>,
}

impl InMemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn entries_for(&self, operation: &str) -> Vec<AuditEntry> {
        self.entries().into_iter().filter(|entry| entry.operation == operation).collect()
    }

    /// Make every append fail, as a broken audit table would.
    pub fn fail_appends(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        if *self.failing.lock() {
            return Err(CliniSyncError::Database("audit table unavailable".to_string()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let mut matching: Vec<AuditEntry> = self
            .entries()
            .into_iter()
            .rev()
            .filter(|entry| query.entity_kind.map_or(true, |kind| entry.entity_kind == Some(kind)))
            .filter(|entry| {
                query.entity_id.as_ref().map_or(true, |id| entry.entity_id.as_ref() == Some(id))
            })
            .filter(|entry| query.operation.as_ref().map_or(true, |op| &entry.operation == op))
            .filter(|entry| query.success.map_or(true, |success| entry.success == success))
            .filter(|entry| query.since.map_or(true, |since| entry.created_at >= since))
            .collect();
        if query.limit > 0 {
            matching.truncate(query.limit);
        }
        Ok(matching)
    }

    async fn operation_stats(&self, since: DateTime<Utc>) -> Result<Vec<OperationStats>> {
        let mut grouped: BTreeMap<String, Vec<AuditEntry>> = BTreeMap::new();
        for entry in self.entries().into_iter().filter(|entry| entry.created_at >= since) {
            grouped.entry(entry.operation.clone()).or_default().push(entry);
        }
        Ok(grouped
            .into_iter()
            .map(|(operation, entries)| {
                let total = entries.len() as u64;
                let succeeded = entries.iter().filter(|entry| entry.success).count() as u64;
                let duration: u64 = entries.iter().map(|entry| entry.duration_ms).sum();
                OperationStats {
                    operation,
                    total,
                    succeeded,
                    failed: total - succeeded,
                    avg_duration_ms: duration as f64 / total as f64,
                }
            })
            .collect())
    }
}

/// Primary store double. Assignments are written back onto the snapshot.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: Mutex<Vec<EntitySnapshot>>,
    assignments: Mutex<BTreeMap<(EntityKind, String), RemoteAssignment>>,
}

impl InMemoryEntityStore {
    pub fn insert(&self, snapshot: EntitySnapshot) {
        let mut entities = self.entities.lock();
        entities.retain(|existing| existing.entity_ref() != snapshot.entity_ref());
        entities.push(snapshot);
    }

    pub fn assignment(&self, kind: EntityKind, entity_id: &str) -> Option<RemoteAssignment> {
        self.assignments.lock().get(&(kind, entity_id.to_string())).cloned()
    }

    /// Seed an assignment as an earlier sync would have written it.
    pub fn insert_assignment(&self, kind: EntityKind, entity_id: &str, assignment: RemoteAssignment) {
        self.assignments.lock().insert((kind, entity_id.to_string()), assignment);
    }

    fn issued(&self, kind: EntityKind, entity_id: &str, remote_id: String) -> IssuedDocument {
        let assignment = self.assignment(kind, entity_id);
        IssuedDocument {
            entity_id: entity_id.to_string(),
            remote_id,
            document_name: assignment.as_ref().and_then(|a| a.document_name.clone()),
            stamp: assignment.and_then(|a| a.stamp),
        }
    }
}

fn set_remote_id(snapshot: &mut EntitySnapshot, remote_id: &str) {
    let slot = match snapshot {
        EntitySnapshot::Customer(party) | EntitySnapshot::Supplier(party) => &mut party.remote_id,
        EntitySnapshot::Product(product) => &mut product.remote_id,
        EntitySnapshot::Invoice(invoice) => &mut invoice.remote_id,
        EntitySnapshot::PaymentReceipt(receipt) => &mut receipt.remote_id,
        EntitySnapshot::CreditNote(note) => &mut note.remote_id,
        EntitySnapshot::JournalEntry(entry) => &mut entry.remote_id,
    };
    *slot = Some(remote_id.to_string());
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn load(&self, kind: EntityKind, entity_id: &str) -> Result<Option<EntitySnapshot>> {
        Ok(self
            .entities
            .lock()
            .iter()
            .find(|snapshot| snapshot.kind() == kind && snapshot.id() == entity_id)
            .cloned())
    }

    async fn store_remote_assignment(
        &self,
        kind: EntityKind,
        entity_id: &str,
        assignment: &RemoteAssignment,
    ) -> Result<()> {
        if let Some(snapshot) = self
            .entities
            .lock()
            .iter_mut()
            .find(|snapshot| snapshot.kind() == kind && snapshot.id() == entity_id)
        {
            set_remote_id(snapshot, &assignment.remote_id);
        }
        self.assignments.lock().insert((kind, entity_id.to_string()), assignment.clone());
        Ok(())
    }

    async fn list_unsynced(&self, kind: EntityKind, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .entities
            .lock()
            .iter()
            .filter(|snapshot| snapshot.kind() == kind && snapshot.remote_id().is_none())
            .take(limit)
            .map(|snapshot| snapshot.id().to_string())
            .collect())
    }

    async fn issued_document(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<IssuedDocument>> {
        let remote_id = self
            .entities
            .lock()
            .iter()
            .find(|snapshot| snapshot.kind() == kind && snapshot.id() == entity_id)
            .and_then(|snapshot| snapshot.remote_id().map(str::to_string));
        Ok(remote_id.map(|remote_id| self.issued(kind, entity_id, remote_id)))
    }

    async fn list_unsettled_documents(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<IssuedDocument>> {
        let issued: Vec<(String, String)> = self
            .entities
            .lock()
            .iter()
            .filter(|snapshot| snapshot.kind() == kind)
            .filter_map(|snapshot| {
                snapshot.remote_id().map(|remote_id| (snapshot.id().to_string(), remote_id.to_string()))
            })
            .collect();
        Ok(issued
            .into_iter()
            .map(|(entity_id, remote_id)| self.issued(kind, &entity_id, remote_id))
            .filter(|document| !document.fiscal_status().is_final())
            .take(limit)
            .collect())
    }
}

fn test_session_settings() -> SessionSettings {
    SessionSettings {
        max_reconnect_attempts: 5,
        backoff: BackoffStrategy::Fixed(Duration::ZERO),
        call_timeout: Duration::from_secs(5),
    }
}

/// Engine components wired over in-memory ports.
pub struct Harness {
    pub api: Arc<ScriptedAccountingApi>,
    pub ledger: Arc<InMemorySyncLedger>,
    pub audit: Arc<InMemoryAuditLog>,
    pub store: Arc<InMemoryEntityStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub session: Arc<SessionManager>,
    pub executor: Arc<CallExecutor>,
    pub synchronizer: Arc<EntitySynchronizer>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn build(credentials: Option<Credentials>, policy: DuplicateCreatePolicy) -> Self {
        let api = Arc::new(ScriptedAccountingApi::new());
        let ledger = Arc::new(InMemorySyncLedger::default());
        let audit = Arc::new(InMemoryAuditLog::default());
        let store = Arc::new(InMemoryEntityStore::default());
        let credentials = Arc::new(InMemoryCredentialStore::new(credentials));
        let recorder = AuditRecorder::new(audit.clone());

        let session = Arc::new(SessionManager::new(
            api.clone(),
            credentials.clone(),
            recorder.clone(),
            test_session_settings(),
        ));
        let executor = Arc::new(CallExecutor::new(
            api.clone(),
            session.clone(),
            ledger.clone(),
            recorder,
            Duration::from_secs(5),
        ));
        let synchronizer =
            Arc::new(EntitySynchronizer::new(executor.clone(), ledger.clone(), store.clone(), policy));
        let reconciler = Arc::new(Reconciler::new(
            synchronizer.clone(),
            session.clone(),
            ledger.clone(),
            store.clone(),
        ));

        Self { api, ledger, audit, store, credentials, session, executor, synchronizer, reconciler }
    }

    pub fn without_credentials() -> Self {
        Self::build(None, DuplicateCreatePolicy::default())
    }

    pub async fn connected() -> Self {
        Self::connected_with_policy(DuplicateCreatePolicy::default()).await
    }

    /// Signed in, with the sign-in audit entry already cleared away.
    pub async fn connected_with_policy(policy: DuplicateCreatePolicy) -> Self {
        let harness = Self::build(Some(sample_credentials()), policy);
        if let Err(err) = harness.session.connect().await {
            panic!("scripted sign-in failed: {err}");
        }
        harness.audit.entries.lock().clear();
        harness
    }
}

/// A full [`SyncService`] over in-memory ports.
pub struct ServiceHarness {
    pub api: Arc<ScriptedAccountingApi>,
    pub ledger: Arc<InMemorySyncLedger>,
    pub audit: Arc<InMemoryAuditLog>,
    pub store: Arc<InMemoryEntityStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub service: SyncService,
}

impl ServiceHarness {
    pub fn new(credentials: Option<Credentials>) -> Self {
        let api = Arc::new(ScriptedAccountingApi::new());
        let ledger = Arc::new(InMemorySyncLedger::default());
        let audit = Arc::new(InMemoryAuditLog::default());
        let store = Arc::new(InMemoryEntityStore::default());
        let credentials = Arc::new(InMemoryCredentialStore::new(credentials));
        let service = SyncService::new(
            EnginePorts {
                api: api.clone(),
                credentials: credentials.clone(),
                ledger: ledger.clone(),
                audit_log: audit.clone(),
                store: store.clone(),
            },
            EngineSettings {
                session: test_session_settings(),
                call_timeout: Duration::from_secs(5),
                duplicate_create_policy: DuplicateCreatePolicy::default(),
                pending_errors_limit: 50,
            },
        );
        Self { api, ledger, audit, store, credentials, service }
    }
}

/// Valid entities with predictable values.
pub mod fixtures {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap_or_default()
    }

    fn line(code: &str, description: &str, unit_price: i64) -> DocumentLine {
        DocumentLine {
            code: code.to_string(),
            description: description.to_string(),
            quantity: 1.0,
            unit_price: Money::from_minor(unit_price),
            discount: Money::ZERO,
        }
    }

    pub fn counterparty(id: &str, identification: &str) -> Counterparty {
        Counterparty {
            id: id.to_string(),
            remote_id: None,
            person_type: PersonType::Person,
            id_type: "CC".to_string(),
            identification: identification.to_string(),
            check_digit: None,
            first_name: "Ana".to_string(),
            last_name: "Gómez".to_string(),
            company_name: None,
            address: Some("Calle 10 # 5-20".to_string()),
            city: Some("Bogotá".to_string()),
            department: Some("Bogotá".to_string()),
            phone: None,
            email: Some("ana@example.com".to_string()),
            active: true,
        }
    }

    pub fn product(id: &str, code: &str) -> Product {
        Product {
            id: id.to_string(),
            remote_id: None,
            code: code.to_string(),
            name: "Acetaminofén 500mg".to_string(),
            description: None,
            category: ProductCategory::Medication,
            unit_price: Money::from_minor(350_000),
            track_stock: true,
            active: true,
        }
    }

    pub fn invoice(id: &str, customer_id: Option<&str>) -> Invoice {
        Invoice {
            id: id.to_string(),
            remote_id: None,
            number: Some(format!("FV-{id}")),
            date: date(1),
            due_date: None,
            customer_id: customer_id.map(str::to_string),
            lines: vec![line("SRV-CONSULTA", "Consulta medicina general", 8_000_000)],
            payment_method: "Efectivo".to_string(),
            total: Money::from_minor(8_000_000),
            observations: None,
            send_email: false,
        }
    }

    pub fn payment_receipt(id: &str, invoice_id: &str, customer_id: Option<&str>) -> PaymentReceipt {
        PaymentReceipt {
            id: id.to_string(),
            remote_id: None,
            invoice_id: invoice_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            date: date(2),
            amount: Money::from_minor(8_000_000),
            payment_method: "Efectivo".to_string(),
            reference: None,
            notes: None,
        }
    }

    pub fn credit_note(id: &str, invoice_id: &str, customer_id: Option<&str>) -> CreditNote {
        CreditNote {
            id: id.to_string(),
            remote_id: None,
            invoice_id: invoice_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            date: date(3),
            reason: CreditNoteReason::Return,
            lines: vec![line("SRV-CONSULTA", "Consulta medicina general", 8_000_000)],
            observations: None,
            send_email: false,
        }
    }

    pub fn journal_entry(id: &str) -> JournalEntry {
        JournalEntry {
            id: id.to_string(),
            remote_id: None,
            entry_type: JournalType::Daily,
            date: date(4),
            description: "Ventas del día".to_string(),
            cost_center: None,
            lines: vec![
                JournalLine {
                    account_code: "11050501".to_string(),
                    counterparty: None,
                    description: None,
                    debit: Money::from_minor(10_000),
                    credit: Money::ZERO,
                },
                JournalLine {
                    account_code: "41750501".to_string(),
                    counterparty: None,
                    description: None,
                    debit: Money::ZERO,
                    credit: Money::from_minor(10_000),
                },
            ],
        }
    }
}
