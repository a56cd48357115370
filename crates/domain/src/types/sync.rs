//! Sync ledger types: entity kinds, per-entity state and status summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of local business objects mirrored to the remote
/// accounting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Product,
    Invoice,
    PaymentReceipt,
    CreditNote,
    JournalEntry,
    Supplier,
}

crate::impl_tagged_enum_conversions!(EntityKind {
    Customer => "customer",
    Product => "product",
    Invoice => "invoice",
    PaymentReceipt => "payment_receipt",
    CreditNote => "credit_note",
    JournalEntry => "journal_entry",
    Supplier => "supplier",
});

/// Where a kind lives on the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Collection path; `POST` creates, `PUT {collection}/{id}` updates.
    pub collection: &'static str,
    /// Query parameter for find-by-natural-key, when the remote offers one.
    pub natural_key_param: Option<&'static str>,
}

impl RemoteEndpoint {
    /// Path for updating an existing remote object.
    pub fn item_path(&self, remote_id: &str) -> String {
        format!("{}/{}", self.collection, remote_id)
    }
}

impl EntityKind {
    pub const ALL: [Self; 7] = [
        Self::Customer,
        Self::Supplier,
        Self::Product,
        Self::Invoice,
        Self::PaymentReceipt,
        Self::CreditNote,
        Self::JournalEntry,
    ];

    /// Remote endpoint descriptor for this kind.
    pub const fn endpoint(self) -> RemoteEndpoint {
        match self {
            // Suppliers are third parties of type "Supplier" on the same
            // collection as customers.
            Self::Customer | Self::Supplier => RemoteEndpoint {
                collection: "/v1/customers",
                natural_key_param: Some("identification"),
            },
            Self::Product => {
                RemoteEndpoint { collection: "/v1/products", natural_key_param: Some("code") }
            }
            Self::Invoice => RemoteEndpoint { collection: "/v1/invoices", natural_key_param: None },
            Self::PaymentReceipt => {
                RemoteEndpoint { collection: "/v1/vouchers", natural_key_param: None }
            }
            Self::CreditNote => {
                RemoteEndpoint { collection: "/v1/credit-notes", natural_key_param: None }
            }
            Self::JournalEntry => {
                RemoteEndpoint { collection: "/v1/journals", natural_key_param: None }
            }
        }
    }

    /// Whether the kind is a fiscal document validated by the tax authority.
    pub const fn is_fiscal_document(self) -> bool {
        matches!(self, Self::Invoice | Self::CreditNote)
    }
}

/// Reference to one local entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Per-entity synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Error,
}

crate::impl_tagged_enum_conversions!(SyncState {
    Pending => "pending",
    Synced => "synced",
    Error => "error",
});

/// Durable sync ledger row keyed by `(kind, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub kind: EntityKind,
    pub entity_id: String,
    /// Write-once remote handle.
    pub remote_id: Option<String>,
    pub state: SyncState,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set when a create call failed without a definitive answer; the
    /// remote object may exist.
    pub outcome_unknown: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.entity_id.clone())
    }

    /// Pending and errored rows are eligible for reconciliation.
    pub const fn needs_sync(&self) -> bool {
        matches!(self.state, SyncState::Pending | SyncState::Error)
    }
}

/// Ledger counts for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStatusCounts {
    pub pending: u64,
    pub synced: u64,
    pub error: u64,
}

impl KindStatusCounts {
    pub fn record(&mut self, state: SyncState, count: u64) {
        match state {
            SyncState::Pending => self.pending += count,
            SyncState::Synced => self.synced += count,
            SyncState::Error => self.error += count,
        }
    }

    pub const fn total(&self) -> u64 {
        self.pending + self.synced + self.error
    }
}

/// Remote-assigned fiscal proof for invoices and credit notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalStamp {
    /// Unique electronic invoice code issued by the tax authority.
    pub cufe: Option<String>,
    pub status: Option<String>,
    pub qr_code: Option<String>,
}

impl FiscalStamp {
    pub const fn is_empty(&self) -> bool {
        self.cufe.is_none() && self.status.is_none() && self.qr_code.is_none()
    }

    pub fn fiscal_status(&self) -> FiscalStatus {
        FiscalStatus::from_remote(self.status.as_deref())
    }
}

/// Tax-authority verdict on an issued document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiscalStatus {
    Pending,
    Accepted,
    Rejected,
}

crate::impl_tagged_enum_conversions!(FiscalStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
});

impl FiscalStatus {
    /// Reads a stamp status as the remote reports it. Anything other than a
    /// final verdict is still pending.
    pub fn from_remote(status: Option<&str>) -> Self {
        match status.map(str::to_ascii_lowercase).as_deref() {
            Some("accepted" | "approved") => Self::Accepted,
            Some("rejected") => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A fiscal document already created on the remote, as the primary store
/// knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedDocument {
    pub entity_id: String,
    pub remote_id: String,
    pub document_name: Option<String>,
    pub stamp: Option<FiscalStamp>,
}

impl IssuedDocument {
    pub fn fiscal_status(&self) -> FiscalStatus {
        self.stamp.as_ref().map_or(FiscalStatus::Pending, FiscalStamp::fiscal_status)
    }
}

/// What a successful remote create/update hands back to the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAssignment {
    pub remote_id: String,
    /// Human document number such as `FV-1-1024`.
    pub document_name: Option<String>,
    pub stamp: Option<FiscalStamp>,
}
