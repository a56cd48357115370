//! Domain types

pub mod audit;
pub mod entities;
pub mod session;
pub mod sync;

pub use audit::{AuditEntry, AuditQuery, CallContext, HttpMethod, OperationStats, SyncTrigger};
pub use entities::{
    Counterparty, CreditNote, CreditNoteReason, DocumentLine, EntitySnapshot, Invoice,
    JournalEntry, JournalLine, JournalType, Money, PaymentReceipt, PersonType, Product,
    ProductCategory,
};
pub use session::{AccessToken, Credentials, HealthStatus, SessionSnapshot};
pub use sync::{
    EntityKind, EntityRef, FiscalStamp, FiscalStatus, IssuedDocument, KindStatusCounts,
    RemoteAssignment, RemoteEndpoint, SyncRecord, SyncState,
};
