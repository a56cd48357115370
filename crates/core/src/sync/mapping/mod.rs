//! Per-kind translation of local entities into remote request payloads.

mod catalogs;
mod counterparty;
mod documents;
mod journal;
mod product;
mod receipt;

use std::collections::HashMap;

use chrono::NaiveDate;
use clinisync_domain::{CliniSyncError, EntityKind, EntityRef, EntitySnapshot, Result};
use serde_json::Value;

pub use counterparty::generic_counterparty_payload;

/// Something that must exist remotely before an entity can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Entity(EntityRef),
    /// Shared final-consumer customer for sales without a named customer.
    GenericCounterparty,
}

impl Dependency {
    /// Named customer, or the generic one when there is none.
    pub fn customer(customer_id: Option<&str>) -> Self {
        match customer_id {
            Some(id) => Self::Entity(EntityRef::new(EntityKind::Customer, id)),
            None => Self::GenericCounterparty,
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(target) => target.fmt(f),
            Self::GenericCounterparty => f.write_str("generic counterparty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub remote_id: String,
    /// What the remote references the dependency by: identification for
    /// counterparties, code for products, number for invoices.
    pub reference: String,
}

#[derive(Debug, Default)]
pub struct ResolvedDependencies {
    resolved: HashMap<Dependency, ResolvedDependency>,
}

impl ResolvedDependencies {
    pub fn insert(&mut self, dependency: Dependency, resolved: ResolvedDependency) {
        self.resolved.insert(dependency, resolved);
    }

    pub fn get(&self, dependency: &Dependency) -> Result<&ResolvedDependency> {
        self.resolved.get(dependency).ok_or_else(|| {
            CliniSyncError::Internal(format!("dependency {dependency} was not resolved"))
        })
    }

    pub fn customer(&self, customer_id: Option<&str>) -> Result<&ResolvedDependency> {
        self.get(&Dependency::customer(customer_id))
    }

    pub fn invoice(&self, invoice_id: &str) -> Result<&ResolvedDependency> {
        self.get(&Dependency::Entity(EntityRef::new(EntityKind::Invoice, invoice_id)))
    }
}

/// Translation rules for one entity kind.
pub trait EntityMapping: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Entities that must be synced first.
    fn dependencies(&self, _snapshot: &EntitySnapshot) -> Vec<Dependency> {
        Vec::new()
    }

    /// Reject entities the remote would refuse, before any call is made.
    fn validate(&self, _snapshot: &EntitySnapshot) -> Result<()> {
        Ok(())
    }

    fn to_payload(
        &self,
        snapshot: &EntitySnapshot,
        dependencies: &ResolvedDependencies,
    ) -> Result<Value>;
}

pub fn mapping_for(kind: EntityKind) -> &'static dyn EntityMapping {
    match kind {
        EntityKind::Customer => &counterparty::CUSTOMER,
        EntityKind::Supplier => &counterparty::SUPPLIER,
        EntityKind::Product => &product::ProductMapping,
        EntityKind::Invoice => &documents::InvoiceMapping,
        EntityKind::CreditNote => &documents::CreditNoteMapping,
        EntityKind::PaymentReceipt => &receipt::PaymentReceiptMapping,
        EntityKind::JournalEntry => &journal::JournalEntryMapping,
    }
}

/// What other entities reference `snapshot` by on the remote side.
pub fn reference_of(snapshot: &EntitySnapshot) -> String {
    match snapshot {
        EntitySnapshot::Customer(party) | EntitySnapshot::Supplier(party) => {
            party.identification.clone()
        }
        EntitySnapshot::Product(product) => product.code.clone(),
        EntitySnapshot::Invoice(invoice) => {
            invoice.number.clone().unwrap_or_else(|| invoice.id.clone())
        }
        other => other.id().to_string(),
    }
}

fn wrong_variant(expected: EntityKind, snapshot: &EntitySnapshot) -> CliniSyncError {
    CliniSyncError::Internal(format!(
        "{expected} mapping received a {} snapshot",
        snapshot.kind()
    ))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First `max` characters of `text`.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(CliniSyncError::InvalidInput(message()))
    }
}
