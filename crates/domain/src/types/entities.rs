//! Snapshots of the local business entities the engine reads from the
//! primary store.
//!
//! These are read-only views: the engine never mutates them except for
//! writing back a [`RemoteAssignment`](super::sync::RemoteAssignment).

use std::iter::Sum;
use std::ops::Add;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::sync::{EntityKind, EntityRef};

/// Amount in minor currency units (centavos).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole currency units.
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Decimal value for the wire. Shortest round-trip float formatting
    /// renders `12345` minor units as `123.45` exactly.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
    Person,
    Company,
}

/// Customer or supplier: a third party on the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    pub remote_id: Option<String>,
    pub person_type: PersonType,
    /// Local identification document type (`CC`, `NIT`, `CE`, ...).
    pub id_type: String,
    pub identification: String,
    pub check_digit: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// Department (state) name, used when the city is not recognized.
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub active: bool,
}

impl Counterparty {
    pub fn display_name(&self) -> String {
        match (&self.person_type, &self.company_name) {
            (PersonType::Company, Some(name)) => name.clone(),
            _ => format!("{} {}", self.first_name, self.last_name).trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Medication,
    Supply,
    Service,
    Equipment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub remote_id: Option<String>,
    /// Natural key, unique on both sides.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub unit_price: Money,
    pub track_stock: bool,
    pub active: bool,
}

/// One line of an invoice or credit note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub code: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: Money,
    pub discount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub remote_id: Option<String>,
    pub number: Option<String>,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    /// `None` bills the generic final-consumer counterparty.
    pub customer_id: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub payment_method: String,
    pub total: Money,
    pub observations: Option<String>,
    pub send_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub id: String,
    pub remote_id: Option<String>,
    /// Invoice being paid; it must reach the remote first.
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub date: NaiveDate,
    pub amount: Money,
    pub payment_method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteReason {
    Return,
    Cancellation,
    Rebate,
    PriceAdjustment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: String,
    pub remote_id: Option<String>,
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub date: NaiveDate,
    pub reason: CreditNoteReason,
    pub lines: Vec<DocumentLine>,
    pub observations: Option<String>,
    pub send_email: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalType {
    Opening,
    Daily,
    Closing,
    Adjustment,
    Payroll,
    Depreciation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_code: String,
    /// Customer or supplier the movement belongs to.
    pub counterparty: Option<EntityRef>,
    pub description: Option<String>,
    pub debit: Money,
    pub credit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub remote_id: Option<String>,
    pub entry_type: JournalType,
    pub date: NaiveDate,
    pub description: String,
    pub cost_center: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Money {
        self.lines.iter().map(|line| line.debit).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.lines.iter().map(|line| line.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// A local entity of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Customer(Counterparty),
    Supplier(Counterparty),
    Product(Product),
    Invoice(Invoice),
    PaymentReceipt(PaymentReceipt),
    CreditNote(CreditNote),
    JournalEntry(JournalEntry),
}

impl EntitySnapshot {
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Customer(_) => EntityKind::Customer,
            Self::Supplier(_) => EntityKind::Supplier,
            Self::Product(_) => EntityKind::Product,
            Self::Invoice(_) => EntityKind::Invoice,
            Self::PaymentReceipt(_) => EntityKind::PaymentReceipt,
            Self::CreditNote(_) => EntityKind::CreditNote,
            Self::JournalEntry(_) => EntityKind::JournalEntry,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Customer(c) | Self::Supplier(c) => &c.id,
            Self::Product(p) => &p.id,
            Self::Invoice(i) => &i.id,
            Self::PaymentReceipt(r) => &r.id,
            Self::CreditNote(n) => &n.id,
            Self::JournalEntry(j) => &j.id,
        }
    }

    /// Remote id stored on the entity itself, if the store keeps one.
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Customer(c) | Self::Supplier(c) => c.remote_id.as_deref(),
            Self::Product(p) => p.remote_id.as_deref(),
            Self::Invoice(i) => i.remote_id.as_deref(),
            Self::PaymentReceipt(r) => r.remote_id.as_deref(),
            Self::CreditNote(n) => n.remote_id.as_deref(),
            Self::JournalEntry(j) => j.remote_id.as_deref(),
        }
        .filter(|id| !id.is_empty())
    }

    /// Key the remote can search by, for kinds that have one.
    pub fn natural_key(&self) -> Option<&str> {
        match self {
            Self::Customer(c) | Self::Supplier(c) => Some(&c.identification),
            Self::Product(p) => Some(&p.code),
            _ => None,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(debit: i64, credit: i64) -> JournalLine {
        JournalLine {
            account_code: "11050501".into(),
            counterparty: None,
            description: None,
            debit: Money::from_minor(debit),
            credit: Money::from_minor(credit),
        }
    }

    #[test]
    fn money_renders_two_decimals() {
        assert_eq!(Money::from_minor(12_345).to_string(), "123.45");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Money::from_major(50_000).to_decimal(), 50_000.0);
        assert!((Money::from_minor(12_345).to_decimal() - 123.45).abs() < f64::EPSILON);
    }

    #[test]
    fn journal_balance_is_exact() {
        let entry = JournalEntry {
            id: "je-1".into(),
            remote_id: None,
            entry_type: JournalType::Daily,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Cierre caja".into(),
            cost_center: None,
            lines: vec![line(10_000, 0), line(0, 9_999)],
        };
        assert!(!entry.is_balanced());

        let mut fixed = entry;
        fixed.lines.push(line(0, 1));
        assert!(fixed.is_balanced());
        assert_eq!(fixed.total_debits(), Money::from_minor(10_000));
    }

    #[test]
    fn empty_remote_id_is_treated_as_absent() {
        let product = EntitySnapshot::Product(Product {
            id: "p-1".into(),
            remote_id: Some(String::new()),
            code: "MED-001".into(),
            name: "Acetaminofen 500mg".into(),
            description: None,
            category: ProductCategory::Medication,
            unit_price: Money::from_major(1_200),
            track_stock: true,
            active: true,
        });
        assert_eq!(product.remote_id(), None);
        assert_eq!(product.natural_key(), Some("MED-001"));
        assert_eq!(product.kind(), EntityKind::Product);
    }
}
