//! Electronic sales documents: invoices and credit notes.

use clinisync_domain::{
    CliniSyncError, CreditNote, CreditNoteReason, DocumentLine, EntityKind, EntityRef,
    EntitySnapshot, Invoice, Money, Result,
};
use serde_json::{json, Value};

use super::catalogs::payment_type_id;
use super::{
    format_date, require, truncate, wrong_variant, Dependency, EntityMapping,
    ResolvedDependencies,
};

const INVOICE_DOCUMENT_ID: u32 = 24;
const CREDIT_NOTE_DOCUMENT_ID: u32 = 25;
const DEFAULT_SELLER_ID: u32 = 1;
const ITEM_DESCRIPTION_LIMIT: usize = 500;

pub(super) struct InvoiceMapping;

pub(super) struct CreditNoteMapping;

fn items(lines: &[DocumentLine]) -> Vec<Value> {
    lines
        .iter()
        .map(|line| {
            json!({
                "code": line.code,
                "description": truncate(&line.description, ITEM_DESCRIPTION_LIMIT),
                "quantity": line.quantity,
                "price": line.unit_price.to_decimal(),
                "discount": line.discount.to_decimal(),
                "taxes": [],
            })
        })
        .collect()
}

fn validate_lines(owner: &EntityRef, lines: &[DocumentLine]) -> Result<()> {
    require(!lines.is_empty(), || format!("{owner} has no lines"))?;
    for (index, line) in lines.iter().enumerate() {
        require(line.quantity > 0.0, || {
            format!("{owner} line {} has a non-positive quantity", index + 1)
        })?;
        require(line.unit_price.minor() >= 0 && line.discount.minor() >= 0, || {
            format!("{owner} line {} has a negative amount", index + 1)
        })?;
    }
    Ok(())
}

impl InvoiceMapping {
    fn invoice<'a>(snapshot: &'a EntitySnapshot) -> Result<&'a Invoice> {
        match snapshot {
            EntitySnapshot::Invoice(invoice) => Ok(invoice),
            other => Err(wrong_variant(EntityKind::Invoice, other)),
        }
    }
}

impl EntityMapping for InvoiceMapping {
    fn kind(&self) -> EntityKind {
        EntityKind::Invoice
    }

    fn dependencies(&self, snapshot: &EntitySnapshot) -> Vec<Dependency> {
        match snapshot {
            EntitySnapshot::Invoice(invoice) => {
                vec![Dependency::customer(invoice.customer_id.as_deref())]
            }
            _ => Vec::new(),
        }
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let invoice = Self::invoice(snapshot)?;
        validate_lines(&snapshot.entity_ref(), &invoice.lines)?;
        require(invoice.total > Money::ZERO, || format!("invoice {} has no total", invoice.id))
    }

    fn to_payload(
        &self,
        snapshot: &EntitySnapshot,
        dependencies: &ResolvedDependencies,
    ) -> Result<Value> {
        let invoice = Self::invoice(snapshot)?;
        let customer = dependencies.customer(invoice.customer_id.as_deref())?;

        Ok(json!({
            "document": { "id": INVOICE_DOCUMENT_ID },
            "date": format_date(invoice.date),
            "customer": { "identification": customer.reference, "branch_office": 0 },
            "seller": DEFAULT_SELLER_ID,
            "observations": invoice.observations,
            "items": items(&invoice.lines),
            "payments": [{
                "id": payment_type_id(&invoice.payment_method),
                "value": invoice.total.to_decimal(),
                "due_date": format_date(invoice.due_date.unwrap_or(invoice.date)),
            }],
            "stamp": { "send": true },
            "mail": { "send": invoice.send_email },
        }))
    }
}

/// Correction concept codes of the tax authority.
const fn reason_code(reason: CreditNoteReason) -> u8 {
    match reason {
        CreditNoteReason::Return => 1,
        CreditNoteReason::Cancellation => 2,
        CreditNoteReason::Rebate => 3,
        CreditNoteReason::PriceAdjustment => 4,
        CreditNoteReason::Other => 5,
    }
}

impl CreditNoteMapping {
    fn note<'a>(snapshot: &'a EntitySnapshot) -> Result<&'a CreditNote> {
        match snapshot {
            EntitySnapshot::CreditNote(note) => Ok(note),
            other => Err(wrong_variant(EntityKind::CreditNote, other)),
        }
    }
}

impl EntityMapping for CreditNoteMapping {
    fn kind(&self) -> EntityKind {
        EntityKind::CreditNote
    }

    fn dependencies(&self, snapshot: &EntitySnapshot) -> Vec<Dependency> {
        match snapshot {
            EntitySnapshot::CreditNote(note) => vec![
                Dependency::Entity(EntityRef::new(EntityKind::Invoice, note.invoice_id.clone())),
                Dependency::customer(note.customer_id.as_deref()),
            ],
            _ => Vec::new(),
        }
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let note = Self::note(snapshot)?;
        if note.invoice_id.trim().is_empty() {
            return Err(CliniSyncError::InvalidInput(format!(
                "credit note {} does not reference an invoice",
                note.id
            )));
        }
        validate_lines(&snapshot.entity_ref(), &note.lines)
    }

    fn to_payload(
        &self,
        snapshot: &EntitySnapshot,
        dependencies: &ResolvedDependencies,
    ) -> Result<Value> {
        let note = Self::note(snapshot)?;
        let invoice = dependencies.invoice(&note.invoice_id)?;
        let customer = dependencies.customer(note.customer_id.as_deref())?;

        let mut observations = format!("Ref. Factura: {}", invoice.reference);
        if let Some(extra) = &note.observations {
            observations.push_str(". ");
            observations.push_str(extra);
        }

        Ok(json!({
            "document": { "id": CREDIT_NOTE_DOCUMENT_ID },
            "date": format_date(note.date),
            "invoice": invoice.remote_id,
            "customer": { "identification": customer.reference, "branch_office": 0 },
            "reason": reason_code(note.reason),
            "observations": observations,
            "items": items(&note.lines),
            "stamp": { "send": true },
            "mail": { "send": note.send_email },
        }))
    }
}
