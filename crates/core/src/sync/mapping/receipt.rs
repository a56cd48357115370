use clinisync_domain::{EntityKind, EntityRef, EntitySnapshot, Money, PaymentReceipt, Result};
use serde_json::{json, Value};

use super::catalogs::{payment_type_id, receipt_account};
use super::{format_date, require, wrong_variant, Dependency, EntityMapping, ResolvedDependencies};

const CASH_RECEIPT_DOCUMENT_ID: u32 = 1050;

pub(super) struct PaymentReceiptMapping;

impl PaymentReceiptMapping {
    fn receipt<'a>(snapshot: &'a EntitySnapshot) -> Result<&'a PaymentReceipt> {
        match snapshot {
            EntitySnapshot::PaymentReceipt(receipt) => Ok(receipt),
            other => Err(wrong_variant(EntityKind::PaymentReceipt, other)),
        }
    }
}

impl EntityMapping for PaymentReceiptMapping {
    fn kind(&self) -> EntityKind {
        EntityKind::PaymentReceipt
    }

    fn dependencies(&self, snapshot: &EntitySnapshot) -> Vec<Dependency> {
        match snapshot {
            EntitySnapshot::PaymentReceipt(receipt) => vec![
                Dependency::Entity(EntityRef::new(EntityKind::Invoice, receipt.invoice_id.clone())),
                Dependency::customer(receipt.customer_id.as_deref()),
            ],
            _ => Vec::new(),
        }
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let receipt = Self::receipt(snapshot)?;
        require(!receipt.invoice_id.trim().is_empty(), || {
            format!("payment receipt {} does not reference an invoice", receipt.id)
        })?;
        require(receipt.amount > Money::ZERO, || {
            format!("payment receipt {} has a non-positive amount", receipt.id)
        })
    }

    fn to_payload(
        &self,
        snapshot: &EntitySnapshot,
        dependencies: &ResolvedDependencies,
    ) -> Result<Value> {
        let receipt = Self::receipt(snapshot)?;
        let invoice = dependencies.invoice(&receipt.invoice_id)?;
        let customer = dependencies.customer(receipt.customer_id.as_deref())?;
        let customer_ref = json!({ "identification": customer.reference, "branch_office": 0 });

        let mut observations = vec![
            format!("Recibo de pago factura {}", invoice.reference),
            format!("Método: {}", receipt.payment_method),
        ];
        observations.extend(receipt.reference.iter().map(|reference| format!("Ref: {reference}")));
        observations.extend(receipt.notes.iter().cloned());

        Ok(json!({
            "document": { "id": CASH_RECEIPT_DOCUMENT_ID },
            "date": format_date(receipt.date),
            "type": "Customer",
            "customer": customer_ref,
            "observations": observations.join(". "),
            "items": [{
                "account": { "code": receipt_account(&receipt.payment_method) },
                "customer": customer_ref,
                "description": format!("Pago factura {}", invoice.reference),
                "value": receipt.amount.to_decimal(),
            }],
            "payments": [{
                "id": payment_type_id(&receipt.payment_method),
                "value": receipt.amount.to_decimal(),
                "due_date": format_date(receipt.date),
            }],
        }))
    }
}
