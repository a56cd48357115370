//! Integration tests for the serialized form of entity snapshots and ledger
//! records, which the primary store and the audit log persist as JSON.

use chrono::{NaiveDate, TimeZone, Utc};
use clinisync_domain::{
    DocumentLine, EntityKind, EntitySnapshot, Invoice, Money, SyncRecord, SyncState,
};

fn sample_invoice() -> Invoice {
    Invoice {
        id: "inv-1".into(),
        remote_id: None,
        number: Some("FV-1024".into()),
        date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        due_date: None,
        customer_id: Some("cust-7".into()),
        lines: vec![DocumentLine {
            code: "CONS-01".into(),
            description: "Consulta medicina general".into(),
            quantity: 1.0,
            unit_price: Money::from_major(60_000),
            discount: Money::ZERO,
        }],
        payment_method: "efectivo".into(),
        total: Money::from_major(60_000),
        observations: None,
        send_email: false,
    }
}

#[test]
fn snapshot_is_tagged_by_kind() {
    let snapshot = EntitySnapshot::Invoice(sample_invoice());
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["kind"], "invoice");
    assert_eq!(json["entity"]["id"], "inv-1");
    // Money is stored in minor units.
    assert_eq!(json["entity"]["total"], 6_000_000);

    let back: EntitySnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back.kind(), EntityKind::Invoice);
    assert_eq!(back.id(), "inv-1");
}

#[test]
fn sync_record_uses_storage_tags() {
    let at = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
    let record = SyncRecord {
        kind: EntityKind::PaymentReceipt,
        entity_id: "pay-3".into(),
        remote_id: None,
        state: SyncState::Error,
        last_error: Some("timeout".into()),
        last_attempt_at: Some(at),
        outcome_unknown: true,
        created_at: at,
        updated_at: at,
    };

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["kind"], "payment_receipt");
    assert_eq!(json["state"], "error");
    assert!(record.needs_sync());
    assert_eq!(record.entity_ref().to_string(), "payment_receipt:pay-3");
}
