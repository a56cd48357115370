//! Follow-up on the tax authority's verdict for issued invoices and credit
//! notes.
//!
//! The remote validates electronic documents asynchronously. Until a final
//! verdict arrives the local stamp stays pending; each check reads the
//! document's validation errors and writes the verdict back to the store.

use std::sync::Arc;

use clinisync_domain::{
    CallContext, CliniSyncError, EntityKind, EntityRef, FiscalStamp, FiscalStatus,
    IssuedDocument, RemoteAssignment, Result, SyncTrigger,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::executor::{CallExecutor, CallIntent, RemoteCall};
use super::ports::{EntityStore, RemoteRequest};
use super::reconciler::SkipReason;
use super::response;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiscalCheck {
    pub target: EntityRef,
    pub remote_id: String,
    pub status: FiscalStatus,
    /// Validation errors the tax authority reported.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiscalRefreshReport {
    pub kind: EntityKind,
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: Option<SkipReason>,
    pub aborted: Option<String>,
}

impl FiscalRefreshReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            candidates: 0,
            accepted: 0,
            rejected: 0,
            failed: 0,
            skipped: None,
            aborted: None,
        }
    }
}

pub struct FiscalStatusRefresher {
    executor: Arc<CallExecutor>,
    store: Arc<dyn EntityStore>,
}

impl FiscalStatusRefresher {
    pub fn new(executor: Arc<CallExecutor>, store: Arc<dyn EntityStore>) -> Self {
        Self { executor, store }
    }

    /// Check up to `limit` issued documents of `kind` that have no final
    /// verdict yet.
    ///
    /// # Errors
    /// `InvalidInput` for kinds that are not fiscal documents; otherwise only
    /// when candidates cannot be listed.
    #[instrument(skip(self))]
    pub async fn refresh(&self, kind: EntityKind, limit: usize) -> Result<FiscalRefreshReport> {
        ensure_fiscal(kind)?;
        if !self.executor.session().is_connected() {
            debug!(%kind, "Remote session is down; skipping fiscal status check");
            return Ok(FiscalRefreshReport {
                skipped: Some(SkipReason::Disconnected),
                ..FiscalRefreshReport::new(kind)
            });
        }

        let documents = self.store.list_unsettled_documents(kind, limit).await?;
        let mut report = FiscalRefreshReport::new(kind);
        report.candidates = documents.len();

        let context = CallContext::new(SyncTrigger::Scheduled);
        for document in documents {
            let entity_id = document.entity_id.clone();
            match self.check_document(kind, document, &context).await {
                Ok(check) => match check.status {
                    FiscalStatus::Accepted => report.accepted += 1,
                    FiscalStatus::Rejected => report.rejected += 1,
                    FiscalStatus::Pending => {}
                },
                Err(err) if err.is_connectivity() => {
                    warn!(%kind, error = %err, "Lost the remote session; ending fiscal status check early");
                    report.aborted = Some(err.to_string());
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(%kind, entity_id = %entity_id, error = %err, "Fiscal status check failed");
                }
            }
        }

        info!(
            %kind,
            candidates = report.candidates,
            accepted = report.accepted,
            rejected = report.rejected,
            failed = report.failed,
            "Fiscal status check finished"
        );
        Ok(report)
    }

    /// Check one document now, whatever its current stamp says.
    ///
    /// # Errors
    /// `InvalidInput` for non-fiscal kinds and for documents not yet on the
    /// remote; call failures as the executor classifies them.
    pub async fn check(&self, target: &EntityRef, context: &CallContext) -> Result<FiscalCheck> {
        ensure_fiscal(target.kind)?;
        let document =
            self.store.issued_document(target.kind, &target.id).await?.ok_or_else(|| {
                CliniSyncError::InvalidInput(format!("{target} has not been issued on the remote"))
            })?;
        self.check_document(target.kind, document, context).await
    }

    async fn check_document(
        &self,
        kind: EntityKind,
        document: IssuedDocument,
        context: &CallContext,
    ) -> Result<FiscalCheck> {
        let target = EntityRef::new(kind, document.entity_id.clone());
        let path = format!("{}/errors", kind.endpoint().item_path(&document.remote_id));
        let call = RemoteCall {
            operation: format!("check_{kind}_fiscal_status"),
            request: RemoteRequest::get(path),
            target: Some(target.clone()),
            known_remote_id: Some(document.remote_id.clone()),
            intent: CallIntent::Read,
            context: context.clone(),
        };
        let outcome = self.executor.execute(call).await?;

        let errors = response::fiscal_errors(&outcome.body);
        let status =
            if errors.is_empty() { FiscalStatus::Accepted } else { FiscalStatus::Rejected };
        let stamp = FiscalStamp {
            status: Some(status.as_str().to_string()),
            ..document.stamp.unwrap_or_default()
        };
        let assignment = RemoteAssignment {
            remote_id: document.remote_id.clone(),
            document_name: document.document_name,
            stamp: Some(stamp),
        };
        self.store.store_remote_assignment(kind, &document.entity_id, &assignment).await?;

        info!(entity = %target, %status, errors = errors.len(), "Fiscal status updated");
        Ok(FiscalCheck { target, remote_id: document.remote_id, status, errors })
    }
}

fn ensure_fiscal(kind: EntityKind) -> Result<()> {
    if kind.is_fiscal_document() {
        Ok(())
    } else {
        Err(CliniSyncError::InvalidInput(format!("{kind} documents carry no fiscal status")))
    }
}

#[cfg(test)]
mod tests {
    use clinisync_domain::{EntitySnapshot, HttpMethod};
    use serde_json::json;

    use super::*;
    use crate::sync::ports::RemoteResponse;
    use crate::testing::{fixtures, Harness};

    fn refresher(harness: &Harness) -> FiscalStatusRefresher {
        FiscalStatusRefresher::new(harness.executor.clone(), harness.store.clone())
    }

    fn issued_invoice(harness: &Harness, id: &str, remote_id: &str, status: Option<&str>) {
        let mut invoice = fixtures::invoice(id, None);
        invoice.remote_id = Some(remote_id.to_string());
        harness.store.insert(EntitySnapshot::Invoice(invoice));
        if let Some(status) = status {
            let stamp = FiscalStamp {
                cufe: Some(format!("cufe-{id}")),
                status: Some(status.to_string()),
                qr_code: None,
            };
            let assignment = RemoteAssignment {
                remote_id: remote_id.to_string(),
                document_name: Some(format!("FV-{remote_id}")),
                stamp: Some(stamp),
            };
            harness.store.insert_assignment(EntityKind::Invoice, id, assignment);
        }
    }

    #[tokio::test]
    async fn pending_documents_get_their_verdict() {
        let harness = Harness::connected().await;
        issued_invoice(&harness, "inv-1", "R100", Some("Sent"));
        issued_invoice(&harness, "inv-2", "R200", None);
        issued_invoice(&harness, "inv-3", "R300", Some("Accepted"));
        harness.store.insert(EntitySnapshot::Invoice(fixtures::invoice("inv-4", None)));
        harness.api.push_response(Ok(RemoteResponse { status: 200, body: json!([]) }));
        harness.api.push_response(Ok(RemoteResponse {
            status: 200,
            body: json!([{"Code": "FAK24", "Message": "Customer address missing"}]),
        }));

        let report = refresher(&harness).refresh(EntityKind::Invoice, 50).await.unwrap();

        assert_eq!((report.candidates, report.accepted, report.rejected), (2, 1, 1));
        let paths: Vec<_> = harness.api.requests().into_iter().map(|r| (r.method, r.path)).collect();
        assert_eq!(
            paths,
            vec![
                (HttpMethod::Get, "/v1/invoices/R100/errors".to_string()),
                (HttpMethod::Get, "/v1/invoices/R200/errors".to_string()),
            ]
        );
        let accepted = harness.store.assignment(EntityKind::Invoice, "inv-1").unwrap();
        let stamp = accepted.stamp.unwrap();
        assert_eq!(stamp.fiscal_status(), FiscalStatus::Accepted);
        assert_eq!(stamp.cufe.as_deref(), Some("cufe-inv-1"));
        assert_eq!(accepted.document_name.as_deref(), Some("FV-R100"));
        let rejected = harness.store.assignment(EntityKind::Invoice, "inv-2").unwrap();
        assert_eq!(rejected.stamp.unwrap().fiscal_status(), FiscalStatus::Rejected);
        assert_eq!(harness.audit.entries_for("check_invoice_fiscal_status").len(), 2);
    }

    #[tokio::test]
    async fn check_reports_errors_and_leaves_ledger_alone() {
        let harness = Harness::connected().await;
        let mut note = fixtures::credit_note("cn-1", "inv-1", None);
        note.remote_id = Some("R-CN".into());
        harness.store.insert(EntitySnapshot::CreditNote(note));
        harness.api.push_response(Ok(RemoteResponse {
            status: 200,
            body: json!({"Errors": [{"Message": "Reference invoice not found"}]}),
        }));

        let target = EntityRef::new(EntityKind::CreditNote, "cn-1");
        let check = refresher(&harness)
            .check(&target, &CallContext::new(SyncTrigger::OnDemand))
            .await
            .unwrap();

        assert_eq!(check.status, FiscalStatus::Rejected);
        assert_eq!(check.errors, vec!["Reference invoice not found"]);
        assert_eq!(harness.api.requests()[0].path, "/v1/credit-notes/R-CN/errors");
        assert!(harness.ledger.record(EntityKind::CreditNote, "cn-1").is_none());
        let entry = &harness.audit.entries_for("check_credit_note_fiscal_status")[0];
        assert_eq!(entry.remote_id.as_deref(), Some("R-CN"));
    }

    #[tokio::test]
    async fn unissued_and_non_fiscal_targets_are_refused() {
        let harness = Harness::connected().await;
        harness.store.insert(EntitySnapshot::Invoice(fixtures::invoice("inv-1", None)));
        let refresher = refresher(&harness);
        let context = CallContext::new(SyncTrigger::OnDemand);

        let unissued = refresher.check(&EntityRef::new(EntityKind::Invoice, "inv-1"), &context).await;
        assert!(matches!(unissued, Err(CliniSyncError::InvalidInput(_))));
        let product = refresher.refresh(EntityKind::Product, 10).await;
        assert!(matches!(product, Err(CliniSyncError::InvalidInput(_))));
        assert!(harness.api.requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_lookup_counts_as_failure_and_run_continues() {
        let harness = Harness::connected().await;
        issued_invoice(&harness, "inv-1", "R100", None);
        issued_invoice(&harness, "inv-2", "R200", None);
        harness.api.push_response(Ok(RemoteResponse {
            status: 404,
            body: json!({"Errors": [{"Code": "not_found", "Message": "Invoice not found"}]}),
        }));

        let report = refresher(&harness).refresh(EntityKind::Invoice, 50).await.unwrap();

        assert_eq!((report.failed, report.accepted), (1, 1));
        assert!(harness.store.assignment(EntityKind::Invoice, "inv-1").is_none());
    }

    #[tokio::test]
    async fn disconnected_refresh_is_skipped() {
        let harness = Harness::without_credentials();
        issued_invoice(&harness, "inv-1", "R100", None);

        let report = refresher(&harness).refresh(EntityKind::Invoice, 50).await.unwrap();

        assert_eq!(report.skipped, Some(SkipReason::Disconnected));
        assert!(harness.api.requests().is_empty());
    }
}
