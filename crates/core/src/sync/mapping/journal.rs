use clinisync_domain::{
    CliniSyncError, EntityKind, EntitySnapshot, JournalEntry, JournalType, Money, Result,
};
use serde_json::{json, Value};

use super::{
    format_date, require, truncate, wrong_variant, Dependency, EntityMapping,
    ResolvedDependencies,
};

const LINE_DESCRIPTION_LIMIT: usize = 100;

pub(super) struct JournalEntryMapping;

const fn document_id(entry_type: JournalType) -> u32 {
    match entry_type {
        JournalType::Opening => 1020,
        JournalType::Daily => 1030,
        JournalType::Closing => 1040,
        JournalType::Adjustment => 1035,
        JournalType::Payroll => 1032,
        JournalType::Depreciation => 1033,
    }
}

impl JournalEntryMapping {
    fn entry<'a>(snapshot: &'a EntitySnapshot) -> Result<&'a JournalEntry> {
        match snapshot {
            EntitySnapshot::JournalEntry(entry) => Ok(entry),
            other => Err(wrong_variant(EntityKind::JournalEntry, other)),
        }
    }
}

impl EntityMapping for JournalEntryMapping {
    fn kind(&self) -> EntityKind {
        EntityKind::JournalEntry
    }

    /// Counterparties named on the lines, once each, in line order.
    fn dependencies(&self, snapshot: &EntitySnapshot) -> Vec<Dependency> {
        let EntitySnapshot::JournalEntry(entry) = snapshot else {
            return Vec::new();
        };
        let mut dependencies: Vec<Dependency> = Vec::new();
        for counterparty in entry.lines.iter().filter_map(|line| line.counterparty.as_ref()) {
            let dependency = Dependency::Entity(counterparty.clone());
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }
        dependencies
    }

    fn validate(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let entry = Self::entry(snapshot)?;
        require(entry.lines.len() >= 2, || {
            format!("journal entry {} needs at least two lines", entry.id)
        })?;
        for (index, line) in entry.lines.iter().enumerate() {
            let one_sided = (line.debit > Money::ZERO) != (line.credit > Money::ZERO);
            require(line.debit >= Money::ZERO && line.credit >= Money::ZERO && one_sided, || {
                format!(
                    "journal entry {} line {} must carry either a debit or a credit",
                    entry.id,
                    index + 1
                )
            })?;
            if let Some(counterparty) = &line.counterparty {
                require(
                    matches!(counterparty.kind, EntityKind::Customer | EntityKind::Supplier),
                    || {
                        format!(
                            "journal entry {} line {} names a {}",
                            entry.id,
                            index + 1,
                            counterparty.kind
                        )
                    },
                )?;
            }
        }

        let (debits, credits) = (entry.total_debits(), entry.total_credits());
        if debits != credits {
            return Err(CliniSyncError::InvalidInput(format!(
                "journal entry {} is unbalanced: debits {debits} vs credits {credits}",
                entry.id
            )));
        }
        Ok(())
    }

    fn to_payload(
        &self,
        snapshot: &EntitySnapshot,
        dependencies: &ResolvedDependencies,
    ) -> Result<Value> {
        let entry = Self::entry(snapshot)?;
        let mut items = Vec::with_capacity(entry.lines.len());
        for line in &entry.lines {
            let description = line.description.as_deref().unwrap_or(&entry.description);
            let mut item = json!({
                "account": { "code": line.account_code },
                "description": truncate(description, LINE_DESCRIPTION_LIMIT),
                "debit": line.debit.to_decimal(),
                "credit": line.credit.to_decimal(),
            });
            if let Some(counterparty) = &line.counterparty {
                let resolved = dependencies.get(&Dependency::Entity(counterparty.clone()))?;
                item["customer"] =
                    json!({ "identification": resolved.reference, "branch_office": 0 });
            }
            items.push(item);
        }

        let mut payload = json!({
            "document": { "id": document_id(entry.entry_type) },
            "date": format_date(entry.date),
            "observations": entry.description,
            "items": items,
        });
        if let Some(cost_center) = &entry.cost_center {
            payload["cost_center"] = json!({ "code": cost_center });
        }
        Ok(payload)
    }
}
