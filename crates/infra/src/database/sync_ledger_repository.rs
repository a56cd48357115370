//! Sync ledger repository
//!
//! One row per `(kind, entity_id)`. Every write is an upsert so callers never
//! need to create rows first, and `remote_id` is only ever filled, never
//! replaced.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use clinisync_core::SyncLedger;
use clinisync_domain::{EntityKind, KindStatusCounts, Result, SyncRecord, SyncState};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::error;

use super::columns::{optional_timestamp, tag, timestamp, to_millis, with_connection};
use super::manager::{map_sql_error, DbManager};

const RECORD_COLUMNS: &str = "kind, entity_id, remote_id, state, last_error, last_attempt_at,
     outcome_unknown, created_at, updated_at";

/// SqlCipher-based sync ledger
pub struct SqlCipherSyncLedger {
    db: Arc<DbManager>,
}

impl SqlCipherSyncLedger {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncLedger for SqlCipherSyncLedger {
    async fn get(&self, kind: EntityKind, entity_id: &str) -> Result<Option<SyncRecord>> {
        let entity_id = entity_id.to_string();
        with_connection(&self.db, move |conn| query_record(conn, kind, &entity_id)).await
    }

    async fn ensure_pending(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        let entity_id = entity_id.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            conn.execute(
                "INSERT OR IGNORE INTO sync_ledger (kind, entity_id, state, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?3)",
                params![kind.as_str(), entity_id, now],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn mark_attempting(&self, kind: EntityKind, entity_id: &str) -> Result<()> {
        let entity_id = entity_id.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            conn.execute(
                "INSERT INTO sync_ledger
                     (kind, entity_id, state, last_attempt_at, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?3, ?3)
                 ON CONFLICT (kind, entity_id) DO UPDATE SET
                     last_attempt_at = excluded.last_attempt_at,
                     updated_at = excluded.updated_at",
                params![kind.as_str(), entity_id, now],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn mark_synced(&self, kind: EntityKind, entity_id: &str, remote_id: &str) -> Result<()> {
        let entity_id = entity_id.to_string();
        let remote_id = remote_id.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let stored: String = conn
                .query_row(
                    "INSERT INTO sync_ledger
                         (kind, entity_id, remote_id, state, last_attempt_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'synced', ?4, ?4, ?4)
                     ON CONFLICT (kind, entity_id) DO UPDATE SET
                         remote_id = COALESCE(sync_ledger.remote_id, excluded.remote_id),
                         state = 'synced',
                         last_error = NULL,
                         outcome_unknown = 0,
                         last_attempt_at = excluded.last_attempt_at,
                         updated_at = excluded.updated_at
                     RETURNING remote_id",
                    params![kind.as_str(), entity_id, remote_id, now],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            if stored != remote_id {
                error!(
                    %kind,
                    entity_id = %entity_id,
                    stored_remote_id = %stored,
                    rejected_remote_id = %remote_id,
                    "Ledger already holds a different remote id; keeping it"
                );
            }
            Ok(())
        })
        .await
    }

    async fn mark_error(&self, kind: EntityKind, entity_id: &str, error: &str) -> Result<()> {
        let entity_id = entity_id.to_string();
        let error = error.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            conn.execute(
                "INSERT INTO sync_ledger
                     (kind, entity_id, state, last_error, last_attempt_at, created_at, updated_at)
                 VALUES (?1, ?2, 'error', ?3, ?4, ?4, ?4)
                 ON CONFLICT (kind, entity_id) DO UPDATE SET
                     state = 'error',
                     last_error = excluded.last_error,
                     last_attempt_at = excluded.last_attempt_at,
                     updated_at = excluded.updated_at",
                params![kind.as_str(), entity_id, error, now],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn set_outcome_unknown(
        &self,
        kind: EntityKind,
        entity_id: &str,
        unknown: bool,
    ) -> Result<()> {
        let entity_id = entity_id.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            conn.execute(
                "INSERT INTO sync_ledger
                     (kind, entity_id, state, outcome_unknown, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?4)
                 ON CONFLICT (kind, entity_id) DO UPDATE SET
                     outcome_unknown = excluded.outcome_unknown,
                     updated_at = excluded.updated_at",
                params![kind.as_str(), entity_id, unknown, now],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn list_pending(&self, kind: EntityKind, limit: usize) -> Result<Vec<SyncRecord>> {
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM sync_ledger
                 WHERE kind = ?1 AND state IN ('pending', 'error')
                 ORDER BY last_attempt_at IS NOT NULL, last_attempt_at ASC, seq ASC
                 LIMIT ?2"
            );
            query_records(conn, &sql, params![kind.as_str(), sql_limit(limit)])
        })
        .await
    }

    async fn list_errors(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM sync_ledger
                 WHERE state = 'error'
                 ORDER BY updated_at DESC, seq DESC
                 LIMIT ?1"
            );
            query_records(conn, &sql, params![sql_limit(limit)])
        })
        .await
    }

    async fn status_counts(&self) -> Result<BTreeMap<EntityKind, KindStatusCounts>> {
        with_connection(&self.db, |conn| {
            let mut stmt = conn
                .prepare("SELECT kind, state, COUNT(*) FROM sync_ledger GROUP BY kind, state")
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        tag::<EntityKind>(row, 0)?,
                        tag::<SyncState>(row, 1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(map_sql_error)?;

            let mut counts: BTreeMap<EntityKind, KindStatusCounts> = BTreeMap::new();
            for row in rows {
                let (kind, state, count) = row.map_err(map_sql_error)?;
                counts.entry(kind).or_default().record(state, count.unsigned_abs());
            }
            Ok(counts)
        })
        .await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

fn query_record(conn: &Connection, kind: EntityKind, entity_id: &str) -> Result<Option<SyncRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM sync_ledger WHERE kind = ?1 AND entity_id = ?2");
    conn.query_row(&sql, params![kind.as_str(), entity_id], map_record_row)
        .optional()
        .map_err(map_sql_error)
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SyncRecord>> {
    let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
    let rows = stmt.query_map(params, map_record_row).map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
}

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    Ok(SyncRecord {
        kind: tag(row, 0)?,
        entity_id: row.get(1)?,
        remote_id: row.get(2)?,
        state: tag(row, 3)?,
        last_error: row.get(4)?,
        last_attempt_at: optional_timestamp(row, 5)?,
        outcome_unknown: row.get(6)?,
        created_at: timestamp(row, 7)?,
        updated_at: timestamp(row, 8)?,
    })
}

/// SQLite treats a negative LIMIT as unbounded; clamp instead of wrapping.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn ledger() -> (SqlCipherSyncLedger, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DbManager::quick(&temp_dir.path().join("ledger.db"), Some(TEST_KEY)).unwrap();
        db.run_migrations().unwrap();
        let db = Arc::new(db);
        (SqlCipherSyncLedger::new(Arc::clone(&db)), db, temp_dir)
    }

    fn set_attempt(db: &DbManager, kind: EntityKind, id: &str, millis: i64) {
        db.get_connection()
            .unwrap()
            .execute(
                "UPDATE sync_ledger SET last_attempt_at = ?3 WHERE kind = ?1 AND entity_id = ?2",
                params![kind.as_str(), id, millis],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_pending_leaves_existing_rows_alone() {
        let (ledger, _db, _dir) = ledger();

        ledger.mark_error(EntityKind::Invoice, "inv-1", "timeout").await.unwrap();
        ledger.ensure_pending(EntityKind::Invoice, "inv-1").await.unwrap();

        let record = ledger.get(EntityKind::Invoice, "inv-1").await.unwrap().unwrap();
        assert_eq!(record.state, SyncState::Error);
        assert_eq!(record.last_error.as_deref(), Some("timeout"));

        ledger.ensure_pending(EntityKind::Invoice, "inv-2").await.unwrap();
        let fresh = ledger.get(EntityKind::Invoice, "inv-2").await.unwrap().unwrap();
        assert_eq!(fresh.state, SyncState::Pending);
        assert!(fresh.last_attempt_at.is_none());
    }

    #[tokio::test]
    async fn remote_id_is_written_once() {
        let (ledger, _db, _dir) = ledger();

        ledger.mark_synced(EntityKind::Customer, "c-1", "R-1").await.unwrap();
        ledger.mark_error(EntityKind::Customer, "c-1", "later failure").await.unwrap();
        ledger.mark_synced(EntityKind::Customer, "c-1", "R-2").await.unwrap();

        let record = ledger.get(EntityKind::Customer, "c-1").await.unwrap().unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("R-1"));
        assert_eq!(record.state, SyncState::Synced);
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn synced_clears_outcome_unknown() {
        let (ledger, _db, _dir) = ledger();

        ledger.mark_attempting(EntityKind::Invoice, "inv-1").await.unwrap();
        ledger.set_outcome_unknown(EntityKind::Invoice, "inv-1", true).await.unwrap();
        let flagged = ledger.get(EntityKind::Invoice, "inv-1").await.unwrap().unwrap();
        assert!(flagged.outcome_unknown);
        assert_eq!(flagged.state, SyncState::Pending);
        assert!(flagged.last_attempt_at.is_some());

        ledger.mark_synced(EntityKind::Invoice, "inv-1", "R-9").await.unwrap();
        let synced = ledger.get(EntityKind::Invoice, "inv-1").await.unwrap().unwrap();
        assert!(!synced.outcome_unknown);
    }

    #[tokio::test]
    async fn pending_order_puts_never_attempted_first() {
        let (ledger, db, _dir) = ledger();

        for id in ["a", "b", "c", "d"] {
            ledger.ensure_pending(EntityKind::Product, id).await.unwrap();
        }
        ledger.mark_synced(EntityKind::Product, "d", "R-d").await.unwrap();
        ledger.mark_error(EntityKind::Product, "a", "boom").await.unwrap();
        set_attempt(&db, EntityKind::Product, "a", 2_000);
        ledger.mark_attempting(EntityKind::Product, "c").await.unwrap();
        set_attempt(&db, EntityKind::Product, "c", 1_000);

        let ids: Vec<String> = ledger
            .list_pending(EntityKind::Product, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.entity_id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let limited = ledger.list_pending(EntityKind::Product, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert!(ledger.list_pending(EntityKind::Invoice, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn errors_and_counts() {
        let (ledger, _db, _dir) = ledger();

        ledger.mark_error(EntityKind::Invoice, "inv-1", "first").await.unwrap();
        ledger.mark_error(EntityKind::Customer, "c-1", "second").await.unwrap();
        ledger.ensure_pending(EntityKind::Invoice, "inv-2").await.unwrap();
        ledger.mark_synced(EntityKind::Invoice, "inv-3", "R-3").await.unwrap();

        let errors = ledger.list_errors(10).await.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].entity_id, "c-1");

        let counts = ledger.status_counts().await.unwrap();
        let invoices = &counts[&EntityKind::Invoice];
        assert_eq!((invoices.pending, invoices.synced, invoices.error), (1, 1, 1));
        assert_eq!(counts[&EntityKind::Customer].error, 1);
        assert!(!counts.contains_key(&EntityKind::Product));
    }
}
