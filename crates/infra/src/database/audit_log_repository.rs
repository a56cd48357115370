//! Audit log repository
//!
//! Insert-only. Request and response bodies arrive already redacted and are
//! stored as JSON text.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinisync_core::AuditLog;
use clinisync_domain::{AuditEntry, AuditQuery, CliniSyncError, OperationStats, Result};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use super::columns::{optional_json, optional_tag, tag, timestamp, to_millis, with_connection};
use super::manager::{map_sql_error, DbManager};
use crate::errors::InfraError;

const ENTRY_COLUMNS: &str = "id, operation, entity_kind, entity_id, remote_id, endpoint, method,
     request_body, response_code, response_body, duration_ms, success, error_code,
     error_detail, trigger, actor, correlation_id, stamp, created_at";

/// SqlCipher-based audit log
pub struct SqlCipherAuditLog {
    db: Arc<DbManager>,
}

impl SqlCipherAuditLog {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditLog for SqlCipherAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        let entry = entry.clone();
        with_connection(&self.db, move |conn| insert_entry(conn, &entry)).await
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let query = query.clone();
        with_connection(&self.db, move |conn| query_entries(conn, &query)).await
    }

    async fn operation_stats(&self, since: DateTime<Utc>) -> Result<Vec<OperationStats>> {
        with_connection(&self.db, move |conn| query_stats(conn, since)).await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

fn insert_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let request_body = encode_json(entry.request_body.as_ref())?;
    let response_body = encode_json(entry.response_body.as_ref())?;
    let stamp = encode_json(entry.stamp.as_ref())?;
    let duration_ms = i64::try_from(entry.duration_ms).unwrap_or(i64::MAX);

    conn.execute(
        &format!(
            "INSERT INTO audit_log ({ENTRY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        ),
        params![
            entry.id.to_string(),
            entry.operation,
            entry.entity_kind.map(|kind| kind.as_str()),
            entry.entity_id,
            entry.remote_id,
            entry.endpoint,
            entry.method.as_str(),
            request_body,
            entry.response_code,
            response_body,
            duration_ms,
            entry.success,
            entry.error_code,
            entry.error_detail,
            entry.trigger.as_str(),
            entry.actor,
            entry.correlation_id.to_string(),
            stamp,
            to_millis(entry.created_at),
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn query_entries(conn: &Connection, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(kind) = query.entity_kind {
        clauses.push("entity_kind = ?");
        values.push(SqlValue::Text(kind.as_str().to_string()));
    }
    if let Some(entity_id) = &query.entity_id {
        clauses.push("entity_id = ?");
        values.push(SqlValue::Text(entity_id.clone()));
    }
    if let Some(operation) = &query.operation {
        clauses.push("operation = ?");
        values.push(SqlValue::Text(operation.clone()));
    }
    if let Some(success) = query.success {
        clauses.push("success = ?");
        values.push(SqlValue::Integer(i64::from(success)));
    }
    if let Some(since) = query.since {
        clauses.push("created_at >= ?");
        values.push(SqlValue::Integer(to_millis(since)));
    }

    let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if query.limit > 0 {
        sql.push_str(" LIMIT ?");
        values.push(SqlValue::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
    let rows = stmt.query_map(params_from_iter(values), map_entry_row).map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
}

fn query_stats(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<OperationStats>> {
    let mut stmt = conn
        .prepare(
            "SELECT operation, COUNT(*), SUM(success), AVG(duration_ms)
             FROM audit_log
             WHERE created_at >= ?1
             GROUP BY operation
             ORDER BY operation",
        )
        .map_err(map_sql_error)?;

    let rows = stmt
        .query_map(params![to_millis(since)], |row| {
            let total: i64 = row.get(1)?;
            let succeeded: i64 = row.get(2)?;
            Ok(OperationStats {
                operation: row.get(0)?,
                total: total.unsigned_abs(),
                succeeded: succeeded.unsigned_abs(),
                failed: (total - succeeded).unsigned_abs(),
                avg_duration_ms: row.get(3)?,
            })
        })
        .map_err(map_sql_error)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
}

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: uuid_column(row, 0)?,
        operation: row.get(1)?,
        entity_kind: optional_tag(row, 2)?,
        entity_id: row.get(3)?,
        remote_id: row.get(4)?,
        endpoint: row.get(5)?,
        method: tag(row, 6)?,
        request_body: optional_json(row, 7)?,
        response_code: row.get(8)?,
        response_body: optional_json(row, 9)?,
        duration_ms: row.get::<_, i64>(10)?.unsigned_abs(),
        success: row.get(11)?,
        error_code: row.get(12)?,
        error_detail: row.get(13)?,
        trigger: tag(row, 14)?,
        actor: row.get(15)?,
        correlation_id: uuid_column(row, 16)?,
        stamp: optional_json(row, 17)?,
        created_at: timestamp(row, 18)?,
    })
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn encode_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| CliniSyncError::from(InfraError::from(e)))
}
