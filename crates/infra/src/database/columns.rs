//! Row decoding helpers shared by the repositories.
//!
//! Timestamps are stored as Unix milliseconds, enums as their lowercase
//! storage tag, JSON payloads as text.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinisync_domain::{CliniSyncError, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use tokio::task;

use super::manager::DbManager;
use crate::errors::InfraError;

/// Run `op` on a pooled connection in the blocking thread pool.
pub(crate) async fn with_connection<T, F>(db: &Arc<DbManager>, op: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || {
        let conn = db.get_connection()?;
        op(&conn)
    })
    .await
    .map_err(|e| CliniSyncError::from(InfraError::from(e)))?
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

pub(crate) fn optional_timestamp(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn tag<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn optional_tag<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => tag(row, idx).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn optional_json<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: DeserializeOwned,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}
