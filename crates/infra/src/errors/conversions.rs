//! Conversions from external infrastructure errors into domain errors.

use clinisync_common::CommonError;
use clinisync_domain::CliniSyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CliniSyncError);

impl From<InfraError> for CliniSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CliniSyncError> for InfraError {
    fn from(value: CliniSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoCliniSyncError {
    fn into_clinisync(self) -> CliniSyncError;
}

/// Messages SQLCipher produces when the key does not match the file.
pub(crate) fn looks_like_wrong_key(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("file is not a database")
        || lower.contains("file is encrypted")
        || lower.contains("notadb")
        || lower.contains("database disk image is malformed")
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CliniSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCliniSyncError for SqlError {
    fn into_clinisync(self) -> CliniSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CliniSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CliniSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        CliniSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::NotADatabase, _) => CliniSyncError::Config(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    (_, _) if looks_like_wrong_key(&message) => CliniSyncError::Config(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => CliniSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CliniSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CliniSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CliniSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => CliniSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => CliniSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_clinisync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CliniSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        let message = value.to_string();
        if looks_like_wrong_key(&message) {
            return InfraError(CliniSyncError::Config(
                "SQLCipher key rejected or database not encrypted".into(),
            ));
        }
        InfraError(CliniSyncError::Database(format!("connection pool: {message}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CliniSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCliniSyncError for HttpError {
    fn into_clinisync(self) -> CliniSyncError {
        if self.is_timeout() {
            return CliniSyncError::timeout();
        }
        if self.is_builder() {
            return CliniSyncError::SdkUnavailable(self.to_string());
        }
        if self.is_decode() {
            return CliniSyncError::Internal(format!("failed to decode remote response: {self}"));
        }
        if self.is_connect() {
            return CliniSyncError::NetworkOrTimeout(format!("connection failed: {self}"));
        }
        CliniSyncError::NetworkOrTimeout(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_clinisync())
    }
}

/* -------------------------------------------------------------------------- */
/* Misc */
/* -------------------------------------------------------------------------- */

impl From<tokio::task::JoinError> for InfraError {
    fn from(value: tokio::task::JoinError) -> Self {
        InfraError(CliniSyncError::Internal(format!("blocking task failed: {value}")))
    }
}

impl From<CommonError> for InfraError {
    fn from(value: CommonError) -> Self {
        let mapped = match value {
            CommonError::InvalidKey(message) => CliniSyncError::Config(message),
            CommonError::Decryption(message) => {
                CliniSyncError::Config(format!("stored credentials cannot be decrypted: {message}"))
            }
            other => CliniSyncError::Internal(other.to_string()),
        };
        InfraError(mapped)
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(CliniSyncError::Database(format!("stored JSON is invalid: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::ffi;

    use super::*;

    #[test]
    fn busy_sqlite_failure_maps_to_database() {
        let err = SqlError::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let mapped: CliniSyncError = InfraError::from(err).into();
        assert_eq!(mapped, CliniSyncError::Database("database is busy".into()));
    }

    #[test]
    fn wrong_key_message_maps_to_config() {
        let err = SqlError::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_ERROR),
            Some("file is not a database".into()),
        );
        let mapped: CliniSyncError = InfraError::from(err).into();
        assert!(matches!(mapped, CliniSyncError::Config(_)));
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: CliniSyncError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, CliniSyncError::NotFound(_)));
    }

    #[test]
    fn decryption_failure_is_a_configuration_problem() {
        let mapped: CliniSyncError =
            InfraError::from(CommonError::Decryption("wrong key".into())).into();
        assert!(matches!(mapped, CliniSyncError::Config(message) if message.contains("wrong key")));
    }
}
