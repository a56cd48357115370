//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Read a `.env` file into the environment when one exists
//! 2. Load from `CLINISYNC_*` environment variables
//! 3. If `CLINISYNC_DB_PATH` is missing, fall back to a config file
//! 4. Look for the file in several places, JSON or TOML
//!
//! Every loaded configuration is validated before it is returned.
//!
//! ## Environment Variables
//! Only `CLINISYNC_DB_PATH` is required; everything else has a default.
//! - `CLINISYNC_DB_PATH`, `CLINISYNC_DB_POOL_SIZE`, `CLINISYNC_DB_ENCRYPTION_KEY`
//! - `CLINISYNC_REMOTE_BASE_URL`, `CLINISYNC_REMOTE_AUTH_URL`, `CLINISYNC_PARTNER_ID`
//! - `CLINISYNC_REQUEST_TIMEOUT_SECS`, `CLINISYNC_CREDENTIAL_KEY`
//! - `CLINISYNC_HEALTH_CHECK_INTERVAL_SECS`, `CLINISYNC_MAX_RECONNECT_ATTEMPTS`
//! - `CLINISYNC_RECONNECT_DELAY_MS`, `CLINISYNC_RECONNECT_MAX_DELAY_MS`
//! - `CLINISYNC_JOB_TIMEOUT_SECS`, `CLINISYNC_DUPLICATE_CREATE_POLICY`
//!   (`retry_create` or `require_review`)
//! - `CLINISYNC_LOG_LEVEL`, `CLINISYNC_LOG_JSON`
//!
//! Per-kind cadences are only configurable from a file (`[[sync.schedules]]`).
//!
//! ## File Locations
//! The loader looks, in order, in the working directory, its two parents and
//! the executable's directory for `config.{json,toml}` and
//! `clinisync.{json,toml}`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clinisync_domain::{
    CliniSyncError, Config, DatabaseConfig, DuplicateCreatePolicy, LoggingConfig, RemoteConfig,
    Result, SyncConfig,
};

const FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "clinisync.json", "clinisync.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// `CliniSyncError::Config` when neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `CLINISYNC_*` environment variables
///
/// # Errors
/// `CliniSyncError::Config` if `CLINISYNC_DB_PATH` is missing or a value
/// does not parse.
pub fn load_from_env() -> Result<Config> {
    let remote_defaults = RemoteConfig::default();
    let sync_defaults = SyncConfig::default();
    let logging_defaults = LoggingConfig::default();

    let config = Config {
        database: DatabaseConfig {
            path: env_var("CLINISYNC_DB_PATH")?,
            pool_size: env_parse("CLINISYNC_DB_POOL_SIZE")?
                .unwrap_or(clinisync_domain::constants::DEFAULT_POOL_SIZE),
            encryption_key: env_opt("CLINISYNC_DB_ENCRYPTION_KEY"),
        },
        remote: RemoteConfig {
            base_url: env_opt("CLINISYNC_REMOTE_BASE_URL").unwrap_or(remote_defaults.base_url),
            auth_url: env_opt("CLINISYNC_REMOTE_AUTH_URL").unwrap_or(remote_defaults.auth_url),
            partner_id: env_opt("CLINISYNC_PARTNER_ID").unwrap_or(remote_defaults.partner_id),
            request_timeout_secs: env_parse("CLINISYNC_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(remote_defaults.request_timeout_secs),
            credential_key: env_opt("CLINISYNC_CREDENTIAL_KEY"),
        },
        sync: SyncConfig {
            health_check_interval_secs: env_parse("CLINISYNC_HEALTH_CHECK_INTERVAL_SECS")?
                .unwrap_or(sync_defaults.health_check_interval_secs),
            max_reconnect_attempts: env_parse("CLINISYNC_MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or(sync_defaults.max_reconnect_attempts),
            reconnect_delay_ms: env_parse("CLINISYNC_RECONNECT_DELAY_MS")?
                .unwrap_or(sync_defaults.reconnect_delay_ms),
            reconnect_max_delay_ms: env_parse("CLINISYNC_RECONNECT_MAX_DELAY_MS")?
                .unwrap_or(sync_defaults.reconnect_max_delay_ms),
            job_timeout_secs: env_parse("CLINISYNC_JOB_TIMEOUT_SECS")?
                .unwrap_or(sync_defaults.job_timeout_secs),
            duplicate_create_policy: env_policy("CLINISYNC_DUPLICATE_CREATE_POLICY")?
                .unwrap_or(sync_defaults.duplicate_create_policy),
            schedules: sync_defaults.schedules,
            fiscal_status: sync_defaults.fiscal_status,
        },
        logging: LoggingConfig {
            level: env_opt("CLINISYNC_LOG_LEVEL").unwrap_or(logging_defaults.level),
            json: env_bool("CLINISYNC_LOG_JSON", logging_defaults.json),
        },
    };

    validate(&config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. Format follows the
/// extension (`.json` or `.toml`).
///
/// # Errors
/// `CliniSyncError::Config` if the file is missing, malformed or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CliniSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => find_config_file().ok_or_else(|| {
            CliniSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CliniSyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    validate(&config)?;
    Ok(config)
}

/// Reject values the engine cannot run with.
///
/// # Errors
/// `CliniSyncError::Config` naming the first offending field.
pub fn validate(config: &Config) -> Result<()> {
    let invalid = |message: String| Err(CliniSyncError::Config(message));

    if config.database.path.trim().is_empty() {
        return invalid("database.path is empty".into());
    }
    if config.database.pool_size == 0 {
        return invalid("database.pool_size must be at least 1".into());
    }
    if config.remote.request_timeout_secs == 0 {
        return invalid("remote.request_timeout_secs must be at least 1".into());
    }
    if config.sync.max_reconnect_attempts == 0 {
        return invalid("sync.max_reconnect_attempts must be at least 1".into());
    }
    if config.sync.reconnect_max_delay_ms < config.sync.reconnect_delay_ms {
        return invalid("sync.reconnect_max_delay_ms is below sync.reconnect_delay_ms".into());
    }
    for url in [&config.remote.base_url, &config.remote.auth_url] {
        if let Err(e) = url::Url::parse(url) {
            return invalid(format!("invalid remote URL {url:?}: {e}"));
        }
    }
    for schedule in &config.sync.schedules {
        if schedule.batch_size == 0 {
            return invalid(format!("sync.schedules[{}].batch_size must be at least 1", schedule.kind));
        }
        if schedule.cron.split_whitespace().count() != 6 {
            return invalid(format!(
                "sync.schedules[{}].cron {:?} needs six fields (sec min hour day month weekday)",
                schedule.kind, schedule.cron
            ));
        }
    }
    let fiscal = &config.sync.fiscal_status;
    if fiscal.batch_size == 0 {
        return invalid("sync.fiscal_status.batch_size must be at least 1".into());
    }
    if fiscal.cron.split_whitespace().count() != 6 {
        return invalid(format!(
            "sync.fiscal_status.cron {:?} needs six fields (sec min hour day month weekday)",
            fiscal.cron
        ));
    }
    Ok(())
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CliniSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CliniSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CliniSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        CliniSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Set and non-blank.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CliniSyncError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

fn env_policy(key: &str) -> Result<Option<DuplicateCreatePolicy>> {
    env_opt(key)
        .map(|raw| {
            serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase()))
                .map_err(|_| {
                    CliniSyncError::Config(format!(
                        "Invalid value for {key}: {raw:?} (expected retry_create or require_review)"
                    ))
                })
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use clinisync_domain::EntityKind;
    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 15] = [
        "CLINISYNC_DB_PATH",
        "CLINISYNC_DB_POOL_SIZE",
        "CLINISYNC_DB_ENCRYPTION_KEY",
        "CLINISYNC_REMOTE_BASE_URL",
        "CLINISYNC_REMOTE_AUTH_URL",
        "CLINISYNC_PARTNER_ID",
        "CLINISYNC_REQUEST_TIMEOUT_SECS",
        "CLINISYNC_CREDENTIAL_KEY",
        "CLINISYNC_HEALTH_CHECK_INTERVAL_SECS",
        "CLINISYNC_MAX_RECONNECT_ATTEMPTS",
        "CLINISYNC_RECONNECT_DELAY_MS",
        "CLINISYNC_RECONNECT_MAX_DELAY_MS",
        "CLINISYNC_JOB_TIMEOUT_SECS",
        "CLINISYNC_DUPLICATE_CREATE_POLICY",
        "CLINISYNC_LOG_JSON",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
        std::env::remove_var("CLINISYNC_LOG_LEVEL");
    }

    fn temp_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (value, expected) in [("1", true), ("TRUE", true), ("on", true), ("no", false), ("0", false)] {
            std::env::set_var("CLINISYNC_TEST_BOOL", value);
            assert_eq!(env_bool("CLINISYNC_TEST_BOOL", !expected), expected, "value {value}");
        }
        std::env::remove_var("CLINISYNC_TEST_BOOL");
        assert!(env_bool("CLINISYNC_TEST_BOOL", true));
    }

    #[test]
    fn only_the_database_path_is_required() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("CLINISYNC_DB_PATH", "/tmp/clinisync.db");

        let config = load_from_env().expect("defaults fill the rest");

        assert_eq!(config.database.path, "/tmp/clinisync.db");
        assert_eq!(config.database.encryption_key, None);
        assert_eq!(config.remote, RemoteConfig::default());
        assert_eq!(config.sync, SyncConfig::default());
        clear_env();
    }

    #[test]
    fn env_overrides_every_section() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("CLINISYNC_DB_PATH", "/tmp/clinisync.db");
        std::env::set_var("CLINISYNC_DB_POOL_SIZE", "4");
        std::env::set_var("CLINISYNC_DB_ENCRYPTION_KEY", "db-key");
        std::env::set_var("CLINISYNC_REMOTE_BASE_URL", "http://localhost:9000");
        std::env::set_var("CLINISYNC_CREDENTIAL_KEY", "credential-passphrase");
        std::env::set_var("CLINISYNC_MAX_RECONNECT_ATTEMPTS", "3");
        std::env::set_var("CLINISYNC_DUPLICATE_CREATE_POLICY", "require_review");
        std::env::set_var("CLINISYNC_LOG_JSON", "true");

        let config = load_from_env().unwrap();

        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.database.encryption_key.as_deref(), Some("db-key"));
        assert_eq!(config.remote.base_url, "http://localhost:9000");
        assert_eq!(config.remote.credential_key.as_deref(), Some("credential-passphrase"));
        assert_eq!(config.sync.max_reconnect_attempts, 3);
        assert_eq!(config.sync.duplicate_create_policy, DuplicateCreatePolicy::RequireReview);
        assert!(config.logging.json);
        clear_env();
    }

    #[test]
    fn missing_path_and_bad_numbers_are_config_errors() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        assert!(matches!(load_from_env(), Err(CliniSyncError::Config(_))));

        std::env::set_var("CLINISYNC_DB_PATH", "/tmp/clinisync.db");
        std::env::set_var("CLINISYNC_DB_POOL_SIZE", "not-a-number");
        let err = load_from_env().unwrap_err();
        assert!(matches!(&err, CliniSyncError::Config(m) if m.contains("CLINISYNC_DB_POOL_SIZE")));

        std::env::set_var("CLINISYNC_DB_POOL_SIZE", "2");
        std::env::set_var("CLINISYNC_DUPLICATE_CREATE_POLICY", "sometimes");
        assert!(matches!(load_from_env(), Err(CliniSyncError::Config(_))));
        clear_env();
    }

    #[test]
    fn toml_file_with_custom_schedule() {
        let (_file, path) = temp_config(
            r#"
[database]
path = "clinisync.db"
encryption_key = "secret"

[remote]
base_url = "https://sandbox.accounting.test"
auth_url = "https://sandbox.accounting.test/auth"
partner_id = "ClinicOne"

[sync]
job_timeout_secs = 120

[[sync.schedules]]
kind = "invoice"
cron = "0 */2 * * * *"
batch_size = 10

[[sync.schedules]]
kind = "product"
cron = "0 0 3 * * *"
batch_size = 100
enabled = false
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).unwrap();

        assert_eq!(config.database.pool_size, clinisync_domain::constants::DEFAULT_POOL_SIZE);
        assert_eq!(config.remote.partner_id, "ClinicOne");
        assert_eq!(config.sync.job_timeout_secs, 120);
        assert_eq!(config.sync.schedules.len(), 2);
        assert_eq!(config.sync.schedule_for(EntityKind::Invoice).unwrap().batch_size, 10);
        assert!(!config.sync.schedule_for(EntityKind::Product).unwrap().enabled);
        assert!(config.sync.schedule_for(EntityKind::Customer).is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn json_file_uses_defaults_for_missing_sections() {
        let (_file, path) =
            temp_config(r#"{"database": {"path": "clinisync.db", "pool_size": 2}}"#, "json");

        let config = load_from_file(Some(path.clone())).unwrap();

        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.sync.schedules.len(), EntityKind::ALL.len());
        assert_eq!(config.logging, LoggingConfig::default());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn invalid_files_are_rejected() {
        assert!(matches!(
            load_from_file(Some(PathBuf::from("/nonexistent/config.json"))),
            Err(CliniSyncError::Config(_))
        ));

        let (_file, path) = temp_config(r#"{ "database": "#, "json");
        assert!(load_from_file(Some(path.clone())).is_err());
        std::fs::remove_file(path).ok();

        assert!(parse_config("database: {}", Path::new("config.yaml")).is_err());
    }

    #[test]
    fn validation_catches_unusable_values() {
        let base: Config =
            serde_json::from_str(r#"{"database": {"path": "clinisync.db"}}"#).unwrap();
        assert!(validate(&base).is_ok());

        let mut config = base.clone();
        config.remote.base_url = "not a url".into();
        assert!(validate(&config).is_err());

        let mut config = base.clone();
        config.sync.schedules[0].cron = "*/5 * * * *".into();
        assert!(matches!(validate(&config), Err(CliniSyncError::Config(m)) if m.contains("six fields")));

        let mut config = base.clone();
        config.sync.fiscal_status.cron = "0 */15 * * *".into();
        assert!(matches!(validate(&config), Err(CliniSyncError::Config(m)) if m.contains("fiscal_status")));

        let mut config = base;
        config.sync.reconnect_max_delay_ms = 1;
        assert!(validate(&config).is_err());
    }
}
