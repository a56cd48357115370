//! JSON secret redaction.
//!
//! Two passes over a [`serde_json::Value`]:
//! - object members whose *key* names a secret are replaced wholesale;
//! - string values that *look* like credentials (bearer tokens, JWTs) are
//!   replaced wherever they appear.
//!
//! Key matching normalizes case and separators, so `accessKey`,
//! `access_key` and `Access-Key` are the same key.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Default replacement for secret values.
pub const DEFAULT_MARKER: &str = "***REDACTED***";

/// Normalized key names that are always secret.
const SECRET_KEYS: &[&str] = &[
    "accesskey",
    "apikey",
    "authorization",
    "clientsecret",
    "key",
    "password",
    "secret",
    "token",
];

/// Normalized key suffixes that are secret (`access_token`, `userPassword`).
const SECRET_SUFFIXES: &[&str] = &["token", "secret", "password", "accesskey"];

static BEARER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*")
        .expect("BEARER regex should compile - this is a bug")
});

static JWT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\beyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{5,}")
        .expect("JWT regex should compile - this is a bug")
});

/// Replaces secrets in JSON payloads.
#[derive(Debug, Clone)]
pub struct Redactor {
    marker: String,
    extra_keys: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl Redactor {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into(), extra_keys: Vec::new() }
    }

    /// Treat an additional key name as secret.
    #[must_use]
    pub fn with_secret_key(mut self, key: &str) -> Self {
        self.extra_keys.push(normalize(key));
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether an object key names a secret.
    pub fn is_secret_key(&self, key: &str) -> bool {
        let key = normalize(key);
        SECRET_KEYS.contains(&key.as_str())
            || SECRET_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
            || self.extra_keys.iter().any(|extra| *extra == key)
    }

    /// Return a redacted copy of `value`.
    pub fn redact(&self, value: &Value) -> Value {
        let mut copy = value.clone();
        self.redact_in_place(&mut copy);
        copy
    }

    pub fn redact_in_place(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, member) in map.iter_mut() {
                    if self.is_secret_key(key) && !member.is_null() {
                        *member = Value::String(self.marker.clone());
                    } else {
                        self.redact_in_place(member);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.redact_in_place(item)),
            Value::String(text) => {
                if let Some(clean) = self.scrub_text(text) {
                    *text = clean;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    /// Redact credential-looking fragments inside free text such as error
    /// messages. Returns the input unchanged when nothing matched.
    pub fn redact_text(&self, text: &str) -> String {
        self.scrub_text(text).unwrap_or_else(|| text.to_string())
    }

    fn scrub_text(&self, text: &str) -> Option<String> {
        if !BEARER.is_match(text) && !JWT.is_match(text) {
            return None;
        }
        let bearer_marker = format!("Bearer {}", self.marker);
        let step = BEARER.replace_all(text, bearer_marker.as_str());
        Some(JWT.replace_all(&step, self.marker.as_str()).into_owned())
    }
}

fn normalize(key: &str) -> String {
    key.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect()
}
