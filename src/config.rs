//! # Configuration Management
//!
//! This module provides configuration management for the share service.
//! Configuration is stored in Cloudflare KV storage and loaded at runtime with
//! defaults for every setting. Credentials are never stored in KV; they are
//! read from Worker secrets into [`Secrets`].
//!
//! ## Configuration Sources
//!
//! 1. **KV Storage**: Primary configuration source stored under the "config" key
//! 2. **Defaults**: Fallback values when KV storage is empty
//! 3. **Secrets**: Billing token, upload signing key, admin token
//!
//! ## Example
//!
//! ```rust,ignore
//! let kv = env.kv(STORAGE_CONFIG_KV_NAME)?;
//! let config = Config::load(&kv).await?;
//! println!("Signatures live for {} seconds", config.upload_signature_ttl_secs);
//! ```

use crate::constants::{
    ADMIN_TOKEN_SECRET, BILLING_TOKEN_SECRET, DEFAULT_BILLING_API_URL,
    DEFAULT_COLLABORATOR_TIMEOUT_MS, DEFAULT_MAX_EXPIRY_DAYS, DEFAULT_MIN_CUSTOM_SLUG_LEN,
    DEFAULT_PLAN_ID, DEFAULT_UPLOAD_SIGNATURE_TTL_SECS, MIN_EXPIRY_DAYS, SHARE_DB_NAME,
    UPLOAD_SIGNING_SECRET,
};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use worker::kv::KvStore;
use worker::{console_log, Env};

/// Configuration structure for the share service.
///
/// Unknown keys in the stored JSON are ignored and missing keys take their
/// default, so a partial document in KV is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the D1 database binding. Must match wrangler.toml.
    pub database_name: String,

    /// Plan assigned on sign-up and on subscription lapse.
    pub default_plan_id: i64,

    /// Base URL of the file service that stores and serves bytes.
    /// Download authorization answers 503 while this is unset.
    pub file_service_url: Option<String>,

    /// Base URL of the identity service that owns session cookies.
    pub identity_service_url: Option<String>,

    /// Base URL of the billing provider API.
    pub billing_api_url: String,

    /// Upper bound for every call to the billing or identity service.
    pub collaborator_timeout_ms: u64,

    /// Validity window of issued upload signatures.
    pub upload_signature_ttl_secs: u64,

    /// Longest expiry a share may request, in days.
    pub max_expiry_days: i64,

    /// Shortest accepted custom slug.
    pub min_custom_slug_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: SHARE_DB_NAME.to_string(),
            default_plan_id: DEFAULT_PLAN_ID,
            file_service_url: None,
            identity_service_url: None,
            billing_api_url: DEFAULT_BILLING_API_URL.to_string(),
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            upload_signature_ttl_secs: DEFAULT_UPLOAD_SIGNATURE_TTL_SECS,
            max_expiry_days: DEFAULT_MAX_EXPIRY_DAYS,
            min_custom_slug_len: DEFAULT_MIN_CUSTOM_SLUG_LEN,
        }
    }
}

impl Config {
    /// Loads configuration from KV storage with fallback to defaults.
    ///
    /// # Configuration Format
    ///
    /// The expected JSON format in KV storage:
    /// ```json
    /// {
    ///   "database_name": "SHARE_DB",
    ///   "file_service_url": "https://files.example.com",
    ///   "identity_service_url": "https://example.com",
    ///   "collaborator_timeout_ms": 5000
    /// }
    /// ```
    ///
    /// # Error Handling
    ///
    /// - If KV storage is accessible but no config exists, uses defaults
    /// - If KV storage throws an error, the error is propagated up
    /// - A stored config that fails [`Config::validate`] is rejected
    pub async fn load(kv: &KvStore) -> AppResult<Self> {
        let config = match kv
            .get("config")
            .json::<Config>()
            .await
            .map_err(worker::Error::from)?
        {
            Some(config) => {
                console_log!("Configuration loaded from KV storage");
                config
            }
            None => {
                console_log!("Config not found in KV, using default");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the service misbehave silently.
    pub fn validate(&self) -> AppResult<()> {
        if self.collaborator_timeout_ms == 0 {
            return Err(AppError::internal("collaborator_timeout_ms must be positive"));
        }
        if self.upload_signature_ttl_secs == 0 {
            return Err(AppError::internal("upload_signature_ttl_secs must be positive"));
        }
        if self.max_expiry_days < MIN_EXPIRY_DAYS {
            return Err(AppError::internal(format!(
                "max_expiry_days must be at least {}",
                MIN_EXPIRY_DAYS
            )));
        }
        if self.min_custom_slug_len < DEFAULT_MIN_CUSTOM_SLUG_LEN {
            return Err(AppError::internal(format!(
                "min_custom_slug_len must be at least {}",
                DEFAULT_MIN_CUSTOM_SLUG_LEN
            )));
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

/// Credentials read from Worker secrets on each request.
#[derive(Clone)]
pub struct Secrets {
    pub billing_token: Option<String>,
    pub upload_signing_key: String,
    pub admin_token: Option<String>,
}

impl Secrets {
    /// The signing key is mandatory; the others disable their feature when absent.
    pub fn load(env: &Env) -> AppResult<Self> {
        let upload_signing_key = env
            .secret(UPLOAD_SIGNING_SECRET)
            .map_err(|_| AppError::internal(format!("{} secret is not set", UPLOAD_SIGNING_SECRET)))?
            .to_string();

        Ok(Self {
            billing_token: env.secret(BILLING_TOKEN_SECRET).ok().map(|s| s.to_string()),
            upload_signing_key,
            admin_token: env.secret(ADMIN_TOKEN_SECRET).ok().map(|s| s.to_string()),
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("billing_token", &self.billing_token.as_ref().map(|_| "[redacted]"))
            .field("upload_signing_key", &"[redacted]")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
