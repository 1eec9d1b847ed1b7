//! # Application Constants
//!
//! This module defines application-wide constants used throughout the share service.
//! Centralizing constants improves maintainability and reduces the risk of inconsistencies
//! across the codebase.
//!
//! ## Binding Names
//!
//! Constants for Cloudflare Worker bindings and secrets that must match wrangler.toml.
//!
//! ## Share Rules
//!
//! Slug alphabet and allocation limits, expiry bounds and size units.

/// Standard KV configuration binding name
pub const STORAGE_CONFIG_KV_NAME: &str = "STORAGE_CONFIG";

/// Standard D1 database binding name for shares, plans and analytics
pub const SHARE_DB_NAME: &str = "SHARE_DB";

/// Secret holding the billing provider access token
pub const BILLING_TOKEN_SECRET: &str = "BILLING_ACCESS_TOKEN";

/// Secret used to sign upload signatures handed to the file service
pub const UPLOAD_SIGNING_SECRET: &str = "UPLOAD_SIGNING_SECRET";

/// Secret guarding the admin routes
pub const ADMIN_TOKEN_SECRET: &str = "ADMIN_TOKEN";

/// Plan every user starts on, and falls back to when a subscription lapses
pub const DEFAULT_PLAN_ID: i64 = 1;

/// Storage ceiling of the seeded default plan, in megabytes
pub const DEFAULT_PLAN_QUOTA_MB: i64 = 1_000;

/// Quota accounting unit
pub const BYTES_PER_MEGABYTE: u64 = 1_000_000;

/// Symbols used for generated slugs (mixed case + digits)
pub const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the first generated slug candidates
pub const GENERATED_SLUG_MIN_LEN: usize = 8;

/// Consecutive collisions tolerated before the candidate length grows by one
pub const SLUG_ATTEMPTS_PER_LENGTH: u32 = 100;

/// Total candidates tried before allocation gives up
pub const SLUG_MAX_ATTEMPTS: u32 = 1_000;

/// Minimum length of a user-supplied custom slug
pub const DEFAULT_MIN_CUSTOM_SLUG_LEN: usize = 6;

/// Path segment reserved for lookups by share id (`/api/share/id?shareid=`)
pub const RESERVED_ID_SLUG: &str = "id";

/// Expiry bounds for shares, in days
pub const MIN_EXPIRY_DAYS: i64 = 1;
pub const DEFAULT_MAX_EXPIRY_DAYS: i64 = 7;

/// Validity window of an upload signature (1 hour)
pub const DEFAULT_UPLOAD_SIGNATURE_TTL_SECS: u64 = 3_600;

/// Upper bound for every billing/identity call
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5_000;

/// Default billing API base URL
pub const DEFAULT_BILLING_API_URL: &str = "https://api.polar.sh";

/// Times a generated slug is re-allocated after losing an insert race
pub const SLUG_INSERT_RETRIES: u32 = 3;

/// CORS header for allowed origins
pub const CORS_ALLOW_ORIGIN: &str = "*";

/// CORS header for allowed methods
pub const CORS_ALLOW_METHODS: &str = "GET, POST, DELETE, OPTIONS";

/// CORS header for allowed headers
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, Cookie";
