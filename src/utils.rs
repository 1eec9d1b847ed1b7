//! # Utility Functions
//!
//! This module provides utility functions used throughout the share service.
//! It includes identifier generation, size unit conversion, CORS headers and a
//! timeout combinator for calls to external collaborators.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let request_id = generate_request_id();
//! let mb = bytes_to_megabytes(500_000);
//! // Result: 1 (partial megabytes round up)
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures::future::{select, Either};
use futures::pin_mut;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use worker::{Delay, Fetch, Headers, Request};

use crate::constants::{
    BYTES_PER_MEGABYTE, CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN,
};
use crate::errors::{AppError, AppResult};

/// Generates an identifier for one incoming request.
///
/// The timestamp prefix keeps log lines of one isolate roughly sortable.
///
/// # Example
///
/// ```rust,ignore
/// let request_id = generate_request_id();
/// // Returns: "1641987000000-550e8400-e29b-41d4-a716-446655440000"
/// ```
pub fn generate_request_id() -> String {
    let uuid_part = Uuid::new_v4().to_string();
    let timestamp = Utc::now().timestamp_millis();
    format!("{}-{}", timestamp, uuid_part)
}

/// Row identifier for users, shares, files, signatures and analytics.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Converts a byte count into whole megabytes, rounding any remainder up.
pub fn bytes_to_megabytes(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_MEGABYTE)
}

/// Runs `future` but gives up after `timeout`.
///
/// Used for every billing and identity call so that no request waits on a
/// collaborator indefinitely. The timeout surfaces as [`AppError::Upstream`].
pub async fn with_timeout<T, F>(
    service: &'static str,
    timeout: Duration,
    future: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let delay = Delay::from(timeout);
    pin_mut!(future);
    pin_mut!(delay);

    match select(future, delay).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(AppError::upstream(
            service,
            format!("timed out after {} ms", timeout.as_millis()),
        )),
    }
}

/// Sends `request` and decodes a JSON body from a 2xx response.
///
/// Transport failures, non-2xx statuses and undecodable bodies all become
/// [`AppError::Upstream`] tagged with `service`.
pub async fn fetch_json<T: DeserializeOwned>(service: &'static str, request: Request) -> AppResult<T> {
    let mut response = Fetch::Request(request)
        .send()
        .await
        .map_err(|e| AppError::upstream(service, e.to_string()))?;

    let status = response.status_code();
    if !(200..300).contains(&status) {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::upstream(service, format!("HTTP {}: {}", status, body)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AppError::upstream(service, format!("invalid response body: {}", e)))
}

/// Creates HTTP headers for Cross-Origin Resource Sharing (CORS) support.
///
/// # CORS Configuration
///
/// - **Access-Control-Allow-Origin**: `*` (allows all origins)
/// - **Access-Control-Allow-Methods**: `GET, POST, DELETE, OPTIONS`
/// - **Access-Control-Allow-Headers**: `Content-Type, Authorization, Cookie`
pub fn cors_headers() -> Headers {
    let headers = Headers::new();
    // Note: These values are known to be valid
    let _ = headers.set("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN);
    let _ = headers.set("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);
    let _ = headers.set("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS);
    headers
}
