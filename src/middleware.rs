//! # Middleware Components
//!
//! Cross-cutting request/response processing for the share service.
//!
//! ## Middleware Types
//!
//! - **CORS Middleware**: preflight answers and CORS headers on every response
//! - **Validation Middleware**: query, path, body and bearer-token extraction
//!
//! The validation helpers work on plain strings and [`Url`]s rather than on
//! `worker::Request`, so they are unit-tested on the host.
//!
//! ## Usage Examples
//!
//! ```rust,ignore
//! if req.method() == Method::Options {
//!     return CorsMiddleware::handle_preflight();
//! }
//!
//! let slug = ValidationMiddleware::path_param(url.path(), "/api/share/")?;
//! let password = ValidationMiddleware::query_param(&url, "password");
//! ```

use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use worker::{Response, Result, Url};

use crate::errors::{AppError, AppResult};
use crate::utils::cors_headers;

/// Middleware for handling Cross-Origin Resource Sharing (CORS) requests.
///
/// The browser front-end lives on a different origin than the worker and
/// sends the identity cookie, so every response carries the CORS headers
/// from [`cors_headers`].
pub struct CorsMiddleware;

impl CorsMiddleware {
    /// Applies CORS headers to an existing response.
    pub fn apply_headers(response: Response) -> Response {
        response.with_headers(cors_headers())
    }

    /// Answers an `OPTIONS` preflight with an empty body.
    pub fn handle_preflight() -> Result<Response> {
        Ok(Response::empty()?.with_headers(cors_headers()))
    }
}

/// Middleware for extracting and validating request parameters.
///
/// All methods return [`AppResult`] so a malformed request surfaces as a
/// structured 400 response through the normal error path.
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    /// Returns a query parameter, treating an empty value as absent.
    pub fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }

    /// Like [`Self::query_param`] but the parameter is mandatory.
    pub fn require_query(url: &Url, name: &str) -> AppResult<String> {
        Self::query_param(url, name)
            .ok_or_else(|| AppError::validation(format!("Missing {} parameter", name)))
    }

    /// Extracts the single path segment following `prefix`.
    ///
    /// `/api/share/abc` with prefix `/api/share/` yields `abc`. Empty or
    /// nested remainders are rejected.
    pub fn path_param<'p>(path: &'p str, prefix: &str) -> AppResult<&'p str> {
        match path.strip_prefix(prefix) {
            Some(segment) if !segment.is_empty() && !segment.contains('/') => Ok(segment),
            _ => Err(AppError::validation("Invalid path parameter")),
        }
    }

    /// Decodes a JSON request body. Malformed bodies are validation errors.
    pub fn parse_json<T: DeserializeOwned>(body: &str) -> AppResult<T> {
        if body.trim().is_empty() {
            return Err(AppError::validation("Request body is required"));
        }
        Ok(serde_json::from_str(body)?)
    }

    /// Extracts the token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Checks an admin bearer token against the configured one.
    ///
    /// Admin routes are closed entirely while no token is configured.
    pub fn check_admin(authorization: Option<&str>, expected: Option<&str>) -> AppResult<()> {
        let (Some(supplied), Some(expected)) = (Self::bearer_token(authorization), expected) else {
            return Err(AppError::Unauthorized);
        };
        if bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}
