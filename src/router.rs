//! # Request Routing and Dispatch
//!
//! Pattern-based routing on HTTP method and URL path.
//!
//! ## Supported Routes
//!
//! - `GET /health` - Health check endpoint
//! - `OPTIONS *` - CORS preflight requests
//! - `POST /api/upload` - Create a share (signed in)
//! - `GET /api/share/{slug}` - Public share page
//! - `GET /api/share/id?shareid=` - Public share page by share id
//! - `GET /api/download/{file_id}` - Download authorization
//! - `POST|DELETE /api/delete-share` - Soft-delete an owned share
//! - `GET /api/validate-slug?slug=` - Slug availability
//! - `GET /api/account` - Account overview (signed in)
//! - `GET /api/dashboard` - Owner dashboard (signed in)
//! - `POST /api/upload/verify` - File service signature check
//! - `POST /api/upload/complete` - File service upload completion
//! - `POST /admin/migrate` - Schema migration (admin token)
//!
//! The health probe and preflight answer before any binding is touched, so
//! they keep working when D1 or secrets are misconfigured.

use std::sync::Arc;

use worker::*;

use crate::config::Config;
use crate::context::RequestContext;
use crate::handlers::{self, finish, handle_health_check, handle_not_found, Services};
use crate::log_data;
use crate::middleware::CorsMiddleware;

/// Dispatches one request.
///
/// Every response, error responses included, leaves through
/// [`handlers::finish`] and therefore carries CORS headers.
pub async fn handle_request(
    req: Request,
    env: Env,
    config: Arc<Config>,
    ctx: RequestContext,
) -> Result<Response> {
    if req.method() == Method::Options {
        return CorsMiddleware::handle_preflight();
    }

    let url = req.url()?;
    let path = url.path().to_string();
    let method = req.method();

    ctx.logger.info(
        "Routing request",
        log_data!("method" => method.to_string(), "path" => path.as_str()),
    );

    if method == Method::Get && path == "/health" {
        return handle_health_check();
    }

    let services = match Services::from_env(&env, config) {
        Ok(services) => services,
        Err(e) => return finish(&ctx, Err(e)),
    };

    let result = match (method, path.as_str()) {
        (Method::Post, "/api/upload") => handlers::shares::create_share(req, &services, &ctx).await,
        (Method::Post, "/api/upload/verify") => {
            handlers::uploads::verify(req, &services, &ctx).await
        }
        (Method::Post, "/api/upload/complete") => {
            handlers::uploads::complete(req, &services, &ctx).await
        }
        (Method::Get, "/api/share/id") => {
            handlers::shares::open_share_by_id(req, &services, &ctx).await
        }
        (Method::Get, p) if p.starts_with("/api/share/") => {
            handlers::shares::open_share_by_slug(req, &services, &ctx).await
        }
        (Method::Get, p) if p.starts_with("/api/download/") => {
            handlers::downloads::authorize_download(req, &services, &ctx).await
        }
        (Method::Post | Method::Delete, "/api/delete-share") => {
            handlers::shares::delete_share(req, &services, &ctx).await
        }
        (Method::Get, "/api/validate-slug") => {
            handlers::shares::validate_slug(req, &services).await
        }
        (Method::Get, "/api/account") => handlers::account::overview(req, &services, &ctx).await,
        (Method::Get, "/api/dashboard") => {
            handlers::account::dashboard(req, &services, &ctx).await
        }
        (Method::Post, "/admin/migrate") => handlers::admin::migrate(req, &services, &ctx).await,
        _ => return handle_not_found(&ctx),
    };

    finish(&ctx, result)
}
