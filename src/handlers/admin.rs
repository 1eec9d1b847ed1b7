//! # Admin Handlers
//!
//! Operator endpoints guarded by the `ADMIN_TOKEN` secret.

use worker::*;

use super::{json, Services};
use crate::context::RequestContext;
use crate::errors::AppResult;
use crate::middleware::ValidationMiddleware;

/// POST /admin/migrate
///
/// Creates tables and indexes if missing and seeds the default plan. Safe to
/// run repeatedly.
pub async fn migrate(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let authorization = req.headers().get("Authorization")?;
    ValidationMiddleware::check_admin(
        authorization.as_deref(),
        services.secrets.admin_token.as_deref(),
    )?;

    services
        .store
        .migrate(services.config.default_plan_id)
        .await?;
    ctx.logger.info("Schema migrated", None);
    json(&serde_json::json!({ "ok": true }))
}
