//! # Account Handlers
//!
//! Signed-in read models: the account overview loaded with the main page and
//! the owner dashboard.

use worker::*;

use super::{json, Services};
use crate::context::RequestContext;
use crate::errors::AppResult;
use crate::middleware::ValidationMiddleware;

/// GET /api/account?checkout_id=
///
/// A `checkout_id` is present when the billing provider redirects back after
/// a purchase.
pub async fn overview(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let user = services.require_user(&req, ctx).await?;
    let url = req.url()?;
    let checkout_id = ValidationMiddleware::query_param(&url, "checkout_id");
    let overview = services
        .accounts()
        .overview(ctx, services.billing.as_ref(), &user, checkout_id.as_deref())
        .await?;
    json(&overview)
}

/// GET /api/dashboard
pub async fn dashboard(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let user = services.require_user(&req, ctx).await?;
    let dashboard = services
        .accounts()
        .dashboard(ctx, services.billing.as_ref(), &user)
        .await?;
    json(&dashboard)
}
