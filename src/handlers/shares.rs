//! # Share Handlers
//!
//! Share creation and deletion for signed-in owners, plus the public read
//! path and slug availability check.

use serde::Deserialize;
use worker::*;

use super::{json, json_with_status, Services};
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::middleware::ValidationMiddleware;
use crate::shares::{CreateShareRequest, ShareLookup};
use crate::slug::SlugAllocator;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteShareBody {
    #[serde(default)]
    share_id: String,
}

/// POST /api/upload
pub async fn create_share(
    mut req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let owner = services.require_user(&req, ctx).await?;
    let body: CreateShareRequest = ValidationMiddleware::parse_json(&req.text().await?)?;
    let created = services
        .lifecycle()
        .create_share(ctx, &owner.id, &body)
        .await?;
    json(&created)
}

/// GET /api/share/{slug}?password=
pub async fn open_share_by_slug(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let url = req.url()?;
    let slug = ValidationMiddleware::path_param(url.path(), "/api/share/")?;
    let password = ValidationMiddleware::query_param(&url, "password");
    let view = services
        .lifecycle()
        .open_share(ctx, &ShareLookup::Slug(slug.to_string()), password.as_deref())
        .await?;
    json(&view)
}

/// GET /api/share/id?shareid=&password=
pub async fn open_share_by_id(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let url = req.url()?;
    let share_id = ValidationMiddleware::require_query(&url, "shareid")?;
    let password = ValidationMiddleware::query_param(&url, "password");
    let view = services
        .lifecycle()
        .open_share(ctx, &ShareLookup::Id(share_id), password.as_deref())
        .await?;
    json(&view)
}

/// POST|DELETE /api/delete-share
pub async fn delete_share(
    mut req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let owner = services.require_user(&req, ctx).await?;
    let body: DeleteShareBody = ValidationMiddleware::parse_json(&req.text().await?)?;
    if body.share_id.is_empty() {
        return Err(AppError::validation("Share ID is required"));
    }
    services
        .lifecycle()
        .soft_delete(ctx, &body.share_id, &owner.id)
        .await?;
    json(&serde_json::json!({
        "success": true,
        "message": "Share deleted successfully"
    }))
}

/// GET /api/validate-slug?slug=
pub async fn validate_slug(req: Request, services: &Services) -> AppResult<Response> {
    let url = req.url()?;
    let Some(slug) = ValidationMiddleware::query_param(&url, "slug") else {
        return json_with_status(&serde_json::json!({ "exists": false }), 400);
    };
    let exists = SlugAllocator::new(&services.store, services.config.min_custom_slug_len)
        .is_taken(&slug)
        .await?;
    json(&serde_json::json!({ "exists": exists }))
}
