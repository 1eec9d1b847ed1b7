//! # Download Handlers
//!
//! Download authorization. The worker never serves bytes; it checks the share
//! gates, meters the download and points the caller at the file service.

use worker::*;

use super::{json, json_with_status, Services};
use crate::context::RequestContext;
use crate::errors::AppResult;
use crate::middleware::ValidationMiddleware;

/// GET /api/download/{file_id}?password=
pub async fn authorize_download(
    req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let Some(file_service_url) = services.config.file_service_url.as_deref() else {
        ctx.logger.error("Download requested but file_service_url is not configured", None);
        return json_with_status(
            &serde_json::json!({ "error": "File service is not configured" }),
            503,
        );
    };

    let url = req.url()?;
    let file_id = ValidationMiddleware::path_param(url.path(), "/api/download/")?;
    let password = ValidationMiddleware::query_param(&url, "password");
    let authorization = services
        .lifecycle()
        .authorize_download(ctx, file_id, password.as_deref(), file_service_url)
        .await?;
    json(&authorization)
}
