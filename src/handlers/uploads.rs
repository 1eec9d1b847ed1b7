//! # Upload Handlers
//!
//! Callbacks from the file service. The upload signature in the body is the
//! only credential; it was issued to the share owner at creation time.

use serde::Deserialize;
use worker::*;

use super::{json, Services};
use crate::context::RequestContext;
use crate::errors::AppResult;
use crate::middleware::ValidationMiddleware;
use crate::models::DeclaredFile;

#[derive(Deserialize)]
struct VerifyBody {
    signature: String,
}

#[derive(Deserialize)]
struct CompleteBody {
    signature: String,
    #[serde(default)]
    files: Vec<DeclaredFile>,
}

/// POST /api/upload/verify
pub async fn verify(
    mut req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let body: VerifyBody = ValidationMiddleware::parse_json(&req.text().await?)?;
    let grant = services
        .lifecycle()
        .verify_signature(ctx, &body.signature)
        .await?;
    json(&grant)
}

/// POST /api/upload/complete
pub async fn complete(
    mut req: Request,
    services: &Services,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let body: CompleteBody = ValidationMiddleware::parse_json(&req.text().await?)?;
    let completed = services
        .lifecycle()
        .complete_upload(ctx, &body.signature, &body.files)
        .await?;
    json(&completed)
}
