//! # Handlers Module
//!
//! HTTP request handlers for the share service, organized by functionality.
//! Handlers translate between `worker::Request`/`Response` and the core
//! services; they hold no business rules of their own.
//!
//! Every handler returns [`AppResult<Response>`]. [`finish`] logs failures,
//! renders them through [`AppError::to_response`] and applies CORS headers,
//! so error handling stays consistent across routes.

use std::sync::Arc;

use serde::Serialize;
use worker::*;

use crate::account::AccountService;
use crate::billing::{BillingProvider, DisabledBilling, PolarBillingClient};
use crate::config::{Config, Secrets};
use crate::context::RequestContext;
use crate::database::D1Store;
use crate::errors::{AppError, AppResult};
use crate::identity::{AnonymousIdentity, AuthServiceClient, IdentityProvider};
use crate::log_data;
use crate::middleware::CorsMiddleware;
use crate::models::User;
use crate::shares::ShareLifecycle;
use crate::signature::UploadSigner;

pub mod account;
pub mod admin;
pub mod downloads;
pub mod shares;
pub mod uploads;

/// Per-request wiring of storage and collaborators.
pub struct Services {
    pub config: Arc<Config>,
    pub secrets: Secrets,
    pub store: D1Store,
    pub signer: UploadSigner,
    pub billing: Box<dyn BillingProvider>,
    pub identity: Box<dyn IdentityProvider>,
}

impl Services {
    pub fn from_env(env: &Env, config: Arc<Config>) -> AppResult<Self> {
        let secrets = Secrets::load(env)?;
        let store = D1Store::new(env.d1(&config.database_name)?);
        let signer = UploadSigner::new(&secrets.upload_signing_key);
        let timeout = config.collaborator_timeout();

        let billing: Box<dyn BillingProvider> = match secrets.billing_token.as_deref() {
            Some(token) => Box::new(PolarBillingClient::new(
                config.billing_api_url.as_str(),
                token,
                timeout,
            )),
            None => Box::new(DisabledBilling),
        };
        let identity: Box<dyn IdentityProvider> = match config.identity_service_url.as_deref() {
            Some(url) => Box::new(AuthServiceClient::new(url, timeout)),
            None => Box::new(AnonymousIdentity),
        };

        Ok(Self {
            config,
            secrets,
            store,
            signer,
            billing,
            identity,
        })
    }

    pub fn lifecycle(&self) -> ShareLifecycle<'_> {
        ShareLifecycle::new(&self.store, &self.config, &self.signer)
    }

    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(&self.store, self.config.default_plan_id)
    }

    /// Resolves the caller's session and provisions their account on first sight.
    pub async fn require_user(&self, req: &Request, ctx: &RequestContext) -> AppResult<User> {
        let cookie = req.headers().get("Cookie")?;
        let session = self
            .identity
            .session(cookie.as_deref())
            .await?
            .ok_or(AppError::Unauthorized)?;
        self.accounts().ensure_user(ctx, &session).await
    }
}

pub fn json<T: Serialize>(data: &T) -> AppResult<Response> {
    Ok(Response::from_json(data)?)
}

pub fn json_with_status<T: Serialize>(data: &T, status: u16) -> AppResult<Response> {
    Ok(Response::from_json(data)?.with_status(status))
}

/// Converts a handler result into the final response, with CORS headers.
pub fn finish(ctx: &RequestContext, result: AppResult<Response>) -> Result<Response> {
    let response = match result {
        Ok(response) => response,
        Err(error) => {
            let status = error.status_code();
            if status.is_server_error() {
                ctx.logger.error(
                    "Request failed",
                    log_data!("status" => status.as_u16(), "error" => error.to_string()),
                );
            } else {
                ctx.logger.info(
                    "Request rejected",
                    log_data!("status" => status.as_u16(), "error" => error.to_string()),
                );
            }
            error.to_response()?
        }
    };
    Ok(CorsMiddleware::apply_headers(response))
}

/// Provides a health check endpoint for monitoring and load balancer probes.
pub fn handle_health_check() -> Result<Response> {
    Response::from_json(&serde_json::json!({
        "status": "healthy",
        "service": "planar-share-worker",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
    .map(CorsMiddleware::apply_headers)
}

/// Handles requests to unmatched routes with a 404 Not Found response.
pub fn handle_not_found(ctx: &RequestContext) -> Result<Response> {
    finish(ctx, Err(AppError::NotFound))
}
