//! # Planar Share - Cloudflare Workers
//!
//! Share lifecycle and access-control service built with Rust and Cloudflare
//! Workers. Signed-in users create shares of uploaded files, reachable by an
//! unguessable or custom slug and optionally gated by password, expiry and
//! download limit. Storage is bounded per user by a plan-derived quota.
//!
//! ## Architecture
//!
//! - **Router / Handlers / Middleware**: HTTP surface, CORS and request parsing
//! - **Core services**: plan resolver, quota ledger, slug allocator, access
//!   guard and share lifecycle manager, all written against [`store::ShareStore`]
//! - **Database**: D1 implementation of the store
//! - **Collaborators**: identity service (sessions) and billing provider
//!   (checkouts, subscriptions, customer portal)
//! - **Config**: KV-backed settings plus Worker secrets
//!
//! File bytes never pass through this worker. It issues upload signatures to
//! the file service and hands out download URLs pointing at it.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use worker::*;

mod access;
mod account;
mod billing;
mod config;
mod constants;
mod context;
mod database;
mod errors;
mod extras;
mod handlers;
mod identity;
mod logging;
mod middleware;
mod models;
mod password;
mod plan;
mod quota;
mod router;
mod shares;
mod signature;
mod slug;
mod store;
mod utils;

#[cfg(test)]
mod testing;

use config::Config;
use constants::STORAGE_CONFIG_KV_NAME;
use context::RequestContext;
use utils::generate_request_id;

static CONFIG_CACHE: OnceLock<Arc<Config>> = OnceLock::new();

/// Main entry point for the Cloudflare Worker.
///
/// Sets up panic reporting, loads configuration (cached per isolate), builds
/// the request context and hands the request to the router.
#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    console_error_panic_hook::set_once();

    let headers = req.headers();
    let ctx = RequestContext::new(generate_request_id(), Utc::now()).with_client(
        headers.get("CF-Connecting-IP")?,
        headers.get("User-Agent")?,
        headers.get("Referer")?,
    );

    let config = match load_config(&env).await {
        Ok(config) => config,
        Err(e) => return handlers::finish(&ctx, Err(e)),
    };

    router::handle_request(req, env, config, ctx).await
}

async fn load_config(env: &Env) -> errors::AppResult<Arc<Config>> {
    if let Some(config) = CONFIG_CACHE.get() {
        return Ok(config.clone());
    }

    let kv = env.kv(STORAGE_CONFIG_KV_NAME)?;
    let config = Arc::new(Config::load(&kv).await?);
    let _ = CONFIG_CACHE.set(config.clone());
    Ok(config)
}
