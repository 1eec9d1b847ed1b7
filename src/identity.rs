//! Identity collaborator: turns request credentials into an optional session.
//!
//! Sessions are owned by an external auth service. The worker forwards the
//! caller's `Cookie` header to `{identity_service_url}/api/auth/get-session`
//! and treats a `null` answer as anonymous.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use worker::{Headers, Method, Request, RequestInit};

use crate::errors::AppResult;
use crate::models::NewUser;
use crate::utils::{fetch_json, with_timeout};

const SERVICE: &str = "identity";

/// Authenticated caller as reported by the identity service.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Session {
    pub user: SessionUser,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub image: Option<String>,
}

impl Session {
    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            external_id: self.user.id.clone(),
            name: self.user.name.clone(),
            email: self.user.email.clone(),
            avatar_url: self.user.image.clone(),
        }
    }
}

#[async_trait(?Send)]
pub trait IdentityProvider {
    async fn session(&self, cookie_header: Option<&str>) -> AppResult<Option<Session>>;
}

pub struct AuthServiceClient {
    base_url: String,
    timeout: Duration,
}

impl AuthServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait(?Send)]
impl IdentityProvider for AuthServiceClient {
    async fn session(&self, cookie_header: Option<&str>) -> AppResult<Option<Session>> {
        let Some(cookie) = cookie_header else {
            return Ok(None);
        };

        let headers = Headers::new();
        headers.set("Cookie", cookie)?;
        headers.set("Accept", "application/json")?;
        let mut init = RequestInit::new();
        init.with_method(Method::Get).with_headers(headers);

        let url = format!("{}/api/auth/get-session", self.base_url);
        let request = Request::new_with_init(&url, &init)?;
        with_timeout(SERVICE, self.timeout, fetch_json(SERVICE, request)).await
    }
}

/// Used when no identity service is configured: every caller is anonymous.
pub struct AnonymousIdentity;

#[async_trait(?Send)]
impl IdentityProvider for AnonymousIdentity {
    async fn session(&self, _cookie_header: Option<&str>) -> AppResult<Option<Session>> {
        Ok(None)
    }
}
