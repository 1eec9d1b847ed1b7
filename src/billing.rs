//! # Billing Collaborator
//!
//! The subscription provider the plan resolver reconciles against. The core
//! only needs checkout and subscription status plus a customer-portal link,
//! expressed by [`BillingProvider`]. [`PolarBillingClient`] talks to the Polar
//! REST API through the Workers fetch API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use worker::wasm_bindgen::JsValue;
use worker::{Headers, Method, Request, RequestInit};

use crate::errors::{AppError, AppResult};
use crate::utils::{fetch_json, with_timeout};

const SERVICE: &str = "billing";

/// Checkout status reported once payment went through.
pub const CHECKOUT_SUCCEEDED: &str = "succeeded";

/// The only subscription status that keeps a paid plan.
pub const SUBSCRIPTION_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: String,
    pub status: String,
    pub customer_id: Option<String>,
    /// Identity-provider user id the checkout was opened for.
    pub customer_external_id: Option<String>,
    pub product_id: Option<String>,
}

impl Checkout {
    pub fn succeeded(&self) -> bool {
        self.status == CHECKOUT_SUCCEEDED
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SUBSCRIPTION_ACTIVE
    }
}

#[async_trait(?Send)]
pub trait BillingProvider {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<Checkout>;

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription>;

    /// Subscriptions of a billing customer, most recent first.
    async fn list_subscriptions(&self, customer_id: &str) -> AppResult<Vec<Subscription>>;

    /// Returns the URL of a self-service portal session.
    async fn create_portal_session(&self, customer_external_id: &str) -> AppResult<String>;
}

#[derive(Deserialize)]
struct ListResource<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct CustomerSession {
    customer_portal_url: String,
}

/// Billing provider backed by the Polar API.
pub struct PolarBillingClient {
    api_url: String,
    access_token: String,
    timeout: Duration,
}

impl PolarBillingClient {
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_url, path)
    }

    fn request(&self, method: Method, url: &str, body: Option<serde_json::Value>) -> AppResult<Request> {
        let headers = Headers::new();
        headers.set("Authorization", &format!("Bearer {}", self.access_token))?;
        headers.set("Accept", "application/json")?;
        if body.is_some() {
            headers.set("Content-Type", "application/json")?;
        }

        let mut init = RequestInit::new();
        init.with_method(method).with_headers(headers);
        if let Some(body) = body {
            init.with_body(Some(JsValue::from(body.to_string())));
        }
        Ok(Request::new_with_init(url, &init)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> AppResult<T> {
        let request = self.request(Method::Get, &url, None)?;
        with_timeout(SERVICE, self.timeout, fetch_json(SERVICE, request)).await
    }
}

#[async_trait(?Send)]
impl BillingProvider for PolarBillingClient {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<Checkout> {
        self.get_json(self.url(&format!("checkouts/{}", checkout_id)))
            .await
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.get_json(self.url(&format!("subscriptions/{}", subscription_id)))
            .await
    }

    async fn list_subscriptions(&self, customer_id: &str) -> AppResult<Vec<Subscription>> {
        let url = self.url(&format!(
            "subscriptions/?customer_id={}&sorting=-started_at&limit=10",
            customer_id
        ));
        let page: ListResource<Subscription> = self.get_json(url).await?;
        Ok(page.items)
    }

    async fn create_portal_session(&self, customer_external_id: &str) -> AppResult<String> {
        let body = serde_json::json!({ "customer_external_id": customer_external_id });
        let request = self.request(Method::Post, &self.url("customer-sessions/"), Some(body))?;
        let session: CustomerSession =
            with_timeout(SERVICE, self.timeout, fetch_json(SERVICE, request)).await?;
        Ok(session.customer_portal_url)
    }
}

/// Used when no billing token is configured. Every call fails as upstream.
pub struct DisabledBilling;

#[async_trait(?Send)]
impl BillingProvider for DisabledBilling {
    async fn get_checkout(&self, _checkout_id: &str) -> AppResult<Checkout> {
        Err(disabled())
    }

    async fn get_subscription(&self, _subscription_id: &str) -> AppResult<Subscription> {
        Err(disabled())
    }

    async fn list_subscriptions(&self, _customer_id: &str) -> AppResult<Vec<Subscription>> {
        Err(disabled())
    }

    async fn create_portal_session(&self, _customer_external_id: &str) -> AppResult<String> {
        Err(disabled())
    }
}

fn disabled() -> AppError {
    AppError::upstream(SERVICE, "billing access token is not configured")
}
