//! Shared fixtures and fake collaborators for unit tests.

use std::cell::Cell;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::executor::block_on;

use crate::billing::{BillingProvider, Checkout, Subscription};
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::identity::{IdentityProvider, Session, SessionUser};
use crate::models::{Plan, PlanAssignment, User};
use crate::store::memory::MemoryStore;
use crate::store::ShareStore;

pub const FREE: i64 = 1;
pub const PRO: i64 = 2;

pub fn ctx() -> RequestContext {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    RequestContext::new("test-request".into(), now).with_client(
        Some("203.0.113.7".into()),
        Some("test-agent".into()),
        None,
    )
}

pub fn paid_plan_store() -> MemoryStore {
    MemoryStore::with_plans([
        Plan {
            id: FREE,
            name: "Free".into(),
            quota_mb: 1_000,
            product_id: None,
        },
        Plan {
            id: PRO,
            name: "Pro".into(),
            quota_mb: 10_000,
            product_id: Some("prod_pro".into()),
        },
    ])
}

pub fn seed_user(store: &MemoryStore, external_id: &str) -> User {
    let now = ctx().now;
    let user = User {
        id: format!("user-{}", external_id),
        external_id: external_id.into(),
        name: "Test User".into(),
        email: format!("{}@example.com", external_id),
        avatar_url: None,
        created_at: now,
        updated_at: now,
    };
    block_on(store.create_user(
        &user,
        &PlanAssignment {
            user_id: user.id.clone(),
            plan_id: FREE,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        },
    ))
    .unwrap();
    user
}

#[derive(Default)]
pub struct FakeBilling {
    checkouts: HashMap<String, Checkout>,
    subscriptions: HashMap<String, Subscription>,
    customer_subscriptions: HashMap<String, Vec<Subscription>>,
    portal_url: Option<String>,
    failing: bool,
    calls: Cell<u32>,
}

impl FakeBilling {
    pub fn with_checkout(mut self, checkout: Checkout) -> Self {
        self.checkouts.insert(checkout.id.clone(), checkout);
        self
    }

    pub fn with_subscription(mut self, id: &str, status: &str) -> Self {
        self.subscriptions.insert(
            id.into(),
            Subscription {
                id: id.into(),
                status: status.into(),
            },
        );
        self
    }

    pub fn with_customer_subscriptions(mut self, customer_id: &str, subs: Vec<Subscription>) -> Self {
        self.customer_subscriptions.insert(customer_id.into(), subs);
        self
    }

    pub fn with_portal(mut self, url: &str) -> Self {
        self.portal_url = Some(url.into());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    fn enter(&self) -> AppResult<()> {
        self.calls.set(self.calls.get() + 1);
        if self.failing {
            return Err(AppError::upstream("billing", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl BillingProvider for FakeBilling {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<Checkout> {
        self.enter()?;
        self.checkouts
            .get(checkout_id)
            .cloned()
            .ok_or_else(|| AppError::upstream("billing", "HTTP 404"))
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.enter()?;
        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| AppError::upstream("billing", "HTTP 404"))
    }

    async fn list_subscriptions(&self, customer_id: &str) -> AppResult<Vec<Subscription>> {
        self.enter()?;
        Ok(self
            .customer_subscriptions
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_portal_session(&self, _customer_external_id: &str) -> AppResult<String> {
        self.enter()?;
        self.portal_url
            .clone()
            .ok_or_else(|| AppError::upstream("billing", "HTTP 422"))
    }
}

/// Accepts exactly one cookie value.
pub struct FakeIdentity {
    pub cookie: String,
    pub external_id: String,
}

#[async_trait(?Send)]
impl IdentityProvider for FakeIdentity {
    async fn session(&self, cookie_header: Option<&str>) -> AppResult<Option<Session>> {
        if cookie_header != Some(self.cookie.as_str()) {
            return Ok(None);
        }
        Ok(Some(Session {
            user: SessionUser {
                id: self.external_id.clone(),
                name: "Ada".into(),
                email: "ada@example.com".into(),
                image: Some("https://example.com/ada.png".into()),
            },
        }))
    }
}
