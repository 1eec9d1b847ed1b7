//! # Accounts
//!
//! Lazy user provisioning plus the two authenticated read models: the account
//! overview shown on the main page and the owner dashboard.

use serde::Serialize;

use crate::billing::BillingProvider;
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::identity::Session;
use crate::log_data;
use crate::models::{PlanAssignment, ShareStats, ShareSummary, User};
use crate::plan::PlanResolver;
use crate::quota::QuotaLedger;
use crate::store::{ShareStore, StoreError};
use crate::utils::generate_id;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccountOverview {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub plan: String,
    pub plan_id: i64,
    pub quota: u64,
    pub used_quota: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dashboard {
    pub user: AccountOverview,
    pub stats: ShareStats,
    pub active_shares: Vec<ShareSummary>,
    pub customer_portal_url: Option<String>,
}

pub struct AccountService<'a> {
    store: &'a dyn ShareStore,
    default_plan_id: i64,
}

impl<'a> AccountService<'a> {
    pub fn new(store: &'a dyn ShareStore, default_plan_id: i64) -> Self {
        Self {
            store,
            default_plan_id,
        }
    }

    /// Returns the account linked to `session`, creating it on first sight.
    pub async fn ensure_user(&self, ctx: &RequestContext, session: &Session) -> AppResult<User> {
        if let Some(user) = self.store.find_user_by_external_id(&session.user.id).await? {
            return Ok(user);
        }

        let profile = session.to_new_user();
        let user = User {
            id: generate_id(),
            external_id: profile.external_id,
            name: profile.name,
            email: profile.email,
            avatar_url: profile.avatar_url,
            created_at: ctx.now,
            updated_at: ctx.now,
        };
        let assignment = PlanAssignment {
            user_id: user.id.clone(),
            plan_id: self.default_plan_id,
            subscription_id: None,
            created_at: ctx.now,
            updated_at: ctx.now,
        };

        match self.store.create_user(&user, &assignment).await {
            Ok(()) => {
                ctx.logger.info(
                    "User provisioned",
                    log_data!("user_id" => user.id.as_str(), "plan_id" => self.default_plan_id),
                );
                Ok(user)
            }
            // A parallel first request created the same account.
            Err(StoreError::UniqueViolation(_)) => self
                .store
                .find_user_by_external_id(&session.user.id)
                .await?
                .ok_or(AppError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Main page load: reconciles the plan, then reports plan and quota.
    ///
    /// With a `checkout_id` the checkout is applied and any failure is
    /// returned. Without one, the subscription is revalidated and billing
    /// outages leave the plan untouched.
    pub async fn overview(
        &self,
        ctx: &RequestContext,
        billing: &dyn BillingProvider,
        user: &User,
        checkout_id: Option<&str>,
    ) -> AppResult<AccountOverview> {
        let plans = PlanResolver::new(self.store, self.default_plan_id);
        match checkout_id {
            Some(checkout_id) => {
                plans.apply_checkout(ctx, billing, checkout_id, user).await?;
            }
            None => {
                plans.revalidate(ctx, billing, &user.id).await?;
            }
        }
        self.snapshot(user).await
    }

    pub async fn dashboard(
        &self,
        ctx: &RequestContext,
        billing: &dyn BillingProvider,
        user: &User,
    ) -> AppResult<Dashboard> {
        let overview = self.snapshot(user).await?;
        let active_shares = self.store.list_active_shares(&user.id).await?;
        let stats = ShareStats::from_summaries(&active_shares);

        let customer_portal_url = match billing.create_portal_session(&user.external_id).await {
            Ok(url) => Some(url),
            Err(e) => {
                ctx.logger.warn(
                    "Error creating customer portal session",
                    log_data!("user_id" => user.id.as_str(), "error" => e.to_string()),
                );
                None
            }
        };

        Ok(Dashboard {
            user: overview,
            stats,
            active_shares,
            customer_portal_url,
        })
    }

    async fn snapshot(&self, user: &User) -> AppResult<AccountOverview> {
        let plan = PlanResolver::new(self.store, self.default_plan_id)
            .resolve_plan(&user.id)
            .await?;
        let used_quota = QuotaLedger::new(self.store, self.default_plan_id)
            .used_mb(&user.id)
            .await?;
        Ok(AccountOverview {
            id: user.id.clone(),
            name: user.name.clone(),
            avatar: user.avatar_url.clone(),
            plan: plan.plan_name,
            plan_id: plan.plan_id,
            quota: plan.quota_mb,
            used_quota,
        })
    }
}
