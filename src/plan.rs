//! # Plan Resolver
//!
//! Maps a user to their current plan and keeps the assignment in line with
//! the billing provider.
//!
//! - [`PlanResolver::revalidate`] runs on every account page load. It fails
//!   open: when billing cannot be reached the assignment is left alone.
//! - [`PlanResolver::apply_checkout`] runs when the user comes back from a
//!   checkout. It fails loud and writes nothing unless every check passes.

use crate::billing::BillingProvider;
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::log_data;
use crate::models::{PlanAssignment, PlanView, User};
use crate::store::ShareStore;

/// Plan name shown when the assigned plan row is missing.
const FALLBACK_PLAN_NAME: &str = "Free";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Revalidation {
    /// No paid plan or no subscription to check.
    Skipped,
    /// The subscription is still active.
    Confirmed,
    /// The subscription lapsed and the user is back on the default plan.
    Downgraded,
    /// Billing could not be asked; nothing changed.
    Unverified,
}

pub struct PlanResolver<'a> {
    store: &'a dyn ShareStore,
    default_plan_id: i64,
}

impl<'a> PlanResolver<'a> {
    pub fn new(store: &'a dyn ShareStore, default_plan_id: i64) -> Self {
        Self {
            store,
            default_plan_id,
        }
    }

    /// Only storage errors fail this. A user without an assignment is on the
    /// default plan.
    pub async fn resolve_plan(&self, user_id: &str) -> AppResult<PlanView> {
        let plan_id = self
            .store
            .get_assignment(user_id)
            .await?
            .map(|assignment| assignment.plan_id)
            .unwrap_or(self.default_plan_id);

        Ok(match self.store.get_plan(plan_id).await? {
            Some(plan) => PlanView {
                plan_id: plan.id,
                plan_name: plan.name,
                quota_mb: plan.quota_mb,
            },
            None => PlanView {
                plan_id,
                plan_name: FALLBACK_PLAN_NAME.to_string(),
                quota_mb: 0,
            },
        })
    }

    pub async fn revalidate(
        &self,
        ctx: &RequestContext,
        billing: &dyn BillingProvider,
        user_id: &str,
    ) -> AppResult<Revalidation> {
        let Some(assignment) = self.store.get_assignment(user_id).await? else {
            return Ok(Revalidation::Skipped);
        };
        if assignment.plan_id == self.default_plan_id {
            return Ok(Revalidation::Skipped);
        }
        let Some(subscription_id) = assignment.subscription_id.as_deref() else {
            return Ok(Revalidation::Skipped);
        };

        let subscription = match billing.get_subscription(subscription_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                ctx.logger.warn(
                    "Subscription lookup failed, keeping current plan",
                    log_data!("user_id" => user_id, "error" => e.to_string()),
                );
                return Ok(Revalidation::Unverified);
            }
        };

        if subscription.is_active() {
            return Ok(Revalidation::Confirmed);
        }

        // Conditional on the plan we checked, so a checkout that landed in
        // between is not undone.
        let changed = self
            .store
            .reset_assignment(user_id, assignment.plan_id, self.default_plan_id, ctx.now)
            .await?;

        ctx.logger.info(
            "Subscription inactive, plan downgraded",
            log_data!(
                "user_id" => user_id,
                "from_plan" => assignment.plan_id,
                "status" => subscription.status,
                "changed" => changed
            ),
        );
        Ok(if changed {
            Revalidation::Downgraded
        } else {
            Revalidation::Unverified
        })
    }

    pub async fn apply_checkout(
        &self,
        ctx: &RequestContext,
        billing: &dyn BillingProvider,
        checkout_id: &str,
        user: &User,
    ) -> AppResult<PlanView> {
        let checkout = billing.get_checkout(checkout_id).await?;
        if !checkout.succeeded() {
            return Err(AppError::validation("Checkout has not been paid"));
        }

        if checkout.customer_external_id.as_deref() != Some(user.external_id.as_str()) {
            ctx.logger.warn(
                "Checkout does not belong to user",
                log_data!("checkout_id" => checkout_id, "user_id" => user.id.as_str()),
            );
            return Err(AppError::Unauthorized);
        }

        let customer_id = checkout
            .customer_id
            .as_deref()
            .ok_or_else(|| AppError::upstream("billing", "checkout has no customer"))?;
        let subscription = billing
            .list_subscriptions(customer_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::validation("No subscription found for checkout"))?;
        if !subscription.is_active() {
            return Err(AppError::validation("Subscription is not active"));
        }

        let product_id = checkout
            .product_id
            .as_deref()
            .ok_or_else(|| AppError::upstream("billing", "checkout has no product"))?;
        let plan = self
            .store
            .find_plan_by_product(product_id)
            .await?
            .ok_or_else(|| AppError::validation("Checkout product does not match any plan"))?;

        let created_at = self
            .store
            .get_assignment(&user.id)
            .await?
            .map(|existing| existing.created_at)
            .unwrap_or(ctx.now);
        self.store
            .upsert_assignment(&PlanAssignment {
                user_id: user.id.clone(),
                plan_id: plan.id,
                subscription_id: Some(subscription.id.clone()),
                created_at,
                updated_at: ctx.now,
            })
            .await?;

        ctx.logger.info(
            "Plan upgraded from checkout",
            log_data!(
                "user_id" => user.id.as_str(),
                "plan_id" => plan.id,
                "subscription_id" => subscription.id
            ),
        );

        Ok(PlanView {
            plan_id: plan.id,
            plan_name: plan.name,
            quota_mb: plan.quota_mb,
        })
    }
}
