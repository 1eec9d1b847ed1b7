//! # Quota Ledger
//!
//! Admission check for new shares. Quota is advisory: nothing is reserved
//! between the check and the upload completing, so two concurrent requests
//! can both be admitted. Consumption is charged when the file service reports
//! the upload complete (see [`crate::shares::ShareLifecycle::complete_upload`]).

use crate::errors::AppResult;
use crate::plan::PlanResolver;
use crate::store::ShareStore;
use crate::utils::bytes_to_megabytes;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed {
        requested_mb: u64,
        used_mb: u64,
        quota_mb: u64,
    },
    QuotaExceeded {
        requested_mb: u64,
        used_mb: u64,
        quota_mb: u64,
    },
}

impl Admission {
    /// Pure comparison: rejects iff `ceil(bytes / 1e6) + used > quota`.
    pub fn evaluate(incoming_bytes: u64, used_mb: u64, quota_mb: u64) -> Self {
        let requested_mb = bytes_to_megabytes(incoming_bytes);
        if requested_mb.saturating_add(used_mb) > quota_mb {
            Admission::QuotaExceeded {
                requested_mb,
                used_mb,
                quota_mb,
            }
        } else {
            Admission::Allowed {
                requested_mb,
                used_mb,
                quota_mb,
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

pub struct QuotaLedger<'a> {
    store: &'a dyn ShareStore,
    plans: PlanResolver<'a>,
}

impl<'a> QuotaLedger<'a> {
    pub fn new(store: &'a dyn ShareStore, default_plan_id: i64) -> Self {
        Self {
            store,
            plans: PlanResolver::new(store, default_plan_id),
        }
    }

    pub async fn used_mb(&self, user_id: &str) -> AppResult<u64> {
        Ok(self
            .store
            .get_quota(user_id)
            .await?
            .map(|record| record.used_mb)
            .unwrap_or(0))
    }

    pub async fn check_admission(&self, user_id: &str, incoming_bytes: u64) -> AppResult<Admission> {
        let plan = self.plans.resolve_plan(user_id).await?;
        let used_mb = self.used_mb(user_id).await?;
        Ok(Admission::evaluate(incoming_bytes, used_mb, plan.quota_mb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{paid_plan_store, seed_user, FREE};
    use futures::executor::block_on;

    #[test]
    fn admission_rejects_only_when_strictly_over() {
        assert!(Admission::evaluate(1_000_000, 999, 1_000).is_allowed());
        assert!(!Admission::evaluate(1_000_001, 999, 1_000).is_allowed());
        assert!(Admission::evaluate(0, 1_000, 1_000).is_allowed());
        assert!(!Admission::evaluate(1, 1_000, 1_000).is_allowed());
    }

    #[test]
    fn admission_matches_ceiling_formula() {
        for bytes in [0u64, 1, 999_999, 1_000_000, 1_000_001, 42_424_242] {
            for used in [0u64, 10, 957, 999] {
                let expected_reject = bytes.div_ceil(1_000_000) + used > 1_000;
                assert_eq!(
                    !Admission::evaluate(bytes, used, 1_000).is_allowed(),
                    expected_reject,
                    "bytes={} used={}",
                    bytes,
                    used
                );
            }
        }
    }

    #[test]
    fn ledger_reads_plan_and_consumption() {
        let store = paid_plan_store();
        let user = seed_user(&store, "google-1");
        store.set_used_quota(&user.id, 999);
        let ledger = QuotaLedger::new(&store, FREE);

        let admission = block_on(ledger.check_admission(&user.id, 500_000)).unwrap();
        assert_eq!(
            admission,
            Admission::Allowed {
                requested_mb: 1,
                used_mb: 999,
                quota_mb: 1_000
            }
        );

        let admission = block_on(ledger.check_admission(&user.id, 1_500_000)).unwrap();
        assert!(!admission.is_allowed());
    }
}
