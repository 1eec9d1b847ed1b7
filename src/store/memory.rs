//! In-memory [`ShareStore`] backing the unit tests.
//!
//! A single mutex guards all tables, which makes every method atomic and
//! gives the same unique-slug guarantee as the D1 schema.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ShareStore, StoreError};
use crate::models::{
    CompletedUpload, DownloadRecord, DownloadTarget, FileRecord, NewShareBundle, Plan,
    PlanAssignment, QuotaRecord, Share, ShareSettings, ShareSnapshot, ShareSummary,
    UploadSignature, User, VisitRecord,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    plans: HashMap<i64, Plan>,
    assignments: HashMap<String, PlanAssignment>,
    quotas: HashMap<String, QuotaRecord>,
    shares: HashMap<String, Share>,
    settings: HashMap<String, ShareSettings>,
    files: Vec<FileRecord>,
    signatures: HashMap<String, UploadSignature>,
    visits: Vec<VisitRecord>,
    downloads: Vec<DownloadRecord>,
    fail_metering: bool,
    /// Number of upcoming `insert_share` calls that lose a slug race.
    failing_inserts: u32,
}

impl Tables {
    fn snapshot(&self, share: &Share) -> ShareSnapshot {
        ShareSnapshot {
            share: share.clone(),
            settings: self.settings.get(&share.id).cloned(),
            files: self
                .files
                .iter()
                .filter(|f| f.share_id == share.id && f.deleted_at.is_none())
                .cloned()
                .collect(),
        }
    }

    fn check_metering(&self) -> Result<(), StoreError> {
        if self.fail_metering {
            return Err(StoreError::Backend("metering disabled".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds reference data.
    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for plan in plans {
                tables.plans.insert(plan.id, plan);
            }
        }
        store
    }

    /// Makes counter and analytics writes fail, to exercise best-effort paths.
    pub fn set_metering_failure(&self, fail: bool) {
        self.lock().fail_metering = fail;
    }

    /// Makes the next `count` share inserts fail as if another request
    /// claimed the slug between the existence check and the insert.
    pub fn fail_next_inserts(&self, count: u32) {
        self.lock().failing_inserts = count;
    }

    pub fn set_used_quota(&self, user_id: &str, used_mb: u64) {
        self.lock().quotas.insert(
            user_id.to_string(),
            QuotaRecord {
                user_id: user_id.to_string(),
                used_mb,
            },
        );
    }

    pub fn share(&self, share_id: &str) -> Option<Share> {
        self.lock().shares.get(share_id).cloned()
    }

    pub fn settings(&self, share_id: &str) -> Option<ShareSettings> {
        self.lock().settings.get(share_id).cloned()
    }

    pub fn visit_count(&self) -> usize {
        self.lock().visits.len()
    }

    pub fn download_log_count(&self) -> usize {
        self.lock().downloads.len()
    }

    pub fn share_count(&self) -> usize {
        self.lock().shares.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait(?Send)]
impl ShareStore for MemoryStore {
    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn create_user(
        &self,
        user: &User,
        assignment: &PlanAssignment,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.users.values().any(|u| u.external_id == user.external_id) {
            return Err(StoreError::UniqueViolation("user".into()));
        }
        tables.users.insert(user.id.clone(), user.clone());
        tables
            .assignments
            .insert(user.id.clone(), assignment.clone());
        tables.quotas.insert(
            user.id.clone(),
            QuotaRecord {
                user_id: user.id.clone(),
                used_mb: 0,
            },
        );
        Ok(())
    }

    async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, StoreError> {
        Ok(self.lock().plans.get(&plan_id).cloned())
    }

    async fn find_plan_by_product(&self, product_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self
            .lock()
            .plans
            .values()
            .find(|p| p.product_id.as_deref() == Some(product_id))
            .cloned())
    }

    async fn get_assignment(&self, user_id: &str) -> Result<Option<PlanAssignment>, StoreError> {
        Ok(self.lock().assignments.get(user_id).cloned())
    }

    async fn upsert_assignment(&self, assignment: &PlanAssignment) -> Result<(), StoreError> {
        self.lock()
            .assignments
            .insert(assignment.user_id.clone(), assignment.clone());
        Ok(())
    }

    async fn reset_assignment(
        &self,
        user_id: &str,
        from_plan: i64,
        to_plan: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.assignments.get_mut(user_id) {
            Some(assignment) if assignment.plan_id == from_plan => {
                assignment.plan_id = to_plan;
                assignment.subscription_id = None;
                assignment.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_quota(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError> {
        Ok(self.lock().quotas.get(user_id).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.lock().settings.values().any(|s| s.custom_slug == slug))
    }

    async fn insert_share(&self, bundle: &NewShareBundle) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.failing_inserts > 0 {
            tables.failing_inserts -= 1;
            return Err(StoreError::UniqueViolation("Custom URL".into()));
        }
        if tables
            .settings
            .values()
            .any(|s| s.custom_slug == bundle.settings.custom_slug)
        {
            return Err(StoreError::UniqueViolation("Custom URL".into()));
        }
        if tables.shares.contains_key(&bundle.share.id) {
            return Err(StoreError::UniqueViolation("share".into()));
        }
        tables
            .shares
            .insert(bundle.share.id.clone(), bundle.share.clone());
        tables
            .settings
            .insert(bundle.share.id.clone(), bundle.settings.clone());
        tables.signatures.insert(
            bundle.signature.signature.clone(),
            bundle.signature.clone(),
        );
        Ok(())
    }

    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<ShareSnapshot>, StoreError> {
        let tables = self.lock();
        let share = tables
            .settings
            .values()
            .find(|s| s.custom_slug == slug)
            .and_then(|s| tables.shares.get(&s.share_id));
        Ok(share.map(|share| tables.snapshot(share)))
    }

    async fn find_share_by_id(&self, share_id: &str) -> Result<Option<ShareSnapshot>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .shares
            .get(share_id)
            .map(|share| tables.snapshot(share)))
    }

    async fn find_download_target(
        &self,
        file_id: &str,
    ) -> Result<Option<DownloadTarget>, StoreError> {
        let tables = self.lock();
        let Some(file) = tables
            .files
            .iter()
            .find(|f| f.id == file_id && f.deleted_at.is_none())
        else {
            return Ok(None);
        };
        Ok(tables.shares.get(&file.share_id).map(|share| DownloadTarget {
            file: file.clone(),
            share: share.clone(),
            settings: tables.settings.get(&share.id).cloned(),
        }))
    }

    async fn increment_view_count(
        &self,
        share_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_metering()?;
        let share = tables.shares.get_mut(share_id).ok_or(StoreError::NotFound)?;
        share.view_count += 1;
        share.updated_at = now;
        Ok(())
    }

    async fn increment_download_count(
        &self,
        share_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_metering()?;
        let share = tables.shares.get_mut(share_id).ok_or(StoreError::NotFound)?;
        share.download_count += 1;
        share.updated_at = now;
        Ok(())
    }

    async fn record_visit(&self, visit: &VisitRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_metering()?;
        tables.visits.push(visit.clone());
        Ok(())
    }

    async fn record_download(&self, download: &DownloadRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check_metering()?;
        tables.downloads.push(download.clone());
        Ok(())
    }

    async fn soft_delete_share(
        &self,
        share_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.shares.get_mut(share_id) {
            Some(share) if share.owner_id == owner_id && share.deleted_at.is_none() => {
                share.deleted_at = Some(now);
                share.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_shares(&self, owner_id: &str) -> Result<Vec<ShareSummary>, StoreError> {
        let tables = self.lock();
        let mut shares: Vec<ShareSummary> = tables
            .shares
            .values()
            .filter(|s| s.owner_id == owner_id && s.deleted_at.is_none())
            .map(|s| ShareSummary {
                id: s.id.clone(),
                title: s.title.clone(),
                description: s.description.clone(),
                file_count: s.file_count,
                size: s.size,
                download_count: s.download_count,
                view_count: s.view_count,
                created_at: s.created_at,
                is_public: s.is_public,
                custom_slug: tables.settings.get(&s.id).map(|st| st.custom_slug.clone()),
            })
            .collect();
        shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shares)
    }

    async fn find_upload_signature(
        &self,
        signature: &str,
    ) -> Result<Option<UploadSignature>, StoreError> {
        Ok(self.lock().signatures.get(signature).cloned())
    }

    async fn complete_upload(&self, upload: &CompletedUpload) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(consumed_at) = tables
            .signatures
            .values()
            .find(|s| s.id == upload.signature_id)
            .map(|s| s.consumed_at)
        else {
            return Err(StoreError::NotFound);
        };
        if consumed_at.is_some() {
            return Ok(false);
        }
        if !tables.shares.contains_key(&upload.share_id) {
            return Err(StoreError::NotFound);
        }

        if let Some(signature) = tables
            .signatures
            .values_mut()
            .find(|s| s.id == upload.signature_id)
        {
            signature.consumed_at = Some(upload.completed_at);
        }
        let share = tables
            .shares
            .get_mut(&upload.share_id)
            .ok_or(StoreError::NotFound)?;
        share.file_count += upload.files.len() as u64;
        share.size += upload.total_size;
        share.updated_at = upload.completed_at;

        tables.files.extend(upload.files.iter().cloned());
        tables
            .quotas
            .entry(upload.owner_id.clone())
            .or_insert_with(|| QuotaRecord {
                user_id: upload.owner_id.clone(),
                used_mb: 0,
            })
            .used_mb += upload.consumed_mb;
        Ok(true)
    }
}
