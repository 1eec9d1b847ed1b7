//! # Share Store
//!
//! The relational state the share service relies on, behind one trait so the
//! core services can run against D1 in production and against
//! [`memory::MemoryStore`] in tests.
//!
//! Implementations must uphold two guarantees the services depend on:
//!
//! - `share_settings.custom_slug` is unique. [`ShareStore::insert_share`]
//!   fails with [`StoreError::UniqueViolation`] when a concurrent request
//!   claimed the same slug first. The slug allocator's existence check is
//!   only an optimization.
//! - Methods documented as atomic either apply every row or none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    CompletedUpload, DownloadRecord, DownloadTarget, NewShareBundle, Plan, PlanAssignment,
    QuotaRecord, ShareSnapshot, ShareSummary, UploadSignature, User, VisitRecord,
};

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} already exists")]
    UniqueViolation(String),
    #[error("row not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait(?Send)]
pub trait ShareStore {
    async fn find_user_by_external_id(&self, external_id: &str)
        -> Result<Option<User>, StoreError>;

    /// Atomically inserts the user, their plan assignment and an empty quota record.
    async fn create_user(&self, user: &User, assignment: &PlanAssignment)
        -> Result<(), StoreError>;

    async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, StoreError>;

    async fn find_plan_by_product(&self, product_id: &str) -> Result<Option<Plan>, StoreError>;

    async fn get_assignment(&self, user_id: &str) -> Result<Option<PlanAssignment>, StoreError>;

    async fn upsert_assignment(&self, assignment: &PlanAssignment) -> Result<(), StoreError>;

    /// Moves a user from `from_plan` to `to_plan` and clears the subscription id,
    /// but only while the assignment still points at `from_plan`.
    ///
    /// Returns `true` when the row changed.
    async fn reset_assignment(
        &self,
        user_id: &str,
        from_plan: i64,
        to_plan: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get_quota(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError>;

    /// Atomically inserts the share, its settings and its upload signature.
    async fn insert_share(&self, bundle: &NewShareBundle) -> Result<(), StoreError>;

    /// Soft-deleted shares are returned as-is; callers decide visibility.
    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<ShareSnapshot>, StoreError>;

    async fn find_share_by_id(&self, share_id: &str) -> Result<Option<ShareSnapshot>, StoreError>;

    async fn find_download_target(&self, file_id: &str)
        -> Result<Option<DownloadTarget>, StoreError>;

    async fn increment_view_count(&self, share_id: &str, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    async fn increment_download_count(
        &self,
        share_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn record_visit(&self, visit: &VisitRecord) -> Result<(), StoreError>;

    async fn record_download(&self, download: &DownloadRecord) -> Result<(), StoreError>;

    /// Marks the share deleted if it belongs to `owner_id` and is still live.
    ///
    /// Returns `false` when no such share exists.
    async fn soft_delete_share(
        &self,
        share_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Live shares of `owner_id`, newest first.
    async fn list_active_shares(&self, owner_id: &str) -> Result<Vec<ShareSummary>, StoreError>;

    async fn find_upload_signature(&self, signature: &str)
        -> Result<Option<UploadSignature>, StoreError>;

    /// Atomically records the uploaded files, updates the share aggregates,
    /// charges the owner's quota and consumes the signature.
    ///
    /// Returns `false` if the signature was already consumed.
    async fn complete_upload(&self, upload: &CompletedUpload) -> Result<bool, StoreError>;
}
