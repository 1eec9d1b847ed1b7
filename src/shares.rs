//! # Share Lifecycle Manager
//!
//! Creates shares, serves the public read and download paths, meters usage
//! and soft-deletes shares. It composes the quota ledger, slug allocator and
//! access guard over one [`ShareStore`].
//!
//! ## Creation
//!
//! Input is validated in full before anything is read from storage. The
//! share row, its settings row and its upload signature are then written in
//! a single atomic insert. A generated slug that loses an insert race to a
//! concurrent request is re-drawn; a custom slug that loses one is a conflict.
//!
//! ## Metering
//!
//! View and download counters, as well as analytics rows, are best-effort.
//! Failures are logged and never reach the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use worker::Url;

use crate::access::{AccessDecision, AccessGuard, ShareView};
use crate::config::Config;
use crate::constants::SLUG_INSERT_RETRIES;
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::extras::{ExtraFeaturesInput, ExtraLimits, ShareExtras};
use crate::log_data;
use crate::models::{
    CompletedUpload, DeclaredFile, DownloadRecord, FileRecord, NewShareBundle, Share,
    ShareSnapshot, UploadSignature, VisitRecord,
};
use crate::quota::{Admission, QuotaLedger};
use crate::signature::{SignatureClaims, UploadSigner};
use crate::slug::SlugAllocator;
use crate::store::{ShareStore, StoreError};
use crate::utils::{bytes_to_megabytes, generate_id};

/// Body of a share creation request.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateShareRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extra_features: ExtraFeaturesInput,
    #[serde(default)]
    pub files: Vec<DeclaredFile>,
    pub total_size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShareCreated {
    pub success: bool,
    pub share_id: String,
    pub share_slug: String,
    pub signature: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// How a public read names its share.
#[derive(Clone, Debug, PartialEq)]
pub enum ShareLookup {
    Slug(String),
    Id(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAuthorization {
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
    pub mimetype: String,
    pub download_url: String,
    pub message: &'static str,
}

/// What the file service may accept for a valid upload signature.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadGrant {
    pub share_id: String,
    pub expected_file_count: u64,
    pub expected_size_mb: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadCompleted {
    pub share_id: String,
    pub file_count: u64,
    pub total_size: u64,
}

pub struct ShareLifecycle<'a> {
    store: &'a dyn ShareStore,
    config: &'a Config,
    signer: &'a UploadSigner,
}

impl<'a> ShareLifecycle<'a> {
    pub fn new(store: &'a dyn ShareStore, config: &'a Config, signer: &'a UploadSigner) -> Self {
        Self {
            store,
            config,
            signer,
        }
    }

    pub async fn create_share(
        &self,
        ctx: &RequestContext,
        owner_id: &str,
        request: &CreateShareRequest,
    ) -> AppResult<ShareCreated> {
        if request.files.is_empty() {
            return Err(AppError::validation("No files provided"));
        }
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        let extras = ShareExtras::parse(
            &request.extra_features,
            ctx.now,
            ExtraLimits {
                max_expiry_days: self.config.max_expiry_days,
                min_custom_slug_len: self.config.min_custom_slug_len,
            },
        )?;
        let declared_total = request
            .files
            .iter()
            .try_fold(0u64, |acc, file| acc.checked_add(file.size));
        if declared_total != Some(request.total_size) {
            return Err(AppError::validation(
                "Total size does not match sum of file sizes",
            ));
        }

        let ledger = QuotaLedger::new(self.store, self.config.default_plan_id);
        if let Admission::QuotaExceeded {
            requested_mb,
            used_mb,
            quota_mb,
        } = ledger.check_admission(owner_id, request.total_size).await?
        {
            ctx.logger.info(
                "Share rejected by quota",
                log_data!(
                    "owner_id" => owner_id,
                    "requested_mb" => requested_mb,
                    "used_mb" => used_mb,
                    "quota_mb" => quota_mb
                ),
            );
            return Err(AppError::QuotaExceeded);
        }

        let allocator = SlugAllocator::new(self.store, self.config.min_custom_slug_len);
        let mut slug = allocator.allocate(extras.custom_slug()).await?;
        let share_id = generate_id();
        let description = request
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let signature = self.signer.issue(&SignatureClaims {
            user_id: owner_id.to_string(),
            share_id: share_id.clone(),
            issued_at: ctx.now,
        })?;

        let mut retries = 0;
        loop {
            let bundle = NewShareBundle {
                share: Share {
                    id: share_id.clone(),
                    owner_id: owner_id.to_string(),
                    title: title.to_string(),
                    description: description.clone(),
                    file_count: 0,
                    size: 0,
                    view_count: 0,
                    download_count: 0,
                    is_public: true,
                    deleted_at: None,
                    created_at: ctx.now,
                    updated_at: ctx.now,
                },
                settings: extras.to_settings(&share_id, &slug.value),
                signature: UploadSignature {
                    id: generate_id(),
                    share_id: share_id.clone(),
                    user_id: owner_id.to_string(),
                    signature: signature.clone(),
                    expires_at: ctx.now
                        + Duration::seconds(self.config.upload_signature_ttl_secs as i64),
                    expected_file_count: request.files.len() as u64,
                    expected_size_mb: bytes_to_megabytes(request.total_size),
                    consumed_at: None,
                },
            };

            match self.store.insert_share(&bundle).await {
                Ok(()) => break,
                Err(StoreError::UniqueViolation(_)) if !slug.generated => {
                    return Err(AppError::Conflict {
                        message: "Custom URL already taken".to_string(),
                    });
                }
                Err(StoreError::UniqueViolation(_)) if retries < SLUG_INSERT_RETRIES => {
                    retries += 1;
                    ctx.logger.warn(
                        "Generated slug lost an insert race, drawing another",
                        log_data!("slug" => slug.value.as_str(), "retry" => retries),
                    );
                    slug = allocator.allocate(None).await?;
                }
                Err(StoreError::UniqueViolation(_)) => return Err(AppError::SlugExhausted),
                Err(e) => return Err(e.into()),
            }
        }

        ctx.logger.info(
            "Share created",
            log_data!(
                "share_id" => share_id.as_str(),
                "owner_id" => owner_id,
                "slug" => slug.value.as_str(),
                "file_count" => request.files.len(),
                "total_size" => request.total_size
            ),
        );

        Ok(ShareCreated {
            success: true,
            share_id,
            share_slug: slug.value,
            signature,
            expiry: extras.expiry(),
        })
    }

    /// Public share page. Counts the view whenever the page is shown, including
    /// when the files stay hidden behind a password.
    pub async fn open_share(
        &self,
        ctx: &RequestContext,
        lookup: &ShareLookup,
        password: Option<&str>,
    ) -> AppResult<ShareView> {
        let snapshot: Option<ShareSnapshot> = match lookup {
            ShareLookup::Slug(slug) => self.store.find_share_by_slug(slug).await?,
            ShareLookup::Id(id) => self.store.find_share_by_id(id).await?,
        };

        let decision = AccessGuard::evaluate(
            snapshot.as_ref().map(|s| &s.share),
            snapshot.as_ref().and_then(|s| s.settings.as_ref()),
            ctx.now,
            password,
        );
        let snapshot = match snapshot {
            Some(snapshot) if decision.allows_view() => snapshot,
            _ => return Err(decision.denial().unwrap_or(AppError::NotFound)),
        };

        self.record_view(ctx, &snapshot.share.id).await;

        // Id lookups echo the id back, so the page keeps addressing the share by it.
        let share_slug = match lookup {
            ShareLookup::Slug(key) | ShareLookup::Id(key) => key.clone(),
        };
        Ok(ShareView::build(share_slug, &snapshot, decision, ctx.now))
    }

    /// Authorizes one file download. Unlike page views, a missing or wrong
    /// password stops the request here.
    pub async fn authorize_download(
        &self,
        ctx: &RequestContext,
        file_id: &str,
        password: Option<&str>,
        file_service_url: &str,
    ) -> AppResult<DownloadAuthorization> {
        let target = self.store.find_download_target(file_id).await?;
        let decision = AccessGuard::evaluate(
            target.as_ref().map(|t| &t.share),
            target.as_ref().and_then(|t| t.settings.as_ref()),
            ctx.now,
            password,
        );
        let target = match target {
            Some(target) if decision == AccessDecision::Granted => target,
            _ => return Err(decision.denial().unwrap_or(AppError::NotFound)),
        };

        self.record_download(ctx, &target.share.id, &target.file.id)
            .await;

        let mut download_url = Url::parse(&format!(
            "{}/f/{}",
            file_service_url.trim_end_matches('/'),
            target.file.id
        ))
        .map_err(|e| AppError::internal(format!("invalid file_service_url: {}", e)))?;
        if let Some(password) = password {
            download_url
                .query_pairs_mut()
                .append_pair("password", password);
        }

        Ok(DownloadAuthorization {
            file_id: target.file.id,
            file_name: target.file.name,
            size: target.file.size,
            mimetype: target.file.mimetype,
            download_url: download_url.to_string(),
            message: "Download authorized",
        })
    }

    pub async fn record_view(&self, ctx: &RequestContext, share_id: &str) {
        let visit = VisitRecord {
            id: generate_id(),
            share_id: share_id.to_string(),
            ip_address: ctx.client_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            referrer: ctx.referrer.clone(),
            created_at: ctx.now,
        };
        if let Err(e) = self.store.record_visit(&visit).await {
            ctx.logger.warn(
                "Failed to log visit analytics",
                log_data!("share_id" => share_id, "error" => e.to_string()),
            );
        }
        if let Err(e) = self.store.increment_view_count(share_id, ctx.now).await {
            ctx.logger.error(
                "Failed to update view count",
                log_data!("share_id" => share_id, "error" => e.to_string()),
            );
        }
    }

    pub async fn record_download(&self, ctx: &RequestContext, share_id: &str, file_id: &str) {
        let download = DownloadRecord {
            id: generate_id(),
            share_id: share_id.to_string(),
            file_id: file_id.to_string(),
            ip_address: ctx.client_ip.clone(),
            user_agent: ctx.user_agent.clone(),
            created_at: ctx.now,
        };
        if let Err(e) = self.store.record_download(&download).await {
            ctx.logger.warn(
                "Failed to log download analytics",
                log_data!("share_id" => share_id, "file_id" => file_id, "error" => e.to_string()),
            );
        }
        if let Err(e) = self.store.increment_download_count(share_id, ctx.now).await {
            ctx.logger.error(
                "Failed to update download count",
                log_data!("share_id" => share_id, "error" => e.to_string()),
            );
        }
    }

    /// Only the owner may delete, and only once. A second delete sees a share
    /// that no longer exists.
    pub async fn soft_delete(
        &self,
        ctx: &RequestContext,
        share_id: &str,
        requester_id: &str,
    ) -> AppResult<()> {
        if !self
            .store
            .soft_delete_share(share_id, requester_id, ctx.now)
            .await?
        {
            return Err(AppError::NotFound);
        }
        ctx.logger.info(
            "Share deleted",
            log_data!("share_id" => share_id, "owner_id" => requester_id),
        );
        Ok(())
    }

    pub async fn verify_signature(&self, ctx: &RequestContext, token: &str) -> AppResult<UploadGrant> {
        let row = self.load_signature(ctx, token).await?;
        Ok(UploadGrant {
            share_id: row.share_id,
            expected_file_count: row.expected_file_count,
            expected_size_mb: row.expected_size_mb,
            expires_at: row.expires_at,
        })
    }

    /// Records what the file service stored and charges the owner's quota.
    pub async fn complete_upload(
        &self,
        ctx: &RequestContext,
        token: &str,
        files: &[DeclaredFile],
    ) -> AppResult<UploadCompleted> {
        let row = self.load_signature(ctx, token).await?;

        if files.len() as u64 != row.expected_file_count {
            return Err(AppError::validation(format!(
                "Expected {} files, got {}",
                row.expected_file_count,
                files.len()
            )));
        }
        let total_size = files
            .iter()
            .try_fold(0u64, |acc, file| acc.checked_add(file.size))
            .ok_or_else(|| AppError::validation("Total size overflows"))?;
        let consumed_mb = bytes_to_megabytes(total_size);
        if consumed_mb != row.expected_size_mb {
            return Err(AppError::validation(format!(
                "Expected {} MB, got {} MB",
                row.expected_size_mb, consumed_mb
            )));
        }

        let records: Vec<FileRecord> = files
            .iter()
            .map(|file| FileRecord {
                id: generate_id(),
                share_id: row.share_id.clone(),
                name: file.name.clone(),
                size: file.size,
                mimetype: file.mimetype.clone(),
                deleted_at: None,
            })
            .collect();

        let applied = self
            .store
            .complete_upload(&CompletedUpload {
                signature_id: row.id.clone(),
                share_id: row.share_id.clone(),
                owner_id: row.user_id.clone(),
                files: records,
                total_size,
                consumed_mb,
                completed_at: ctx.now,
            })
            .await?;
        if !applied {
            return Err(AppError::Conflict {
                message: "Upload already completed".to_string(),
            });
        }

        ctx.logger.info(
            "Upload completed",
            log_data!(
                "share_id" => row.share_id.as_str(),
                "file_count" => files.len(),
                "consumed_mb" => consumed_mb
            ),
        );

        Ok(UploadCompleted {
            share_id: row.share_id,
            file_count: files.len() as u64,
            total_size,
        })
    }

    /// Checks the token's tag and the persisted row: bound to the same user and
    /// share, unexpired and not yet used.
    async fn load_signature(&self, ctx: &RequestContext, token: &str) -> AppResult<UploadSignature> {
        let claims = self.signer.verify(token)?;
        let row = self
            .store
            .find_upload_signature(token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if row.user_id != claims.user_id || row.share_id != claims.share_id {
            ctx.logger.warn(
                "Upload signature does not match its row",
                log_data!("share_id" => row.share_id.as_str()),
            );
            return Err(AppError::Unauthorized);
        }
        if row.expires_at < ctx.now {
            return Err(AppError::Unauthorized);
        }
        if row.consumed_at.is_some() {
            return Err(AppError::Conflict {
                message: "Upload already completed".to_string(),
            });
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShareSettings;
    use crate::store::memory::MemoryStore;
    use crate::testing::{ctx, paid_plan_store, seed_user};
    use futures::executor::block_on;

    const FILE_SERVICE: &str = "https://files.example.com";

    struct Fixture {
        store: MemoryStore,
        config: Config,
        signer: UploadSigner,
        owner: String,
    }

    impl Fixture {
        fn new() -> Self {
            let store = paid_plan_store();
            let owner = seed_user(&store, "google-1").id;
            Self {
                store,
                config: Config::default(),
                signer: UploadSigner::new("test-signing-key"),
                owner,
            }
        }

        fn lifecycle(&self) -> ShareLifecycle<'_> {
            ShareLifecycle::new(&self.store, &self.config, &self.signer)
        }

        fn create(&self, request: serde_json::Value) -> AppResult<ShareCreated> {
            let request: CreateShareRequest = serde_json::from_value(request).unwrap();
            block_on(self.lifecycle().create_share(&ctx(), &self.owner, &request))
        }

        fn create_ok(&self, extras: serde_json::Value) -> ShareCreated {
            self.create(serde_json::json!({
                "title": "Holiday",
                "files": [{"name": "beach.jpg", "size": 500000, "type": "image/jpeg"}],
                "total_size": 500000,
                "extra_features": extras
            }))
            .unwrap()
        }

        fn settings(&self, created: &ShareCreated) -> ShareSettings {
            self.store.settings(&created.share_id).unwrap()
        }

        fn upload(&self, created: &ShareCreated) {
            let files = vec![DeclaredFile {
                name: "beach.jpg".into(),
                size: 500_000,
                mimetype: "image/jpeg".into(),
            }];
            block_on(
                self.lifecycle()
                    .complete_upload(&ctx(), &created.signature, &files),
            )
            .unwrap();
        }
    }

    #[test]
    fn create_with_expiry_sets_absolute_timestamp() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["expiry"],
            "expiry": "3"
        }));

        let expiry = fx.settings(&created).expiry.unwrap();
        assert_eq!(expiry, ctx().now + Duration::days(3));
        assert_eq!(created.expiry, Some(expiry));
        assert_eq!(created.share_slug.len(), 8);
        assert!(created.success);
    }

    #[test]
    fn total_size_mismatch_is_rejected() {
        let fx = Fixture::new();
        for declared in [600_000u64, 500_001, 499_999] {
            let err = fx
                .create(serde_json::json!({
                    "title": "Holiday",
                    "files": [{"name": "a", "size": 200000}, {"name": "b", "size": 300000}],
                    "total_size": declared
                }))
                .unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
        assert_eq!(fx.store.share_count(), 0);
    }

    #[test]
    fn empty_files_and_blank_title_are_rejected() {
        let fx = Fixture::new();
        let err = fx
            .create(serde_json::json!({"title": "x", "files": [], "total_size": 0}))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = fx
            .create(serde_json::json!({
                "title": "   ",
                "files": [{"name": "a", "size": 1}],
                "total_size": 1
            }))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn over_quota_share_is_not_stored() {
        let fx = Fixture::new();
        fx.store.set_used_quota(&fx.owner, 1_000);
        let err = fx
            .create(serde_json::json!({
                "title": "Holiday",
                "files": [{"name": "a", "size": 1}],
                "total_size": 1
            }))
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded));
        assert_eq!(fx.store.share_count(), 0);
    }

    #[test]
    fn custom_slug_is_used_and_second_claim_conflicts() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["customURL"],
            "customURL": "holiday-2025"
        }));
        assert_eq!(created.share_slug, "holiday-2025");

        let err = fx
            .create(serde_json::json!({
                "title": "Again",
                "files": [{"name": "a", "size": 1}],
                "total_size": 1,
                "extra_features": {"customURL": "holiday-2025"}
            }))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(fx.store.share_count(), 1);
    }

    #[test]
    fn generated_slug_is_redrawn_after_lost_insert_race() {
        let fx = Fixture::new();
        fx.store.fail_next_inserts(SLUG_INSERT_RETRIES);
        let created = fx.create_ok(serde_json::json!({}));
        assert_eq!(fx.store.share_count(), 1);
        assert_eq!(
            fx.store.settings(&created.share_id).unwrap().custom_slug,
            created.share_slug
        );
    }

    #[test]
    fn generated_slug_gives_up_after_insert_retries() {
        let fx = Fixture::new();
        fx.store.fail_next_inserts(SLUG_INSERT_RETRIES + 1);
        let err = fx
            .create(serde_json::json!({
                "title": "Holiday",
                "files": [{"name": "a", "size": 1}],
                "total_size": 1
            }))
            .unwrap_err();
        assert!(matches!(err, AppError::SlugExhausted));
        assert_eq!(fx.store.share_count(), 0);
    }

    #[test]
    fn custom_slug_losing_insert_race_conflicts() {
        let fx = Fixture::new();
        fx.store.fail_next_inserts(1);
        let err = fx
            .create(serde_json::json!({
                "title": "Holiday",
                "files": [{"name": "a", "size": 1}],
                "total_size": 1,
                "extra_features": {"customURL": "holiday-2025"}
            }))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(fx.store.share_count(), 0);
    }

    #[test]
    fn password_gated_view_hides_files_but_counts_view() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["password"],
            "password": "s3cret"
        }));
        fx.upload(&created);

        let lookup = ShareLookup::Slug(created.share_slug.clone());
        let view = block_on(fx.lifecycle().open_share(&ctx(), &lookup, None)).unwrap();
        assert!(view.files.is_empty());
        assert!(view.settings.needs_password);
        assert!(!view.settings.password_correct);
        assert_eq!(fx.store.share(&created.share_id).unwrap().view_count, 1);

        let view = block_on(fx.lifecycle().open_share(&ctx(), &lookup, Some("s3cret"))).unwrap();
        assert_eq!(view.files.len(), 1);
        assert!(view.settings.password_correct);
    }

    #[test]
    fn expired_share_is_gone_and_not_metered() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["expiry"],
            "expiry": 1
        }));
        fx.upload(&created);
        let mut later = ctx();
        later.now = later.now + Duration::days(2);

        let lookup = ShareLookup::Slug(created.share_slug.clone());
        let err = block_on(fx.lifecycle().open_share(&later, &lookup, Some("ignored"))).unwrap_err();
        assert!(matches!(err, AppError::Expired));
        assert_eq!(fx.store.share(&created.share_id).unwrap().view_count, 0);
        assert_eq!(fx.store.visit_count(), 0);
    }

    #[test]
    fn download_limit_blocks_after_reached() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["download_limit"],
            "download_limit": 1
        }));
        fx.upload(&created);
        let file_id = block_on(fx.store.find_share_by_id(&created.share_id))
            .unwrap()
            .unwrap()
            .files[0]
            .id
            .clone();

        let auth = block_on(fx.lifecycle().authorize_download(&ctx(), &file_id, None, FILE_SERVICE))
            .unwrap();
        assert_eq!(auth.download_url, format!("{}/f/{}", FILE_SERVICE, file_id));

        for _ in 0..2 {
            let err = block_on(fx.lifecycle().authorize_download(&ctx(), &file_id, None, FILE_SERVICE))
                .unwrap_err();
            assert!(matches!(err, AppError::LimitReached));
        }
        assert_eq!(fx.store.share(&created.share_id).unwrap().download_count, 1);
    }

    #[test]
    fn download_requires_correct_password() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({
            "enabled_features": ["password"],
            "password": "p&ss word"
        }));
        fx.upload(&created);
        let file_id = block_on(fx.store.find_share_by_id(&created.share_id))
            .unwrap()
            .unwrap()
            .files[0]
            .id
            .clone();

        let err = block_on(fx.lifecycle().authorize_download(&ctx(), &file_id, None, FILE_SERVICE))
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordRequired));
        let err = block_on(fx.lifecycle().authorize_download(&ctx(), &file_id, Some("x"), FILE_SERVICE))
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordIncorrect));
        assert_eq!(fx.store.download_log_count(), 0);

        let auth = block_on(fx.lifecycle().authorize_download(
            &ctx(),
            &file_id,
            Some("p&ss word"),
            FILE_SERVICE,
        ))
        .unwrap();
        assert!(auth.download_url.ends_with("?password=p%26ss+word"));
        assert_eq!(fx.store.download_log_count(), 1);
    }

    #[test]
    fn metering_failure_does_not_fail_the_view() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        fx.store.set_metering_failure(true);

        let lookup = ShareLookup::Id(created.share_id.clone());
        let view = block_on(fx.lifecycle().open_share(&ctx(), &lookup, None)).unwrap();
        assert_eq!(view.share_slug, created.share_id);
        assert_eq!(fx.store.share(&created.share_id).unwrap().view_count, 0);
    }

    #[test]
    fn soft_delete_twice_yields_not_found() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let lifecycle = fx.lifecycle();

        block_on(lifecycle.soft_delete(&ctx(), &created.share_id, &fx.owner)).unwrap();
        let err = block_on(lifecycle.soft_delete(&ctx(), &created.share_id, &fx.owner)).unwrap_err();
        assert!(matches!(err, AppError::NotFound));

        let lookup = ShareLookup::Slug(created.share_slug);
        let err = block_on(lifecycle.open_share(&ctx(), &lookup, None)).unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn only_owner_can_delete() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let err = block_on(fx.lifecycle().soft_delete(&ctx(), &created.share_id, "someone-else"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        assert!(fx.store.share(&created.share_id).unwrap().deleted_at.is_none());
    }

    #[test]
    fn upload_completion_charges_quota_once() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let lifecycle = fx.lifecycle();

        let grant = block_on(lifecycle.verify_signature(&ctx(), &created.signature)).unwrap();
        assert_eq!(grant.share_id, created.share_id);
        assert_eq!(grant.expected_size_mb, 1);

        fx.upload(&created);
        let share = fx.store.share(&created.share_id).unwrap();
        assert_eq!((share.file_count, share.size), (1, 500_000));
        assert_eq!(block_on(fx.store.get_quota(&fx.owner)).unwrap().unwrap().used_mb, 1);

        let err = block_on(lifecycle.complete_upload(&ctx(), &created.signature, &[])).unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn upload_completion_for_unknown_share_keeps_signature_usable() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let signature = block_on(fx.store.find_upload_signature(&created.signature))
            .unwrap()
            .unwrap();

        let stray = CompletedUpload {
            signature_id: signature.id.clone(),
            share_id: "missing-share".into(),
            owner_id: fx.owner.clone(),
            files: Vec::new(),
            total_size: 0,
            consumed_mb: 0,
            completed_at: Utc::now(),
        };
        let err = block_on(fx.store.complete_upload(&stray)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let signature = block_on(fx.store.find_upload_signature(&created.signature))
            .unwrap()
            .unwrap();
        assert!(signature.consumed_at.is_none());
        fx.upload(&created);
    }

    #[test]
    fn upload_completion_rejects_mismatch() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let too_big = vec![DeclaredFile {
            name: "beach.jpg".into(),
            size: 5_000_000,
            mimetype: "image/jpeg".into(),
        }];
        let err = block_on(fx.lifecycle().complete_upload(&ctx(), &created.signature, &too_big))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn share_opens_by_id_and_echoes_the_id() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));

        let lookup = ShareLookup::Id(created.share_id.clone());
        let view = block_on(fx.lifecycle().open_share(&ctx(), &lookup, None)).unwrap();
        assert_eq!(view.share_slug, created.share_id);
        assert_eq!(view.share.id, created.share_id);

        let missing = ShareLookup::Id("no-such-share".into());
        let err = block_on(fx.lifecycle().open_share(&ctx(), &missing, None)).unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn expired_signature_is_rejected() {
        let fx = Fixture::new();
        let created = fx.create_ok(serde_json::json!({}));
        let mut later = ctx();
        later.now = later.now + Duration::hours(2);
        let err = block_on(fx.lifecycle().verify_signature(&later, &created.signature)).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
