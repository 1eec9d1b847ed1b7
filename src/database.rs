//! # D1 Share Store
//!
//! [`ShareStore`] implementation on Cloudflare D1 (SQLite dialect).
//!
//! ## Conventions
//!
//! - Timestamps are stored as integer epoch milliseconds.
//! - Numbers come back from D1 as JavaScript numbers, so row structs use
//!   `f64` and convert into the domain models.
//! - Writes that must be atomic are sent as one `batch`, which D1 runs in a
//!   single transaction. Multi-statement reads on the public path are batched
//!   too, so gates are checked against one consistent snapshot.
//! - `share_settings.custom_slug` carries a `UNIQUE` index. Violations surface
//!   as [`StoreError::UniqueViolation`].
//!
//! ## Database Schema
//!
//! `plans`, `users`, `user_plans`, `used_quota`, `shares`, `share_settings`,
//! `files`, `upload_signatures`, `visit_analytics`, `download_analytics`.
//! Created by [`D1Store::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use worker::wasm_bindgen::JsValue;
use worker::{D1Database, D1PreparedStatement};

use crate::constants::DEFAULT_PLAN_QUOTA_MB;
use crate::models::{
    CompletedUpload, DownloadRecord, DownloadTarget, FileRecord, NewShareBundle, Plan,
    PlanAssignment, QuotaRecord, Share, ShareSettings, ShareSnapshot, ShareSummary,
    UploadSignature, User, VisitRecord,
};
use crate::store::{ShareStore, StoreError};
use crate::utils::generate_id;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS plans (
        id          INTEGER PRIMARY KEY,
        plan_name   TEXT NOT NULL,
        quota       INTEGER NOT NULL,
        product_id  TEXT UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id          TEXT PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL,
        avatar_url  TEXT,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_plans (
        user_id         TEXT PRIMARY KEY REFERENCES users(id),
        plan_id         INTEGER NOT NULL REFERENCES plans(id),
        subscription_id TEXT,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS used_quota (
        user_id    TEXT PRIMARY KEY REFERENCES users(id),
        used_quota INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS shares (
        id             TEXT PRIMARY KEY,
        user_id        TEXT NOT NULL REFERENCES users(id),
        title          TEXT NOT NULL,
        description    TEXT,
        file_count     INTEGER NOT NULL DEFAULT 0,
        size           INTEGER NOT NULL DEFAULT 0,
        view_count     INTEGER NOT NULL DEFAULT 0,
        download_count INTEGER NOT NULL DEFAULT 0,
        is_public      INTEGER NOT NULL DEFAULT 1,
        deleted_at     INTEGER,
        created_at     INTEGER NOT NULL,
        updated_at     INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_shares_user ON shares(user_id, deleted_at)",
    "CREATE TABLE IF NOT EXISTS share_settings (
        share_id       TEXT PRIMARY KEY REFERENCES shares(id),
        custom_slug    TEXT NOT NULL,
        password_hash  TEXT,
        expiry         INTEGER,
        download_limit INTEGER
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_share_settings_slug ON share_settings(custom_slug)",
    "CREATE TABLE IF NOT EXISTS files (
        id         TEXT PRIMARY KEY,
        share_id   TEXT NOT NULL REFERENCES shares(id),
        file_name  TEXT NOT NULL,
        size       INTEGER NOT NULL,
        mimetype   TEXT NOT NULL,
        deleted_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_files_share ON files(share_id)",
    "CREATE TABLE IF NOT EXISTS upload_signatures (
        id                  TEXT PRIMARY KEY,
        share_id            TEXT NOT NULL REFERENCES shares(id),
        user_id             TEXT NOT NULL REFERENCES users(id),
        signature           TEXT NOT NULL UNIQUE,
        expires_at          INTEGER NOT NULL,
        expected_file_count INTEGER NOT NULL,
        expected_size_mb    INTEGER NOT NULL,
        consumed_at         INTEGER,
        consumed_by         TEXT
    )",
    "CREATE TABLE IF NOT EXISTS visit_analytics (
        id         TEXT PRIMARY KEY,
        share_id   TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        referrer   TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS download_analytics (
        id         TEXT PRIMARY KEY,
        share_id   TEXT NOT NULL,
        file_id    TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        created_at INTEGER NOT NULL
    )",
];

// ── D1 rows ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserRow {
    id: String,
    external_id: String,
    name: String,
    email: String,
    avatar_url: Option<String>,
    created_at: f64,
    updated_at: f64,
}

#[derive(Deserialize)]
struct PlanRow {
    id: f64,
    plan_name: String,
    quota: f64,
    product_id: Option<String>,
}

#[derive(Deserialize)]
struct AssignmentRow {
    user_id: String,
    plan_id: f64,
    subscription_id: Option<String>,
    created_at: f64,
    updated_at: f64,
}

#[derive(Deserialize)]
struct QuotaRow {
    user_id: String,
    used_quota: f64,
}

#[derive(Deserialize)]
struct ShareRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    file_count: f64,
    size: f64,
    view_count: f64,
    download_count: f64,
    is_public: f64,
    deleted_at: Option<f64>,
    created_at: f64,
    updated_at: f64,
}

#[derive(Deserialize)]
struct SummaryRow {
    #[serde(flatten)]
    share: ShareRow,
    custom_slug: Option<String>,
}

#[derive(Deserialize)]
struct SettingsRow {
    share_id: String,
    custom_slug: String,
    password_hash: Option<String>,
    expiry: Option<f64>,
    download_limit: Option<f64>,
}

#[derive(Deserialize)]
struct FileRow {
    id: String,
    share_id: String,
    file_name: String,
    size: f64,
    mimetype: String,
    deleted_at: Option<f64>,
}

#[derive(Deserialize)]
struct SignatureRow {
    id: String,
    share_id: String,
    user_id: String,
    signature: String,
    expires_at: f64,
    expected_file_count: f64,
    expected_size_mb: f64,
    consumed_at: Option<f64>,
    consumed_by: Option<String>,
}

#[derive(Deserialize)]
struct Exists {
    #[allow(dead_code)]
    found: f64,
}

fn from_ms(ms: f64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp {}", ms)))
}

fn opt_from_ms(ms: Option<f64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    ms.map(from_ms).transpose()
}

fn ms(at: DateTime<Utc>) -> JsValue {
    JsValue::from(at.timestamp_millis() as f64)
}

fn opt_ms(at: Option<DateTime<Utc>>) -> JsValue {
    at.map(ms).unwrap_or(JsValue::NULL)
}

fn opt_str(value: Option<&str>) -> JsValue {
    value.map(JsValue::from).unwrap_or(JsValue::NULL)
}

fn num(value: u64) -> JsValue {
    JsValue::from(value as f64)
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        Ok(User {
            id: row.id,
            external_id: row.external_id,
            name: row.name,
            email: row.email,
            avatar_url: row.avatar_url,
            created_at: from_ms(row.created_at)?,
            updated_at: from_ms(row.updated_at)?,
        })
    }
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id as i64,
            name: row.plan_name,
            quota_mb: row.quota as u64,
            product_id: row.product_id,
        }
    }
}

impl TryFrom<AssignmentRow> for PlanAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, StoreError> {
        Ok(PlanAssignment {
            user_id: row.user_id,
            plan_id: row.plan_id as i64,
            subscription_id: row.subscription_id,
            created_at: from_ms(row.created_at)?,
            updated_at: from_ms(row.updated_at)?,
        })
    }
}

impl TryFrom<ShareRow> for Share {
    type Error = StoreError;

    fn try_from(row: ShareRow) -> Result<Self, StoreError> {
        Ok(Share {
            id: row.id,
            owner_id: row.user_id,
            title: row.title,
            description: row.description,
            file_count: row.file_count as u64,
            size: row.size as u64,
            view_count: row.view_count as u64,
            download_count: row.download_count as u64,
            is_public: row.is_public != 0.0,
            deleted_at: opt_from_ms(row.deleted_at)?,
            created_at: from_ms(row.created_at)?,
            updated_at: from_ms(row.updated_at)?,
        })
    }
}

impl TryFrom<SummaryRow> for ShareSummary {
    type Error = StoreError;

    fn try_from(row: SummaryRow) -> Result<Self, StoreError> {
        let share = Share::try_from(row.share)?;
        Ok(ShareSummary {
            id: share.id,
            title: share.title,
            description: share.description,
            file_count: share.file_count,
            size: share.size,
            download_count: share.download_count,
            view_count: share.view_count,
            created_at: share.created_at,
            is_public: share.is_public,
            custom_slug: row.custom_slug,
        })
    }
}

impl TryFrom<SettingsRow> for ShareSettings {
    type Error = StoreError;

    fn try_from(row: SettingsRow) -> Result<Self, StoreError> {
        Ok(ShareSettings {
            share_id: row.share_id,
            custom_slug: row.custom_slug,
            password_hash: row.password_hash,
            expiry: opt_from_ms(row.expiry)?,
            download_limit: row.download_limit.map(|n| n as u64),
        })
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, StoreError> {
        Ok(FileRecord {
            id: row.id,
            share_id: row.share_id,
            name: row.file_name,
            size: row.size as u64,
            mimetype: row.mimetype,
            deleted_at: opt_from_ms(row.deleted_at)?,
        })
    }
}

impl TryFrom<SignatureRow> for UploadSignature {
    type Error = StoreError;

    fn try_from(row: SignatureRow) -> Result<Self, StoreError> {
        Ok(UploadSignature {
            id: row.id,
            share_id: row.share_id,
            user_id: row.user_id,
            signature: row.signature,
            expires_at: from_ms(row.expires_at)?,
            expected_file_count: row.expected_file_count as u64,
            expected_size_mb: row.expected_size_mb as u64,
            consumed_at: opt_from_ms(row.consumed_at)?,
        })
    }
}

/// Maps a D1 failure, recognising SQLite unique-constraint errors.
fn store_err(error: worker::Error) -> StoreError {
    let message = error.to_string();
    if message.contains("UNIQUE constraint failed") {
        let what = if message.contains("custom_slug") {
            "Custom URL"
        } else {
            "record"
        };
        StoreError::UniqueViolation(what.to_string())
    } else {
        StoreError::Backend(message)
    }
}

pub struct D1Store {
    db: D1Database,
}

impl D1Store {
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    fn statement(&self, sql: &str, binds: &[JsValue]) -> Result<D1PreparedStatement, StoreError> {
        self.db.prepare(sql).bind(binds).map_err(store_err)
    }

    async fn first<T: for<'de> Deserialize<'de>>(
        &self,
        sql: &str,
        binds: &[JsValue],
    ) -> Result<Option<T>, StoreError> {
        self.statement(sql, binds)?
            .first::<T>(None)
            .await
            .map_err(store_err)
    }

    async fn run(&self, sql: &str, binds: &[JsValue]) -> Result<(), StoreError> {
        self.statement(sql, binds)?
            .run()
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Creates every table and index, then seeds the default plan.
    pub async fn migrate(&self, default_plan_id: i64) -> Result<(), StoreError> {
        for sql in SCHEMA {
            self.db.prepare(*sql).run().await.map_err(store_err)?;
        }
        self.run(
            "INSERT OR IGNORE INTO plans (id, plan_name, quota, product_id) VALUES (?1, 'Free', ?2, NULL)",
            &[
                JsValue::from(default_plan_id as f64),
                JsValue::from(DEFAULT_PLAN_QUOTA_MB as f64),
            ],
        )
        .await
    }

    /// Reads one share, its settings and its live files in a single transaction.
    async fn snapshot(&self, share_filter: &str, key: &str) -> Result<Option<ShareSnapshot>, StoreError> {
        let key = JsValue::from(key);
        let statements = vec![
            self.statement(
                &format!("SELECT * FROM shares WHERE id = ({})", share_filter),
                &[key.clone()],
            )?,
            self.statement(
                &format!("SELECT * FROM share_settings WHERE share_id = ({})", share_filter),
                &[key.clone()],
            )?,
            self.statement(
                &format!(
                    "SELECT * FROM files WHERE share_id = ({}) AND deleted_at IS NULL",
                    share_filter
                ),
                &[key],
            )?,
        ];
        let results = self.db.batch(statements).await.map_err(store_err)?;
        let [shares, settings, files] = results.as_slice() else {
            return Err(StoreError::Backend("unexpected batch result count".into()));
        };

        let Some(share) = shares
            .results::<ShareRow>()
            .map_err(store_err)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let settings = settings
            .results::<SettingsRow>()
            .map_err(store_err)?
            .into_iter()
            .next()
            .map(ShareSettings::try_from)
            .transpose()?;
        let files = files
            .results::<FileRow>()
            .map_err(store_err)?
            .into_iter()
            .map(FileRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ShareSnapshot {
            share: Share::try_from(share)?,
            settings,
            files,
        }))
    }
}

#[async_trait(?Send)]
impl ShareStore for D1Store {
    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        self.first::<UserRow>(
            "SELECT * FROM users WHERE external_id = ?1",
            &[JsValue::from(external_id)],
        )
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn create_user(
        &self,
        user: &User,
        assignment: &PlanAssignment,
    ) -> Result<(), StoreError> {
        let statements = vec![
            self.statement(
                "INSERT INTO users (id, external_id, name, email, avatar_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                &[
                    JsValue::from(&user.id),
                    JsValue::from(&user.external_id),
                    JsValue::from(&user.name),
                    JsValue::from(&user.email),
                    opt_str(user.avatar_url.as_deref()),
                    ms(user.created_at),
                    ms(user.updated_at),
                ],
            )?,
            self.statement(
                "INSERT INTO user_plans (user_id, plan_id, subscription_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    JsValue::from(&assignment.user_id),
                    JsValue::from(assignment.plan_id as f64),
                    opt_str(assignment.subscription_id.as_deref()),
                    ms(assignment.created_at),
                    ms(assignment.updated_at),
                ],
            )?,
            self.statement(
                "INSERT INTO used_quota (user_id, used_quota) VALUES (?1, 0)",
                &[JsValue::from(&user.id)],
            )?,
        ];
        self.db.batch(statements).await.map_err(store_err)?;
        Ok(())
    }

    async fn get_plan(&self, plan_id: i64) -> Result<Option<Plan>, StoreError> {
        Ok(self
            .first::<PlanRow>(
                "SELECT * FROM plans WHERE id = ?1",
                &[JsValue::from(plan_id as f64)],
            )
            .await?
            .map(Plan::from))
    }

    async fn find_plan_by_product(&self, product_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self
            .first::<PlanRow>(
                "SELECT * FROM plans WHERE product_id = ?1",
                &[JsValue::from(product_id)],
            )
            .await?
            .map(Plan::from))
    }

    async fn get_assignment(&self, user_id: &str) -> Result<Option<PlanAssignment>, StoreError> {
        self.first::<AssignmentRow>(
            "SELECT * FROM user_plans WHERE user_id = ?1",
            &[JsValue::from(user_id)],
        )
        .await?
        .map(PlanAssignment::try_from)
        .transpose()
    }

    async fn upsert_assignment(&self, assignment: &PlanAssignment) -> Result<(), StoreError> {
        self.run(
            "INSERT INTO user_plans (user_id, plan_id, subscription_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                plan_id = excluded.plan_id,
                subscription_id = excluded.subscription_id,
                updated_at = excluded.updated_at",
            &[
                JsValue::from(&assignment.user_id),
                JsValue::from(assignment.plan_id as f64),
                opt_str(assignment.subscription_id.as_deref()),
                ms(assignment.created_at),
                ms(assignment.updated_at),
            ],
        )
        .await
    }

    async fn reset_assignment(
        &self,
        user_id: &str,
        from_plan: i64,
        to_plan: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        #[derive(Deserialize)]
        struct Returning {
            #[allow(dead_code)]
            user_id: String,
        }

        Ok(self
            .first::<Returning>(
                "UPDATE user_plans SET plan_id = ?1, subscription_id = NULL, updated_at = ?2
                 WHERE user_id = ?3 AND plan_id = ?4 RETURNING user_id",
                &[
                    JsValue::from(to_plan as f64),
                    ms(now),
                    JsValue::from(user_id),
                    JsValue::from(from_plan as f64),
                ],
            )
            .await?
            .is_some())
    }

    async fn get_quota(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError> {
        Ok(self
            .first::<QuotaRow>(
                "SELECT * FROM used_quota WHERE user_id = ?1",
                &[JsValue::from(user_id)],
            )
            .await?
            .map(|row| QuotaRecord {
                user_id: row.user_id,
                used_mb: row.used_quota as u64,
            }))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self
            .first::<Exists>(
                "SELECT 1 AS found FROM share_settings WHERE custom_slug = ?1",
                &[JsValue::from(slug)],
            )
            .await?
            .is_some())
    }

    async fn insert_share(&self, bundle: &NewShareBundle) -> Result<(), StoreError> {
        let share = &bundle.share;
        let settings = &bundle.settings;
        let signature = &bundle.signature;
        let statements = vec![
            self.statement(
                "INSERT INTO shares (id, user_id, title, description, file_count, size, view_count,
                                     download_count, is_public, deleted_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                &[
                    JsValue::from(&share.id),
                    JsValue::from(&share.owner_id),
                    JsValue::from(&share.title),
                    opt_str(share.description.as_deref()),
                    num(share.file_count),
                    num(share.size),
                    num(share.view_count),
                    num(share.download_count),
                    JsValue::from(if share.is_public { 1_f64 } else { 0_f64 }),
                    opt_ms(share.deleted_at),
                    ms(share.created_at),
                    ms(share.updated_at),
                ],
            )?,
            self.statement(
                "INSERT INTO share_settings (share_id, custom_slug, password_hash, expiry, download_limit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    JsValue::from(&settings.share_id),
                    JsValue::from(&settings.custom_slug),
                    opt_str(settings.password_hash.as_deref()),
                    opt_ms(settings.expiry),
                    settings.download_limit.map(num).unwrap_or(JsValue::NULL),
                ],
            )?,
            self.statement(
                "INSERT INTO upload_signatures (id, share_id, user_id, signature, expires_at,
                                                expected_file_count, expected_size_mb)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                &[
                    JsValue::from(&signature.id),
                    JsValue::from(&signature.share_id),
                    JsValue::from(&signature.user_id),
                    JsValue::from(&signature.signature),
                    ms(signature.expires_at),
                    num(signature.expected_file_count),
                    num(signature.expected_size_mb),
                ],
            )?,
        ];
        self.db.batch(statements).await.map_err(store_err)?;
        Ok(())
    }

    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<ShareSnapshot>, StoreError> {
        self.snapshot(
            "SELECT share_id FROM share_settings WHERE custom_slug = ?1",
            slug,
        )
        .await
    }

    async fn find_share_by_id(&self, share_id: &str) -> Result<Option<ShareSnapshot>, StoreError> {
        self.snapshot("SELECT ?1", share_id).await
    }

    async fn find_download_target(
        &self,
        file_id: &str,
    ) -> Result<Option<DownloadTarget>, StoreError> {
        let key = JsValue::from(file_id);
        let statements = vec![
            self.statement(
                "SELECT * FROM files WHERE id = ?1 AND deleted_at IS NULL",
                &[key.clone()],
            )?,
            self.statement(
                "SELECT * FROM shares WHERE id = (SELECT share_id FROM files WHERE id = ?1)",
                &[key.clone()],
            )?,
            self.statement(
                "SELECT * FROM share_settings WHERE share_id = (SELECT share_id FROM files WHERE id = ?1)",
                &[key],
            )?,
        ];
        let results = self.db.batch(statements).await.map_err(store_err)?;
        let [files, shares, settings] = results.as_slice() else {
            return Err(StoreError::Backend("unexpected batch result count".into()));
        };

        let file = files.results::<FileRow>().map_err(store_err)?.into_iter().next();
        let share = shares.results::<ShareRow>().map_err(store_err)?.into_iter().next();
        let (Some(file), Some(share)) = (file, share) else {
            return Ok(None);
        };
        let settings = settings
            .results::<SettingsRow>()
            .map_err(store_err)?
            .into_iter()
            .next()
            .map(ShareSettings::try_from)
            .transpose()?;

        Ok(Some(DownloadTarget {
            file: FileRecord::try_from(file)?,
            share: Share::try_from(share)?,
            settings,
        }))
    }

    async fn increment_view_count(
        &self,
        share_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.run(
            "UPDATE shares SET view_count = view_count + 1, updated_at = ?1 WHERE id = ?2",
            &[ms(now), JsValue::from(share_id)],
        )
        .await
    }

    async fn increment_download_count(
        &self,
        share_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.run(
            "UPDATE shares SET download_count = download_count + 1, updated_at = ?1 WHERE id = ?2",
            &[ms(now), JsValue::from(share_id)],
        )
        .await
    }

    async fn record_visit(&self, visit: &VisitRecord) -> Result<(), StoreError> {
        self.run(
            "INSERT INTO visit_analytics (id, share_id, ip_address, user_agent, referrer, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                JsValue::from(&visit.id),
                JsValue::from(&visit.share_id),
                opt_str(visit.ip_address.as_deref()),
                opt_str(visit.user_agent.as_deref()),
                opt_str(visit.referrer.as_deref()),
                ms(visit.created_at),
            ],
        )
        .await
    }

    async fn record_download(&self, download: &DownloadRecord) -> Result<(), StoreError> {
        self.run(
            "INSERT INTO download_analytics (id, share_id, file_id, ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                JsValue::from(&download.id),
                JsValue::from(&download.share_id),
                JsValue::from(&download.file_id),
                opt_str(download.ip_address.as_deref()),
                opt_str(download.user_agent.as_deref()),
                ms(download.created_at),
            ],
        )
        .await
    }

    async fn soft_delete_share(
        &self,
        share_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        #[derive(Deserialize)]
        struct Returning {
            #[allow(dead_code)]
            id: String,
        }

        Ok(self
            .first::<Returning>(
                "UPDATE shares SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND deleted_at IS NULL RETURNING id",
                &[ms(now), JsValue::from(share_id), JsValue::from(owner_id)],
            )
            .await?
            .is_some())
    }

    async fn list_active_shares(&self, owner_id: &str) -> Result<Vec<ShareSummary>, StoreError> {
        self.statement(
            "SELECT shares.*, share_settings.custom_slug FROM shares
             LEFT JOIN share_settings ON share_settings.share_id = shares.id
             WHERE shares.user_id = ?1 AND shares.deleted_at IS NULL
             ORDER BY shares.created_at DESC",
            &[JsValue::from(owner_id)],
        )?
        .all()
        .await
        .map_err(store_err)?
        .results::<SummaryRow>()
        .map_err(store_err)?
        .into_iter()
        .map(ShareSummary::try_from)
        .collect()
    }

    async fn find_upload_signature(
        &self,
        signature: &str,
    ) -> Result<Option<UploadSignature>, StoreError> {
        self.first::<SignatureRow>(
            "SELECT * FROM upload_signatures WHERE signature = ?1",
            &[JsValue::from(signature)],
        )
        .await?
        .map(UploadSignature::try_from)
        .transpose()
    }

    async fn complete_upload(&self, upload: &CompletedUpload) -> Result<bool, StoreError> {
        // Every write after the claim is guarded by it, so a signature that was
        // already consumed leaves the batch without effect.
        let claim = generate_id();
        let guard = "EXISTS (SELECT 1 FROM upload_signatures WHERE id = ?1 AND consumed_by = ?2)";
        let signature_id = JsValue::from(&upload.signature_id);
        let claim_id = JsValue::from(&claim);

        let mut statements = vec![self.statement(
            "UPDATE upload_signatures SET consumed_at = ?3, consumed_by = ?2
             WHERE id = ?1 AND consumed_at IS NULL",
            &[signature_id.clone(), claim_id.clone(), ms(upload.completed_at)],
        )?];
        for file in &upload.files {
            statements.push(self.statement(
                &format!(
                    "INSERT INTO files (id, share_id, file_name, size, mimetype)
                     SELECT ?3, ?4, ?5, ?6, ?7 WHERE {}",
                    guard
                ),
                &[
                    signature_id.clone(),
                    claim_id.clone(),
                    JsValue::from(&file.id),
                    JsValue::from(&file.share_id),
                    JsValue::from(&file.name),
                    num(file.size),
                    JsValue::from(&file.mimetype),
                ],
            )?);
        }
        statements.push(self.statement(
            &format!(
                "UPDATE shares SET file_count = file_count + ?3, size = size + ?4, updated_at = ?5
                 WHERE id = ?6 AND {}",
                guard
            ),
            &[
                signature_id.clone(),
                claim_id.clone(),
                num(upload.files.len() as u64),
                num(upload.total_size),
                ms(upload.completed_at),
                JsValue::from(&upload.share_id),
            ],
        )?);
        statements.push(self.statement(
            &format!(
                "INSERT INTO used_quota (user_id, used_quota) SELECT ?3, ?4 WHERE {}
                 ON CONFLICT(user_id) DO UPDATE SET used_quota = used_quota + excluded.used_quota",
                guard
            ),
            &[
                signature_id.clone(),
                claim_id.clone(),
                JsValue::from(&upload.owner_id),
                num(upload.consumed_mb),
            ],
        )?);
        self.db.batch(statements).await.map_err(store_err)?;

        let row = self
            .first::<SignatureRow>(
                "SELECT * FROM upload_signatures WHERE id = ?1",
                &[signature_id],
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(row.consumed_by.as_deref() == Some(claim.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_enforces_unique_slugs() {
        assert!(SCHEMA
            .iter()
            .any(|sql| sql.contains("UNIQUE INDEX") && sql.contains("share_settings(custom_slug)")));
    }

    #[test]
    fn share_row_converts_flags_and_timestamps() {
        let row: ShareRow = serde_json::from_value(serde_json::json!({
            "id": "share-1",
            "user_id": "user-1",
            "title": "Holiday",
            "description": null,
            "file_count": 2.0,
            "size": 1500000.0,
            "view_count": 3.0,
            "download_count": 1.0,
            "is_public": 1.0,
            "deleted_at": null,
            "created_at": 1740830400000.0,
            "updated_at": 1740830400000.0
        }))
        .unwrap();
        let share = Share::try_from(row).unwrap();
        assert!(share.is_public);
        assert_eq!(share.size, 1_500_000);
        assert_eq!(share.created_at.timestamp_millis(), 1_740_830_400_000);
        assert!(share.deleted_at.is_none());
    }

    #[test]
    fn summary_row_reads_joined_slug() {
        let row: SummaryRow = serde_json::from_value(serde_json::json!({
            "id": "share-1",
            "user_id": "user-1",
            "title": "Holiday",
            "description": "pics",
            "file_count": 1.0,
            "size": 10.0,
            "view_count": 0.0,
            "download_count": 0.0,
            "is_public": 1.0,
            "deleted_at": null,
            "created_at": 0.0,
            "updated_at": 0.0,
            "custom_slug": "abcdefgh"
        }))
        .unwrap();
        let summary = ShareSummary::try_from(row).unwrap();
        assert_eq!(summary.custom_slug.as_deref(), Some("abcdefgh"));
    }

    #[test]
    fn settings_row_keeps_optional_gates() {
        let row: SettingsRow = serde_json::from_value(serde_json::json!({
            "share_id": "share-1",
            "custom_slug": "abcdefgh",
            "password_hash": null,
            "expiry": 1740830400000.0,
            "download_limit": 5.0
        }))
        .unwrap();
        let settings = ShareSettings::try_from(row).unwrap();
        assert_eq!(settings.download_limit, Some(5));
        assert!(settings.expiry.is_some());
        assert!(settings.password_hash.is_none());
    }
}
