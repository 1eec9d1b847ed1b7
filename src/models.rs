use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account linked to an identity-provider user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields copied from the identity session when a user is first seen.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// Reference data: a tier with a storage ceiling.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub quota_mb: u64,
    /// Product identifier on the billing provider side.
    pub product_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanAssignment {
    pub user_id: String,
    pub plan_id: i64,
    pub subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuotaRecord {
    pub user_id: String,
    pub used_mb: u64,
}

/// What the rest of the service needs to know about a user's plan.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanView {
    pub plan_id: i64,
    pub plan_name: String,
    pub quota_mb: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Share {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub file_count: u64,
    pub size: u64,
    pub view_count: u64,
    pub download_count: u64,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Share {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShareSettings {
    pub share_id: String,
    pub custom_slug: String,
    pub password_hash: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub download_limit: Option<u64>,
}

/// Metadata of an uploaded object. Bytes live in the file service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: String,
    pub share_id: String,
    pub name: String,
    pub size: u64,
    pub mimetype: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A file as declared by the uploader, before it has an id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeclaredFile {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mimetype: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadSignature {
    pub id: String,
    pub share_id: String,
    pub user_id: String,
    pub signature: String,
    pub expires_at: DateTime<Utc>,
    pub expected_file_count: u64,
    pub expected_size_mb: u64,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Everything the public read path needs, read once per request.
#[derive(Clone, Debug, PartialEq)]
pub struct ShareSnapshot {
    pub share: Share,
    pub settings: Option<ShareSettings>,
    pub files: Vec<FileRecord>,
}

/// Single-file lookup used by download authorization.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadTarget {
    pub file: FileRecord,
    pub share: Share,
    pub settings: Option<ShareSettings>,
}

/// Rows written together when a share is created.
#[derive(Clone, Debug, PartialEq)]
pub struct NewShareBundle {
    pub share: Share,
    pub settings: ShareSettings,
    pub signature: UploadSignature,
}

/// Rows written together when the file service reports a finished upload.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedUpload {
    pub signature_id: String,
    pub share_id: String,
    pub owner_id: String,
    pub files: Vec<FileRecord>,
    pub total_size: u64,
    pub consumed_mb: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VisitRecord {
    pub id: String,
    pub share_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DownloadRecord {
    pub id: String,
    pub share_id: String,
    pub file_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Dashboard row: a live share together with its public slug.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ShareSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub file_count: u64,
    pub size: u64,
    pub download_count: u64,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
    pub custom_slug: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ShareStats {
    pub total_shares: u64,
    pub total_files: u64,
    pub total_size: u64,
    pub total_downloads: u64,
}

impl ShareStats {
    pub fn from_summaries(shares: &[ShareSummary]) -> Self {
        shares.iter().fold(Self::default(), |mut stats, share| {
            stats.total_shares += 1;
            stats.total_files += share.file_count;
            stats.total_size += share.size;
            stats.total_downloads += share.download_count;
            stats
        })
    }
}
