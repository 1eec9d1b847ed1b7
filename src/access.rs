//! # Share Access Guard
//!
//! Read-only gate evaluation for the public read and download paths.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. missing or soft-deleted share
//! 2. share not public
//! 3. expiry in the past
//! 4. download limit reached
//! 5. password
//!
//! Only the first failing check is reported. The guard never touches
//! counters; metering happens in [`crate::shares::ShareLifecycle`] after a
//! decision allows it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{FileRecord, Share, ShareSettings, ShareSnapshot};
use crate::password::verify_password;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    NotFound,
    Forbidden,
    Expired,
    LimitReached,
    /// The share has a password and none was supplied.
    PasswordRequired,
    PasswordIncorrect,
}

impl AccessDecision {
    /// Whether a page view may proceed. Password failures still show the
    /// share's title and description, just not its files.
    pub fn allows_view(self) -> bool {
        matches!(
            self,
            Self::Granted | Self::PasswordRequired | Self::PasswordIncorrect
        )
    }

    /// Error to return for a request that may not proceed.
    pub fn denial(self) -> Option<AppError> {
        match self {
            Self::Granted => None,
            Self::NotFound => Some(AppError::NotFound),
            Self::Forbidden => Some(AppError::Forbidden),
            Self::Expired => Some(AppError::Expired),
            Self::LimitReached => Some(AppError::LimitReached),
            Self::PasswordRequired => Some(AppError::PasswordRequired),
            Self::PasswordIncorrect => Some(AppError::PasswordIncorrect),
        }
    }
}

pub struct AccessGuard;

impl AccessGuard {
    pub fn evaluate(
        share: Option<&Share>,
        settings: Option<&ShareSettings>,
        now: DateTime<Utc>,
        supplied_password: Option<&str>,
    ) -> AccessDecision {
        let Some(share) = share.filter(|share| !share.is_deleted()) else {
            return AccessDecision::NotFound;
        };
        if !share.is_public {
            return AccessDecision::Forbidden;
        }
        let Some(settings) = settings else {
            return AccessDecision::Granted;
        };
        if settings.expiry.is_some_and(|expiry| expiry < now) {
            return AccessDecision::Expired;
        }
        if settings
            .download_limit
            .is_some_and(|limit| share.download_count >= limit)
        {
            return AccessDecision::LimitReached;
        }
        match (settings.password_hash.as_deref(), supplied_password) {
            (None, _) => AccessDecision::Granted,
            (Some(_), None) => AccessDecision::PasswordRequired,
            (Some(hash), Some(password)) if verify_password(password, hash) => {
                AccessDecision::Granted
            }
            (Some(_), Some(_)) => AccessDecision::PasswordIncorrect,
        }
    }
}

/// Public payload of a share page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShareView {
    #[serde(rename = "shareSlug")]
    pub share_slug: String,
    pub share: SharePublic,
    pub settings: SettingsPublic,
    pub files: Vec<FilePublic>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SharePublic {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub file_count: u64,
    pub size: u64,
    pub view_count: u64,
    pub download_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SettingsPublic {
    pub expiry: Option<DateTime<Utc>>,
    pub download_limit: Option<u64>,
    pub needs_password: bool,
    pub password_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilePublic {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mimetype: String,
}

impl From<&FileRecord> for FilePublic {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            size: file.size,
            mimetype: file.mimetype.clone(),
        }
    }
}

impl ShareView {
    /// Builds the page payload for a view the guard let through.
    ///
    /// `view_count` includes the view being served. Files are listed only
    /// when the decision is [`AccessDecision::Granted`].
    pub fn build(
        share_slug: String,
        snapshot: &ShareSnapshot,
        decision: AccessDecision,
        now: DateTime<Utc>,
    ) -> Self {
        let share = &snapshot.share;
        let settings = snapshot.settings.as_ref();
        let needs_password = settings.is_some_and(|s| s.password_hash.is_some());
        let granted = decision == AccessDecision::Granted;

        Self {
            share_slug,
            share: SharePublic {
                id: share.id.clone(),
                title: share.title.clone(),
                description: share.description.clone(),
                file_count: share.file_count,
                size: share.size,
                view_count: share.view_count + 1,
                download_count: share.download_count,
                created_at: share.created_at,
            },
            settings: SettingsPublic {
                expiry: settings.and_then(|s| s.expiry),
                download_limit: settings.and_then(|s| s.download_limit),
                needs_password,
                password_correct: granted,
            },
            files: if granted {
                snapshot.files.iter().map(FilePublic::from).collect()
            } else {
                Vec::new()
            },
            timestamp: now,
        }
    }
}
