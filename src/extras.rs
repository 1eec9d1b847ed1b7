//! Optional share protections.
//!
//! Clients send a loose `extra_features` object: a list of enabled feature
//! names plus companion fields. [`ShareExtras::parse`] turns it into a set of
//! validated [`ShareExtra`] variants, so the rest of the service never looks
//! at feature strings.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::constants::MIN_EXPIRY_DAYS;
use crate::errors::{AppError, AppResult};
use crate::models::ShareSettings;
use crate::password::hash_password;

pub const FEATURE_PASSWORD: &str = "password";
pub const FEATURE_EXPIRY: &str = "expiry";
pub const FEATURE_DOWNLOAD_LIMIT: &str = "download_limit";
pub const FEATURE_CUSTOM_URL: &str = "customURL";

/// `extra_features` as sent by the upload form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtraFeaturesInput {
    #[serde(default)]
    pub enabled_features: Vec<String>,
    pub password: Option<String>,
    /// Day count, sent either as a number or a numeric string.
    pub expiry: Option<Value>,
    pub download_limit: Option<Value>,
    #[serde(rename = "customURL")]
    pub custom_url: Option<String>,
}

impl ExtraFeaturesInput {
    fn enabled(&self, feature: &str) -> bool {
        self.enabled_features.iter().any(|f| f == feature)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShareExtra {
    Password { hash: String },
    Expiry { at: DateTime<Utc> },
    DownloadLimit { n: u64 },
    CustomSlug { value: String },
}

#[derive(Clone, Copy, Debug)]
pub struct ExtraLimits {
    pub max_expiry_days: i64,
    pub min_custom_slug_len: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShareExtras(Vec<ShareExtra>);

impl ShareExtras {
    pub fn parse(input: &ExtraFeaturesInput, now: DateTime<Utc>, limits: ExtraLimits) -> AppResult<Self> {
        let mut extras = Vec::new();

        if input.enabled(FEATURE_PASSWORD) {
            match input.password.as_deref() {
                Some(password) if !password.is_empty() => extras.push(ShareExtra::Password {
                    hash: hash_password(password),
                }),
                _ => {
                    return Err(AppError::validation(
                        "Password is required when password feature is enabled",
                    ))
                }
            }
        }

        if input.enabled(FEATURE_EXPIRY) {
            let days = input
                .expiry
                .as_ref()
                .and_then(whole_number)
                .filter(|days| (MIN_EXPIRY_DAYS..=limits.max_expiry_days).contains(days))
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "Expiry must be between {} and {} days",
                        MIN_EXPIRY_DAYS, limits.max_expiry_days
                    ))
                })?;
            extras.push(ShareExtra::Expiry {
                at: now + Duration::days(days),
            });
        }

        if input.enabled(FEATURE_DOWNLOAD_LIMIT) {
            let limit = input
                .download_limit
                .as_ref()
                .filter(|value| value.is_number())
                .and_then(whole_number)
                .filter(|n| *n >= 0)
                .ok_or_else(|| AppError::validation("Download limit must be a positive number"))?;
            // A limit of zero means "no limit" to the upload form.
            if limit > 0 {
                extras.push(ShareExtra::DownloadLimit { n: limit as u64 });
            }
        }

        let custom_url = input.custom_url.as_deref().filter(|url| !url.is_empty());
        match custom_url {
            Some(value) if value.chars().count() >= limits.min_custom_slug_len => {
                extras.push(ShareExtra::CustomSlug {
                    value: value.to_string(),
                })
            }
            Some(_) => return Err(custom_url_too_short(limits)),
            None if input.enabled(FEATURE_CUSTOM_URL) => return Err(custom_url_too_short(limits)),
            None => {}
        }

        Ok(Self(extras))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShareExtra> {
        self.0.iter()
    }

    pub fn custom_slug(&self) -> Option<&str> {
        self.iter().find_map(|extra| match extra {
            ShareExtra::CustomSlug { value } => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.iter().find_map(|extra| match extra {
            ShareExtra::Expiry { at } => Some(*at),
            _ => None,
        })
    }

    /// Settings row for a share published under `slug`.
    pub fn to_settings(&self, share_id: &str, slug: &str) -> ShareSettings {
        let mut settings = ShareSettings {
            share_id: share_id.to_string(),
            custom_slug: slug.to_string(),
            password_hash: None,
            expiry: None,
            download_limit: None,
        };
        for extra in self.iter() {
            match extra {
                ShareExtra::Password { hash } => settings.password_hash = Some(hash.clone()),
                ShareExtra::Expiry { at } => settings.expiry = Some(*at),
                ShareExtra::DownloadLimit { n } => settings.download_limit = Some(*n),
                ShareExtra::CustomSlug { .. } => {}
            }
        }
        settings
    }
}

fn custom_url_too_short(limits: ExtraLimits) -> AppError {
    AppError::validation(format!(
        "Custom URL must be at least {} characters long",
        limits.min_custom_slug_len
    ))
}

/// Integer value of a JSON number or numeric string. Fractions are rejected.
fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
