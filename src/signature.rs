//! # Upload Signatures
//!
//! Short-lived tokens that let the external file service accept bytes for one
//! share without seeing the uploader's session.
//!
//! ## Format
//!
//! ```text
//! base64url("{user_id}:{share_id}:{issued_ms}") "." hex(HMAC-SHA256(key, payload))
//! ```
//!
//! The tag covers the encoded payload, so a token cannot be re-targeted at
//! another share. Expiry and single use are enforced by the persisted
//! `upload_signatures` row, not by the token itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Fields bound into a token.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureClaims {
    pub user_id: String,
    pub share_id: String,
    pub issued_at: DateTime<Utc>,
}

pub struct UploadSigner {
    key: Vec<u8>,
}

impl UploadSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    pub fn issue(&self, claims: &SignatureClaims) -> AppResult<String> {
        let payload = format!(
            "{}:{}:{}",
            claims.user_id,
            claims.share_id,
            claims.issued_at.timestamp_millis()
        );
        let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let tag = self.tag(&encoded)?;
        Ok(format!("{}.{}", encoded, tag))
    }

    /// Checks the tag and decodes the claims. Any malformed token is `Unauthorized`.
    pub fn verify(&self, token: &str) -> AppResult<SignatureClaims> {
        let (encoded, tag) = token.split_once('.').ok_or(AppError::Unauthorized)?;
        let tag = hex::decode(tag).map_err(|_| AppError::Unauthorized)?;

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&tag).map_err(|_| AppError::Unauthorized)?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AppError::Unauthorized)?;
        let payload = String::from_utf8(payload).map_err(|_| AppError::Unauthorized)?;

        // user and share ids are UUIDs, so ':' only appears as a separator
        let mut parts = payload.splitn(3, ':');
        let (Some(user_id), Some(share_id), Some(issued_ms)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::Unauthorized);
        };
        let issued_ms: i64 = issued_ms.parse().map_err(|_| AppError::Unauthorized)?;
        let issued_at = Utc
            .timestamp_millis_opt(issued_ms)
            .single()
            .ok_or(AppError::Unauthorized)?;

        Ok(SignatureClaims {
            user_id: user_id.to_string(),
            share_id: share_id.to_string(),
            issued_at,
        })
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::internal(format!("invalid signing key: {}", e)))
    }

    fn tag(&self, encoded: &str) -> AppResult<String> {
        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
