//! # Slug Allocator
//!
//! Produces the public identifier of a share, either the caller's custom slug
//! or a random alphanumeric one.
//!
//! Generated candidates start at [`GENERATED_SLUG_MIN_LEN`] symbols and grow by
//! one symbol every [`SLUG_ATTEMPTS_PER_LENGTH`] consecutive collisions. After
//! [`SLUG_MAX_ATTEMPTS`] candidates the allocator gives up with
//! [`AppError::SlugExhausted`].
//!
//! The existence check here only avoids obvious collisions. The unique index on
//! `share_settings.custom_slug` decides races, and the lifecycle manager
//! re-allocates when an insert loses one.

use std::future::Future;

use rand_core::{OsRng, RngCore};

use crate::constants::{
    GENERATED_SLUG_MIN_LEN, RESERVED_ID_SLUG, SLUG_ALPHABET, SLUG_ATTEMPTS_PER_LENGTH,
    SLUG_MAX_ATTEMPTS,
};
use crate::errors::{AppError, AppResult};
use crate::store::{ShareStore, StoreError};

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are discarded so every symbol is equally likely.
const REJECTION_BOUND: u8 = (256 / SLUG_ALPHABET.len() * SLUG_ALPHABET.len()) as u8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatedSlug {
    pub value: String,
    /// Generated slugs may be re-drawn after a lost insert race; custom ones may not.
    pub generated: bool,
}

pub struct SlugAllocator<'a> {
    store: &'a dyn ShareStore,
    min_custom_len: usize,
}

impl<'a> SlugAllocator<'a> {
    pub fn new(store: &'a dyn ShareStore, min_custom_len: usize) -> Self {
        Self {
            store,
            min_custom_len,
        }
    }

    /// Reserves `requested` verbatim if it is valid and free, otherwise
    /// generates a fresh slug.
    pub async fn allocate(&self, requested: Option<&str>) -> AppResult<AllocatedSlug> {
        match requested {
            Some(slug) => {
                self.validate_custom(slug)?;
                if self.is_taken(slug).await? {
                    return Err(AppError::Conflict {
                        message: "Custom URL already taken".to_string(),
                    });
                }
                Ok(AllocatedSlug {
                    value: slug.to_string(),
                    generated: false,
                })
            }
            None => Ok(AllocatedSlug {
                value: self.generate().await?,
                generated: true,
            }),
        }
    }

    pub async fn is_taken(&self, slug: &str) -> AppResult<bool> {
        Ok(self.store.slug_exists(slug).await?)
    }

    /// Shape checks done before any lookup.
    pub fn validate_custom(&self, slug: &str) -> AppResult<()> {
        if slug.chars().count() < self.min_custom_len {
            return Err(AppError::validation(format!(
                "Custom URL must be at least {} characters long",
                self.min_custom_len
            )));
        }
        if !slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::validation(
                "Custom URL may only contain letters, digits, '-' and '_'",
            ));
        }
        if slug == RESERVED_ID_SLUG {
            return Err(AppError::validation("Custom URL is reserved"));
        }
        Ok(())
    }

    pub async fn generate(&self) -> AppResult<String> {
        let store = self.store;
        search_free_slug(&mut OsRng, move |candidate| async move {
            store.slug_exists(&candidate).await
        })
        .await
    }
}

/// Candidate length for the zero-based `attempt`.
pub fn candidate_length(attempt: u32) -> usize {
    GENERATED_SLUG_MIN_LEN + (attempt / SLUG_ATTEMPTS_PER_LENGTH) as usize
}

async fn search_free_slug<R, F, Fut>(rng: &mut R, mut taken: F) -> AppResult<String>
where
    R: RngCore,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, StoreError>>,
{
    for attempt in 0..SLUG_MAX_ATTEMPTS {
        let candidate = random_slug(rng, candidate_length(attempt))?;
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::SlugExhausted)
}

fn random_slug<R: RngCore>(rng: &mut R, len: usize) -> AppResult<String> {
    let mut slug = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while slug.len() < len {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| AppError::internal(format!("random source failed: {}", e)))?;
        for byte in buf {
            if byte >= REJECTION_BOUND {
                continue;
            }
            slug.push(SLUG_ALPHABET[(byte as usize) % SLUG_ALPHABET.len()] as char);
            if slug.len() == len {
                break;
            }
        }
    }
    Ok(slug)
}
