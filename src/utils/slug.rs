// src/utils/slug.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use unicode_normalization::UnicodeNormalization;

use crate::error::AppError;

pub const MAX_SLUG_LEN: usize = 200;

/// Anything that can answer "is this slug already used by a post?".
#[async_trait]
pub trait SlugLookup {
    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError>;
}

#[async_trait]
impl SlugLookup for PgPool {
    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self)
            .await?;
        Ok(exists)
    }
}

/// Decomposes accented letters (NFKD) and keeps their ASCII base, lowercases,
/// drops everything that is not alphanumeric, underscore, hyphen or
/// whitespace, then joins words with single hyphens.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .nfkd()
        .filter(char::is_ascii)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_dash = false;
    for c in kept.trim().chars() {
        if c == '-' || c.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c);
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Picks a slug for a new post: the slugified title, then `-1`, `-2`, ... until
/// one is free. When a candidate would exceed the column width the timestamp
/// form `post-YYYYmmddHHMMSS` is used instead.
pub async fn unique_slug<L>(lookup: &L, title: &str, now: DateTime<Utc>) -> Result<String, AppError>
where
    L: SlugLookup + Sync + ?Sized,
{
    let mut base = slugify(title);
    if base.is_empty() {
        base = "post".to_string();
    }
    if base.len() > MAX_SLUG_LEN {
        base.truncate(MAX_SLUG_LEN);
    }

    let mut candidate = base.clone();
    let mut counter = 1u32;
    while lookup.slug_exists(&candidate).await? {
        candidate = format!("{}-{}", base, counter);
        counter += 1;
        if candidate.len() > MAX_SLUG_LEN {
            return Ok(format!("post-{}", now.format("%Y%m%d%H%M%S")));
        }
    }

    Ok(candidate)
}
