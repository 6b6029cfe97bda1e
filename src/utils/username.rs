// src/utils/username.rs

//! Username derivation for accounts created through Google sign-in.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sqlx::PgPool;

use crate::error::AppError;

const MAX_BASE_LEN: usize = 20;
const MAX_COUNTER: u32 = 1000;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid non-word regex"));
static UNDERSCORE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore regex"));

/// Answers whether a username is held by some account other than `except`.
#[async_trait]
pub trait UsernameLookup {
    async fn username_taken(&self, username: &str, except: Option<i64>) -> Result<bool, AppError>;
}

#[async_trait]
impl UsernameLookup for PgPool {
    async fn username_taken(&self, username: &str, except: Option<i64>) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(except)
        .fetch_one(self)
        .await?;
        Ok(taken)
    }
}

fn first_chars(value: &str, n: usize) -> String {
    value.chars().take(n).collect()
}

/// Picks the base username from a Google profile: the cleaned display name,
/// else the cleaned email local part, else `user_` plus the provider id prefix.
pub fn base_username(name: &str, email: &str, provider_id: &str) -> String {
    let from_name = NON_WORD.replace_all(name, "_").to_lowercase();
    let from_name = UNDERSCORE_RUNS.replace_all(&from_name, "_");
    let from_name = from_name.trim_matches('_');
    if from_name.chars().count() >= 3 {
        return first_chars(from_name, MAX_BASE_LEN);
    }

    let local = email.split('@').next().unwrap_or_default();
    let from_email = NON_WORD.replace_all(local, "").to_lowercase();
    if from_email.chars().count() >= 3 && !from_email.chars().all(|c| c.is_ascii_digit()) {
        return first_chars(&from_email, MAX_BASE_LEN);
    }

    format!("user_{}", first_chars(provider_id, 8))
}

/// Appends `1`, `2`, ... to `base` until a free name is found. After
/// `MAX_COUNTER` attempts it settles for `base_<provider id prefix>`.
pub async fn disambiguate<L>(
    lookup: &L,
    base: &str,
    provider_id: &str,
    except: Option<i64>,
) -> Result<String, AppError>
where
    L: UsernameLookup + Sync + ?Sized,
{
    if !lookup.username_taken(base, except).await? {
        return Ok(base.to_string());
    }

    for counter in 1..=MAX_COUNTER {
        let candidate = format!("{}{}", base, counter);
        if !lookup.username_taken(&candidate, except).await? {
            return Ok(candidate);
        }
    }

    Ok(format!("{}_{}", base, first_chars(provider_id, 8)))
}

/// A stored username that should be replaced on the next Google sign-in:
/// purely numeric, shorter than three characters, or equal to the account id
/// or the provider subject id.
pub fn is_degenerate(username: &str, user_id: i64, provider_id: &str) -> bool {
    username.chars().count() < 3
        || username.chars().all(|c| c.is_ascii_digit())
        || username == user_id.to_string()
        || (!provider_id.is_empty() && username == provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// username -> owning account id
    struct Accounts(HashMap<String, i64>);

    #[async_trait]
    impl UsernameLookup for Accounts {
        async fn username_taken(
            &self,
            username: &str,
            except: Option<i64>,
        ) -> Result<bool, AppError> {
            Ok(self
                .0
                .get(username)
                .is_some_and(|owner| Some(*owner) != except))
        }
    }

    #[test]
    fn display_name_is_preferred() {
        assert_eq!(base_username("Ada Lovelace", "x@y.com", "1"), "ada_lovelace");
        assert_eq!(base_username("  J.  R. R. Tolkien!", "x@y.com", "1"), "j_r_r_tolkien");
    }

    #[test]
    fn display_name_is_capped_at_twenty_chars() {
        let base = base_username("Maximilian Alexander Wellington", "", "1");
        assert_eq!(base, "maximilian_alexander");
        assert_eq!(base.len(), 20);
    }

    #[test]
    fn short_name_falls_back_to_email() {
        assert_eq!(base_username("Al", "Al.Smith+news@x.com", "1"), "alsmithnews");
        assert_eq!(base_username("", "A@x.com", "1"), "user_1");
    }

    #[test]
    fn numeric_email_falls_back_to_provider_id() {
        assert_eq!(
            base_username("", "1234567@x.com", "109876543210987654321"),
            "user_10987654"
        );
    }

    #[tokio::test]
    async fn free_base_is_used_as_is() {
        let accounts = Accounts(HashMap::new());
        let name = disambiguate(&accounts, "ada", "g1", None).await.unwrap();
        assert_eq!(name, "ada");
    }

    #[tokio::test]
    async fn colliding_names_get_counter_suffix() {
        let accounts = Accounts(HashMap::from([
            ("alice".to_string(), 1),
            ("alice1".to_string(), 2),
        ]));
        let name = disambiguate(&accounts, "alice", "g1", None).await.unwrap();
        assert_eq!(name, "alice2");
    }

    #[tokio::test]
    async fn own_name_does_not_count_as_taken() {
        let accounts = Accounts(HashMap::from([("alice".to_string(), 7)]));
        let name = disambiguate(&accounts, "alice", "g1", Some(7)).await.unwrap();
        assert_eq!(name, "alice");
    }

    #[tokio::test]
    async fn exhausted_counters_fall_back_to_provider_suffix() {
        let mut taken = HashMap::from([("bob".to_string(), 1)]);
        for n in 1..=MAX_COUNTER {
            taken.insert(format!("bob{}", n), 1);
        }
        let accounts = Accounts(taken);
        let name = disambiguate(&accounts, "bob", "abcdefghijk", None).await.unwrap();
        assert_eq!(name, "bob_abcdefgh");
    }

    #[test]
    fn degenerate_usernames_are_detected() {
        assert!(is_degenerate("4", 4, "g"));
        assert!(is_degenerate("ab", 9, "g"));
        assert!(is_degenerate("12345", 9, "g"));
        assert!(is_degenerate("g_sub_1", 9, "g_sub_1"));
        assert!(!is_degenerate("ada_l", 9, "g_sub_1"));
    }
}
