// src/utils/password.rs

//! Password strength rules applied at registration.
//!
//! Four checks run and every failure is reported: similarity to the account's
//! username/email, a minimum length, a list of very common passwords, and a
//! ban on all-digit passwords.

use std::{collections::HashSet, sync::LazyLock};

use crate::error::AppError;

pub const MIN_LENGTH: usize = 8;
pub const MAX_SIMILARITY: f64 = 0.7;

/// Frequently leaked passwords and their usual suffix/leet variants, one per
/// line, lowercase.
static COMMON_PASSWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    include_str!("common_passwords.txt")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
});

/// Runs every strength rule and returns all messages for the ones that fail.
pub fn validate_password(password: &str, username: &str, email: &str) -> Result<(), AppError> {
    let mut problems = Vec::new();

    if let Some(attribute) = too_similar(password, &[("username", username), ("email address", email)]) {
        problems.push(format!("The password is too similar to the {}.", attribute));
    }

    if password.chars().count() < MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_LENGTH
        ));
    }

    let lowered = password.trim().to_lowercase();
    if COMMON_PASSWORDS.contains(lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(problems.join(" ")))
    }
}

/// Returns the name of the first attribute the password resembles too closely.
/// Each attribute is compared whole and split on non-word characters, so the
/// local part of an email counts on its own.
fn too_similar<'a>(password: &str, attributes: &[(&'a str, &str)]) -> Option<&'a str> {
    let password = password.to_lowercase();

    attributes.iter().find_map(|(name, value)| {
        if value.is_empty() {
            return None;
        }
        let value = value.to_lowercase();
        let whole = std::iter::once(value.as_str());
        let parts = value.split(|c: char| !c.is_alphanumeric() && c != '_');
        whole
            .chain(parts)
            .filter(|part| !part.is_empty())
            .any(|part| similarity(&password, part) >= MAX_SIMILARITY)
            .then_some(*name)
    })
}

/// Ratcliff/Obershelp similarity: twice the number of matching characters
/// (found by recursively taking the longest common block) over the total length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j + 1] = length of the common run ending at a[i], b[j]
    let mut lengths = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut next = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                next[j + 1] = lengths[j] + 1;
                if next[j + 1] > best.2 {
                    best = (i + 1 - next[j + 1], j + 1 - next[j + 1], next[j + 1]);
                }
            }
        }
        lengths = next;
    }
    best
}
