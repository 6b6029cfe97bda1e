// src/utils/validation.rs

use std::sync::LazyLock;

use regex::Regex;
use validator::ValidateEmail;

use crate::error::AppError;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid username regex"));

/// Character-level username rules. Length is checked by the request DTOs.
pub fn validate_username_format(username: &str) -> Result<(), AppError> {
    if !USERNAME_PATTERN.is_match(username) {
        return Err(AppError::BadRequest(
            "Username can only contain letters, numbers, and underscores.".to_string(),
        ));
    }

    if username.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "Username cannot be just numbers.".to_string(),
        ));
    }

    Ok(())
}

/// Trims an optional email; blank means "no email". Anything else must parse.
pub fn normalize_email(raw: Option<&str>) -> Result<String, AppError> {
    let email = raw.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Ok(String::new());
    }

    if !email.validate_email() {
        return Err(AppError::BadRequest("Enter a valid email address.".to_string()));
    }

    Ok(email.to_string())
}
