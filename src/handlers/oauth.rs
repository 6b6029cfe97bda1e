// src/handlers/oauth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{USER_COLUMNS, User},
    utils::{
        google::{GoogleProfile, GoogleVerifier},
        jwt::issue_tokens,
        username::{base_username, disambiguate, is_degenerate},
    },
};

/// The browser SDKs hand the token over under different names.
#[derive(Debug, Deserialize)]
pub struct GoogleSignInRequest {
    pub id_token: Option<String>,
    pub credential: Option<String>,
    pub access_token: Option<String>,
}

impl GoogleSignInRequest {
    fn token(&self) -> Option<&str> {
        [&self.id_token, &self.credential, &self.access_token]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|t| !t.is_empty())
    }
}

/// Signs a user in with a Google ID token (or access token).
///
/// Finds the account by email or creates one with a username derived from the
/// Google profile. Accounts stuck with a degenerate username get the derived
/// name when it is free. Returns a token pair plus the resolved identity.
pub async fn google_oauth(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(google): State<GoogleVerifier>,
    Json(payload): Json<GoogleSignInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = payload
        .token()
        .ok_or(AppError::BadRequest("ID token or credential required".to_string()))?;

    let profile = google.resolve(token).await?;
    let user = find_or_create(&pool, &profile).await?;
    let tokens = issue_tokens(&user, &config)?;

    Ok(Json(json!({
        "access": tokens.access,
        "refresh": tokens.refresh,
        "username": user.username,
        "email": user.email,
    })))
}

async fn find_or_create(pool: &PgPool, profile: &GoogleProfile) -> Result<User, AppError> {
    let base = base_username(&profile.name, &profile.email, &profile.subject);

    let existing = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1 ORDER BY id LIMIT 1"
    ))
    .bind(&profile.email)
    .fetch_optional(pool)
    .await?;

    let Some(user) = existing else {
        let username = disambiguate(pool, &base, &profile.subject, None).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(&username)
        .bind(&profile.email)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Another sign-in claimed this username; please retry".to_string())
            } else {
                AppError::from(e)
            }
        })?;

        tracing::info!(user_id = user.id, "Created account {} from Google sign-in", user.username);
        return Ok(user);
    };

    if !is_degenerate(&user.username, user.id, &profile.subject) {
        return Ok(user);
    }

    let candidate = disambiguate(pool, &base, &profile.subject, Some(user.id)).await?;
    rename_if_free(pool, user, &candidate).await
}

/// Renames the account in one conditional statement. If another account took
/// the name in the meantime, the old name is kept.
pub async fn rename_if_free(pool: &PgPool, user: User, candidate: &str) -> Result<User, AppError> {
    let renamed = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET username = $1
        WHERE id = $2
          AND NOT EXISTS (SELECT 1 FROM users WHERE username = $1 AND id <> $2)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(candidate)
    .bind(user.id)
    .fetch_optional(pool)
    .await;

    match renamed {
        Ok(Some(updated)) => {
            tracing::info!(user_id = updated.id, "Renamed '{}' to '{}'", user.username, updated.username);
            Ok(updated)
        }
        Ok(None) => Ok(user),
        Err(e) if is_unique_violation(&e) => {
            tracing::info!(user_id = user.id, "Rename to '{}' lost a race; keeping old name", candidate);
            Ok(user)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_token_field_wins() {
        let req: GoogleSignInRequest = serde_json::from_value(json!({
            "id_token": "",
            "credential": "cred",
            "access_token": "acc",
        }))
        .unwrap();
        assert_eq!(req.token(), Some("cred"));
    }

    #[test]
    fn missing_token_fields_yield_none() {
        let req: GoogleSignInRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.token(), None);
    }
}
