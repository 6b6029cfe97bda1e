// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        CreateUserRequest, LoginRequest, MeResponse, RefreshRequest, USER_COLUMNS,
        UpdateMeRequest, User,
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, REFRESH, issue_tokens, verify_jwt},
        password::validate_password,
        username::UsernameLookup,
        validation::{normalize_email, validate_username_format},
    },
};

/// Loads a user by id.
pub(crate) async fn load_user(pool: &PgPool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Registers a new user.
///
/// Username rules and password strength are checked before anything is
/// written. Returns 201 Created and the account (without password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    validate_username_format(&payload.username)?;
    let email = normalize_email(payload.email.as_deref())?;

    if pool.username_taken(&payload.username, None).await? {
        return Err(AppError::BadRequest("This username is already taken.".to_string()));
    }

    validate_password(&payload.password, &payload.username, &email)?;

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(&payload.username)
    .bind(&email)
    .bind(&hashed_password)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    tracing::info!(user_id = user.id, "Registered user {}", user.username);

    Ok((StatusCode::CREATED, Json(MeResponse::from(user))))
}

/// Authenticates a user and returns an access/refresh token pair.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let invalid = || AppError::AuthError("No active account found with the given credentials".to_string());

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or_else(invalid)?;

    if !verify_password(&payload.password, user.password.as_deref())? {
        return Err(invalid());
    }

    Ok(Json(issue_tokens(&user, &config)?))
}

/// Exchanges a refresh token for a new token pair.
pub async fn refresh(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_jwt(&payload.refresh, &config.jwt_secret, REFRESH)?;

    // The account may have been renamed or deleted since the token was issued.
    let user = load_user(&pool, claims.user_id()?)
        .await
        .map_err(|_| AppError::AuthError("User not found".to_string()))?;

    Ok(Json(issue_tokens(&user, &config)?))
}

/// Current account.
pub async fn get_me(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    let user = load_user(&pool, claims.user_id()?).await?;
    Ok(Json(MeResponse::from(user)))
}

/// Updates username and/or email of the current account.
pub async fn update_me(
    State(pool): State<PgPool>,
    claims: Claims,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    if let Some(username) = &payload.username {
        validate_username_format(username)?;
        if pool.username_taken(username, Some(user_id)).await? {
            return Err(AppError::BadRequest("This username is already taken.".to_string()));
        }
    }

    let email = match &payload.email {
        Some(raw) => Some(normalize_email(Some(raw))?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET username = COALESCE($1, username), email = COALESCE($2, email)
        WHERE id = $3
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&payload.username)
    .bind(&email)
    .bind(user_id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("This username is already taken.".to_string())
        } else {
            AppError::from(e)
        }
    })?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse::from(user)))
}
