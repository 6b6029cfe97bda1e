// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::user::User};

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub username: String,
    pub email: String,
    /// User's role (e.g., 'user', 'admin').
    pub role: String,
    /// 'access' or 'refresh'.
    pub token_type: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// An access/refresh pair handed out on login, refresh and Google sign-in.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs a new JWT for the user.
pub fn sign_jwt(
    user: &User,
    token_type: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user.id.to_string(), // Store User ID in 'sub' claim
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        token_type: token_type.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Issues a fresh access/refresh pair for the user.
pub fn issue_tokens(user: &User, config: &Config) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        access: sign_jwt(user, ACCESS, &config.jwt_secret, config.jwt_expiration)?,
        refresh: sign_jwt(user, REFRESH, &config.jwt_secret, config.refresh_expiration)?,
    })
}

/// Verifies and decodes a JWT string, requiring the given token type.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str, token_type: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    if token_data.claims.token_type != token_type {
        return Err(AppError::AuthError("Token has wrong type".to_string()));
    }

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates an 'Authorization: Bearer <token>' header when one is present and
/// injects the `Claims` into the request extensions. Requests without the header
/// pass through anonymously; handlers decide whether they need an identity via
/// the `Claims` / `MaybeClaims` extractors. A present but invalid token is a 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let Some(value) = auth_header else {
        return next.run(req).await;
    };

    let token = match value.strip_prefix("Bearer ") {
        Some(token) => token,
        None => {
            return AppError::AuthError("Authorization header must use Bearer".to_string())
                .into_response();
        }
    };

    match verify_jwt(token, &config.jwt_secret, ACCESS) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Requires an authenticated caller.
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Claims>().cloned().ok_or_else(|| {
            AppError::AuthError("Authentication credentials were not provided.".to_string())
        })
    }
}

/// The caller's identity if one was presented.
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<Claims>);

impl MaybeClaims {
    /// User id of the caller, if authenticated.
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().and_then(|c| c.user_id().ok())
    }
}

impl<S> FromRequestParts<S> for MaybeClaims
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeClaims(parts.extensions.get::<Claims>().cloned()))
    }
}
