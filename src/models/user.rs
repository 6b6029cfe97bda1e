// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username (case-sensitive).
    pub username: String,

    /// Contact email, empty when unknown. Used to match Google sign-ins.
    pub email: String,

    /// Argon2 password hash. `None` for accounts created through Google.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: Option<String>,

    /// User role: 'user' or 'admin'.
    pub role: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub const USER_COLUMNS: &str = "id, username, email, password, role, created_at";

/// Public view of the current account.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub date_joined: chrono::DateTime<chrono::Utc>,
}

impl From<User> for MeResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            date_joined: user.created_at,
        }
    }
}

/// DTO for creating a new user (Registration).
/// Username rules beyond length live in `utils::validation`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 30,
        message = "Username must be between 3 and 30 characters."
    ))]
    pub username: String,
    #[validate(length(max = 128, message = "Password must be 128 characters or less."))]
    pub password: String,
    /// Optional; an empty string means no email.
    #[serde(default)]
    pub email: Option<String>,
}

/// DTO for `PUT /me`. Passwords are not changed here.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(
        min = 3,
        max = 30,
        message = "Username must be between 3 and 30 characters."
    ))]
    pub username: Option<String>,
    pub email: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for exchanging a refresh token.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}
