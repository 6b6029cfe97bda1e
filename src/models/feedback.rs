use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Feedback categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackKind {
    #[default]
    General,
    Bug,
    Feature,
    Improvement,
    Other,
}

impl FeedbackKind {
    /// Parses a category name; a missing or blank value means `General`.
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim).unwrap_or_default() {
            "" | "general" => Ok(FeedbackKind::General),
            "bug" => Ok(FeedbackKind::Bug),
            "feature" => Ok(FeedbackKind::Feature),
            "improvement" => Ok(FeedbackKind::Improvement),
            "other" => Ok(FeedbackKind::Other),
            other => Err(AppError::BadRequest(format!(
                "\"{other}\" is not a valid feedback type."
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::General => "general",
            FeedbackKind::Bug => "bug",
            FeedbackKind::Feature => "feature",
            FeedbackKind::Improvement => "improvement",
            FeedbackKind::Other => "other",
        }
    }
}

/// Represents the 'feedback' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Feedback {
    pub id: i64,
    /// Submitter, if they were signed in and still exist.
    #[serde(rename = "user")]
    pub user_id: Option<i64>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub message: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for submitting feedback; works with or without a login.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeedbackRequest {
    /// Category name, checked by `FeedbackKind::parse` so a bad value is a 400.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    #[validate(length(max = 120, message = "Subject must be 120 characters or less"))]
    pub subject: String,

    #[validate(length(min = 1, message = "Message may not be blank"))]
    pub message: String,

    /// Optional contact address; blank means none.
    #[serde(default)]
    pub email: Option<String>,
}
