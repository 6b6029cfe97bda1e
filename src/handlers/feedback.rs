use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::feedback::{CreateFeedbackRequest, Feedback, FeedbackKind},
    utils::{
        html::clean_html,
        jwt::{Claims, MaybeClaims},
        validation::normalize_email,
    },
};

const FEEDBACK_COLUMNS: &str = "id, user_id, type, subject, message, email, created_at";

/// Submit feedback. Anonymous submissions are accepted.
pub async fn create_feedback(
    State(pool): State<PgPool>,
    viewer: MaybeClaims,
    Json(payload): Json<CreateFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let kind = FeedbackKind::parse(payload.kind.as_deref())?;
    let email = normalize_email(payload.email.as_deref())?;

    let feedback = sqlx::query_as::<_, Feedback>(&format!(
        r#"
        INSERT INTO feedback (user_id, type, subject, message, email)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {FEEDBACK_COLUMNS}
        "#
    ))
    .bind(viewer.user_id())
    .bind(kind.as_str())
    .bind(payload.subject.trim())
    .bind(clean_html(&payload.message))
    .bind(&email)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store feedback: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(feedback_id = feedback.id, "Received {} feedback", kind.as_str());

    Ok((StatusCode::CREATED, Json(feedback)))
}

/// All feedback, newest first. Admin only.
pub async fn list_feedback(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_admin() {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let feedback = sqlx::query_as::<_, Feedback>(&format!(
        "SELECT {FEEDBACK_COLUMNS} FROM feedback ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(feedback))
}
