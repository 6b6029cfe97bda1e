use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::notification::{NOTIFICATION_SELECT, NotificationResponse, recipient_for},
    utils::jwt::Claims,
};

/// Records the notification for a freshly committed comment.
///
/// Runs outside the comment's transaction; a failure is logged and dropped.
pub(crate) async fn notify_new_comment(
    pool: &PgPool,
    actor_id: i64,
    post_id: i64,
    comment_id: i64,
    post_author: i64,
    parent_author: Option<i64>,
) {
    let Some(recipient) = recipient_for(actor_id, post_author, parent_author) else {
        return;
    };

    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, notification_type, post_id, comment_id, actor_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(recipient.user_id)
    .bind(recipient.kind.as_str())
    .bind(post_id)
    .bind(comment_id)
    .bind(actor_id)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            comment_id,
            recipient = recipient.user_id,
            "Failed to record {} notification: {:?}",
            recipient.kind.as_str(),
            e
        );
    }
}

/// The caller's notifications, newest first.
pub async fn list_notifications(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let notifications = sqlx::query_as::<_, NotificationResponse>(&format!(
        "{NOTIFICATION_SELECT} WHERE n.user_id = $1 ORDER BY n.created_at DESC, n.id DESC"
    ))
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(notifications))
}

/// Mark one notification as read. Only its recipient may do so.
pub async fn mark_read(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let owner = sqlx::query_scalar::<_, i64>("SELECT user_id FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Notification not found".to_string()))?;

    if owner != user_id {
        return Err(AppError::Forbidden(
            "You can only manage your own notifications.".to_string(),
        ));
    }

    sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    let notification = sqlx::query_as::<_, NotificationResponse>(&format!(
        "{NOTIFICATION_SELECT} WHERE n.id = $1"
    ))
    .bind(id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    let updated = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
        .bind(claims.user_id()?)
        .execute(&pool)
        .await?
        .rows_affected();

    Ok(Json(json!({
        "message": format!("{updated} notifications marked as read"),
    })))
}

pub async fn unread_count(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read",
    )
    .bind(claims.user_id()?)
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({ "count": count })))
}
