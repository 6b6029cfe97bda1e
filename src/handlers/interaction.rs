use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::{comment::fetch_comment_node, community::fetch_post},
    models::vote::{LedgerChange, VoteRequest, VoteTarget, VoteValue, plan_vote},
    utils::jwt::Claims,
};

/// Applies one vote in a single transaction and returns the new tally.
///
/// The target row is locked first, so concurrent votes on the same target
/// serialize and the tally always equals the sum of the ledger.
pub(crate) async fn cast_vote(
    pool: &PgPool,
    target: VoteTarget,
    target_id: i64,
    user_id: i64,
    value: VoteValue,
) -> Result<i32, AppError> {
    let (table, ledger, key) = (target.table(), target.ledger(), target.key());

    let mut tx = pool.begin().await?;

    // 1. Lock the target
    let current = sqlx::query_scalar::<_, i32>(&format!(
        "SELECT votes FROM {table} WHERE id = $1 FOR UPDATE"
    ))
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(format!("{} not found", target.label())))?;

    // 2. Caller's existing vote
    let existing = sqlx::query_scalar::<_, i16>(&format!(
        "SELECT value FROM {ledger} WHERE user_id = $1 AND {key} = $2"
    ))
    .bind(user_id)
    .bind(target_id)
    .fetch_optional(&mut *tx)
    .await?;

    let plan = plan_vote(existing, value);

    // 3. Ledger
    match plan.change {
        LedgerChange::Nothing => {
            tx.commit().await?;
            return Ok(current);
        }
        LedgerChange::Insert(v) => {
            sqlx::query(&format!(
                "INSERT INTO {ledger} (user_id, {key}, value) VALUES ($1, $2, $3)"
            ))
            .bind(user_id)
            .bind(target_id)
            .bind(v)
            .execute(&mut *tx)
            .await?;
        }
        LedgerChange::Update(v) => {
            sqlx::query(&format!(
                "UPDATE {ledger} SET value = $3 WHERE user_id = $1 AND {key} = $2"
            ))
            .bind(user_id)
            .bind(target_id)
            .bind(v)
            .execute(&mut *tx)
            .await?;
        }
        LedgerChange::Delete => {
            sqlx::query(&format!(
                "DELETE FROM {ledger} WHERE user_id = $1 AND {key} = $2"
            ))
            .bind(user_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    // 4. Tally
    let votes = sqlx::query_scalar::<_, i32>(&format!(
        "UPDATE {table} SET votes = votes + $1 WHERE id = $2 RETURNING votes"
    ))
    .bind(plan.delta)
    .bind(target_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(target_id, user_id, delta = plan.delta, "{} vote applied", target.label());

    Ok(votes)
}

/// Vote on a post: 1 up, -1 down, 0 withdraw.
pub async fn vote_post(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let value = VoteValue::try_from(payload.value)?;
    let user_id = claims.user_id()?;

    cast_vote(&pool, VoteTarget::Post, id, user_id, value).await?;

    Ok(Json(fetch_post(&pool, id, Some(user_id)).await?))
}

/// Vote on a comment: 1 up, -1 down, 0 withdraw.
pub async fn vote_comment(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let value = VoteValue::try_from(payload.value)?;
    let user_id = claims.user_id()?;

    cast_vote(&pool, VoteTarget::Comment, id, user_id, value).await?;

    Ok(Json(fetch_comment_node(&pool, id, Some(user_id)).await?))
}

/// Toggle Save on a post.
pub async fn toggle_save(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
        .bind(post_id)
        .fetch_one(&pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    // Remove if present, otherwise insert; a concurrent insert of the same
    // pair is absorbed by ON CONFLICT.
    let removed = sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
        .bind(user_id)
        .bind(post_id)
        .execute(&pool)
        .await?
        .rows_affected()
        > 0;

    if !removed {
        sqlx::query(
            "INSERT INTO saved_posts (user_id, post_id) VALUES ($1, $2) ON CONFLICT (user_id, post_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&pool)
        .await?;
    }

    let post = fetch_post(&pool, post_id, Some(user_id)).await?;

    Ok(Json(json!({
        "is_saved": post.is_saved,
        "post": post,
    })))
}
