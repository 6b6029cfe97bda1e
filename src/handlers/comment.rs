use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::notification::notify_new_comment,
    models::comment::{
        Comment, CommentListParams, CommentNode, CreateCommentRequest, UpdateCommentRequest,
        build_tree, push_comment_select,
    },
    utils::{
        html::clean_html,
        jwt::{Claims, MaybeClaims},
    },
};

/// Loads comments (all, or those of one post) and rebuilds their reply trees.
pub(crate) async fn fetch_comment_tree(
    pool: &PgPool,
    post_id: Option<i64>,
    viewer: Option<i64>,
) -> Result<Vec<CommentNode>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new("");
    push_comment_select(&mut query, viewer);
    if let Some(post_id) = post_id {
        query.push(" WHERE c.post_id = ").push_bind(post_id);
    }

    let rows = query.build_query_as::<Comment>().fetch_all(pool).await?;
    Ok(build_tree(rows))
}

/// Loads one comment as seen by `viewer`.
pub(crate) async fn fetch_comment(
    pool: &PgPool,
    id: i64,
    viewer: Option<i64>,
) -> Result<Comment, AppError> {
    let mut query = QueryBuilder::<Postgres>::new("");
    push_comment_select(&mut query, viewer);
    query.push(" WHERE c.id = ").push_bind(id);

    query
        .build_query_as::<Comment>()
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))
}

/// Loads a comment together with its whole reply subtree.
pub(crate) async fn fetch_comment_node(
    pool: &PgPool,
    id: i64,
    viewer: Option<i64>,
) -> Result<CommentNode, AppError> {
    let comment = fetch_comment(pool, id, viewer).await?;

    let mut query = QueryBuilder::<Postgres>::new("WITH RECURSIVE subtree AS (SELECT id FROM comments WHERE parent_id = ");
    query
        .push_bind(id)
        .push(" UNION ALL SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id) ");
    push_comment_select(&mut query, viewer);
    query.push(" WHERE c.id IN (SELECT id FROM subtree)");

    let mut rows = query.build_query_as::<Comment>().fetch_all(pool).await?;
    rows.push(comment);

    build_tree(rows)
        .into_iter()
        .find(|node| node.comment.id == id)
        .ok_or(AppError::NotFound("Comment not found".to_string()))
}

/// List comments as reply trees, optionally restricted to one post.
pub async fn list_comments(
    State(pool): State<PgPool>,
    viewer: MaybeClaims,
    Query(params): Query<CommentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let tree = fetch_comment_tree(&pool, params.post, viewer.user_id()).await?;
    Ok(Json(tree))
}

/// Get one comment with its replies.
pub async fn get_comment(
    State(pool): State<PgPool>,
    viewer: MaybeClaims,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_comment_node(&pool, id, viewer.user_id()).await?))
}

/// Comment on a post or reply to a comment, then notify the parent author
/// (replies) or the post author (root comments).
pub async fn create_comment(
    State(pool): State<PgPool>,
    claims: Claims,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    // 1. The post must exist
    let post_author = sqlx::query_scalar::<_, i64>("SELECT author_id FROM posts WHERE id = $1")
        .bind(payload.post)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    // 2. The parent must sit under the same post
    let parent_author = match payload.parent {
        Some(parent_id) => {
            let parent = sqlx::query_as::<_, (i64, i64)>(
                "SELECT post_id, author_id FROM comments WHERE id = $1",
            )
            .bind(parent_id)
            .fetch_optional(&pool)
            .await?;

            match parent {
                Some((post_id, author_id)) if post_id == payload.post => Some(author_id),
                Some(_) => {
                    return Err(AppError::BadRequest(
                        "Parent comment belongs to a different post.".to_string(),
                    ));
                }
                None => {
                    return Err(AppError::BadRequest(
                        "Parent comment does not exist.".to_string(),
                    ));
                }
            }
        }
        None => None,
    };

    // 3. Insert
    let comment_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO comments (post_id, author_id, parent_id, text)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(payload.post)
    .bind(user_id)
    .bind(payload.parent)
    .bind(clean_html(&payload.text))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create comment: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    // 4. Fan out; never fails the request
    notify_new_comment(&pool, user_id, payload.post, comment_id, post_author, parent_author).await;

    let comment = fetch_comment(&pool, comment_id, Some(user_id)).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommentNode { comment, replies: Vec::new() }),
    ))
}

/// Rejects the edit/delete unless `user_id` wrote the comment.
async fn ensure_comment_author(pool: &PgPool, id: i64, user_id: i64) -> Result<(), AppError> {
    let author_id = sqlx::query_scalar::<_, i64>("SELECT author_id FROM comments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;

    if author_id != user_id {
        return Err(AppError::Forbidden(
            "You can only modify your own comments.".to_string(),
        ));
    }
    Ok(())
}

/// Edit the text of a comment. Author only. Serves both `PUT` and `PATCH`.
pub async fn update_comment(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    ensure_comment_author(&pool, id, user_id).await?;

    sqlx::query(
        "UPDATE comments SET text = $1, is_edited = TRUE, edited_at = NOW() WHERE id = $2",
    )
    .bind(clean_html(&payload.text))
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(Json(fetch_comment_node(&pool, id, Some(user_id)).await?))
}

/// Delete a comment and its replies. Author only.
pub async fn delete_comment(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    ensure_comment_author(&pool, id, user_id).await?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(comment_id = id, "Comment deleted by {}", claims.username);

    Ok(StatusCode::NO_CONTENT)
}
