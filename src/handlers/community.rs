use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    handlers::comment::fetch_comment_tree,
    models::post::{
        CreatePostRequest, FeedSort, PatchPostRequest, Post, PostDetail, PostListParams,
        parse_date_filter, push_post_select, sort_feed,
    },
    utils::{
        html::clean_html,
        jwt::{Claims, MaybeClaims},
        slug::unique_slug,
    },
};

/// Loads one post as seen by `viewer`.
pub(crate) async fn fetch_post(
    pool: &PgPool,
    id: i64,
    viewer: Option<i64>,
) -> Result<Post, AppError> {
    let mut query = QueryBuilder::<Postgres>::new("");
    push_post_select(&mut query, viewer);
    query.push(" WHERE p.id = ").push_bind(id);

    query
        .build_query_as::<Post>()
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// Rejects the edit/delete unless `user_id` wrote the post.
async fn ensure_post_author(pool: &PgPool, id: i64, user_id: i64) -> Result<(), AppError> {
    let author_id = sqlx::query_scalar::<_, i64>("SELECT author_id FROM posts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if author_id != user_id {
        return Err(AppError::Forbidden(
            "You can only modify your own posts.".to_string(),
        ));
    }
    Ok(())
}

/// Create a new post. The slug is derived from the title.
pub async fn create_post(
    State(pool): State<PgPool>,
    claims: Claims,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let (post_id, slug) = insert_post(&pool, user_id, &payload).await?;

    tracing::info!(post_id, "Created post '{}'", slug);

    let post = fetch_post(&pool, post_id, Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

const SLUG_ATTEMPTS: usize = 5;

/// Inserts the post under a fresh slug. A concurrent post that grabs the same
/// slug between the lookup and the insert triggers another lookup.
async fn insert_post(
    pool: &PgPool,
    user_id: i64,
    payload: &CreatePostRequest,
) -> Result<(i64, String), AppError> {
    let content = clean_html(&payload.content);

    for attempt in 1..=SLUG_ATTEMPTS {
        let slug = unique_slug(pool, &payload.title, Utc::now()).await?;

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO posts (author_id, title, content, slug)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&payload.title)
        .bind(&content)
        .bind(&slug)
        .fetch_one(pool)
        .await;

        match inserted {
            Ok(post_id) => return Ok((post_id, slug)),
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(attempt, "Slug '{}' was taken concurrently", slug);
            }
            Err(e) => {
                tracing::error!("Failed to create post: {:?}", e);
                return Err(AppError::InternalServerError(e.to_string()));
            }
        }
    }

    Err(AppError::Conflict(
        "A post with this slug was just created; please retry".to_string(),
    ))
}

/// Builds the filtered feed query. Ordering happens in `sort_feed`.
fn feed_query(params: &PostListParams, viewer: Option<i64>) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new("");
    push_post_select(&mut query, viewer);
    query.push(" WHERE TRUE");

    if let Some(author) = params.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        query
            .push(" AND STRPOS(LOWER(u.username), LOWER(")
            .push_bind(author.to_string())
            .push(")) > 0");
    }

    if let Some(from) = params.date_from.as_deref().and_then(parse_date_filter) {
        query.push(" AND p.created_at >= ").push_bind(from);
    }

    if let Some(to) = params.date_to.as_deref().and_then(parse_date_filter) {
        query.push(" AND p.created_at <= ").push_bind(to);
    }

    query
}

/// List posts with optional author/date filters and one of the feed orderings.
/// Malformed date filters are ignored.
pub async fn list_posts(
    State(pool): State<PgPool>,
    viewer: MaybeClaims,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut posts = feed_query(&params, viewer.user_id())
        .build_query_as::<Post>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list posts: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    sort_feed(&mut posts, FeedSort::parse(params.sort.as_deref()), Utc::now());

    Ok(Json(posts))
}

/// Get a single post by ID, with its comment tree.
pub async fn get_post(
    State(pool): State<PgPool>,
    viewer: MaybeClaims,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer.user_id();
    let post = fetch_post(&pool, id, viewer).await?;
    let comments = fetch_comment_tree(&pool, Some(id), viewer).await?;

    Ok(Json(PostDetail { post, comments }))
}

/// Replace title and content. Author only.
pub async fn update_post(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    apply_post_edit(&pool, &claims, id, Some(payload.title), Some(payload.content)).await
}

/// Change title and/or content. Author only.
pub async fn patch_post(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(payload): Json<PatchPostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    apply_post_edit(&pool, &claims, id, payload.title, payload.content).await
}

async fn apply_post_edit(
    pool: &PgPool,
    claims: &Claims,
    id: i64,
    title: Option<String>,
    content: Option<String>,
) -> Result<Json<Post>, AppError> {
    let user_id = claims.user_id()?;
    ensure_post_author(pool, id, user_id).await?;

    // The slug is fixed at creation; edits only flag the post.
    sqlx::query(
        r#"
        UPDATE posts
        SET title = COALESCE($1, title),
            content = COALESCE($2, content),
            is_edited = TRUE,
            edited_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(title)
    .bind(content.as_deref().map(clean_html))
    .bind(id)
    .execute(pool)
    .await?;

    Ok(Json(fetch_post(pool, id, Some(user_id)).await?))
}

/// Delete a post together with its comments, votes and saves. Author only.
pub async fn delete_post(
    State(pool): State<PgPool>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    // 1. Check Permission
    ensure_post_author(&pool, id, user_id).await?;

    // 2. Delete (cascades)
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// List posts saved by the current user, most recently saved first.
pub async fn list_saved(
    State(pool): State<PgPool>,
    claims: Claims,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut query = QueryBuilder::<Postgres>::new("");
    push_post_select(&mut query, Some(user_id));
    query
        .push(" JOIN saved_posts mine ON mine.post_id = p.id AND mine.user_id = ")
        .push_bind(user_id)
        .push(" ORDER BY mine.saved_at DESC, mine.id DESC");

    let posts = query.build_query_as::<Post>().fetch_all(&pool).await?;

    Ok(Json(posts))
}
