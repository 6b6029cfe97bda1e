use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use validator::Validate;

/// One row of the 'comments' table joined with its author and the caller's vote.
/// The row only knows its parent; children are found by grouping on read.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "post")]
    pub post_id: i64,
    #[serde(rename = "author")]
    pub author_id: i64,
    pub author_username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    #[serde(rename = "parent")]
    pub parent_id: Option<i64>,
    pub votes: i32,
    /// Caller's vote: 1, -1, or 0.
    pub user_vote: i32,
}

/// Pushes the `SELECT ... FROM` part of a comment query, binding the viewer id
/// (or NULL) for the vote join.
pub fn push_comment_select(query: &mut QueryBuilder<'_, Postgres>, viewer: Option<i64>) {
    query.push(
        r#"
        SELECT
            c.id, c.post_id, c.author_id, u.username AS author_username,
            c.text, c.created_at, c.edited_at, c.is_edited, c.parent_id, c.votes,
            COALESCE(cv.value, 0)::INT AS user_vote
        FROM comments c
        JOIN users u ON u.id = c.author_id
        LEFT JOIN comment_votes cv ON cv.comment_id = c.id AND cv.user_id = "#,
    );
    query.push_bind(viewer);
}

/// A comment with its replies, serialized depth-first.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Rebuilds reply trees from flat rows.
///
/// Rows are grouped by parent id; each level is ordered by creation time, ties
/// broken by id. A row whose parent is not in `rows` is treated as a root so a
/// partial selection still renders.
pub fn build_tree(mut rows: Vec<Comment>) -> Vec<CommentNode> {
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let present: std::collections::HashSet<i64> = rows.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for row in rows {
        let key = row.parent_id.filter(|pid| present.contains(pid));
        children.entry(key).or_default().push(row);
    }

    attach(None, &mut children)
}

fn attach(parent: Option<i64>, children: &mut HashMap<Option<i64>, Vec<Comment>>) -> Vec<CommentNode> {
    let level = children.remove(&parent).unwrap_or_default();
    level
        .into_iter()
        .map(|comment| {
            let replies = attach(Some(comment.id), children);
            CommentNode { comment, replies }
        })
        .collect()
}

/// DTO for creating a comment or a reply.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    pub post: i64,

    /// Optional: the ID of the comment being replied to.
    pub parent: Option<i64>,

    #[validate(length(min = 1, message = "Comment text may not be blank"))]
    pub text: String,
}

/// DTO for `PUT`/`PATCH /comments/{id}`. Only the text can change.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, message = "Comment text may not be blank"))]
    pub text: String,
}

/// Query parameters for listing comments.
#[derive(Debug, Deserialize)]
pub struct CommentListParams {
    pub post: Option<i64>,
}
