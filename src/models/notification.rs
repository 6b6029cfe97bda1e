use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Kinds of events a user is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Someone commented on your post.
    Comment,
    /// Someone replied to your comment.
    Reply,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Comment => "comment",
            NotificationKind::Reply => "reply",
        }
    }
}

/// Who should hear about a new comment, and as what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub kind: NotificationKind,
}

/// Routes a new comment to the parent comment's author (replies) or the post's
/// author (root comments). Nobody is notified about their own activity.
pub fn recipient_for(actor: i64, post_author: i64, parent_author: Option<i64>) -> Option<Recipient> {
    let (user_id, kind) = match parent_author {
        Some(parent_author) => (parent_author, NotificationKind::Reply),
        None => (post_author, NotificationKind::Comment),
    };

    (user_id != actor).then_some(Recipient { user_id, kind })
}

/// A notification as listed to its recipient.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub notification_type: String,
    pub post_id: Option<i64>,
    pub post_title: Option<String>,
    pub comment_id: Option<i64>,
    pub comment_text: Option<String>,
    pub actor_username: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

pub const NOTIFICATION_SELECT: &str = r#"
    SELECT
        n.id, n.notification_type,
        n.post_id, p.title AS post_title,
        n.comment_id, c.text AS comment_text,
        a.username AS actor_username,
        n.read, n.created_at
    FROM notifications n
    JOIN users a ON a.id = n.actor_id
    LEFT JOIN posts p ON p.id = n.post_id
    LEFT JOIN comments c ON c.id = n.comment_id
"#;
