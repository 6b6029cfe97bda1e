use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use validator::Validate;

use crate::models::comment::CommentNode;

/// A post as served to clients, joined with its author, root comment count
/// and the caller's interaction state.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub slug: String,

    #[serde(rename = "author")]
    pub author_id: i64,
    pub author_username: String,

    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_edited: bool,

    /// Running tally of the vote ledger.
    pub votes: i32,
    /// Root comments only; replies are not counted.
    pub comment_count: i64,

    /// Caller's vote: 1, -1, or 0 when absent or anonymous.
    pub user_vote: i32,
    pub is_saved: bool,
}

/// Post detail view: the post plus its comment tree.
#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<CommentNode>,
}

/// Pushes the `SELECT ... FROM` part of a post query, binding the viewer id
/// (or NULL) for the vote and save joins. Callers append `WHERE`/`ORDER BY`.
pub fn push_post_select(query: &mut QueryBuilder<'_, Postgres>, viewer: Option<i64>) {
    query.push(
        r#"
        SELECT
            p.id, p.title, p.content, p.slug,
            p.author_id, u.username AS author_username,
            p.created_at, p.edited_at, p.is_edited, p.votes,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id AND c.parent_id IS NULL) AS comment_count,
            COALESCE(v.value, 0)::INT AS user_vote,
            (s.id IS NOT NULL) AS is_saved
        FROM posts p
        JOIN users u ON u.id = p.author_id
        LEFT JOIN votes v ON v.post_id = p.id AND v.user_id = "#,
    );
    query.push_bind(viewer);
    query.push(" LEFT JOIN saved_posts s ON s.post_id = p.id AND s.user_id = ");
    query.push_bind(viewer);
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,

    #[validate(length(min = 1, message = "Content may not be blank"))]
    pub content: String,
}

/// DTO for `PATCH /posts/{id}`; `PUT` reuses `CreatePostRequest`.
#[derive(Debug, Deserialize, Validate)]
pub struct PatchPostRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: Option<String>,

    #[validate(length(min = 1, message = "Content may not be blank"))]
    pub content: Option<String>,
}

/// Query parameters for listing posts. Kept as raw strings so a malformed
/// date filter is ignored instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PostListParams {
    /// Case-insensitive substring of the author's username.
    pub author: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort: Option<String>,
}

/// Feed orderings. Unknown values fall back to `Newest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSort {
    #[default]
    Newest,
    Oldest,
    MostVoted,
    MostComments,
    Trending,
}

impl FeedSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("oldest") => FeedSort::Oldest,
            Some("most_voted") => FeedSort::MostVoted,
            Some("most_comments") => FeedSort::MostComments,
            Some("trending") => FeedSort::Trending,
            _ => FeedSort::Newest,
        }
    }
}

pub const TRENDING_WINDOW_DAYS: i64 = 7;

/// 2 points per vote, 3 per root comment, plus 5 for posts younger than a week.
pub fn trending_score(post: &Post, now: DateTime<Utc>) -> i64 {
    let recent = post.created_at >= now - TimeDelta::days(TRENDING_WINDOW_DAYS);
    i64::from(post.votes) * 2 + post.comment_count * 3 + if recent { 5 } else { 0 }
}

/// Orders the feed in place. Every ranking except `Oldest` breaks ties by
/// recency, then by id so equal timestamps still order deterministically.
pub fn sort_feed(posts: &mut [Post], sort: FeedSort, now: DateTime<Utc>) {
    let recency = |a: &Post, b: &Post| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id));

    match sort {
        FeedSort::Newest => posts.sort_by(recency),
        FeedSort::Oldest => {
            posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }
        FeedSort::MostVoted => posts.sort_by(|a, b| b.votes.cmp(&a.votes).then(recency(a, b))),
        FeedSort::MostComments => posts.sort_by(|a, b| {
            b.comment_count
                .cmp(&a.comment_count)
                .then(recency(a, b))
        }),
        FeedSort::Trending => posts.sort_by(|a, b| {
            trending_score(b, now)
                .cmp(&trending_score(a, now))
                .then(recency(a, b))
        }),
    }
}

/// Parses a date filter. Accepts RFC 3339 (including a trailing `Z`), a naive
/// date-time taken as UTC, or a bare date meaning midnight UTC.
pub fn parse_date_filter(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: i64, votes: i32, comments: i64, age_days: i64, now: DateTime<Utc>) -> Post {
        Post {
            id,
            title: format!("Post {id}"),
            content: String::new(),
            slug: format!("post-{id}"),
            author_id: 1,
            author_username: "ada_l".to_string(),
            created_at: now - TimeDelta::days(age_days),
            edited_at: None,
            is_edited: false,
            votes,
            comment_count: comments,
            user_vote: 0,
            is_saved: false,
        }
    }

    fn ids(posts: &[Post]) -> Vec<i64> {
        posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn trending_prefers_recent_activity() {
        let now = Utc::now();
        let fresh = post(1, 1, 0, 2, now);
        let stale = post(2, 2, 0, 30, now);
        assert_eq!(trending_score(&fresh, now), 7);
        assert_eq!(trending_score(&stale, now), 4);

        let mut feed = vec![stale, fresh];
        sort_feed(&mut feed, FeedSort::Trending, now);
        assert_eq!(ids(&feed), vec![1, 2]);
    }

    #[test]
    fn trending_counts_comments_triple() {
        let now = Utc::now();
        assert_eq!(trending_score(&post(1, 0, 2, 10, now), now), 6);
        assert_eq!(trending_score(&post(1, -1, 1, 1, now), now), 6);
    }

    #[test]
    fn newest_and_oldest_are_mirror_images() {
        let now = Utc::now();
        let mut feed = vec![post(1, 0, 0, 5, now), post(2, 0, 0, 1, now), post(3, 0, 0, 3, now)];
        sort_feed(&mut feed, FeedSort::Newest, now);
        assert_eq!(ids(&feed), vec![2, 3, 1]);
        sort_feed(&mut feed, FeedSort::Oldest, now);
        assert_eq!(ids(&feed), vec![1, 3, 2]);
    }

    #[test]
    fn most_voted_breaks_ties_by_recency() {
        let now = Utc::now();
        let mut feed = vec![post(1, 3, 0, 5, now), post(2, 3, 0, 1, now), post(3, 9, 0, 9, now)];
        sort_feed(&mut feed, FeedSort::MostVoted, now);
        assert_eq!(ids(&feed), vec![3, 2, 1]);
    }

    #[test]
    fn most_comments_uses_root_count() {
        let now = Utc::now();
        let mut feed = vec![post(1, 0, 1, 1, now), post(2, 0, 4, 8, now), post(3, 0, 1, 2, now)];
        sort_feed(&mut feed, FeedSort::MostComments, now);
        assert_eq!(ids(&feed), vec![2, 1, 3]);
    }

    #[test]
    fn unknown_sort_is_newest() {
        assert_eq!(FeedSort::parse(Some("hot")), FeedSort::Newest);
        assert_eq!(FeedSort::parse(None), FeedSort::Newest);
        assert_eq!(FeedSort::parse(Some("trending")), FeedSort::Trending);
    }

    #[test]
    fn date_filters_accept_common_iso_forms() {
        let expected = DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_date_filter("2025-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_date_filter("2025-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(parse_date_filter("2025-01-02T03:04:05"), Some(expected));
        assert_eq!(
            parse_date_filter("2025-01-02"),
            DateTime::parse_from_rfc3339("2025-01-02T00:00:00Z")
                .ok()
                .map(|d| d.with_timezone(&Utc))
        );
    }

    #[test]
    fn malformed_date_filters_are_ignored() {
        assert_eq!(parse_date_filter("yesterday"), None);
        assert_eq!(parse_date_filter("2025-13-40"), None);
        assert_eq!(parse_date_filter(""), None);
    }
}
