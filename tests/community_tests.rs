// tests/community_tests.rs

mod common;

use common::{spawn_app, unique_name};
use serde_json::{Value, json};

fn ids(nodes: &Value) -> Vec<i64> {
    nodes
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn comment_tree_and_root_count() {
    let Some(app) = spawn_app().await else { return };
    let (_, author) = app.signup("a").await;
    let (_, reader) = app.signup("r").await;
    let post = app.create_post(&author, &unique_name("Thread")).await;
    let post_id = post["id"].as_i64().unwrap();

    // 3 root comments, 2 replies to the second
    let mut roots = Vec::new();
    for i in 0..3 {
        let c = app.comment(&reader, post_id, None, &format!("root {}", i)).await;
        roots.push(c["id"].as_i64().unwrap());
    }
    let mut replies = Vec::new();
    for i in 0..2 {
        let c = app.comment(&author, post_id, Some(roots[1]), &format!("reply {}", i)).await;
        assert_eq!(c["parent"], roots[1]);
        replies.push(c["id"].as_i64().unwrap());
    }

    let detail = app.get_json(&format!("/posts/{}", post_id), None).await;
    assert_eq!(detail["comment_count"], 3);
    assert_eq!(ids(&detail["comments"]), roots);
    assert_eq!(ids(&detail["comments"][1]["replies"]), replies);

    let listed = app.get_json(&format!("/comments?post={}", post_id), None).await;
    assert_eq!(ids(&listed), roots);

    let single = app.get_json(&format!("/comments/{}", roots[1]), None).await;
    assert_eq!(ids(&single["replies"]), replies);
}

#[tokio::test]
async fn reply_parent_must_belong_to_the_same_post() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signup("a").await;
    let first = app.create_post(&token, &unique_name("One")).await;
    let second = app.create_post(&token, &unique_name("Two")).await;
    let parent = app.comment(&token, first["id"].as_i64().unwrap(), None, "hi").await;

    let cross_post = app
        .client
        .post(app.url("/comments"))
        .bearer_auth(&token)
        .json(&json!({ "post": second["id"], "parent": parent["id"], "text": "wrong thread" }))
        .send()
        .await
        .unwrap();
    assert_eq!(cross_post.status().as_u16(), 400);

    let missing_post = app
        .client
        .post(app.url("/comments"))
        .bearer_auth(&token)
        .json(&json!({ "post": 999999999, "text": "into the void" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_post.status().as_u16(), 404);

    let blank = app
        .client
        .post(app.url("/comments"))
        .bearer_auth(&token)
        .json(&json!({ "post": first["id"], "text": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status().as_u16(), 400);
}

#[tokio::test]
async fn notifications_follow_the_comment_tree() {
    let Some(app) = spawn_app().await else { return };
    let (_, author) = app.signup("a").await;
    let (commenter_name, commenter) = app.signup("c").await;
    let post = app.create_post(&author, &unique_name("Notify")).await;
    let post_id = post["id"].as_i64().unwrap();

    // Author commenting on and replying under their own post: silent.
    let own = app.comment(&author, post_id, None, "my own note").await;
    app.comment(&author, post_id, Some(own["id"].as_i64().unwrap()), "and a reply").await;
    let count = app.get_json("/notifications/unread_count", Some(&author)).await;
    assert_eq!(count["count"], 0);

    // Another user's root comment notifies the post author.
    let root = app.comment(&commenter, post_id, None, "nice post").await;
    // Another user's reply notifies the parent author.
    let reply = app
        .comment(&commenter, post_id, Some(own["id"].as_i64().unwrap()), "agreed")
        .await;

    let list = app.get_json("/notifications", Some(&author)).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["notification_type"], "reply");
    assert_eq!(list[0]["comment_id"], reply["id"]);
    assert_eq!(list[1]["notification_type"], "comment");
    assert_eq!(list[1]["comment_id"], root["id"]);
    assert_eq!(list[1]["actor_username"], commenter_name.as_str());
    assert_eq!(list[1]["post_title"], post["title"]);
    assert_eq!(list[1]["read"], false);

    // The author replying to the commenter notifies the commenter once.
    app.comment(&author, post_id, Some(root["id"].as_i64().unwrap()), "thanks").await;
    let theirs = app.get_json("/notifications", Some(&commenter)).await;
    assert_eq!(theirs.as_array().unwrap().len(), 1);
    assert_eq!(theirs[0]["notification_type"], "reply");

    // Nobody but the recipient may mark it.
    let foreign = app
        .client
        .post(app.url(&format!("/notifications/{}/mark_read", list[0]["id"])))
        .bearer_auth(&commenter)
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status().as_u16(), 403);

    let marked: Value = app
        .client
        .post(app.url(&format!("/notifications/{}/mark_read", list[0]["id"])))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(marked["read"], true);

    let count = app.get_json("/notifications/unread_count", Some(&author)).await;
    assert_eq!(count["count"], 1);

    let response = app
        .client
        .post(app.url("/notifications/mark_all_read"))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let count = app.get_json("/notifications/unread_count", Some(&author)).await;
    assert_eq!(count["count"], 0);

    let missing = app
        .client
        .post(app.url("/notifications/999999999/mark_read"))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn comment_edit_vote_and_delete() {
    let Some(app) = spawn_app().await else { return };
    let (_, author) = app.signup("a").await;
    let (_, other) = app.signup("o").await;
    let post = app.create_post(&author, &unique_name("Comments")).await;
    let post_id = post["id"].as_i64().unwrap();
    let comment = app.comment(&author, post_id, None, "first draft").await;
    let path = format!("/comments/{}", comment["id"]);
    app.comment(&other, post_id, comment["id"].as_i64(), "a reply").await;

    let forbidden = app
        .client
        .put(app.url(&path))
        .bearer_auth(&other)
        .json(&json!({ "text": "vandalised" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let edited: Value = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&author)
        .json(&json!({ "text": "final version" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(edited["text"], "final version");
    assert_eq!(edited["is_edited"], true);

    let voted: Value = app
        .client
        .post(app.url(&format!("{}/vote", path)))
        .bearer_auth(&other)
        .json(&json!({ "value": -1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(voted["votes"], -1);
    assert_eq!(voted["user_vote"], -1);
    assert_eq!(voted["replies"].as_array().unwrap().len(), 1);
    assert_eq!(voted["replies"][0]["text"], "a reply");

    let deleted = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status().as_u16(), 204);

    // Replies go with it.
    let listed = app.get_json(&format!("/comments?post={}", post_id), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn feedback_is_open_but_listing_is_admin_only() {
    let Some(app) = spawn_app().await else { return };
    let (admin_name, _) = app.signup("adm").await;
    let (_, user) = app.signup("u").await;

    let anonymous = app
        .client
        .post(app.url("/feedback"))
        .json(&json!({ "type": "bug", "subject": "Broken", "message": "It <script>x</script>broke" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 201);
    let stored: Value = anonymous.json().await.unwrap();
    assert_eq!(stored["type"], "bug");
    assert_eq!(stored["user"], Value::Null);
    assert_eq!(stored["message"], "It broke");

    let bad_type = app
        .client
        .post(app.url("/feedback"))
        .json(&json!({ "type": "rant", "message": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_type.status().as_u16(), 400);

    let bad_email = app
        .client
        .post(app.url("/feedback"))
        .json(&json!({ "message": "x", "email": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_email.status().as_u16(), 400);

    let denied = app
        .client
        .get(app.url("/feedback"))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    sqlx::query("UPDATE users SET role = 'admin' WHERE username = $1")
        .bind(&admin_name)
        .execute(&app.pool)
        .await
        .unwrap();
    let admin = app.login(&admin_name).await;

    let all = app.get_json("/feedback", Some(&admin)).await;
    assert!(ids(&all).contains(&stored["id"].as_i64().unwrap()));
}
