//! HTTP-level tests for following, the feed and comments.

#[path = "support/app.rs"]
mod support;

use agora_test_utils::RecordingMailer;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use support::{spawn_app, test_config, TestApp};

async fn create_post(app: &TestApp, token: &str, title: &str, tags: Value) -> i64 {
    let response = app
        .call(
            Method::POST,
            "/v1/posts",
            Some(token),
            Some(json!({ "title": title, "content": format!("{title} body"), "tags": tags })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["id"].as_i64().expect("post id")
}

fn feed_ids(body: &Value) -> Vec<i64> {
    body.as_array()
        .map(|items| items.iter().filter_map(|i| i["post"]["id"].as_i64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn follow_brings_posts_into_the_feed() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, ada) = app.register_and_login("ada").await;
    let (bob_id, bob) = app.register_and_login("bob").await;
    let own = create_post(&app, &ada, "Ada writes", json!([])).await;
    let followed = create_post(&app, &bob, "Bob writes", json!(["rust"])).await;

    let feed = app.call(Method::GET, "/v1/users/feed", Some(&ada), None).await;
    assert_eq!(feed.status, StatusCode::OK);
    assert_eq!(feed_ids(&feed.body), [own]);

    let follow = app
        .call(Method::PUT, &format!("/v1/users/{bob_id}/follow"), Some(&ada), None)
        .await;
    assert_eq!(follow.status, StatusCode::NO_CONTENT);

    let feed = app.call(Method::GET, "/v1/users/feed", Some(&ada), None).await;
    assert_eq!(feed_ids(&feed.body), [followed, own]);
    assert_eq!(feed.body[0]["username"], "bob");
    assert_eq!(feed.body[0]["comments_count"], 0);

    let unfollow = app
        .call(Method::PUT, &format!("/v1/users/{bob_id}/unfollow"), Some(&ada), None)
        .await;
    assert_eq!(unfollow.status, StatusCode::NO_CONTENT);
    let feed = app.call(Method::GET, "/v1/users/feed", Some(&ada), None).await;
    assert_eq!(feed_ids(&feed.body), [own]);
}

#[tokio::test]
async fn follow_errors_map_to_statuses() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (ada_id, ada) = app.register_and_login("ada").await;
    let (bob_id, _) = app.register_and_login("bob").await;

    let own = app
        .call(Method::PUT, &format!("/v1/users/{ada_id}/follow"), Some(&ada), None)
        .await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);

    let missing = app
        .call(Method::PUT, "/v1/users/9999/follow", Some(&ada), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let uri = format!("/v1/users/{bob_id}/follow");
    app.call(Method::PUT, &uri, Some(&ada), None).await;
    let again = app.call(Method::PUT, &uri, Some(&ada), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["code"], "ENTITY_ALREADY_EXISTS");

    let not_following = app
        .call(Method::PUT, &format!("/v1/users/{ada_id}/unfollow"), Some(&ada), None)
        .await;
    assert_eq!(not_following.status, StatusCode::NOT_FOUND);

    let anonymous = app.call(Method::PUT, &uri, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feed_pages_filters_and_sorts() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, ada) = app.register_and_login("ada").await;
    let first = create_post(&app, &ada, "Rust notes", json!(["rust"])).await;
    let second = create_post(&app, &ada, "Go notes", json!(["go"])).await;
    let third = create_post(&app, &ada, "More rust", json!(["rust", "db"])).await;

    let page = app
        .call(Method::GET, "/v1/users/feed?limit=2", Some(&ada), None)
        .await;
    assert_eq!(feed_ids(&page.body), [third, second]);
    let page = app
        .call(Method::GET, "/v1/users/feed?limit=2&offset=2", Some(&ada), None)
        .await;
    assert_eq!(feed_ids(&page.body), [first]);

    let asc = app
        .call(Method::GET, "/v1/users/feed?sort=asc", Some(&ada), None)
        .await;
    assert_eq!(feed_ids(&asc.body), [first, second, third]);

    let tagged = app
        .call(Method::GET, "/v1/users/feed?tags=db,go", Some(&ada), None)
        .await;
    assert_eq!(feed_ids(&tagged.body), [third, second]);

    let searched = app
        .call(Method::GET, "/v1/users/feed?search=RUST", Some(&ada), None)
        .await;
    assert_eq!(feed_ids(&searched.body), [third, first]);

    for bad in ["limit=0", "limit=21", "offset=-1", "sort=sideways", "tags=a,b,c,d,e,f"] {
        let response = app
            .call(Method::GET, &format!("/v1/users/feed?{bad}"), Some(&ada), None)
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{bad}");
    }
}

#[tokio::test]
async fn comments_are_returned_with_the_post() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, ada) = app.register_and_login("ada").await;
    let (bob_id, bob) = app.register_and_login("bob").await;
    let post_id = create_post(&app, &ada, "Hello", json!([])).await;
    let uri = format!("/v1/posts/{post_id}/comments");

    for content in ["first!", "second"] {
        let created = app
            .call(Method::POST, &uri, Some(&bob), Some(json!({ "content": content })))
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
        assert_eq!(created.body["user"]["id"], bob_id);
        assert_eq!(created.body["user"]["username"], "bob");
    }

    let post = app
        .call(Method::GET, &format!("/v1/posts/{post_id}"), Some(&ada), None)
        .await;
    assert_eq!(post.status, StatusCode::OK);
    assert_eq!(post.body["id"], post_id);
    assert_eq!(post.body["comments"][0]["content"], "second");
    assert_eq!(post.body["comments"][1]["content"], "first!");

    let feed = app.call(Method::GET, "/v1/users/feed", Some(&ada), None).await;
    assert_eq!(feed.body[0]["comments_count"], 2);
}

#[tokio::test]
async fn comment_validation_and_missing_post() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, ada) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &ada, "Hello", json!([])).await;

    let blank = app
        .call(
            Method::POST,
            &format!("/v1/posts/{post_id}/comments"),
            Some(&ada),
            Some(json!({ "content": "  " })),
        )
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let missing = app
        .call(
            Method::POST,
            "/v1/posts/9999/comments",
            Some(&ada),
            Some(json!({ "content": "hello" })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(app.storage.comment_count(), 0);
}
