//! HTTP-level tests for versioned post updates and post authorization.

#[path = "support/app.rs"]
mod support;

use agora_core::Role;
use agora_test_utils::RecordingMailer;
use axum::http::{Method, StatusCode};
use serde_json::json;
use support::{spawn_app, test_config, TestApp};

async fn create_post(app: &TestApp, token: &str) -> i64 {
    let response = app
        .call(
            Method::POST,
            "/v1/posts",
            Some(token),
            Some(json!({ "title": "Hello", "content": "First post", "tags": ["intro"] })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    assert_eq!(response.body["version"], 1);
    response.body["id"].as_i64().expect("post id")
}

#[tokio::test]
async fn create_and_read_post() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (user_id, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;

    let response = app
        .call(Method::GET, &format!("/v1/posts/{post_id}"), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user_id"], user_id);
    assert_eq!(response.body["tags"], json!(["intro"]));
}

#[tokio::test]
async fn posts_require_a_token() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let response = app
        .call(
            Method::POST,
            "/v1/posts",
            None,
            Some(json!({ "title": "Hello", "content": "First post" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sequential_updates_bump_the_version() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;
    let uri = format!("/v1/posts/{post_id}");

    let first = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "v2", "version": 1 })))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["version"], 2);
    assert_eq!(first.body["title"], "v2");
    assert_eq!(first.body["content"], "First post");

    let second = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({ "content": "edited", "version": 2 })))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["version"], 3);
    assert_eq!(second.body["title"], "v2");
}

#[tokio::test]
async fn stale_version_conflicts() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;
    let uri = format!("/v1/posts/{post_id}");

    app.call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "v2", "version": 1 })))
        .await;
    let stale = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "lost", "version": 1 })))
        .await;
    assert_eq!(stale.status, StatusCode::CONFLICT);
    assert_eq!(stale.body["code"], "CONCURRENT_MODIFICATION");

    let current = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(current.body["title"], "v2");
    assert_eq!(current.body["version"], 2);
}

#[tokio::test]
async fn concurrent_updates_have_one_winner() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;
    let uri = format!("/v1/posts/{post_id}");

    let (a, b) = tokio::join!(
        app.call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "from-a", "version": 1 }))),
        app.call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "from-b", "version": 1 }))),
    );

    let mut statuses = [a.status, b.status];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let current = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(current.body["version"], 2);
    let winner = if a.status == StatusCode::OK { "from-a" } else { "from-b" };
    assert_eq!(current.body["title"], winner);
}

#[tokio::test]
async fn update_without_fields_or_version_is_rejected() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;
    let uri = format!("/v1/posts/{post_id}");

    let empty = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({ "version": 1 })))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let missing_version = app
        .call(Method::PATCH, &uri, Some(&token), Some(json!({ "title": "x" })))
        .await;
    assert!(missing_version.status.is_client_error());

    let too_long = app
        .call(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({ "content": "c".repeat(1001), "version": 1 })),
        )
        .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn other_users_need_a_role() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, owner) = app.register_and_login("ada").await;
    let (grace_id, grace) = app.register_and_login("grace").await;
    let post_id = create_post(&app, &owner).await;
    let uri = format!("/v1/posts/{post_id}");

    let edit = app
        .call(Method::PATCH, &uri, Some(&grace), Some(json!({ "title": "mine", "version": 1 })))
        .await;
    assert_eq!(edit.status, StatusCode::FORBIDDEN);

    app.storage
        .set_user_role(grace_id, Role::Moderator.id())
        .expect("promote");
    let edit = app
        .call(Method::PATCH, &uri, Some(&grace), Some(json!({ "title": "moderated", "version": 1 })))
        .await;
    assert_eq!(edit.status, StatusCode::OK);

    let delete = app.call(Method::DELETE, &uri, Some(&grace), None).await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    app.storage
        .set_user_role(grace_id, Role::Admin.id())
        .expect("promote");
    let delete = app.call(Method::DELETE, &uri, Some(&grace), None).await;
    assert_eq!(delete.status, StatusCode::NO_CONTENT);

    let gone = app.call(Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_can_delete_own_post() {
    let app = spawn_app(test_config(), RecordingMailer::new());
    let (_, token) = app.register_and_login("ada").await;
    let post_id = create_post(&app, &token).await;

    let response = app
        .call(Method::DELETE, &format!("/v1/posts/{post_id}"), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(app.storage.post_count(), 0);
}
