//! In-process application harness: the full router over `MockStorage`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use agora_api::{
    build_identity_cache, create_api_router, ApiConfig, AppState, AuthConfig, Authenticator,
    CacheBackendKind, CacheSettings, JwtSecret,
};
use agora_storage::MockStorage;
use agora_test_utils::RecordingMailer;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-with-enough-length";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: MockStorage,
    pub mailer: RecordingMailer,
}

pub fn test_authenticator() -> Authenticator {
    let config = AuthConfig {
        jwt_secret: JwtSecret::new(TEST_JWT_SECRET.to_string()).expect("test secret"),
        ..AuthConfig::default()
    };
    Authenticator::new(config)
}

/// Rate limiting off, no identity cache.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        rate_limit_enabled: false,
        cache: CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        },
        ..ApiConfig::default()
    }
}

/// Rate limiting off, in-memory identity cache.
pub fn cached_test_config() -> ApiConfig {
    ApiConfig {
        cache: CacheSettings {
            enabled: true,
            backend: CacheBackendKind::Memory,
            ..CacheSettings::default()
        },
        ..test_config()
    }
}

pub fn spawn_app(config: ApiConfig, mailer: RecordingMailer) -> TestApp {
    let storage = MockStorage::new();
    let store = Arc::new(storage.clone());
    let cache = build_identity_cache(&config.cache);
    let state = AppState::new(
        config,
        test_authenticator(),
        store.clone(),
        store,
        Arc::new(mailer.clone()),
        cache,
    );
    let router = create_api_router(state.clone())
        .expect("router")
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    TestApp {
        router,
        state,
        storage,
        mailer,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).to_string(),
            ))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Register, activate and log in. Returns `(user_id, bearer token)`.
    pub async fn register_and_login(&self, username: &str) -> (i64, String) {
        let email = format!("{username}@example.com");
        let registered = self
            .call(
                Method::POST,
                "/v1/authentication/user",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "email": email,
                    "password": "s3cret-pass",
                })),
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{:?}", registered.body);
        let user_id = registered.body["id"].as_i64().expect("user id");
        let activation = registered.body["token"].as_str().expect("token").to_string();

        let activated = self
            .call(Method::PUT, &format!("/v1/users/activate/{activation}"), None, None)
            .await;
        assert_eq!(activated.status, StatusCode::NO_CONTENT);

        let issued = self
            .call(
                Method::POST,
                "/v1/authentication/token",
                None,
                Some(serde_json::json!({ "email": email, "password": "s3cret-pass" })),
            )
            .await;
        assert_eq!(issued.status, StatusCode::CREATED);
        let token = issued.body["token"].as_str().expect("jwt").to_string();
        (user_id, token)
    }
}
