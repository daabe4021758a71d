//! Property-Based Tests for Fixed-Window Admission
//!
//! For any limit and call count within one window, exactly
//! `min(calls, limit)` calls are admitted per client; clients never share a
//! budget; once the window has elapsed the budget is whole again.

#[path = "support/app.rs"]
mod support;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use agora_api::{ApiConfig, FixedWindowLimiter, RateDecision};
use agora_test_utils::{generators::arb_client_key, RecordingMailer};
use axum::http::{Method, StatusCode};
use proptest::prelude::*;
use support::{spawn_app, test_config};

const WINDOW: Duration = Duration::from_secs(5);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn admits_exactly_limit_per_window(limit in 1u32..60, calls in 0usize..120) {
        let limiter = FixedWindowLimiter::new(limit, WINDOW);
        let now = Instant::now();

        let admitted = (0..calls)
            .filter(|_| limiter.allow_at("client", now).is_permitted())
            .count();

        prop_assert_eq!(admitted, calls.min(limit as usize));
    }

    #[test]
    fn throttled_retry_never_exceeds_window(limit in 1u32..20, offset_ms in 0u64..5_000) {
        let limiter = FixedWindowLimiter::new(limit, WINDOW);
        let start = Instant::now();
        for _ in 0..limit {
            limiter.allow_at("client", start);
        }

        match limiter.allow_at("client", start + Duration::from_millis(offset_ms)) {
            RateDecision::Throttled { retry_after } => {
                prop_assert!(retry_after <= WINDOW);
                prop_assert_eq!(retry_after, WINDOW - Duration::from_millis(offset_ms));
            }
            RateDecision::Allowed { .. } => prop_assert!(false, "over-limit call admitted"),
        }
    }

    #[test]
    fn clients_have_independent_budgets(keys in prop::collection::vec(arb_client_key(), 1..10)) {
        let limiter = FixedWindowLimiter::new(1, WINDOW);
        let now = Instant::now();
        let distinct: HashSet<&String> = keys.iter().collect();

        let admitted = keys
            .iter()
            .filter(|key| limiter.allow_at(key, now).is_permitted())
            .count();

        prop_assert_eq!(admitted, distinct.len());
        prop_assert_eq!(limiter.tracked_keys(), distinct.len());
    }

    #[test]
    fn budget_resets_after_window(limit in 1u32..20, extra_ms in 0u64..10_000) {
        let limiter = FixedWindowLimiter::new(limit, WINDOW);
        let start = Instant::now();
        for _ in 0..=limit {
            limiter.allow_at("client", start);
        }

        let later = start + WINDOW + Duration::from_millis(extra_ms);
        prop_assert_eq!(
            limiter.allow_at("client", later),
            RateDecision::Allowed { remaining: limit - 1 }
        );
    }
}

#[tokio::test]
async fn router_throttles_the_twenty_first_request() {
    let config = ApiConfig {
        rate_limit_enabled: true,
        ..test_config()
    };
    let app = spawn_app(config, RecordingMailer::new());

    for _ in 0..20 {
        let response = app.call(Method::GET, "/v1/health", None, None).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let throttled = app.call(Method::GET, "/v1/health", None, None).await;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.body["code"], "TOO_MANY_REQUESTS");
    let retry_after: u64 = throttled.headers["retry-after"]
        .to_str()
        .expect("header")
        .parse()
        .expect("seconds");
    assert!((1..=5).contains(&retry_after));
}

#[tokio::test]
async fn router_rate_limits_before_auth() {
    let config = ApiConfig {
        rate_limit_enabled: true,
        rate_limit_requests: 2,
        ..test_config()
    };
    let app = spawn_app(config, RecordingMailer::new());

    for _ in 0..2 {
        let response = app.call(Method::GET, "/v1/posts/1", None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
    let response = app.call(Method::GET, "/v1/posts/1", None, None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}
