//! HTTP API tests
//!
//! 通过 actix test 服务驱动完整的 `/api` 路由，共享存储使用内存实现。

mod common;

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::http::header::{AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use actix_web::{App, test};
use serde_json::{Value, json};

use privalytics::api::configure_api;
use privalytics::api::jwt::JwtService;
use privalytics::config::{StaticConfig, get_config};
use privalytics::kv::{MemoryStore, SharedStore};
use privalytics::runtime::lifetime::{AppContext, Models};
use privalytics::utils::fingerprint;

use common::{FakeChat, FakeEmbedder, create_temp_storage};

const CLIENT_ADDR: &str = "203.0.113.50";
const CLIENT_UA: &str = "TestAgent/1.0";

fn jwt() -> Arc<JwtService> {
    Arc::new(JwtService::new("api-test-secret", 60))
}

fn bearer(jwt: &JwtService, roles: &[&str]) -> String {
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    format!("Bearer {}", jwt.issue("tester", &roles).unwrap())
}

async fn context_with(config: &StaticConfig) -> (AppContext, tempfile::TempDir) {
    let (storage, dir) = create_temp_storage().await;
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let models = Models {
        embedder: Arc::new(FakeEmbedder::new()),
        chat: Arc::new(FakeChat::new()),
        active: false,
    };
    let context = AppContext::assemble(config, storage, store, models, jwt());
    (context, dir)
}

async fn context() -> (AppContext, tempfile::TempDir) {
    common::init_test_config();
    let config = (*get_config()).clone();
    context_with(&config).await
}

fn track_request(body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/track")
        .insert_header(("x-forwarded-for", CLIENT_ADDR))
        .insert_header((USER_AGENT, CLIENT_UA))
        .set_json(body)
}

// =============================================================================
// /api/track 与 /api/consent
// =============================================================================

#[actix_rt::test]
async fn test_track_returns_event_id() {
    let (ctx, _dir) = context().await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        track_request(json!({
            "page": "https://example.com/pricing",
            "type": "click",
            "metadata": {"button": "signup"},
            "consentGiven": true,
            "title": "Pricing"
        }))
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["eventId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[actix_rt::test]
async fn test_track_rejects_invalid_payloads() {
    let (ctx, _dir) = context().await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let invalid = [
        json!({"page": "not a url", "type": "pageview"}),
        json!({"page": "https://example.com/", "type": "hover"}),
        json!({"type": "pageview"}),
        json!({"page": "https://example.com/", "type": "pageview", "consentGiven": "yes"}),
    ];
    for body in invalid {
        let resp = test::call_service(&app, track_request(body.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", body);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json, json!({"success": false, "error": "Invalid request"}));
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/track")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_track_is_rate_limited_per_client() {
    common::init_test_config();
    let mut config = (*get_config()).clone();
    config.rate_limit.ingest.limit = 2;
    let (ctx, _dir) = context_with(&config).await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let body = json!({"page": "https://example.com/", "type": "pageview"});
    for _ in 0..2 {
        let resp = test::call_service(&app, track_request(body.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(&app, track_request(body.clone()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get(RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json, json!({"success": false, "error": "Rate limit exceeded"}));

    // 其他客户端不受影响
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/track")
            .insert_header(("x-forwarded-for", "198.51.100.99"))
            .set_json(body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn test_consent_acknowledgement() {
    let (ctx, _dir) = context().await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    for (action, expected) in [("grant", true), ("revoke", false)] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/consent")
                .set_json(json!({"action": action}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json: Value = test::read_body_json(resp).await;
        assert_eq!(json, json!({"success": true, "consent": expected}));
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/consent")
            .set_json(json!({"action": "maybe"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// 身份校验
// =============================================================================

#[actix_rt::test]
async fn test_events_requires_caller() {
    let (ctx, _dir) = context().await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/events").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json, json!({"error": "Unauthorized"}));

    // 其他密钥签发的 token 无效
    let foreign = JwtService::new("some-other-secret", 60);
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/events")
            .insert_header((AUTHORIZATION, bearer(&foreign, &["admin"])))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_events_rejects_bad_dates() {
    let (ctx, _dir) = context().await;
    let token = bearer(&ctx.jwt, &["viewer"]);
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/events?startDate=yesterday")
            .insert_header((AUTHORIZATION, token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_erasure_requires_admin_role() {
    let (ctx, _dir) = context().await;
    let viewer = bearer(&ctx.jwt, &["viewer"]);
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;
    let uri = format!("/api/users/{}/delete", fingerprint(CLIENT_ADDR, CLIENT_UA));

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&uri)
            .insert_header((AUTHORIZATION, viewer))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json, json!({"error": "Forbidden"}));
}

#[actix_rt::test]
async fn test_erasure_validates_fingerprint() {
    let (ctx, _dir) = context().await;
    let admin = bearer(&ctx.jwt, &["admin"]);
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/api/users/not-a-fingerprint/delete")
            .insert_header((AUTHORIZATION, admin))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// 端到端
// =============================================================================

#[actix_rt::test]
async fn test_track_aggregate_erase_flow() {
    let (ctx, _dir) = context().await;
    let viewer = bearer(&ctx.jwt, &["viewer"]);
    let admin = bearer(&ctx.jwt, &["admin"]);
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        track_request(json!({
            "page": "https://example.com/",
            "type": "pageview",
            "consentGiven": true
        }))
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let events = |token: String| {
        test::TestRequest::get()
            .uri("/api/events")
            .insert_header((AUTHORIZATION, token))
            .to_request()
    };

    let resp = test::call_service(&app, events(viewer.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let aggregate: Value = test::read_body_json(resp).await;
    assert_eq!(aggregate["totalViews"], 1);
    assert_eq!(aggregate["uniqueVisitors"], 1);
    assert_eq!(aggregate["pageStats"][0]["url"], "https://example.com/");

    let visitor_hash = aggregate["recentEvents"][0]["visitorHash"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(visitor_hash, fingerprint(CLIENT_ADDR, CLIENT_UA));
    // 原始地址不出现在任何响应中
    assert!(!aggregate.to_string().contains(CLIENT_ADDR));

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/users/{}/delete", visitor_hash))
            .insert_header((AUTHORIZATION, admin))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json, json!({"deleted": true, "count": 1}));

    let resp = test::call_service(&app, events(viewer)).await;
    let aggregate: Value = test::read_body_json(resp).await;
    assert_eq!(aggregate["totalViews"], 0);
    assert_eq!(aggregate["recentEvents"], json!([]));
}

// =============================================================================
// /api/chat
// =============================================================================

#[actix_rt::test]
async fn test_chat_requires_caller_and_answers() {
    let (ctx, _dir) = context().await;
    let token = bearer(&ctx.jwt, &["viewer"]);
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"question": "What is popular?"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat")
            .insert_header((AUTHORIZATION, token.clone()))
            .set_json(json!({"question": "What is popular?"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["answer"], "The pricing page is the busiest.");
    assert_eq!(json["usedVectorSearch"], false);
    assert_eq!(json["contextUsed"], 0);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat")
            .insert_header((AUTHORIZATION, token))
            .set_json(json!({"question": ""}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// /api/health
// =============================================================================

#[actix_rt::test]
async fn test_health_reports_database() {
    let (ctx, _dir) = context().await;
    let app = test::init_service(App::new().configure(configure_api(ctx))).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/health").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = test::read_body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db"], true);
    assert!(json["timestamp"].as_str().is_some());
}
