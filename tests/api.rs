//! HTTP API tests driving the router in-process

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use quotaguard::api::{self, DeniedBody, ErrorBody};
use quotaguard::{
    EngineConfig, ErrorCode, ManualClock, MemoryStore, QuotaAccount, QuotaConfig, QuotaService,
    ResetPolicy, Resource, ResourceId, SubjectId, SubjectIdentity,
};

async fn app(config: QuotaConfig) -> Router {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 22, 0, 0).unwrap();
    let store = Arc::new(MemoryStore::new());

    for (name, verified) in [("alice", true), ("mallory", false)] {
        let id = SubjectId::parse(name).unwrap();
        let identity = if verified {
            SubjectIdentity::verified(id.clone())
        } else {
            SubjectIdentity::unverified(id.clone())
        };
        store
            .register_subject(identity, QuotaAccount::new(id, start, &ResetPolicy::utc()))
            .await
            .unwrap();
    }
    for n in 0..3 {
        let id = ResourceId::parse(format!("book-{}", n)).unwrap();
        let mut resource = Resource::new(id, format!("Book {}", n), "ebook", format!("loc-{}", n));
        resource.active = n != 2;
        store.register_resource(resource).await.unwrap();
    }

    let service = QuotaService::new(store, &config, EngineConfig::default())
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(start)));
    api::router(Arc::new(service))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, value)
}

fn consume(resource: &str) -> Option<Value> {
    Some(json!({ "resource_id": resource, "channel": "mobile" }))
}

#[tokio::test]
async fn test_consume_then_replay() {
    let app = app(QuotaConfig::default()).await;

    let (status, _, body) = send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-0")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["payload"]["location"], "loc-0");
    assert_eq!(body["record"]["channel"], "mobile");

    let (status, _, body) = send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "replayed");

    let (status, _, body) = send(&app, Method::GET, "/v1/subjects/alice/history?page=1&page_size=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["page_size"], 5);
}

#[tokio::test]
async fn test_denied_consumption_returns_429() {
    let config = QuotaConfig {
        daily_limit: 1,
        ..Default::default()
    };
    let app = app(config).await;

    send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-0")).await;
    let (status, headers, body) = send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-1")).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    // two hours until the next UTC midnight
    assert_eq!(headers[header::RETRY_AFTER], "7200");

    let denied: DeniedBody = serde_json::from_value(body).unwrap();
    assert_eq!(denied.error.code, ErrorCode::Ineligible);
    assert_eq!(denied.error.retry_after_secs, Some(7200));
    assert_eq!(denied.error.countdown.as_deref(), Some("2h 0m"));
    assert_eq!(denied.status.daily.remaining, 0);
    assert!(!denied.status.eligible);
}

#[tokio::test]
async fn test_quota_status() {
    let app = app(QuotaConfig::default()).await;

    let (status, _, body) = send(&app, Method::GET, "/v1/subjects/alice/quota", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eligible"], true);
    assert_eq!(body["daily"]["limit"], 15);
    assert_eq!(body["monthly"]["limit"], 350);
    assert_eq!(body["tier"]["tier"], "free");
}

#[tokio::test]
async fn test_error_statuses() {
    let app = app(QuotaConfig::default()).await;

    let (status, _, body) = send(&app, Method::GET, "/v1/subjects/ghost/quota", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorBody = serde_json::from_value(body).unwrap();
    assert_eq!(error.code, ErrorCode::NotFound);

    let (status, _, _) = send(&app, Method::GET, "/v1/subjects/mallory/quota", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = send(&app, Method::GET, "/v1/subjects/bad%20id/quota", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");

    let (status, _, _) = send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, Method::GET, "/v1/subjects/alice/history?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_endpoints() {
    let app = app(QuotaConfig::default()).await;
    send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-0")).await;
    send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-1")).await;

    let (status, _, body) = send(&app, Method::GET, "/v1/subjects/alice/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lifetime_count"], 2);
    assert_eq!(body["by_channel"]["mobile"], 2);

    let (status, _, body) = send(&app, Method::GET, "/v1/admin/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_subjects"], 2);
    assert_eq!(body["total_consumptions"], 2);
}

#[tokio::test]
async fn test_tier_sweep_endpoint() {
    let app = app(QuotaConfig::default()).await;
    let (status, _, body) = send(&app, Method::POST, "/v1/admin/tier-sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], json!([]));
    assert!(body["swept_at"].is_string());
}

#[tokio::test]
async fn test_health_and_metrics() {
    quotaguard::metrics::init().unwrap();
    let app = app(QuotaConfig::default()).await;

    let (status, _, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    send(&app, Method::POST, "/v1/subjects/alice/consumptions", consume("book-0")).await;

    let response = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("quota_consumptions_total"));
}
