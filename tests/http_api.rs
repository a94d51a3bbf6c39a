//! Router-level tests: every request goes through the full middleware stack
//! (body limit, rate limit, auth) via `tower::ServiceExt::oneshot`, without a
//! socket.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use markdown_to_pdf::{router, RateLimit, ServiceConfig};
use serde_json::Value;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const KEY: &str = "correct-horse-battery-staple";

fn open_app() -> Router {
    router(ServiceConfig::default())
}

fn keyed_app() -> Router {
    router(
        ServiceConfig::builder()
            .api_key(KEY)
            .rate_limit_enabled(false)
            .build()
            .unwrap(),
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_error(body: &Bytes) -> String {
    let value: Value = serde_json::from_slice(body).expect("error body is JSON");
    value["error"].as_str().expect("error field").to_string()
}

fn assert_pdf(status: StatusCode, headers: &HeaderMap, body: &Bytes) {
    assert_eq!(status, StatusCode::OK, "body: {}", String::from_utf8_lossy(body));
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"documento.pdf\""
    );
    let doc = lopdf::Document::load_mem(body).expect("response parses as PDF");
    assert!(!doc.get_pages().is_empty());
}

// ── Public routes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_is_fixed_json() {
    let (status, _, body) = send(&open_app(), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"status": "healthy", "service": "markdown-to-pdf", "version": "1.0.0"})
    );
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let (status, _, _) = send(&keyed_app(), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_index_serves_form_without_key() {
    let (status, headers, body) = send(&keyed_app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("markdown_content"));
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_convert_returns_pdf() {
    let (status, headers, body) = send(
        &open_app(),
        post_json("/api/convert", r##"{"markdown": "# Title\n\nHello"}"##),
    )
    .await;
    assert_pdf(status, &headers, &body);
}

#[tokio::test]
async fn test_form_convert_returns_pdf() {
    let (status, headers, body) = send(
        &open_app(),
        post_form("/convert", "markdown_content=%23+Title%0A%0AHello"),
    )
    .await;
    assert_pdf(status, &headers, &body);
}

#[tokio::test]
async fn test_table_under_text_converts() {
    let markdown = "Totals\\n| a | b |\\n|---|---|\\n| 1 | 2 |\\n| 3 | 4 |";
    let (status, headers, body) = send(
        &open_app(),
        post_json("/api/convert", &format!(r#"{{"markdown": "{markdown}"}}"#)),
    )
    .await;
    assert_pdf(status, &headers, &body);
}

#[tokio::test]
async fn test_empty_markdown_rejected_everywhere() {
    let app = open_app();

    let (status, _, body) = send(&app, post_json("/api/convert", r#"{"markdown": ""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_error(&body).contains("No Markdown"));

    let (status, _, body) = send(&app, post_json("/api/convert", "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_error(&body).contains("No Markdown"));

    let (status, headers, body) = send(&app, post_form("/convert", "markdown_content=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(String::from_utf8_lossy(&body).contains("No Markdown"));

    let (status, _, _) = send(&app, post_form("/convert", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_convert_rejects_bad_bodies() {
    let app = open_app();

    let (status, _, body) = send(&app, post_json("/api/convert", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json_error(&body).is_empty());

    let (status, _, body) = send(&app, post_json("/api/convert", r#"{"markdown": 42}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json_error(&body).is_empty());

    let wrong_type = Request::builder()
        .method("POST")
        .uri("/api/convert")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("# hi"))
        .unwrap();
    let (status, _, body) = send(&app, wrong_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json_error(&body).is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let app = router(
        ServiceConfig::builder()
            .max_content_length(128)
            .build()
            .unwrap(),
    );
    let big = format!(r#"{{"markdown": "{}"}}"#, "x".repeat(1024));

    let (status, _, body) = send(&app, post_json("/api/convert", &big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json_error(&body).contains("128"));

    let form = format!("markdown_content={}", "x".repeat(1024));
    let (status, _, _) = send(&app, post_form("/convert", &form)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_oversized_form_is_413_behind_auth() {
    let app = router(
        ServiceConfig::builder()
            .api_key(KEY)
            .max_content_length(128)
            .build()
            .unwrap(),
    );
    let form = format!("markdown_content={}&api_key={KEY}", "x".repeat(1024));
    let (status, _, _) = send(&app, post_form("/convert", &form)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_key_is_401() {
    let app = keyed_app();

    let (status, _, body) = send(&app, post_json("/api/convert", r#"{"markdown": "x"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json_error(&body).contains("API key required"));

    let (status, headers, body) = send(&app, post_form("/convert", "markdown_content=x")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("401"));
}

#[tokio::test]
async fn test_wrong_key_is_403() {
    let app = keyed_app();

    let mut request = post_json("/api/convert", r#"{"markdown": "x"}"#);
    request
        .headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_error(&body), "Invalid API key");

    let (status, _, _) = send(
        &app,
        post_form("/convert", "markdown_content=x&api_key=wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_correct_key_in_each_location() {
    let app = keyed_app();

    let mut by_header = post_json("/api/convert", r##"{"markdown": "# ok"}"##);
    by_header.headers_mut().insert("x-api-key", KEY.parse().unwrap());
    let (status, headers, body) = send(&app, by_header).await;
    assert_pdf(status, &headers, &body);

    let by_form = post_form("/convert", &format!("markdown_content=%23+ok&api_key={KEY}"));
    let (status, headers, body) = send(&app, by_form).await;
    assert_pdf(status, &headers, &body);

    let by_query = post_json(
        &format!("/api/convert?api_key={KEY}"),
        r##"{"markdown": "# ok"}"##,
    );
    let (status, headers, body) = send(&app, by_query).await;
    assert_pdf(status, &headers, &body);
}

#[tokio::test]
async fn test_repeated_invalid_attempts_do_not_break_service() {
    let app = keyed_app();
    for i in 0..25 {
        let mut request = post_json("/api/convert", r#"{"markdown": "x"}"#);
        request
            .headers_mut()
            .insert("x-api-key", format!("guess-{i}").parse().unwrap());
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let mut request = post_json("/api/convert", r#"{"markdown": "still up"}"#);
    request.headers_mut().insert("x-api-key", KEY.parse().unwrap());
    let (status, headers, body) = send(&app, request).await;
    assert_pdf(status, &headers, &body);
}

// ── Rate limiting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_quota_returns_429() {
    let app = router(
        ServiceConfig::builder()
            .rate_limit_convert(RateLimit::per_minute(2))
            .build()
            .unwrap(),
    );

    for _ in 0..2 {
        let (status, _, _) = send(&app, post_json("/api/convert", r#"{"markdown": "x"}"#)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, headers, body) =
        send(&app, post_json("/api/convert", r#"{"markdown": "x"}"#)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry), "Retry-After: {retry}");
    assert!(json_error(&body).contains("2 per minute"));

    // Form route shares the convert bucket and answers with a page.
    let (status, headers, _) = send(&app, post_form("/convert", "markdown_content=x")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    // Other classes are unaffected.
    let (status, _, _) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_applies_before_auth() {
    let app = router(
        ServiceConfig::builder()
            .api_key(KEY)
            .rate_limit_convert(RateLimit::per_minute(1))
            .build()
            .unwrap(),
    );
    let (status, _, _) = send(&app, post_json("/api/convert", r#"{"markdown": "x"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&app, post_json("/api/convert", r#"{"markdown": "x"}"#)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_disabled_rate_limit_never_429s() {
    let app = router(
        ServiceConfig::builder()
            .rate_limit_enabled(false)
            .rate_limit_health(RateLimit::per_minute(1))
            .build()
            .unwrap(),
    );
    for _ in 0..5 {
        let (status, _, _) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
