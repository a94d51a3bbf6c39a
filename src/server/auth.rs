//! Shared-secret guard for the conversion routes.
//!
//! The key is looked up in this order, first match wins:
//!
//! 1. the `X-API-Key` header;
//! 2. the `api_key` field of a url-encoded form body;
//! 3. the `api_key` query parameter.
//!
//! Reading the form field means buffering the body here. It is handed back to
//! the handler unchanged, so the handler's own extractor still sees it.

use super::{client_ip, wants_json, AppState};
use crate::error::Md2PdfError;
use crate::server::response::error_response;
use axum::body::{to_bytes, Body};
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum::Form;
use serde::Deserialize;
use tracing::warn;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Default, Deserialize)]
struct ApiKeyParam {
    api_key: Option<String>,
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn header_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(API_KEY_HEADER)?.to_str().ok()?;
    non_empty(Some(value.to_string()))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Find the caller's key. Returns the request (body restored) and the key.
pub async fn extract_api_key(
    request: Request,
    body_limit: usize,
) -> Result<(Request, Option<String>), Md2PdfError> {
    if let Some(key) = header_key(request.headers()) {
        return Ok((request, Some(key)));
    }

    let request = if is_form(request.headers()) {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, body_limit)
            .await
            .map_err(|_| Md2PdfError::PayloadTooLarge { limit: body_limit })?;

        let form_request = Request::builder()
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(bytes.clone()))
            .map_err(|e| Md2PdfError::Internal(e.to_string()))?;
        let field = Form::<ApiKeyParam>::from_request(form_request, &())
            .await
            .map(|Form(p)| p.api_key)
            .unwrap_or_default();

        let request = Request::from_parts(parts, Body::from(bytes));
        if let Some(key) = non_empty(field) {
            return Ok((request, Some(key)));
        }
        request
    } else {
        request
    };

    let query = Query::<ApiKeyParam>::try_from_uri(request.uri())
        .map(|Query(p)| p.api_key)
        .unwrap_or_default();
    Ok((request, non_empty(query)))
}

/// Middleware rejecting conversion requests without the configured key.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.api_key.clone() else {
        return next.run(request).await;
    };

    let json = wants_json(&request);
    let client = client_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".into());
    let path = request.uri().path().to_string();

    let (request, supplied) = match extract_api_key(request, state.config.max_content_length).await {
        Ok(found) => found,
        Err(e) => return error_response(e, json),
    };

    match supplied {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => next.run(request).await,
        Some(_) => {
            warn!("Invalid API key from {} on {}", client, path);
            error_response(Md2PdfError::InvalidApiKey, json)
        }
        None => {
            warn!("Missing API key from {} on {}", client, path);
            error_response(Md2PdfError::MissingApiKey, json)
        }
    }
}
