//! Route handlers.

use super::AppState;
use crate::error::Md2PdfError;
use crate::server::response::{pdf_attachment, JsonError, PageError};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

/// Upload form served at `/`.
pub const INDEX_HTML: &str = include_str!("../../templates/index.html");

/// Name reported by the health check.
pub const SERVICE_NAME: &str = "markdown-to-pdf";

/// Version reported by the health check.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fields posted by the upload form.
#[derive(Debug, Default, Deserialize)]
pub struct ConvertForm {
    #[serde(default)]
    pub markdown_content: Option<String>,
    /// Read by the auth guard; ignored here.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// JSON body of `POST /api/convert`.
#[derive(Debug, Default, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub markdown: Option<String>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
}

fn rejection_error(status: StatusCode, reason: String, limit: usize) -> Md2PdfError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Md2PdfError::PayloadTooLarge { limit }
    } else {
        Md2PdfError::InvalidInput { reason }
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".into(),
        service: SERVICE_NAME.into(),
        version: SERVICE_VERSION.into(),
    })
}

/// `POST /convert`: form field `markdown_content` → PDF, plain-text errors.
pub async fn convert_form(
    State(state): State<AppState>,
    form: Result<Form<ConvertForm>, FormRejection>,
) -> Result<Response, PageError> {
    let Form(form) = form.map_err(|r| {
        rejection_error(r.status(), r.body_text(), state.config.max_content_length)
    })?;
    let markdown = form
        .markdown_content
        .filter(|m| !m.is_empty())
        .ok_or(Md2PdfError::EmptyInput)?;

    let output = state.converter.convert_async(markdown).await?;
    Ok(pdf_attachment(output.pdf))
}

/// `POST /api/convert`: `{"markdown": "..."}` → PDF, JSON errors.
pub async fn convert_json(
    State(state): State<AppState>,
    body: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Response, JsonError> {
    let Json(body) = body.map_err(|r| {
        rejection_error(r.status(), r.body_text(), state.config.max_content_length)
    })?;
    let markdown = body
        .markdown
        .filter(|m| !m.is_empty())
        .ok_or(Md2PdfError::EmptyInput)?;

    let output = state.converter.convert_async(markdown).await?;
    Ok(pdf_attachment(output.pdf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::PDF_FILENAME;
    use crate::server::response::PDF_DISPOSITION;

    #[test]
    fn index_has_form_fields() {
        assert!(INDEX_HTML.contains("name=\"markdown_content\""));
        assert!(INDEX_HTML.contains("name=\"api_key\""));
        assert!(INDEX_HTML.contains("action=\"/convert\""));
    }

    #[test]
    fn disposition_names_the_download() {
        assert!(PDF_DISPOSITION.contains(PDF_FILENAME));
    }

    #[test]
    fn rejection_maps_to_input_errors() {
        let e = rejection_error(StatusCode::PAYLOAD_TOO_LARGE, "too big".into(), 10);
        assert!(matches!(e, Md2PdfError::PayloadTooLarge { limit: 10 }));
        let e = rejection_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "no json".into(), 10);
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert!(e.to_string().contains("no json"));
    }

    #[tokio::test]
    async fn health_body() {
        let Json(status) = health().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.service, "markdown-to-pdf");
        assert_eq!(status.version, "1.0.0");
    }
}
