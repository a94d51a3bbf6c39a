//! Response shapes shared by handlers and middleware.
//!
//! `/api/*` callers always get `{"error": "..."}` bodies ([`JsonError`]).
//! Browser-facing routes get either plain text (the `/convert` form endpoint)
//! or a small HTML page (auth and rate-limit rejections), see [`PageError`].

use crate::convert::PDF_MIME;
use crate::error::Md2PdfError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// `Content-Disposition` of every PDF download.
pub const PDF_DISPOSITION: &str = "attachment; filename=\"documento.pdf\"";

/// Wrap PDF bytes as a downloadable attachment.
pub fn pdf_attachment(pdf: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, PDF_MIME),
            (header::CONTENT_DISPOSITION, PDF_DISPOSITION),
        ],
        pdf,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct JsonError(pub Md2PdfError);

impl From<Md2PdfError> for JsonError {
    fn from(e: Md2PdfError) -> Self {
        JsonError(e)
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        with_retry_after(&self.0, (status, Json(body)).into_response())
    }
}

/// Error rendered for browsers.
#[derive(Debug)]
pub enum PageError {
    /// Plain-text body.
    Text(Md2PdfError),
    /// Minimal HTML page.
    Html(Md2PdfError),
}

impl From<Md2PdfError> for PageError {
    fn from(e: Md2PdfError) -> Self {
        PageError::Text(e)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Text(e) => {
                let response = (e.status_code(), e.to_string()).into_response();
                with_retry_after(&e, response)
            }
            PageError::Html(e) => {
                let status = e.status_code();
                let page = error_page(status, &e.to_string());
                with_retry_after(&e, (status, Html(page)).into_response())
            }
        }
    }
}

/// JSON for API callers, an HTML page for everyone else.
pub fn error_response(error: Md2PdfError, json: bool) -> Response {
    if json {
        JsonError(error).into_response()
    } else {
        PageError::Html(error).into_response()
    }
}

fn with_retry_after(error: &Md2PdfError, mut response: Response) -> Response {
    if let Md2PdfError::RateLimited {
        retry_after_secs, ..
    } = error
    {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }
    response
}

fn error_page(status: StatusCode, message: &str) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{code} {reason}</title>\n</head>\n<body>\n<h1>{code} {reason}</h1>\n<p>{}</p>\n<p><a href=\"/\">Back</a></p>\n</body>\n</html>\n",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
