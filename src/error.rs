//! Error types for the markdown-to-pdf library.
//!
//! A single [`Md2PdfError`] covers every failure a conversion request can hit.
//! The variants are grouped by who can fix them:
//!
//! * **Input**: the caller sent nothing, sent the wrong shape, or sent too
//!   much. Always user-correctable (4xx).
//! * **Render**: pulldown-cmark, the layout engine, or the external
//!   rasteriser failed. Reported with the underlying message (500), never
//!   retried.
//! * **Auth / rate limit**: produced by the HTTP guards, never by the core
//!   pipeline.
//!
//! Nothing here is fatal to the process: every request fails on its own and
//! the service keeps accepting the next one.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the markdown-to-pdf library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The Markdown field was missing or empty.
    #[error("No Markdown content provided")]
    EmptyInput,

    /// The request body had the wrong shape (bad JSON, wrong content type…).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The request body exceeded the configured size ceiling.
    #[error("Request body exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Markdown conversion or PDF rasterisation failed.
    #[error("Failed to generate the PDF: {message}")]
    Render { message: String },

    // ── Auth errors ───────────────────────────────────────────────────────
    /// No API key was supplied in the header, form or query string.
    #[error("API key required. Send it in the X-API-Key header, the api_key form field or the api_key query parameter.")]
    MissingApiKey,

    /// An API key was supplied but it does not match.
    #[error("Invalid API key")]
    InvalidApiKey,

    // ── Rate limiting ─────────────────────────────────────────────────────
    /// The client exhausted its quota for the current window.
    #[error("Rate limit exceeded: {limit}. Retry in {retry_after_secs}s.")]
    RateLimited {
        limit: String,
        retry_after_secs: u64,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading the Markdown source or writing the PDF failed (offline mode).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a panicked blocking task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// Shorthand for wrapping any displayable failure as a render error.
    pub fn render(message: impl ToString) -> Self {
        Md2PdfError::Render {
            message: message.to_string(),
        }
    }

    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Md2PdfError::EmptyInput | Md2PdfError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Md2PdfError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Md2PdfError::MissingApiKey => StatusCode::UNAUTHORIZED,
            Md2PdfError::InvalidApiKey => StatusCode::FORBIDDEN,
            Md2PdfError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Md2PdfError::Render { .. }
            | Md2PdfError::InvalidConfig(_)
            | Md2PdfError::Io { .. }
            | Md2PdfError::Bind { .. }
            | Md2PdfError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `true` when the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}
