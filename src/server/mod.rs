//! HTTP surface.
//!
//! ```text
//! request
//!  │
//!  ├─ TraceLayer        access log (tower-http)
//!  ├─ DefaultBodyLimit  max_content_length, 413 beyond it
//!  ├─ rate_limit        per-IP quotas, 429 + Retry-After
//!  ├─ auth              /convert and /api/convert only, 401 / 403
//!  └─ handler           conversion on the blocking pool
//! ```
//!
//! `GET /` and `GET /api/health` are never behind the key.

pub mod auth;
pub mod handlers;
pub mod rate_limit;
pub mod response;

use crate::config::ServiceConfig;
use crate::convert::Converter;
use crate::error::Md2PdfError;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request};
use axum::http::header;
use axum::routing::{get, post};
use axum::{middleware, Router};
use rate_limit::RateLimiter;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub converter: Converter,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            converter: Converter::from_config(&config),
            limiter: RateLimiter::from_config(&config),
            config: Arc::new(config),
        }
    }
}

/// Build the application router for `config`.
pub fn router(config: ServiceConfig) -> Router {
    router_with_state(AppState::new(config))
}

/// Build the router around prepared state (custom rasteriser or store).
pub fn router_with_state(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/convert", post(handlers::convert_form))
        .route("/api/convert", post(handlers::convert_json))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .merge(guarded)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ))
        .layer(DefaultBodyLimit::max(state.config.max_content_length))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Client address recorded by `into_make_service_with_connect_info`.
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// `true` when errors for this request should be JSON.
pub fn wants_json(request: &Request) -> bool {
    if request.uri().path().starts_with("/api/") {
        return true;
    }
    [header::ACCEPT, header::CONTENT_TYPE].iter().any(|name| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"))
    })
}

fn log_startup(config: &ServiceConfig, addr: SocketAddr) {
    info!("markdown-to-pdf listening on http://{}", addr);
    if config.auth_enabled() {
        info!("API key required on /convert and /api/convert");
    } else {
        warn!("API_KEY not set: conversion endpoints accept unauthenticated requests");
    }
    if config.rate_limit_enabled {
        info!(
            "Rate limits: default {}, convert {}, health {}",
            config.rate_limit_default, config.rate_limit_convert, config.rate_limit_health
        );
    } else {
        warn!("Rate limiting disabled");
    }
    info!(
        "Rasteriser: {:?}, body limit {} bytes",
        config.rasterizer, config.max_content_length
    );
}

/// Bind `config.bind_addr()` and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> Result<(), Md2PdfError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Md2PdfError::Bind { addr, source })?;
    serve_on(listener, config, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_on(
    listener: TcpListener,
    config: ServiceConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Md2PdfError> {
    let addr = listener
        .local_addr()
        .map_err(|e| Md2PdfError::Internal(format!("listener has no local address: {e}")))?;
    log_startup(&config, addr);

    let app = router(config);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| Md2PdfError::Internal(format!("server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
