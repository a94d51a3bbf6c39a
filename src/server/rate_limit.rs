//! Per-client request quotas.
//!
//! Every request is charged to a bucket keyed by client IP and
//! [`RouteClass`]. Buckets are fixed windows: the first hit opens a window of
//! the configured period, hits are counted until the quota is spent, and the
//! window resets once its period has elapsed.
//!
//! ## Why a store trait?
//!
//! Counters only ever live in process today (`memory://`), but the limiter
//! talks to them through [`RateLimitStore`] so the accounting can be tested
//! with a fake clock and a shared backend can slot in later without touching
//! the middleware.

use super::{client_ip, wants_json, AppState};
use crate::config::{RateLimit, ServiceConfig, StorageBackend};
use crate::error::Md2PdfError;
use crate::server::response::error_response;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Windows are swept once the map grows past this many buckets, at most once
/// per shortest configured period.
const PRUNE_THRESHOLD: usize = 4096;

// ── Keys ─────────────────────────────────────────────────────────────────

/// Which quota a route draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Default,
    Convert,
    Health,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        match path {
            "/convert" | "/api/convert" => RouteClass::Convert,
            "/api/health" => RouteClass::Health,
            _ => RouteClass::Default,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            RouteClass::Default => "default",
            RouteClass::Convert => "convert",
            RouteClass::Health => "health",
        }
    }
}

/// Bucket identity. Requests without a socket address share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub client: Option<IpAddr>,
    pub class: RouteClass,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.client {
            Some(ip) => write!(f, "{}/{}", ip, self.class.as_str()),
            None => write!(f, "unknown/{}", self.class.as_str()),
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Outcome of charging one request to a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Backend holding rate-limit counters.
pub trait RateLimitStore: Send + Sync {
    /// Count one hit against `key` under `limit` at time `now`.
    fn hit(&self, key: &BucketKey, limit: &RateLimit, now: Instant) -> Decision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    period: Duration,
    count: u32,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.period
    }
}

/// In-process fixed-window counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Windows>,
}

#[derive(Debug, Default)]
struct Windows {
    map: HashMap<BucketKey, Window>,
    last_sweep: Option<Instant>,
    shortest_period: Option<Duration>,
}

impl Windows {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, w| !w.expired(now));
        self.last_sweep = Some(now);
        before - self.map.len()
    }

    /// Nothing can expire sooner than the shortest period, so sweeping more
    /// often than that only rescans live windows.
    fn sweep_due(&self, now: Instant) -> bool {
        if self.map.len() < PRUNE_THRESHOLD {
            return false;
        }
        match (self.last_sweep, self.shortest_period) {
            (Some(last), Some(period)) => now.saturating_duration_since(last) >= period,
            _ => true,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every window whose period has elapsed.
    pub fn prune(&self, now: Instant) {
        let dropped = self.inner.lock().sweep(now);
        debug!("Pruned {} expired rate-limit window(s)", dropped);
    }
}

impl RateLimitStore for MemoryStore {
    fn hit(&self, key: &BucketKey, limit: &RateLimit, now: Instant) -> Decision {
        let mut windows = self.inner.lock();
        windows.shortest_period = Some(match windows.shortest_period {
            Some(shortest) => shortest.min(limit.period),
            None => limit.period,
        });
        if windows.sweep_due(now) {
            let dropped = windows.sweep(now);
            debug!("Swept {} expired rate-limit window(s)", dropped);
        }

        let window = windows.map.entry(key.clone()).or_insert(Window {
            started: now,
            period: limit.period,
            count: 0,
        });
        if window.expired(now) {
            *window = Window {
                started: now,
                period: limit.period,
                count: 0,
            };
        }

        if window.count >= limit.requests {
            let elapsed = now.saturating_duration_since(window.started);
            return Decision::Limited {
                retry_after: window.period.saturating_sub(elapsed),
            };
        }
        window.count += 1;
        Decision::Allowed {
            remaining: limit.requests - window.count,
        }
    }
}

// ── Limiter ──────────────────────────────────────────────────────────────

/// Quotas per route class plus the store that counts against them.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    default: RateLimit,
    convert: RateLimit,
    health: RateLimit,
    store: Arc<dyn RateLimitStore>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("default", &self.default)
            .field("convert", &self.convert)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let store: Arc<dyn RateLimitStore> = match config.rate_limit_storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: &ServiceConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            default: config.rate_limit_default,
            convert: config.rate_limit_convert,
            health: config.rate_limit_health,
            store,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit_for(&self, class: RouteClass) -> &RateLimit {
        match class {
            RouteClass::Default => &self.default,
            RouteClass::Convert => &self.convert,
            RouteClass::Health => &self.health,
        }
    }

    /// Charge one request; `Err(RateLimited)` once the quota is spent.
    pub fn check(&self, key: &BucketKey, now: Instant) -> Result<u32, Md2PdfError> {
        let limit = self.limit_for(key.class);
        match self.store.hit(key, limit, now) {
            Decision::Allowed { remaining } => Ok(remaining),
            Decision::Limited { retry_after } => Err(Md2PdfError::RateLimited {
                limit: limit.to_string(),
                retry_after_secs: retry_after_secs(retry_after),
            }),
        }
    }
}

/// Round up to whole seconds, never below one.
fn retry_after_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

/// Middleware enforcing the per-IP quotas.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.limiter.enabled() {
        return next.run(request).await;
    }

    let key = BucketKey {
        client: client_ip(&request),
        class: RouteClass::classify(request.uri().path()),
    };
    match state.limiter.check(&key, Instant::now()) {
        Ok(_) => next.run(request).await,
        Err(e) => {
            warn!("Rate limit hit for {} on {}: {}", key, request.uri().path(), e);
            error_response(e, wants_json(&request))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(class: RouteClass) -> BucketKey {
        BucketKey {
            client: Some("10.0.0.1".parse().unwrap()),
            class,
        }
    }

    #[test]
    fn classify_routes() {
        assert_eq!(RouteClass::classify("/convert"), RouteClass::Convert);
        assert_eq!(RouteClass::classify("/api/convert"), RouteClass::Convert);
        assert_eq!(RouteClass::classify("/api/health"), RouteClass::Health);
        assert_eq!(RouteClass::classify("/"), RouteClass::Default);
        assert_eq!(RouteClass::classify("/favicon.ico"), RouteClass::Default);
    }

    #[test]
    fn window_allows_quota_then_limits() {
        let store = MemoryStore::new();
        let limit = RateLimit::per_minute(3);
        let now = Instant::now();
        let k = key(RouteClass::Convert);

        assert_eq!(store.hit(&k, &limit, now), Decision::Allowed { remaining: 2 });
        assert_eq!(store.hit(&k, &limit, now), Decision::Allowed { remaining: 1 });
        assert_eq!(store.hit(&k, &limit, now), Decision::Allowed { remaining: 0 });
        match store.hit(&k, &limit, now + Duration::from_secs(20)) {
            Decision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(40)),
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn window_resets_after_period() {
        let store = MemoryStore::new();
        let limit = RateLimit::per_minute(1);
        let now = Instant::now();
        let k = key(RouteClass::Default);

        assert!(matches!(store.hit(&k, &limit, now), Decision::Allowed { .. }));
        assert!(matches!(store.hit(&k, &limit, now), Decision::Limited { .. }));
        assert!(matches!(
            store.hit(&k, &limit, now + Duration::from_secs(60)),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn buckets_are_independent() {
        let store = MemoryStore::new();
        let limit = RateLimit::per_minute(1);
        let now = Instant::now();

        assert!(matches!(store.hit(&key(RouteClass::Convert), &limit, now), Decision::Allowed { .. }));
        assert!(matches!(store.hit(&key(RouteClass::Health), &limit, now), Decision::Allowed { .. }));
        let other = BucketKey {
            client: Some("10.0.0.2".parse().unwrap()),
            class: RouteClass::Convert,
        };
        assert!(matches!(store.hit(&other, &limit, now), Decision::Allowed { .. }));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn prune_drops_expired_windows() {
        let store = MemoryStore::new();
        let now = Instant::now();
        store.hit(&key(RouteClass::Health), &RateLimit::new(5, Duration::from_secs(1)), now);
        store.hit(&key(RouteClass::Convert), &RateLimit::per_minute(5), now);
        store.prune(now + Duration::from_secs(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn large_store_sweeps_once_per_period() {
        let store = MemoryStore::new();
        let limit = RateLimit::new(5, Duration::from_secs(1));
        let t0 = Instant::now();
        let fill = |from: u32, at: Instant| {
            for i in from..from + PRUNE_THRESHOLD as u32 {
                let k = BucketKey {
                    client: Some(IpAddr::from(std::net::Ipv4Addr::from(i))),
                    class: RouteClass::Convert,
                };
                store.hit(&k, &limit, at);
            }
        };

        fill(0, t0);
        assert_eq!(store.len(), PRUNE_THRESHOLD);

        // First hit past the threshold sweeps every expired window.
        let later = t0 + Duration::from_secs(2);
        store.hit(&key(RouteClass::Health), &limit, later);
        assert_eq!(store.len(), 1);

        // Refilled within the same period: no rescan, expired or not.
        fill(100_000, later);
        store.hit(&key(RouteClass::Default), &limit, later + Duration::from_millis(500));
        assert_eq!(store.len(), PRUNE_THRESHOLD + 2);

        // A full period after the last sweep it runs again.
        store.hit(&key(RouteClass::Convert), &limit, later + Duration::from_millis(1500));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn limiter_reports_limit_and_retry_after() {
        let config = ServiceConfig::builder()
            .rate_limit_convert(RateLimit::per_minute(1))
            .build()
            .unwrap();
        let limiter = RateLimiter::from_config(&config);
        let now = Instant::now();
        let k = key(RouteClass::Convert);

        assert_eq!(limiter.check(&k, now).unwrap(), 0);
        match limiter.check(&k, now + Duration::from_millis(500)).unwrap_err() {
            Md2PdfError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                assert_eq!(limit, "1 per minute");
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn unknown_client_display() {
        let k = BucketKey {
            client: None,
            class: RouteClass::Health,
        };
        assert_eq!(k.to_string(), "unknown/health");
    }
}
