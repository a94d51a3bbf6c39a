//! Configuration types for the markdown-to-pdf service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`] or read from the process environment with
//! [`ServiceConfig::from_env`]. The config is read-only after startup and is
//! shared between requests behind an `Arc`.

use crate::error::Md2PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default request body ceiling: 16 MiB.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use markdown_to_pdf::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .api_key("s3cret")
///     .port(8080)
///     .build()
///     .unwrap();
/// assert!(config.auth_enabled());
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Shared secret required on conversion endpoints. `None` disables auth.
    pub api_key: Option<String>,

    /// Interface to bind. Default: `0.0.0.0`.
    pub host: IpAddr,

    /// TCP port to bind. Default: 5000.
    pub port: u16,

    /// Maximum accepted request body in bytes. Default: 16 MiB.
    pub max_content_length: usize,

    /// Whether per-IP rate limiting is active. Default: true.
    pub rate_limit_enabled: bool,

    /// Quota for routes without a dedicated limit (the index page).
    pub rate_limit_default: RateLimit,

    /// Quota for `/convert` and `/api/convert`.
    pub rate_limit_convert: RateLimit,

    /// Quota for `/api/health`.
    pub rate_limit_health: RateLimit,

    /// Where rate-limit counters live.
    pub rate_limit_storage: StorageBackend,

    /// Which backend turns the HTML document into PDF bytes.
    pub rasterizer: RasterizerKind,

    /// Executable used by [`RasterizerKind::Weasyprint`].
    pub weasyprint_bin: PathBuf,

    /// Verbose diagnostics (table detection dumps, debug-level logs).
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            rate_limit_enabled: true,
            rate_limit_default: RateLimit::per_minute(20),
            rate_limit_convert: RateLimit::per_minute(10),
            rate_limit_health: RateLimit::per_minute(60),
            rate_limit_storage: StorageBackend::Memory,
            rasterizer: RasterizerKind::default(),
            weasyprint_bin: PathBuf::from("weasyprint"),
            debug: false,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_content_length", &self.max_content_length)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("rate_limit_default", &self.rate_limit_default)
            .field("rate_limit_convert", &self.rate_limit_convert)
            .field("rate_limit_health", &self.rate_limit_health)
            .field("rate_limit_storage", &self.rate_limit_storage)
            .field("rasterizer", &self.rasterizer)
            .field("weasyprint_bin", &self.weasyprint_bin)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; set-but-invalid ones are errors.
    pub fn from_env() -> Result<Self, Md2PdfError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Md2PdfError> {
        let mut builder = Self::builder();

        if let Some(key) = lookup("API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(host) = lookup("MD2PDF_HOST") {
            let host = host.parse().map_err(|_| {
                Md2PdfError::InvalidConfig(format!("MD2PDF_HOST is not an IP address: '{host}'"))
            })?;
            builder = builder.host(host);
        }
        if let Some(port) = lookup("MD2PDF_PORT") {
            let port = port.parse().map_err(|_| {
                Md2PdfError::InvalidConfig(format!("MD2PDF_PORT is not a port number: '{port}'"))
            })?;
            builder = builder.port(port);
        }
        if let Some(len) = lookup("MD2PDF_MAX_CONTENT_LENGTH") {
            let len = len.parse().map_err(|_| {
                Md2PdfError::InvalidConfig(format!(
                    "MD2PDF_MAX_CONTENT_LENGTH is not a byte count: '{len}'"
                ))
            })?;
            builder = builder.max_content_length(len);
        }
        if let Some(v) = lookup("RATELIMIT_ENABLED") {
            builder = builder.rate_limit_enabled(parse_flag(&v));
        }
        if let Some(v) = lookup("RATELIMIT_DEFAULT") {
            builder = builder.rate_limit_default(v.parse()?);
        }
        if let Some(v) = lookup("RATELIMIT_CONVERT") {
            builder = builder.rate_limit_convert(v.parse()?);
        }
        if let Some(v) = lookup("RATELIMIT_HEALTH") {
            builder = builder.rate_limit_health(v.parse()?);
        }
        if let Some(v) = lookup("RATELIMIT_STORAGE_URI") {
            builder = builder.rate_limit_storage(v.parse()?);
        }
        if let Some(v) = lookup("MD2PDF_RASTERIZER") {
            builder = builder.rasterizer(v.parse()?);
        }
        if let Some(v) = lookup("MD2PDF_WEASYPRINT_BIN") {
            builder = builder.weasyprint_bin(v);
        }
        if let Some(v) = lookup("MD2PDF_DEBUG") {
            builder = builder.debug(parse_flag(&v));
        }

        builder.build()
    }

    /// Socket address the server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// `true` when conversion endpoints require the shared secret.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Interpret a boolean-ish environment value (`true`, `1`, `t`, `yes`).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "yes" | "on"
    )
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Set the shared secret. An empty string disables auth.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_content_length(mut self, bytes: usize) -> Self {
        self.config.max_content_length = bytes;
        self
    }

    pub fn rate_limit_enabled(mut self, v: bool) -> Self {
        self.config.rate_limit_enabled = v;
        self
    }

    pub fn rate_limit_default(mut self, limit: RateLimit) -> Self {
        self.config.rate_limit_default = limit;
        self
    }

    pub fn rate_limit_convert(mut self, limit: RateLimit) -> Self {
        self.config.rate_limit_convert = limit;
        self
    }

    pub fn rate_limit_health(mut self, limit: RateLimit) -> Self {
        self.config.rate_limit_health = limit;
        self
    }

    pub fn rate_limit_storage(mut self, storage: StorageBackend) -> Self {
        self.config.rate_limit_storage = storage;
        self
    }

    pub fn rasterizer(mut self, kind: RasterizerKind) -> Self {
        self.config.rasterizer = kind;
        self
    }

    pub fn weasyprint_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.weasyprint_bin = bin.into();
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.config.debug = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Md2PdfError> {
        let c = &self.config;
        if c.max_content_length == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "max_content_length must be ≥ 1 byte".into(),
            ));
        }
        for (name, limit) in [
            ("default", &c.rate_limit_default),
            ("convert", &c.rate_limit_convert),
            ("health", &c.rate_limit_health),
        ] {
            if limit.requests == 0 {
                return Err(Md2PdfError::InvalidConfig(format!(
                    "{name} rate limit must allow at least one request"
                )));
            }
        }
        if c.rasterizer == RasterizerKind::Weasyprint && c.weasyprint_bin.as_os_str().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "weasyprint rasteriser selected but no executable configured".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Rate limits ──────────────────────────────────────────────────────────

/// A request quota: at most `requests` per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub period: Duration,
}

impl RateLimit {
    pub const fn new(requests: u32, period: Duration) -> Self {
        Self { requests, period }
    }

    pub const fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.period.as_secs() {
            1 => "second",
            60 => "minute",
            3600 => "hour",
            86_400 => "day",
            secs => return write!(f, "{} per {}s", self.requests, secs),
        };
        write!(f, "{} per {}", self.requests, unit)
    }
}

static RE_RATE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(?:per|/)\s*(second|minute|hour|day)s?\s*$").unwrap()
});

impl FromStr for RateLimit {
    type Err = Md2PdfError;

    /// Parse `"20 per minute"`, `"20/minute"`, `"100 per hour"` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RE_RATE_LIMIT.captures(s).ok_or_else(|| {
            Md2PdfError::InvalidConfig(format!(
                "invalid rate limit '{s}': expected e.g. '20 per minute' or '20/minute'"
            ))
        })?;
        let requests: u32 = caps[1]
            .parse()
            .map_err(|_| Md2PdfError::InvalidConfig(format!("rate limit count out of range: '{s}'")))?;
        let secs = match caps[2].to_ascii_lowercase().as_str() {
            "second" => 1,
            "minute" => 60,
            "hour" => 3600,
            _ => 86_400,
        };
        Ok(RateLimit::new(requests, Duration::from_secs(secs)))
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where the rate limiter keeps its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageBackend {
    /// In-process map; counters reset on restart. (default)
    #[default]
    Memory,
}

impl FromStr for StorageBackend {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "memory://" | "memory" => Ok(StorageBackend::Memory),
            other => Err(Md2PdfError::InvalidConfig(format!(
                "unsupported rate-limit storage '{other}': only memory:// is available"
            ))),
        }
    }
}

/// Backend that turns the HTML document into PDF bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterizerKind {
    /// Pure-Rust layout engine writing PDF with lopdf. (default)
    #[default]
    Builtin,
    /// External `weasyprint` executable fed the full HTML + CSS.
    Weasyprint,
}

impl FromStr for RasterizerKind {
    type Err = Md2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "native" => Ok(RasterizerKind::Builtin),
            "weasyprint" => Ok(RasterizerKind::Weasyprint),
            other => Err(Md2PdfError::InvalidConfig(format!(
                "unknown rasteriser '{other}': expected builtin or weasyprint"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_service_contract() {
        let c = ServiceConfig::default();
        assert_eq!(c.max_content_length, 16 * 1024 * 1024);
        assert_eq!(c.rate_limit_default, RateLimit::per_minute(20));
        assert_eq!(c.rate_limit_convert, RateLimit::per_minute(10));
        assert_eq!(c.rate_limit_health, RateLimit::per_minute(60));
        assert_eq!(c.port, 5000);
        assert!(!c.auth_enabled());
        assert!(!c.debug);
    }

    #[test]
    fn parse_rate_limit_forms() {
        assert_eq!("20 per minute".parse::<RateLimit>().unwrap(), RateLimit::per_minute(20));
        assert_eq!("20/minute".parse::<RateLimit>().unwrap(), RateLimit::per_minute(20));
        assert_eq!(
            "5 per Hours".parse::<RateLimit>().unwrap(),
            RateLimit::new(5, Duration::from_secs(3600))
        );
        assert!("twenty per minute".parse::<RateLimit>().is_err());
        assert!("20 per fortnight".parse::<RateLimit>().is_err());
    }

    #[test]
    fn rate_limit_display_roundtrips() {
        let limit = RateLimit::per_minute(10);
        assert_eq!(limit.to_string(), "10 per minute");
        assert_eq!(limit.to_string().parse::<RateLimit>().unwrap(), limit);
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let err = ServiceConfig::builder()
            .rate_limit_convert(RateLimit::per_minute(0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("convert"), "got: {err}");
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let c = ServiceConfig::builder().api_key("").build().unwrap();
        assert!(!c.auth_enabled());
    }

    #[test]
    fn from_lookup_reads_variables() {
        let env: HashMap<&str, &str> = [
            ("API_KEY", "topsecret"),
            ("MD2PDF_PORT", "8081"),
            ("RATELIMIT_CONVERT", "3/minute"),
            ("RATELIMIT_STORAGE_URI", "memory://"),
            ("MD2PDF_DEBUG", "True"),
        ]
        .into_iter()
        .collect();
        let c = ServiceConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.api_key.as_deref(), Some("topsecret"));
        assert_eq!(c.port, 8081);
        assert_eq!(c.rate_limit_convert, RateLimit::per_minute(3));
        assert!(c.debug);
    }

    #[test]
    fn from_lookup_rejects_unknown_storage() {
        let err = ServiceConfig::from_lookup(|k| {
            (k == "RATELIMIT_STORAGE_URI").then(|| "redis://localhost:6379".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("memory://"), "got: {err}");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let c = ServiceConfig::builder().api_key("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn parse_flag_accepts_common_truthy_values() {
        for v in ["true", "1", "t", "TRUE", "yes"] {
            assert!(parse_flag(v), "{v}");
        }
        for v in ["false", "0", "", "nope"] {
            assert!(!parse_flag(v), "{v}");
        }
    }
}
