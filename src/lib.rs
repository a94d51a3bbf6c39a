//! # markdown-to-pdf
//!
//! Convert Markdown text to PDF documents, as a library or as a small HTTP
//! service.
//!
//! ## Why this crate?
//!
//! Markdown written by people (and by LLMs) often puts a table directly under
//! a paragraph line. CommonMark then reads the pipes as paragraph text and the
//! table is lost. This crate repairs that before parsing, renders the result
//! with one fixed A4 style sheet, and hands back PDF bytes. Nothing is stored;
//! every request stands alone.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Normalise  blank line before tables glued to a paragraph
//!  ├─ 2. HTML       pulldown-cmark (tables, strikethrough, task lists)
//!  ├─ 3. Shell      <!DOCTYPE html> + fixed style sheet
//!  ├─ 4. Rasterise  builtin (lopdf) or weasyprint (CPU-bound, spawn_blocking)
//!  └─ 5. Output     PDF bytes + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use markdown_to_pdf::{convert, ServiceConfig};
//!
//! let config = ServiceConfig::default();
//! let output = convert("# Report\n\nTotals:\n| a | b |\n|---|---|\n| 1 | 2 |", &config)?;
//! assert!(output.pdf.starts_with(b"%PDF"));
//! assert_eq!(output.stats.table_count, 1);
//! # Ok::<(), markdown_to_pdf::Md2PdfError>(())
//! ```
//!
//! Serving over HTTP:
//!
//! ```rust,no_run
//! use markdown_to_pdf::{server, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::from_env()?;
//!     server::serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding only the library or the router:
//! ```toml
//! markdown-to-pdf = { version = "1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RasterizerKind, RateLimit, ServiceConfig, ServiceConfigBuilder, StorageBackend};
pub use convert::{convert, convert_file_to_file, ConversionOutput, ConversionStats, Converter, Renderer};
pub use error::Md2PdfError;
pub use pipeline::html::{markdown_to_html, render_html, HtmlDocument};
pub use pipeline::normalize::normalize_tables;
pub use pipeline::render::{BuiltinRasterizer, Rasterizer, WeasyprintRasterizer};
pub use server::{router, serve};
