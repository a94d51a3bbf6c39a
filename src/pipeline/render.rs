//! PDF rasterisation: turn the HTML document into PDF bytes.
//!
//! Two backends implement [`Rasterizer`]:
//!
//! - [`BuiltinRasterizer`]: the pure-Rust layout engine in
//!   [`crate::pipeline::layout`], writing PDF with lopdf. No external
//!   processes, no fonts to install; the default.
//! - [`WeasyprintRasterizer`]: pipes the full HTML shell (with its embedded
//!   style sheet) to a `weasyprint` executable and reads the PDF from stdout.
//!   Use it when a real CSS engine is available on the host.
//!
//! Both are synchronous and CPU-bound; callers on an async runtime go through
//! `spawn_blocking` (see [`crate::convert::Converter::convert_async`]).

use crate::config::{RasterizerKind, ServiceConfig};
use crate::error::Md2PdfError;
use crate::pipeline::html::{HtmlDocument, DOCUMENT_TITLE};
use crate::pipeline::layout::layout_markdown;
use crate::pipeline::stylesheet::PageStyle;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::debug;

/// A backend that renders a document to PDF bytes.
pub trait Rasterizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Render the document. `markdown` is the normalised source the HTML was
    /// produced from, for backends that lay out the event stream directly.
    fn rasterize(&self, markdown: &str, document: &HtmlDocument) -> Result<Vec<u8>, Md2PdfError>;
}

/// Build the rasteriser selected in the configuration.
pub fn rasterizer_for(config: &ServiceConfig) -> Arc<dyn Rasterizer> {
    match config.rasterizer {
        RasterizerKind::Builtin => Arc::new(BuiltinRasterizer::default()),
        RasterizerKind::Weasyprint => Arc::new(WeasyprintRasterizer::new(config.weasyprint_bin.clone())),
    }
}

// ── Built-in ─────────────────────────────────────────────────────────────────

/// Pure-Rust rasteriser using the fixed page style.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRasterizer {
    style: PageStyle,
}

impl BuiltinRasterizer {
    pub fn with_style(style: PageStyle) -> Self {
        Self { style }
    }
}

impl Rasterizer for BuiltinRasterizer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn rasterize(&self, markdown: &str, _document: &HtmlDocument) -> Result<Vec<u8>, Md2PdfError> {
        let canvas = layout_markdown(markdown, &self.style);
        debug!("Laid out {} page(s)", canvas.page_count());
        canvas.finish(DOCUMENT_TITLE)
    }
}

// ── WeasyPrint ───────────────────────────────────────────────────────────────

/// Rasteriser delegating to an external `weasyprint` executable.
#[derive(Debug, Clone)]
pub struct WeasyprintRasterizer {
    bin: PathBuf,
}

impl WeasyprintRasterizer {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Rasterizer for WeasyprintRasterizer {
    fn name(&self) -> &'static str {
        "weasyprint"
    }

    fn rasterize(&self, _markdown: &str, document: &HtmlDocument) -> Result<Vec<u8>, Md2PdfError> {
        let mut child = Command::new(&self.bin)
            .args(["--encoding", "utf-8", "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Md2PdfError::render(format!("could not start '{}': {e}", self.bin.display()))
            })?;

        // Feed stdin from a second thread so a chatty child cannot deadlock us
        // on a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Md2PdfError::Internal("child stdin not captured".into()))?;
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(document.html.as_bytes()));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .map_err(|_| Md2PdfError::Internal("stdin writer panicked".into()))?;
            let output = output.map_err(Md2PdfError::render)?;
            // A child that exits early closes the pipe; report its stderr instead.
            if output.status.success() {
                written.map_err(Md2PdfError::render)?;
            }
            Ok::<_, Md2PdfError>(output)
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Md2PdfError::render(format!(
                "{} exited with {}: {}",
                self.bin.display(),
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(Md2PdfError::render(format!(
                "{} produced no output",
                self.bin.display()
            )));
        }
        Ok(output.stdout)
    }
}
