//! Conversion entry points.
//!
//! [`Converter`] owns the configured rasteriser and runs the full pipeline for
//! one Markdown document: reject empty input, normalise tables, build the HTML
//! document, rasterise. It is cheap to clone and shared by every request.
//!
//! The free functions [`convert`] and [`convert_file_to_file`] are one-shot
//! wrappers for library and CLI use.

use crate::config::ServiceConfig;
use crate::error::Md2PdfError;
use crate::pipeline::html::{render_html, HtmlDocument};
use crate::pipeline::normalize::normalize_tables;
use crate::pipeline::render::{rasterizer_for, Rasterizer};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// MIME type of every successful conversion.
pub const PDF_MIME: &str = "application/pdf";

/// File name offered to clients downloading the PDF.
pub const PDF_FILENAME: &str = "documento.pdf";

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The rendered PDF.
    pub pdf: Vec<u8>,
    pub stats: ConversionStats,
}

/// Per-conversion statistics, logged and returned to library callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub table_count: usize,
    pub rasterizer: String,
    pub render_duration_ms: u64,
}

/// The configured conversion pipeline.
#[derive(Clone)]
pub struct Converter {
    rasterizer: Arc<dyn Rasterizer>,
}

/// Alias kept for callers that think of the pipeline as a renderer.
pub type Renderer = Converter;

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("rasterizer", &self.rasterizer.name())
            .finish()
    }
}

impl Converter {
    /// Build a converter with the rasteriser selected in `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::with_rasterizer(rasterizer_for(config))
    }

    /// Build a converter around an explicit rasteriser.
    pub fn with_rasterizer(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer }
    }

    /// Normalise and convert to the HTML document without rasterising.
    pub fn html(&self, markdown: &str) -> Result<HtmlDocument, Md2PdfError> {
        if markdown.is_empty() {
            return Err(Md2PdfError::EmptyInput);
        }
        Ok(render_html(&normalize_tables(markdown)))
    }

    /// Run the full pipeline. Blocking and CPU-bound.
    pub fn convert(&self, markdown: &str) -> Result<ConversionOutput, Md2PdfError> {
        if markdown.is_empty() {
            return Err(Md2PdfError::EmptyInput);
        }
        let start = Instant::now();

        let normalized = normalize_tables(markdown);
        if normalized.len() != markdown.len() {
            debug!(
                "Normalised table fences: {} → {} bytes",
                markdown.len(),
                normalized.len()
            );
        }
        let document = render_html(&normalized);

        let pdf = self
            .rasterizer
            .rasterize(&normalized, &document)
            .inspect_err(|e| error!("{} rasteriser failed: {}", self.rasterizer.name(), e))?;

        let stats = ConversionStats {
            input_bytes: markdown.len(),
            output_bytes: pdf.len(),
            table_count: document.table_count(),
            rasterizer: self.rasterizer.name().to_string(),
            render_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Converted {} bytes of Markdown → {} bytes of PDF ({} tables, {}, {}ms)",
            stats.input_bytes,
            stats.output_bytes,
            stats.table_count,
            stats.rasterizer,
            stats.render_duration_ms
        );

        Ok(ConversionOutput { pdf, stats })
    }

    /// Render to PDF bytes, dropping the statistics.
    pub fn render(&self, markdown: &str) -> Result<Vec<u8>, Md2PdfError> {
        self.convert(markdown).map(|out| out.pdf)
    }

    /// Run [`convert`](Self::convert) on the blocking thread pool.
    pub async fn convert_async(&self, markdown: String) -> Result<ConversionOutput, Md2PdfError> {
        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.convert(&markdown))
            .await
            .map_err(|e| Md2PdfError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Convert a Markdown string to PDF with the rasteriser chosen in `config`.
///
/// # Errors
/// - [`Md2PdfError::EmptyInput`] when `markdown` is empty;
/// - [`Md2PdfError::Render`] when HTML conversion or rasterisation fails.
pub fn convert(markdown: &str, config: &ServiceConfig) -> Result<ConversionOutput, Md2PdfError> {
    Converter::from_config(config).convert(markdown)
}

/// Convert a Markdown file and write the PDF next to it.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub fn convert_file_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ServiceConfig,
) -> Result<ConversionStats, Md2PdfError> {
    let input_path = input_path.as_ref();
    let markdown = std::fs::read_to_string(input_path).map_err(|e| Md2PdfError::Io {
        path: input_path.to_path_buf(),
        source: e,
    })?;
    let output = convert(&markdown, config)?;
    write_atomic(output_path.as_ref(), &output.pdf)?;
    Ok(output.stats)
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Md2PdfError> {
    let io_err = |source| Md2PdfError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
