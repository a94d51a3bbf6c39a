//! CLI binary for markdown-to-pdf.
//!
//! `md2pdf serve` runs the HTTP service; `md2pdf convert` renders a local file
//! with the same pipeline.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use markdown_to_pdf::config::parse_flag;
use markdown_to_pdf::convert::write_atomic;
use markdown_to_pdf::{
    convert_file_to_file, server, Converter, RasterizerKind, RateLimit, ServiceConfig,
    StorageBackend,
};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r##"EXAMPLES:
  # Start the service on the default port (5000)
  md2pdf serve

  # Require an API key and tighten the conversion quota
  API_KEY=s3cret md2pdf serve --rate-limit-convert "5 per minute"

  # Convert a file offline
  md2pdf convert notes.md -o notes.pdf

  # Inspect the HTML the PDF is rendered from
  md2pdf convert notes.md -o notes.html --html

  # Call the running service
  curl -H 'X-API-Key: s3cret' -H 'Content-Type: application/json' \
       -d '{"markdown":"# Hello"}' http://localhost:5000/api/convert -o out.pdf

ENVIRONMENT VARIABLES:
  API_KEY                    Shared secret for /convert and /api/convert
  MD2PDF_HOST, MD2PDF_PORT   Bind address (0.0.0.0:5000)
  MD2PDF_MAX_CONTENT_LENGTH  Request body ceiling in bytes (16 MiB)
  RATELIMIT_ENABLED          true/false
  RATELIMIT_DEFAULT          e.g. "20 per minute"
  RATELIMIT_CONVERT          e.g. "10 per minute"
  RATELIMIT_HEALTH           e.g. "60 per minute"
  RATELIMIT_STORAGE_URI      memory://
  MD2PDF_RASTERIZER          builtin or weasyprint
  MD2PDF_WEASYPRINT_BIN      Path to the weasyprint executable
  MD2PDF_DEBUG               true/1/t for debug logging
"##;

/// Render Markdown to PDF, over HTTP or from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Render Markdown to PDF over HTTP or from the command line",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Convert a Markdown file to PDF.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Interface to bind.
    #[arg(long, env = "MD2PDF_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// TCP port.
    #[arg(short, long, env = "MD2PDF_PORT", default_value_t = 5000)]
    port: u16,

    /// Shared secret required on conversion routes. Unset disables auth.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Maximum request body in bytes.
    #[arg(long, env = "MD2PDF_MAX_CONTENT_LENGTH",
          default_value_t = markdown_to_pdf::config::DEFAULT_MAX_CONTENT_LENGTH)]
    max_content_length: usize,

    /// Enable per-IP rate limiting (true/false).
    #[arg(long, env = "RATELIMIT_ENABLED", default_value = "true",
          action = ArgAction::Set, value_parser = parse_bool)]
    rate_limit_enabled: bool,

    /// Quota for the index page and unclassified routes.
    #[arg(long, env = "RATELIMIT_DEFAULT", default_value = "20 per minute")]
    rate_limit_default: RateLimit,

    /// Quota for /convert and /api/convert.
    #[arg(long, env = "RATELIMIT_CONVERT", default_value = "10 per minute")]
    rate_limit_convert: RateLimit,

    /// Quota for /api/health.
    #[arg(long, env = "RATELIMIT_HEALTH", default_value = "60 per minute")]
    rate_limit_health: RateLimit,

    /// Rate-limit counter storage. Only memory:// is supported.
    #[arg(long, env = "RATELIMIT_STORAGE_URI", default_value = "memory://")]
    rate_limit_storage: StorageBackend,

    #[command(flatten)]
    render: RenderArgs,

    /// Debug logging and table diagnostics (true/1/t).
    #[arg(long, env = "MD2PDF_DEBUG", default_value = "false",
          action = ArgAction::Set, value_parser = parse_bool)]
    debug: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// PDF backend: builtin or weasyprint.
    #[arg(long, env = "MD2PDF_RASTERIZER", default_value = "builtin")]
    rasterizer: RasterizerKind,

    /// weasyprint executable used by the weasyprint backend.
    #[arg(long, env = "MD2PDF_WEASYPRINT_BIN", default_value = "weasyprint")]
    weasyprint_bin: PathBuf,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Markdown file to convert.
    input: PathBuf,

    /// Output path. Defaults to the input with a .pdf (or .html) extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the intermediate HTML document instead of the PDF.
    #[arg(long)]
    html: bool,

    #[command(flatten)]
    render: RenderArgs,
}

fn parse_bool(s: &str) -> Result<bool, std::convert::Infallible> {
    Ok(parse_flag(s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let debug_flag = matches!(&cli.command, Command::Serve(args) if args.debug);
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose || debug_flag {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => {
            let config = serve_config(args)?;
            server::serve(config).await.context("Server failed")?;
        }
        Command::Convert(args) => run_convert(args, cli.quiet).await?,
    }

    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn serve_config(args: ServeArgs) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .host(args.host)
        .port(args.port)
        .max_content_length(args.max_content_length)
        .rate_limit_enabled(args.rate_limit_enabled)
        .rate_limit_default(args.rate_limit_default)
        .rate_limit_convert(args.rate_limit_convert)
        .rate_limit_health(args.rate_limit_health)
        .rate_limit_storage(args.rate_limit_storage)
        .rasterizer(args.render.rasterizer)
        .weasyprint_bin(args.render.weasyprint_bin)
        .debug(args.debug);
    if let Some(key) = args.api_key {
        builder = builder.api_key(key);
    }
    builder.build().context("Invalid configuration")
}

async fn run_convert(args: ConvertArgs, quiet: bool) -> Result<()> {
    let config = ServiceConfig::builder()
        .rasterizer(args.render.rasterizer)
        .weasyprint_bin(args.render.weasyprint_bin)
        .build()
        .context("Invalid configuration")?;

    let extension = if args.html { "html" } else { "pdf" };
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension(extension));

    if args.html {
        let markdown = tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("Failed to read {}", args.input.display()))?;
        let document = Converter::from_config(&config)
            .html(&markdown)
            .context("Conversion failed")?;
        write_atomic(&output, document.html.as_bytes())
            .with_context(|| format!("Failed to write {}", output.display()))?;
        if !quiet {
            eprintln!(
                "Wrote {} ({} bytes, {} tables)",
                output.display(),
                document.html.len(),
                document.table_count()
            );
        }
        return Ok(());
    }

    let input = args.input.clone();
    let target = output.clone();
    let stats = tokio::task::spawn_blocking(move || convert_file_to_file(&input, &target, &config))
        .await
        .context("Conversion task panicked")?
        .context("Conversion failed")?;

    if !quiet {
        eprintln!(
            "Wrote {} ({} bytes, {} tables, {}ms)",
            output.display(),
            stats.output_bytes,
            stats.table_count,
            stats.render_duration_ms
        );
    }
    Ok(())
}
