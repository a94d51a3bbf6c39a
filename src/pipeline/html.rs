//! Markdown → HTML conversion and the fixed document shell.
//!
//! pulldown-cmark does the parsing. We enable exactly the GFM extensions the
//! service promises (tables, strikethrough, task lists; fenced code blocks are
//! core CommonMark) and leave everything else at library defaults.

use crate::pipeline::stylesheet::STYLESHEET;
use pulldown_cmark::{html, Event, Options, Parser, Tag};
use tracing::debug;

/// Title placed in the document shell and in the PDF metadata.
pub const DOCUMENT_TITLE: &str = "Documento PDF";

/// Characters of Markdown/HTML echoed to the debug log when no table is found.
const DEBUG_PREVIEW_CHARS: usize = 1000;

/// Parser options shared by the HTML converter and the built-in rasteriser.
pub fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// A complete HTML document ready for rasterisation.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    /// The converted fragment (what goes inside `<body>`).
    pub body: String,
    /// The full document: doctype, charset, title, embedded style sheet, body.
    pub html: String,
    /// The style sheet, for rasterisers that take CSS separately.
    pub stylesheet: &'static str,
    /// Number of data (body) rows in each table, in document order.
    pub table_rows: Vec<usize>,
}

impl HtmlDocument {
    /// Number of `<table>` elements in the document.
    pub fn table_count(&self) -> usize {
        self.table_rows.len()
    }
}

/// Convert a Markdown string into an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut html_output, parser);
    html_output
}

/// Convert Markdown and wrap the result in the document shell.
pub fn render_html(markdown: &str) -> HtmlDocument {
    let events: Vec<Event<'_>> = Parser::new_ext(markdown, markdown_options()).collect();
    let table_rows = count_table_rows(&events);

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, events.into_iter());

    if table_rows.is_empty() {
        debug!(
            "No tables found. Markdown preview: {:?} | HTML preview: {:?}",
            preview(markdown),
            preview(&body)
        );
    } else {
        debug!("Found {} table(s) in the HTML", table_rows.len());
    }

    HtmlDocument {
        html: wrap_document(&body),
        body,
        stylesheet: STYLESHEET,
        table_rows,
    }
}

/// Wrap an HTML fragment in the fixed document shell.
pub fn wrap_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{DOCUMENT_TITLE}</title>\n<style>\n{STYLESHEET}</style>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn count_table_rows(events: &[Event<'_>]) -> Vec<usize> {
    let mut tables = Vec::new();
    for event in events {
        match event {
            Event::Start(Tag::Table(_)) => tables.push(0),
            Event::Start(Tag::TableRow) => {
                if let Some(rows) = tables.last_mut() {
                    *rows += 1;
                }
            }
            _ => {}
        }
    }
    tables
}

fn preview(s: &str) -> &str {
    match s.char_indices().nth(DEBUG_PREVIEW_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
