//! Built-in layout engine: Markdown events → positioned text and boxes.
//!
//! This is the pure-Rust rasteriser. It walks the same pulldown-cmark event
//! stream that produces the HTML document and lays it out with the geometry of
//! [`PageStyle`], so its output follows the fixed style sheet without needing
//! a browser engine:
//!
//! - block flow with collapsing vertical margins and automatic page breaks;
//! - greedy word wrapping, with overlong words broken anywhere;
//! - tables with fixed equal-width columns, wrapped cells, a shaded header row
//!   repeated after page breaks, alternating row shading, and rows kept whole
//!   unless a single row is taller than the page;
//! - code blocks on a shaded band with a left bar; block quotes with a left
//!   bar in italic grey; bullet, ordered and task lists;
//! - raw HTML reduced to its text, with `<br>` and block-level tags as line
//!   breaks.

mod canvas;
mod fonts;

pub use canvas::Canvas;
pub use fonts::{encode_win_ansi, Font};

use crate::pipeline::html::markdown_options;
use crate::pipeline::stylesheet::{PageStyle, Rgb};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Parser, Tag};
use regex::{Captures, Regex};
use std::mem;
use std::ops::Range;

/// Baseline position below the top of a line box, as a fraction of font size.
const ASCENT: f32 = 0.8;

/// Lay out a Markdown document onto A4 pages.
pub fn layout_markdown(markdown: &str, style: &PageStyle) -> Canvas {
    let mut engine = Engine::new(style);
    for event in Parser::new_ext(markdown, markdown_options()) {
        engine.event(event);
    }
    engine.finish()
}

// ── Inline model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InlineStyle {
    bold: bool,
    italic: bool,
    code: bool,
    strike: bool,
    link: bool,
}

#[derive(Debug, Clone)]
struct Span {
    text: String,
    style: InlineStyle,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word {
        text: String,
        style: InlineStyle,
        space_before: bool,
    },
    Break,
}

#[derive(Debug, Clone)]
struct LineItem {
    x: f32,
    width: f32,
    text: String,
    style: InlineStyle,
}

#[derive(Debug, Clone, Default)]
struct Line {
    items: Vec<LineItem>,
}

/// Typography of one run of flowed text.
#[derive(Debug, Clone, Copy)]
struct TextBlock {
    size: f32,
    leading: f32,
    code_size: f32,
    colour: Rgb,
    bold: bool,
    shade_code: bool,
}

impl TextBlock {
    fn font(&self, style: InlineStyle) -> Font {
        Font::select(self.bold || style.bold, style.italic, style.code)
    }

    fn size_for(&self, style: InlineStyle) -> f32 {
        if style.code {
            self.code_size
        } else {
            self.size
        }
    }

    fn baseline(&self, top: f32) -> f32 {
        top + (self.leading - self.size) / 2.0 + self.size * ASCENT
    }
}

/// Split spans into words, remembering which words were preceded by
/// whitespace and where hard breaks fall.
fn tokenize(spans: &[Span]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pending_space = false;

    for span in spans {
        let mut word = String::new();
        let mut word_space = false;
        let flush = |word: &mut String, space: bool, tokens: &mut Vec<Token>| {
            if !word.is_empty() {
                tokens.push(Token::Word {
                    text: mem::take(word),
                    style: span.style,
                    space_before: space,
                });
            }
        };

        for ch in span.text.chars() {
            if ch == '\n' {
                flush(&mut word, word_space, &mut tokens);
                tokens.push(Token::Break);
                pending_space = false;
            } else if ch.is_whitespace() {
                flush(&mut word, word_space, &mut tokens);
                pending_space = true;
            } else {
                if word.is_empty() {
                    word_space = pending_space && !matches!(tokens.last(), None | Some(Token::Break));
                    pending_space = false;
                }
                word.push(ch);
            }
        }
        flush(&mut word, word_space, &mut tokens);
    }

    tokens
}

/// Greedy line filling. Words wider than `max_width` are split by character.
fn wrap(tokens: &[Token], max_width: f32, block: &TextBlock) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut line = Line::default();
    let mut x = 0.0_f32;

    for token in tokens {
        let (text, style, space_before) = match token {
            Token::Break => {
                lines.push(mem::take(&mut line));
                x = 0.0;
                continue;
            }
            Token::Word {
                text,
                style,
                space_before,
            } => (text, *style, *space_before),
        };

        let font = block.font(style);
        let size = block.size_for(style);
        let space = if space_before && !line.items.is_empty() {
            font.text_width(" ", size)
        } else {
            0.0
        };
        let width = font.text_width(text, size);

        if x + space + width <= max_width {
            place(&mut line, x, space, text, width, style);
            x += space + width;
            continue;
        }

        if width <= max_width {
            lines.push(mem::take(&mut line));
            place(&mut line, 0.0, 0.0, text, width, style);
            x = width;
            continue;
        }

        // overflow-wrap: anywhere
        if !line.items.is_empty() {
            lines.push(mem::take(&mut line));
        }
        let mut chunk = String::new();
        let mut chunk_width = 0.0_f32;
        for ch in text.chars() {
            let w = font.glyph_width(ch) as f32 * size / 1000.0;
            if chunk_width + w > max_width && !chunk.is_empty() {
                place(&mut line, 0.0, 0.0, &chunk, chunk_width, style);
                lines.push(mem::take(&mut line));
                chunk.clear();
                chunk_width = 0.0;
            }
            chunk.push(ch);
            chunk_width += w;
        }
        place(&mut line, 0.0, 0.0, &chunk, chunk_width, style);
        x = chunk_width;
    }

    if !line.items.is_empty() {
        lines.push(line);
    }
    lines
}

/// Append a word to a line, merging it into the previous item when the style
/// matches so each run becomes a single text operation.
fn place(line: &mut Line, x: f32, space: f32, text: &str, width: f32, style: InlineStyle) {
    if let Some(last) = line.items.last_mut() {
        if last.style == style && (last.x + last.width - x).abs() < 0.01 {
            if space > 0.0 {
                last.text.push(' ');
            }
            last.text.push_str(text);
            last.width += space + width;
            return;
        }
    }
    line.items.push(LineItem {
        x: x + space,
        width,
        text: text.to_string(),
        style,
    });
}

// ── Raw HTML ─────────────────────────────────────────────────────────────────

static RE_HTML_SKIPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<[!?][^>]*>")
        .unwrap()
});

static RE_HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?\s*([a-z][a-z0-9]*)\b[^>]*>").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre",
    "section", "table", "tr", "ul",
];

/// Reduce an HTML fragment to the text a reader would see. Source newlines
/// collapse to spaces; `<br>` and block-level tags become `'\n'`.
fn html_text(fragment: &str) -> String {
    let flat = fragment.replace(['\r', '\n'], " ");
    let visible = RE_HTML_SKIPPED.replace_all(&flat, "");
    let text = RE_HTML_TAG.replace_all(&visible, |caps: &Captures<'_>| {
        let name = caps[1].to_ascii_lowercase();
        if name == "br" || BLOCK_TAGS.contains(&name.as_str()) {
            "\n"
        } else {
            ""
        }
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// ── Block model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Paragraph,
    Heading(usize),
    BlockQuote,
    CodeBlock,
    HtmlBlock,
    List,
    Item,
    Table,
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link,
    Image,
    Other,
}

#[derive(Debug, Default)]
struct TableRow {
    header: bool,
    cells: Vec<Vec<Span>>,
}

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<TableRow>,
    current_row: Vec<Vec<Span>>,
    current_cell: Vec<Span>,
}

struct Engine<'s> {
    style: &'s PageStyle,
    canvas: Canvas,
    stack: Vec<Container>,

    y: f32,
    pending_gap: f32,
    at_page_top: bool,
    indent: f32,
    quote_bars: Vec<f32>,

    bold: usize,
    italic: usize,
    strike: usize,
    link: usize,

    pending: Vec<Span>,
    code_block: Option<String>,
    html_block: Option<String>,
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    table: Option<TableState>,
}

impl<'s> Engine<'s> {
    fn new(style: &'s PageStyle) -> Self {
        Self {
            style,
            canvas: Canvas::new(style.page_width, style.page_height),
            stack: Vec::new(),
            y: style.margin_vertical,
            pending_gap: 0.0,
            at_page_top: true,
            indent: 0.0,
            quote_bars: Vec::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            link: 0,
            pending: Vec::new(),
            code_block: None,
            html_block: None,
            lists: Vec::new(),
            item_marker: None,
            table: None,
        }
    }

    fn finish(mut self) -> Canvas {
        self.flush_paragraph();
        self.canvas
    }

    // ── Geometry ─────────────────────────────────────────────────────────

    fn left(&self) -> f32 {
        self.style.margin_horizontal + self.indent
    }

    fn width(&self) -> f32 {
        (self.style.content_width() - self.indent).max(self.style.body_size * 4.0)
    }

    fn bottom(&self) -> f32 {
        self.style.page_height - self.style.margin_vertical
    }

    fn em(&self) -> f32 {
        self.style.body_size
    }

    /// Request vertical space before the next block (margins collapse).
    fn gap(&mut self, h: f32) {
        self.pending_gap = self.pending_gap.max(h);
    }

    fn new_page(&mut self) {
        self.canvas.new_page();
        self.y = self.style.margin_vertical;
        self.at_page_top = true;
    }

    /// Break the page unless `h` more points fit.
    fn ensure(&mut self, h: f32) {
        if self.y + h > self.bottom() && !self.at_page_top {
            self.new_page();
        }
    }

    /// Apply the pending margin, then make room for the first `h` points.
    fn begin_block(&mut self, h: f32) {
        if !self.at_page_top {
            self.y += self.pending_gap;
        }
        self.pending_gap = 0.0;
        self.ensure(h);
    }

    fn draw_quote_bars(&mut self, top: f32, h: f32) {
        let (width, colour) = self.style.quote_bar;
        for i in 0..self.quote_bars.len() {
            let x = self.quote_bars[i];
            self.canvas.fill_rect(x, top, width, h, colour);
        }
    }

    fn advance(&mut self, h: f32) {
        self.y += h;
        self.at_page_top = false;
    }

    // ── Events ───────────────────────────────────────────────────────────

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.end(),
            Event::Text(text) => match self.code_block.as_mut() {
                Some(code) => code.push_str(&text),
                None => self.push_text(&text, self.inline_style()),
            },
            Event::Code(text) => {
                let style = InlineStyle {
                    code: true,
                    ..self.inline_style()
                };
                self.push_text(&text, style);
            }
            Event::SoftBreak => self.push_text(" ", self.inline_style()),
            Event::HardBreak => self.push_text("\n", self.inline_style()),
            Event::Html(html) => match self.html_block.as_mut() {
                Some(block) => block.push_str(&html),
                None => self.push_text(&html_text(&html), self.inline_style()),
            },
            Event::InlineHtml(html) => {
                let text = html_text(&html);
                if !text.is_empty() {
                    self.push_text(&text, self.inline_style());
                }
            }
            Event::Rule => {
                self.flush_paragraph();
                self.rule();
            }
            Event::TaskListMarker(checked) => {
                self.item_marker = Some(if checked { "[x]" } else { "[ ]" }.to_string());
            }
            _ => {}
        }
    }

    fn inline_style(&self) -> InlineStyle {
        InlineStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code: false,
            strike: self.strike > 0,
            link: self.link > 0,
        }
    }

    fn push_text(&mut self, text: &str, style: InlineStyle) {
        let sink = match self.table.as_mut() {
            Some(table) => &mut table.current_cell,
            None => &mut self.pending,
        };
        match sink.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => sink.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let container = match tag {
            Tag::Paragraph => {
                self.flush_paragraph();
                Container::Paragraph
            }
            Tag::Heading { level, .. } => {
                self.flush_paragraph();
                let level = level as usize;
                self.gap(0.6 * self.style.heading_size(level));
                Container::Heading(level)
            }
            Tag::BlockQuote(_) => {
                self.flush_paragraph();
                self.gap(self.em());
                let x = self.left();
                self.quote_bars.push(x);
                self.indent += self.style.quote_bar.0 + self.style.quote_padding;
                self.italic += 1;
                Container::BlockQuote
            }
            Tag::CodeBlock(_) => {
                self.flush_paragraph();
                self.code_block = Some(String::new());
                Container::CodeBlock
            }
            Tag::HtmlBlock => {
                self.flush_paragraph();
                self.html_block = Some(String::new());
                Container::HtmlBlock
            }
            Tag::List(start) => {
                self.flush_paragraph();
                if self.lists.is_empty() {
                    self.gap(self.em());
                }
                self.lists.push(start);
                self.indent += self.style.list_indent;
                Container::List
            }
            Tag::Item => {
                self.flush_paragraph();
                self.gap(self.style.list_item_gap);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}.");
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                self.item_marker = Some(marker);
                Container::Item
            }
            Tag::Table(_) => {
                self.flush_paragraph();
                self.table = Some(TableState::default());
                Container::Table
            }
            Tag::TableHead => Container::TableHead,
            Tag::TableRow => Container::TableRow,
            Tag::TableCell => Container::TableCell,
            Tag::Emphasis => {
                self.italic += 1;
                Container::Emphasis
            }
            Tag::Strong => {
                self.bold += 1;
                Container::Strong
            }
            Tag::Strikethrough => {
                self.strike += 1;
                Container::Strikethrough
            }
            Tag::Link { .. } => {
                self.link += 1;
                Container::Link
            }
            Tag::Image { .. } => {
                self.italic += 1;
                self.push_text("[", self.inline_style());
                Container::Image
            }
            _ => Container::Other,
        };
        self.stack.push(container);
    }

    fn end(&mut self) {
        let Some(container) = self.stack.pop() else {
            return;
        };
        match container {
            Container::Paragraph => {
                self.flush_paragraph();
                self.gap(self.em());
            }
            Container::Heading(level) => self.flush_heading(level),
            Container::BlockQuote => {
                self.flush_paragraph();
                self.quote_bars.pop();
                self.indent -= self.style.quote_bar.0 + self.style.quote_padding;
                self.italic = self.italic.saturating_sub(1);
                self.gap(self.em());
            }
            Container::CodeBlock => {
                let code = self.code_block.take().unwrap_or_default();
                self.draw_code_block(&code);
            }
            Container::HtmlBlock => {
                let html = self.html_block.take().unwrap_or_default();
                let text = html_text(&html);
                let lines: Vec<&str> = text
                    .split('\n')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect();
                if !lines.is_empty() {
                    self.push_text(&lines.join("\n"), self.inline_style());
                    self.flush_paragraph();
                    self.gap(self.em());
                }
            }
            Container::List => {
                self.flush_paragraph();
                self.lists.pop();
                self.indent -= self.style.list_indent;
                if self.lists.is_empty() {
                    self.gap(self.em());
                }
            }
            Container::Item => {
                self.flush_paragraph();
                self.item_marker = None;
                self.gap(self.style.list_item_gap);
            }
            Container::Table => {
                if let Some(table) = self.table.take() {
                    self.draw_table(table);
                }
                self.gap(0.5 * self.em());
            }
            Container::TableHead | Container::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let cells = mem::take(&mut table.current_row);
                    table.rows.push(TableRow {
                        header: container == Container::TableHead,
                        cells,
                    });
                }
            }
            Container::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = mem::take(&mut table.current_cell);
                    table.current_row.push(cell);
                }
            }
            Container::Emphasis => self.italic = self.italic.saturating_sub(1),
            Container::Strong => self.bold = self.bold.saturating_sub(1),
            Container::Strikethrough => self.strike = self.strike.saturating_sub(1),
            Container::Link => self.link = self.link.saturating_sub(1),
            Container::Image => {
                self.push_text("]", self.inline_style());
                self.italic = self.italic.saturating_sub(1);
            }
            Container::Other => {}
        }
    }

    // ── Text flow ────────────────────────────────────────────────────────

    fn body_block(&self) -> TextBlock {
        let s = self.style;
        TextBlock {
            size: s.body_size,
            leading: s.leading(s.body_size),
            code_size: s.code_size,
            colour: if self.quote_bars.is_empty() {
                s.text_color
            } else {
                s.quote_color
            },
            bold: false,
            shade_code: true,
        }
    }

    fn flush_paragraph(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let spans = mem::take(&mut self.pending);
        let block = self.body_block();
        self.flow(&spans, block);
    }

    fn flush_heading(&mut self, level: usize) {
        let s = self.style;
        let size = s.heading_size(level);
        let spans = mem::take(&mut self.pending);
        let block = TextBlock {
            size,
            leading: s.leading(size),
            code_size: size * s.code_size / s.body_size,
            colour: s.heading_color,
            bold: true,
            shade_code: true,
        };
        self.flow(&spans, block);

        let rule = match level {
            1 => Some(s.h1_rule),
            2 => Some(s.h2_rule),
            _ => None,
        };
        if let Some((width, colour)) = rule {
            self.advance(0.2 * size);
            let (x, w, y) = (self.left(), self.width(), self.y + width / 2.0);
            self.canvas.line(x, y, x + w, y, width, colour);
            self.advance(width);
        }
        self.gap(0.3 * size);
    }

    fn flow(&mut self, spans: &[Span], block: TextBlock) {
        let tokens = tokenize(spans);
        let lines = wrap(&tokens, self.width(), &block);

        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                self.begin_block(block.leading);
            } else {
                self.ensure(block.leading);
            }
            let top = self.y;
            let baseline = block.baseline(top);
            self.draw_quote_bars(top, block.leading);

            self.draw_marker(baseline, block.size);

            let left = self.left();
            for item in &line.items {
                self.draw_item(left, baseline, item, &block);
            }
            self.advance(block.leading);
        }
    }

    /// Draw the pending list marker in the gutter left of the current indent.
    /// Whatever block opens the item draws it on its first line.
    fn draw_marker(&mut self, baseline: f32, size: f32) {
        if let Some(marker) = self.item_marker.take() {
            let font = Font::Regular;
            let w = font.text_width(&marker, size);
            let x = self.left() - w - 0.4 * size;
            self.canvas
                .text(x, baseline, font, size, self.style.text_color, &marker);
        }
    }

    fn draw_item(&mut self, left: f32, baseline: f32, item: &LineItem, block: &TextBlock) {
        let font = block.font(item.style);
        let size = block.size_for(item.style);
        let x = left + item.x;

        if item.style.code && block.shade_code {
            self.canvas.fill_rect(
                x - 1.5,
                baseline - size * ASCENT - 1.0,
                item.width + 3.0,
                size + 2.0,
                self.style.code_background,
            );
        }

        let colour = if item.style.link {
            self.style.link_color
        } else {
            block.colour
        };
        self.canvas.text(x, baseline, font, size, colour, &item.text);

        if item.style.strike {
            let y = baseline - size * 0.3;
            self.canvas
                .line(x, y, x + item.width, y, (size * 0.06).max(0.4), colour);
        }
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn rule(&mut self) {
        self.gap(0.5 * self.em());
        self.begin_block(1.0);
        let (x, w, y) = (self.left(), self.width(), self.y);
        self.canvas.line(x, y, x + w, y, 0.75, self.style.h2_rule.1);
        self.advance(1.0);
        self.gap(0.5 * self.em());
    }

    fn draw_code_block(&mut self, code: &str) {
        let s = self.style;
        let size = s.code_block_size;
        let leading = s.leading(size);
        let pad = s.code_block_padding;
        let (bar_width, bar_colour) = s.code_block_bar;

        let max_width = self.width() - bar_width - 2.0 * pad;
        let char_width = Font::Mono.glyph_width('m') as f32 * size / 1000.0;
        let max_chars = ((max_width / char_width).floor() as usize).max(1);

        // pre-wrap: keep every source line, break long ones
        let mut lines: Vec<String> = Vec::new();
        for source_line in code.trim_end_matches('\n').split('\n') {
            let expanded = source_line.replace('\t', "    ");
            let chars: Vec<char> = expanded.chars().collect();
            if chars.is_empty() {
                lines.push(String::new());
            }
            for chunk in chars.chunks(max_chars) {
                lines.push(chunk.iter().collect());
            }
        }

        let total = lines.len() as f32 * leading + 2.0 * pad;
        let page_body = s.page_height - 2.0 * s.margin_vertical;

        self.gap(0.5 * self.em());
        // page-break-inside: avoid, when the block fits on one page at all
        self.begin_block(if total <= page_body { total } else { leading + pad });

        let x = self.left();
        let width = self.width();
        let text_x = x + bar_width + pad;
        let block = TextBlock {
            size,
            leading,
            code_size: size,
            colour: s.text_color,
            bold: false,
            shade_code: false,
        };

        let band = |engine: &mut Self, h: f32| {
            let top = engine.y;
            engine.canvas.fill_rect(x, top, width, h, s.code_background);
            engine.canvas.fill_rect(x, top, bar_width, h, bar_colour);
            engine.draw_quote_bars(top, h);
            top
        };

        band(self, pad);
        self.advance(pad);
        for line in &lines {
            self.ensure(leading);
            let top = band(self, leading);
            self.draw_marker(block.baseline(top), s.body_size);
            if !line.is_empty() {
                self.canvas
                    .text(text_x, block.baseline(top), Font::Mono, size, block.colour, line);
            }
            self.advance(leading);
        }
        self.ensure(pad);
        band(self, pad);
        self.advance(pad);

        self.gap(0.5 * self.em());
    }

    fn draw_table(&mut self, table: TableState) {
        let columns = table.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        if columns == 0 {
            return;
        }

        let s = self.style;
        let x0 = self.left();
        let col_width = self.width() / columns as f32;
        let cell_width = (col_width - 2.0 * s.cell_padding_horizontal).max(1.0);
        let leading = s.table_size * s.table_line_height;
        let block_for = |header: bool| TextBlock {
            size: s.table_size,
            leading,
            code_size: s.table_code_size,
            colour: if header { s.header_color } else { s.text_color },
            bold: header,
            shade_code: !header,
        };

        // Wrap every cell up front so row heights are known before drawing.
        let laid_out: Vec<(bool, Vec<Vec<Line>>, f32)> = table
            .rows
            .iter()
            .map(|row| {
                let block = block_for(row.header);
                let cells: Vec<Vec<Line>> = row
                    .cells
                    .iter()
                    .map(|spans| wrap(&tokenize(spans), cell_width, &block))
                    .collect();
                let lines = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
                let height = lines as f32 * leading + 2.0 * s.cell_padding_vertical;
                (row.header, cells, height)
            })
            .collect();

        let page_body = self.bottom() - s.margin_vertical;
        let pad = s.cell_padding_vertical;
        // A header too tall for half a page is not worth repeating.
        let header = laid_out
            .iter()
            .find(|(is_header, ..)| *is_header)
            .filter(|(_, _, height)| *height <= page_body / 2.0);
        let first_height = laid_out.first().map(|(_, _, h)| *h).unwrap_or(0.0);

        self.gap(0.5 * self.em());
        self.begin_block(first_height.min(page_body));
        if let Some((is_header, ..)) = laid_out.first() {
            let top = self.y + pad;
            self.draw_marker(block_for(*is_header).baseline(top), s.body_size);
        }

        let mut body_index = 0usize;
        for (is_header, cells, _) in &laid_out {
            let background = if *is_header {
                Some(s.header_background)
            } else {
                body_index += 1;
                (body_index % 2 == 0).then_some(s.even_row_background)
            };
            let block = block_for(*is_header);
            let line_count = cells.iter().map(Vec::len).max().unwrap_or(0);

            // Rows stay whole when they fit a page. Taller rows continue on
            // the next page, under a repeated header.
            let mut first = 0usize;
            loop {
                let remaining = line_count.saturating_sub(first).max(1) as f32 * leading + 2.0 * pad;
                if self.y + remaining > self.bottom() && !self.at_page_top {
                    self.new_page();
                    if let (false, Some((_, header_cells, _))) = (*is_header, header) {
                        let all = 0..header_cells.iter().map(Vec::len).max().unwrap_or(0);
                        self.draw_row(x0, col_width, columns, header_cells, all, block_for(true), Some(s.header_background));
                    }
                }

                let last = if self.y + remaining <= self.bottom() {
                    line_count
                } else {
                    let room = self.bottom() - self.y - 2.0 * pad;
                    let fit = ((room / leading).floor() as usize).max(1);
                    (first + fit).min(line_count)
                };
                self.draw_row(x0, col_width, columns, cells, first..last, block, background);
                if last >= line_count {
                    break;
                }
                first = last;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_row(
        &mut self,
        x0: f32,
        col_width: f32,
        columns: usize,
        cells: &[Vec<Line>],
        lines: Range<usize>,
        block: TextBlock,
        background: Option<Rgb>,
    ) {
        let s = self.style;
        let height = lines.len().max(1) as f32 * block.leading + 2.0 * s.cell_padding_vertical;
        let top = self.y;
        self.draw_quote_bars(top, height);

        for col in 0..columns {
            let x = x0 + col as f32 * col_width;
            if let Some(colour) = background {
                self.canvas.fill_rect(x, top, col_width, height, colour);
            }
            if let Some(cell) = cells.get(col) {
                let visible = cell.iter().enumerate().skip(lines.start).take(lines.len());
                for (i, line) in visible {
                    let line_top =
                        top + s.cell_padding_vertical + (i - lines.start) as f32 * block.leading;
                    let baseline = block.baseline(line_top);
                    for item in &line.items {
                        self.draw_item(x + s.cell_padding_horizontal, baseline, item, &block);
                    }
                }
            }
            let (border_width, border_colour) = s.table_border;
            self.canvas
                .stroke_rect(x, top, col_width, height, border_width, border_colour);
        }
        self.advance(height);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Object;

    fn texts(canvas: &Canvas) -> Vec<String> {
        canvas
            .pages()
            .iter()
            .flatten()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    fn body() -> TextBlock {
        let s = PageStyle::default();
        TextBlock {
            size: s.body_size,
            leading: s.leading(s.body_size),
            code_size: s.code_size,
            colour: s.text_color,
            bold: false,
            shade_code: true,
        }
    }

    fn span(text: &str) -> Span {
        Span {
            text: text.into(),
            style: InlineStyle::default(),
        }
    }

    #[test]
    fn minimal_document_on_one_page() {
        let canvas = layout_markdown("# Title\n\nHello", &PageStyle::default());
        assert_eq!(canvas.page_count(), 1);
        let t = texts(&canvas);
        assert!(t.contains(&"Title".to_string()), "got: {t:?}");
        assert!(t.contains(&"Hello".to_string()), "got: {t:?}");
    }

    #[test]
    fn long_document_breaks_pages() {
        let md = (0..300)
            .map(|i| format!("Paragraph number {i} with a little text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let canvas = layout_markdown(&md, &PageStyle::default());
        assert!(canvas.page_count() > 1, "pages: {}", canvas.page_count());
    }

    #[test]
    fn tokenize_tracks_spaces_across_spans() {
        let spans = vec![
            span("hello "),
            Span {
                text: "bold".into(),
                style: InlineStyle {
                    bold: true,
                    ..InlineStyle::default()
                },
            },
            span("er\nnext"),
        ];
        let tokens = tokenize(&spans);
        let words: Vec<(String, bool)> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Word {
                    text, space_before, ..
                } => Some((text.clone(), *space_before)),
                Token::Break => None,
            })
            .collect();
        assert_eq!(
            words,
            vec![
                ("hello".to_string(), false),
                ("bold".to_string(), true),
                ("er".to_string(), false),
                ("next".to_string(), false),
            ]
        );
        assert!(tokens.contains(&Token::Break));
    }

    #[test]
    fn wrap_respects_width() {
        let text = "lorem ipsum dolor sit amet ".repeat(20);
        let block = body();
        let lines = wrap(&tokenize(&[span(&text)]), 120.0, &block);
        assert!(lines.len() > 5);
        for line in &lines {
            let last = line.items.last().unwrap();
            assert!(last.x + last.width <= 120.0 + 0.01);
        }
    }

    #[test]
    fn overlong_word_is_broken_anywhere() {
        let word = "x".repeat(200);
        let lines = wrap(&tokenize(&[span(&word)]), 50.0, &body());
        assert!(lines.len() > 1);
        let joined: String = lines
            .iter()
            .flat_map(|l| l.items.iter().map(|i| i.text.as_str()))
            .collect();
        assert_eq!(joined, word);
    }

    #[test]
    fn same_style_words_merge_into_one_run() {
        let lines = wrap(&tokenize(&[span("one two three")]), 500.0, &body());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].items.len(), 1);
        assert_eq!(lines[0].items[0].text, "one two three");
    }

    #[test]
    fn table_cells_and_header_are_drawn() {
        let md = "|name|qty|\n|-|-|\n|apple|1|\n|pear|2|";
        let canvas = layout_markdown(md, &PageStyle::default());
        let t = texts(&canvas);
        for cell in ["name", "qty", "apple", "1", "pear", "2"] {
            assert!(t.contains(&cell.to_string()), "missing {cell}: {t:?}");
        }
        let borders = canvas.pages()[0].iter().filter(|op| op.operator == "S").count();
        assert!(borders >= 6, "expected a border per cell, got {borders}");
    }

    #[test]
    fn long_table_repeats_header_after_page_break() {
        let mut md = String::from("|Header A|Header B|\n|---|---|\n");
        for i in 0..400 {
            md.push_str(&format!("|row {i}|value {i}|\n"));
        }
        let canvas = layout_markdown(&md, &PageStyle::default());
        assert!(canvas.page_count() > 1);
        let headers = texts(&canvas).iter().filter(|t| *t == "Header A").count();
        assert_eq!(headers, canvas.page_count());
    }

    #[test]
    fn code_block_keeps_lines() {
        let canvas = layout_markdown("```\nline one\n\nline two\n```", &PageStyle::default());
        let t = texts(&canvas);
        assert!(t.contains(&"line one".to_string()), "got: {t:?}");
        assert!(t.contains(&"line two".to_string()), "got: {t:?}");
    }

    #[test]
    fn list_markers() {
        let canvas = layout_markdown("1. first\n2. second\n\n- [x] done\n- [ ] todo", &PageStyle::default());
        let t = texts(&canvas);
        for marker in ["1.", "2.", "[x]", "[ ]"] {
            assert!(t.contains(&marker.to_string()), "missing {marker}: {t:?}");
        }
    }

    #[test]
    fn image_renders_alt_text() {
        let canvas = layout_markdown("![a chart](chart.png)", &PageStyle::default());
        let t = texts(&canvas).join("");
        assert!(t.contains("[a chart]"), "got: {t}");
    }

    #[test]
    fn block_quote_draws_bar() {
        let canvas = layout_markdown("> quoted words", &PageStyle::default());
        let fills = canvas.pages()[0].iter().filter(|op| op.operator == "f").count();
        assert!(fills >= 1);
        assert!(texts(&canvas).contains(&"quoted words".to_string()));
    }

    #[test]
    fn raw_html_keeps_its_text() {
        let md = "Before\n\n<div>Hello raw html block</div>\n\nline one<br>line two";
        let t = texts(&layout_markdown(md, &PageStyle::default()));
        for run in ["Before", "Hello raw html block", "line one", "line two"] {
            assert!(t.contains(&run.to_string()), "missing {run}: {t:?}");
        }
    }

    #[test]
    fn html_text_drops_markup() {
        assert_eq!(
            html_text("<p class=\"x\">a &amp; b</p><!-- note --><span>c</span>"),
            "\na & b\nc"
        );
        assert_eq!(html_text("<style>p { color: red }</style>"), "");
        assert_eq!(html_text("<BR/>"), "\n");
    }

    #[test]
    fn row_taller_than_page_continues_on_next_page() {
        let style = PageStyle::default();
        let md = format!("|h|\n|-|\n|{}|", "word ".repeat(6000));
        let canvas = layout_markdown(&md, &style);
        assert!(canvas.page_count() > 1, "pages: {}", canvas.page_count());

        let words: usize = texts(&canvas).iter().map(|t| t.matches("word").count()).sum();
        assert_eq!(words, 6000);

        for op in canvas.pages().iter().flatten().filter(|op| op.operator == "Td") {
            let y = op.operands[1].as_float().unwrap();
            assert!(y >= style.margin_vertical - 0.01, "text below the bottom margin: {y}");
        }
    }

    #[test]
    fn item_marker_drawn_before_code_block() {
        let canvas = layout_markdown("1. ```\n   code\n   ```", &PageStyle::default());
        let t = texts(&canvas);
        assert_eq!(t.first().map(String::as_str), Some("1."), "got: {t:?}");
        assert!(t.contains(&"code".to_string()), "got: {t:?}");
    }

    #[test]
    fn item_marker_drawn_before_table() {
        let canvas = layout_markdown("3. | a |\n   |---|\n   | 1 |\n\nafter", &PageStyle::default());
        let t = texts(&canvas);
        assert_eq!(t.iter().filter(|s| *s == "3.").count(), 1, "got: {t:?}");
        assert_eq!(t.first().map(String::as_str), Some("3."), "got: {t:?}");
        let borders = canvas.pages()[0].iter().filter(|op| op.operator == "S").count();
        assert!(borders >= 2, "expected table borders, got {borders}");
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let canvas = layout_markdown("", &PageStyle::default());
        assert_eq!(canvas.page_count(), 1);
        assert!(texts(&canvas).is_empty());
    }
}
