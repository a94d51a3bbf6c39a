//! The fixed document style sheet.
//!
//! Every PDF the service produces uses the same look: A4 portrait, tight
//! margins, small body text, and dense tables that wrap instead of overflowing
//! the page. [`STYLESHEET`] is the CSS handed to HTML rasterisers;
//! [`PageStyle`] carries the same numbers as typed values for the built-in
//! layout engine, so both backends produce the same geometry.

/// Points per centimetre.
const PT_PER_CM: f32 = 72.0 / 2.54;

/// CSS pixels → points (96 px per inch, 72 pt per inch).
const PT_PER_PX: f32 = 0.75;

/// CSS applied to every rendered document.
pub const STYLESHEET: &str = r#"@page {
    margin: 1.2cm 0.8cm;
    size: A4 portrait;
}
body {
    font-family: 'Arial', 'Helvetica', sans-serif;
    line-height: 1.4;
    color: #222;
    font-size: 9pt;
}
h1, h2, h3, h4, h5, h6 {
    color: #2c3e50;
    margin-top: 0.6em;
    margin-bottom: 0.3em;
}
h1 {
    font-size: 16pt;
    border-bottom: 2px solid #2c3e50;
    padding-bottom: 0.2em;
}
h2 {
    font-size: 13pt;
    border-bottom: 1px solid #bdc3c7;
    padding-bottom: 0.2em;
}
h3 {
    font-size: 11pt;
}
code {
    background-color: #f4f4f4;
    padding: 2px 4px;
    border-radius: 2px;
    font-family: 'Courier New', monospace;
    font-size: 8pt;
}
pre {
    background-color: #f4f4f4;
    padding: 8px;
    border-radius: 3px;
    border-left: 3px solid #3498db;
    overflow: visible;
    white-space: pre-wrap;
    word-wrap: break-word;
    page-break-inside: avoid;
    margin: 0.5em 0;
}
pre code {
    background-color: transparent;
    padding: 0;
    font-size: 7pt;
    white-space: pre-wrap;
    word-break: break-word;
}
blockquote {
    border-left: 4px solid #3498db;
    padding-left: 15px;
    color: #555;
    font-style: italic;
    margin: 1em 0;
}
table {
    border-collapse: collapse;
    width: 100%;
    margin: 0.5em 0;
    page-break-inside: auto;
    font-size: 6.5pt;
    table-layout: fixed;
}
table th, table td {
    border: 1px solid #555;
    padding: 3px 4px;
    text-align: left;
    word-wrap: break-word;
    vertical-align: top;
    overflow-wrap: anywhere;
    line-height: 1.25;
    hyphens: auto;
}
table th {
    background-color: #2c7cbd;
    color: white;
    font-weight: bold;
    font-size: 6.5pt;
}
table tr:nth-child(even) {
    background-color: #f8f8f8;
}
table tr {
    page-break-inside: avoid;
}
table code {
    font-size: 6pt;
    word-break: break-word;
    white-space: normal;
}
a {
    color: #3498db;
    text-decoration: none;
}
a:hover {
    text-decoration: underline;
}
ul, ol {
    margin: 1em 0;
    padding-left: 2em;
}
li {
    margin: 0.5em 0;
}
img {
    max-width: 100%;
    height: auto;
}
"#;

/// An sRGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    /// Build from a `0xRRGGBB` literal.
    pub const fn hex(v: u32) -> Self {
        Rgb(
            ((v >> 16) & 0xff) as f32 / 255.0,
            ((v >> 8) & 0xff) as f32 / 255.0,
            (v & 0xff) as f32 / 255.0,
        )
    }
}

/// Layout values of [`STYLESHEET`] in PDF points.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStyle {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_vertical: f32,
    pub margin_horizontal: f32,

    pub body_size: f32,
    pub line_height: f32,
    pub text_color: Rgb,

    pub heading_color: Rgb,
    /// Font sizes for h1..h6.
    pub heading_sizes: [f32; 6],
    pub h1_rule: (f32, Rgb),
    pub h2_rule: (f32, Rgb),

    pub code_size: f32,
    pub code_block_size: f32,
    pub code_background: Rgb,
    pub code_block_padding: f32,
    pub code_block_bar: (f32, Rgb),

    pub quote_bar: (f32, Rgb),
    pub quote_padding: f32,
    pub quote_color: Rgb,

    pub table_size: f32,
    pub table_code_size: f32,
    pub table_line_height: f32,
    pub table_border: (f32, Rgb),
    pub cell_padding_vertical: f32,
    pub cell_padding_horizontal: f32,
    pub header_background: Rgb,
    pub header_color: Rgb,
    pub even_row_background: Rgb,

    pub link_color: Rgb,
    pub list_indent: f32,
    pub list_item_gap: f32,
}

impl Default for PageStyle {
    fn default() -> Self {
        let body = 9.0;
        let table = 6.5;
        Self {
            // A4 portrait
            page_width: 595.28,
            page_height: 841.89,
            margin_vertical: 1.2 * PT_PER_CM,
            margin_horizontal: 0.8 * PT_PER_CM,

            body_size: body,
            line_height: 1.4,
            text_color: Rgb::hex(0x222222),

            heading_color: Rgb::hex(0x2c3e50),
            heading_sizes: [16.0, 13.0, 11.0, 10.0, 9.0, 9.0],
            h1_rule: (2.0 * PT_PER_PX, Rgb::hex(0x2c3e50)),
            h2_rule: (1.0 * PT_PER_PX, Rgb::hex(0xbdc3c7)),

            code_size: 8.0,
            code_block_size: 7.0,
            code_background: Rgb::hex(0xf4f4f4),
            code_block_padding: 8.0 * PT_PER_PX,
            code_block_bar: (3.0 * PT_PER_PX, Rgb::hex(0x3498db)),

            quote_bar: (4.0 * PT_PER_PX, Rgb::hex(0x3498db)),
            quote_padding: 15.0 * PT_PER_PX,
            quote_color: Rgb::hex(0x555555),

            table_size: table,
            table_code_size: 6.0,
            table_line_height: 1.25,
            table_border: (1.0 * PT_PER_PX, Rgb::hex(0x555555)),
            cell_padding_vertical: 3.0 * PT_PER_PX,
            cell_padding_horizontal: 4.0 * PT_PER_PX,
            header_background: Rgb::hex(0x2c7cbd),
            header_color: Rgb::hex(0xffffff),
            even_row_background: Rgb::hex(0xf8f8f8),

            link_color: Rgb::hex(0x3498db),
            list_indent: 2.0 * body,
            list_item_gap: 0.5 * body,
        }
    }
}

impl PageStyle {
    /// Width available to content between the horizontal margins.
    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin_horizontal
    }

    /// Font size for a heading level (1-based; out-of-range levels clamp).
    pub fn heading_size(&self, level: usize) -> f32 {
        self.heading_sizes[level.clamp(1, 6) - 1]
    }

    /// Vertical space of one line of text at `size`.
    pub fn leading(&self, size: f32) -> f32 {
        size * self.line_height
    }
}
