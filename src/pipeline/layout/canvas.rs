//! Page canvas: drawing primitives recorded as PDF content operations, and the
//! final assembly of pages into a PDF file with lopdf.
//!
//! Callers work in a top-down coordinate system (y grows towards the bottom of
//! the page, like CSS). The flip to PDF's bottom-up space happens here.

use super::fonts::{encode_win_ansi, Font};
use crate::error::Md2PdfError;
use crate::pipeline::stylesheet::Rgb;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// Round to hundredths of a point to keep content streams compact.
fn real(v: f32) -> Object {
    ((v * 100.0).round() / 100.0).into()
}

fn colour_operands(c: Rgb) -> Vec<Object> {
    vec![real(c.0), real(c.1), real(c.2)]
}

/// Multi-page drawing surface.
#[derive(Debug)]
pub struct Canvas {
    width: f32,
    height: f32,
    pages: Vec<Vec<Operation>>,
}

impl Canvas {
    /// Create a canvas with one empty page.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            pages: vec![Vec::new()],
        }
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Recorded operations, one vector per page.
    pub fn pages(&self) -> &[Vec<Operation>] {
        &self.pages
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        // `new` always creates the first page
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn flip(&self, y: f32) -> f32 {
        self.height - y
    }

    /// Fill an axis-aligned rectangle whose top-left corner is `(x, y)`.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, colour: Rgb) {
        let bottom = self.flip(y + h);
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("rg", colour_operands(colour)));
        ops.push(Operation::new("re", vec![real(x), real(bottom), real(w), real(h)]));
        ops.push(Operation::new("f", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    /// Stroke the outline of a rectangle whose top-left corner is `(x, y)`.
    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, width: f32, colour: Rgb) {
        let bottom = self.flip(y + h);
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("RG", colour_operands(colour)));
        ops.push(Operation::new("w", vec![real(width)]));
        ops.push(Operation::new("re", vec![real(x), real(bottom), real(w), real(h)]));
        ops.push(Operation::new("S", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    /// Stroke a straight line.
    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width: f32, colour: Rgb) {
        let (fy1, fy2) = (self.flip(y1), self.flip(y2));
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new("RG", colour_operands(colour)));
        ops.push(Operation::new("w", vec![real(width)]));
        ops.push(Operation::new("m", vec![real(x1), real(fy1)]));
        ops.push(Operation::new("l", vec![real(x2), real(fy2)]));
        ops.push(Operation::new("S", vec![]));
        ops.push(Operation::new("Q", vec![]));
    }

    /// Draw `text` with its baseline at `(x, baseline)`.
    pub fn text(&mut self, x: f32, baseline: f32, font: Font, size: f32, colour: Rgb, text: &str) {
        let y = self.flip(baseline);
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font.resource_name().as_bytes().to_vec()), real(size)],
        ));
        ops.push(Operation::new("rg", colour_operands(colour)));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_win_ansi(text))],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    /// Assemble the recorded pages into PDF bytes.
    pub fn finish(self, title: &str) -> Result<Vec<u8>, Md2PdfError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in Font::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
        });

        let page_count = self.pages.len();
        let mut kids: Vec<Object> = Vec::with_capacity(page_count);
        for operations in self.pages {
            let content = Content { operations };
            let encoded = content.encode().map_err(Md2PdfError::render)?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), real(self.width), real(self.height)],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
            "Producer" => Object::string_literal(concat!("markdown-to-pdf ", env!("CARGO_PKG_VERSION"))),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(Md2PdfError::render)?;
        Ok(bytes)
    }
}
