//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the rasterisation backend can be swapped without
//! touching the text stages.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ html ──▶ render
//! (tables)      (GFM)    (builtin layout | weasyprint)
//! ```
//!
//! 1. [`normalize`]: insert the blank lines GFM needs before table blocks
//! 2. [`html`]: pulldown-cmark conversion wrapped in the document shell
//!    with the fixed [`stylesheet`]
//! 3. [`render`]: rasterise to PDF bytes; [`layout`] is the built-in
//!    engine behind the default backend

pub mod html;
pub mod layout;
pub mod normalize;
pub mod render;
pub mod stylesheet;
