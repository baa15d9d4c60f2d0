//! Pipeline stages for OCR-to-Markdown conversion.
//!
//! Each submodule implements exactly one step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ assemble ◀── images
//! (path/URL) (HTTP)  (pure)      (inline or files)
//! ```
//!
//! 1. [`input`]   : resolve paths and URLs to in-memory documents, validate
//!    type, size and PDF magic
//! 2. [`ocr`]     : upload, signed URL, OCR call; the only stage with
//!    network I/O
//! 3. [`assemble`]: stitch per-page Markdown into one document, numbering
//!    figures and tables
//! 4. [`images`]  : optional figure extraction to `images/figure_NNN.*`

pub mod assemble;
pub mod images;
pub mod input;
pub mod ocr;
