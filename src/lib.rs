//! # ocr2md
//!
//! Turn scanned PDFs and images into one Markdown document using the Mistral
//! OCR service.
//!
//! The OCR service returns Markdown per page, with image placeholders such as
//! `![img-0.jpeg](img-0.jpeg)` and an opaque list of embedded images. This
//! crate stitches the pages of several files into one document: every figure
//! and table gets a global number (`図N`, `表N`) that runs across files, image
//! placeholders are replaced by the real image, and pages are separated by
//! horizontal rules.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files / URLs
//!  │
//!  ├─ 1. Input     resolve paths and URLs, validate type, size, PDF magic
//!  ├─ 2. OCR       upload → signed URL → /v1/ocr, one file at a time
//!  ├─ 3. Assemble  number figures and tables, join pages
//!  └─ 4. Output    Markdown (+ raw OCR JSON, + figure files)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from MISTRALAI_API_KEY
//!     let config = ConversionConfig::builder().include_page_headers(true).build()?;
//!     let output = convert(["report.pdf", "appendix.png"], &config).await?;
//!     println!("{}", output.markdown());
//!     eprintln!("{} pages, {} figures", output.stats.total_pages, output.stats.figures);
//!     Ok(())
//! }
//! ```
//!
//! The assembler needs no network and can be used on OCR results obtained
//! elsewhere; see [`combine`].
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the `POST /api/ocr` upload endpoint (axum) |
//!
//! Disable both when using only the library:
//! ```toml
//! ocr2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageMode};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_file};
pub use error::Ocr2MdError;
pub use model::{Dimensions, ImageRef, Page, SourceResult, UsageInfo};
pub use output::{CombinedDocument, ConversionOutput, ConversionStats, SourceStats};
pub use pipeline::assemble::{
    add_table_numbers, combine, combine_document, combine_with, suggest_filename,
    AssemblyOptions, FigureTableCounter, ImageSink, InlineImages,
};
pub use pipeline::images::FileImages;
pub use pipeline::input::{InputLimits, SourceDocument};
pub use pipeline::ocr::{MistralOcrClient, OcrProvider};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
