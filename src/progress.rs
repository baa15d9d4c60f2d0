//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as each source document goes through OCR. Files are processed
//! sequentially, in input order, so events never interleave.
//!
//! # Example
//!
//! ```rust
//! use ocr2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
//!         self.pages.fetch_add(pages, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} pages)", index + 1, total, name, pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each source file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` is 0-based, in input order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after validation, before the first OCR request.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is uploaded.
    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        let _ = (index, total_files, name);
    }

    /// Called when a file's OCR result has been received.
    fn on_file_complete(&self, index: usize, total_files: usize, name: &str, pages: usize) {
        let _ = (index, total_files, name, pages);
    }

    /// Called when a file fails. The batch is aborted right after.
    fn on_file_error(&self, index: usize, total_files: usize, name: &str, error: &str) {
        let _ = (index, total_files, name, error);
    }

    /// Called once after the combined document has been assembled.
    ///
    /// # Arguments
    /// * `total_pages`   : pages across all files
    /// * `markdown_chars`: length of the combined Markdown in characters
    fn on_batch_complete(&self, total_pages: usize, markdown_chars: usize) {
        let _ = (total_pages, markdown_chars);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
