//! Error types for the ocr2md library.
//!
//! A single fatal error type, [`Ocr2MdError`], covers every layer around the
//! document assembler. The assembler itself never fails on well-typed input:
//! a placeholder that does not match, or a page without tables, simply passes
//! through unchanged.
//!
//! Conversion is all-or-nothing. The first file that fails aborts the batch
//! and its error is returned as-is; there is no partial document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr2md library.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No input files were supplied.
    #[error("No files were supplied.\nPass at least one PDF or image file.")]
    NoInputs,

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file extension is not one the OCR service accepts.
    #[error("Unsupported file type: '{name}' (supported: PDF, PNG, JPG, JPEG, AVIF)")]
    UnsupportedFileType { name: String },

    /// The file is larger than the configured per-file limit.
    #[error("File is too large: '{name}' is {size} bytes (limit {limit} bytes)")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// The file has a `.pdf` extension but is not a PDF.
    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    /// The PDF has more pages than the configured limit.
    #[error("Too many pages: '{name}' has {pages} pages (limit {limit})\nSplit the document or raise --max-pages.")]
    TooManyPages {
        name: String,
        pages: usize,
        limit: usize,
    },

    /// A page limit is set but the PDF's page tree could not be read.
    #[error("Could not read PDF '{name}' to count its pages: {detail}")]
    UnreadablePdf { name: String, detail: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// No API key was given and none was found in the environment.
    #[error("MISTRALAI_API_KEY is not set.\nSet it in the environment or a .env file, or pass --api-key.")]
    ApiKeyMissing,

    /// Uploading the document to the OCR service failed.
    #[error("Upload of '{file}' failed: {reason}")]
    UploadFailed { file: String, reason: String },

    /// The OCR service rejected or failed to process a document.
    #[error("OCR failed for '{file}': {reason}")]
    OcrFailed { file: String, reason: String },

    /// The OCR service returned HTTP 429.
    #[error("Rate limit exceeded by the OCR service while processing '{file}'")]
    RateLimitExceeded {
        file: String,
        retry_after_secs: Option<u64>,
    },

    /// The OCR call timed out.
    #[error("OCR call timed out after {secs}s for '{file}'")]
    ApiTimeout { file: String, secs: u64 },

    /// The OCR service returned 401/403; retrying will not help.
    #[error("Authentication error from the OCR service: {detail}")]
    AuthError { detail: String },

    /// The OCR response could not be decoded into a [`crate::SourceResult`].
    ///
    /// A page without its `markdown` field lands here: the assembler has no
    /// way to process it.
    #[error("Malformed OCR result: {detail}")]
    MalformedSource { detail: String },

    // ── Image errors ──────────────────────────────────────────────────────
    /// An embedded image payload is not valid base64.
    #[error("Figure {figure}: image payload for '{id}' could not be decoded: {detail}")]
    ImageDecodeFailed {
        figure: usize,
        id: String,
        detail: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Ocr2MdError {
    /// Whether the error was caused by the request itself (bad file, no
    /// files) rather than by the OCR service or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Ocr2MdError::NoInputs
                | Ocr2MdError::InvalidInput { .. }
                | Ocr2MdError::UnsupportedFileType { .. }
                | Ocr2MdError::FileTooLarge { .. }
                | Ocr2MdError::NotAPdf { .. }
                | Ocr2MdError::TooManyPages { .. }
                | Ocr2MdError::UnreadablePdf { .. }
        )
    }

    /// Whether a retry of the same OCR call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Ocr2MdError::RateLimitExceeded { .. } | Ocr2MdError::ApiTimeout { .. }
        )
    }
}
