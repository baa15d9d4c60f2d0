//! Configuration types for OCR-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! config can be cloned into a server's shared state and logged as a whole.

use crate::error::Ocr2MdError;
use crate::pipeline::assemble::AssemblyOptions;
use crate::pipeline::input::InputLimits;
use crate::pipeline::ocr::OcrProvider;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default OCR endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Default OCR model.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Default per-file size limit (10 MiB), matching the web upload form.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Upper bound on `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["MISTRALAI_API_KEY", "MISTRAL_API_KEY"];

/// Configuration for an OCR-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use ocr2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .include_page_headers(true)
///     .max_file_size_mb(50)
///     .build()
///     .unwrap();
/// assert!(config.include_page_headers);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// OCR API key. If None, read from `MISTRALAI_API_KEY` at call time.
    pub api_key: Option<String>,

    /// OCR API base URL. Default: `https://api.mistral.ai`.
    pub base_url: String,

    /// OCR model identifier. Default: `mistral-ocr-latest`.
    pub model: String,

    /// Pre-constructed OCR provider. Takes precedence over `api_key`/`base_url`.
    pub provider: Option<Arc<dyn OcrProvider>>,

    /// Prepend `# Page N` to every page. Default: false.
    pub include_page_headers: bool,

    /// Count the OCR service's table array in addition to the tables
    /// detected in the text. Default: true.
    pub reserve_table_array: bool,

    /// Where figure images go. Default: inline base64.
    pub image_mode: ImageMode,

    /// Per-file size limit in bytes. Default: 10 MiB.
    pub max_file_size_bytes: u64,

    /// Page limit per PDF. `None` (default) skips page counting.
    pub max_pages: Option<usize>,

    /// Lifetime of the signed document URL, in hours. Default: 1.
    pub signed_url_expiry_hours: u32,

    /// Per-request OCR timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Retries on a transient OCR failure (429, 5xx, timeout). Default: 0.
    ///
    /// With 0 the first failure aborts the batch.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            include_page_headers: false,
            reserve_table_array: true,
            image_mode: ImageMode::default(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            max_pages: None,
            signed_url_expiry_hours: 1,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("include_page_headers", &self.include_page_headers)
            .field("reserve_table_array", &self.reserve_table_array)
            .field("image_mode", &self.image_mode)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("max_pages", &self.max_pages)
            .field("signed_url_expiry_hours", &self.signed_url_expiry_hours)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The assembler options implied by this config.
    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            include_page_headers: self.include_page_headers,
            reserve_table_array: self.reserve_table_array,
        }
    }

    /// The per-file limits applied during input validation.
    pub fn input_limits(&self) -> InputLimits {
        InputLimits {
            max_size_bytes: self.max_file_size_bytes,
            max_pages: self.max_pages,
        }
    }

    /// Resolve the API key: explicit value first, then the environment.
    ///
    /// # Errors
    /// [`Ocr2MdError::ApiKeyMissing`] when neither is set (or both are empty).
    pub fn resolve_api_key(&self) -> Result<String, Ocr2MdError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .ok_or(Ocr2MdError::ApiKeyMissing)
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn OcrProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn include_page_headers(mut self, v: bool) -> Self {
        self.config.include_page_headers = v;
        self
    }

    pub fn reserve_table_array(mut self, v: bool) -> Self {
        self.config.reserve_table_array = v;
        self
    }

    pub fn image_mode(mut self, mode: ImageMode) -> Self {
        self.config.image_mode = mode;
        self
    }

    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    pub fn max_file_size_mb(self, mb: u64) -> Self {
        self.max_file_size_bytes(mb.saturating_mul(1024 * 1024))
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = Some(pages);
        self
    }

    pub fn signed_url_expiry_hours(mut self, hours: u32) -> Self {
        self.config.signed_url_expiry_hours = hours;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Ocr2MdError> {
        let c = &self.config;
        if c.max_file_size_bytes == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.max_pages == Some(0) {
            return Err(Ocr2MdError::InvalidConfig(
                "Maximum page count must be > 0".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES_LIMIT {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES_LIMIT}, got {}",
                c.max_retries
            )));
        }
        if c.signed_url_expiry_hours == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "Signed URL expiry must be ≥ 1 hour".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(Ocr2MdError::InvalidConfig("Model must not be empty".into()));
        }
        if c.provider.is_none()
            && !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://"))
        {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "Base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where figure images end up in the combined document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMode {
    /// Embed the base64 payload as the image target (default). The document
    /// is self-contained but large.
    #[default]
    Inline,
    /// Write each figure to `<dir>/images/figure_NNN.<ext>` and reference it
    /// by relative path.
    Files(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.model, "mistral-ocr-latest");
        assert_eq!(c.max_file_size_bytes, 10 * 1024 * 1024);
        assert!(!c.include_page_headers);
        assert!(c.reserve_table_array);
        assert_eq!(c.image_mode, ImageMode::Inline);
        assert_eq!(c.max_retries, 0);
    }

    #[test]
    fn builder_trims_base_url() {
        let c = ConversionConfig::builder()
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "http://localhost:8080");
    }

    #[test]
    fn builder_rejects_zero_size() {
        let err = ConversionConfig::builder()
            .max_file_size_bytes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Ocr2MdError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let err = ConversionConfig::builder()
            .base_url("ftp://example")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://example"));
    }

    #[test]
    fn max_file_size_mb() {
        let c = ConversionConfig::builder().max_file_size_mb(50).build().unwrap();
        assert_eq!(c.max_file_size_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn page_limit_flows_into_input_limits() {
        let c = ConversionConfig::builder()
            .max_file_size_mb(1)
            .max_pages(1000)
            .build()
            .unwrap();
        let limits = c.input_limits();
        assert_eq!(limits.max_size_bytes, 1024 * 1024);
        assert_eq!(limits.max_pages, Some(1000));
        assert_eq!(ConversionConfig::default().input_limits().max_pages, None);
    }

    #[test]
    fn builder_rejects_zero_page_limit() {
        let err = ConversionConfig::builder().max_pages(0).build().unwrap_err();
        assert!(matches!(err, Ocr2MdError::InvalidConfig(_)));
    }

    #[test]
    fn builder_caps_retries() {
        assert!(ConversionConfig::builder()
            .max_retries(MAX_RETRIES_LIMIT)
            .build()
            .is_ok());
        let err = ConversionConfig::builder()
            .max_retries(u32::MAX)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn explicit_api_key_wins() {
        let c = ConversionConfig::builder().api_key("  sk-test ").build().unwrap();
        assert_eq!(c.resolve_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ConversionConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
