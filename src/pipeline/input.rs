//! Input resolution: turn a user-supplied path or URL into an in-memory
//! [`SourceDocument`], and validate it before any OCR call is made.
//!
//! The whole batch is validated before the first upload: a bad third file
//! is rejected before the first two are sent.

use crate::error::Ocr2MdError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Extensions the OCR service accepts (lower-case, without the dot).
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "jpeg", "avif"];

/// A document ready to be sent to the OCR service.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name, used for the upload and in error messages.
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Wrap raw bytes; the MIME type is derived from the file name.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            mime_type: mime_type_for(&name).to_string(),
            name,
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Lower-cased extension of a file name, if any.
fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// MIME type from the file extension; `application/octet-stream` if unknown.
pub fn mime_type_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

pub fn is_supported(name: &str) -> bool {
    extension(name).is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn check_type(name: &str) -> Result<(), Ocr2MdError> {
    if is_supported(name) {
        Ok(())
    } else {
        Err(Ocr2MdError::UnsupportedFileType {
            name: name.to_string(),
        })
    }
}

fn check_size(name: &str, size: u64, limit: u64) -> Result<(), Ocr2MdError> {
    if size > limit {
        Err(Ocr2MdError::FileTooLarge {
            name: name.to_string(),
            size,
            limit,
        })
    } else {
        Ok(())
    }
}

/// Per-file limits applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub max_size_bytes: u64,
    /// Page ceiling for PDFs. `None` skips page counting.
    pub max_pages: Option<usize>,
}

impl InputLimits {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// Number of pages in a PDF, read from its page tree.
pub fn pdf_page_count(bytes: &[u8]) -> Result<usize, lopdf::Error> {
    Ok(lopdf::Document::load_mem(bytes)?.get_pages().len())
}

fn check_pages(doc: &SourceDocument, limit: usize) -> Result<(), Ocr2MdError> {
    let pages = pdf_page_count(&doc.bytes).map_err(|e| Ocr2MdError::UnreadablePdf {
        name: doc.name.clone(),
        detail: e.to_string(),
    })?;
    debug!("{}: {} pages (limit {})", doc.name, pages, limit);
    if pages > limit {
        return Err(Ocr2MdError::TooManyPages {
            name: doc.name.clone(),
            pages,
            limit,
        });
    }
    Ok(())
}

/// Validate one document: supported extension, size limit, PDF magic bytes
/// and, when a page limit is set, the PDF page count.
pub fn validate(doc: &SourceDocument, limits: &InputLimits) -> Result<(), Ocr2MdError> {
    check_type(&doc.name)?;
    check_size(&doc.name, doc.size(), limits.max_size_bytes)?;
    if !doc.is_pdf() {
        return Ok(());
    }
    if doc.bytes.len() >= 4 && &doc.bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&doc.bytes[..4]);
        return Err(Ocr2MdError::NotAPdf {
            name: doc.name.clone(),
            magic,
        });
    }
    match limits.max_pages {
        Some(limit) => check_pages(doc, limit),
        None => Ok(()),
    }
}

/// Validate a whole batch: non-empty, then every file type, then every size,
/// signature and page count. The first violation is returned.
pub fn validate_all(docs: &[SourceDocument], limits: &InputLimits) -> Result<(), Ocr2MdError> {
    if docs.is_empty() {
        return Err(Ocr2MdError::NoInputs);
    }
    for doc in docs {
        check_type(&doc.name)?;
    }
    for doc in docs {
        validate(doc, limits)?;
    }
    Ok(())
}

/// Resolve the input string to an in-memory document.
///
/// If the input is a URL, download it. If it is a local file, check that it
/// exists, has a supported extension and is within the size limit before
/// reading it.
pub async fn resolve_input(
    input: &str,
    download_timeout_secs: u64,
    limits: &InputLimits,
) -> Result<SourceDocument, Ocr2MdError> {
    let doc = if is_url(input) {
        download_url(input, download_timeout_secs, limits.max_size_bytes).await?
    } else {
        resolve_local(input, limits.max_size_bytes).await?
    };
    validate(&doc, limits)?;
    Ok(doc)
}

/// Read a local file after cheap metadata checks.
async fn resolve_local(path_str: &str, max_size_bytes: u64) -> Result<SourceDocument, Ocr2MdError> {
    if path_str.trim().is_empty() {
        return Err(Ocr2MdError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Ocr2MdError::InvalidInput {
            input: path_str.to_string(),
        })?;

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Ocr2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Ocr2MdError::FileNotFound { path }),
    };
    if !meta.is_file() {
        return Err(Ocr2MdError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    check_type(&name)?;
    check_size(&name, meta.len(), max_size_bytes)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Ocr2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Ocr2MdError::FileNotFound { path }),
    };

    debug!("Resolved local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::new(name, bytes))
}

/// Download a URL into memory.
///
/// The size limit is enforced from `Content-Length` before the body is read,
/// and again on the running total while chunks arrive.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_size_bytes: u64,
) -> Result<SourceDocument, Ocr2MdError> {
    info!("Downloading from: {}", url);

    let failed = |reason: String| Ocr2MdError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let transport = |e: reqwest::Error| {
        if e.is_timeout() {
            Ocr2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client.get(url).send().await.map_err(transport)?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let fallback_name = extract_filename(url);
    if let Some(len) = response.content_length() {
        check_size(&fallback_name, len, max_size_bytes)?;
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport)? {
        let total = (bytes.len() + chunk.len()) as u64;
        check_size(&fallback_name, total, max_size_bytes)?;
        bytes.extend_from_slice(&chunk);
    }

    let name = name_for_download(url, content_type.as_deref(), &bytes);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(SourceDocument::new(name, bytes))
}

/// File name for a downloaded document. URLs without a usable extension
/// (`/pdf/1706.03762`, `/photo`) get one from the Content-Type or the
/// leading bytes. A name that still has no supported extension is returned
/// as-is and fails type validation.
fn name_for_download(url: &str, content_type: Option<&str>, bytes: &[u8]) -> String {
    let name = extract_filename(url);
    if is_supported(&name) {
        return name;
    }
    let from_header = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .and_then(|mime| match mime {
            "application/pdf" => Some("pdf"),
            "image/png" => Some("png"),
            "image/jpeg" => Some("jpg"),
            "image/avif" => Some("avif"),
            _ => None,
        });
    let ext = from_header.or_else(|| {
        if bytes.starts_with(b"%PDF") {
            Some("pdf")
        } else {
            match image::guess_format(bytes) {
                Ok(image::ImageFormat::Png) => Some("png"),
                Ok(image::ImageFormat::Jpeg) => Some("jpg"),
                Ok(image::ImageFormat::Avif) => Some("avif"),
                _ => None,
            }
        }
    });
    match ext {
        Some(ext) => format!("{name}.{ext}"),
        None => name,
    }
}

/// Last non-empty URL path segment, or `downloaded`. No extension is
/// invented here.
fn extract_filename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "downloaded".to_string())
}
