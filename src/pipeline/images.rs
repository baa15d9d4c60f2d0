//! Figure extraction: write embedded image payloads to disk.
//!
//! The OCR service returns every image as a base64 payload, normally a
//! `data:image/jpeg;base64,...` URI. Inlining those keeps the Markdown
//! self-contained but makes it megabytes long and unreadable in an editor.
//! [`FileImages`] decodes each payload to `images/figure_NNN.<ext>` next to
//! the Markdown file and links to it by relative path instead.

use crate::error::Ocr2MdError;
use crate::model::ImageRef;
use crate::pipeline::assemble::ImageSink;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sub-directory (relative to the output directory) holding the figures.
pub const IMAGES_DIR: &str = "images";

/// Split a payload into its MIME type (if it is a data URI) and base64 body.
pub fn split_payload(payload: &str) -> (Option<&str>, &str) {
    match payload.split_once(',') {
        Some((head, body)) => {
            let mime = head
                .strip_prefix("data:")
                .map(|h| h.split(';').next().unwrap_or(h))
                .filter(|m| !m.is_empty());
            (mime, body)
        }
        None => (None, payload),
    }
}

/// Decode a base64 payload (bare or data URI) into raw bytes.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let (_, body) = split_payload(payload);
    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(body)
}

/// File extension for an image: from the data-URI MIME type, else by
/// sniffing the bytes, else `jpg`.
pub fn extension_for(mime: Option<&str>, bytes: &[u8]) -> &'static str {
    let from_mime = match mime {
        Some("image/jpeg") | Some("image/jpg") => Some("jpg"),
        Some("image/png") => Some("png"),
        Some("image/gif") => Some("gif"),
        Some("image/webp") => Some("webp"),
        Some("image/avif") => Some("avif"),
        Some("image/tiff") => Some("tiff"),
        Some("image/bmp") => Some("bmp"),
        _ => None,
    };
    from_mime
        .or_else(|| {
            image::guess_format(bytes)
                .ok()
                .and_then(|f| f.extensions_str().first().copied())
        })
        .unwrap_or("jpg")
}

/// Writes every figure under `<output_dir>/images/` and returns a relative
/// link for it.
#[derive(Debug)]
pub struct FileImages {
    output_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileImages {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            written: Vec::new(),
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_DIR)
    }

    /// Paths of the files written so far, in figure order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<(), Ocr2MdError> {
        let dir = self.images_dir();
        std::fs::create_dir_all(&dir).map_err(|e| Ocr2MdError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
        std::fs::write(path, bytes).map_err(|e| Ocr2MdError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.written.push(path.to_path_buf());
        Ok(())
    }
}

impl ImageSink for FileImages {
    fn target(&mut self, figure: usize, image: &ImageRef) -> Result<String, Ocr2MdError> {
        if image.image_base64.trim().is_empty() {
            warn!(
                "Figure {}: no image data for '{}' (was include_image_base64 off?)",
                figure, image.id
            );
            return Ok(image.id.clone());
        }

        let (mime, _) = split_payload(&image.image_base64);
        let bytes =
            decode_payload(&image.image_base64).map_err(|e| Ocr2MdError::ImageDecodeFailed {
                figure,
                id: image.id.clone(),
                detail: e.to_string(),
            })?;

        let file_name = format!("figure_{:03}.{}", figure, extension_for(mime, &bytes));
        let path = self.images_dir().join(&file_name);
        self.write(&path, &bytes)?;
        debug!("Figure {}: {} bytes → {}", figure, bytes.len(), path.display());

        Ok(format!("{IMAGES_DIR}/{file_name}"))
    }
}
