//! OCR result types, as returned by the OCR service.
//!
//! These mirror the JSON the Mistral OCR endpoint produces. Only `markdown`
//! is required on a page; everything else defaults to empty so that results
//! from older API versions (or hand-written fixtures) still deserialise.

use crate::error::Ocr2MdError;
use serde::{Deserialize, Serialize};

/// One OCR invocation's output: every page of one source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub pages: Vec<Page>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub usage_info: UsageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_annotation: Option<serde_json::Value>,
}

impl SourceResult {
    /// Decode an OCR response body.
    ///
    /// # Errors
    /// [`Ocr2MdError::MalformedSource`] if the JSON does not have the shape
    /// of an OCR result, e.g. a page is missing its `markdown` field.
    pub fn from_json(json: &str) -> Result<Self, Ocr2MdError> {
        serde_json::from_str(json).map_err(|e| Ocr2MdError::MalformedSource {
            detail: e.to_string(),
        })
    }

    /// Same as [`SourceResult::from_json`] for an already-parsed value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Ocr2MdError> {
        serde_json::from_value(value).map_err(|e| Ocr2MdError::MalformedSource {
            detail: e.to_string(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// One page of one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index within its source.
    #[serde(default)]
    pub index: usize,
    /// Raw page text. May contain `![id](id)` placeholders and pipe tables.
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Table descriptors. Their structure is not defined by the service;
    /// only the count is used.
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
    #[serde(default)]
    pub hyperlinks: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Page {
    /// Convenience constructor for a text-only page.
    pub fn new(index: usize, markdown: impl Into<String>) -> Self {
        Self {
            index,
            markdown: markdown.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }
}

/// An image embedded in a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Identifier, also used as the placeholder token in the page text.
    pub id: String,
    #[serde(default)]
    pub top_left_x: i64,
    #[serde(default)]
    pub top_left_y: i64,
    #[serde(default)]
    pub bottom_right_x: i64,
    #[serde(default)]
    pub bottom_right_y: i64,
    /// Base64 payload, usually a `data:image/...;base64,` URI. Empty when the
    /// service was asked not to return image data.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_annotation: Option<serde_json::Value>,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_base64: image_base64.into(),
            ..Default::default()
        }
    }

    /// The placeholder token the service leaves in the page text.
    pub fn placeholder(&self) -> String {
        format!("![{0}]({0})", self.id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub dpi: u32,
    pub height: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub pages_processed: usize,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub doc_size_bytes: u64,
}

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_as_zero<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(d)?.unwrap_or_default())
}
