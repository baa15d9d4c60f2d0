//! Result types returned by the assembler and the conversion entry points.

use crate::model::SourceResult;
use serde::{Deserialize, Serialize};

/// The single Markdown document built from every source of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedDocument {
    pub markdown: String,
    /// Pages across all sources.
    pub total_pages: usize,
    pub source_count: usize,
    /// Highest figure number assigned (0 if none).
    pub figure_count: usize,
    /// Highest table number assigned (0 if none), including numbers reserved
    /// for the service's table array.
    pub table_count: usize,
}

/// Full output of [`crate::convert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub document: CombinedDocument,
    /// Raw OCR results, in input order.
    pub sources: Vec<SourceResult>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    pub fn markdown(&self) -> &str {
        &self.document.markdown
    }

    /// The raw OCR results as pretty-printed JSON: a single object for one
    /// source, an array otherwise.
    pub fn sources_json(&self) -> Result<String, serde_json::Error> {
        match self.sources.as_slice() {
            [single] => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        }
    }
}

/// Per-source numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub name: String,
    pub size_bytes: u64,
    pub pages: usize,
    pub images: usize,
    pub model: String,
    pub duration_ms: u64,
}

/// Aggregate numbers for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_sources: usize,
    pub total_pages: usize,
    pub figures: usize,
    pub tables: usize,
    pub markdown_chars: usize,
    pub sources: Vec<SourceStats>,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}
