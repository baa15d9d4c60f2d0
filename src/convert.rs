//! Conversion entry points: inputs in, one combined Markdown document out.
//!
//! Files are sent to the OCR provider one at a time, in input order. The
//! first failure aborts the batch and is returned unchanged; no partial
//! document is produced.

use crate::config::{ConversionConfig, ImageMode};
use crate::error::Ocr2MdError;
use crate::model::SourceResult;
use crate::output::{CombinedDocument, ConversionOutput, ConversionStats, SourceStats};
use crate::pipeline::assemble::{combine_document, combine_with};
use crate::pipeline::images::FileImages;
use crate::pipeline::input::{self, SourceDocument};
use crate::pipeline::ocr::{MistralOcrClient, OcrProvider};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Convert local files and/or URLs to a single Markdown document.
///
/// # Arguments
/// * `inputs`: local paths or HTTP/HTTPS URLs (PDF, PNG, JPG, JPEG, AVIF)
/// * `config`: conversion configuration
///
/// # Errors
/// Any input, OCR, image or output error. Every input is resolved and
/// validated before the first OCR request is sent.
///
/// # Example
/// ```rust,no_run
/// use ocr2md::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // API key from MISTRALAI_API_KEY
/// let config = ConversionConfig::default();
/// let output = convert(["scan-1.pdf", "scan-2.png"], &config).await?;
/// println!("{}", output.markdown());
/// # Ok(())
/// # }
/// ```
pub async fn convert<I, S>(inputs: I, config: &ConversionConfig) -> Result<ConversionOutput, Ocr2MdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let total_start = Instant::now();
    let inputs: Vec<String> = inputs.into_iter().map(|s| s.as_ref().to_string()).collect();
    if inputs.is_empty() {
        return Err(Ocr2MdError::NoInputs);
    }
    info!("Starting conversion of {} input(s)", inputs.len());

    let mut files = Vec::with_capacity(inputs.len());
    for input_str in &inputs {
        let doc = input::resolve_input(
            input_str,
            config.download_timeout_secs,
            &config.input_limits(),
        )
        .await?;
        files.push(doc);
    }

    run(files, config, total_start).await
}

/// Convert documents already held in memory.
///
/// Used by the HTTP endpoint, where uploads never touch the filesystem.
pub async fn convert_from_bytes(
    files: Vec<SourceDocument>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2MdError> {
    run(files, config, Instant::now()).await
}

/// Convert and write the Markdown directly to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file<I, S>(
    inputs: I,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Ocr2MdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let output = convert(inputs, config).await?;
    let path = output_path.as_ref().to_path_buf();
    let markdown = output.document.markdown;

    tokio::task::spawn_blocking(move || write_atomic(&path, markdown.as_bytes()))
        .await
        .map_err(|e| Ocr2MdError::Internal(format!("write task failed: {e}")))??;

    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<I, S>(inputs: I, config: &ConversionConfig) -> Result<ConversionOutput, Ocr2MdError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| Ocr2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(inputs, config))
}

/// Write `contents` to `path` through a temp file in the same directory.
///
/// Parent directories are created as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Ocr2MdError> {
    let write_err = |e: std::io::Error| Ocr2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Pick the OCR provider: a pre-built one from the config, else a Mistral
/// client with the key resolved now.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn OcrProvider>, Ocr2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    let client = MistralOcrClient::from_config(config)?;
    debug!("Using {:?}", client);
    Ok(Arc::new(client))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run(
    files: Vec<SourceDocument>,
    config: &ConversionConfig,
    total_start: Instant,
) -> Result<ConversionOutput, Ocr2MdError> {
    input::validate_all(&files, &config.input_limits())?;
    let provider = resolve_provider(config)?;
    let total_files = files.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total_files);
    }

    // ── OCR, one file at a time ──────────────────────────────────────────
    let ocr_start = Instant::now();
    let mut sources = Vec::with_capacity(total_files);
    let mut source_stats = Vec::with_capacity(total_files);

    for (idx, doc) in files.iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(idx, total_files, &doc.name);
        }
        info!(
            "[{}/{}] {} ({} bytes) via {}",
            idx + 1,
            total_files,
            doc.name,
            doc.size(),
            provider.name()
        );

        let file_start = Instant::now();
        let result = match provider.process(doc).await {
            Ok(r) => r,
            Err(e) => {
                error!("{} failed, aborting batch: {}", doc.name, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_error(idx, total_files, &doc.name, &e.to_string());
                }
                return Err(e);
            }
        };

        if let Some(ref cb) = config.progress_callback {
            cb.on_file_complete(idx, total_files, &doc.name, result.page_count());
        }
        source_stats.push(SourceStats {
            name: doc.name.clone(),
            size_bytes: doc.size(),
            pages: result.page_count(),
            images: result.image_count(),
            model: result.model.clone(),
            duration_ms: file_start.elapsed().as_millis() as u64,
        });
        sources.push(result);
    }
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    // ── Assemble ─────────────────────────────────────────────────────────
    let (document, sources) = assemble(sources, config).await?;

    let stats = ConversionStats {
        total_sources: document.source_count,
        total_pages: document.total_pages,
        figures: document.figure_count,
        tables: document.table_count,
        markdown_chars: document.markdown.chars().count(),
        sources: source_stats,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} file(s), {} pages, {} figures, {} tables, {}ms total",
        stats.total_sources, stats.total_pages, stats.figures, stats.tables, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(stats.total_pages, stats.markdown_chars);
    }

    Ok(ConversionOutput {
        document,
        sources,
        stats,
    })
}

/// Build the combined document. Writing figure files is blocking I/O, so
/// that mode runs on the blocking pool.
async fn assemble(
    sources: Vec<SourceResult>,
    config: &ConversionConfig,
) -> Result<(CombinedDocument, Vec<SourceResult>), Ocr2MdError> {
    let options = config.assembly_options();
    match &config.image_mode {
        ImageMode::Inline => {
            let document = combine_document(&sources, &options);
            Ok((document, sources))
        }
        ImageMode::Files(dir) => {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || {
                let mut sink = FileImages::new(dir);
                let document = combine_with(&sources, &options, &mut sink)?;
                debug!("Wrote {} figure file(s)", sink.written().len());
                Ok::<_, Ocr2MdError>((document, sources))
            })
            .await
            .map_err(|e| Ocr2MdError::Internal(format!("assembly task failed: {e}")))?
        }
    }
}
