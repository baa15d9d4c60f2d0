//! CLI binary for ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, writes the results, and hosts the upload server.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use ocr2md::convert::write_atomic;
use ocr2md::{
    convert, suggest_filename, ConversionConfig, ConversionOutput, ConversionProgressCallback,
    ImageMode, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the input files, with a log line per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_start: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("OCR");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_start: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_start
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
    }

    fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut t) = self.file_start.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, name: &str, pages: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{pages} pages")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
        ));
        self.bar.abandon();
    }

    fn on_batch_complete(&self, total_pages: usize, _markdown_chars: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages recognised",
            green("✔"),
            bold(&total_pages.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One PDF → ./result/ocr_result_<timestamp>.md
  ocr2md convert scan.pdf

  # Several files, one document, page headers, fixed name
  ocr2md convert part1.pdf part2.pdf photo.jpg --page-headers --filename report

  # Markdown plus the raw OCR JSON, figures as files
  ocr2md convert scan.pdf --format both --images files -o out/

  # Print to stdout
  ocr2md convert https://example.com/scan.pdf --stdout

  # Serve the upload API
  ocr2md serve --port 3000

ENVIRONMENT VARIABLES:
  MISTRALAI_API_KEY   Mistral API key (MISTRAL_API_KEY also accepted)
  RUST_LOG            Override log filter (e.g. ocr2md=debug)

  A .env file in the working directory is loaded at startup.
"#;

/// Convert scanned PDFs and images to Markdown with Mistral OCR.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Convert scanned PDFs and images to Markdown with Mistral OCR",
    long_about = "Convert scanned PDFs and images (local files or URLs) to a single Markdown \
document. Figures and tables are numbered across all inputs (図1, 図2, 表1, ...).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR2MD_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR one or more files and write a combined Markdown document.
    Convert(ConvertArgs),
    /// Serve the HTTP upload API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local files (PDF, PNG, JPG, JPEG, AVIF) or HTTP/HTTPS URLs, in order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory.
    #[arg(short, long, env = "OCR2MD_OUTPUT", default_value = "./result")]
    output: PathBuf,

    /// Prepend `# Page N` to every page.
    #[arg(long, env = "OCR2MD_PAGE_HEADERS")]
    page_headers: bool,

    /// What to write.
    #[arg(long, env = "OCR2MD_FORMAT", value_enum, default_value = "markdown")]
    format: OutputFormat,

    /// Output file stem (no extension). Default: ocr_result_<timestamp>.
    #[arg(long, env = "OCR2MD_FILENAME")]
    filename: Option<String>,

    /// Mistral API key (overrides MISTRALAI_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum size per file in MB.
    #[arg(long, env = "OCR2MD_MAX_SIZE", default_value_t = 50)]
    max_size: u64,

    /// Maximum pages per PDF.
    #[arg(long, env = "OCR2MD_MAX_PAGES", default_value_t = 1000)]
    max_pages: usize,

    /// Where figure images go. `files` needs Markdown written to disk.
    #[arg(long, env = "OCR2MD_IMAGES", value_enum, default_value = "inline")]
    images: ImagesArg,

    /// Print the Markdown to stdout instead of writing files.
    #[arg(long)]
    stdout: bool,

    /// Retries per file on rate limits, 5xx and timeouts.
    #[arg(long, env = "OCR2MD_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-request OCR timeout in seconds.
    #[arg(long, env = "OCR2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "OCR2MD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "OCR2MD_PORT", default_value_t = 3000)]
    port: u16,

    /// Maximum size per uploaded file in MB.
    #[arg(long, env = "OCR2MD_MAX_SIZE", default_value_t = 10)]
    max_size: u64,

    /// Prepend `# Page N` to every page.
    #[arg(long, env = "OCR2MD_PAGE_HEADERS")]
    page_headers: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Markdown,
    Json,
    Both,
}

impl OutputFormat {
    fn markdown(self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }

    fn json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImagesArg {
    Inline,
    Files,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.stdout,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(ref args) => run_convert(args, cli.quiet, show_progress).await,
        Command::Serve(ref args) => run_serve(args).await,
    }
}

async fn run_convert(args: &ConvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;

    let output = convert(&args.inputs, &config)
        .await
        .context("Conversion failed")?;

    if args.stdout {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown().as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown().ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
        return Ok(());
    }

    let stem = output_stem(args.filename.as_deref(), &suggest_filename(&chrono::Local::now()));
    let written = write_outputs(&output, &args.output, &stem, args.format)?;

    if !quiet {
        for path in &written {
            eprintln!("{} saved {}", green("✓"), bold(&path.display().to_string()));
        }
        eprintln!(
            "   {} files  {} pages  {} figures  {} tables  {}ms",
            output.stats.total_sources,
            output.stats.total_pages,
            output.stats.figures,
            output.stats.tables,
            output.stats.total_duration_ms,
        );
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(args: &ServeArgs) -> Result<()> {
    let config = ConversionConfig::builder()
        .max_file_size_mb(args.max_size)
        .include_page_headers(args.page_headers)
        .build()
        .context("Invalid configuration")?;
    // Fail at startup rather than on the first upload.
    config
        .resolve_api_key()
        .context("The server needs an OCR API key")?;

    ocr2md::server::serve(config, &args.host, args.port)
        .await
        .with_context(|| format!("Server on {}:{} failed", args.host, args.port))
}

#[cfg(not(feature = "server"))]
async fn run_serve(_args: &ServeArgs) -> Result<()> {
    anyhow::bail!("this build of ocr2md was compiled without the `server` feature")
}

/// Map CLI args to `ConversionConfig`.
fn build_config(args: &ConvertArgs, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let image_mode = match args.images {
        ImagesArg::Inline => ImageMode::Inline,
        // Figure links are relative to the written .md file.
        ImagesArg::Files if args.stdout => {
            anyhow::bail!("--images files cannot be combined with --stdout")
        }
        ImagesArg::Files if !args.format.markdown() => {
            anyhow::bail!("--images files needs --format markdown or both")
        }
        ImagesArg::Files => ImageMode::Files(args.output.clone()),
    };

    let mut builder = ConversionConfig::builder()
        .include_page_headers(args.page_headers)
        .image_mode(image_mode)
        .max_file_size_mb(args.max_size)
        .max_pages(args.max_pages)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// File stem for the outputs: the user's, minus any `.md`, else the
/// timestamped default.
fn output_stem(requested: Option<&str>, suggested: &str) -> String {
    let stem = requested.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(suggested);
    stem.strip_suffix(".md").unwrap_or(stem).to_string()
}

/// Write `<stem>.json` and/or `<stem>.md` under `dir`, JSON first.
fn write_outputs(
    output: &ConversionOutput,
    dir: &Path,
    stem: &str,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    if format.json() {
        let path = dir.join(format!("{stem}.json"));
        let json = output
            .sources_json()
            .context("Failed to serialise OCR results")?;
        write_atomic(&path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    if format.markdown() {
        let path = dir.join(format!("{stem}.md"));
        write_atomic(&path, output.markdown().as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}
