//! Document assembly: stitch per-source, per-page OCR text into one Markdown
//! document with sequential figure (`図N`) and table (`表N`) numbers.
//!
//! ## Traversal order
//!
//! Numbers are assigned in one forward walk: source order, then page order,
//! then within a page all images first and all tables after. A single
//! [`FigureTableCounter`] lives for the duration of one call, so two sources
//! that both contain `img-0.jpeg` still produce `図1` and `図2`.
//!
//! ## Per-page steps
//!
//! 1. Replace every `![id](id)` placeholder with `![図N](target)\n\n**図N**`.
//!    The id is regex-escaped, so `img-1.2(a)` matches literally.
//! 2. Reserve one table number per entry of the page's `tables` array.
//! 3. Insert `**表N**` before each contiguous run of pipe-delimited lines.
//! 4. Prefix `# Page G` when requested, append the `---` separator.
//!
//! The whole document is trimmed once at the end, never per page.

use crate::error::Ocr2MdError;
use crate::model::{ImageRef, SourceResult};
use crate::output::CombinedDocument;
use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::convert::Infallible;
use std::fmt::Display;
use tracing::debug;

/// Appended after every page, including the last (the final trim removes it).
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Figure and table sequence numbers for one assembly.
///
/// Both counters start at zero and only ever go up. Create a fresh counter
/// per document; never share one between concurrent assemblies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FigureTableCounter {
    pub image_count: usize,
    pub table_count: usize,
}

impl FigureTableCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the figure counter and return the new (1-based) number.
    pub fn next_figure(&mut self) -> usize {
        self.image_count += 1;
        self.image_count
    }

    /// Advance the table counter and return the new (1-based) number.
    pub fn next_table(&mut self) -> usize {
        self.table_count += 1;
        self.table_count
    }
}

/// Knobs for [`combine_document`] and [`combine_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// Prepend `# Page G` (G = global 1-based page number) to each page.
    pub include_page_headers: bool,
    /// Reserve a table number for every entry of a page's `tables` array,
    /// in addition to the tables detected in the text.
    pub reserve_table_array: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            include_page_headers: false,
            reserve_table_array: true,
        }
    }
}

/// Decides what a figure's image link points at.
///
/// Called once per [`ImageRef`], in traversal order, with the figure number
/// that was just assigned.
pub trait ImageSink {
    fn target(&mut self, figure: usize, image: &ImageRef) -> Result<String, Ocr2MdError>;
}

/// Uses the base64 payload itself as the image target.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineImages;

impl ImageSink for InlineImages {
    fn target(&mut self, _figure: usize, image: &ImageRef) -> Result<String, Ocr2MdError> {
        Ok(image.image_base64.clone())
    }
}

/// Combine OCR results into one Markdown string with inline images.
///
/// Empty input yields an empty string.
///
/// # Example
/// ```rust
/// use ocr2md::{combine, ImageRef, Page, SourceResult};
///
/// let source = SourceResult {
///     pages: vec![Page::new(0, "![img-0.jpeg](img-0.jpeg)")
///         .with_image(ImageRef::new("img-0.jpeg", "data:image/jpeg;base64,AAAA"))],
///     ..Default::default()
/// };
/// let md = combine(&[source], false);
/// assert_eq!(md, "![図1](data:image/jpeg;base64,AAAA)\n\n**図1**\n\n---");
/// ```
pub fn combine(sources: &[SourceResult], include_page_headers: bool) -> String {
    let options = AssemblyOptions {
        include_page_headers,
        ..AssemblyOptions::default()
    };
    combine_document(sources, &options).markdown
}

/// Like [`combine`], but returns the document together with its counts.
pub fn combine_document(sources: &[SourceResult], options: &AssemblyOptions) -> CombinedDocument {
    let inline = |_: usize, image: &ImageRef| Ok::<_, Infallible>(image.image_base64.clone());
    match assemble(sources, options, inline) {
        Ok(doc) => doc,
        Err(never) => match never {},
    }
}

/// Like [`combine_document`], with image targets chosen by `sink`.
///
/// # Errors
/// Whatever `sink` returns; assembly stops at the first failing image.
pub fn combine_with(
    sources: &[SourceResult],
    options: &AssemblyOptions,
    sink: &mut dyn ImageSink,
) -> Result<CombinedDocument, Ocr2MdError> {
    assemble(sources, options, |figure, image| sink.target(figure, image))
}

fn assemble<E>(
    sources: &[SourceResult],
    options: &AssemblyOptions,
    mut image_target: impl FnMut(usize, &ImageRef) -> Result<String, E>,
) -> Result<CombinedDocument, E> {
    let mut counter = FigureTableCounter::new();
    let mut markdown = String::new();
    let mut global_page = 0usize;

    for (source_idx, source) in sources.iter().enumerate() {
        for page in &source.pages {
            global_page += 1;

            if options.include_page_headers {
                markdown.push_str(&format!("# Page {global_page}\n\n"));
            }

            let mut page_md = page.markdown.clone();
            let figures_before = counter.image_count;
            let tables_before = counter.table_count;

            for image in &page.images {
                let figure = counter.next_figure();
                let target = image_target(figure, image)?;
                let replacement = format!("![図{figure}]({target})\n\n**図{figure}**");
                page_md = substitute_placeholder(&page_md, &image.id, &replacement);
            }

            // The table array carries no position or content, so these
            // numbers are reserved without any marker in the text.
            if options.reserve_table_array {
                for _ in &page.tables {
                    counter.next_table();
                }
            }

            page_md = add_table_numbers(&page_md, &mut counter);

            debug!(
                "Source {} page {} (global {}): {} figures, {} tables",
                source_idx + 1,
                page.index,
                global_page,
                counter.image_count - figures_before,
                counter.table_count - tables_before
            );

            markdown.push_str(&page_md);
            markdown.push_str(PAGE_SEPARATOR);
        }
    }

    Ok(CombinedDocument {
        markdown: markdown.trim().to_string(),
        total_pages: global_page,
        source_count: sources.len(),
        figure_count: counter.image_count,
        table_count: counter.table_count,
    })
}

/// Replace every `![id](id)` in `text` with `replacement`, taken literally.
fn substitute_placeholder(text: &str, id: &str, replacement: &str) -> String {
    let escaped = regex::escape(id);
    let pattern = format!(r"!\[{escaped}\]\({escaped}\)");
    match Regex::new(&pattern) {
        Ok(re) => {
            if !re.is_match(text) {
                debug!("No placeholder for image '{}' in page text", id);
            }
            re.replace_all(text, NoExpand(replacement)).into_owned()
        }
        // Only reachable when the id blows the regex size limit.
        Err(e) => {
            debug!("Placeholder regex for '{}' rejected ({}), using plain match", id, e);
            text.replace(&format!("![{id}]({id})"), replacement)
        }
    }
}

// ── Table numbering ──────────────────────────────────────────────────────────

static RE_TABLE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\|.+\|").unwrap());

/// A line belongs to a table when, trimmed, it starts with `|` and has at
/// least one more `|` after some content.
pub fn is_table_line(line: &str) -> bool {
    RE_TABLE_LINE.is_match(line.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Outside,
    Inside,
}

/// Insert a `**表N**` marker before every contiguous run of table lines.
///
/// Single forward pass over `\n`-separated lines. Lines themselves are never
/// modified; the marker is followed by a blank line.
pub fn add_table_numbers(markdown: &str, counter: &mut FigureTableCounter) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut state = TableState::Outside;

    for line in markdown.split('\n') {
        state = match (state, is_table_line(line)) {
            (TableState::Outside, true) => {
                let n = counter.next_table();
                out.push(format!("**表{n}**\n"));
                TableState::Inside
            }
            (_, true) => TableState::Inside,
            (_, false) => TableState::Outside,
        };
        out.push(line.to_string());
    }

    out.join("\n")
}

// ── Output naming ────────────────────────────────────────────────────────────

/// Suggested file name for saving a combined document, e.g.
/// `ocr_result_20260101_143000.md`.
///
/// The instant is formatted in its own time zone; pass
/// `chrono::Local::now()` for the user's local time.
pub fn suggest_filename<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    now.format("ocr_result_%Y%m%d_%H%M%S.md").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;
    use chrono::{FixedOffset, Utc};

    fn source(pages: Vec<Page>) -> SourceResult {
        SourceResult {
            pages,
            model: "mistral-ocr-latest".into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(combine(&[], false), "");
        assert_eq!(combine(&[], true), "");
    }

    #[test]
    fn plain_page_passes_through() {
        let text = "# Heading\n\nSome prose, no tables.";
        let s = source(vec![Page::new(0, text)]);
        let doc = combine_document(&[s], &AssemblyOptions::default());
        assert_eq!(doc.markdown, format!("{text}{PAGE_SEPARATOR}").trim());
        assert_eq!(doc.total_pages, 1);
        assert_eq!(doc.figure_count, 0);
        assert_eq!(doc.table_count, 0);
    }

    #[test]
    fn pages_are_separated_by_rule() {
        let s = source(vec![Page::new(0, "one"), Page::new(1, "two")]);
        assert_eq!(combine(&[s], false), "one\n\n---\n\ntwo\n\n---");
    }

    #[test]
    fn page_headers_count_globally() {
        let a = source(vec![Page::new(0, "a0"), Page::new(1, "a1")]);
        let b = source(vec![Page::new(0, "b0")]);
        let md = combine(&[a, b], true);
        assert!(md.starts_with("# Page 1\n\na0"));
        assert!(md.contains("# Page 2\n\na1"));
        assert!(md.contains("# Page 3\n\nb0"));
        assert!(!md.contains("# Page 4"));
    }

    #[test]
    fn image_placeholder_replaced() {
        let page = Page::new(0, "before\n![img-0.jpeg](img-0.jpeg)\nafter")
            .with_image(ImageRef::new("img-0.jpeg", "data:image/jpeg;base64,QUJD"));
        let md = combine(&[source(vec![page])], false);
        assert_eq!(
            md,
            "before\n![図1](data:image/jpeg;base64,QUJD)\n\n**図1**\nafter\n\n---"
        );
    }

    #[test]
    fn every_occurrence_replaced_with_same_number() {
        let page = Page::new(0, "![a](a) and ![a](a)").with_image(ImageRef::new("a", "P"));
        let md = combine(&[source(vec![page])], false);
        assert_eq!(md.matches("![図1](P)").count(), 2);
        assert!(!md.contains("図2"));
    }

    #[test]
    fn metacharacters_in_id_are_literal() {
        let id = "img-1.2(a)";
        let page = Page::new(0, format!("x ![{id}]({id}) y ![img-1x2(a)](img-1x2(a))"))
            .with_image(ImageRef::new(id, "B64"));
        let md = combine(&[source(vec![page])], false);
        assert_eq!(md.matches("![図1](B64)").count(), 1);
        // The near-miss that an unescaped `.` would have matched stays put.
        assert!(md.contains("![img-1x2(a)](img-1x2(a))"));
    }

    #[test]
    fn dollar_signs_in_payload_are_not_expanded() {
        let page = Page::new(0, "![i](i)").with_image(ImageRef::new("i", "a$1b${0}"));
        let md = combine(&[source(vec![page])], false);
        assert!(md.contains("![図1](a$1b${0})"));
    }

    #[test]
    fn image_without_placeholder_still_counts() {
        let page = Page::new(0, "no placeholder here")
            .with_image(ImageRef::new("img-0.jpeg", "X"))
            .with_image(ImageRef::new("img-1.jpeg", "Y"));
        let page = Page {
            markdown: "![img-1.jpeg](img-1.jpeg)".into(),
            ..page
        };
        let md = combine(&[source(vec![page])], false);
        assert!(md.contains("![図2](Y)"));
        assert!(!md.contains("図1"));
    }

    #[test]
    fn table_block_gets_marker() {
        let mut counter = FigureTableCounter::new();
        let out = add_table_numbers("a\n|x|y|\n|1|2|\nb", &mut counter);
        assert_eq!(out, "a\n**表1**\n\n|x|y|\n|1|2|\nb");
        assert_eq!(counter.table_count, 1);
    }

    #[test]
    fn separated_tables_numbered_separately() {
        let mut counter = FigureTableCounter::new();
        let out = add_table_numbers("|a|b|\n|1|2|\n\n|c|d|\n|3|4|", &mut counter);
        assert_eq!(out.matches("**表1**").count(), 1);
        assert_eq!(out.matches("**表2**").count(), 1);
        assert!(out.find("**表1**").unwrap() < out.find("|a|b|").unwrap());
        assert!(out.find("**表2**").unwrap() < out.find("|c|d|").unwrap());
        assert_eq!(counter.table_count, 2);
    }

    #[test]
    fn table_line_predicate() {
        assert!(is_table_line("|x|y|"));
        assert!(is_table_line("   | a | b |   "));
        assert!(is_table_line("| --- | --- |"));
        assert!(is_table_line("|a|b"));
        assert!(!is_table_line("||"));
        assert!(!is_table_line("|only"));
        assert!(!is_table_line("a | b | c"));
        assert!(!is_table_line(""));
    }

    #[test]
    fn table_at_end_of_page() {
        let mut counter = FigureTableCounter::new();
        let out = add_table_numbers("text\n| h |\n| v |", &mut counter);
        assert_eq!(out, "text\n**表1**\n\n| h |\n| v |");
    }

    #[test]
    fn table_array_reserves_numbers() {
        let mut page = Page::new(0, "|a|b|\n|1|2|");
        page.tables = vec![serde_json::json!({}), serde_json::json!({})];
        let doc = combine_document(&[source(vec![page.clone()])], &AssemblyOptions::default());
        assert!(doc.markdown.contains("**表3**"));
        assert_eq!(doc.table_count, 3);

        let text_only = AssemblyOptions {
            reserve_table_array: false,
            ..AssemblyOptions::default()
        };
        let doc = combine_document(&[source(vec![page])], &text_only);
        assert!(doc.markdown.contains("**表1**"));
        assert_eq!(doc.table_count, 1);
    }

    #[test]
    fn images_counted_before_tables_across_pages() {
        let p0 = Page::new(0, "|a|b|\n![i0](i0)").with_image(ImageRef::new("i0", "A"));
        let p1 = Page::new(1, "![i1](i1)\n\n|c|d|").with_image(ImageRef::new("i1", "B"));
        let md = combine(&[source(vec![p0, p1])], false);
        let positions: Vec<usize> = ["**表1**", "**図1**", "**図2**", "**表2**"]
            .iter()
            .map(|m| md.find(m).unwrap_or_else(|| panic!("missing {m}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{md}");
    }

    #[test]
    fn trailing_whitespace_trimmed_once() {
        let s = source(vec![Page::new(0, "\n\n  lead"), Page::new(1, "tail  \n\n")]);
        let md = combine(&[s], false);
        assert!(md.starts_with("lead"));
        assert!(md.contains("tail  \n\n\n\n---"));
        assert!(md.ends_with("---"));
    }

    struct Numbered;

    impl ImageSink for Numbered {
        fn target(&mut self, figure: usize, _image: &ImageRef) -> Result<String, Ocr2MdError> {
            Ok(format!("images/figure_{figure:03}.jpg"))
        }
    }

    struct Failing;

    impl ImageSink for Failing {
        fn target(&mut self, figure: usize, image: &ImageRef) -> Result<String, Ocr2MdError> {
            Err(Ocr2MdError::ImageDecodeFailed {
                figure,
                id: image.id.clone(),
                detail: "bad".into(),
            })
        }
    }

    #[test]
    fn custom_sink_sets_target() {
        let page = Page::new(0, "![i](i)").with_image(ImageRef::new("i", "ignored"));
        let doc = combine_with(&[source(vec![page])], &AssemblyOptions::default(), &mut Numbered)
            .unwrap();
        assert!(doc.markdown.contains("![図1](images/figure_001.jpg)"));
    }

    #[test]
    fn sink_error_propagates() {
        let page = Page::new(0, "![i](i)").with_image(ImageRef::new("i", "x"));
        let err = combine_with(&[source(vec![page])], &AssemblyOptions::default(), &mut Failing)
            .unwrap_err();
        assert!(matches!(err, Ocr2MdError::ImageDecodeFailed { figure: 1, .. }));
    }

    #[test]
    fn inline_sink_matches_combine() {
        let page = Page::new(0, "![i](i)\n|a|b|").with_image(ImageRef::new("i", "P"));
        let sources = [source(vec![page])];
        let opts = AssemblyOptions::default();
        let via_sink = combine_with(&sources, &opts, &mut InlineImages).unwrap();
        assert_eq!(via_sink, combine_document(&sources, &opts));
    }

    #[test]
    fn filename_from_fixed_instant() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 1, 1, 14, 30, 0).unwrap();
        assert_eq!(suggest_filename(&now), "ocr_result_20260101_143000.md");
    }

    #[test]
    fn filename_is_zero_padded() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(suggest_filename(&now), "ocr_result_20260304_050607.md");
    }
}
