//! Document assembly through the public API, starting from OCR responses as
//! the service returns them.

use chrono::{FixedOffset, TimeZone};
use ocr2md::{
    add_table_numbers, combine, combine_document, combine_with, suggest_filename,
    AssemblyOptions, FigureTableCounter, FileImages, ImageRef, Ocr2MdError, Page, SourceResult,
};
use regex::Regex;

/// A two-page response: an image and a table on page 1, a table listed in
/// the table array on page 2.
const RESPONSE: &str = r##"{
  "pages": [
    {
      "index": 0,
      "markdown": "# Results\n\n![img-0.jpeg](img-0.jpeg)\n\n| k | v |\n|---|---|\n| a | 1 |\n\nDone.",
      "images": [
        {
          "id": "img-0.jpeg",
          "top_left_x": 10, "top_left_y": 20, "bottom_right_x": 110, "bottom_right_y": 220,
          "image_base64": "data:image/jpeg;base64,QUJD",
          "image_annotation": null
        }
      ],
      "tables": [],
      "dimensions": { "dpi": 200, "height": 2200, "width": 1700 }
    },
    {
      "index": 1,
      "markdown": "Summary only.",
      "images": [],
      "tables": [{ "id": "tbl-0" }]
    }
  ],
  "model": "mistral-ocr-2505-completion",
  "usage_info": { "pages_processed": 2, "doc_size_bytes": 31337 }
}"##;

fn bold_markers(md: &str, kind: char) -> Vec<usize> {
    let re = Regex::new(&format!(r"\*\*{kind}(\d+)\*\*")).unwrap();
    re.captures_iter(md)
        .map(|c| c[1].parse().unwrap())
        .collect()
}

fn page_with_image(id: &str, payload: &str) -> SourceResult {
    SourceResult {
        pages: vec![Page::new(0, format!("![{id}]({id})")).with_image(ImageRef::new(id, payload))],
        ..Default::default()
    }
}

#[test]
fn service_response_round_trip() {
    let source = SourceResult::from_json(RESPONSE).unwrap();
    assert_eq!(source.page_count(), 2);
    assert_eq!(source.pages[0].images[0].bottom_right_y, 220);

    let md = combine(&[source], true);
    let expected = "# Page 1\n\n\
                    # Results\n\n\
                    ![図1](data:image/jpeg;base64,QUJD)\n\n**図1**\n\n\
                    **表1**\n\n\
                    | k | v |\n|---|---|\n| a | 1 |\n\n\
                    Done.\n\n---\n\n\
                    # Page 2\n\n\
                    Summary only.\n\n---";
    assert_eq!(md, expected);
}

#[test]
fn marker_counts_match_images_and_tables() {
    let source = SourceResult::from_json(RESPONSE).unwrap();
    let sources = vec![source.clone(), source];

    let doc = combine_document(&sources, &AssemblyOptions::default());

    // Per source: 1 image; 1 detected block + 1 array entry.
    assert_eq!(bold_markers(&doc.markdown, '図'), vec![1, 2]);
    // Numbers reserved by the table array never appear in the text.
    assert_eq!(bold_markers(&doc.markdown, '表'), vec![1, 3]);
    assert_eq!(doc.figure_count, 2);
    assert_eq!(doc.table_count, 4);
    assert_eq!(doc.total_pages, 4);
}

#[test]
fn without_table_array_reservation_numbers_are_dense() {
    let source = SourceResult::from_json(RESPONSE).unwrap();
    let options = AssemblyOptions {
        reserve_table_array: false,
        ..AssemblyOptions::default()
    };
    let doc = combine_document(&[source.clone(), source], &options);
    assert_eq!(bold_markers(&doc.markdown, '表'), vec![1, 2]);
}

#[test]
fn identifier_with_metacharacters_matches_literally() {
    let id = "img-1.2(a)";
    let source = SourceResult {
        pages: vec![Page::new(
            0,
            format!("![{id}]({id}) and again ![{id}]({id}) but not ![img-1x2(a)](img-1x2(a))"),
        )
        .with_image(ImageRef::new(id, "P"))],
        ..Default::default()
    };

    let md = combine(&[source], false);
    assert_eq!(md.matches("![図1](P)\n\n**図1**").count(), 2);
    assert!(md.contains("![img-1x2(a)](img-1x2(a))"));
    assert!(!md.contains("![img-1.2(a)]"));
}

#[test]
fn plain_page_is_byte_identical_plus_separator() {
    let text = "Line one.\n\n  indented line\n- item";
    let source = SourceResult {
        pages: vec![Page::new(0, text), Page::new(1, "next")],
        ..Default::default()
    };
    let md = combine(&[source], false);
    assert_eq!(md, format!("{text}\n\n---\n\nnext\n\n---"));
}

#[test]
fn table_block_boundary() {
    let mut counter = FigureTableCounter::new();
    let out = add_table_numbers("a\n|x|y|\n|1|2|\nb", &mut counter);
    assert_eq!(out, "a\n**表1**\n\n|x|y|\n|1|2|\nb");
    assert_eq!(counter.table_count, 1);
}

#[test]
fn blank_line_separates_table_blocks() {
    let mut counter = FigureTableCounter::new();
    let out = add_table_numbers("|a|\n|1|\n\n|b|\n|2|", &mut counter);
    assert_eq!(out, "**表1**\n\n|a|\n|1|\n\n**表2**\n\n|b|\n|2|");
}

#[test]
fn figure_numbers_are_global_across_sources() {
    let sources = vec![
        page_with_image("img-0.jpeg", "first"),
        page_with_image("img-0.jpeg", "second"),
    ];
    let md = combine(&sources, false);

    let (one, two) = md.split_once("\n\n---\n\n").unwrap();
    assert_eq!(one, "![図1](first)\n\n**図1**");
    assert_eq!(two, "![図2](second)\n\n**図2**\n\n---");
}

#[test]
fn suggested_filename_for_fixed_instant() {
    let jst = FixedOffset::east_opt(9 * 3600).unwrap();
    let now = jst.with_ymd_and_hms(2026, 1, 1, 14, 30, 0).unwrap();
    assert_eq!(suggest_filename(&now), "ocr_result_20260101_143000.md");
}

#[test]
fn empty_input_is_empty_output() {
    assert_eq!(combine(&[], true), "");
    let doc = combine_document(&[], &AssemblyOptions::default());
    assert_eq!(doc.total_pages, 0);
    assert_eq!(doc.source_count, 0);
}

#[test]
fn page_without_markdown_is_rejected_at_parse_time() {
    let err = SourceResult::from_json(r#"{ "pages": [ { "index": 0, "images": [] } ] }"#)
        .unwrap_err();
    assert!(matches!(err, Ocr2MdError::MalformedSource { .. }));
}

#[test]
fn file_images_link_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let source = SourceResult::from_json(RESPONSE).unwrap();
    let mut sink = FileImages::new(dir.path());

    let doc = combine_with(&[source], &AssemblyOptions::default(), &mut sink).unwrap();

    assert!(doc
        .markdown
        .contains("![図1](images/figure_001.jpg)\n\n**図1**"));
    assert_eq!(
        std::fs::read(dir.path().join("images").join("figure_001.jpg")).unwrap(),
        b"ABC"
    );
}
