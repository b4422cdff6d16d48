#![cfg(unix)]

//! Runs the pipeline against shell scripts posing as the real tools.

mod common;

use bangla_pdf_ocr::{Pipeline, engine::SystemRunner};
use common::{Workspace, make_executable, section_pages};

const FAKE_PDFTOPPM: &str = r#"#!/bin/sh
# -png <pdf> <prefix>
prefix="$3"
for n in 1 2 3; do printf '%s' "$n" > "$prefix-$n.png"; done
"#;

const FAKE_TESSERACT: &str = r#"#!/bin/sh
# <image> stdout -l <lang>
page=$(cat "$1")
case "$page" in
  2) echo "engine crash" >&2; exit 1 ;;
  3) if [ -n "$SLOW_PAGE" ]; then exec sleep 5; fi ;;
esac
printf 'পৃষ্ঠা %s (%s)\n' "$page" "$4"
"#;

fn workspace() -> Workspace {
    let ws = Workspace::new();
    let bin = ws.dir.path().join("bin");
    make_executable(&bin.join("pdftoppm"), FAKE_PDFTOPPM);
    make_executable(&bin.join("tesseract"), FAKE_TESSERACT);
    ws
}

#[test]
fn real_processes_produce_ordered_text() {
    let ws = workspace();
    let pipeline = Pipeline::new(&ws.cfg, SystemRunner).unwrap();

    let doc = pipeline.process(&ws.document(), None, None).unwrap();

    assert_eq!(
        doc.text,
        "\n--- Page 1 ---\nপৃষ্ঠা 1 (ben)\n\
         \n--- Page 2 ---\nError: engine crash\n\
         \n--- Page 3 ---\nপৃষ্ঠা 3 (ben)\n"
    );
    assert_eq!(ws.leftover_images(), 0);
}

#[test]
fn hung_page_is_killed_after_timeout() {
    let mut ws = workspace();
    ws.cfg.ocr.page_timeout_seconds = 1;
    // The tesseract stub sleeps on page 3 only when this is set.
    let bin = ws.dir.path().join("bin");
    let slow = FAKE_TESSERACT.replace("\"$SLOW_PAGE\"", "\"yes\"");
    make_executable(&bin.join("tesseract"), &slow);
    let pipeline = Pipeline::new(&ws.cfg, SystemRunner).unwrap();

    let doc = pipeline.process(&ws.document(), None, None).unwrap();

    assert_eq!(section_pages(&doc.text), vec![1, 2, 3]);
    assert!(doc.text.contains("--- Page 3 ---\nError: OCR engine timed out after 1s"));
    assert_eq!(doc.failed_pages, vec![2, 3]);
    assert_eq!(ws.leftover_images(), 0);
}
