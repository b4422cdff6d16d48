use crate::error::PageError;
use std::path::PathBuf;
use std::time::Duration;

/// A rendered page on disk, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page: usize,
    pub path: PathBuf,
}

/// What OCR produced for one page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: usize,
    pub outcome: Result<String, PageError>,
    pub elapsed: Duration,
}

impl PageResult {
    pub fn failed(page: usize, error: PageError) -> Self {
        Self {
            page,
            outcome: Err(error),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// This page's section of the output document.
    pub fn render(&self) -> String {
        match &self.outcome {
            Ok(text) => format!("{}{text}", page_header(self.page)),
            Err(e) => format!("{}Error: {e}\n", page_header(self.page)),
        }
    }
}

pub fn page_header(page: usize) -> String {
    format!("\n--- Page {page} ---\n")
}

/// The assembled text of a whole document and where it was written.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub output_path: PathBuf,
    pub page_count: usize,
    pub failed_pages: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_text_and_errors() {
        let ok = PageResult {
            page: 1,
            outcome: Ok("hello".into()),
            elapsed: Duration::ZERO,
        };
        assert_eq!(ok.render(), "\n--- Page 1 ---\nhello");

        let bad = PageResult::failed(
            2,
            PageError::Failed {
                code: Some(1),
                stderr: "engine crash".into(),
            },
        );
        assert_eq!(bad.render(), "\n--- Page 2 ---\nError: engine crash\n");
    }
}
