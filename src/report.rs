use crate::page::PageResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: String,
    pub input_sha256: Option<String>,
    pub output: String,
    pub language: String,
    pub workers: usize,
    pub page_count: usize,
    pub failed_pages: Vec<usize>,
    pub started: String,
    pub finished: String,
    pub pages: Vec<PageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub page: usize,
    pub ok: bool,
    pub chars: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PageResult> for PageReport {
    fn from(r: &PageResult) -> Self {
        let (chars, error) = match &r.outcome {
            Ok(text) => (text.chars().count(), None),
            Err(e) => (0, Some(e.to_string())),
        };
        Self {
            page: r.page,
            ok: r.is_ok(),
            chars,
            elapsed_ms: r.elapsed.as_millis() as u64,
            error,
        }
    }
}
