use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an explicit `tesseract` executable.
pub const ENV_TESSERACT_PATH: &str = "TESSERACT_PATH";
/// Environment variable naming the `pdftoppm` executable or its directory.
pub const ENV_POPPLER_PATH: &str = "POPPLER_PATH";
/// Environment variable overriding the OCR language code.
pub const ENV_OCR_LANGUAGE: &str = "OCR_LANGUAGE";

pub const DEFAULT_LANGUAGE: &str = "ben";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub rasterize: Rasterize,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Overlay the process environment onto this config.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from `lookup` (keyed by the `ENV_*` names). Empty values
    /// are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_TESSERACT_PATH) {
            self.tools.ocr_engine_path = Some(v);
        }
        if let Some(v) = get(ENV_POPPLER_PATH) {
            self.tools.rasterizer_path = Some(v);
        }
        if let Some(v) = get(ENV_OCR_LANGUAGE) {
            self.ocr.language = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub rasterizer: String,
    pub ocr_engine: String,
    /// Explicit rasterizer executable, or the directory containing it.
    pub rasterizer_path: Option<String>,
    pub ocr_engine_path: Option<String>,
    /// Searched after `PATH`, in order. A trailing `/**` searches the tree.
    pub search_dirs: Vec<String>,
    pub max_search_depth: usize,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            rasterizer: "pdftoppm".into(),
            ocr_engine: "tesseract".into(),
            rasterizer_path: None,
            ocr_engine_path: None,
            search_dirs: vec![
                "${ProgramFiles}/**".into(),
                "${ProgramFiles(x86)}/**".into(),
                "C:/Program Files/Tesseract-OCR".into(),
                "C:/Program Files/poppler/Library/bin".into(),
                "/usr/bin".into(),
                "/usr/local/bin".into(),
                "/opt/homebrew/bin".into(),
                "/opt/**".into(),
                "~/Downloads/**".into(),
            ],
            max_search_depth: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub language: String,
    /// Worker threads for page OCR; 0 means one per CPU.
    pub max_workers: usize,
    /// Kill a page's OCR process after this long; 0 disables the limit.
    pub page_timeout_seconds: u64,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.into(),
            max_workers: 0,
            page_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rasterize {
    /// Passed as `-r` when non-zero; otherwise the rasterizer's default.
    pub dpi: u32,
    pub image_prefix: String,
}
impl Default for Rasterize {
    fn default() -> Self {
        Self {
            dpi: 0,
            image_prefix: "temp_image".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Where page images are written while a run is in flight.
    pub work_dir: String,
    /// Used when the CLI is given no document.
    pub default_input: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".".into(),
            default_input: "data/Freedom Fight.pdf".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Postprocess {
    pub normalize_newlines: bool,
    pub normalize_unicode: bool,
    pub trim_trailing_whitespace: bool,
    pub strip_form_feeds: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub extension: String,
    pub write_report_json: bool,
    /// Page progress bar on stderr. Never drawn when stderr is not a terminal.
    pub progress: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            extension: "txt".into(),
            write_report_json: false,
            progress: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "bangla-pdf-ocr.log".into(),
        }
    }
}
