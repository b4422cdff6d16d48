use crate::{
    config::{ENV_POPPLER_PATH, ENV_TESSERACT_PATH, Tools},
    error::PipelineError,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Absolute path to an executable that existed when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath(PathBuf);

impl ToolPath {
    fn probe(path: &Path) -> Option<Self> {
        if !is_executable(path) {
            return None;
        }
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Some(Self(abs))
    }

    #[cfg(test)]
    pub(crate) fn probe_for_tests(path: &str) -> Self {
        Self(PathBuf::from(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Directory holding the executable.
    pub fn dir(&self) -> &Path {
        self.0.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[derive(Debug, Clone)]
struct SearchDir {
    path: PathBuf,
    recursive: bool,
}

/// Finds external tools: explicit override, then `PATH`, then the configured
/// fallback directories. First match wins.
#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    search_path: Option<OsString>,
    fallback_dirs: Vec<SearchDir>,
    max_depth: usize,
}

impl ExecutableLocator {
    pub fn from_config(tools: &Tools) -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            fallback_dirs: tools
                .search_dirs
                .iter()
                .filter_map(|raw| parse_search_dir(raw))
                .collect(),
            max_depth: tools.max_search_depth,
        }
    }

    /// Replace the `PATH` value that is scanned.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn resolve_rasterizer(&self, tools: &Tools) -> Result<ToolPath, PipelineError> {
        self.resolve(
            &tools.rasterizer,
            tools.rasterizer_path.as_deref(),
            ENV_POPPLER_PATH,
        )
    }

    pub fn resolve_ocr_engine(&self, tools: &Tools) -> Result<ToolPath, PipelineError> {
        self.resolve(
            &tools.ocr_engine,
            tools.ocr_engine_path.as_deref(),
            ENV_TESSERACT_PATH,
        )
    }

    /// Resolve `name`. An override is authoritative: when it is set and does
    /// not lead to an executable, nothing else is searched.
    pub fn resolve(
        &self,
        name: &str,
        override_path: Option<&str>,
        hint: &str,
    ) -> Result<ToolPath, PipelineError> {
        let file_name = executable_name(name);

        if let Some(raw) = override_path {
            let mut path = expand_home(raw);
            if path.is_dir() {
                path = path.join(&file_name);
            }
            return match ToolPath::probe(&path) {
                Some(tool) => {
                    info!("{name} (override): {}", tool.path().display());
                    Ok(tool)
                }
                None => Err(PipelineError::ToolOverrideInvalid {
                    name: name.to_string(),
                    path,
                }),
            };
        }

        match self.find(&file_name) {
            Some(tool) => {
                info!("{name}: {}", tool.path().display());
                Ok(tool)
            }
            None => {
                warn!("{name} not found");
                Err(PipelineError::ToolNotFound {
                    name: name.to_string(),
                    hint: hint.to_string(),
                })
            }
        }
    }

    fn find(&self, file_name: &str) -> Option<ToolPath> {
        if let Some(search_path) = &self.search_path {
            for dir in std::env::split_paths(search_path) {
                if let Some(tool) = ToolPath::probe(&dir.join(file_name)) {
                    return Some(tool);
                }
            }
        }

        for dir in &self.fallback_dirs {
            let depth = if dir.recursive { self.max_depth } else { 0 };
            if let Some(tool) = find_in_tree(&dir.path, file_name, depth) {
                return Some(tool);
            }
        }
        None
    }
}

fn find_in_tree(dir: &Path, file_name: &str, depth: usize) -> Option<ToolPath> {
    if let Some(tool) = ToolPath::probe(&dir.join(file_name)) {
        return Some(tool);
    }
    if depth == 0 {
        return None;
    }
    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    children.sort();
    children
        .iter()
        .find_map(|child| find_in_tree(child, file_name, depth - 1))
}

fn parse_search_dir(raw: &str) -> Option<SearchDir> {
    let (raw, recursive) = match raw.strip_suffix("/**") {
        Some(stripped) => (stripped, true),
        None => (raw, false),
    };
    let path = expand_vars(raw)?;
    Some(SearchDir {
        path: expand_home(&path),
        recursive,
    })
}

/// Expand `${NAME}` references. Entries naming an unset variable are dropped.
fn expand_vars(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        out.push_str(&std::env::var(&after[..end]).ok()?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.to_ascii_lowercase().ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn tessdata_roots(engine: &ToolPath) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(prefix) = std::env::var_os("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        roots.push(prefix.join("tessdata"));
        roots.push(prefix);
    }
    roots.push(engine.dir().join("tessdata"));
    roots.push(engine.dir().join("../share/tessdata"));
    roots.push(PathBuf::from("/usr/share/tesseract-ocr/5/tessdata"));
    roots.push(PathBuf::from("/usr/share/tesseract-ocr/4.00/tessdata"));
    roots.push(PathBuf::from("/usr/share/tessdata"));
    roots.push(PathBuf::from("/usr/local/share/tessdata"));
    roots.push(PathBuf::from("/opt/homebrew/share/tessdata"));
    if let Some(home) = home_dir() {
        roots.push(home.join(".local/share/tessdata"));
    }
    roots
}

fn find_in_roots(roots: &[PathBuf], file: &str) -> Option<PathBuf> {
    roots.iter().map(|r| r.join(file)).find(|p| p.is_file())
}

/// Where `<lang>.traineddata` was found for each component of a language
/// code such as `ben+eng`; `None` when a component is missing.
pub fn find_traineddata(language: &str, engine: &ToolPath) -> Vec<(String, Option<PathBuf>)> {
    let roots = tessdata_roots(engine);
    language
        .split('+')
        .filter(|l| !l.is_empty())
        .map(|lang| {
            let found = find_in_roots(&roots, &format!("{lang}.traineddata"));
            (lang.to_string(), found)
        })
        .collect()
}

/// Script model (`script/<Script>.traineddata`) for each component of a
/// language code whose script is known. Windows installers ship Bengali this
/// way, alongside or instead of `ben.traineddata`.
pub fn find_script_traineddata(
    language: &str,
    engine: &ToolPath,
) -> Vec<(String, Option<PathBuf>)> {
    let roots = tessdata_roots(engine);
    let mut scripts: Vec<&str> = language
        .split('+')
        .filter_map(script_for_language)
        .collect();
    scripts.dedup();
    scripts
        .into_iter()
        .map(|script| {
            let found = find_in_roots(&roots, &format!("script/{script}.traineddata"));
            (script.to_string(), found)
        })
        .collect()
}

fn script_for_language(lang: &str) -> Option<&'static str> {
    match lang {
        "ben" | "asm" => Some("Bengali"),
        "hin" | "mar" | "nep" | "san" => Some("Devanagari"),
        "eng" => Some("Latin"),
        _ => None,
    }
}
