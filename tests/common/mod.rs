#![allow(dead_code)]

use bangla_pdf_ocr::config::Config;
use bangla_pdf_ocr::engine::{CommandOutput, CommandRunner, Invocation};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Stands in for `pdftoppm` and `tesseract`, dispatching on the program name.
#[derive(Default)]
pub struct StubTools {
    pub pages: usize,
    pub rasterizer_exit: i32,
    pub failing_pages: BTreeSet<usize>,
    pub panicking_pages: BTreeSet<usize>,
    /// Later pages finish first when set.
    pub reverse_completion: bool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub ocr_calls: AtomicUsize,
}

impl StubTools {
    pub fn pages(pages: usize) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    fn rasterize(&self, inv: &Invocation) -> io::Result<CommandOutput> {
        let args = inv.args_lossy();
        assert_eq!(args[0], "-png");
        let prefix = args.last().cloned().unwrap_or_default();
        let width = self.pages.to_string().len();
        for n in 1..=self.pages {
            std::fs::write(format!("{prefix}-{n:0width$}.png"), n.to_string())?;
        }
        if self.rasterizer_exit != 0 {
            return Ok(CommandOutput {
                stderr: b"Syntax Error: Couldn't read xref table".to_vec(),
                exit_code: Some(self.rasterizer_exit),
                ..Default::default()
            });
        }
        Ok(CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }

    fn recognize(&self, inv: &Invocation) -> io::Result<CommandOutput> {
        let args = inv.args_lossy();
        assert_eq!(&args[1..3], ["stdout", "-l"]);
        let page: usize = std::fs::read_to_string(&args[0])?.trim().parse().unwrap();
        self.ocr_calls.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.reverse_completion {
            let delay = (self.pages + 1 - page) as u64 * 5;
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_pages.contains(&page) {
            panic!("stub blew up on page {page}");
        }
        if self.failing_pages.contains(&page) {
            return Ok(CommandOutput {
                stderr: b"engine crash".to_vec(),
                exit_code: Some(1),
                ..Default::default()
            });
        }
        Ok(CommandOutput {
            stdout: format!("text of page {page} [{}]\n", args[3]).into_bytes(),
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

impl CommandRunner for StubTools {
    fn run(&self, program: &Path, inv: &Invocation) -> io::Result<CommandOutput> {
        match program.file_name().and_then(|n| n.to_str()) {
            Some("pdftoppm") => self.rasterize(inv),
            Some("tesseract") => self.recognize(inv),
            other => panic!("unexpected program {other:?}"),
        }
    }
}

/// Scratch directory with executable placeholders for both tools and a
/// config pointing at them.
pub struct Workspace {
    pub dir: TempDir,
    pub cfg: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        for name in ["pdftoppm", "tesseract"] {
            make_executable(&bin.join(name), "#!/bin/sh\nexit 0\n");
        }

        let mut cfg = Config::default();
        cfg.tools.rasterizer_path = Some(bin.display().to_string());
        cfg.tools.ocr_engine_path = Some(bin.join("tesseract").display().to_string());
        cfg.paths.work_dir = dir.path().join("work").display().to_string();
        Self { dir, cfg }
    }

    pub fn document(&self) -> PathBuf {
        let p = self.dir.path().join("Freedom Fight.pdf");
        std::fs::write(&p, b"%PDF-1.4\n").unwrap();
        p
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.cfg.paths.work_dir)
    }

    pub fn leftover_images(&self) -> usize {
        match std::fs::read_dir(self.work_dir()) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
                .count(),
            Err(_) => 0,
        }
    }
}

pub fn make_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Page numbers of the `--- Page N ---` headers, in order of appearance.
pub fn section_pages(text: &str) -> Vec<usize> {
    let re = regex::Regex::new(r"(?m)^--- Page (\d+) ---$").unwrap();
    re.captures_iter(text)
        .map(|c| c[1].parse().unwrap())
        .collect()
}
