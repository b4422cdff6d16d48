use crate::{
    config::Rasterize,
    engine::{CommandRunner, Invocation},
    error::PipelineError,
    locate::ToolPath,
    page::PageImage,
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Renders a PDF to one PNG per page with a single rasterizer call.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    tool: ToolPath,
    work_dir: PathBuf,
    dpi: u32,
    image_prefix: String,
}

impl Rasterizer {
    pub fn new(tool: ToolPath, work_dir: impl Into<PathBuf>, cfg: &Rasterize) -> Self {
        Self {
            tool,
            work_dir: work_dir.into(),
            dpi: cfg.dpi,
            image_prefix: cfg.image_prefix.clone(),
        }
    }

    /// Page images in page order. Images left behind by a failed run are
    /// removed before the error is returned.
    pub fn rasterize(
        &self,
        runner: &dyn CommandRunner,
        document: &Path,
    ) -> Result<Vec<PageImage>, PipelineError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            PipelineError::io(format!("create work dir {}", self.work_dir.display()), e)
        })?;

        let prefix = unique_prefix(&self.image_prefix);
        let mut args = vec!["-png".to_string()];
        if self.dpi > 0 {
            args.push("-r".to_string());
            args.push(self.dpi.to_string());
        }
        let mut invocation = Invocation::new(args);
        invocation.args.push(document.as_os_str().to_owned());
        invocation.args.push(self.work_dir.join(&prefix).into_os_string());

        info!(
            "rasterizing {} with {}",
            document.display(),
            self.tool.path().display()
        );
        let output = runner
            .run(self.tool.path(), &invocation)
            .map_err(|source| PipelineError::Spawn {
                program: self.tool.path().to_path_buf(),
                source,
            })?;

        if !output.success() {
            let stderr = output.stderr_text();
            error!("rasterizer stderr: {}", stderr.trim());
            for image in self.collect(&prefix)? {
                let _ = std::fs::remove_file(&image.path);
            }
            return Err(PipelineError::Rasterization {
                code: output.exit_code,
                stderr,
            });
        }

        let images = self.collect(&prefix)?;
        debug!("rasterizer produced {} page images", images.len());
        Ok(images)
    }

    fn collect(&self, prefix: &str) -> Result<Vec<PageImage>, PipelineError> {
        let pattern = Regex::new(&format!(r"^{}-(\d+)\.png$", regex::escape(prefix)))
            .map_err(|e| PipelineError::io("image pattern", std::io::Error::other(e)))?;
        let entries = std::fs::read_dir(&self.work_dir).map_err(|e| {
            PipelineError::io(format!("list work dir {}", self.work_dir.display()), e)
        })?;

        let mut found: Vec<(u64, String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let number = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
                Some((number, name, e.path()))
            })
            .collect();
        found.sort();

        Ok(found
            .into_iter()
            .enumerate()
            .map(|(i, (_, _, path))| PageImage { page: i + 1, path })
            .collect())
    }
}

fn unique_prefix(stem: &str) -> String {
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{stem}_{}_{seq}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CommandOutput;
    use std::io;

    /// Writes `pages` images (deliberately out of order) and exits with `code`.
    struct FakePdftoppm {
        pages: usize,
        code: i32,
    }

    impl CommandRunner for FakePdftoppm {
        fn run(&self, _program: &Path, inv: &Invocation) -> io::Result<CommandOutput> {
            let prefix = inv.args.last().unwrap().to_string_lossy().into_owned();
            for n in (1..=self.pages).rev() {
                std::fs::write(format!("{prefix}-{n:02}.png"), b"png")?;
            }
            Ok(CommandOutput {
                stderr: b"bad xref".to_vec(),
                exit_code: Some(self.code),
                ..Default::default()
            })
        }
    }

    fn rasterizer(dir: &Path) -> Rasterizer {
        Rasterizer::new(
            ToolPath::probe_for_tests("/usr/bin/pdftoppm"),
            dir,
            &Rasterize::default(),
        )
    }

    #[test]
    fn images_are_numbered_in_page_order() {
        let tmp = tempfile::tempdir().unwrap();
        // stray file from another run must be ignored
        std::fs::write(tmp.path().join("temp_image_other-01.png"), b"x").unwrap();

        let r = rasterizer(tmp.path());
        let images = r
            .rasterize(&FakePdftoppm { pages: 12, code: 0 }, Path::new("doc.pdf"))
            .unwrap();

        assert_eq!(images.len(), 12);
        for (i, img) in images.iter().enumerate() {
            assert_eq!(img.page, i + 1);
            let name = img.path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.ends_with(&format!("-{:02}.png", i + 1)), "{name}");
        }
    }

    #[test]
    fn failure_reports_stderr_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let r = rasterizer(tmp.path());
        let err = r
            .rasterize(&FakePdftoppm { pages: 2, code: 1 }, Path::new("doc.pdf"))
            .unwrap_err();

        match err {
            PipelineError::Rasterization { code, stderr } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "bad xref");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn prefixes_are_unique_within_a_process() {
        assert_ne!(unique_prefix("p"), unique_prefix("p"));
    }
}
