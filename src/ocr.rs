use crate::{
    config::{Ocr, Postprocess},
    engine::{CommandRunner, Invocation},
    error::PageError,
    locate::ToolPath,
    page::{PageImage, PageResult},
    postprocess,
};
use std::ffi::OsString;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Runs the OCR engine on one page image.
#[derive(Debug, Clone)]
pub struct PageOcrWorker {
    engine: ToolPath,
    language: String,
    timeout: Option<Duration>,
    postprocess: Postprocess,
}

impl PageOcrWorker {
    pub fn new(engine: ToolPath, cfg: &Ocr, postprocess: &Postprocess) -> Self {
        let timeout = (cfg.page_timeout_seconds > 0)
            .then(|| Duration::from_secs(cfg.page_timeout_seconds));
        Self {
            engine,
            language: cfg.language.clone(),
            timeout,
            postprocess: postprocess.clone(),
        }
    }

    /// Same engine and settings, different language.
    pub fn with_language(&self, language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..self.clone()
        }
    }

    pub fn engine(&self) -> &ToolPath {
        &self.engine
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Recognize `image` and delete it. Failures come back inside the result.
    pub fn recognize(&self, runner: &dyn CommandRunner, image: PageImage) -> PageResult {
        let started = Instant::now();
        info!("processing page {}", image.page);

        let outcome = self.run_engine(runner, &image);

        if let Err(e) = std::fs::remove_file(&image.path) {
            debug!("could not remove {}: {e}", image.path.display());
        }

        if let Err(e) = &outcome {
            error!("error processing page {}: {e}", image.page);
        }

        PageResult {
            page: image.page,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    fn run_engine(
        &self,
        runner: &dyn CommandRunner,
        image: &PageImage,
    ) -> Result<String, PageError> {
        let mut invocation = Invocation::new([image.path.as_os_str().to_owned()])
            .with_timeout(self.timeout);
        invocation
            .args
            .extend(["stdout", "-l", self.language.as_str()].map(OsString::from));

        let output = runner
            .run(self.engine.path(), &invocation)
            .map_err(|e| PageError::Spawn(e.to_string()))?;

        if output.timed_out {
            return Err(PageError::TimedOut(
                self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            ));
        }
        if !output.success() {
            return Err(PageError::Failed {
                code: output.exit_code,
                stderr: output.stderr_text(),
            });
        }

        Ok(postprocess::clean_page_text(
            &self.postprocess,
            output.stdout_text(),
        ))
    }
}
