use crate::{
    config::Config,
    engine::CommandRunner,
    error::{PageError, PipelineError},
    locate::ExecutableLocator,
    ocr::PageOcrWorker,
    page::{ExtractedDocument, PageImage, PageResult},
    rasterize::Rasterizer,
    report::{PageReport, RunReport},
    util::{default_output_path, hash_file, now_rfc3339},
};
use indicatif::ProgressBar;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Rasterize a document, OCR every page in parallel, and write the text.
///
/// Tools are resolved once in [`Pipeline::new`]; after that only
/// rasterization or writing the output can fail a run. Page failures are
/// rendered inline.
pub struct Pipeline<R: CommandRunner> {
    cfg: Config,
    runner: R,
    rasterizer: Rasterizer,
    worker: PageOcrWorker,
    workers: usize,
    progress: Option<ProgressBar>,
}

impl<R: CommandRunner> Pipeline<R> {
    pub fn new(cfg: &Config, runner: R) -> Result<Self, PipelineError> {
        let locator = ExecutableLocator::from_config(&cfg.tools);
        Self::with_locator(cfg, &locator, runner)
    }

    pub fn with_locator(
        cfg: &Config,
        locator: &ExecutableLocator,
        runner: R,
    ) -> Result<Self, PipelineError> {
        let rasterizer_tool = locator.resolve_rasterizer(&cfg.tools)?;
        let engine_tool = locator.resolve_ocr_engine(&cfg.tools)?;
        info!(
            "rasterizer dir: {} engine: {}",
            rasterizer_tool.dir().display(),
            engine_tool.path().display()
        );

        let workers = match cfg.ocr.max_workers {
            0 => num_cpus::get(),
            n => n,
        };

        Ok(Self {
            rasterizer: Rasterizer::new(rasterizer_tool, &cfg.paths.work_dir, &cfg.rasterize),
            worker: PageOcrWorker::new(engine_tool, &cfg.ocr, &cfg.postprocess),
            cfg: cfg.clone(),
            runner,
            workers: workers.max(1),
            progress: None,
        })
    }

    /// Override the worker count; values below 1 are clamped to 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Advance `bar` once per finished page. Its length is reset per run.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn worker(&self) -> &PageOcrWorker {
        &self.worker
    }

    /// Run the whole document. `output` defaults to the document path with
    /// the configured extension; an existing file there is overwritten.
    /// `language` overrides the configured language for this run only.
    pub fn process(
        &self,
        document: &Path,
        output: Option<&Path>,
        language: Option<&str>,
    ) -> Result<ExtractedDocument, PipelineError> {
        let started_at = now_rfc3339();
        let started = Instant::now();
        let output_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(document, &self.cfg.output.extension));

        let worker = match language {
            Some(language) => Cow::Owned(self.worker.with_language(language)),
            None => Cow::Borrowed(&self.worker),
        };

        info!(
            "extracting text from {} (language {})",
            document.display(),
            worker.language()
        );
        let images = self.rasterizer.rasterize(&self.runner, document)?;
        let page_count = images.len();
        info!("dispatching {page_count} pages to {} workers", self.workers);

        let results = self.recognize_pages(&worker, images);
        let text = assemble(&results);
        let failed_pages: Vec<usize> = results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.page)
            .collect();
        if !failed_pages.is_empty() {
            warn!("{} of {page_count} pages failed: {failed_pages:?}", failed_pages.len());
        }

        write_text(&output_path, &text)?;
        info!(
            "text extracted and saved to {} ({} chars, {:.1?})",
            output_path.display(),
            text.chars().count(),
            started.elapsed()
        );

        if self.cfg.output.write_report_json {
            let report = RunReport {
                input: document.display().to_string(),
                input_sha256: hash_file(document).ok(),
                output: output_path.display().to_string(),
                language: worker.language().to_string(),
                workers: self.workers,
                page_count,
                failed_pages: failed_pages.clone(),
                started: started_at,
                finished: now_rfc3339(),
                pages: results.iter().map(PageReport::from).collect(),
            };
            write_report(&output_path, &report)?;
        }

        Ok(ExtractedDocument {
            text,
            output_path,
            page_count,
            failed_pages,
        })
    }

    /// OCR `images` on the worker pool. The result has one entry per image,
    /// in page order, whatever order the workers finish in.
    fn recognize_pages(
        &self,
        worker: &PageOcrWorker,
        images: Vec<PageImage>,
    ) -> Vec<PageResult> {
        let mut slots: Vec<Option<PageResult>> = (0..images.len()).map(|_| None).collect();
        debug_assert!(images.iter().enumerate().all(|(i, img)| img.page == i + 1));

        let progress = self.progress.clone().unwrap_or_else(ProgressBar::hidden);
        progress.set_length(images.len() as u64);
        progress.set_position(0);
        let progress = &progress;

        if !images.is_empty() {
            let threads = self.workers.min(images.len());
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("ocr-worker-{i}"))
                .build();
            match pool {
                Ok(pool) => pool.scope(|scope| {
                    // Each task owns exactly one slot.
                    for (slot, image) in slots.iter_mut().zip(images) {
                        scope.spawn(move |_| {
                            *slot = Some(self.recognize_guarded(worker, image));
                            progress.inc(1);
                        });
                    }
                }),
                Err(e) => {
                    warn!("cannot build worker pool ({e}); running pages sequentially");
                    for (slot, image) in slots.iter_mut().zip(images) {
                        *slot = Some(self.recognize_guarded(worker, image));
                        progress.inc(1);
                    }
                }
            }
        }

        progress.finish();

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    error!("page {} has no result", i + 1);
                    PageResult::failed(i + 1, PageError::Missing)
                })
            })
            .collect()
    }

    fn recognize_guarded(&self, worker: &PageOcrWorker, image: PageImage) -> PageResult {
        let page = image.page;
        let path = image.path.clone();
        panic::catch_unwind(AssertUnwindSafe(|| worker.recognize(&self.runner, image)))
            .unwrap_or_else(|payload| {
                let msg = panic_message(&*payload);
                error!("page {page} processing generated a panic: {msg}");
                let _ = std::fs::remove_file(&path);
                PageResult::failed(page, PageError::Panicked(msg))
            })
    }
}

/// Concatenate rendered pages in page order.
pub fn assemble(results: &[PageResult]) -> String {
    results.iter().map(PageResult::render).collect()
}

fn write_text(path: &Path, text: &str) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::io(format!("create {}", parent.display()), e))?;
    }
    std::fs::write(path, text)
        .map_err(|e| PipelineError::io(format!("write {}", path.display()), e))
}

fn write_report(output_path: &Path, report: &RunReport) -> Result<(), PipelineError> {
    let path: PathBuf = output_path.with_extension("report.json");
    let raw = serde_json::to_string_pretty(report)
        .map_err(|e| PipelineError::io("serialize report", std::io::Error::other(e)))?;
    write_text(&path, &raw)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
