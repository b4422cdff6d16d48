use crate::{
    config::Config,
    engine::SystemRunner,
    error::PipelineError,
    locate::{ExecutableLocator, ToolPath, find_script_traineddata, find_traineddata},
    pipeline::Pipeline,
    ui::Ui,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_FILE: &str = "bangla-pdf-ocr.toml";

#[derive(Parser, Debug)]
#[command(name = "bangla-pdf-ocr", version)]
#[command(about = "Extract text from scanned PDFs using pdftoppm and tesseract")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Path to config TOML. If omitted, uses ./bangla-pdf-ocr.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// PDF to extract. Defaults to `paths.default_input` from the config.
    pub pdf: Option<PathBuf>,

    /// Where to write the text (default: the PDF path with a .txt extension).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tesseract language code, e.g. `ben` or `ben+eng`.
    #[arg(short, long)]
    pub language: Option<String>,

    /// Number of pages to OCR at once (default: one per CPU).
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract text from a PDF (the default when no subcommand is given).
    Run(RunArgs),
    /// Check that the external tools and language data can be found.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let loaded = load_config(args.config.as_deref());
    let cfg = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => Config::default(),
    };
    let ui = Ui::init(cfg.output.progress);
    let _guard = init_logging(&args, &cfg, &ui)?;
    let mut cfg = loaded?;
    cfg.apply_env();

    match &args.cmd {
        Some(Command::Doctor {}) => doctor(&cfg),
        Some(Command::Run(run_args)) => run(cfg, run_args, &ui),
        None => run(cfg, &args.run, &ui),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config, ui: &Ui) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(ui.stderr_writer())
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(ui.stderr_writer())
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if cfg.logging.write_to_file {
        let path = Path::new(&cfg.logging.file_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn run(mut cfg: Config, args: &RunArgs, ui: &Ui) -> Result<()> {
    if let Some(jobs) = args.jobs {
        cfg.ocr.max_workers = jobs;
    }

    let input = match &args.pdf {
        Some(p) => p.clone(),
        None => {
            let p = PathBuf::from(&cfg.paths.default_input);
            info!("no PDF given; using default {}", p.display());
            p
        }
    };
    validate_input(&input)?;

    let pipeline = Pipeline::new(&cfg, SystemRunner)?.with_progress(ui.page_progress());
    let language = args.language.as_deref().unwrap_or(&cfg.ocr.language);
    info!("language={language} workers={}", pipeline.workers());
    warn_missing_traineddata(&pipeline, language);

    let doc = pipeline
        .process(&input, args.output.as_deref(), args.language.as_deref())
        .with_context(|| format!("extracting {}", input.display()))?;

    info!(
        "extraction complete: {} pages ({} failed), {} characters -> {}",
        doc.page_count,
        doc.failed_pages.len(),
        doc.text.chars().count(),
        doc.output_path.display()
    );
    Ok(())
}

fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case("pdf") {
            warn!("input does not look like a PDF: {}", input.display());
        }
    } else {
        warn!("input has no extension; assuming PDF: {}", input.display());
    }

    Ok(())
}

fn warn_missing_traineddata(pipeline: &Pipeline<SystemRunner>, language: &str) {
    for (lang, found) in find_traineddata(language, pipeline.worker().engine()) {
        if found.is_none() {
            warn!("{lang}.traineddata not found in the usual locations; OCR may fail");
        }
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    let locator = ExecutableLocator::from_config(&cfg.tools);
    let rasterizer = locator.resolve_rasterizer(&cfg.tools);
    let engine = locator.resolve_ocr_engine(&cfg.tools);

    let (languages, scripts): (Vec<serde_json::Value>, Vec<serde_json::Value>) = match &engine {
        Ok(tool) => (
            find_traineddata(&cfg.ocr.language, tool)
                .into_iter()
                .map(|(lang, path)| serde_json::json!({ "language": lang, "traineddata": path }))
                .collect(),
            find_script_traineddata(&cfg.ocr.language, tool)
                .into_iter()
                .map(|(script, path)| serde_json::json!({ "script": script, "traineddata": path }))
                .collect(),
        ),
        Err(_) => (Vec::new(), Vec::new()),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "rasterizer": tool_status(&rasterizer),
            "ocr_engine": tool_status(&engine),
            "language": cfg.ocr.language,
            "traineddata": languages,
            "script_traineddata": scripts,
        }))?
    );

    match (rasterizer, engine) {
        (Ok(_), Ok(_)) => Ok(()),
        _ => Err(anyhow!("required tools are missing")),
    }
}

fn tool_status(res: &Result<ToolPath, PipelineError>) -> serde_json::Value {
    match res {
        Ok(tool) => serde_json::json!({ "ok": true, "path": tool.path() }),
        Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
    }
}
