pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod locate;
pub mod ocr;
pub mod page;
pub mod pipeline;
pub mod postprocess;
pub mod rasterize;
pub mod report;
pub mod ui;
pub mod util;

pub use error::{PageError, PipelineError};
pub use pipeline::Pipeline;
