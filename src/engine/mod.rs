pub mod process;
pub mod types;

use std::io;
use std::path::Path;

pub use process::SystemRunner;
pub use types::{CommandOutput, Invocation};

/// Runs an external program to completion and captures its output.
///
/// The pipeline never spawns processes directly; everything goes through this
/// trait so the rasterizer and OCR engine can be swapped for stubs.
pub trait CommandRunner: Send + Sync {
    /// `Err` only when the process could not be started or waited on. A
    /// non-zero exit is a successful run with a failing [`CommandOutput`].
    fn run(&self, program: &Path, invocation: &Invocation) -> io::Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &Path, invocation: &Invocation) -> io::Result<CommandOutput> {
        (**self).run(program, invocation)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(&self, program: &Path, invocation: &Invocation) -> io::Result<CommandOutput> {
        (**self).run(program, invocation)
    }
}
