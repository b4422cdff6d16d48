//! Terminal progress for page OCR, and a stderr writer for `tracing` that
//! keeps log lines from tearing the progress bar.

use std::io::{self, IsTerminal, Write};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Clone)]
pub struct Ui {
    multi_progress: MultiProgress,
}

impl Ui {
    /// Bars are drawn only when `show_progress` is set and stderr is a terminal.
    pub fn init(show_progress: bool) -> Ui {
        let ui = Ui {
            multi_progress: MultiProgress::new(),
        };
        if !show_progress || !io::stderr().is_terminal() {
            ui.hide_progress_bars();
        }
        ui
    }

    pub fn hide_progress_bars(&self) {
        self.multi_progress
            .set_draw_target(ProgressDrawTarget::hidden());
    }

    pub fn stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    /// Bar counting finished pages. The pipeline sets its length once the
    /// page count is known.
    pub fn page_progress(&self) -> ProgressBar {
        let pb = self
            .multi_progress
            .add(ProgressBar::new(0).with_style(page_progress_style()));
        pb.set_message("Processing pages");
        pb
    }
}

fn page_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:20} {pos:>4}/{len:4} {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Writes to stderr with progress bars suspended.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.multi_progress.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.multi_progress.suspend(|| io::stderr().flush())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui.multi_progress.suspend(|| io::stderr().write_all(buf))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bar_still_counts() {
        let ui = Ui::init(false);
        let pb = ui.page_progress();
        pb.set_length(3);
        pb.inc(1);
        pb.inc(1);
        assert_eq!(pb.position(), 2);
        assert_eq!(pb.length(), Some(3));
    }
}
