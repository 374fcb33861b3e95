// sampler-core/src/progress.rs

//! Best-effort progress reporting. Nothing here affects correctness.

use std::io::Write;

const BAR_WIDTH: usize = 60;

/// Receives `(epoch, fraction of batches done)` updates.
pub trait ProgressSink: Send {
    fn update(&mut self, epoch: u64, fraction: f64);

    /// Called once after the last batch of an epoch.
    fn finish_epoch(&mut self, _epoch: u64) {}
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _epoch: u64, _fraction: f64) {}
}

/// Draws a single-line progress bar, redrawn in place.
pub struct ConsoleProgress<W: Write + Send = std::io::Stderr> {
    out: W,
}

impl ConsoleProgress {
    /// A progress bar on standard error.
    pub fn stderr() -> Self {
        Self {
            out: std::io::stderr(),
        }
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ProgressSink for ConsoleProgress<W> {
    fn update(&mut self, epoch: u64, fraction: f64) {
        let line = render_bar(&format!(" Epoch {epoch}:"), fraction);
        // Progress output is best effort
        let _ = write!(self.out, "\r{line}");
        let _ = self.out.flush();
    }

    fn finish_epoch(&mut self, _epoch: u64) {
        let _ = writeln!(self.out);
    }
}

/// Renders `"<prefix> NNN% [----->    ]"` for a fraction in `0.0..=1.0`.
pub fn render_bar(prefix: &str, fraction: f64) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let percent = (fraction * 100.0) as u32;
    let filled = (fraction * BAR_WIDTH as f64) as usize;
    format!(
        "{prefix} {percent:>3}% [{}>{}]",
        "-".repeat(filled),
        " ".repeat(BAR_WIDTH - filled)
    )
}
