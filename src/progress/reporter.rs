//! Terminal progress for an extraction run
//!
//! A status spinner plus one byte bar. The bar's length is the archive size,
//! which is known up front; the total payload is not, since the stream is only
//! read once.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const STATUS_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const BYTES_TEMPLATE: &str =
    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})";

fn style(template: &str, fallback: ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or(fallback)
}

/// Progress reporter shared by the workers
pub struct ProgressReporter {
    multi: MultiProgress,
    bytes_bar: ProgressBar,
    status: ProgressBar,
    bytes_copied: AtomicU64,
    files_done: AtomicU64,
}

impl ProgressReporter {
    /// Create a reporter drawing to stderr
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(style(STATUS_TEMPLATE, ProgressStyle::default_spinner()));
        status.enable_steady_tick(Duration::from_millis(120));

        let bytes_bar = multi.add(ProgressBar::new(0));
        bytes_bar.set_style(
            style(BYTES_TEMPLATE, ProgressStyle::default_bar()).progress_chars("=> "),
        );
        bytes_bar.set_prefix("Data ");

        Self {
            multi,
            bytes_bar,
            status,
            bytes_copied: AtomicU64::new(0),
            files_done: AtomicU64::new(0),
        }
    }

    /// A reporter that counts but never draws
    #[cfg(test)]
    pub(crate) fn hidden() -> Self {
        let reporter = Self::new();
        reporter.status.disable_steady_tick();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set the byte bar's length
    pub fn set_total_bytes(&self, total: u64) {
        self.bytes_bar.set_length(total);
    }

    /// Count payload bytes written
    pub fn increment_bytes(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
        self.bytes_bar.inc(bytes);
    }

    /// Count one finished file and show it in the status line
    pub fn file_done(&self, path: &Path) {
        let done = self.files_done.fetch_add(1, Ordering::Relaxed) + 1;
        let display = path.display().to_string();
        // Keep the tail of long paths; cut on a char boundary.
        let shown = match display.char_indices().rev().nth(56) {
            Some((idx, _)) => format!("...{}", &display[idx..]),
            None => display,
        };
        self.status.set_message(format!("{} files  {}", done, shown));
    }

    /// Set the status line
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Finish with a success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.bytes_bar.finish();
    }

    /// Finish with an error message, leaving the bar where it stopped
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.bytes_bar.abandon();
    }

    /// Files finished so far
    pub fn files_done(&self) -> u64 {
        self.files_done.load(Ordering::Relaxed)
    }

    /// Payload bytes written so far
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied.load(Ordering::Relaxed)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_counts() {
        let reporter = ProgressReporter::hidden();

        reporter.set_total_bytes(1000);
        reporter.increment_bytes(250);
        reporter.file_done(Path::new("a/x.txt"));
        reporter.increment_bytes(250);
        reporter.file_done(Path::new("a/y.txt"));

        assert_eq!(reporter.bytes_copied(), 500);
        assert_eq!(reporter.files_done(), 2);
        reporter.finish_success("done");
    }

    #[test]
    fn test_long_unicode_path_does_not_panic() {
        let reporter = ProgressReporter::hidden();
        let long: String = "é".repeat(200);
        reporter.file_done(Path::new(&long));
        assert_eq!(reporter.files_done(), 1);
        reporter.finish_error("failed");
    }
}
