//! Progress reporting infrastructure

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;

/// CLI progress report of ongoing operations
///
/// To avoid corrupted terminal output, you should not write anything to stdout
/// or stderr yourself as long as a report is being displayed. Please use logs
/// for debug messages, and [`ProgressTracker::println`] for user diagnostics.
#[derive(Clone, Debug, Default)]
pub struct ProgressReport(MultiProgress);
//
impl ProgressReport {
    /// Prepare to report progress on the cli
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that draws nothing, e.g. when output is not a terminal
    pub fn hidden() -> Self {
        Self(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    /// Prepare to report on a new operation
    pub fn add(
        &self,
        what: impl Into<Cow<'static, str>>,
        config: ProgressConfig,
    ) -> ProgressTracker {
        let ProgressConfig { words } = config;
        let bar = ProgressBar::new(words as u64).with_prefix(what);
        let bar = bar.with_style(
            ProgressStyle::with_template(
                "{prefix} {wide_bar} {pos}/{len} words (~{eta} left) {msg}",
            )
            .expect("the style above should be a valid indicatif style"),
        );
        ProgressTracker {
            bar: self.0.add(bar),
            report: self.0.clone(),
        }
    }
}

/// Progress bar configuration
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ProgressConfig {
    /// Number of words to be fetched
    words: usize,
}
//
impl ProgressConfig {
    /// Configuration for some number of words
    pub fn words(words: usize) -> Self {
        Self { words }
    }
}

/// Mechanism to track progress
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    /// Progress bar for this specific process
    bar: ProgressBar,

    /// Underlying process report
    report: MultiProgress,
}
//
impl ProgressTracker {
    /// Mark work that was already done before tracking started
    pub fn skip(&self, done: u64) {
        self.bar.inc(done);
        self.bar.reset_eta();
    }

    /// Show that a certain amount of progress has been made
    pub fn make_progress(&self, progress: u64) {
        self.bar.inc(progress);
        let max = self.bar.length().unwrap_or(0);
        assert!(
            self.bar.position() <= max,
            "recorded more progress than expected"
        );
    }

    /// Describe what is currently happening
    pub fn set_message(&self, message: impl Into<Cow<'static, str>>) {
        self.bar.set_message(message);
    }

    /// Print a user-facing line above the progress bars
    ///
    /// Goes straight to stderr when progress bars are not displayed.
    pub fn println(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else if self.report.println(line).is_err() {
            log::warn!("Failed to print diagnostic: {line}");
        }
    }

    /// Remove the progress bar from the display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.report.remove(&self.bar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_skipped_and_new_work() {
        let report = ProgressReport::hidden();
        let tracker = report.add("Fetching", ProgressConfig::words(10));
        tracker.skip(4);
        tracker.make_progress(3);
        assert_eq!(tracker.bar.position(), 7);
        tracker.set_message("batch 3/4");
        tracker.make_progress(3);
        assert_eq!(tracker.bar.position(), 10);
        tracker.finish();
    }

    #[test]
    #[should_panic(expected = "recorded more progress than expected")]
    fn rejects_excess_progress() {
        let tracker = ProgressReport::hidden().add("Fetching", ProgressConfig::words(2));
        tracker.make_progress(3);
    }
}
