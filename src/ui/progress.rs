//! Download progress with CI fallback

use super::context::UiContext;
use crate::release::ReleaseId;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress for one batch of release downloads.
///
/// Cheap to clone; every worker holds its own handle to the same bar.
#[derive(Clone)]
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    /// Start tracking `total` downloads from the source named `label`
    pub fn new(ctx: &UiContext, label: &str, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Downloading {} release(s) from {}", total, label);
            None
        };
        Self { bar }
    }

    /// A download has been picked up by a worker
    pub fn started(&self, release: &ReleaseId) {
        if let Some(ref bar) = self.bar {
            bar.set_message(release.to_string());
        }
    }

    /// A download completed and is in place under its final name
    pub fn finished(&self, release: &ReleaseId) {
        match self.bar {
            Some(ref bar) => bar.inc(1),
            None => println!("  {} {}", style("[OK]").green(), release),
        }
    }

    /// Clear the bar once the batch has drained
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
