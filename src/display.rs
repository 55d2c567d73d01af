//! Terminal progress for sync runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::error::Error;
use crate::models::StarredRepo;
use crate::sync::ProgressObserver;

/// Drives an indicatif bar from pipeline events.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_run_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        if total > 0 {
            self.bar.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn on_start(&self, repo: &StarredRepo) {
        self.bar.set_message(repo.full_name.clone());
    }

    fn on_finish(&self, repo: &StarredRepo, error: Option<&Error>) {
        if let Some(e) = error {
            self.bar.println(format!("  failed {}: {e}", repo.full_name));
        }
        self.bar.inc(1);
    }

    fn on_rate_limited(&self, wait: Duration) {
        self.bar
            .println(format!("Rate limit reached, waiting {}s for reset...", wait.as_secs()));
        self.bar.set_message("waiting for rate limit reset");
    }

    fn on_rate_limit_resumed(&self) {
        self.bar.println("Rate limit reset, resuming");
    }
}
