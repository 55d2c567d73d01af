use std::time::Duration;

use crate::error::Error;
use crate::models::StarredRepo;

/// Side channel for progress display. Every method defaults to a no-op, and
/// nothing the engine does depends on what an observer does.
pub trait ProgressObserver: Send + Sync {
    /// A pipeline run is about to process `total` candidates.
    fn on_run_start(&self, _total: usize) {}

    /// A worker is starting on `repo`.
    fn on_start(&self, _repo: &StarredRepo) {}

    /// A worker is done with `repo`; `error` is set when it failed.
    fn on_finish(&self, _repo: &StarredRepo, _error: Option<&Error>) {}

    /// Callers are suspended until the rate-limit budget resets.
    fn on_rate_limited(&self, _wait: Duration) {}

    /// The budget was replenished and callers are running again.
    fn on_rate_limit_resumed(&self) {}
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}
