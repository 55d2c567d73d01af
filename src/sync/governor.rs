use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::progress::{NoopObserver, ProgressObserver};
use crate::error::{Error, Result};
use crate::github::{RateSnapshot, Sourced};

/// GitHub's core budget resets hourly.
const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Extra wait past a server-reported reset. Covers clock skew and the
/// whole-second rounding of `X-RateLimit-Reset`.
const DEFAULT_RESET_BUFFER: Duration = Duration::from_secs(5);

/// Remaining remote calls and when the count resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateBudget {
    /// A full budget of `limit` calls resetting after `window`.
    pub fn full(limit: u32, window: Duration) -> Self {
        Self {
            remaining: limit,
            limit,
            reset_at: Utc::now() + to_chrono(window),
        }
    }

    /// Time left until the reset, zero once it has passed.
    pub fn resets_in(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl From<RateSnapshot> for RateBudget {
    fn from(snapshot: RateSnapshot) -> Self {
        Self {
            remaining: snapshot.remaining,
            limit: snapshot.limit,
            reset_at: snapshot.reset_at,
        }
    }
}

struct GovernorState {
    budget: RateBudget,
    /// Set once the current exhaustion has been reported
    wait_reported: bool,
    /// The server refused a call; the budget stays closed until a response
    /// shows it has reopened
    refused: bool,
}

enum Admission {
    Granted,
    Wait(Duration),
}

/// Shares one request budget between every concurrent caller of the remote
/// source.
///
/// The check and the decrement happen under one lock, so concurrent workers
/// cannot overshoot. Waiting happens outside the lock.
pub struct RateLimitGovernor {
    state: Mutex<GovernorState>,
    reserve: u32,
    window: Duration,
    reset_buffer: Duration,
    observer: Arc<dyn ProgressObserver>,
}

impl RateLimitGovernor {
    /// `reserve` calls are held back; once `remaining` falls to it, callers
    /// wait for the reset.
    pub fn new(budget: RateBudget, reserve: u32) -> Self {
        Self {
            state: Mutex::new(GovernorState {
                budget,
                wait_reported: false,
                refused: false,
            }),
            reserve,
            window: DEFAULT_WINDOW,
            reset_buffer: DEFAULT_RESET_BUFFER,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Length of the window assumed after a reset we did not hear about.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Margin added to every server-reported reset time.
    pub fn with_reset_buffer(mut self, buffer: Duration) -> Self {
        self.reset_buffer = buffer;
        self
    }

    pub fn snapshot(&self) -> RateBudget {
        self.state.lock().budget
    }

    /// Take one call from the budget, waiting for the reset if it is spent.
    pub async fn acquire(&self) {
        loop {
            match self.try_admit(Utc::now()) {
                Admission::Granted => return,
                Admission::Wait(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    fn try_admit(&self, now: DateTime<Utc>) -> Admission {
        let mut state = self.state.lock();

        if state.budget.remaining <= self.reserve && now >= state.budget.reset_at {
            if state.refused {
                // A single trial call; its response decides the real budget
                state.budget.remaining = self.reserve + 1;
                state.budget.reset_at = now + to_chrono(self.reset_buffer);
                tracing::info!("Rate limit deadline passed, retrying one request");
            } else {
                state.budget.remaining = state.budget.limit;
                state.budget.reset_at = now + to_chrono(self.window);
                tracing::info!(
                    "Rate limit reset, resuming with {} requests",
                    state.budget.remaining
                );
            }
            state.wait_reported = false;
            self.observer.on_rate_limit_resumed();
        }

        if state.budget.remaining > self.reserve {
            state.budget.remaining -= 1;
            return Admission::Granted;
        }

        let wait = state.budget.resets_in(now);
        if !state.wait_reported {
            state.wait_reported = true;
            tracing::warn!("Rate limit reached, waiting {}s until reset", wait.as_secs());
            self.observer.on_rate_limited(wait);
        }
        Admission::Wait(wait)
    }

    /// Fold the budget a response reported into the shared state. Within
    /// the current window the count only goes down; a later reset starts a
    /// new window.
    pub fn observe(&self, snapshot: RateSnapshot) {
        let mut state = self.state.lock();
        if state.refused {
            state.refused = false;
            state.budget = snapshot.into();
        } else if snapshot.reset_at > state.budget.reset_at {
            state.budget = snapshot.into();
        } else {
            state.budget.remaining = state.budget.remaining.min(snapshot.remaining);
            state.budget.limit = snapshot.limit;
        }
    }

    /// The source refused a call for rate-limit reasons: nothing is left
    /// until `reset_at` plus the reset buffer. A deadline already in the past
    /// counts from now.
    pub fn exhausted(&self, reset_at: DateTime<Utc>) {
        let now = Utc::now();
        let mut state = self.state.lock();
        state.budget.remaining = 0;
        state.budget.reset_at = reset_at.max(now) + to_chrono(self.reset_buffer);
        state.refused = true;
    }

    /// A call went through without reporting a budget. After a refusal that
    /// is the only sign the window reopened.
    fn accepted(&self) {
        let mut state = self.state.lock();
        if state.refused {
            state.refused = false;
            state.budget.remaining = state.budget.limit.saturating_sub(1);
            state.budget.reset_at = Utc::now() + to_chrono(self.window);
        }
    }

    /// Run one remote request under the budget. Rate-limit refusals are
    /// retried after the reset; every other error is returned unchanged.
    pub async fn call<T, F, Fut>(&self, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Sourced<T>>>,
    {
        loop {
            self.acquire().await;
            match request().await {
                Ok(Sourced { value, budget }) => {
                    match budget {
                        Some(snapshot) => self.observe(snapshot),
                        None => self.accepted(),
                    }
                    return Ok(value);
                }
                Err(Error::RateLimited { reset_at }) => {
                    tracing::debug!("Request refused by rate limit, retrying after {reset_at}");
                    self.exhausted(reset_at);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
