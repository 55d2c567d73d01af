//! The remote side: starred repositories and their READMEs.

pub mod client;
pub mod readme;

pub use client::GitHubClient;
pub use readme::{ReadmeFile, ReadmeVariant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::StarredRepo;

/// Request budget reported alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

/// A response value plus the budget the server reported with it, if any.
#[derive(Debug, Clone)]
pub struct Sourced<T> {
    pub value: T,
    pub budget: Option<RateSnapshot>,
}

impl<T> Sourced<T> {
    pub fn new(value: T, budget: Option<RateSnapshot>) -> Self {
        Self { value, budget }
    }

    /// A value with no budget information attached.
    pub fn bare(value: T) -> Self {
        Self::new(value, None)
    }
}

/// One page of the starred-repository listing.
#[derive(Debug, Clone, Default)]
pub struct StarPage {
    pub repos: Vec<StarredRepo>,
    pub has_next: bool,
}

/// Where starred repositories come from.
///
/// Every method is a single remote request; callers route them through the
/// rate-limit governor. A rate-limit response is reported as
/// `Error::RateLimited`, never retried here.
#[async_trait]
pub trait StarSource: Send + Sync {
    /// Page `page` (1-based) of the authenticated user's stars.
    async fn list_stars_page(&self, page: u32) -> Result<Sourced<StarPage>>;

    /// One README lookup, `None` when the repository has no such file.
    async fn get_readme(
        &self,
        repo: &StarredRepo,
        variant: ReadmeVariant,
    ) -> Result<Sourced<Option<ReadmeFile>>>;
}
