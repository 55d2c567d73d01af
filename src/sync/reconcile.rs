use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::governor::RateLimitGovernor;
use super::pipeline::{FailedCandidate, FetchPipeline};
use crate::error::{Error, Result};
use crate::github::StarSource;
use crate::models::StarredRepo;
use crate::search::vector::VectorIndex;

/// How the remote and local id sets differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Starred remotely, missing locally
    pub to_add: BTreeSet<u64>,
    /// Indexed locally, no longer starred
    pub to_remove: BTreeSet<u64>,
    pub unchanged: BTreeSet<u64>,
}

impl SyncPlan {
    /// Partition both sets in one merge pass over their sorted ids.
    pub fn compute(remote: &BTreeSet<u64>, local: &BTreeSet<u64>) -> Self {
        let mut plan = Self::default();
        let mut remote_ids = remote.iter().copied().peekable();
        let mut local_ids = local.iter().copied().peekable();

        loop {
            match (remote_ids.peek().copied(), local_ids.peek().copied()) {
                (Some(r), Some(l)) => match r.cmp(&l) {
                    Ordering::Less => {
                        plan.to_add.insert(r);
                        remote_ids.next();
                    }
                    Ordering::Greater => {
                        plan.to_remove.insert(l);
                        local_ids.next();
                    }
                    Ordering::Equal => {
                        plan.unchanged.insert(r);
                        remote_ids.next();
                        local_ids.next();
                    }
                },
                (Some(r), None) => {
                    plan.to_add.insert(r);
                    remote_ids.next();
                }
                (None, Some(l)) => {
                    plan.to_remove.insert(l);
                    local_ids.next();
                }
                (None, None) => break,
            }
        }

        plan
    }

    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Index new stars only
    Fetch,
    /// Index new stars and drop unstarred ones
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Stars listed remotely
    pub remote_total: usize,
    pub added: Vec<u64>,
    pub failed: Vec<FailedCandidate>,
    pub removed: Vec<u64>,
    pub unchanged: usize,
}

/// Brings the local index in line with the remote star set.
pub struct SyncReconciler {
    source: Arc<dyn StarSource>,
    index: Arc<VectorIndex>,
    pipeline: FetchPipeline,
}

impl SyncReconciler {
    pub fn new(source: Arc<dyn StarSource>, index: Arc<VectorIndex>, pipeline: FetchPipeline) -> Self {
        Self {
            source,
            index,
            pipeline,
        }
    }

    pub fn governor(&self) -> &Arc<RateLimitGovernor> {
        self.pipeline.governor()
    }

    /// Index every star not already in the index. Nothing is removed and
    /// existing records are not fetched again.
    pub async fn fetch(&self) -> Result<SyncReport> {
        self.sync(SyncMode::Fetch).await
    }

    /// Like [`fetch`](Self::fetch), then delete records that are no longer
    /// starred.
    pub async fn refresh(&self) -> Result<SyncReport> {
        self.sync(SyncMode::Refresh).await
    }

    async fn sync(&self, mode: SyncMode) -> Result<SyncReport> {
        let remote = self.list_remote().await?;
        let remote_ids: BTreeSet<u64> = remote.keys().copied().collect();
        let plan = SyncPlan::compute(&remote_ids, &self.index.all_ids());

        tracing::info!(
            "{mode:?}: {} starred, {} new, {} unstarred, {} unchanged",
            remote_ids.len(),
            plan.to_add.len(),
            plan.to_remove.len(),
            plan.unchanged.len()
        );

        let mut report = SyncReport {
            mode,
            remote_total: remote_ids.len(),
            added: Vec::new(),
            failed: Vec::new(),
            removed: Vec::new(),
            unchanged: plan.unchanged.len(),
        };

        if plan.is_noop() {
            tracing::info!("Index is up to date");
            return Ok(report);
        }

        if mode == SyncMode::Refresh && !plan.to_remove.is_empty() {
            let index = Arc::clone(&self.index);
            let to_remove = plan.to_remove.clone();
            report.removed = run_blocking(&self.index, move || {
                let mut removed = Vec::with_capacity(to_remove.len());
                for id in to_remove {
                    if index.delete(id)? {
                        removed.push(id);
                    }
                }
                Ok(removed)
            })
            .await?;
        }

        if !plan.to_add.is_empty() {
            let mut remote = remote;
            let candidates: Vec<StarredRepo> = plan
                .to_add
                .iter()
                .filter_map(|id| remote.remove(id))
                .collect();

            let run = self.pipeline.run(candidates).await?;
            report.added = run.succeeded;
            report.added.sort_unstable();
            report.failed = run.failed;
            report.failed.sort_by_key(|f| f.id);
        }

        let index = Arc::clone(&self.index);
        run_blocking(&self.index, move || index.compact()).await?;

        Ok(report)
    }

    /// Every starred repository, keyed by id. Pages are fetched in order
    /// until the listing says there are no more.
    async fn list_remote(&self) -> Result<BTreeMap<u64, StarredRepo>> {
        let mut stars = BTreeMap::new();
        let mut page = 1;

        loop {
            let listing = self
                .governor()
                .call(|| self.source.list_stars_page(page))
                .await?;
            tracing::debug!("Star page {page}: {} repositories", listing.repos.len());

            let done = !listing.has_next || listing.repos.is_empty();
            for repo in listing.repos {
                stars.entry(repo.id).or_insert(repo);
            }
            if done {
                break;
            }
            page += 1;
        }

        Ok(stars)
    }
}

/// Run blocking index I/O off the async workers.
async fn run_blocking<T, F>(index: &VectorIndex, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::storage(index.path(), format!("index task failed: {e}")))?
}
