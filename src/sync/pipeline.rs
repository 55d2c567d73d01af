use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::governor::RateLimitGovernor;
use super::progress::{NoopObserver, ProgressObserver};
use crate::error::{Error, Result};
use crate::github::readme::clean_readme;
use crate::github::{ReadmeVariant, StarSource};
use crate::llm::embeddings::{build_embedding_input, Embedder};
use crate::models::{ReadmeKind, RepositoryRecord, StarredRepo};
use crate::search::vector::VectorIndex;

/// Workers fetching and embedding at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A candidate that could not be indexed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCandidate {
    pub id: u64,
    pub full_name: String,
    pub error: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: Vec<u64>,
    pub failed: Vec<FailedCandidate>,
}

/// Everything a worker needs, shared by all tasks of a run.
struct Worker {
    source: Arc<dyn StarSource>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    governor: Arc<RateLimitGovernor>,
}

impl Worker {
    /// README, embedding, upsert. Any error belongs to this candidate alone
    /// unless it is fatal.
    async fn process(&self, repo: &StarredRepo) -> Result<()> {
        let readme = self.fetch_readme(repo).await?;

        let input = build_embedding_input(
            &repo.full_name,
            repo.description.as_deref(),
            readme.as_ref().map(|(text, _)| text.as_str()),
        );
        let embedding = self.embedder.embed(&input).await?;
        if embedding.len() != self.index.dimension() {
            return Err(Error::EmbeddingFailure(format!(
                "got {} dimensions for {}, index expects {}",
                embedding.len(),
                repo.full_name,
                self.index.dimension()
            )));
        }

        let record = RepositoryRecord::from_starred(repo, readme, Some(embedding));
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || index.upsert(record))
            .await
            .map_err(|e| Error::storage(self.index.path(), format!("index write task failed: {e}")))?
    }

    /// First README variant with non-blank content, if any.
    async fn fetch_readme(&self, repo: &StarredRepo) -> Result<Option<(String, ReadmeKind)>> {
        for variant in ReadmeVariant::ALL {
            let content = self
                .governor
                .call(|| self.source.get_readme(repo, variant))
                .await?;

            if let Some(file) = content {
                if let Some(text) = clean_readme(&file.text) {
                    tracing::debug!("{}: using {}", repo.full_name, variant.label());
                    return Ok(Some((text, file.kind)));
                }
            }
        }
        tracing::debug!("{}: no README", repo.full_name);
        Ok(None)
    }
}

/// Turns candidate repositories into indexed records with a fixed-size pool
/// of workers.
pub struct FetchPipeline {
    worker: Arc<Worker>,
    observer: Arc<dyn ProgressObserver>,
    concurrency: usize,
}

impl FetchPipeline {
    pub fn new(
        source: Arc<dyn StarSource>,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        governor: Arc<RateLimitGovernor>,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                source,
                embedder,
                index,
                governor,
            }),
            observer: Arc::new(NoopObserver),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn governor(&self) -> &Arc<RateLimitGovernor> {
        &self.worker.governor
    }

    /// Index every candidate. Per-candidate failures land in the report; a
    /// storage failure cancels the remaining work and is returned.
    pub async fn run(&self, candidates: Vec<StarredRepo>) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.observer.on_run_start(candidates.len());
        if candidates.is_empty() {
            return Ok(report);
        }

        tracing::info!(
            "Indexing {} repositories with {} workers",
            candidates.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut pending: BTreeMap<u64, StarredRepo> = BTreeMap::new();
        let mut join_set: JoinSet<(StarredRepo, Result<()>)> = JoinSet::new();

        for repo in candidates {
            pending.insert(repo.id, repo.clone());
            let worker = Arc::clone(&self.worker);
            let observer = Arc::clone(&self.observer);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = Error::RemoteUnavailable("worker pool closed".to_string());
                        return (repo, Err(err));
                    }
                };
                observer.on_start(&repo);
                let result = worker.process(&repo).await;
                (repo, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (repo, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Worker task failed: {e}");
                    continue;
                }
            };
            pending.remove(&repo.id);

            match result {
                Ok(()) => {
                    self.observer.on_finish(&repo, None);
                    report.succeeded.push(repo.id);
                }
                Err(e) if e.is_fatal() => {
                    self.observer.on_finish(&repo, Some(&e));
                    tracing::error!("Aborting run: {e}");
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Failed to index {}: {e}", repo.full_name);
                    self.observer.on_finish(&repo, Some(&e));
                    report.failed.push(FailedCandidate {
                        id: repo.id,
                        full_name: repo.full_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Tasks that panicked never reported back.
        for (id, repo) in pending {
            report.failed.push(FailedCandidate {
                id,
                full_name: repo.full_name,
                error: "worker task panicked".to_string(),
            });
        }

        tracing::info!(
            "Indexed {} repositories, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
