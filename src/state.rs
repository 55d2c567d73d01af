use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::search::engine::SearchEngine;
use crate::search::vector::VectorIndex;
use crate::sync::{FetchPipeline, ProgressObserver, RateLimitGovernor, SyncReconciler};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));

        // The index stores vectors of whatever length the embedder produces
        let index = VectorIndex::open_or_create(&config.index_dir(), embedder.dimension())
            .context("Failed to open the repository index")?;

        Ok(Self {
            config,
            index: Arc::new(index),
            embedder,
            http_client,
        })
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(Arc::clone(&self.embedder), Arc::clone(&self.index))
    }

    pub fn github_client(&self) -> anyhow::Result<GitHubClient> {
        let token = self
            .config
            .github
            .token
            .as_deref()
            .context("GITHUB_TOKEN is not set; add it to the environment or a .env file")?;
        Ok(GitHubClient::new(
            self.http_client.clone(),
            &self.config.github.api_url,
            token,
        ))
    }

    /// Wire up a reconciler whose governor starts from the budget GitHub
    /// currently reports.
    pub async fn reconciler(
        &self,
        client: GitHubClient,
        observer: Arc<dyn ProgressObserver>,
    ) -> anyhow::Result<SyncReconciler> {
        let budget = client
            .rate_limit()
            .await
            .context("Failed to read the GitHub rate limit")?;

        let user = client
            .authenticated_user()
            .await
            .context("Failed to authenticate with GitHub")?;
        tracing::info!("Authenticated as {}", user.value);

        let governor = RateLimitGovernor::new(budget.into(), self.config.rate_limit_reserve)
            .with_observer(Arc::clone(&observer));
        if let Some(snapshot) = user.budget {
            governor.observe(snapshot);
        }

        let source = Arc::new(client);
        let pipeline = FetchPipeline::new(
            source.clone(),
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            Arc::new(governor),
        )
        .with_concurrency(self.config.fetch_concurrency)
        .with_observer(observer);

        Ok(SyncReconciler::new(source, Arc::clone(&self.index), pipeline))
    }
}
