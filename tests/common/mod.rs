#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use star_search::github::{ReadmeFile, ReadmeVariant, Sourced, StarPage, StarSource};
use star_search::llm::embeddings::Embedder;
use star_search::models::StarredRepo;
use star_search::search::vector::VectorIndex;
use star_search::sync::{FetchPipeline, RateBudget, RateLimitGovernor, SyncReconciler};
use star_search::{Error, Result};

pub const DIM: usize = 32;

pub fn repo(id: u64, full_name: &str, description: &str) -> StarredRepo {
    let (owner, name) = full_name.split_once('/').unwrap();
    StarredRepo {
        id,
        owner: owner.to_string(),
        name: name.to_string(),
        full_name: full_name.to_string(),
        description: Some(description.to_string()),
        url: format!("https://github.com/{full_name}"),
        star_count: 100 + id,
        language: None,
        created_at: None,
        updated_at: None,
    }
}

/// Remote star set held in memory. Records when each request was made.
#[derive(Default)]
pub struct MemorySource {
    pub stars: Mutex<Vec<StarredRepo>>,
    pub readmes: Mutex<HashMap<(u64, ReadmeVariant), ReadmeFile>>,
    pub unreachable: Mutex<HashSet<u64>>,
    pub requests: Mutex<Vec<Instant>>,
}

impl MemorySource {
    pub fn new(stars: Vec<StarredRepo>) -> Arc<Self> {
        Arc::new(Self {
            stars: Mutex::new(stars),
            ..Default::default()
        })
    }

    pub fn set_stars(&self, stars: Vec<StarredRepo>) {
        *self.stars.lock() = stars;
    }

    pub fn set_readme(&self, id: u64, variant: ReadmeVariant, text: &str) {
        self.readmes
            .lock()
            .insert((id, variant), ReadmeFile::new(text, variant.kind()));
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl StarSource for MemorySource {
    async fn list_stars_page(&self, page: u32) -> Result<Sourced<StarPage>> {
        self.requests.lock().push(Instant::now());
        let stars = self.stars.lock();
        let repos = if page == 1 { stars.clone() } else { Vec::new() };
        Ok(Sourced::bare(StarPage {
            repos,
            has_next: false,
        }))
    }

    async fn get_readme(
        &self,
        repo: &StarredRepo,
        variant: ReadmeVariant,
    ) -> Result<Sourced<Option<ReadmeFile>>> {
        self.requests.lock().push(Instant::now());
        if self.unreachable.lock().contains(&repo.id) {
            return Err(Error::RemoteUnavailable("connection refused".to_string()));
        }
        Ok(Sourced::bare(
            self.readmes.lock().get(&(repo.id, variant)).cloned(),
        ))
    }
}

/// Hashes words into buckets. Texts containing "boom" fail to embed.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("boom") {
            return Err(Error::EmbeddingFailure("model unavailable".to_string()));
        }
        let mut vector = vec![0.0; DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(17usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            vector[hash % DIM] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

pub fn open_index(dir: &std::path::Path) -> Arc<VectorIndex> {
    Arc::new(VectorIndex::open_or_create(dir, DIM).unwrap())
}

pub fn generous_governor() -> Arc<RateLimitGovernor> {
    Arc::new(RateLimitGovernor::new(
        RateBudget::full(10_000, Duration::from_secs(3600)),
        0,
    ))
}

pub fn reconciler(
    source: Arc<MemorySource>,
    index: Arc<VectorIndex>,
    governor: Arc<RateLimitGovernor>,
) -> SyncReconciler {
    let pipeline = FetchPipeline::new(source.clone(), Arc::new(HashEmbedder), index.clone(), governor);
    SyncReconciler::new(source, index, pipeline)
}

pub fn budget_resetting_in(remaining: u32, limit: u32, reset_in: Duration) -> RateBudget {
    RateBudget {
        remaining,
        limit,
        reset_at: Utc::now() + chrono::Duration::from_std(reset_in).unwrap(),
    }
}
