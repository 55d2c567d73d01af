//! In-memory stand-ins for the remote source and the embedder.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::github::{ReadmeFile, ReadmeVariant, Sourced, StarPage, StarSource};
use crate::llm::embeddings::Embedder;
use crate::models::{ReadmeKind, StarredRepo};

pub fn repo(id: u64, full_name: &str, description: &str) -> StarredRepo {
    let (owner, name) = full_name.split_once('/').unwrap_or(("owner", full_name));
    StarredRepo {
        id,
        owner: owner.to_string(),
        name: name.to_string(),
        full_name: full_name.to_string(),
        description: Some(description.to_string()),
        url: format!("https://github.com/{full_name}"),
        star_count: id * 10,
        language: Some("Rust".to_string()),
        created_at: None,
        updated_at: None,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub stars: Mutex<Vec<StarredRepo>>,
    pub readmes: Mutex<HashMap<(u64, ReadmeVariant), ReadmeFile>>,
    pub failing: Mutex<HashSet<u64>>,
    pub readme_calls: Mutex<Vec<(u64, ReadmeVariant)>>,
    pub page_size: usize,
}

impl FakeSource {
    pub fn with_stars(stars: Vec<StarredRepo>) -> Arc<Self> {
        Arc::new(Self {
            stars: Mutex::new(stars),
            page_size: 2,
            ..Default::default()
        })
    }

    pub fn set_readme(&self, id: u64, variant: ReadmeVariant, text: &str) {
        self.readmes
            .lock()
            .insert((id, variant), ReadmeFile::new(text, variant.kind()));
    }

    /// What GitHub's README detection serves, with the kind its
    /// content type maps to.
    pub fn set_detected_readme(&self, id: u64, text: &str, kind: ReadmeKind) {
        self.readmes
            .lock()
            .insert((id, ReadmeVariant::Detected), ReadmeFile::new(text, kind));
    }

    pub fn fail_readme(&self, id: u64) {
        self.failing.lock().insert(id);
    }
}

#[async_trait]
impl StarSource for FakeSource {
    async fn list_stars_page(&self, page: u32) -> Result<Sourced<StarPage>> {
        let stars = self.stars.lock();
        let size = self.page_size.max(1);
        let start = (page.saturating_sub(1) as usize) * size;
        let repos: Vec<StarredRepo> = stars.iter().skip(start).take(size).cloned().collect();
        Ok(Sourced::bare(StarPage {
            has_next: start + size < stars.len(),
            repos,
        }))
    }

    async fn get_readme(
        &self,
        repo: &StarredRepo,
        variant: ReadmeVariant,
    ) -> Result<Sourced<Option<ReadmeFile>>> {
        self.readme_calls.lock().push((repo.id, variant));
        if self.failing.lock().contains(&repo.id) {
            return Err(Error::RemoteUnavailable(format!("{} timed out", repo.full_name)));
        }
        Ok(Sourced::bare(
            self.readmes.lock().get(&(repo.id, variant)).cloned(),
        ))
    }
}

/// Deterministic bag-of-words embedder. Texts containing "boom" fail.
pub struct KeywordEmbedder {
    pub dimension: usize,
}

impl KeywordEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self { dimension })
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("boom") {
            return Err(Error::EmbeddingFailure("model crashed".to_string()));
        }
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % self.dimension] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
