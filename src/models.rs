use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A starred repository as listed by GitHub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarredRepo {
    pub id: u64,
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: u64,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Which README variant the stored text came from
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadmeKind {
    Markdown,
    Plain,
    #[default]
    None,
}

/// An indexed repository.
///
/// The embedding is kept out of the serialized metadata row; the vector index
/// persists it in its own table keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryRecord {
    pub id: u64,
    pub full_name: String,
    pub description: Option<String>,
    pub url: String,
    pub star_count: u64,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub readme_text: Option<String>,
    #[serde(default)]
    pub readme_kind: ReadmeKind,
    pub indexed_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl RepositoryRecord {
    /// Build a record for `repo`, stamped with the current time.
    pub fn from_starred(
        repo: &StarredRepo,
        readme: Option<(String, ReadmeKind)>,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        let (readme_text, readme_kind) = match readme {
            Some((text, kind)) => (Some(text), kind),
            None => (None, ReadmeKind::None),
        };

        Self {
            id: repo.id,
            full_name: repo.full_name.clone(),
            description: repo.description.clone(),
            url: repo.url.clone(),
            star_count: repo.star_count,
            language: repo.language.clone(),
            created_at: repo.created_at,
            updated_at: repo.updated_at,
            readme_text,
            readme_kind,
            indexed_at: Utc::now(),
            embedding,
        }
    }
}

/// A search result: a stored record and its cosine distance to the query
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: RepositoryRecord,
    pub distance: f32,
}

/// Counters reported by the `stats` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub with_embedding: usize,
    pub with_readme: usize,
}

impl IndexStats {
    /// Share of records with README text, as a percentage. `None` when empty.
    pub fn readme_coverage(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.with_readme as f64 / self.total as f64 * 100.0)
        }
    }
}
