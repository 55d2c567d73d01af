//! # star-search
//!
//! Indexes a GitHub user's starred repositories into a local vector index
//! and answers natural-language queries against it.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────┐                       ┌──────────────┐
//!        │ fetch/refresh│                       │    search    │
//!        └──────┬───────┘                       └──────┬───────┘
//!               ▼                                      ▼
//!      ┌─────────────────┐  new stars          ┌───────────────┐
//!      │ SyncReconciler  │─────────────┐       │ SearchEngine  │
//!      │ remote ⋈ local  │             │       │ embed query   │
//!      └───┬─────────┬───┘             ▼       └───────┬───────┘
//!          │ list    │ unstarred ┌───────────────┐     │
//!          │ pages   │ (refresh) │ FetchPipeline │     │
//!          │         │           │ 5 workers:    │     │
//!          │         │           │ README→embed  │     │
//!          │         │           └──┬─────────┬──┘     │
//!          ▼         │              │         │        │
//!   ┌────────────────────┐          │         │        │
//!   │ RateLimitGovernor  │◄─────────┘         │        │
//!   │ shared budget      │                    │        │
//!   └─────────┬──────────┘                    ▼        ▼
//!             ▼              ┌──────────────────────────────┐
//!        GitHub REST         │ VectorIndex (stars.json)     │
//!                            │ metadata + embeddings,       │
//!                            │ cosine distance              │
//!                            └──────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for data dir, GitHub and embeddings
//! - [`models`] - Shared data types: `StarredRepo`, `RepositoryRecord`, `SearchHit`
//! - [`github`] - The `StarSource` seam and its REST client
//! - [`llm::embeddings`] - The `Embedder` seam and its Ollama/OpenAI client
//! - [`search::vector`] - Persisted vector index with cosine search
//! - [`search::engine`] - Query validation and embedding
//! - [`sync`] - Rate-limit governor, fetch pipeline and reconciliation
//! - [`display`] - Terminal progress bar
//! - [`state`] - Wiring of the above from a `Config`

pub mod config;
pub mod display;
pub mod error;
pub mod github;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod sync;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
