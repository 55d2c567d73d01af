pub mod embeddings;

pub use embeddings::{Embedder, HttpEmbedder};
