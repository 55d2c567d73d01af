use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// Maximum characters sent per text to the embedding API. MiniLM only
/// looks at the first 256 tokens, so anything past this is wasted upload.
const MAX_EMBED_CHARS: usize = 8_000;

/// README characters folded into a repository's embedding input.
const MAX_README_EMBED_CHARS: usize = 5_000;

/// Maps text to a fixed-length vector. Indexing and querying must go through
/// the same implementation for distances to mean anything.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector `embed` returns.
    fn dimension(&self) -> usize;
}

/// Truncate `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Text embedded for a repository: `name | description | readme`, skipping
/// whatever is missing. A repository without a README still gets an input.
pub fn build_embedding_input(
    full_name: &str,
    description: Option<&str>,
    readme: Option<&str>,
) -> String {
    let mut parts = vec![full_name];

    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        parts.push(description);
    }
    if let Some(readme) = readme.filter(|r| !r.trim().is_empty()) {
        parts.push(truncate_chars(readme, MAX_README_EMBED_CHARS));
    }

    parts.join(" | ")
}

/// Embedder backed by an Ollama or OpenAI-compatible HTTP API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = embed_text(&self.client, &self.config, text).await?;
        if embedding.len() != self.config.embedding_dim {
            return Err(Error::EmbeddingFailure(format!(
                "model {} returned {} dimensions, expected {}",
                self.config.embedding_model,
                embedding.len(),
                self.config.embedding_dim
            )));
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }
}

/// Embed one text with the configured provider.
pub async fn embed_text(client: &reqwest::Client, config: &LlmConfig, text: &str) -> Result<Vec<f32>> {
    let input = vec![truncate_chars(text, MAX_EMBED_CHARS).to_string()];

    let embeddings = match config.provider.as_str() {
        "ollama" => embed_ollama(client, config, input).await?,
        "openai" => embed_openai(client, config, input).await?,
        other => {
            return Err(Error::EmbeddingFailure(format!(
                "Unknown LLM provider: {other}"
            )))
        }
    };

    embeddings
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmbeddingFailure("No embedding returned".to_string()))
}

async fn post_json<T: Serialize, R: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    body: &T,
    api: &str,
) -> Result<R> {
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|e| Error::EmbeddingFailure(format!("Failed to call {api} embed API: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::EmbeddingFailure(format!(
            "{api} embed API returned {status}: {body}"
        )));
    }

    resp.json().await.map_err(|e| {
        Error::EmbeddingFailure(format!("Failed to parse {api} embed response: {e}"))
    })
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    /// Truncate inputs past the model's context instead of failing.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    input: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url);
    let req = OllamaEmbedRequest {
        model: config.embedding_model.clone(),
        input,
        truncate: true,
    };

    let body: OllamaEmbedResponse = post_json(client.post(&url), &req, "Ollama").await?;
    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    input: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();
    let req = OpenAiEmbedRequest {
        model: config.embedding_model.clone(),
        input,
    };

    let request = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"));
    let body: OpenAiEmbedResponse = post_json(request, &req, "OpenAI").await?;
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}
