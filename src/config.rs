use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the index file lives
    pub data_dir: PathBuf,
    /// GitHub API configuration
    pub github: GitHubConfig,
    /// Embedding provider configuration
    pub llm: LlmConfig,
    /// Number of repositories fetched and embedded concurrently
    pub fetch_concurrency: usize,
    /// Requests kept in reserve; the governor waits once the budget reaches this
    pub rate_limit_reserve: u32,
    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Base URL for the REST API
    pub api_url: String,
    /// Personal access token, required for `fetch` and `refresh`
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the embedding API
    pub base_url: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            github: GitHubConfig::default(),
            llm: LlmConfig::default(),
            fetch_concurrency: 5,
            rate_limit_reserve: 10,
            http_timeout_secs: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            // all-MiniLM-L6-v2, 384 dimensions
            embedding_model: "all-minilm".to_string(),
            api_key: None,
            embedding_dim: 384,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config").join("ghs"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Config {
    /// Build configuration from the environment. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("STARS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                config.github.token = Some(token.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            config.github.api_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(val) = std::env::var("FETCH_CONCURRENCY") {
            if let Ok(v) = val.parse::<usize>() {
                config.fetch_concurrency = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_RESERVE") {
            if let Ok(v) = val.parse() {
                config.rate_limit_reserve = v;
            }
        }
        if let Ok(val) = std::env::var("HTTP_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.http_timeout_secs = v;
            }
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }
}
