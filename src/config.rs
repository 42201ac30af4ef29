//! Configuration structures and loading logic

use crate::models::{DEFAULT_PROBE_TEXTS, TOKENIZER_FILE, validate_model_id};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the manifest file inside the cache directory
pub const MANIFEST_FILE_NAME: &str = "offline_config.json";

/// Reranking and embedding models preloaded by default
const DEFAULT_MODELS: &[&str] = &[
    // BGE rerankers
    "BAAI/bge-reranker-v2-m3",
    "BAAI/bge-reranker-large",
    "BAAI/bge-reranker-base",
    "BAAI/bge-reranker-v2-gemma",
    "BAAI/bge-reranker-v2-minicpm-layerwise",
    // Jina rerankers
    "jinaai/jina-reranker-v2-base-multilingual",
    "jinaai/jina-reranker-v1-base-en",
    "jinaai/jina-reranker-v1-turbo-en",
    "jinaai/jina-reranker-v1-tiny-en",
    // Cross-encoders
    "cross-encoder/ms-marco-MiniLM-L-6-v2",
    "cross-encoder/ms-marco-MiniLM-L-12-v2",
    "cross-encoder/ms-marco-TinyBERT-L-2-v2",
    "cross-encoder/ms-marco-electra-base",
    // Mixedbread rerankers
    "mixedbread-ai/mxbai-rerank-large-v1",
    "mixedbread-ai/mxbai-rerank-base-v1",
    "mixedbread-ai/mxbai-rerank-xsmall-v1",
    // Sentence Transformers embeddings
    "sentence-transformers/all-MiniLM-L6-v2",
    "sentence-transformers/all-MiniLM-L12-v2",
    "sentence-transformers/all-mpnet-base-v2",
    "sentence-transformers/all-distilroberta-v1",
    "sentence-transformers/paraphrase-MiniLM-L6-v2",
    // BGE embeddings (English)
    "BAAI/bge-small-en-v1.5",
    "BAAI/bge-base-en-v1.5",
    "BAAI/bge-large-en-v1.5",
    "BAAI/bge-m3",
    // BGE embeddings (Chinese)
    "BAAI/bge-small-zh-v1.5",
    "BAAI/bge-base-zh-v1.5",
    "BAAI/bge-large-zh-v1.5",
    // Other embeddings
    "thenlper/gte-small",
    "thenlper/gte-base",
    "thenlper/gte-large",
    "intfloat/e5-small-v2",
    "intfloat/e5-base-v2",
    "intfloat/e5-large-v2",
];

/// Cache manager configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Location of all artifact subdirectories and the manifest
    pub cache_dir: PathBuf,
    /// Artifact registry, processed in order by `preload`
    pub models: Vec<String>,
    /// Repository files skipped by snapshot fetches
    pub ignore_patterns: Vec<String>,
    /// Files fetched by the tokenizer-only download
    pub tokenizer_files: Vec<String>,
    /// Texts tried after a fetch until one yields tokens
    pub probe_texts: Vec<String>,
    /// Batch success ratio below which a warning is emitted
    pub min_success_ratio: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_token: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            models: default_models(),
            ignore_patterns: default_ignore_patterns(),
            tokenizer_files: default_tokenizer_files(),
            probe_texts: default_probe_texts(),
            min_success_ratio: default_min_success_ratio(),
            hf_endpoint: None,
            hf_token: None,
        }
    }
}

impl CacheConfig {
    /// Load configuration from file with environment variable overrides
    ///
    /// Without an explicit path, `<config dir>/tokenizer-cache/config.toml`
    /// is used when it exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(cache_dir) = std::env::var("TOKENIZER_CACHE_DIR") {
            config.cache_dir = PathBuf::from(cache_dir);
        }
        if let Ok(models) = std::env::var("TOKENIZER_CACHE_MODELS") {
            config.models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(ratio) = std::env::var("TOKENIZER_CACHE_MIN_SUCCESS_RATIO") {
            config.min_success_ratio = ratio
                .parse()
                .context("Invalid TOKENIZER_CACHE_MIN_SUCCESS_RATIO value")?;
        }
        if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
            config.hf_endpoint = Some(endpoint);
        }
        if let Ok(token) = std::env::var("HF_TOKEN") {
            config.hf_token = Some(token);
        }

        Ok(config)
    }

    /// Validate configuration and make sure the cache directory exists
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            anyhow::bail!("cache_dir cannot be empty");
        }

        let mut seen = HashSet::new();
        for model_id in &self.models {
            validate_model_id(model_id)?;
            if !seen.insert(model_id) {
                anyhow::bail!("Duplicate model in registry: {}", model_id);
            }
        }

        if !(0.0..=1.0).contains(&self.min_success_ratio) {
            anyhow::bail!(
                "min_success_ratio must be between 0 and 1 (got {})",
                self.min_success_ratio
            );
        }

        if self.probe_texts.is_empty() {
            anyhow::bail!("probe_texts cannot be empty");
        }

        if !self.tokenizer_files.iter().any(|f| f == TOKENIZER_FILE) {
            anyhow::bail!("tokenizer_files must include {}", TOKENIZER_FILE);
        }

        if !self.cache_dir.exists() {
            std::fs::create_dir_all(&self.cache_dir)
                .with_context(|| format!("Cannot create cache directory: {:?}", self.cache_dir))?;
        }

        Ok(())
    }

    /// Path of the offline manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join(MANIFEST_FILE_NAME)
    }

    /// Configuration with the given cache directory and defaults elsewhere
    pub fn for_cache_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tokenizer-cache/config.toml"))
}

// Default functions
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/data/cache")
}
fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}
fn default_ignore_patterns() -> Vec<String> {
    [
        "*.bin",
        "*.safetensors",
        "pytorch_model.bin",
        "*.onnx",
        "*.h5",
        "*.msgpack",
        "*.ot",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}
fn default_tokenizer_files() -> Vec<String> {
    [
        TOKENIZER_FILE,
        "tokenizer_config.json",
        "special_tokens_map.json",
        "vocab.txt",
        "vocab.json",
        "merges.txt",
        "config.json",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}
fn default_probe_texts() -> Vec<String> {
    DEFAULT_PROBE_TEXTS.iter().map(|t| t.to_string()).collect()
}
fn default_min_success_ratio() -> f64 {
    0.8
}
