//! Tokenizer loading
//!
//! Loads `tokenizer.json` either straight from the local cache (offline) or
//! after fetching the tokenizer files from the hub (online).

use super::download::HfHubClient;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::path::Path;

/// File every cached tokenizer must provide
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// A loaded tokenizer that can be exercised by probes
pub trait TextTokenizer: Send + Sync {
    /// Encode text to token ids, adding special tokens
    fn encode(&self, text: &str) -> CacheResult<Vec<u32>>;

    /// Decode token ids to text, skipping special tokens
    fn decode(&self, ids: &[u32]) -> CacheResult<String>;
}

/// Where a tokenizer load may read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Local cache only, no network access
    Offline,
    /// Fetch tokenizer files first; `force` re-downloads cached files
    Online { force: bool },
}

/// Capability to load a tokenizer by model id
#[async_trait]
pub trait TokenizerSource: Send + Sync {
    async fn load(&self, model_id: &str, mode: LoadMode) -> CacheResult<Box<dyn TextTokenizer>>;
}

/// Tokenizer backed by the `tokenizers` crate
pub struct HfTokenizer {
    model_id: String,
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(model_id: &str, path: &Path) -> CacheResult<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            CacheError::tokenizer(model_id, format!("Failed to load {}: {}", path.display(), e))
        })?;

        Ok(Self {
            model_id: model_id.to_string(),
            inner,
        })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> CacheResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| CacheError::tokenizer(&self.model_id, format!("Encode failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> CacheResult<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| CacheError::tokenizer(&self.model_id, format!("Decode failed: {}", e)))
    }
}

#[async_trait]
impl TokenizerSource for HfHubClient {
    async fn load(&self, model_id: &str, mode: LoadMode) -> CacheResult<Box<dyn TextTokenizer>> {
        let path = match mode {
            LoadMode::Offline => {
                self.cached_file(model_id, TOKENIZER_FILE)
                    .ok_or_else(|| CacheError::NotCached {
                        model_id: model_id.to_string(),
                        file: TOKENIZER_FILE.to_string(),
                    })?
            }
            LoadMode::Online { force } => self.fetch_tokenizer_files(model_id, force).await?,
        };

        tracing::debug!(model_id = %model_id, path = ?path, ?mode, "Loading tokenizer");

        let tokenizer = HfTokenizer::from_file(model_id, &path)?;
        Ok(Box::new(tokenizer))
    }
}
