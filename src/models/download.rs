//! Repository snapshot downloads using hf-hub
//!
//! Fetches model repositories into the tokenizer cache with the native
//! Rust hf-hub crate, skipping large weight files.

use super::cache::model_cache_path;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use anyhow::Context;
use async_trait::async_trait;
use hf_hub::Cache;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use std::path::PathBuf;

/// Bulk repository fetch from a model hub
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Download every repository file not matching `ignore_patterns`
    ///
    /// With `force`, files already in the cache are downloaded again.
    /// Returns the snapshot directory of the fetched revision.
    async fn snapshot(
        &self,
        model_id: &str,
        ignore_patterns: &[String],
        force: bool,
    ) -> CacheResult<PathBuf>;
}

/// HuggingFace Hub client bound to one cache directory
pub struct HfHubClient {
    api: Api,
    cache: Cache,
    cache_dir: PathBuf,
    tokenizer_files: Vec<String>,
}

impl HfHubClient {
    /// Build a client from the cache configuration
    pub fn from_config(config: &CacheConfig) -> anyhow::Result<Self> {
        let mut builder = ApiBuilder::new()
            .with_cache_dir(config.cache_dir.clone())
            .with_progress(false);

        if let Some(endpoint) = &config.hf_endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        if let Some(token) = &config.hf_token {
            builder = builder.with_token(Some(token.clone()));
        }

        let api = builder.build().context("Failed to create HF API client")?;

        Ok(Self {
            api,
            cache: Cache::new(config.cache_dir.clone()),
            cache_dir: config.cache_dir.clone(),
            tokenizer_files: config.tokenizer_files.clone(),
        })
    }

    /// Look up a file of the model's current revision without network access
    pub fn cached_file(&self, model_id: &str, file: &str) -> Option<PathBuf> {
        self.cache.model(model_id.to_string()).get(file)
    }

    /// Download the tokenizer files of a model
    ///
    /// `tokenizer.json` is required. Other configured files are fetched when
    /// the repository has them. Returns the path of `tokenizer.json`.
    pub async fn fetch_tokenizer_files(&self, model_id: &str, force: bool) -> CacheResult<PathBuf> {
        let repo = self.api.model(model_id.to_string());

        let tokenizer_path = fetch_file(&repo, model_id, super::loader::TOKENIZER_FILE, force).await?;

        for file in &self.tokenizer_files {
            if file == super::loader::TOKENIZER_FILE {
                continue;
            }
            match fetch_file(&repo, model_id, file, force).await {
                Ok(_) => {
                    tracing::debug!(model_id = %model_id, file = %file, "Downloaded tokenizer file")
                }
                Err(e) => {
                    tracing::debug!(model_id = %model_id, file = %file, error = %e, "Optional tokenizer file not available")
                }
            }
        }

        Ok(tokenizer_path)
    }
}

#[async_trait]
impl HubClient for HfHubClient {
    async fn snapshot(
        &self,
        model_id: &str,
        ignore_patterns: &[String],
        force: bool,
    ) -> CacheResult<PathBuf> {
        tracing::info!(model_id = %model_id, force, "Fetching repository snapshot");

        let repo = self.api.model(model_id.to_string());
        let info = repo
            .info()
            .await
            .map_err(|e| CacheError::hub(model_id, format!("Failed to fetch repo info: {}", e)))?;

        let files: Vec<&str> = info
            .siblings
            .iter()
            .map(|s| s.rfilename.as_str())
            .filter(|file| !is_ignored(file, ignore_patterns))
            .collect();

        tracing::debug!(
            model_id = %model_id,
            revision = %info.sha,
            total = info.siblings.len(),
            selected = files.len(),
            "Resolved snapshot file list"
        );

        for file in files {
            fetch_file(&repo, model_id, file, force).await?;
        }

        Ok(model_cache_path(&self.cache_dir, model_id)
            .join("snapshots")
            .join(&info.sha))
    }
}

async fn fetch_file(repo: &ApiRepo, model_id: &str, file: &str, force: bool) -> CacheResult<PathBuf> {
    tracing::debug!(model_id = %model_id, file = %file, force, "Downloading file");

    let result = if force {
        repo.download(file).await
    } else {
        repo.get(file).await
    };

    result.map_err(|e| CacheError::hub(model_id, format!("Failed to download {}: {}", file, e)))
}

/// Check a repository path against shell-style ignore patterns
pub fn is_ignored(file: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| wildcard_match(pattern, file))
}

/// `*` matches any run of characters (including `/`), `?` matches one
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
