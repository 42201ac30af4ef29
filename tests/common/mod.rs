//! Common fixtures: an in-process hub that writes HuggingFace cache layout

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokenizer_cache::models::{HfTokenizer, TOKENIZER_FILE, model_cache_path};
use tokenizer_cache::{
    CacheConfig, CacheError, CacheManager, CacheResult, FixedAnswer, HubClient, LoadMode,
    TextTokenizer, TokenizerSource,
};

pub const REVISION: &str = "0123456789abcdef";

/// Word-level tokenizer with a lowercase normalizer
pub const WORD_LEVEL_TOKENIZER: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [],
    "normalizer": { "type": "Lowercase" },
    "pre_tokenizer": { "type": "Whitespace" },
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": { "[UNK]": 0, "hello": 1, "world": 2, "test": 3 },
        "unk_token": "[UNK]"
    }
}"#;

/// Hub double: writes a snapshot for every model except the failing ones
#[derive(Default)]
pub struct FakeHub {
    cache_dir: PathBuf,
    failing: HashSet<String>,
    broken: HashSet<String>,
    pub calls: Mutex<Vec<(String, bool)>>,
}

impl FakeHub {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            ..Default::default()
        }
    }

    /// Snapshot requests for these ids fail like a hub outage
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    /// These ids download a tokenizer.json that cannot be parsed
    pub fn broken(mut self, ids: &[&str]) -> Self {
        self.broken.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn snapshot(
        &self,
        model_id: &str,
        _ignore_patterns: &[String],
        force: bool,
    ) -> CacheResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((model_id.to_string(), force));

        if self.failing.contains(model_id) {
            return Err(CacheError::hub(model_id, "503 Service Unavailable"));
        }

        let tokenizer = if self.broken.contains(model_id) {
            "{ not json"
        } else {
            WORD_LEVEL_TOKENIZER
        };
        Ok(write_snapshot(&self.cache_dir, model_id, tokenizer))
    }
}

/// Write a model directory in hub cache layout
pub fn write_snapshot(cache_dir: &Path, model_id: &str, tokenizer_json: &str) -> PathBuf {
    let model_dir = model_cache_path(cache_dir, model_id);
    let snapshot = model_dir.join("snapshots").join(REVISION);

    std::fs::create_dir_all(&snapshot).unwrap();
    std::fs::create_dir_all(model_dir.join("refs")).unwrap();
    std::fs::create_dir_all(model_dir.join("blobs")).unwrap();
    std::fs::write(model_dir.join("refs/main"), REVISION).unwrap();
    std::fs::write(snapshot.join(TOKENIZER_FILE), tokenizer_json).unwrap();
    std::fs::write(snapshot.join("config.json"), r#"{"model_type": "bert"}"#).unwrap();
    std::fs::write(model_dir.join("blobs/weights-placeholder"), vec![0u8; 2048]).unwrap();

    snapshot
}

/// Tokenizer source reading `tokenizer.json` from the fake snapshot
pub struct FakeTokenizers {
    cache_dir: PathBuf,
}

impl FakeTokenizers {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl TokenizerSource for FakeTokenizers {
    async fn load(&self, model_id: &str, _mode: LoadMode) -> CacheResult<Box<dyn TextTokenizer>> {
        let path = model_cache_path(&self.cache_dir, model_id)
            .join("snapshots")
            .join(REVISION)
            .join(TOKENIZER_FILE);

        if !path.exists() {
            return Err(CacheError::NotCached {
                model_id: model_id.to_string(),
                file: TOKENIZER_FILE.to_string(),
            });
        }

        Ok(Box::new(HfTokenizer::from_file(model_id, &path)?))
    }
}

/// Manager over a temp cache dir with the given hub and a fixed confirmation answer
pub fn test_manager(
    temp_dir: &TempDir,
    models: &[&str],
    hub: FakeHub,
    answer: bool,
) -> (CacheManager, Arc<FakeHub>) {
    let config = CacheConfig {
        models: models.iter().map(|m| m.to_string()).collect(),
        ..CacheConfig::for_cache_dir(temp_dir.path())
    };
    config.validate().unwrap();

    let hub = Arc::new(hub);
    let manager = CacheManager::new(
        config,
        hub.clone(),
        Arc::new(FakeTokenizers::new(temp_dir.path())),
    )
    .with_confirm(Arc::new(FixedAnswer(answer)));

    (manager, hub)
}
