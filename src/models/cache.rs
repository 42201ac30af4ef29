//! Tokenizer cache layout helpers
//!
//! The cache directory uses the HuggingFace hub layout, so TEI can read it
//! directly in offline mode:
//! ```text
//! /data/cache/
//! ├── offline_config.json
//! ├── models--BAAI--bge-small-en-v1.5/
//! │   ├── blobs/
//! │   ├── refs/
//! │   │   └── main
//! │   └── snapshots/
//! │       └── {revision}/
//! │           ├── config.json -> ../../blobs/...
//! │           └── tokenizer.json -> ../../blobs/...
//! └── models--sentence-transformers--all-MiniLM-L6-v2/
//!     └── ...
//! ```

use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

const CACHE_PREFIX: &str = "models--";
const SEPARATOR_TOKEN: &str = "--";

/// File names counted as tokenizer files by the structure scan
const TOKENIZER_FILE_NAMES: [&str; 4] = [
    "tokenizer.json",
    "tokenizer_config.json",
    "vocab.txt",
    "vocab.json",
];

/// Check that a model id is usable as a hub repo id and a cache subpath
///
/// Accepts `namespace/name` and bare `name` ids. `--` is the cache path
/// separator, so it may not appear in an id.
pub fn validate_model_id(model_id: &str) -> CacheResult<()> {
    let invalid = || CacheError::InvalidModelId(model_id.to_string());

    if model_id.is_empty() || model_id.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if model_id.contains('\\') || model_id.contains(SEPARATOR_TOKEN) {
        return Err(invalid());
    }
    if model_id.matches('/').count() > 1 {
        return Err(invalid());
    }
    if model_id
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }

    Ok(())
}

/// Convert model ID to cache directory name
///
/// e.g., "BAAI/bge-small-en-v1.5" -> "models--BAAI--bge-small-en-v1.5"
pub fn model_id_to_cache_name(model_id: &str) -> String {
    format!("{}{}", CACHE_PREFIX, model_id.replace('/', SEPARATOR_TOKEN))
}

/// Convert cache directory name back to model ID
///
/// e.g., "models--BAAI--bge-small-en-v1.5" -> "BAAI/bge-small-en-v1.5"
pub fn cache_name_to_model_id(cache_name: &str) -> Option<String> {
    cache_name
        .strip_prefix(CACHE_PREFIX)
        .filter(|s| !s.is_empty())
        .map(|s| s.replacen(SEPARATOR_TOKEN, "/", 1))
}

/// Directory holding all cached files of a model
pub fn model_cache_path(cache_dir: &Path, model_id: &str) -> PathBuf {
    cache_dir.join(model_id_to_cache_name(model_id))
}

/// Check whether a model's cache directory exists
pub fn is_model_present(cache_dir: &Path, model_id: &str) -> bool {
    model_cache_path(cache_dir, model_id).is_dir()
}

/// Get the total size of a cached model in bytes
pub fn get_cache_size(cache_dir: &Path, model_id: &str) -> Option<u64> {
    let model_dir = model_cache_path(cache_dir, model_id);

    if !model_dir.is_dir() {
        return None;
    }

    Some(dir_size(&model_dir))
}

/// Recursively calculate directory size
///
/// Symlinks are not followed: snapshot entries point into `blobs/`, which is
/// already counted.
pub fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                size += dir_size(&entry.path());
            } else if file_type.is_file()
                && let Ok(metadata) = entry.metadata()
            {
                size += metadata.len();
            }
        }
    }

    size
}

/// Format a byte count for display (base 1024, one decimal)
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1}{}", size, UNITS[unit])
}

/// List model ids for every model directory found in the cache
pub fn list_cached_models(cache_dir: &Path) -> Vec<String> {
    let mut models = Vec::new();

    if let Ok(entries) = std::fs::read_dir(cache_dir) {
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(model_id) = cache_name_to_model_id(&name) {
                models.push(model_id);
            }
        }
    }

    models.sort();
    models
}

/// File counts found by [`scan_cache_structure`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStructure {
    pub total_files: usize,
    pub tokenizer_files: usize,
    pub config_files: usize,
}

impl CacheStructure {
    /// The cache is usable offline only if some tokenizer file exists
    pub fn has_tokenizers(&self) -> bool {
        self.tokenizer_files > 0
    }
}

/// Count files under the cache directory by kind
///
/// Snapshot symlinks carry the real file names, so they are counted as files.
pub fn scan_cache_structure(cache_dir: &Path) -> CacheStructure {
    let mut structure = CacheStructure::default();
    scan_into(cache_dir, &mut structure);
    structure
}

fn scan_into(path: &Path, structure: &mut CacheStructure) {
    let Ok(entries) = std::fs::read_dir(path) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            scan_into(&entry.path(), structure);
            continue;
        }

        structure.total_files += 1;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if TOKENIZER_FILE_NAMES.contains(&name.as_ref()) {
            structure.tokenizer_files += 1;
        } else if name == "config.json" {
            structure.config_files += 1;
        }
    }
}
