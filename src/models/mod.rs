//! Model artifact handling
//!
//! Provides functionality for:
//! - Deriving HuggingFace cache paths and measuring cached models
//! - Downloading repository snapshots from HuggingFace Hub
//! - Loading tokenizers online or from the local cache
//! - Probing loaded tokenizers with sample texts

pub mod cache;
pub mod download;
pub mod loader;
pub mod probe;

pub use cache::{
    CacheStructure, format_size, is_model_present, model_cache_path, scan_cache_structure,
    validate_model_id,
};
pub use download::{HfHubClient, HubClient};
pub use loader::{HfTokenizer, LoadMode, TOKENIZER_FILE, TextTokenizer, TokenizerSource};
pub use probe::{DEFAULT_PROBE_TEXTS, ProbeReport, VERIFY_PROBE_TEXT, run_probes};
