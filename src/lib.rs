//! Tokenizer Cache - offline tokenizer cache manager
//!
//! Pre-populates and maintains a HuggingFace-layout cache of tokenizer files
//! so a TEI (Text Embeddings Inference) deployment can run without network
//! access.

pub mod config;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod models;
pub mod prompt;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use manager::{
    BatchSummary, CacheManager, CleanOutcome, FetchOutcome, ListReport, Presence, PreloadReport,
    VerifyReport, VerifyStatus,
};
pub use manifest::{Manifest, ManifestStore};
pub use models::{HfHubClient, HubClient, LoadMode, TextTokenizer, TokenizerSource};
pub use prompt::{Confirm, FixedAnswer, StdinConfirm};
