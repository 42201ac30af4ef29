//! Error types for cache operations

use thiserror::Error;

/// Errors raised by hub access, tokenizer loading and cache bookkeeping
#[derive(Error, Debug)]
pub enum CacheError {
    /// Identifier is not a usable hub model id
    #[error("Invalid model id '{0}'")]
    InvalidModelId(String),

    /// Hub request failed (network, auth, missing repo)
    #[error("Hub error for {model_id}: {message}")]
    Hub { model_id: String, message: String },

    /// Tokenizer could not be loaded or exercised
    #[error("Tokenizer error for {model_id}: {message}")]
    Tokenizer { model_id: String, message: String },

    /// File is not present in the local cache
    #[error("{file} for {model_id} is not in the local cache")]
    NotCached { model_id: String, file: String },

    /// Manifest could not be read or written
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub fn hub(model_id: &str, message: impl std::fmt::Display) -> Self {
        Self::Hub {
            model_id: model_id.to_string(),
            message: message.to_string(),
        }
    }

    pub fn tokenizer(model_id: &str, message: impl std::fmt::Display) -> Self {
        Self::Tokenizer {
            model_id: model_id.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
