//! Tokenizer probes
//!
//! A tokenizer counts as usable when at least one probe text encodes to a
//! non-empty token sequence.

use super::loader::TextTokenizer;
use crate::error::{CacheError, CacheResult};
use serde::Serialize;

/// Probe texts used after a fetch (ASCII and non-ASCII samples)
pub const DEFAULT_PROBE_TEXTS: [&str; 4] = [
    "Hello, world!",
    "你好世界！",
    "This is a test sentence for tokenization.",
    "机器学习是人工智能的一个重要分支。",
];

/// Probe text used when verifying an already cached tokenizer
pub const VERIFY_PROBE_TEXT: &str = "test";

/// First probe that produced tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub text: String,
    pub token_count: usize,
    pub decoded: String,
}

/// Run probe texts in order until one yields tokens
///
/// Errors on individual probes are logged and the next text is tried.
pub fn run_probes<S: AsRef<str>>(
    model_id: &str,
    tokenizer: &dyn TextTokenizer,
    texts: &[S],
) -> CacheResult<ProbeReport> {
    for text in texts {
        let text = text.as_ref();
        let ids = match tokenizer.encode(text) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(model_id = %model_id, text = %text, error = %e, "Probe failed");
                continue;
            }
        };

        if ids.is_empty() {
            tracing::debug!(model_id = %model_id, text = %text, "Probe produced no tokens");
            continue;
        }

        let decoded = match tokenizer.decode(&ids) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(model_id = %model_id, text = %text, error = %e, "Probe decode failed");
                continue;
            }
        };

        tracing::debug!(
            model_id = %model_id,
            text = %text,
            token_count = ids.len(),
            "Probe passed"
        );

        return Ok(ProbeReport {
            text: text.to_string(),
            token_count: ids.len(),
            decoded,
        });
    }

    Err(CacheError::tokenizer(model_id, "tokenizer produced no tokens"))
}
