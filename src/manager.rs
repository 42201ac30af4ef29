//! Tokenizer cache lifecycle
//!
//! `CacheManager` drives every operation over the artifact registry or the
//! manifest. All work is sequential; a failing artifact never aborts a batch.

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::manifest::{Manifest, ManifestStore, StorageBackend};
use crate::models::cache::{get_cache_size, list_cached_models};
use crate::models::{
    CacheStructure, HubClient, LoadMode, ProbeReport, TokenizerSource, VERIFY_PROBE_TEXT,
    is_model_present, run_probes, scan_cache_structure, validate_model_id,
};
use crate::prompt::{Confirm, StdinConfirm};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Result of fetching and probing one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Ok { probe: ProbeReport },
    /// Snapshot or tokenizer-file download failed
    FetchFailed { reason: String },
    /// Tokenizer failed to load or produced no tokens
    ValidationFailed { reason: String },
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::FetchFailed { reason } | Self::ValidationFailed { reason } => Some(reason),
        }
    }
}

impl std::fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok { probe } => write!(f, "ok ('{}' -> {} tokens)", probe.text, probe.token_count),
            Self::FetchFailed { reason } => write!(f, "fetch failed: {}", reason),
            Self::ValidationFailed { reason } => write!(f, "validation failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResult {
    pub model_id: String,
    pub outcome: FetchOutcome,
}

/// Per-artifact outcomes of a batch, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub results: Vec<ArtifactResult>,
}

impl BatchSummary {
    pub fn push(&mut self, model_id: &str, outcome: FetchOutcome) {
        self.results.push(ArtifactResult {
            model_id: model_id.to_string(),
            outcome,
        });
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn successes(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_ok())
            .map(|r| r.model_id.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactResult> {
        self.results.iter().filter(|r| !r.outcome.is_ok())
    }

    /// Fraction of successful artifacts; 1.0 for an empty batch
    pub fn success_ratio(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        self.success_count() as f64 / self.total() as f64
    }

    pub fn below_threshold(&self, min_success_ratio: f64) -> bool {
        self.success_ratio() < min_success_ratio
    }
}

/// Outcome of a registry-wide preload
#[derive(Debug, Clone)]
pub struct PreloadReport {
    pub summary: BatchSummary,
    pub structure: CacheStructure,
    /// Success ratio fell below the configured threshold (warning only)
    pub below_threshold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present { size_bytes: u64 },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub model_id: String,
    pub presence: Presence,
}

#[derive(Debug, Clone)]
pub struct ListReport {
    /// Manifest artifacts sorted by id
    pub entries: Vec<ListEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    Valid,
    /// Cache directory does not exist
    Missing,
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEntry {
    pub model_id: String,
    pub status: VerifyStatus,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub entries: Vec<VerifyEntry>,
}

impl VerifyReport {
    pub fn valid_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == VerifyStatus::Valid)
            .count()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &VerifyEntry> {
        self.entries.iter().filter(|e| e.status != VerifyStatus::Valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Operator declined; nothing was touched
    Declined,
    /// Number of top-level cache entries removed
    Cleaned { removed: usize },
}

/// Drives fetch, list, update, verify and clean over one cache directory
pub struct CacheManager {
    config: CacheConfig,
    hub: Arc<dyn HubClient>,
    tokenizers: Arc<dyn TokenizerSource>,
    manifest: ManifestStore,
    confirm: Arc<dyn Confirm>,
}

impl CacheManager {
    /// Create a manager with filesystem manifest storage and stdin prompts
    pub fn new(
        config: CacheConfig,
        hub: Arc<dyn HubClient>,
        tokenizers: Arc<dyn TokenizerSource>,
    ) -> Self {
        let manifest = ManifestStore::new(config.manifest_path());
        Self {
            config,
            hub,
            tokenizers,
            manifest,
            confirm: Arc::new(StdinConfirm),
        }
    }

    /// Replace the confirmation capability
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    /// Replace the manifest storage backend
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.manifest = ManifestStore::new_with_storage(self.config.manifest_path(), storage);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn load_manifest(&self) -> Result<Manifest> {
        self.manifest.load().await
    }

    /// Fetch one artifact and probe its tokenizer
    ///
    /// Never fails: every error is logged and classified in the outcome.
    pub async fn fetch(&self, model_id: &str, force: bool) -> FetchOutcome {
        if let Err(e) = validate_model_id(model_id) {
            return FetchOutcome::FetchFailed {
                reason: e.to_string(),
            };
        }

        if let Err(e) = self
            .hub
            .snapshot(model_id, &self.config.ignore_patterns, force)
            .await
        {
            tracing::error!(model_id = %model_id, error = %e, "Snapshot fetch failed");
            return FetchOutcome::FetchFailed {
                reason: e.to_string(),
            };
        }

        // The snapshot has just refreshed every file it kept, so only the
        // tokenizer files it skipped are downloaded here
        let tokenizer = match self
            .tokenizers
            .load(model_id, LoadMode::Online { force: false })
            .await
        {
            Ok(tokenizer) => tokenizer,
            Err(e @ CacheError::Hub { .. }) => {
                tracing::error!(model_id = %model_id, error = %e, "Tokenizer download failed");
                return FetchOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
            Err(e) => {
                tracing::error!(model_id = %model_id, error = %e, "Tokenizer load failed");
                return FetchOutcome::ValidationFailed {
                    reason: e.to_string(),
                };
            }
        };

        match run_probes(model_id, tokenizer.as_ref(), &self.config.probe_texts) {
            Ok(probe) => {
                tracing::info!(
                    model_id = %model_id,
                    text = %probe.text,
                    token_count = probe.token_count,
                    "Tokenizer fetched and verified"
                );
                FetchOutcome::Ok { probe }
            }
            Err(e) => {
                tracing::error!(model_id = %model_id, error = %e, "Tokenizer validation failed");
                FetchOutcome::ValidationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fetch every registry artifact, then record successes in the manifest
    pub async fn preload(&self) -> Result<PreloadReport> {
        let mut manifest = self.manifest.load().await?;
        let total = self.config.models.len();

        tracing::info!(
            cache_dir = ?self.config.cache_dir,
            models = total,
            "Starting tokenizer preload"
        );

        let mut summary = BatchSummary::default();
        for (i, model_id) in self.config.models.iter().enumerate() {
            let progress = format!("{}/{}", i + 1, total);
            tracing::info!(model_id = %model_id, progress = %progress, "Processing model");
            let outcome = self.fetch(model_id, false).await;
            summary.push(model_id, outcome);
        }

        let structure = scan_cache_structure(&self.config.cache_dir);
        tracing::info!(
            total_files = structure.total_files,
            tokenizer_files = structure.tokenizer_files,
            config_files = structure.config_files,
            "Cache structure scanned"
        );
        if !structure.has_tokenizers() {
            tracing::warn!(cache_dir = ?self.config.cache_dir, "No tokenizer files found in cache");
        }

        for model_id in summary.successes() {
            manifest.insert(model_id);
        }
        manifest.offline_mode = Some(true);
        manifest.cache_dir = Some(self.config.cache_dir.clone());
        self.manifest.save(&mut manifest).await?;

        let below_threshold = summary.below_threshold(self.config.min_success_ratio);
        if below_threshold {
            tracing::warn!(
                success = summary.success_count(),
                total = summary.total(),
                ratio = summary.success_ratio(),
                min_ratio = self.config.min_success_ratio,
                "Low preload success ratio, some models may be unavailable offline"
            );
        }

        tracing::info!(
            success = summary.success_count(),
            total = summary.total(),
            "Preload complete"
        );

        Ok(PreloadReport {
            summary,
            structure,
            below_threshold,
        })
    }

    /// Manifest artifacts with their on-disk presence and size
    pub async fn list(&self) -> Result<ListReport> {
        let manifest = self.manifest.load().await?;

        let mut model_ids = manifest.downloaded_models.clone();
        model_ids.sort();

        let entries = model_ids
            .into_iter()
            .map(|model_id| {
                let presence = match get_cache_size(&self.config.cache_dir, &model_id) {
                    Some(size_bytes) => Presence::Present { size_bytes },
                    None => Presence::Missing,
                };
                ListEntry { model_id, presence }
            })
            .collect();

        Ok(ListReport {
            entries,
            last_updated: manifest.last_updated(),
        })
    }

    /// Force re-fetch of one artifact; record it in the manifest on success
    pub async fn update(&self, model_id: &str) -> Result<FetchOutcome> {
        validate_model_id(model_id)?;
        self.force_update(model_id).await
    }

    /// Force re-fetch of every manifest artifact
    pub async fn update_all(&self) -> Result<BatchSummary> {
        if !self.manifest.exists() {
            tracing::info!(path = ?self.manifest.path(), "No manifest found, nothing to update");
            return Ok(BatchSummary::default());
        }

        let manifest = self.manifest.load().await?;
        let models = manifest.downloaded_models;

        let mut summary = BatchSummary::default();
        if models.is_empty() {
            tracing::info!("No downloaded models found in manifest");
            return Ok(summary);
        }

        tracing::info!(models = models.len(), "Updating all models");

        for (i, model_id) in models.iter().enumerate() {
            let progress = format!("{}/{}", i + 1, models.len());
            tracing::info!(model_id = %model_id, progress = %progress, "Updating model");
            let outcome = self.force_update(model_id).await?;
            summary.push(model_id, outcome);
        }

        tracing::info!(
            success = summary.success_count(),
            total = summary.total(),
            "Update complete"
        );

        Ok(summary)
    }

    /// Check every manifest artifact offline
    ///
    /// Only reports; [`CacheManager::repair`] acts on the result.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let manifest = self.manifest.load().await?;

        let untracked: Vec<String> = list_cached_models(&self.config.cache_dir)
            .into_iter()
            .filter(|m| !manifest.contains(m))
            .collect();
        if !untracked.is_empty() {
            tracing::debug!(untracked = ?untracked, "Cached models not recorded in manifest");
        }

        let mut entries = Vec::with_capacity(manifest.downloaded_models.len());
        for model_id in &manifest.downloaded_models {
            let status = self.verify_model(model_id).await;
            match &status {
                VerifyStatus::Valid => tracing::info!(model_id = %model_id, "Verified"),
                VerifyStatus::Missing => tracing::warn!(model_id = %model_id, "Cache missing"),
                VerifyStatus::Invalid { reason } => {
                    tracing::warn!(model_id = %model_id, reason = %reason, "Verification failed")
                }
            }
            entries.push(VerifyEntry {
                model_id: model_id.clone(),
                status,
            });
        }

        Ok(VerifyReport { entries })
    }

    /// Offer to force-update every artifact a verify run found invalid
    ///
    /// Returns `None` when nothing needed repair or the operator declined.
    pub async fn repair(&self, report: &VerifyReport) -> Result<Option<BatchSummary>> {
        let invalid: Vec<&str> = report.invalid().map(|e| e.model_id.as_str()).collect();
        if invalid.is_empty() {
            return Ok(None);
        }

        let prompt = format!("Repair {} invalid model(s)?", invalid.len());
        if !self.confirm.confirm(&prompt) {
            tracing::info!(invalid = invalid.len(), "Repair declined");
            return Ok(None);
        }

        let mut repairs = BatchSummary::default();
        for model_id in invalid {
            let outcome = self.force_update(model_id).await?;
            repairs.push(model_id, outcome);
        }

        Ok(Some(repairs))
    }

    /// Delete everything in the cache except the manifest, then empty it
    pub async fn clean(&self) -> Result<CleanOutcome> {
        if !self
            .confirm
            .confirm("Delete all cached tokenizers? This removes every downloaded model")
        {
            tracing::info!("Clean cancelled");
            return Ok(CleanOutcome::Declined);
        }

        let mut manifest = match self.manifest.load().await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(error = %e, "Manifest unreadable, resetting it");
                Manifest::default()
            }
        };

        let removed = remove_cache_entries(&self.config.cache_dir, self.manifest.path()).await?;

        manifest.clear_models();
        self.manifest.save(&mut manifest).await?;

        tracing::info!(removed, "Cache cleaned");

        Ok(CleanOutcome::Cleaned { removed })
    }

    async fn force_update(&self, model_id: &str) -> Result<FetchOutcome> {
        tracing::info!(model_id = %model_id, "Forcing model update");

        let outcome = self.fetch(model_id, true).await;
        if outcome.is_ok() {
            let mut manifest = self.manifest.load().await?;
            manifest.insert(model_id);
            self.manifest.save(&mut manifest).await?;
        }

        Ok(outcome)
    }

    async fn verify_model(&self, model_id: &str) -> VerifyStatus {
        if !is_model_present(&self.config.cache_dir, model_id) {
            return VerifyStatus::Missing;
        }

        let tokenizer = match self.tokenizers.load(model_id, LoadMode::Offline).await {
            Ok(tokenizer) => tokenizer,
            Err(e) => {
                return VerifyStatus::Invalid {
                    reason: e.to_string(),
                };
            }
        };

        match run_probes(model_id, tokenizer.as_ref(), &[VERIFY_PROBE_TEXT]) {
            Ok(_) => VerifyStatus::Valid,
            Err(e) => VerifyStatus::Invalid {
                reason: e.to_string(),
            },
        }
    }
}

/// Remove every entry directly under `cache_dir` except `keep`
async fn remove_cache_entries(cache_dir: &Path, keep: &Path) -> Result<usize> {
    let mut entries = match fs::read_dir(cache_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read cache directory: {:?}", cache_dir));
        }
    };

    let keep_name = keep.file_name();
    let mut removed = 0;

    while let Some(entry) = entries
        .next_entry()
        .await
        .context("Failed to read cache directory entry")?
    {
        if Some(entry.file_name().as_os_str()) == keep_name {
            continue;
        }

        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Failed to stat {:?}", path))?;

        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.with_context(|| format!("Failed to remove {:?}", path))?;

        tracing::debug!(path = ?path, "Removed cache entry");
        removed += 1;
    }

    Ok(removed)
}
