//! Store-wide configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sync mode for write-ahead log writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Sync after every write (safest, slowest).
    Immediate,
    /// Sync after a batch of writes.
    #[default]
    Batched,
    /// Don't sync (fastest, risk of data loss on crash).
    NoSync,
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "batched" => Ok(Self::Batched),
            "no_sync" | "nosync" | "none" => Ok(Self::NoSync),
            other => Err(Error::InvalidArgument(format!("unknown sync mode: {other}"))),
        }
    }
}

/// Configuration for a [`VectorStore`](crate::VectorStore).
///
/// # Example
///
/// ```
/// use ragstore_core::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_default_k(8)
///     .with_similarity_threshold(0.2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Result count used when a search does not name one.
    pub default_k: usize,
    /// Results scoring below this are dropped after ranking.
    pub similarity_threshold: Option<f32>,
    /// Candidate pool size for diversity-aware search.
    pub mmr_fetch_k: usize,
    /// Relevance/diversity trade-off for diversity-aware search.
    pub mmr_lambda: f32,
    /// Directory for durable storage. In-memory when unset.
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            similarity_threshold: None,
            mmr_fetch_k: 20,
            mmr_lambda: 0.5,
            data_dir: None,
            sync_mode: SyncMode::Batched,
        }
    }
}

impl StoreConfig {
    /// Reads `RAGSTORE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(k) = parse_var(&lookup, "RAGSTORE_DEFAULT_K")? {
            config.default_k = k;
        }
        if let Some(threshold) = parse_var(&lookup, "RAGSTORE_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = Some(threshold);
        }
        if let Some(fetch_k) = parse_var(&lookup, "RAGSTORE_MMR_FETCH_K")? {
            config.mmr_fetch_k = fetch_k;
        }
        if let Some(lambda) = parse_var(&lookup, "RAGSTORE_MMR_LAMBDA")? {
            config.mmr_lambda = lambda;
        }
        if let Some(dir) = lookup("RAGSTORE_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = lookup("RAGSTORE_SYNC_MODE") {
            config.sync_mode = mode.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn with_mmr(mut self, fetch_k: usize, lambda: f32) -> Self {
        self.mmr_fetch_k = fetch_k;
        self.mmr_lambda = lambda;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_k == 0 {
            return Err(Error::InvalidArgument("default_k must be at least 1".into()));
        }
        if self.mmr_fetch_k == 0 {
            return Err(Error::InvalidArgument("mmr_fetch_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(Error::InvalidArgument(format!(
                "mmr_lambda must be within [0, 1], got {}",
                self.mmr_lambda
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidArgument(format!("{key}: cannot parse `{raw}`"))),
    }
}
