// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Hugging Face Hub access for pinned model snapshots
//!
//! A [`ModelSource`] names a remote model snapshot by repository id and
//! revision. [`ModelHub`] resolves individual files of that snapshot to local
//! paths, downloading into the hf-hub cache on first use.

use hf_hub::api::tokio::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::LoadError;

/// Default model repository
pub const DEFAULT_MODEL_ID: &str = "vikhyatk/moondream2";

/// Default pinned revision
pub const DEFAULT_REVISION: &str = "2024-08-26";

/// Identity of a remote model snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSource {
    /// Repository id, e.g. `vikhyatk/moondream2`
    pub model_id: String,
    /// Branch, tag, or commit the snapshot is pinned to
    pub revision: String,
}

impl ModelSource {
    pub fn new(model_id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: revision.into(),
        }
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_ID, DEFAULT_REVISION)
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model_id, self.revision)
    }
}

/// Settings for the hub client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Override for the hf-hub cache directory
    pub cache_dir: Option<PathBuf>,
    /// Access token for gated or private repositories
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Show download progress bars on stderr
    pub progress: bool,
}

/// Fetches files of pinned model snapshots
#[derive(Clone)]
pub struct ModelHub {
    api: Api,
}

impl fmt::Debug for ModelHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHub").finish_non_exhaustive()
    }
}

impl ModelHub {
    /// Build a hub client from configuration
    pub fn new(config: &HubConfig) -> Result<Self, LoadError> {
        let mut builder = ApiBuilder::new().with_progress(config.progress);
        // Without an explicit token the builder keeps the one from `huggingface-cli login`
        if config.token.is_some() {
            builder = builder.with_token(config.token.clone());
        }
        if let Some(ref dir) = config.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }

        let api = builder
            .build()
            .map_err(|e| LoadError::HubClient(e.to_string()))?;

        Ok(Self { api })
    }

    /// Resolve one file of the snapshot to a local path
    ///
    /// Cached files are returned without network access. An unknown
    /// repository, revision, or file name is a [`LoadError::Hub`].
    pub async fn fetch(&self, source: &ModelSource, filename: &str) -> Result<PathBuf, LoadError> {
        let start = Instant::now();
        let repo = self.api.repo(Repo::with_revision(
            source.model_id.clone(),
            RepoType::Model,
            source.revision.clone(),
        ));

        debug!("Resolving {} from {}", filename, source);
        let path = repo.get(filename).await.map_err(|e| LoadError::Hub {
            model: source.clone(),
            file: filename.to_string(),
            reason: e.to_string(),
        })?;

        info!(
            "Resolved {} for {} in {}ms",
            filename,
            source,
            start.elapsed().as_millis()
        );
        Ok(path)
    }
}
