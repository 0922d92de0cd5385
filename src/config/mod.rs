// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Invoker configuration
//!
//! Defaults reproduce the fixed invocation. A TOML file may override any
//! subset; CLI flags and environment variables override the file.
//!
//! ```toml
//! model_id = "vikhyatk/moondream2"
//! revision = "2024-08-26"
//! image = "/Users/raexiong/Desktop/1.JPG"
//! backend = "moondream"
//!
//! [generation]
//! max_new_tokens = 256
//!
//! [sidecar]
//! endpoint = "http://localhost:8081"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, LoadError};
use crate::hub::{HubConfig, ModelHub, ModelSource, DEFAULT_MODEL_ID, DEFAULT_REVISION};
use crate::invoker::{Invocation, DEFAULT_IMAGE_PATH, DEFAULT_QUESTION};
use crate::vision::backend::ModelProvider;
use crate::vision::moondream::{GenerationConfig, MoondreamProvider};
use crate::vision::sidecar::SidecarProvider;
use crate::vision::vlm_client::SidecarConfig;

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    /// Moondream2 in-process on candle
    #[default]
    Moondream,
    /// OpenAI-compatible VLM sidecar over HTTP
    Sidecar,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moondream" | "local" => Ok(Self::Moondream),
            "sidecar" | "openai" | "remote" => Ok(Self::Sidecar),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moondream => write!(f, "moondream"),
            Self::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// Complete invoker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    pub model_id: String,
    pub revision: String,
    pub image: PathBuf,
    pub question: String,
    pub backend: BackendKind,
    /// Skip GPU detection for the local backend
    pub cpu: bool,
    pub generation: GenerationConfig,
    pub sidecar: SidecarConfig,
    pub hub: HubConfig,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            image: PathBuf::from(DEFAULT_IMAGE_PATH),
            question: DEFAULT_QUESTION.to_string(),
            backend: BackendKind::default(),
            cpu: false,
            generation: GenerationConfig::default(),
            sidecar: SidecarConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

impl InvokerConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn source(&self) -> ModelSource {
        ModelSource::new(self.model_id.clone(), self.revision.clone())
    }

    pub fn invocation(&self) -> Invocation {
        Invocation {
            source: self.source(),
            image_path: self.image.clone(),
            question: self.question.clone(),
        }
    }

    /// Build the provider for the configured backend
    pub fn provider(&self) -> Result<Box<dyn ModelProvider>, LoadError> {
        match self.backend {
            BackendKind::Moondream => {
                let hub = ModelHub::new(&self.hub)?;
                Ok(Box::new(MoondreamProvider::new(
                    hub,
                    self.cpu,
                    self.generation.clone(),
                )))
            }
            BackendKind::Sidecar => {
                let max_tokens = u32::try_from(self.generation.max_new_tokens).unwrap_or(u32::MAX);
                Ok(Box::new(SidecarProvider::new(self.sidecar.clone(), max_tokens)))
            }
        }
    }
}
