// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::config::{BackendKind, InvokerConfig};
use crate::invoker::{invoke, Answer};
use crate::version;

/// Ask a vision-language model about a book cover
#[derive(Parser, Debug, Default)]
#[command(name = "bookcover-vqa")]
#[command(version = version::VERSION_NUMBER)]
#[command(about = "Identify the title and author on a book cover image", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "BOOKCOVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hugging Face model repository
    #[arg(long, env = "BOOKCOVER_MODEL_ID")]
    pub model_id: Option<String>,

    /// Model revision (tag, branch or commit)
    #[arg(long, env = "BOOKCOVER_REVISION")]
    pub revision: Option<String>,

    /// Image to ask about
    #[arg(long, env = "BOOKCOVER_IMAGE")]
    pub image: Option<PathBuf>,

    /// Question to ask
    #[arg(long, env = "BOOKCOVER_QUESTION")]
    pub question: Option<String>,

    /// Inference backend (moondream/sidecar)
    #[arg(long, env = "BOOKCOVER_BACKEND")]
    pub backend: Option<String>,

    /// Base URL of the OpenAI-compatible VLM sidecar
    #[arg(long, env = "VLM_ENDPOINT")]
    pub sidecar_endpoint: Option<String>,

    /// Model name sent to the sidecar
    #[arg(long, env = "VLM_MODEL_NAME")]
    pub sidecar_model: Option<String>,

    /// hf-hub cache directory
    #[arg(long, env = "HF_HUB_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Hugging Face access token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Run on CPU even when a GPU is available
    #[arg(long)]
    pub cpu: bool,

    /// Maximum number of generated tokens
    #[arg(long)]
    pub max_new_tokens: Option<usize>,

    /// Sampling temperature; greedy when unset
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling probability cutoff
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Sampling seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Penalty for repeated tokens, 1.0 disables it
    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    /// Context size considered by the repeat penalty
    #[arg(long)]
    pub repeat_last_n: Option<usize>,
}

impl Cli {
    /// Merge defaults, the optional config file and the flags, in that order
    pub fn resolve_config(&self) -> Result<InvokerConfig> {
        let mut config = match &self.config {
            Some(path) => InvokerConfig::from_file(path)?,
            None => InvokerConfig::default(),
        };

        if let Some(model_id) = &self.model_id {
            config.model_id = model_id.clone();
        }
        if let Some(revision) = &self.revision {
            config.revision = revision.clone();
        }
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(question) = &self.question {
            config.question = question.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.parse::<BackendKind>()?;
        }
        if let Some(endpoint) = &self.sidecar_endpoint {
            config.sidecar.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.sidecar_model {
            config.sidecar.model_name = Some(model.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.hub.cache_dir = Some(cache_dir.clone());
        }
        if let Some(token) = &self.hf_token {
            config.hub.token = Some(token.clone());
        }
        if self.cpu {
            config.cpu = true;
        }

        let generation = &mut config.generation;
        if let Some(max_new_tokens) = self.max_new_tokens {
            generation.max_new_tokens = max_new_tokens;
        }
        if self.temperature.is_some() {
            generation.temperature = self.temperature;
        }
        if self.top_p.is_some() {
            generation.top_p = self.top_p;
        }
        if let Some(seed) = self.seed {
            generation.seed = seed;
        }
        if let Some(penalty) = self.repeat_penalty {
            generation.repeat_penalty = penalty;
        }
        if let Some(last_n) = self.repeat_last_n {
            generation.repeat_last_n = last_n;
        }

        Ok(config)
    }
}

/// Execute one invocation
pub async fn execute(cli: Cli) -> Result<Answer> {
    let config = cli.resolve_config()?;
    info!(
        "Using {} backend for {}@{}",
        config.backend, config.model_id, config.revision
    );

    let provider = config
        .provider()
        .context("Failed to set up model provider")?;
    let answer = invoke(provider.as_ref(), &config.invocation()).await?;
    Ok(answer)
}
