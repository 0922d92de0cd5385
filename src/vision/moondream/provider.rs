// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Acquisition of Moondream2 weights and tokenizer from the Hub

use async_trait::async_trait;
use candle_core::Device;
use tracing::{info, warn};

use super::generation::GenerationConfig;
use super::model::MoondreamModel;
use crate::error::LoadError;
use crate::hub::{ModelHub, ModelSource};
use crate::tokenizer::QuestionTokenizer;
use crate::vision::backend::{ModelProvider, VisionLanguageModel};

/// Weights file in the model repository
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Tokenizer file in the model repository
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Pick the compute device: CUDA, then Metal, then CPU
pub fn select_device(force_cpu: bool) -> Result<Device, LoadError> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    if candle_core::utils::cuda_is_available() {
        return Device::new_cuda(0).map_err(|e| LoadError::Device(e.to_string()));
    }
    if candle_core::utils::metal_is_available() {
        return Device::new_metal(0).map_err(|e| LoadError::Device(e.to_string()));
    }
    Ok(Device::Cpu)
}

/// Provides in-process Moondream2 models
#[derive(Debug, Clone)]
pub struct MoondreamProvider {
    hub: ModelHub,
    force_cpu: bool,
    generation: GenerationConfig,
}

impl MoondreamProvider {
    pub fn new(hub: ModelHub, force_cpu: bool, generation: GenerationConfig) -> Self {
        Self {
            hub,
            force_cpu,
            generation,
        }
    }
}

#[async_trait]
impl ModelProvider for MoondreamProvider {
    fn name(&self) -> &'static str {
        "moondream"
    }

    async fn acquire_model(
        &self,
        source: &ModelSource,
    ) -> Result<Box<dyn VisionLanguageModel>, LoadError> {
        let weights = self.hub.fetch(source, WEIGHTS_FILE).await?;
        let device = select_device(self.force_cpu)?;
        if device.is_cpu() && !self.force_cpu {
            warn!("No GPU available, running {} on CPU", source);
        }

        let model = MoondreamModel::load(source.clone(), weights, device, self.generation.clone())?;
        Ok(Box::new(model))
    }

    async fn acquire_tokenizer(
        &self,
        source: &ModelSource,
    ) -> Result<QuestionTokenizer, LoadError> {
        let path = self.hub.fetch(source, TOKENIZER_FILE).await?;
        info!("Loading tokenizer from {}", path.display());
        QuestionTokenizer::from_file(source.clone(), path)
    }
}
