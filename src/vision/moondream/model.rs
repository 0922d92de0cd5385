// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moondream2 model wrapper for visual question answering
//!
//! This module combines:
//! - Multi-crop SigLIP vision encoder (image feature extraction)
//! - Phi-1.5 text model (answer generation)

use async_trait::async_trait;
use candle_core::{DType, Device, Module};
use candle_nn::VarBuilder;
use candle_transformers::models::mixformer::{self, MixFormerSequentialForCausalLM};
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::generation::{generate_answer, GenerationConfig};
use super::preprocessing::preprocess_for_moondream;
use super::vision::{VisionConfig, VisionEncoder};
use crate::error::{InferenceError, LoadError};
use crate::hub::ModelSource;
use crate::tokenizer::QuestionTokenizer;
use crate::vision::backend::VisionLanguageModel;
use crate::vision::encoded::{EncodedImage, EncodedPayload, ModelInstanceId};

/// Moondream2 running in-process on candle
pub struct MoondreamModel {
    vision: VisionEncoder,
    text_model: MixFormerSequentialForCausalLM,
    source: ModelSource,
    instance: ModelInstanceId,
    device: Device,
    dtype: DType,
    generation: GenerationConfig,
}

impl std::fmt::Debug for MoondreamModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoondreamModel")
            .field("source", &self.source)
            .field("instance", &self.instance)
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

impl MoondreamModel {
    /// Load Moondream2 weights from a safetensors file
    ///
    /// # Errors
    /// Returns [`LoadError::Weights`] if the file is missing, is not valid
    /// safetensors, or lacks tensors of the `vision_encoder` or `text_model`
    /// stacks.
    pub fn load<P: AsRef<Path>>(
        source: ModelSource,
        weights: P,
        device: Device,
        generation: GenerationConfig,
    ) -> Result<Self, LoadError> {
        let weights = weights.as_ref();
        let start = Instant::now();

        if !weights.exists() {
            return Err(LoadError::Weights {
                model: source,
                reason: format!("weights not found: {}", weights.display()),
            });
        }

        let dtype = if device.is_cpu() { DType::F32 } else { DType::F16 };
        info!(
            "Loading {} from {} ({:?} on {:?})",
            source,
            weights.display(),
            dtype,
            device
        );

        let weights_error = |e: candle_core::Error| LoadError::Weights {
            model: source.clone(),
            reason: e.to_string(),
        };

        // SAFETY: the mmapped file must not be modified while the model is alive;
        // hf-hub cache blobs are immutable.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], dtype, &device) }
            .map_err(weights_error)?;
        let vision = VisionEncoder::new(&VisionConfig::moondream2(), vb.pp("vision_encoder"))
            .map_err(weights_error)?;
        let text_model =
            MixFormerSequentialForCausalLM::new_v2(&mixformer::Config::v1_5(), vb.pp("text_model"))
                .map_err(weights_error)?;

        let instance = ModelInstanceId::next();
        info!(
            "✅ {} ready as instance {} in {}ms",
            source,
            instance,
            start.elapsed().as_millis()
        );

        Ok(Self {
            vision,
            text_model,
            source,
            instance,
            device,
            dtype,
            generation,
        })
    }
}

#[async_trait]
impl VisionLanguageModel for MoondreamModel {
    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn instance_id(&self) -> ModelInstanceId {
        self.instance
    }

    fn encode_image(&mut self, image: &DynamicImage) -> Result<EncodedImage, InferenceError> {
        let start = Instant::now();

        let pixels = preprocess_for_moondream(image, &self.device, self.dtype)
            .map_err(|e| InferenceError::Encode(format!("preprocessing: {}", e)))?;
        let embeds = self
            .vision
            .forward(&pixels)
            .map_err(|e| InferenceError::Encode(e.to_string()))?;

        info!(
            "Encoded {}x{} image to {:?} in {}ms",
            image.width(),
            image.height(),
            embeds.dims(),
            start.elapsed().as_millis()
        );
        Ok(EncodedImage::new(
            self.instance,
            EncodedPayload::Embeddings(embeds),
        ))
    }

    async fn answer_question(
        &mut self,
        image: &EncodedImage,
        question: &str,
        tokenizer: &QuestionTokenizer,
    ) -> Result<String, InferenceError> {
        tokenizer.ensure_bound_to(&self.source)?;
        let embeds = match image.payload_for(self.instance)? {
            EncodedPayload::Embeddings(t) => t,
            EncodedPayload::DataUrl(_) => {
                return Err(InferenceError::Encode(
                    "expected vision encoder embeddings".to_string(),
                ))
            }
        };

        generate_answer(
            &mut self.text_model,
            embeds,
            question,
            tokenizer,
            &self.generation,
            &self.device,
        )
    }
}
