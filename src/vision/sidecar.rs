// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision-language model served by a remote VLM sidecar

use async_trait::async_trait;
use image::DynamicImage;
use tracing::info;

use crate::error::{InferenceError, LoadError};
use crate::hub::ModelSource;
use crate::tokenizer::QuestionTokenizer;
use crate::vision::backend::{ModelProvider, VisionLanguageModel};
use crate::vision::encoded::{EncodedImage, EncodedPayload, ModelInstanceId};
use crate::vision::image_utils::to_png_data_url;
use crate::vision::vlm_client::{SidecarConfig, VlmClient};

/// Handle to a model living in the sidecar
#[derive(Debug)]
pub struct SidecarModel {
    client: VlmClient,
    source: ModelSource,
    instance: ModelInstanceId,
    max_tokens: u32,
}

#[async_trait]
impl VisionLanguageModel for SidecarModel {
    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn instance_id(&self) -> ModelInstanceId {
        self.instance
    }

    fn encode_image(&mut self, image: &DynamicImage) -> Result<EncodedImage, InferenceError> {
        let data_url = to_png_data_url(image).map_err(|e| InferenceError::Encode(e.to_string()))?;
        info!("Encoded image as {} byte data URL", data_url.len());
        Ok(EncodedImage::new(
            self.instance,
            EncodedPayload::DataUrl(data_url),
        ))
    }

    async fn answer_question(
        &mut self,
        image: &EncodedImage,
        question: &str,
        tokenizer: &QuestionTokenizer,
    ) -> Result<String, InferenceError> {
        tokenizer.ensure_bound_to(&self.source)?;
        let data_url = match image.payload_for(self.instance)? {
            EncodedPayload::DataUrl(url) => url,
            EncodedPayload::Embeddings(_) => {
                return Err(InferenceError::Encode(
                    "expected an image data URL".to_string(),
                ))
            }
        };

        self.client.ask(question, data_url, self.max_tokens).await
    }
}

/// Provides models served by an OpenAI-compatible sidecar
#[derive(Debug, Clone)]
pub struct SidecarProvider {
    config: SidecarConfig,
    max_tokens: u32,
}

impl SidecarProvider {
    pub fn new(config: SidecarConfig, max_tokens: u32) -> Self {
        Self { config, max_tokens }
    }
}

#[async_trait]
impl ModelProvider for SidecarProvider {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    async fn acquire_model(
        &self,
        source: &ModelSource,
    ) -> Result<Box<dyn VisionLanguageModel>, LoadError> {
        let model_name = self
            .config
            .model_name
            .clone()
            .unwrap_or_else(|| source.model_id.clone());
        let client = VlmClient::new(&self.config.endpoint, &model_name)?;
        client.health_check().await?;

        Ok(Box::new(SidecarModel {
            client,
            source: source.clone(),
            instance: ModelInstanceId::next(),
            max_tokens: self.max_tokens,
        }))
    }

    async fn acquire_tokenizer(
        &self,
        source: &ModelSource,
    ) -> Result<QuestionTokenizer, LoadError> {
        Ok(QuestionTokenizer::remote(source.clone()))
    }
}
