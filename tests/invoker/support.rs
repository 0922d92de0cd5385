// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scripted provider that records every stage it is asked to run

use async_trait::async_trait;
use bookcover_vqa::{
    vision::EncodedPayload, EncodedImage, InferenceError, LoadError, ModelInstanceId,
    ModelProvider, ModelSource, QuestionTokenizer, VisionLanguageModel,
};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Model that answers with a fixed reply and records its calls
pub struct ScriptedModel {
    pub source: ModelSource,
    pub instance: ModelInstanceId,
    pub reply: String,
    pub log: EventLog,
}

impl ScriptedModel {
    pub fn new(source: &ModelSource, reply: &str, log: EventLog) -> Self {
        Self {
            source: source.clone(),
            instance: ModelInstanceId::next(),
            reply: reply.to_string(),
            log,
        }
    }
}

#[async_trait]
impl VisionLanguageModel for ScriptedModel {
    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn instance_id(&self) -> ModelInstanceId {
        self.instance
    }

    fn encode_image(&mut self, image: &DynamicImage) -> Result<EncodedImage, InferenceError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("encode {}x{}", image.width(), image.height()));
        Ok(EncodedImage::new(
            self.instance,
            EncodedPayload::DataUrl("data:image/png;base64,".to_string()),
        ))
    }

    async fn answer_question(
        &mut self,
        image: &EncodedImage,
        question: &str,
        tokenizer: &QuestionTokenizer,
    ) -> Result<String, InferenceError> {
        tokenizer.ensure_bound_to(&self.source)?;
        image.payload_for(self.instance)?;
        self.log
            .lock()
            .unwrap()
            .push(format!("answer {}", question.len()));
        Ok(self.reply.clone())
    }
}

/// Provider handing out `ScriptedModel`s
pub struct ScriptedProvider {
    pub reply: String,
    pub log: EventLog,
    pub fail_model: bool,
    pub tokenizer_source: Option<ModelSource>,
}

impl ScriptedProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            log: EventLog::default(),
            fail_model: false,
            tokenizer_source: None,
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn acquire_model(
        &self,
        source: &ModelSource,
    ) -> Result<Box<dyn VisionLanguageModel>, LoadError> {
        self.log.lock().unwrap().push(format!("model {}", source));
        if self.fail_model {
            return Err(LoadError::Hub {
                model: source.clone(),
                file: "model.safetensors".to_string(),
                reason: "404 Not Found".to_string(),
            });
        }
        Ok(Box::new(ScriptedModel::new(
            source,
            &self.reply,
            self.log.clone(),
        )))
    }

    async fn acquire_tokenizer(
        &self,
        source: &ModelSource,
    ) -> Result<QuestionTokenizer, LoadError> {
        self.log.lock().unwrap().push(format!("tokenizer {}", source));
        let bound = self.tokenizer_source.clone().unwrap_or_else(|| source.clone());
        Ok(QuestionTokenizer::remote(bound))
    }
}

pub fn write_image(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::new_rgb8(40, 60)
        .save_with_format(&path, format)
        .unwrap();
    path
}
