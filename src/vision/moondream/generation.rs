// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Autoregressive answer generation for Moondream2
//!
//! The Phi text model is conditioned on the image embeddings once, on the
//! first step; later steps feed a single token through the KV cache.

use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::mixformer::MixFormerSequentialForCausalLM;
use candle_transformers::utils::apply_repeat_penalty;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::tokenizer::QuestionTokenizer;

/// Default maximum tokens to generate
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;

/// Marker Moondream emits after an answer
pub const END_MARKER: &str = "<END>";

/// Sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    /// `None` selects greedy decoding
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
    /// 1.0 disables the penalty
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: None,
            top_p: None,
            seed: 299792458,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
        }
    }
}

/// Text decoder that can be conditioned on image embeddings
pub trait TextDecoder {
    fn clear_kv_cache(&mut self);

    /// First step: BOS, then image embeddings, then the prompt tokens
    fn forward_with_image(
        &mut self,
        bos: &Tensor,
        prompt: &Tensor,
        image_embeds: &Tensor,
    ) -> candle_core::Result<Tensor>;

    /// Later steps: tokens appended after the cached context
    fn forward(&mut self, input: &Tensor) -> candle_core::Result<Tensor>;
}

impl TextDecoder for MixFormerSequentialForCausalLM {
    fn clear_kv_cache(&mut self) {
        MixFormerSequentialForCausalLM::clear_kv_cache(self)
    }

    fn forward_with_image(
        &mut self,
        bos: &Tensor,
        prompt: &Tensor,
        image_embeds: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.forward_with_img(bos, prompt, image_embeds)
    }

    fn forward(&mut self, input: &Tensor) -> candle_core::Result<Tensor> {
        MixFormerSequentialForCausalLM::forward(self, input)
    }
}

/// Prompt template the model was trained with
pub fn build_prompt(question: &str) -> String {
    format!("\n\nQuestion: {}\n\nAnswer:", question)
}

/// Generate an answer to `question` about the embedded image
pub fn generate_answer<D: TextDecoder + ?Sized>(
    decoder: &mut D,
    image_embeds: &Tensor,
    question: &str,
    tokenizer: &QuestionTokenizer,
    config: &GenerationConfig,
    device: &Device,
) -> Result<String, InferenceError> {
    // <|endoftext|> doubles as BOS for the Phi tokenizer
    let eos_token = tokenizer.eos_token_id()?;
    let end_marker = tokenizer.encode(END_MARKER, false)?;

    let mut tokens = tokenizer.encode(&build_prompt(question), true)?;
    if tokens.is_empty() {
        return Err(InferenceError::Generation(
            "question encoded to zero tokens".to_string(),
        ));
    }
    let prompt_len = tokens.len();
    info!("Prompt tokenized to {} tokens", prompt_len);

    let mut logits_processor = LogitsProcessor::new(config.seed, config.temperature, config.top_p);
    decoder.clear_kv_cache();
    let bos = Tensor::new(&[eos_token], device)?.unsqueeze(0)?;

    for index in 0..config.max_new_tokens {
        let context_size = if index > 0 { 1 } else { tokens.len() };
        let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
        let input = Tensor::new(ctxt, device)?.unsqueeze(0)?;

        let logits = if index > 0 {
            decoder.forward(&input)?
        } else {
            decoder.forward_with_image(&bos, &input, image_embeds)?
        };
        let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
        let logits = if config.repeat_penalty == 1.0 {
            logits
        } else {
            let start_at = tokens.len().saturating_sub(config.repeat_last_n);
            apply_repeat_penalty(&logits, config.repeat_penalty, &tokens[start_at..])?
        };

        let next_token = logits_processor.sample(&logits)?;
        if next_token == eos_token {
            debug!("EOS after {} generated tokens", index);
            break;
        }
        tokens.push(next_token);

        if !end_marker.is_empty() && tokens[prompt_len..].ends_with(&end_marker) {
            tokens.truncate(tokens.len() - end_marker.len());
            debug!("End marker after {} generated tokens", index + 1);
            break;
        }
    }

    let generated = &tokens[prompt_len..];
    let text = tokenizer.decode(generated, true)?;
    info!("Generated {} tokens ({} chars)", generated.len(), text.len());

    Ok(text.trim().to_string())
}
