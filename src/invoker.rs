// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image question-answering invoker
//!
//! Runs the fixed sequence once:
//! 1. Acquire model
//! 2. Acquire tokenizer
//! 3. Open image
//! 4. Encode image
//! 5. Answer question
//!
//! Every stage completes before the next starts, and the first failure ends
//! the invocation. Model acquisition always precedes any image I/O.

use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::error::InvokeError;
use crate::hub::ModelSource;
use crate::vision::backend::ModelProvider;
use crate::vision::image_utils::{open_image, ImageInfo};

/// Default image path
pub const DEFAULT_IMAGE_PATH: &str = "/Users/raexiong/Desktop/1.JPG";

/// Default question
pub const DEFAULT_QUESTION: &str = "This is a book cover. Please identify the book title and author. Return ONLY a JSON response in the format: {\"title\": \"Book Title\", \"author\": \"Author Name\"} without any markdown formatting.";

/// One question about one image
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub source: ModelSource,
    pub image_path: PathBuf,
    pub question: String,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            source: ModelSource::default(),
            image_path: PathBuf::from(DEFAULT_IMAGE_PATH),
            question: DEFAULT_QUESTION.to_string(),
        }
    }
}

/// Wall-clock time spent in each stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    pub model_ms: u64,
    pub tokenizer_ms: u64,
    pub image_ms: u64,
    pub encode_ms: u64,
    pub answer_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.model_ms + self.tokenizer_ms + self.image_ms + self.encode_ms + self.answer_ms
    }
}

/// Result of an invocation
#[derive(Debug, Clone)]
pub struct Answer {
    /// Model output, unmodified
    pub text: String,
    pub model: ModelSource,
    pub image: ImageInfo,
    pub timings: StageTimings,
}

/// Run the five stages once, in order
pub async fn invoke(
    provider: &dyn ModelProvider,
    request: &Invocation,
) -> Result<Answer, InvokeError> {
    let mut timings = StageTimings::default();

    info!("Step 1: Acquiring model {} via {}", request.source, provider.name());
    let start = Instant::now();
    let mut model = provider.acquire_model(&request.source).await?;
    timings.model_ms = start.elapsed().as_millis() as u64;

    info!("Step 2: Acquiring tokenizer for {}", request.source);
    let start = Instant::now();
    let tokenizer = provider.acquire_tokenizer(&request.source).await?;
    timings.tokenizer_ms = start.elapsed().as_millis() as u64;

    info!("Step 3: Opening image {}", request.image_path.display());
    let start = Instant::now();
    let (image, image_info) = open_image(&request.image_path)?;
    timings.image_ms = start.elapsed().as_millis() as u64;
    info!(
        "Image is {}x{} {:?} ({} bytes)",
        image_info.width, image_info.height, image_info.format, image_info.size_bytes
    );

    info!("Step 4: Encoding image");
    let start = Instant::now();
    let encoded = model.encode_image(&image)?;
    timings.encode_ms = start.elapsed().as_millis() as u64;
    drop(image);

    info!("Step 5: Answering question");
    let start = Instant::now();
    let text = model
        .answer_question(&encoded, &request.question, &tokenizer)
        .await?;
    timings.answer_ms = start.elapsed().as_millis() as u64;

    info!(
        "Invocation complete: {} chars in {}ms",
        text.len(),
        timings.total_ms()
    );

    Ok(Answer {
        text,
        model: request.source.clone(),
        image: image_info,
        timings,
    })
}
