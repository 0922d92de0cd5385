// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moondream2 backend with real weights from the Hugging Face Hub
//!
//! Downloads several GB on first run. Run with:
//! `cargo test --test moondream_tests -- --ignored`

use bookcover_vqa::{
    invoke, vision::GenerationConfig, HubConfig, InferenceError, Invocation, ModelHub,
    ModelProvider, ModelSource, MoondreamProvider, QuestionTokenizer,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

fn provider(max_new_tokens: usize) -> MoondreamProvider {
    let hub = ModelHub::new(&HubConfig::default()).unwrap();
    MoondreamProvider::new(
        hub,
        true,
        GenerationConfig {
            max_new_tokens,
            ..GenerationConfig::default()
        },
    )
}

#[tokio::test]
#[ignore = "downloads Moondream2 weights"]
async fn test_answers_about_synthetic_cover() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("1.JPG");
    let cover = RgbImage::from_fn(300, 450, |_, y| {
        if y < 150 {
            Rgb([180, 30, 30])
        } else {
            Rgb([240, 230, 210])
        }
    });
    DynamicImage::ImageRgb8(cover)
        .save_with_format(&image_path, ImageFormat::Jpeg)
        .unwrap();

    let request = Invocation {
        image_path,
        ..Invocation::default()
    };
    let answer = invoke(&provider(32), &request).await.unwrap();
    assert!(!answer.text.contains("<END>"));
    assert!(answer.timings.answer_ms > 0);
}

#[tokio::test]
#[ignore = "downloads Moondream2 weights"]
async fn test_tokenizer_from_other_revision_is_rejected() {
    let provider = provider(8);
    let source = ModelSource::default();
    let mut model = provider.acquire_model(&source).await.unwrap();
    let other = QuestionTokenizer::remote(ModelSource::new("vikhyatk/moondream2", "2024-05-20"));

    let encoded = model.encode_image(&DynamicImage::new_rgb8(64, 64)).unwrap();
    let err = model
        .answer_question(&encoded, "What is this?", &other)
        .await
        .unwrap_err();
    assert!(matches!(err, InferenceError::TokenizerMismatch { .. }));
}

#[tokio::test]
#[ignore = "fetches from the Hugging Face Hub"]
async fn test_fetches_tokenizer_at_pinned_revision() {
    let cache = tempfile::tempdir().unwrap();
    let hub = ModelHub::new(&HubConfig {
        cache_dir: Some(cache.path().to_path_buf()),
        ..HubConfig::default()
    })
    .unwrap();

    // Dated revisions answer with a relative redirect to the resolved commit
    let path = hub
        .fetch(&ModelSource::default(), "tokenizer.json")
        .await
        .unwrap();
    assert!(path.starts_with(cache.path()));
    assert!(path.is_file());
}
