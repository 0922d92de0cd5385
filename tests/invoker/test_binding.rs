// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encoded images and tokenizers are bound to the model that produced them

use super::support::{write_image, EventLog, ScriptedModel, ScriptedProvider};
use bookcover_vqa::{
    invoke, vision::open_image, InferenceError, InvokeError, Invocation, ModelSource,
    QuestionTokenizer, VisionLanguageModel,
};
use image::ImageFormat;

#[tokio::test]
async fn test_encoding_from_another_instance_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (image, _) = open_image(write_image(dir.path(), "1.png", ImageFormat::Png)).unwrap();
    let source = ModelSource::default();
    let tokenizer = QuestionTokenizer::remote(source.clone());

    let mut first = ScriptedModel::new(&source, "first", EventLog::default());
    let mut second = ScriptedModel::new(&source, "second", EventLog::default());

    let encoded = first.encode_image(&image).unwrap();
    let err = second
        .answer_question(&encoded, "Who wrote this?", &tokenizer)
        .await
        .unwrap_err();

    match err {
        InferenceError::ForeignEncoding { expected, found } => {
            assert_eq!(expected, second.instance_id());
            assert_eq!(found, first.instance_id());
        }
        other => panic!("unexpected error: {other}"),
    }

    let answer = first
        .answer_question(&encoded, "Who wrote this?", &tokenizer)
        .await
        .unwrap();
    assert_eq!(answer, "first");
}

#[tokio::test]
async fn test_tokenizer_of_other_revision_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut provider = ScriptedProvider::new("unused");
    provider.tokenizer_source = Some(ModelSource::new("vikhyatk/moondream2", "2024-05-20"));
    let request = Invocation {
        image_path: write_image(dir.path(), "1.png", ImageFormat::Png),
        ..Invocation::default()
    };

    let err = invoke(&provider, &request).await.unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Inference(InferenceError::TokenizerMismatch { .. })
    ));
}

#[test]
fn test_instance_ids_are_unique() {
    let source = ModelSource::default();
    let a = ScriptedModel::new(&source, "", EventLog::default());
    let b = ScriptedModel::new(&source, "", EventLog::default());
    assert_ne!(a.instance_id(), b.instance_id());
}
