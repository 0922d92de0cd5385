// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Stage ordering and output handling of `invoke`

use super::support::{events, write_image, ScriptedProvider};
use bookcover_vqa::{invoke, ImageError, InvokeError, Invocation, LoadError, ModelSource};
use image::ImageFormat;
use std::path::PathBuf;

#[tokio::test]
async fn test_stages_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(r#"{"title": "Dune", "author": "Frank Herbert"}"#);
    let request = Invocation {
        image_path: write_image(dir.path(), "1.JPG", ImageFormat::Jpeg),
        ..Invocation::default()
    };

    let answer = invoke(&provider, &request).await.unwrap();

    assert_eq!(answer.text, r#"{"title": "Dune", "author": "Frank Herbert"}"#);
    assert_eq!(
        events(&provider.log),
        vec![
            "model vikhyatk/moondream2@2024-08-26".to_string(),
            "tokenizer vikhyatk/moondream2@2024-08-26".to_string(),
            "encode 40x60".to_string(),
            format!("answer {}", request.question.len()),
        ]
    );
}

#[tokio::test]
async fn test_malformed_output_is_returned_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let reply = "```json\n{\"title\": \"Dune\"\n```  trailing";
    let provider = ScriptedProvider::new(reply);
    let request = Invocation {
        image_path: write_image(dir.path(), "cover.png", ImageFormat::Png),
        ..Invocation::default()
    };

    let answer = invoke(&provider, &request).await.unwrap();
    assert_eq!(answer.text, reply);
}

#[tokio::test]
async fn test_empty_output_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new("");
    let request = Invocation {
        image_path: write_image(dir.path(), "cover.png", ImageFormat::Png),
        ..Invocation::default()
    };

    let answer = invoke(&provider, &request).await.unwrap();
    assert!(answer.text.is_empty());
}

#[tokio::test]
async fn test_unreachable_model_touches_nothing_else() {
    let mut provider = ScriptedProvider::new("unused");
    provider.fail_model = true;
    let request = Invocation {
        source: ModelSource::new("vikhyatk/moondream2", "no-such-revision"),
        image_path: PathBuf::from("/nonexistent/1.JPG"),
        ..Invocation::default()
    };

    let err = invoke(&provider, &request).await.unwrap_err();
    assert!(matches!(err, InvokeError::Load(LoadError::Hub { .. })));
    assert_eq!(
        events(&provider.log),
        vec!["model vikhyatk/moondream2@no-such-revision".to_string()]
    );
}

#[tokio::test]
async fn test_missing_image_after_model_load() {
    let provider = ScriptedProvider::new("unused");
    let request = Invocation {
        image_path: PathBuf::from("/nonexistent/1.JPG"),
        ..Invocation::default()
    };

    let err = invoke(&provider, &request).await.unwrap_err();
    assert!(matches!(err, InvokeError::Image(ImageError::NotFound(_))));
    assert_eq!(events(&provider.log).len(), 2);
}

#[tokio::test]
async fn test_undecodable_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1.JPG");
    std::fs::write(&path, b"this is not an image").unwrap();

    let provider = ScriptedProvider::new("unused");
    let request = Invocation {
        image_path: path,
        ..Invocation::default()
    };

    let err = invoke(&provider, &request).await.unwrap_err();
    assert!(matches!(err, InvokeError::Image(_)));
    assert!(!events(&provider.log).iter().any(|e| e.starts_with("encode")));
}
