// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sidecar backend against an in-process OpenAI-compatible stub

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bookcover_vqa::{
    invoke, vision::vlm_client::SidecarConfig, InferenceError, InvokeError, Invocation,
    LoadError, ModelProvider, SidecarProvider,
};
use image::{DynamicImage, ImageFormat};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct StubState {
    requests: Arc<Mutex<Vec<Value>>>,
    status: Option<StatusCode>,
    reply: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<StubState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.requests.lock().unwrap().push(body);
    if let Some(status) = state.status {
        return Err(status);
    }
    Ok(Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": state.reply } }],
        "usage": { "prompt_tokens": 700, "completion_tokens": 20, "total_tokens": 720 }
    })))
}

/// Serve the stub on an ephemeral port and return its base URL
async fn spawn_stub(state: StubState) -> String {
    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/chat/completions", post(chat))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn provider_for(endpoint: String) -> SidecarProvider {
    SidecarProvider::new(
        SidecarConfig {
            endpoint,
            model_name: None,
        },
        256,
    )
}

#[tokio::test]
async fn test_invocation_through_sidecar() {
    let state = StubState {
        reply: r#"{"title": "Dune", "author": "Frank Herbert"}"#.to_string(),
        ..StubState::default()
    };
    let endpoint = spawn_stub(state.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("1.JPG");
    DynamicImage::new_rgb8(32, 48)
        .save_with_format(&image_path, ImageFormat::Jpeg)
        .unwrap();

    let request = Invocation {
        image_path,
        ..Invocation::default()
    };
    let answer = invoke(&provider_for(endpoint), &request).await.unwrap();
    assert_eq!(answer.text, r#"{"title": "Dune", "author": "Frank Herbert"}"#);

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["model"], "vikhyatk/moondream2");
    assert_eq!(body["max_tokens"], 256);
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["text"], request.question.as_str());
    assert!(content[1]["image_url"]["url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_server_error_is_inference_error() {
    let state = StubState {
        status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..StubState::default()
    };
    let endpoint = spawn_stub(state).await;

    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("cover.png");
    DynamicImage::new_rgb8(8, 8)
        .save_with_format(&image_path, ImageFormat::Png)
        .unwrap();

    let request = Invocation {
        image_path,
        ..Invocation::default()
    };
    let err = invoke(&provider_for(endpoint), &request).await.unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Inference(InferenceError::Sidecar(_))
    ));
}

#[tokio::test]
async fn test_configured_model_name_is_sent() {
    let state = StubState {
        reply: "ok".to_string(),
        ..StubState::default()
    };
    let endpoint = spawn_stub(state.clone()).await;
    let provider = SidecarProvider::new(
        SidecarConfig {
            endpoint,
            model_name: Some("moondream2-q8".to_string()),
        },
        32,
    );

    let source = Invocation::default().source;
    let mut model = provider.acquire_model(&source).await.unwrap();
    let tokenizer = provider.acquire_tokenizer(&source).await.unwrap();
    let encoded = model.encode_image(&DynamicImage::new_rgb8(4, 4)).unwrap();
    let answer = model
        .answer_question(&encoded, "Title?", &tokenizer)
        .await
        .unwrap();

    assert_eq!(answer, "ok");
    let requests = state.requests.lock().unwrap();
    assert_eq!(requests[0]["model"], "moondream2-q8");
    assert_eq!(requests[0]["max_tokens"], 32);
}

#[tokio::test]
async fn test_missing_health_route_fails_acquisition() {
    let app = Router::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let result = provider_for(format!("http://{}", addr))
        .acquire_model(&Invocation::default().source)
        .await;
    assert!(matches!(result, Err(LoadError::Sidecar { .. })));
}
