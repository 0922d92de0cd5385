// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! VLM sidecar client for visual question answering via OpenAI-compatible API

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{InferenceError, LoadError};

/// Default sidecar endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081";

// --- OpenAI-compatible serde structs ---

#[derive(Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatRequest {
    /// One user turn holding the question and the image
    pub(crate) fn question(model: &str, question: &str, data_url: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::json!([
                    {"type": "text", "text": question},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]),
            }],
            max_tokens,
            temperature: 0.0,
        }
    }
}

impl ChatResponse {
    /// Content of the first choice
    pub(crate) fn into_answer(self) -> Result<String, InferenceError> {
        if let Some(usage) = &self.usage {
            debug!(
                "Sidecar usage: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::Sidecar("response has no choices".to_string()))
    }
}

/// Connection settings for the sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Base URL of the OpenAI-compatible server
    pub endpoint: String,
    /// Model name sent in requests; the model id is used when unset
    pub model_name: Option<String>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model_name: None,
        }
    }
}

/// Client for calling a VLM sidecar service via OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct VlmClient {
    client: Client,
    endpoint: String,
    model_name: String,
}

impl VlmClient {
    /// Create a new VLM client
    pub fn new(endpoint: &str, model_name: &str) -> Result<Self, LoadError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let client = Client::builder().build().map_err(|e| LoadError::Sidecar {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "VLM client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Check that the VLM sidecar answers `GET /health` with a 2xx status
    pub async fn health_check(&self) -> Result<(), LoadError> {
        let unavailable = |reason: String| LoadError::Sidecar {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let resp = self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(unavailable(format!("health check returned {}", resp.status())));
        }
        Ok(())
    }

    /// Ask a question about the image in `data_url`
    pub async fn ask(
        &self,
        question: &str,
        data_url: &str,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let start = std::time::Instant::now();
        let request = ChatRequest::question(&self.model_name, question, data_url, max_tokens);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Sidecar(e.to_string()))?
            .error_for_status()
            .map_err(|e| InferenceError::Sidecar(e.to_string()))?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Sidecar(format!("malformed response: {}", e)))?;
        let answer = chat_response.into_answer()?;

        info!(
            "Sidecar answered in {}ms ({} chars)",
            start.elapsed().as_millis(),
            answer.len()
        );
        Ok(answer)
    }
}
