// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision-language question answering
//!
//! This module provides:
//! - Image acquisition from the filesystem
//! - The backend boundary (`VisionLanguageModel`, `ModelProvider`)
//! - In-process Moondream2 on candle
//! - A remote OpenAI-compatible VLM sidecar

pub mod backend;
pub mod encoded;
pub mod image_utils;
pub mod moondream;
pub mod sidecar;
pub mod vlm_client;

pub use backend::{ModelProvider, VisionLanguageModel};
pub use encoded::{EncodedImage, EncodedPayload, ModelInstanceId};
pub use image_utils::{decode_image_bytes, detect_format, open_image, ImageError, ImageInfo};
pub use moondream::{GenerationConfig, MoondreamModel, MoondreamProvider};
pub use sidecar::{SidecarModel, SidecarProvider};
pub use vlm_client::{SidecarConfig, VlmClient};
