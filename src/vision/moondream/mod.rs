// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moondream2 integration for visual question answering
//!
//! Components:
//! - `preprocessing` - Image preprocessing for encoder input
//! - `vision` - Multi-crop SigLIP encoder and projection
//! - `generation` - Prompt template and answer decoding loop
//! - `model` - Combined encoder + text model
//! - `provider` - Hub acquisition of weights and tokenizer

pub mod generation;
pub mod model;
pub mod preprocessing;
pub mod provider;
pub mod vision;

pub use generation::{GenerationConfig, TextDecoder};
pub use model::MoondreamModel;
pub use provider::{select_device, MoondreamProvider};
pub use vision::{VisionConfig, VisionEncoder};
