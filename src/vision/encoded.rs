// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encoded images and the model instances that own them

use candle_core::Tensor;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::InferenceError;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a loaded model instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelInstanceId(u64);

impl ModelInstanceId {
    /// Allocate a fresh id; ids are never reused within a process
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ModelInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backend-specific representation of an encoded image
#[derive(Debug, Clone)]
pub enum EncodedPayload {
    /// Vision encoder output, `[1, patches, hidden]`
    Embeddings(Tensor),
    /// Image re-encoded for transport to a remote service
    DataUrl(String),
}

/// Image encoded by one model instance
///
/// Only the instance that produced it may answer questions about it; see
/// [`EncodedImage::payload_for`].
#[derive(Debug, Clone)]
pub struct EncodedImage {
    owner: ModelInstanceId,
    payload: EncodedPayload,
}

impl EncodedImage {
    pub fn new(owner: ModelInstanceId, payload: EncodedPayload) -> Self {
        Self { owner, payload }
    }

    /// Payload, if `instance` is the owner
    pub fn payload_for(&self, instance: ModelInstanceId) -> Result<&EncodedPayload, InferenceError> {
        if self.owner != instance {
            return Err(InferenceError::ForeignEncoding {
                expected: instance,
                found: self.owner,
            });
        }
        Ok(&self.payload)
    }
}
