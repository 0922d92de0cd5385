// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tokenizer bound to a single model snapshot

use std::path::Path;
use tracing::info;

use crate::error::{InferenceError, LoadError};
use crate::hub::ModelSource;

/// End-of-text marker shared by the Phi tokenizer family
pub const END_OF_TEXT: &str = "<|endoftext|>";

enum Binding {
    /// Tokenizer loaded from `tokenizer.json`
    Local {
        inner: tokenizers::Tokenizer,
        eos_token_id: u32,
    },
    /// Tokenization happens inside a remote VLM service
    Remote,
}

/// Tokenizer acquired for one [`ModelSource`]
///
/// Backends refuse a tokenizer whose source differs from their own.
pub struct QuestionTokenizer {
    source: ModelSource,
    binding: Binding,
}

impl std::fmt::Debug for QuestionTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionTokenizer")
            .field("source", &self.source)
            .field("remote", &self.is_remote())
            .finish()
    }
}

impl QuestionTokenizer {
    /// Load a tokenizer file for `source`
    pub fn from_file<P: AsRef<Path>>(source: ModelSource, path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| LoadError::Tokenizer {
            model: source.clone(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_tokenizer(source, inner)
    }

    /// Wrap an already constructed tokenizer
    pub fn from_tokenizer(
        source: ModelSource,
        inner: tokenizers::Tokenizer,
    ) -> Result<Self, LoadError> {
        let eos_token_id = inner
            .get_vocab(true)
            .get(END_OF_TEXT)
            .copied()
            .ok_or_else(|| LoadError::Tokenizer {
                model: source.clone(),
                reason: format!("vocabulary has no {} token", END_OF_TEXT),
            })?;

        info!(
            "Loaded tokenizer for {} with {} tokens",
            source,
            inner.get_vocab_size(true)
        );

        Ok(Self {
            source,
            binding: Binding::Local {
                inner,
                eos_token_id,
            },
        })
    }

    /// Tokenizer whose work is done by a remote service serving `source`
    pub fn remote(source: ModelSource) -> Self {
        Self {
            source,
            binding: Binding::Remote,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.binding, Binding::Remote)
    }

    /// Fails unless this tokenizer was acquired for `model`
    pub fn ensure_bound_to(&self, model: &ModelSource) -> Result<(), InferenceError> {
        if &self.source != model {
            return Err(InferenceError::TokenizerMismatch {
                model: model.clone(),
                tokenizer: self.source.clone(),
            });
        }
        Ok(())
    }

    /// Token id used both to open and to close a sequence
    pub fn eos_token_id(&self) -> Result<u32, InferenceError> {
        match &self.binding {
            Binding::Local { eos_token_id, .. } => Ok(*eos_token_id),
            Binding::Remote => Err(remote_only()),
        }
    }

    /// Encode text to token ids
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, InferenceError> {
        let inner = self.local()?;
        let encoding = inner
            .encode(text, add_special_tokens)
            .map_err(|e| InferenceError::Tokenizer(format!("encode error: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token ids to text
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, InferenceError> {
        self.local()?
            .decode(ids, skip_special_tokens)
            .map_err(|e| InferenceError::Tokenizer(format!("decode error: {}", e)))
    }

    fn local(&self) -> Result<&tokenizers::Tokenizer, InferenceError> {
        match &self.binding {
            Binding::Local { inner, .. } => Ok(inner),
            Binding::Remote => Err(remote_only()),
        }
    }
}

fn remote_only() -> InferenceError {
    InferenceError::Tokenizer("tokenizer is held by the remote service".to_string())
}
