// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Embedding Providers
//!
//! [`HashingEmbedder`] is a local feature-hashing embedder: each lower-cased
//! token is hashed into one of `dimensions` buckets and the vector is
//! L2-normalised, so cosine similarity reflects shared vocabulary. It needs
//! no external service and is deterministic within a build.
//!
//! [`DisabledEmbedder`] always reports the backend unavailable, which puts the
//! memory store in keyword-fallback mode.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::config::EmbeddingConfig;
use crate::domain::memory::{EmbeddingError, EmbeddingProvider};

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '.' && c != ':' && c != '/')
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0f32; self.dimensions];
        let mut any = false;
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimensions as u64) as usize;
            // Sign bit spreads collisions instead of piling them up.
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            any = true;
        }
        if !any {
            return Err(EmbeddingError::EmptyInput);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("embedding disabled".to_string()))
    }
}

pub fn from_config(config: &EmbeddingConfig) -> Box<dyn EmbeddingProvider> {
    match config {
        EmbeddingConfig::Hashing { dimensions } => Box::new(HashingEmbedder::new(*dimensions)),
        EmbeddingConfig::Disabled => Box::new(DisabledEmbedder),
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
