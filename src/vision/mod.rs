// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image feature extraction
//!
//! This module provides:
//! - [`ImageObservation`], the structured evidence an image contributes to a prompt
//! - [`FeatureExtractor`], the capability interface the pipeline calls
//! - [`HeuristicRoomAnalyzer`], a CPU-only extractor based on pixel statistics
//!   and room classification from detected labels

pub mod analyzer;
pub mod image_utils;

pub use analyzer::{classify_room, dominant_colors, HeuristicRoomAnalyzer, ROOM_SIGNATURES};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One fact observed in an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageObservation {
    pub label: String,
    /// Always within `[0, 1]`
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_region: Option<BoundingRegion>,
}

impl ImageObservation {
    /// Create an observation; confidence is clamped into `[0, 1]` and NaN becomes 0
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
            bounding_region: None,
        }
    }

    pub fn with_region(mut self, region: BoundingRegion) -> Self {
        self.bounding_region = Some(region);
        self
    }

    /// Label text usable as a search term (`room:bathroom` → `bathroom`)
    pub fn search_term(&self) -> &str {
        match self.label.split_once(':') {
            Some((_, value)) => value,
            None => &self.label,
        }
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Image decoding failed: {0}")]
    Image(#[from] ImageError),

    #[error("Feature extraction failed: {0}")]
    Extraction(String),
}

/// Turns raw image bytes into observations
///
/// Failures are non-fatal to the caller: the pipeline treats any error as
/// "no observations".
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract_features(&self, image: &[u8]) -> Result<Vec<ImageObservation>, VisionError>;

    /// Name for logging
    fn name(&self) -> &'static str;
}
