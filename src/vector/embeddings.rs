// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};

/// A fixed-dimension vector with the similarity measures the index uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    data: Vec<f32>,
    dimension: usize,
}

impl Embedding {
    pub fn new(data: Vec<f32>) -> Self {
        let dimension = data.len();
        Self { data, dimension }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn magnitude(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn dot_product(&self, other: &Embedding) -> f32 {
        if self.dimension != other.dimension {
            return 0.0;
        }

        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimension != other.dimension {
            return 0.0;
        }

        let magnitude_self = self.magnitude();
        let magnitude_other = other.magnitude();

        if magnitude_self == 0.0 || magnitude_other == 0.0 {
            0.0
        } else {
            self.dot_product(other) / (magnitude_self * magnitude_other)
        }
    }

    /// Unit-length copy; a zero vector stays zero
    pub fn normalized(&self) -> Embedding {
        let magnitude = self.magnitude();
        if magnitude == 0.0 {
            return self.clone();
        }
        Embedding::new(self.data.iter().map(|v| v / magnitude).collect())
    }
}
