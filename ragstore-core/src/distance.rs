//! Distance metrics for vector similarity computations.
//!
//! All metrics are expressed as distances where lower means more similar.
//! [`DistanceMetric::score`] maps a distance back to a similarity score where
//! higher means more similar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported distance metrics, fixed per collection at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity).
    #[default]
    Cosine,
    /// Negative inner product, so lower = more similar like the other metrics.
    InnerProduct,
    /// Euclidean distance (L2 norm).
    Euclidean,
}

impl DistanceMetric {
    /// Computes the distance between two vectors using this metric.
    #[inline]
    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::InnerProduct => -dot_product(a, b),
            DistanceMetric::Euclidean => euclidean_distance(a, b),
        }
    }

    /// Converts a distance under this metric into a similarity score.
    ///
    /// - cosine: `1 - d` (the cosine similarity)
    /// - inner product: `-d` (the raw inner product)
    /// - euclidean: `1 / (1 + d)`
    #[inline]
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::InnerProduct => -distance,
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "inner_product" | "dot" | "dot_product" => Ok(DistanceMetric::InnerProduct),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(Error::InvalidArgument(format!(
                "unknown distance metric: {other}"
            ))),
        }
    }
}

/// Computes Euclidean (L2) distance between two vectors.
///
/// Formula: sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Computes squared Euclidean distance (avoids sqrt for comparisons).
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Computes cosine similarity between two vectors.
///
/// Range: [-1, 1]. Zero-norm vectors have similarity 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 0.0;
    }

    dot / denominator
}

/// Computes cosine distance between two vectors.
///
/// Formula: 1 - (a · b) / (||a|| * ||b||)
/// Range: [0, 2] where 0 = identical direction, 2 = opposite direction
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_identical_direction() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_metric_is_negated() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let d = DistanceMetric::InnerProduct.compute(&a, &b);
        assert!((d + 32.0).abs() < 1e-6);
        assert!((DistanceMetric::InnerProduct.score(d) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_scores_are_monotonic_decreasing() {
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::InnerProduct,
            DistanceMetric::Euclidean,
        ] {
            assert!(metric.score(0.1) > metric.score(0.5), "{metric}");
            assert!(metric.score(0.5) > metric.score(1.5), "{metric}");
        }
    }

    #[test]
    fn test_cosine_score_is_similarity() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.9, 0.1, 0.0];
        let d = DistanceMetric::Cosine.compute(&a, &b);
        let s = DistanceMetric::Cosine.score(d);
        assert!((s - cosine_similarity(&a, &b)).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("dot".parse::<DistanceMetric>().unwrap(), DistanceMetric::InnerProduct);
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }
}
