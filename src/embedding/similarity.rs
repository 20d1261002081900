//! Vector similarity and trajectory math.
//!
//! ΔS (semantic tension) is `1 - cos(current, expected)`, where the
//! expected vector is a recency-weighted average of the recent history.

use tracing::debug;

use crate::error::{TrajectoryError, TrajectoryResult};
use crate::semantic::MAX_DELTA_S;

/// Decay ratio between consecutive history entries (newest weighs most).
pub const TRAJECTORY_DECAY: f64 = 0.7;

/// Cosine similarity in `[-1, 1]`.
///
/// Returns exactly `0.0` when either vector has zero norm or the lengths
/// differ, so callers never see NaN.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        debug!(left = a.len(), right = b.len(), "Cosine over mismatched dimensions");
        return 0.0;
    }

    // Scaled by the largest magnitude so the squared sums stay finite and non-zero
    let scale_a = max_abs(a);
    let scale_b = max_abs(b);
    if scale_a == 0.0 || scale_b == 0.0 {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    // sqrt of the product keeps cos(v, v) at exactly 1.0
    let similarity = dot / (norm_a * norm_b).sqrt();
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0)
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Semantic tension between the current and the expected embedding, in `[0, 2]`.
pub fn semantic_tension(current: &[f64], expected: &[f64]) -> f64 {
    (1.0 - cosine_similarity(current, expected)).clamp(0.0, MAX_DELTA_S)
}

/// Default weights for `n` history entries: `decay^(n-1-i)`, normalized to sum to 1.
pub fn decay_weights(n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|i| TRAJECTORY_DECAY.powi((n - 1 - i) as i32))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Expected trajectory from recent embeddings, oldest first.
///
/// Without `weights` the exponential decay weights from [`decay_weights`]
/// are used. Explicit weights are applied as given, one per embedding.
pub fn compute_trajectory_embedding(
    embeddings: &[Vec<f64>],
    weights: Option<&[f64]>,
) -> TrajectoryResult<Vec<f64>> {
    let first = embeddings.first().ok_or(TrajectoryError::EmptyHistory)?;
    let n = embeddings.len();

    let weights = match weights {
        Some(w) if w.len() != n => {
            return Err(TrajectoryError::WeightsLength {
                weights: w.len(),
                embeddings: n,
            })
        }
        Some(w) => w.to_vec(),
        None => decay_weights(n),
    };

    let dimensions = first.len();
    let mut trajectory = vec![0.0; dimensions];
    for (index, (embedding, weight)) in embeddings.iter().zip(&weights).enumerate() {
        if embedding.len() != dimensions {
            return Err(TrajectoryError::DimensionMismatch {
                index,
                expected: dimensions,
                actual: embedding.len(),
            });
        }
        for (acc, value) in trajectory.iter_mut().zip(embedding) {
            *acc += value * weight;
        }
    }

    Ok(trajectory)
}

/// Element-wise midpoint of two vectors of equal length.
pub fn midpoint(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        for v in [vec![0.1, 0.2, 0.3], vec![1.0, 2.0, 3.0], vec![-4.5, 0.0, 7.25, 1e-3]] {
            assert_eq!(cosine_similarity(&v, &v), 1.0);
        }
    }

    #[test]
    fn test_cosine_extreme_magnitudes() {
        for v in [vec![1e-170], vec![3e-200, -1e-200], vec![1e200, 2e200]] {
            assert_eq!(cosine_similarity(&v, &v), 1.0);
        }
        assert_eq!(cosine_similarity(&[1e-170, 0.0], &[0.0, 1e-170]), 0.0);
        assert_eq!(cosine_similarity(&[1e-170], &[-1e170]), -1.0);
        assert_eq!(semantic_tension(&[1e-170], &[1e-170]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let v = vec![1.0, 2.0];
        let zero = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_tension_range() {
        let v = vec![0.3, -0.4, 0.5];
        assert_eq!(semantic_tension(&v, &v), 0.0);
        assert_eq!(semantic_tension(&[1.0, 0.0], &[0.0, 1.0]), 1.0);
        assert_eq!(semantic_tension(&[1.0, 0.0], &[-1.0, 0.0]), 2.0);
        assert_eq!(semantic_tension(&v, &[0.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_decay_weights() {
        let weights = decay_weights(3);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(weights[2] > weights[1] && weights[1] > weights[0]);
        assert!((weights[1] / weights[2] - 0.7).abs() < 1e-12);
        assert_eq!(decay_weights(1), vec![1.0]);
    }

    #[test]
    fn test_trajectory_recency_weighted() {
        let history = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let trajectory = compute_trajectory_embedding(&history, None).unwrap();

        let to_old = cosine_similarity(&trajectory, &history[0]);
        let to_new = cosine_similarity(&trajectory, &history[1]);
        assert!(to_new > to_old);
        assert!((trajectory[0] - 0.7 / 1.7).abs() < 1e-12);
        assert!((trajectory[1] - 1.0 / 1.7).abs() < 1e-12);
    }

    #[test]
    fn test_trajectory_single_entry() {
        let trajectory = compute_trajectory_embedding(&[vec![0.5, 0.25]], None).unwrap();
        assert_eq!(trajectory, vec![0.5, 0.25]);
    }

    #[test]
    fn test_trajectory_explicit_weights_not_normalized() {
        let history = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let trajectory = compute_trajectory_embedding(&history, Some(&[2.0, 3.0])).unwrap();
        assert_eq!(trajectory, vec![2.0, 3.0]);
    }

    #[test]
    fn test_trajectory_empty_history() {
        let err = compute_trajectory_embedding(&[], None).unwrap_err();
        assert_eq!(err, TrajectoryError::EmptyHistory);
    }

    #[test]
    fn test_trajectory_weights_length_mismatch() {
        let history = vec![vec![1.0], vec![2.0]];
        let err = compute_trajectory_embedding(&history, Some(&[1.0])).unwrap_err();
        assert_eq!(
            err,
            TrajectoryError::WeightsLength {
                weights: 1,
                embeddings: 2
            }
        );
    }

    #[test]
    fn test_trajectory_dimension_mismatch() {
        let history = vec![vec![1.0, 0.0], vec![1.0]];
        let err = compute_trajectory_embedding(&history, None).unwrap_err();
        assert_eq!(
            err,
            TrajectoryError::DimensionMismatch {
                index: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(&[0.0, 2.0], &[2.0, 0.0]), vec![1.0, 1.0]);
    }
}
