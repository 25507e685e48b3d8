use crate::error::{Result, VectorStoreError};

/// Euclidean norm, accumulated in `f64` so tiny or huge components neither
/// underflow nor overflow the sum of squares.
#[must_use]
pub fn l2_norm(vector: &[f32]) -> f32 {
    sum_of_squares(vector).sqrt() as f32
}

/// True for empty vectors, vectors whose components are all zero, and vectors
/// holding a non-finite component.
#[must_use]
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().any(|v| !v.is_finite()) || vector.iter().all(|v| *v == 0.0)
}

fn sum_of_squares(vector: &[f32]) -> f64 {
    vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum()
}

/// Cosine similarity of two equal-length, non-zero vectors.
///
/// Dot product and norms are accumulated in `f64`; only the final ratio is
/// narrowed to `f32`. The result is not clamped, so rounding can push it
/// marginally past `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(VectorStoreError::InvalidDimension {
            expected: a.len(),
            actual: b.len(),
        });
    }
    if is_zero_vector(a) || is_zero_vector(b) {
        return Err(VectorStoreError::ZeroVector);
    }

    let mut dot_product = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let similarity = dot_product / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity as f32)
}
