//! Vector primitives shared by profile building, merging and matching.
//!
//! All math runs with f64 accumulators over f32 storage so results stay
//! stable regardless of the embedding dimension.

use crate::SpeakerIdError;

/// Returns true if every component is finite.
pub fn is_finite_vec(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Validates that every component is finite.
pub fn ensure_finite(v: &[f32]) -> Result<(), SpeakerIdError> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(SpeakerIdError::NonFinite { index }),
        None => Ok(()),
    }
}

/// L2-normalizes a vector. A zero vector is returned unchanged; callers
/// treat zero vectors as invalid centroids rather than dividing by zero.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>, SpeakerIdError> {
    ensure_finite(v)?;
    let mut sum: f64 = 0.0;
    for &x in v {
        sum += (x as f64) * (x as f64);
    }
    let norm = sum.sqrt();
    let mut out = v.to_vec();
    if norm > 0.0 {
        let scale = 1.0 / norm;
        for x in out.iter_mut() {
            *x = ((*x as f64) * scale) as f32;
        }
    }
    Ok(out)
}

/// Weight-averaged merge of two unit vectors, re-normalized:
/// `(a*wa + b*wb) / (wa + wb)`.
pub fn weighted_merge(
    a: &[f32],
    wa: f64,
    b: &[f32],
    wb: f64,
) -> Result<Vec<f32>, SpeakerIdError> {
    if a.len() != b.len() {
        return Err(SpeakerIdError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    ensure_finite(a)?;
    ensure_finite(b)?;
    let total = wa + wb;
    if !total.is_finite() || total <= 0.0 {
        return Err(SpeakerIdError::ZeroWeight);
    }
    let mut merged = Vec::with_capacity(a.len());
    for i in 0..a.len() {
        merged.push((((a[i] as f64) * wa + (b[i] as f64) * wb) / total) as f32);
    }
    normalize(&merged)
}

/// Cosine similarity of two unit vectors: plain dot product with f64
/// accumulation. Inputs are assumed already normalized; no
/// re-normalization happens here.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f64, SpeakerIdError> {
    if a.len() != b.len() {
        return Err(SpeakerIdError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    ensure_finite(a)?;
    ensure_finite(b)?;
    let mut dot: f64 = 0.0;
    for i in 0..a.len() {
        dot += (a[i] as f64) * (b[i] as f64);
    }
    Ok(dot)
}

/// Linear-interpolation percentile over a sample, `q` in [0, 1].
/// Returns None for an empty sample.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_unchanged() {
        let v = normalize(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_rejects_non_finite() {
        let err = normalize(&[1.0, f32::NAN]).unwrap_err();
        assert!(matches!(err, SpeakerIdError::NonFinite { index: 1 }));
    }

    #[test]
    fn cosine_identical_unit_vectors() {
        let sim = cosine(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-9, "expected 1.0, got {sim}");
    }

    #[test]
    fn cosine_orthogonal() {
        let sim = cosine(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn cosine_dimension_mismatch() {
        let err = cosine(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            SpeakerIdError::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn cosine_rejects_infinity() {
        assert!(cosine(&[f32::INFINITY, 0.0], &[1.0, 0.0]).is_err());
    }

    #[test]
    fn weighted_merge_identical_vectors_is_identity() {
        let v = [0.6, 0.8];
        let merged = weighted_merge(&v, 2.0, &v, 5.0).unwrap();
        assert!((merged[0] - 0.6).abs() < 1e-6);
        assert!((merged[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn weighted_merge_weights_pull_toward_heavier_side() {
        let merged = weighted_merge(&[1.0, 0.0], 9.0, &[0.0, 1.0], 1.0).unwrap();
        assert!(merged[0] > merged[1]);
        let norm: f64 = merged
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "merged centroid must stay unit");
    }

    #[test]
    fn weighted_merge_zero_weight_rejected() {
        let err = weighted_merge(&[1.0, 0.0], 0.0, &[0.0, 1.0], 0.0).unwrap_err();
        assert!(matches!(err, SpeakerIdError::ZeroWeight));
    }

    #[test]
    fn percentile_linear_interpolation() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert!((percentile(&values, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((percentile(&values, 0.5).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn percentile_single_value() {
        assert_eq!(percentile(&[0.7], 0.95), Some(0.7));
    }

    #[test]
    fn percentile_empty() {
        assert_eq!(percentile(&[], 0.5), None);
    }
}
