//! Per-file speaker profiles built from segment embeddings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vecmath;

/// One diarized segment with its extracted voice embedding.
///
/// Produced upstream by the embedding extractor, already filtered for
/// minimum duration and signal energy. Immutable once owned by a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Unit-normalized embedding, used for similarity.
    pub vector: Vec<f32>,
    /// Embedding before normalization, used for duration-weighted centroids.
    pub raw_vector: Vec<f32>,
    /// Segment length in seconds.
    pub duration: f64,
    /// Segment start offset in seconds.
    pub start: f64,
    /// Segment end offset in seconds.
    pub end: f64,
}

/// A speaker as detected within a single file, before cross-file
/// reconciliation.
#[derive(Debug, Clone)]
pub struct LocalSpeakerProfile {
    /// File-scoped diarization label (e.g. "SPEAKER_00").
    pub label: String,
    /// Unit centroid, or None when no valid segment survived.
    pub centroid: Option<Vec<f32>>,
    /// Accumulated duration of the valid segments, in seconds.
    pub total_duration: f64,
    /// Segments backing the centroid, in diarization order.
    pub segments: Vec<Segment>,
}

impl LocalSpeakerProfile {
    /// Recomputes the centroid as the duration-weighted mean of the raw
    /// vectors, L2-normalized. Segments with non-finite raw vectors,
    /// non-positive durations or a mismatched dimension are ignored.
    /// Returns how many segments were ignored.
    pub fn recompute(&mut self) -> usize {
        let mut acc: Option<Vec<f64>> = None;
        let mut total = 0.0f64;
        let mut skipped = 0usize;
        for seg in &self.segments {
            if seg.duration <= 0.0 || !vecmath::is_finite_vec(&seg.raw_vector) {
                skipped += 1;
                continue;
            }
            let acc = acc.get_or_insert_with(|| vec![0.0f64; seg.raw_vector.len()]);
            if acc.len() != seg.raw_vector.len() {
                skipped += 1;
                continue;
            }
            for (a, &x) in acc.iter_mut().zip(&seg.raw_vector) {
                *a += (x as f64) * seg.duration;
            }
            total += seg.duration;
        }
        self.total_duration = total;
        self.centroid = match acc {
            Some(acc) if total > 0.0 => {
                let mean: Vec<f32> = acc.iter().map(|&x| (x / total) as f32).collect();
                vecmath::normalize(&mean)
                    .ok()
                    .filter(|c| c.iter().any(|&x| x != 0.0))
            }
            _ => None,
        };
        skipped
    }
}

/// Builds centroided profiles from per-label segment lists.
///
/// Returns the valid profiles keyed by label, the labels dropped for
/// having no valid centroid, and the total number of segments skipped for
/// non-finite vectors or non-positive durations.
pub fn build_profiles(
    segments: BTreeMap<String, Vec<Segment>>,
) -> (BTreeMap<String, LocalSpeakerProfile>, Vec<String>, usize) {
    let mut profiles = BTreeMap::new();
    let mut invalid = Vec::new();
    let mut skipped = 0usize;
    for (label, segs) in segments {
        let mut profile = LocalSpeakerProfile {
            label: label.clone(),
            centroid: None,
            total_duration: 0.0,
            segments: segs,
        };
        skipped += profile.recompute();
        if profile.centroid.is_some() {
            profiles.insert(label, profile);
        } else {
            invalid.push(label);
        }
    }
    (profiles, invalid, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(raw: &[f32], duration: f64) -> Segment {
        let vector = crate::vecmath::normalize(raw).unwrap_or_else(|_| raw.to_vec());
        Segment {
            vector,
            raw_vector: raw.to_vec(),
            duration,
            start: 0.0,
            end: duration,
        }
    }

    #[test]
    fn centroid_is_unit_and_duration_weighted() {
        let mut input = BTreeMap::new();
        input.insert("A".to_string(), vec![seg(&[2.0, 0.0], 1.0), seg(&[0.0, 4.0], 3.0)]);

        let (profiles, invalid, skipped) = build_profiles(input);
        assert!(invalid.is_empty());
        assert_eq!(skipped, 0);

        let profile = &profiles["A"];
        assert_eq!(profile.total_duration, 4.0);
        let centroid = profile.centroid.as_ref().unwrap();
        let norm: f64 = centroid
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-6, "centroid must be unit, got {norm}");
        // Weighted mean = [0.5, 3.0], so the second axis dominates.
        assert!(centroid[1] > centroid[0]);
    }

    #[test]
    fn zero_duration_label_is_invalid() {
        let mut input = BTreeMap::new();
        input.insert("A".to_string(), vec![seg(&[1.0, 0.0], 0.0)]);

        let (profiles, invalid, skipped) = build_profiles(input);
        assert!(profiles.is_empty());
        assert_eq!(invalid, vec!["A".to_string()]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn non_finite_segment_is_skipped_not_merged() {
        let mut input = BTreeMap::new();
        input.insert(
            "A".to_string(),
            vec![seg(&[1.0, 0.0], 2.0), seg(&[f32::NAN, 1.0], 5.0)],
        );

        let (profiles, invalid, skipped) = build_profiles(input);
        assert!(invalid.is_empty());
        assert_eq!(skipped, 1);

        let profile = &profiles["A"];
        assert_eq!(profile.total_duration, 2.0);
        let centroid = profile.centroid.as_ref().unwrap();
        assert!((centroid[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_segments_invalid_drops_label() {
        let mut input = BTreeMap::new();
        input.insert("A".to_string(), vec![seg(&[f32::INFINITY, 0.0], 1.0)]);
        input.insert("B".to_string(), vec![seg(&[1.0, 0.0], 1.0)]);

        let (profiles, invalid, _) = build_profiles(input);
        assert_eq!(profiles.len(), 1);
        assert!(profiles.contains_key("B"));
        assert_eq!(invalid, vec!["A".to_string()]);
    }

    #[test]
    fn zero_raw_vectors_yield_no_centroid() {
        let mut input = BTreeMap::new();
        input.insert("A".to_string(), vec![seg(&[0.0, 0.0], 1.0)]);

        let (profiles, invalid, _) = build_profiles(input);
        assert!(profiles.is_empty());
        assert_eq!(invalid, vec!["A".to_string()]);
    }

    #[test]
    fn empty_input_builds_nothing() {
        let (profiles, invalid, skipped) = build_profiles(BTreeMap::new());
        assert!(profiles.is_empty());
        assert!(invalid.is_empty());
        assert_eq!(skipped, 0);
    }
}
