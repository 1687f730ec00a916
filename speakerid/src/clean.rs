//! Intra-speaker outlier pruning.
//!
//! Segments statistically inconsistent with their own speaker's centroid
//! (crosstalk, misattributed turns) are removed iteratively: each round
//! recomputes the centroid, drops the segments whose similarity falls
//! strictly below a percentile cutoff, and stops when nothing is marked,
//! the iteration budget runs out, or removal would leave the speaker with
//! too few segments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::profile::LocalSpeakerProfile;
use crate::resolver::Config;
use crate::vecmath;

/// One executed pruning iteration for a speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanIteration {
    pub iteration: usize,
    pub count_before: usize,
    pub count_after: usize,
    pub removed: usize,
    /// Similarity cutoff applied this round.
    pub cutoff: f64,
    /// Mean segment-to-centroid similarity before removal.
    pub mean_before: f64,
    /// Mean similarity of the survivors against the same centroid.
    pub mean_after: f64,
}

/// Pruning history for one local speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanReport {
    pub label: String,
    pub iterations: Vec<CleanIteration>,
}

/// Prunes outlier segments from every profile in place and recomputes the
/// surviving centroids.
///
/// Profiles left without a valid centroid are removed from the map and
/// their labels appended to `dropped`.
pub fn clean_profiles(
    profiles: &mut BTreeMap<String, LocalSpeakerProfile>,
    cfg: &Config,
    dropped: &mut Vec<String>,
) -> Vec<CleanReport> {
    let mut reports = Vec::new();
    for (label, profile) in profiles.iter_mut() {
        let iterations = clean_one(profile, cfg);
        if !iterations.is_empty() {
            reports.push(CleanReport {
                label: label.clone(),
                iterations,
            });
        }
    }

    let emptied: Vec<String> = profiles
        .iter()
        .filter(|(_, p)| p.centroid.is_none())
        .map(|(label, _)| label.clone())
        .collect();
    for label in emptied {
        profiles.remove(&label);
        dropped.push(label);
    }
    reports
}

fn clean_one(profile: &mut LocalSpeakerProfile, cfg: &Config) -> Vec<CleanIteration> {
    let min_keep = cfg.intra_clean_min_segments;
    // Too little data to prune safely.
    if profile.segments.len() < min_keep + 1 {
        return Vec::new();
    }

    let mut iterations = Vec::new();
    for it in 1..=cfg.intra_clean_max_iterations {
        profile.recompute();
        let Some(centroid) = profile.centroid.clone() else {
            break;
        };

        let mut sims: Vec<(usize, f64)> = Vec::with_capacity(profile.segments.len());
        for (idx, seg) in profile.segments.iter().enumerate() {
            if let Ok(sim) = vecmath::cosine(&seg.vector, &centroid) {
                if sim.is_finite() {
                    sims.push((idx, sim));
                }
            }
        }
        if sims.len() < min_keep + 1 {
            break;
        }

        let values: Vec<f64> = sims.iter().map(|&(_, s)| s).collect();
        let mean_before = values.iter().sum::<f64>() / values.len() as f64;
        let Some(cutoff) = vecmath::percentile(&values, cfg.intra_clean_percentile) else {
            break;
        };

        let remove: BTreeSet<usize> = sims
            .iter()
            .filter(|&&(_, s)| s < cutoff)
            .map(|&(idx, _)| idx)
            .collect();
        if remove.is_empty() {
            break;
        }
        // Guard: never prune the speaker below min_keep segments.
        if profile.segments.len() - remove.len() < min_keep {
            break;
        }

        let count_before = profile.segments.len();
        let mut idx = 0usize;
        profile.segments.retain(|_| {
            let keep = !remove.contains(&idx);
            idx += 1;
            keep
        });

        // Survivor similarities against the pre-removal centroid.
        let mut after = Vec::with_capacity(profile.segments.len());
        for seg in &profile.segments {
            if let Ok(sim) = vecmath::cosine(&seg.vector, &centroid) {
                if sim.is_finite() {
                    after.push(sim);
                }
            }
        }
        let mean_after = if after.is_empty() {
            mean_before
        } else {
            after.iter().sum::<f64>() / after.len() as f64
        };

        iterations.push(CleanIteration {
            iteration: it,
            count_before,
            count_after: profile.segments.len(),
            removed: remove.len(),
            cutoff,
            mean_before,
            mean_after,
        });

        if profile.segments.len() < min_keep + 1 {
            break;
        }
    }

    if !iterations.is_empty() {
        profile.recompute();
    }
    iterations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Segment;

    fn seg(raw: &[f32], duration: f64) -> Segment {
        let vector = vecmath::normalize(raw).unwrap();
        Segment {
            vector,
            raw_vector: raw.to_vec(),
            duration,
            start: 0.0,
            end: duration,
        }
    }

    fn profile(label: &str, segments: Vec<Segment>) -> LocalSpeakerProfile {
        let mut p = LocalSpeakerProfile {
            label: label.to_string(),
            centroid: None,
            total_duration: 0.0,
            segments,
        };
        p.recompute();
        p
    }

    fn cfg() -> Config {
        Config {
            intra_clean: true,
            intra_clean_percentile: 0.25,
            intra_clean_min_segments: 3,
            intra_clean_max_iterations: 2,
            ..Config::default()
        }
    }

    #[test]
    fn removes_single_outlier() {
        let segments = vec![
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
            seg(&[0.0, 1.0], 1.0),
        ];
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", segments));

        let mut dropped = Vec::new();
        let reports = clean_profiles(&mut profiles, &cfg(), &mut dropped);

        assert!(dropped.is_empty());
        let p = &profiles["A"];
        assert_eq!(p.segments.len(), 4, "the orthogonal outlier is pruned");
        assert_eq!(p.total_duration, 4.0);
        let centroid = p.centroid.as_ref().unwrap();
        assert!((centroid[0] - 1.0).abs() < 1e-6, "centroid snaps back to the cluster");

        assert_eq!(reports.len(), 1);
        let iter = &reports[0].iterations[0];
        assert_eq!(iter.count_before, 5);
        assert_eq!(iter.count_after, 4);
        assert_eq!(iter.removed, 1);
        assert!(iter.mean_after > iter.mean_before);
    }

    #[test]
    fn too_few_segments_skips_cleaning() {
        let segments = vec![
            seg(&[1.0, 0.0], 1.0),
            seg(&[0.9, 0.1], 1.0),
            seg(&[0.0, 1.0], 1.0),
        ];
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", segments));

        let mut dropped = Vec::new();
        let reports = clean_profiles(&mut profiles, &cfg(), &mut dropped);

        assert!(reports.is_empty(), "min_segments + 1 not reached");
        assert_eq!(profiles["A"].segments.len(), 3);
    }

    #[test]
    fn never_prunes_below_min_segments() {
        // Four distinct segments with a p50 cutoff would remove two,
        // leaving 2 < min_segments; the iteration must abort instead.
        let segments = vec![
            seg(&[1.0, 0.0], 1.0),
            seg(&[0.9, 0.3], 1.0),
            seg(&[0.7, 0.5], 1.0),
            seg(&[0.5, 0.7], 1.0),
        ];
        let mut config = cfg();
        config.intra_clean_percentile = 0.5;

        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", segments));

        let mut dropped = Vec::new();
        let reports = clean_profiles(&mut profiles, &config, &mut dropped);

        assert!(reports.is_empty(), "guarded iteration records nothing");
        assert_eq!(profiles["A"].segments.len(), 4, "no segment may be removed");
    }

    #[test]
    fn stops_when_nothing_is_marked() {
        // Identical segments: every similarity equals the cutoff, and the
        // strictly-below rule marks nothing.
        let segments = vec![
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
            seg(&[1.0, 0.0], 1.0),
        ];
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", segments));

        let mut dropped = Vec::new();
        let reports = clean_profiles(&mut profiles, &cfg(), &mut dropped);

        assert!(reports.is_empty());
        assert_eq!(profiles["A"].segments.len(), 4);
    }

    #[test]
    fn iteration_budget_is_respected() {
        let mut segments = vec![seg(&[0.0, 1.0], 1.0), seg(&[0.3, 0.7], 1.0)];
        for _ in 0..6 {
            segments.push(seg(&[1.0, 0.0], 1.0));
        }
        let mut config = cfg();
        config.intra_clean_max_iterations = 1;

        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", segments));

        let mut dropped = Vec::new();
        let reports = clean_profiles(&mut profiles, &config, &mut dropped);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].iterations.len(), 1);
    }
}
