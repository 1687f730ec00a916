//! Assigns global labels to local profiles against the registry.
//!
//! Profiles are processed in ascending label order; within a profile the
//! best registry entry wins on strict similarity, so ties fall to the
//! first label in registry order. Matching is boundary-inclusive: a
//! similarity exactly equal to the threshold matches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::LocalSpeakerProfile;
use crate::registry::{GlobalSpeaker, Registry};
use crate::resolver::Config;
use crate::vecmath;

/// How one local speaker was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub local_label: String,
    pub global_label: String,
    /// True when an existing registry entry was reused.
    pub matched_existing: bool,
    /// Similarity to the matched entry; None for newly created labels.
    pub similarity: Option<f64>,
}

/// Matches profiles against existing registry entries, updating matched
/// entries in place via duration-weighted centroid merge.
///
/// When `auto_lower_threshold` is set and the first pass matched nothing,
/// the pending set is retried at stepwise-lowered thresholds down to
/// `auto_lower_min` (inclusive); the first threshold that produces a
/// match becomes the returned effective threshold for the whole run.
pub(crate) fn match_existing(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    registry: &mut Registry,
    cfg: &Config,
) -> (Vec<MatchOutcome>, BTreeMap<String, String>, f64) {
    let mut outcomes = Vec::new();
    let mut mapping = BTreeMap::new();
    let mut effective = cfg.threshold;

    let matched = attempt_pass(profiles, &mut mapping, &mut outcomes, registry, cfg.threshold);

    if matched == 0
        && cfg.auto_lower_threshold
        && cfg.auto_lower_step > 0.0
        && !registry.is_empty()
    {
        let mut threshold = cfg.threshold - cfg.auto_lower_step;
        while threshold >= cfg.auto_lower_min - 1e-9 {
            if attempt_pass(profiles, &mut mapping, &mut outcomes, registry, threshold) > 0 {
                effective = threshold;
                break;
            }
            threshold -= cfg.auto_lower_step;
        }
    }

    (outcomes, mapping, effective)
}

/// Creates new registry entries for every profile still unmapped.
/// Labels are assigned in ascending local-label order.
pub(crate) fn register_new(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    mapping: &mut BTreeMap<String, String>,
    registry: &mut Registry,
) -> Vec<MatchOutcome> {
    let mut outcomes = Vec::new();
    for (label, profile) in profiles {
        if mapping.contains_key(label) {
            continue;
        }
        let Some(centroid) = profile.centroid.as_ref() else {
            continue;
        };
        let global = registry.next_label();
        registry.insert(
            global.clone(),
            GlobalSpeaker {
                centroid: centroid.clone(),
                duration: profile.total_duration,
            },
        );
        mapping.insert(label.clone(), global.clone());
        outcomes.push(MatchOutcome {
            local_label: label.clone(),
            global_label: global,
            matched_existing: false,
            similarity: None,
        });
    }
    outcomes
}

fn attempt_pass(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    mapping: &mut BTreeMap<String, String>,
    outcomes: &mut Vec<MatchOutcome>,
    registry: &mut Registry,
    threshold: f64,
) -> usize {
    let mut matched = 0usize;
    for (label, profile) in profiles {
        if mapping.contains_key(label) {
            continue;
        }
        let Some(centroid) = profile.centroid.as_ref() else {
            continue;
        };
        let Some((best_label, best_sim)) = best_match(centroid, registry) else {
            continue;
        };
        if best_sim < threshold {
            continue;
        }

        if let Some(existing) = registry.get(&best_label) {
            let old_duration = existing.duration;
            let merge = vecmath::weighted_merge(
                &existing.centroid,
                old_duration,
                centroid,
                profile.total_duration,
            );
            if let Ok(merged) = merge {
                registry.insert(
                    best_label.clone(),
                    GlobalSpeaker {
                        centroid: merged,
                        duration: old_duration + profile.total_duration,
                    },
                );
            }
        }
        mapping.insert(label.clone(), best_label.clone());
        outcomes.push(MatchOutcome {
            local_label: label.clone(),
            global_label: best_label,
            matched_existing: true,
            similarity: Some(best_sim),
        });
        matched += 1;
    }
    matched
}

/// Best registry entry by cosine similarity; non-finite similarities are
/// skipped. Ties keep the first label in registry iteration order.
fn best_match(centroid: &[f32], registry: &Registry) -> Option<(String, f64)> {
    let mut best: Option<(String, f64)> = None;
    for (label, speaker) in registry.iter() {
        let Ok(sim) = vecmath::cosine(centroid, &speaker.centroid) else {
            continue;
        };
        if !sim.is_finite() {
            continue;
        }
        if best.as_ref().is_none_or(|&(_, b)| sim > b) {
            best = Some((label.clone(), sim));
        }
    }
    best
}
