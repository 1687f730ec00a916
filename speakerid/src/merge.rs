//! Greedy merging of over-segmented local speakers.
//!
//! When diarization splits one person into several labels, the most
//! similar pair of centroids is merged repeatedly until the expected
//! speaker count is reached. O(n^2) per step, which is fine for the
//! single-digit speaker counts a file produces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::LocalSpeakerProfile;
use crate::vecmath;

/// Audit record for one merge of two local speakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeEvent {
    /// The two labels that were merged, in label order.
    pub pair: (String, String),
    pub kept: String,
    pub removed: String,
    /// Centroid similarity that triggered the merge.
    pub similarity: f64,
    pub resulting_duration: f64,
    /// Profile count after this merge.
    pub remaining_after: usize,
}

/// Merges the most-similar profile pair until `target` profiles remain or
/// no mergeable pair is left.
///
/// Pair enumeration is label-sorted, so equal similarities resolve to the
/// first pair in lexicographic order, and the kept profile takes the
/// smaller label. Returns the merge history plus a map from every
/// original label to its surviving label.
pub fn merge_to_target(
    profiles: &mut BTreeMap<String, LocalSpeakerProfile>,
    target: usize,
) -> (Vec<MergeEvent>, BTreeMap<String, String>) {
    let mut trace: BTreeMap<String, String> = profiles
        .keys()
        .map(|label| (label.clone(), label.clone()))
        .collect();
    let mut history = Vec::new();
    if target == 0 {
        return (history, trace);
    }

    while profiles.len() > target {
        let labels: Vec<&String> = profiles.keys().collect();
        let mut best: Option<(String, String, f64)> = None;
        for i in 0..labels.len() {
            for j in (i + 1)..labels.len() {
                let Some(sim) = pair_similarity(&profiles[labels[i]], &profiles[labels[j]])
                else {
                    continue;
                };
                if best.as_ref().is_none_or(|&(_, _, b)| sim > b) {
                    best = Some((labels[i].clone(), labels[j].clone(), sim));
                }
            }
        }
        // No valid pair left; the target is unreachable, which is fine.
        let Some((keep, remove, similarity)) = best else {
            break;
        };

        let merged = {
            let a = &profiles[&keep];
            let b = &profiles[&remove];
            let (Some(ca), Some(cb)) = (a.centroid.as_ref(), b.centroid.as_ref()) else {
                break;
            };
            match vecmath::weighted_merge(ca, a.total_duration, cb, b.total_duration) {
                Ok(centroid) => (centroid, a.total_duration + b.total_duration),
                Err(_) => break,
            }
        };

        let Some(removed_profile) = profiles.remove(&remove) else {
            break;
        };
        if let Some(kept) = profiles.get_mut(&keep) {
            kept.centroid = Some(merged.0);
            kept.total_duration = merged.1;
            kept.segments.extend(removed_profile.segments);
        }
        for surviving in trace.values_mut() {
            if *surviving == remove {
                *surviving = keep.clone();
            }
        }
        history.push(MergeEvent {
            pair: (keep.clone(), remove.clone()),
            kept: keep,
            removed: remove,
            similarity,
            resulting_duration: merged.1,
            remaining_after: profiles.len(),
        });
    }

    (history, trace)
}

fn pair_similarity(a: &LocalSpeakerProfile, b: &LocalSpeakerProfile) -> Option<f64> {
    let sim = vecmath::cosine(a.centroid.as_ref()?, b.centroid.as_ref()?).ok()?;
    sim.is_finite().then_some(sim)
}
