//! Run diagnostics: similarity matrices, distribution statistics and
//! threshold suggestions.
//!
//! Everything here is computed against the registry as it stood before
//! this run's new labels were inserted, so freshly added centroids never
//! pollute the statistics with self-similarity of 1.0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::LocalSpeakerProfile;
use crate::registry::Registry;
use crate::vecmath;

/// Population statistics over a similarity sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Closest pre-run registry entry for one local speaker.
/// `global_label`/`similarity` are None when no finite similarity exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestMatch {
    pub local_label: String,
    pub global_label: Option<String>,
    pub similarity: Option<f64>,
}

/// Segment-to-own-centroid statistics for one local speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub local_label: String,
    pub stats: Stats,
}

/// Full diagnostic bundle for one resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    /// local label -> global label -> cosine similarity. NaN marks an
    /// invalid vector on either side.
    pub similarity_matrix: BTreeMap<String, BTreeMap<String, f64>>,
    /// Per local speaker, the closest pre-run registry entry.
    pub best_matches: Vec<BestMatch>,
    /// Distribution of the best-match similarities.
    pub similarity_stats: Option<Stats>,
    /// `min(p75, max(p25, mean - 0.5*std))` of the best-match
    /// distribution; a lower bound that never exceeds the 75th percentile.
    pub suggested_threshold: Option<f64>,
    /// Segment-to-own-centroid similarities across all speakers.
    pub intra_stats: Option<Stats>,
    pub per_speaker_intra: Vec<SpeakerStats>,
    /// Pairwise similarities across all distinct centroids (pre-run
    /// registry plus this file's locals).
    pub inter_stats: Option<Stats>,
    /// `max(inter p95, intra mean - 2*intra std)`: below this the intra
    /// and inter class distributions start to overlap.
    pub suggested_min_threshold: Option<f64>,
}

/// Builds the diagnostic bundle for the surviving profiles against the
/// pre-insertion registry snapshot.
pub(crate) fn report(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    registry_before_new: &Registry,
) -> Diagnostics {
    let similarity_matrix = similarity_matrix(profiles, registry_before_new);
    let best_matches = best_matches(&similarity_matrix);

    let best_values: Vec<f64> = best_matches
        .iter()
        .filter_map(|b| b.similarity)
        .collect();
    let similarity_stats = stats_of(&best_values);
    let suggested_threshold = similarity_stats.as_ref().map(suggest_threshold);

    let (intra_stats, per_speaker_intra) = intra_class(profiles);
    let inter_stats = inter_class(profiles, registry_before_new);
    let suggested_min_threshold = match (&intra_stats, &inter_stats) {
        (Some(intra), Some(inter)) => {
            Some(inter.p95.max(intra.mean - 2.0 * intra.std))
        }
        _ => None,
    };

    Diagnostics {
        similarity_matrix,
        best_matches,
        similarity_stats,
        suggested_threshold,
        intra_stats,
        per_speaker_intra,
        inter_stats,
        suggested_min_threshold,
    }
}

fn similarity_matrix(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    registry: &Registry,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut matrix = BTreeMap::new();
    if registry.is_empty() {
        return matrix;
    }
    for (label, profile) in profiles {
        let mut row = BTreeMap::new();
        match profile
            .centroid
            .as_ref()
            .filter(|c| vecmath::is_finite_vec(c))
        {
            None => {
                // Keep the whole row visible as NaN markers.
                for global in registry.labels() {
                    row.insert(global.clone(), f64::NAN);
                }
            }
            Some(centroid) => {
                for (global, speaker) in registry.iter() {
                    let sim = vecmath::cosine(centroid, &speaker.centroid)
                        .unwrap_or(f64::NAN);
                    row.insert(global.clone(), sim);
                }
            }
        }
        matrix.insert(label.clone(), row);
    }
    matrix
}

fn best_matches(matrix: &BTreeMap<String, BTreeMap<String, f64>>) -> Vec<BestMatch> {
    let mut report = Vec::with_capacity(matrix.len());
    for (local, row) in matrix {
        let mut best: Option<(&String, f64)> = None;
        for (global, &sim) in row {
            if !sim.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, b)| sim > b) {
                best = Some((global, sim));
            }
        }
        report.push(match best {
            Some((global, sim)) => BestMatch {
                local_label: local.clone(),
                global_label: Some(global.clone()),
                similarity: Some(sim),
            },
            None => BestMatch {
                local_label: local.clone(),
                global_label: None,
                similarity: None,
            },
        });
    }
    report
}

/// Population statistics (std with ddof=0). None for an empty sample.
pub fn stats_of(values: &[f64]) -> Option<Stats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    Some(Stats {
        count: values.len(),
        mean,
        std: var.sqrt(),
        min,
        max,
        p25: vecmath::percentile(values, 0.25)?,
        median: vecmath::percentile(values, 0.50)?,
        p75: vecmath::percentile(values, 0.75)?,
        p95: vecmath::percentile(values, 0.95)?,
    })
}

fn suggest_threshold(stats: &Stats) -> f64 {
    (stats.mean - 0.5 * stats.std).max(stats.p25).min(stats.p75)
}

fn intra_class(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
) -> (Option<Stats>, Vec<SpeakerStats>) {
    let mut all = Vec::new();
    let mut per_speaker = Vec::new();
    for (label, profile) in profiles {
        let Some(centroid) = profile.centroid.as_ref() else {
            continue;
        };
        let mut sims = Vec::with_capacity(profile.segments.len());
        for seg in &profile.segments {
            if let Ok(sim) = vecmath::cosine(&seg.vector, centroid) {
                if sim.is_finite() {
                    sims.push(sim);
                }
            }
        }
        if let Some(stats) = stats_of(&sims) {
            all.extend_from_slice(&sims);
            per_speaker.push(SpeakerStats {
                local_label: label.clone(),
                stats,
            });
        }
    }
    (stats_of(&all), per_speaker)
}

fn inter_class(
    profiles: &BTreeMap<String, LocalSpeakerProfile>,
    registry: &Registry,
) -> Option<Stats> {
    let mut centroids: Vec<&[f32]> = Vec::new();
    for (_, speaker) in registry.iter() {
        if vecmath::is_finite_vec(&speaker.centroid) {
            centroids.push(&speaker.centroid);
        }
    }
    for profile in profiles.values() {
        if let Some(centroid) = profile.centroid.as_ref() {
            if vecmath::is_finite_vec(centroid) {
                centroids.push(centroid);
            }
        }
    }

    let mut sims = Vec::new();
    for i in 0..centroids.len() {
        for j in (i + 1)..centroids.len() {
            if let Ok(sim) = vecmath::cosine(centroids[i], centroids[j]) {
                if sim.is_finite() {
                    sims.push(sim);
                }
            }
        }
    }
    stats_of(&sims)
}
