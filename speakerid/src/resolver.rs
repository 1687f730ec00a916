//! Orchestrates a full resolution run: build profiles, optionally clean
//! and merge them, match against the registry, mint new labels, report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clean::{self, CleanReport};
use crate::diagnostics::{self, Diagnostics};
use crate::matcher::{self, MatchOutcome};
use crate::merge::{self, MergeEvent};
use crate::profile::{self, Segment};
use crate::registry::Registry;

/// Tuning knobs for a resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum cosine similarity to reuse an existing global label.
    /// Boundary-inclusive: a similarity equal to the threshold matches.
    pub threshold: f64,
    /// Retry matching at progressively lower thresholds when the first
    /// pass matches nothing.
    pub auto_lower_threshold: bool,
    /// Lowest threshold the retry loop may reach (inclusive).
    pub auto_lower_min: f64,
    /// Decrement applied per retry.
    pub auto_lower_step: f64,
    /// Expected local speaker count for this file; 0 disables merging.
    pub target_local_speakers: usize,
    /// Enable intra-speaker outlier pruning before matching.
    pub intra_clean: bool,
    /// Segments below this similarity percentile are pruned (0.25 = p25).
    pub intra_clean_percentile: f64,
    /// Never prune a speaker below this many segments.
    pub intra_clean_min_segments: usize,
    /// Maximum pruning iterations per speaker.
    pub intra_clean_max_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            auto_lower_threshold: false,
            auto_lower_min: 0.60,
            auto_lower_step: 0.02,
            target_local_speakers: 0,
            intra_clean: false,
            intra_clean_percentile: 0.25,
            intra_clean_min_segments: 3,
            intra_clean_max_iterations: 2,
        }
    }
}

/// Everything one run produces. The caller persists `registry` and
/// reports the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// The registry with matched entries updated and new labels inserted.
    pub registry: Registry,
    /// local label -> global label, for every resolved local speaker.
    pub mapping: BTreeMap<String, String>,
    /// One record per resolved local speaker, in processing order.
    pub outcomes: Vec<MatchOutcome>,
    /// Local-merge audit trail, in merge order.
    pub merge_history: Vec<MergeEvent>,
    /// Every original local label -> its surviving local label.
    pub label_trace: BTreeMap<String, String>,
    /// Outlier-pruning audit trail, one entry per cleaned speaker.
    pub clean_reports: Vec<CleanReport>,
    pub diagnostics: Diagnostics,
    /// Labels dropped for having no valid centroid.
    pub invalid_local_labels: Vec<String>,
    /// Segments skipped for non-finite vectors or non-positive durations.
    pub skipped_segments: usize,
    /// The threshold that actually produced matches (after any
    /// auto-lowering), or the configured one when nothing matched.
    pub effective_threshold: f64,
}

/// Resolves the local speakers of one file against the registry.
///
/// Deterministic and infallible: invalid vectors, unmatchable profiles
/// and empty inputs all degrade to recorded skips in the output rather
/// than errors. Profiles are processed in ascending local-label order.
pub fn resolve(
    segments: BTreeMap<String, Vec<Segment>>,
    mut registry: Registry,
    cfg: &Config,
) -> Resolution {
    let (mut profiles, mut invalid, skipped) = profile::build_profiles(segments);

    let clean_reports = if cfg.intra_clean {
        clean::clean_profiles(&mut profiles, cfg, &mut invalid)
    } else {
        Vec::new()
    };

    let (merge_history, label_trace) = if cfg.target_local_speakers > 0 {
        merge::merge_to_target(&mut profiles, cfg.target_local_speakers)
    } else {
        let trace = profiles
            .keys()
            .map(|label| (label.clone(), label.clone()))
            .collect();
        (Vec::new(), trace)
    };

    let (mut outcomes, mut mapping, effective_threshold) =
        matcher::match_existing(&profiles, &mut registry, cfg);

    // Snapshot before minting new labels so diagnostics compare against
    // the registry as it stood prior to this run's additions.
    let registry_before_new = registry.clone();
    let diagnostics = diagnostics::report(&profiles, &registry_before_new);

    outcomes.extend(matcher::register_new(&profiles, &mut mapping, &mut registry));

    Resolution {
        registry,
        mapping,
        outcomes,
        merge_history,
        label_trace,
        clean_reports,
        diagnostics,
        invalid_local_labels: invalid,
        skipped_segments: skipped,
        effective_threshold,
    }
}
