//! Cross-file speaker identity resolution.
//!
//! Consumes per-segment voice embeddings extracted elsewhere, aggregates
//! them into duration-weighted per-speaker centroids, and reconciles the
//! centroids against a persisted registry of previously seen speakers:
//! an existing global label is reused when the best cosine similarity
//! clears the threshold, otherwise the next sequential label is minted.
//!
//! # Usage
//!
//! ```
//! use std::collections::BTreeMap;
//! use meetscribe_speakerid::{resolve, Config, Registry, Segment};
//!
//! let mut segments: BTreeMap<String, Vec<Segment>> = BTreeMap::new();
//! segments.insert("SPEAKER_00".into(), vec![Segment {
//!     vector: vec![1.0, 0.0],
//!     raw_vector: vec![2.0, 0.0],
//!     duration: 3.5,
//!     start: 0.0,
//!     end: 3.5,
//! }]);
//!
//! let out = resolve(segments, Registry::new(), &Config::default());
//! assert_eq!(out.mapping["SPEAKER_00"], "SPK00");
//! ```
//!
//! # Design
//!
//! A run is single-threaded and deterministic: profiles are processed in
//! ascending label order and the registry iterates sorted by label, so
//! matching and tie-breaking never depend on hash order. [`resolve`] is
//! infallible — invalid vectors, zero durations and empty inputs degrade
//! to skips recorded in the output, never errors. The registry is the
//! only mutable state and is owned by the run: loaded by the caller,
//! mutated in place, handed back for persistence.
//!
//! Matching and local merging are both O(n^2) per step. Fine for the
//! single-digit speaker counts one file produces; revisit before pointing
//! this at registries with thousands of identities.

mod clean;
mod diagnostics;
mod error;
mod matcher;
mod merge;
mod profile;
mod registry;
mod resolver;
pub mod vecmath;

pub use clean::{CleanIteration, CleanReport};
pub use diagnostics::{stats_of, BestMatch, Diagnostics, SpeakerStats, Stats};
pub use error::SpeakerIdError;
pub use matcher::MatchOutcome;
pub use merge::MergeEvent;
pub use profile::{build_profiles, LocalSpeakerProfile, Segment};
pub use registry::{GlobalSpeaker, Registry};
pub use resolver::{resolve, Config, Resolution};
