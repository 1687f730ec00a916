//! Persistent cross-file speaker registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vecmath;

/// A cross-file speaker identity: unit centroid plus accumulated speech
/// time across every file it was seen in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSpeaker {
    pub centroid: Vec<f32>,
    pub duration: f64,
}

/// Global labels (e.g. "SPK00") mapped to speaker identities, ordered by
/// label so iteration and tie-breaking are deterministic.
///
/// Lifecycle is owned by the caller: load from persisted state, hand to a
/// resolution run which mutates it in place, persist the returned value.
/// A run only updates or adds entries; the registry never shrinks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    speakers: BTreeMap<String, GlobalSpeaker>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from persisted entries, re-normalizing each
    /// centroid. Entries with empty, zero-norm or non-finite centroids
    /// are dropped.
    pub fn from_entries(entries: BTreeMap<String, GlobalSpeaker>) -> Self {
        let mut speakers = BTreeMap::new();
        for (label, mut speaker) in entries {
            if speaker.centroid.is_empty() {
                continue;
            }
            let Ok(unit) = vecmath::normalize(&speaker.centroid) else {
                continue;
            };
            if unit.iter().all(|&x| x == 0.0) {
                continue;
            }
            speaker.centroid = unit;
            speakers.insert(label, speaker);
        }
        Self { speakers }
    }

    pub fn insert(&mut self, label: String, speaker: GlobalSpeaker) {
        self.speakers.insert(label, speaker);
    }

    pub fn get(&self, label: &str) -> Option<&GlobalSpeaker> {
        self.speakers.get(label)
    }

    /// Entries in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &GlobalSpeaker)> {
        self.speakers.iter()
    }

    /// Labels in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.speakers.keys()
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    /// Next unused sequential label: numeric suffix is one past the
    /// highest suffix among existing `SPK`-prefixed labels, zero-padded
    /// to at least two digits.
    pub fn next_label(&self) -> String {
        let mut max_index: i64 = -1;
        for label in self.speakers.keys() {
            if let Some(rest) = label.strip_prefix("SPK") {
                if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(n) = rest.parse::<i64>() {
                        max_index = max_index.max(n);
                    }
                }
            }
        }
        format!("SPK{:02}", max_index + 1)
    }
}
