//! spkresolve - Resolve per-file speaker embeddings against a persistent
//! speaker registry.
//!
//! Input segments JSON, keyed by file-local diarization label:
//!
//! ```json
//! {
//!   "SPEAKER_00": [
//!     {"vector": [..], "raw_vector": [..], "duration": 2.5,
//!      "start": 0.0, "end": 2.5}
//!   ]
//! }
//! ```
//!
//! Registry JSON: `{"SPK00": {"centroid": [..], "duration": 123.4}, ..}`.
//! The full output bundle (mapping, updated registry, diagnostics) goes
//! to `--output`; the registry and reports can also be written to
//! separate files for the next run to pick up.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use meetscribe_speakerid::{resolve, Config, GlobalSpeaker, Registry, Segment};
use serde::Serialize;
use tracing::{info, warn};

/// Resolve per-file speaker embeddings against a persistent registry.
#[derive(Parser, Debug)]
#[command(name = "spkresolve")]
#[command(about = "Resolve per-file speaker embeddings against a persistent speaker registry")]
struct Args {
    /// Per-label segment embeddings JSON
    #[arg(long)]
    segments: PathBuf,

    /// Prior registry JSON (omit to start empty)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Output bundle JSON
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Also write the updated registry to this file
    #[arg(long)]
    registry_out: Option<PathBuf>,

    /// Also write the best-match report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also write the similarity matrix to this file
    #[arg(long)]
    similarity_matrix_out: Option<PathBuf>,

    /// Minimum cosine similarity to reuse an existing label
    #[arg(long, default_value_t = 0.75)]
    threshold: f64,

    /// Lower the threshold stepwise when nothing matches
    #[arg(long)]
    auto_lower_threshold: bool,

    /// Threshold floor for auto-lowering
    #[arg(long, default_value_t = 0.60)]
    auto_lower_min: f64,

    /// Threshold decrement per retry
    #[arg(long, default_value_t = 0.02)]
    auto_lower_step: f64,

    /// Expected local speaker count (0 disables merging)
    #[arg(long, default_value_t = 0)]
    target_local_speakers: usize,

    /// Prune outlier segments per speaker before matching
    #[arg(long)]
    intra_clean: bool,

    /// Similarity percentile below which segments are pruned
    #[arg(long, default_value_t = 0.25)]
    intra_clean_percentile: f64,

    /// Minimum segments retained per speaker while pruning
    #[arg(long, default_value_t = 3)]
    intra_clean_min_segments: usize,

    /// Maximum pruning iterations per speaker
    #[arg(long, default_value_t = 2)]
    intra_clean_max_iter: usize,

    /// Quiet mode (warnings only)
    #[arg(short = 'q', long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            threshold: self.threshold,
            auto_lower_threshold: self.auto_lower_threshold,
            auto_lower_min: self.auto_lower_min,
            auto_lower_step: self.auto_lower_step,
            target_local_speakers: self.target_local_speakers,
            intra_clean: self.intra_clean,
            intra_clean_percentile: self.intra_clean_percentile,
            intra_clean_min_segments: self.intra_clean_min_segments,
            intra_clean_max_iterations: self.intra_clean_max_iter,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    let segments = load_segments(&args.segments)?;
    let registry = match &args.registry {
        Some(path) => load_registry(path)?,
        None => Registry::new(),
    };

    info!(
        local_speakers = segments.len(),
        registry_speakers = registry.len(),
        "resolving speakers"
    );
    if segments.is_empty() {
        warn!("no local speakers in input; writing empty result");
    }

    let out = resolve(segments, registry, &args.config());

    let matched = out.outcomes.iter().filter(|o| o.matched_existing).count();
    info!(
        matched,
        created = out.outcomes.len() - matched,
        invalid = out.invalid_local_labels.len(),
        skipped_segments = out.skipped_segments,
        effective_threshold = out.effective_threshold,
        "resolution finished"
    );
    for outcome in &out.outcomes {
        info!(
            local = %outcome.local_label,
            global = %outcome.global_label,
            matched = outcome.matched_existing,
            similarity = outcome.similarity,
            "assigned"
        );
    }

    write_json(&args.output, &out).context("write output bundle")?;
    if let Some(path) = &args.registry_out {
        write_json(path, &out.registry).context("write updated registry")?;
    }
    if let Some(path) = &args.report {
        write_json(path, &out.diagnostics.best_matches).context("write best-match report")?;
    }
    if let Some(path) = &args.similarity_matrix_out {
        write_json(path, &out.diagnostics.similarity_matrix)
            .context("write similarity matrix")?;
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn load_segments(path: &Path) -> Result<BTreeMap<String, Vec<Segment>>> {
    let data = fs::read(path)
        .with_context(|| format!("read segments file {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("parse segments file {}", path.display()))
}

fn load_registry(path: &Path) -> Result<Registry> {
    if !path.exists() {
        info!(path = %path.display(), "no prior registry; starting empty");
        return Ok(Registry::new());
    }
    let data = fs::read(path)
        .with_context(|| format!("read registry file {}", path.display()))?;
    let entries: BTreeMap<String, GlobalSpeaker> = serde_json::from_slice(&data)
        .with_context(|| format!("parse registry file {}", path.display()))?;
    Ok(Registry::from_entries(entries))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
