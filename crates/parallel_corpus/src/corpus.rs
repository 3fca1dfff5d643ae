//! src/corpus.rs
//!
//! `ParallelCorpus`: the entry point tying discovery, indexing, packing and
//! streaming into one call per epoch.
//!
//! # Per-epoch pipeline
//! ```text
//!  iter() ──→ IndexBuilder.build()  ──→ raw blob + BucketIndex
//!         ──→ BatchPacker.pack()    ──→ materialized epoch file (blob deleted)
//!         ──→ BatchStream           ──→ batches (epoch file deleted at the end)
//! ```
//!
//! Every epoch re-reads the source text, so the corpus never needs to fit in
//! memory and no state survives between epochs except the epoch counter.
//!
//! # Seed Handling
//! `config.seed` (or a seed drawn once at construction) is the base seed;
//! epoch `n` packs with `base_seed + n`. Two corpora built with the same seed
//! yield the same batch sequence epoch for epoch.

use crate::config::CorpusConfig;
use crate::error::CorpusError;
use crate::index::IndexBuilder;
use crate::packer::{BatchPacker, MaterializedEpoch};
use crate::pair::split_groups;
use crate::readers::{CorpusFiles, PairedTxtSource};
use crate::sampler::BucketSampler;
use crate::stream::BatchStream;
use anyhow::{Context, Result};
use rand::Rng;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

/// Per-group token frequencies, one map per tab-delimited group.
pub type TokenFreqs = Vec<HashMap<String, usize>>;

/// A parallel corpus on disk, served as shuffled, budget-bounded batches.
///
/// # Example
/// ```ignore
/// let config = CorpusConfig::builder()
///     .token_budget(4096)
///     .max_src_tokens(128)
///     .max_tgt_tokens(128)
///     .seed(42)
///     .build();
/// let corpus = ParallelCorpus::new("data/train", "enu", "chs", config)?;
///
/// for _ in 0..num_epochs {
///     for batch in corpus.iter()? {
///         let batch = batch?;
///         // ...
///     }
/// }
/// ```
#[derive(Debug)]
pub struct ParallelCorpus {
    files: CorpusFiles,
    config: CorpusConfig,
    base_seed: u64,
    current_epoch: AtomicUsize,
    show_length_distribution: AtomicBool,
}

impl ParallelCorpus {
    /// Discovers `<key>.<src_lang>.snt` / `<key>.<tgt_lang>.snt` pairs in
    /// `dir`.
    ///
    /// The config is validated before the directory is read, so every
    /// configuration error surfaces here rather than on the first epoch.
    pub fn new(
        dir: impl AsRef<Path>,
        src_lang: &str,
        tgt_lang: &str,
        config: CorpusConfig,
    ) -> Result<Self> {
        config.validate().context("Invalid corpus configuration")?;
        let files = CorpusFiles::discover(dir, src_lang, tgt_lang)?;
        Self::from_files(files, config)
    }

    /// Builds a corpus over explicitly listed file pairs.
    pub fn from_files(files: CorpusFiles, config: CorpusConfig) -> Result<Self> {
        config.validate().context("Invalid corpus configuration")?;
        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());

        info!(
            dir = %files.dir().display(),
            file_pairs = files.len(),
            budget = config.budget(),
            shuffle_mode = %config.shuffle_mode,
            too_long_policy = %config.too_long_policy,
            max_src_tokens = config.max_src_tokens,
            max_tgt_tokens = config.max_tgt_tokens,
            "Loading parallel corpus"
        );

        Ok(Self {
            files,
            show_length_distribution: AtomicBool::new(config.show_length_distribution),
            config,
            base_seed,
            current_epoch: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn files(&self) -> &CorpusFiles {
        &self.files
    }

    /// Base seed the per-epoch RNGs are derived from.
    pub fn seed(&self) -> u64 {
        self.base_seed
    }

    /// Epoch the next `iter()` call will produce.
    pub fn current_epoch(&self) -> usize {
        self.current_epoch.load(Ordering::SeqCst)
    }

    /// Builds and packs `epoch` without advancing the epoch counter.
    ///
    /// The length distribution is logged on the first prepared epoch only
    /// (when enabled).
    pub fn prepare_epoch(&self, epoch: usize) -> Result<MaterializedEpoch> {
        info!(epoch, "Preparing epoch");
        let built = IndexBuilder::new(&self.config).build(&self.files)?;

        let show_distribution = self.show_length_distribution.swap(false, Ordering::SeqCst);
        built.stats.log_summary(&self.config, show_distribution);

        let mut sampler = BucketSampler::new(self.base_seed, epoch);
        BatchPacker::new(self.config.budget())?.pack(built, &mut sampler, &self.config.work_dir())
    }

    /// Prepares the next epoch and returns a stream over its batches.
    ///
    /// Each call advances the epoch counter, so consecutive calls yield
    /// differently shuffled (but reproducible) epochs.
    pub fn iter(&self) -> Result<BatchStream> {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst);
        self.prepare_epoch(epoch)
            .with_context(|| format!("Failed to prepare epoch {epoch}"))?
            .into_stream()
    }

    /// Counts token frequencies over every file pair.
    ///
    /// Returns one map per group for the source side and one per group for
    /// the target side. Lines are checked for group consistency like during
    /// indexing; the too-long policy is not applied.
    pub fn count_token_freqs(&self) -> Result<(TokenFreqs, TokenFreqs)> {
        let mut src_freqs = TokenFreqs::new();
        let mut tgt_freqs = TokenFreqs::new();

        for source in self.files.pairs() {
            count_file_pair(source, &mut src_freqs, &mut tgt_freqs).with_context(|| {
                format!(
                    "While counting tokens of '{}' / '{}'",
                    source.src_path().display(),
                    source.tgt_path().display()
                )
            })?;
        }

        for (group, freqs) in src_freqs.iter().enumerate() {
            info!(group, tokens = freqs.len(), "Source vocabulary size");
        }
        for (group, freqs) in tgt_freqs.iter().enumerate() {
            info!(group, tokens = freqs.len(), "Target vocabulary size");
        }
        Ok((src_freqs, tgt_freqs))
    }
}

fn count_file_pair(
    source: &PairedTxtSource,
    src_freqs: &mut TokenFreqs,
    tgt_freqs: &mut TokenFreqs,
) -> Result<()> {
    for line_pair in source.stream()? {
        let line_pair = line_pair?;
        let src_groups = split_groups(&line_pair.src);
        let tgt_groups = split_groups(&line_pair.tgt);
        if src_groups.len() != tgt_groups.len() {
            return Err(CorpusError::GroupCountMismatch {
                line: line_pair.line,
                src_groups: src_groups.len(),
                tgt_groups: tgt_groups.len(),
            }
            .into());
        }
        count_groups(&src_groups, src_freqs);
        count_groups(&tgt_groups, tgt_freqs);
    }
    Ok(())
}

fn count_groups(groups: &[&str], freqs: &mut TokenFreqs) {
    if freqs.len() < groups.len() {
        freqs.resize_with(groups.len(), HashMap::new);
    }
    for (group, map) in groups.iter().zip(freqs.iter_mut()) {
        for token in group.split_whitespace() {
            *map.entry(token.to_string()).or_default() += 1;
        }
    }
}
