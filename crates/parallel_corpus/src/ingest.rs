//! src/ingest.rs
//!
//! Turns aligned line pairs into length-classified `RawSentencePair`s and
//! applies the too-long-sequence policy.
//!
//! ```text
//!   (src line, tgt line)
//!          │ split on '\t', check group counts
//!          ↓
//!   token counts ──→ LengthHistogram (observational)
//!          │
//!          ↓ policy
//!   Ignore:     over max → Rejected (counted)
//!   Truncation: over max → clipped side, Accepted
//!          │
//!          ↓
//!   RawSentencePair { bucket_key, .. }
//! ```

use crate::config::{CorpusConfig, ShuffleMode, TooLongSequencePolicy};
use crate::error::CorpusError;
use crate::pair::{bucket_key, count_tokens, split_groups, truncate_line, RawSentencePair};
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Width of one histogram class in tokens.
pub const HISTOGRAM_CLASS_WIDTH: usize = 100;

/// Outcome of ingesting one line pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Accepted(RawSentencePair),
    /// Dropped under `TooLongSequencePolicy::Ignore`.
    Rejected { src_too_long: bool, tgt_too_long: bool },
}

/// Token-count distribution in classes of `HISTOGRAM_CLASS_WIDTH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthHistogram {
    classes: BTreeMap<usize, usize>,
}

impl LengthHistogram {
    pub fn record(&mut self, tokens: usize) {
        *self.classes.entry(tokens / HISTOGRAM_CLASS_WIDTH).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &LengthHistogram) {
        for (&class, &count) in &other.classes {
            *self.classes.entry(class).or_insert(0) += count;
        }
    }

    pub fn total(&self) -> usize {
        self.classes.values().sum()
    }

    /// `(class_start, class_end, count, accumulated_percent)` rows in class order.
    pub fn rows(&self) -> Vec<(usize, usize, usize, f64)> {
        let total = self.total().max(1) as f64;
        let mut acc = 0;
        self.classes
            .iter()
            .map(|(&class, &count)| {
                acc += count;
                (
                    class * HISTOGRAM_CLASS_WIDTH,
                    (class + 1) * HISTOGRAM_CLASS_WIDTH,
                    count,
                    100.0 * acc as f64 / total,
                )
            })
            .collect()
    }

    fn log(&self, side: &str) {
        info!("{side} token length distribution");
        for (start, end, count, acc) in self.rows() {
            info!("{start} ~ {end}: {count} (acc: {acc:.2}%)");
        }
    }
}

/// Counters collected while ingesting one or more file pairs.
///
/// Each ingestion worker owns its own `IngestStats`; partial stats are
/// combined with [`IngestStats::merge`] once all files are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Line pairs read, accepted or not
    pub pairs_read: usize,
    /// Pairs written to the index
    pub accepted: usize,
    /// Source sides over `max_src_tokens` (counted under both policies)
    pub src_too_long: usize,
    /// Target sides over `max_tgt_tokens` (counted under both policies)
    pub tgt_too_long: usize,
    /// Pairs dropped by the `Ignore` policy
    pub rejected: usize,
    /// Pairs clipped by the `Truncation` policy
    pub truncated: usize,
    pub src_lengths: LengthHistogram,
    pub tgt_lengths: LengthHistogram,
}

impl IngestStats {
    pub fn merge(&mut self, other: &IngestStats) {
        self.pairs_read += other.pairs_read;
        self.accepted += other.accepted;
        self.src_too_long += other.src_too_long;
        self.tgt_too_long += other.tgt_too_long;
        self.rejected += other.rejected;
        self.truncated += other.truncated;
        self.src_lengths.merge(&other.src_lengths);
        self.tgt_lengths.merge(&other.tgt_lengths);
    }

    /// Logs the rejection summary and, optionally, the length distributions.
    pub fn log_summary(&self, config: &CorpusConfig, show_distribution: bool) {
        info!(
            accepted = self.accepted,
            read = self.pairs_read,
            "Indexed {} sentence pairs",
            self.accepted
        );

        let action = match config.too_long_policy {
            TooLongSequencePolicy::Ignore => "ignored them",
            TooLongSequencePolicy::Truncation => "truncated them",
        };
        if self.src_too_long > 0 {
            warn!(
                "Found {} source sentences longer than '{}' tokens, {action}.",
                self.src_too_long, config.max_src_tokens
            );
        }
        if self.tgt_too_long > 0 {
            warn!(
                "Found {} target sentences longer than '{}' tokens, {action}.",
                self.tgt_too_long, config.max_tgt_tokens
            );
        }

        if show_distribution {
            info!(shuffle_mode = %config.shuffle_mode, "Token length distribution");
            self.src_lengths.log("Source");
            self.tgt_lengths.log("Target");
        }
    }
}

/// Applies group checks, token counting and the too-long policy to line pairs.
#[derive(Debug, Clone)]
pub struct PairIngestor {
    max_src_tokens: usize,
    max_tgt_tokens: usize,
    policy: TooLongSequencePolicy,
    mode: ShuffleMode,
    length_class_width: usize,
}

impl PairIngestor {
    pub fn new(config: &CorpusConfig) -> Self {
        Self {
            max_src_tokens: config.max_src_tokens,
            max_tgt_tokens: config.max_tgt_tokens,
            policy: config.too_long_policy,
            mode: config.shuffle_mode,
            length_class_width: config.length_class_width,
        }
    }

    /// Ingests one aligned line pair.
    ///
    /// # Errors
    /// `CorpusError::GroupCountMismatch` if the two sides have a different
    /// number of tab-delimited groups. This is fatal for the whole corpus.
    pub fn ingest(
        &self,
        line: usize,
        src: &str,
        tgt: &str,
        stats: &mut IngestStats,
    ) -> Result<Ingested> {
        let src_groups = split_groups(src).len();
        let tgt_groups = split_groups(tgt).len();
        if src_groups != tgt_groups {
            return Err(CorpusError::GroupCountMismatch {
                line,
                src_groups,
                tgt_groups,
            }
            .into());
        }

        stats.pairs_read += 1;
        let src_tokens = count_tokens(src);
        let tgt_tokens = count_tokens(tgt);
        stats.src_lengths.record(src_tokens);
        stats.tgt_lengths.record(tgt_tokens);

        let src_too_long = src_tokens > self.max_src_tokens;
        let tgt_too_long = tgt_tokens > self.max_tgt_tokens;
        stats.src_too_long += src_too_long as usize;
        stats.tgt_too_long += tgt_too_long as usize;

        let raw = match (self.policy, src_too_long || tgt_too_long) {
            (_, false) => self.make_pair(
                src.to_string(),
                tgt.to_string(),
                src_tokens,
                tgt_tokens,
                false,
            ),
            (TooLongSequencePolicy::Ignore, true) => {
                stats.rejected += 1;
                return Ok(Ingested::Rejected {
                    src_too_long,
                    tgt_too_long,
                });
            }
            (TooLongSequencePolicy::Truncation, true) => {
                stats.truncated += 1;
                let (src_text, src_tokens) = if src_too_long {
                    (truncate_line(src, self.max_src_tokens), self.max_src_tokens)
                } else {
                    (src.to_string(), src_tokens)
                };
                let (tgt_text, tgt_tokens) = if tgt_too_long {
                    (truncate_line(tgt, self.max_tgt_tokens), self.max_tgt_tokens)
                } else {
                    (tgt.to_string(), tgt_tokens)
                };
                self.make_pair(src_text, tgt_text, src_tokens, tgt_tokens, true)
            }
        };

        stats.accepted += 1;
        Ok(Ingested::Accepted(raw))
    }

    fn make_pair(
        &self,
        src_text: String,
        tgt_text: String,
        src_token_count: usize,
        tgt_token_count: usize,
        is_truncated: bool,
    ) -> RawSentencePair {
        RawSentencePair {
            bucket_key: bucket_key(
                self.mode,
                src_token_count,
                tgt_token_count,
                self.length_class_width,
            ),
            src_text,
            tgt_text,
            src_token_count,
            tgt_token_count,
            is_truncated,
        }
    }
}
