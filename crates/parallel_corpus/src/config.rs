//! src/config.rs
//!
//! Configuration for corpus preparation.
//!
//! The `CorpusConfig` struct stores the parameters that control how a
//! parallel corpus is indexed, shuffled and packed into batches.
//!
//! Example:
//! ```ignore
//! let config = CorpusConfig::builder()
//!     .token_budget(4096)
//!     .max_src_tokens(128)
//!     .max_tgt_tokens(128)
//!     .shuffle_mode(ShuffleMode::NoPadding)
//!     .too_long_policy(TooLongSequencePolicy::Truncation)
//!     .seed(42)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `token_budget`: Larger budgets mean fewer, bigger batches.
//! - `length_class_width`: Wider classes mix more lengths per bucket (better
//!                         shuffling, more padding downstream).
//! - `num_workers`: Parses file pairs in parallel; only pays off with several
//!                  input files.

use crate::error::CorpusError;
use anyhow::{ensure, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How pairs are grouped into buckets before shuffling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShuffleMode {
    /// Buckets by the combined source + target length.
    #[default]
    Random,
    /// Buckets by the longer of the two sides.
    NoPadding,
    /// Buckets by the source side only.
    NoPaddingInSrc,
}

impl fmt::Display for ShuffleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "Random",
            Self::NoPadding => "NoPadding",
            Self::NoPaddingInSrc => "NoPaddingInSrc",
        };
        f.write_str(name)
    }
}

impl FromStr for ShuffleMode {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "group" => Ok(Self::Random),
            "nopadding" => Ok(Self::NoPadding),
            "nopaddinginsrc" => Ok(Self::NoPaddingInSrc),
            _ => Err(CorpusError::UnknownOption {
                kind: "shuffle mode",
                value: s.to_string(),
                expected: "Random, NoPadding, NoPaddingInSrc",
            }),
        }
    }
}

/// What to do with a pair whose source or target exceeds its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TooLongSequencePolicy {
    /// Drop the pair and count it.
    #[default]
    Ignore,
    /// Clip the offending side to the maximum and keep the pair.
    Truncation,
}

impl fmt::Display for TooLongSequencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("Ignore"),
            Self::Truncation => f.write_str("Truncation"),
        }
    }
}

impl FromStr for TooLongSequencePolicy {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "truncation" => Ok(Self::Truncation),
            _ => Err(CorpusError::UnknownOption {
                kind: "too-long-sequence policy",
                value: s.to_string(),
                expected: "Ignore, Truncation",
            }),
        }
    }
}

/// Configuration for a `ParallelCorpus`
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Maximum source tokens per pair before the too-long policy applies
    pub max_src_tokens: usize,
    /// Maximum target tokens per pair before the too-long policy applies
    pub max_tgt_tokens: usize,
    /// Combined source + target tokens packed into one batch (required)
    pub token_budget: Option<usize>,
    /// How pairs are bucketed by length
    pub shuffle_mode: ShuffleMode,
    /// Drop or clip over-long pairs
    pub too_long_policy: TooLongSequencePolicy,
    /// Number of tokens covered by one length class
    pub length_class_width: usize,
    /// Base seed for bucket selection. A random one is drawn when unset.
    pub seed: Option<u64>,
    /// Number of ingestion workers (0 = single-threaded)
    pub num_workers: usize,
    /// Directory for the temporary raw blob and materialized epoch files
    pub work_dir: Option<PathBuf>,
    /// Log the token length distribution after the first index build
    pub show_length_distribution: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            max_src_tokens: 32,
            max_tgt_tokens: 32,
            token_budget: None,
            shuffle_mode: ShuffleMode::Random,
            too_long_policy: TooLongSequencePolicy::Ignore,
            length_class_width: 10,
            seed: None,
            num_workers: 0,
            work_dir: None,
            show_length_distribution: true,
        }
    }
}

impl CorpusConfig {
    pub fn builder() -> CorpusConfigBuilder {
        CorpusConfigBuilder::default()
    }

    /// Checks every option. Called before any file is touched.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_src_tokens > 0,
            CorpusError::InvalidConfig(format!(
                "max_src_tokens must be > 0, but got max_src_tokens={}",
                self.max_src_tokens
            ))
        );
        ensure!(
            self.max_tgt_tokens > 0,
            CorpusError::InvalidConfig(format!(
                "max_tgt_tokens must be > 0, but got max_tgt_tokens={}",
                self.max_tgt_tokens
            ))
        );
        match self.token_budget {
            Some(budget) => ensure!(
                budget > 0,
                CorpusError::InvalidConfig(format!(
                    "token_budget must be > 0, but got token_budget={budget}"
                ))
            ),
            None => {
                return Err(CorpusError::InvalidConfig("token_budget must be set".into()).into())
            }
        }
        ensure!(
            self.length_class_width > 0,
            CorpusError::InvalidConfig(format!(
                "length_class_width must be > 0, but got length_class_width={}",
                self.length_class_width
            ))
        );
        if let Some(dir) = &self.work_dir {
            ensure!(
                dir.is_dir(),
                CorpusError::InvalidConfig(format!(
                    "work_dir '{}' is not an existing directory",
                    dir.display()
                ))
            );
        }
        Ok(())
    }

    /// Token budget, or 0 if unset. Only meaningful after `validate()`.
    pub(crate) fn budget(&self) -> usize {
        self.token_budget.unwrap_or(0)
    }

    /// Directory where temporary files are created.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for CorpusConfig with method chaining
#[derive(Default)]
pub struct CorpusConfigBuilder {
    config: CorpusConfig,
}

impl CorpusConfigBuilder {
    /// Set the maximum source length in tokens
    pub fn max_src_tokens(mut self, max: usize) -> Self {
        self.config.max_src_tokens = max;
        self
    }

    /// Set the maximum target length in tokens
    pub fn max_tgt_tokens(mut self, max: usize) -> Self {
        self.config.max_tgt_tokens = max;
        self
    }

    /// Set the combined token budget per batch (must be > 0)
    pub fn token_budget(mut self, budget: usize) -> Self {
        self.config.token_budget = Some(budget);
        self
    }

    pub fn shuffle_mode(mut self, mode: ShuffleMode) -> Self {
        self.config.shuffle_mode = mode;
        self
    }

    pub fn too_long_policy(mut self, policy: TooLongSequencePolicy) -> Self {
        self.config.too_long_policy = policy;
        self
    }

    /// Set how many tokens fall into one length class.
    ///
    /// - Too low: buckets hold few pairs, so batches rarely fill the budget.
    /// - Too high: batches mix very different lengths.
    pub fn length_class_width(mut self, width: usize) -> Self {
        self.config.length_class_width = width;
        self
    }

    /// Set the base seed. Epoch `e` shuffles with `seed + e`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Set the number of ingestion workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the directory for temporary files
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn show_length_distribution(mut self, show: bool) -> Self {
        self.config.show_length_distribution = show;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> CorpusConfig {
        self.config
    }
}
