//! src/error.rs
//!
//! Typed failure taxonomy for corpus preparation.
//!
//! Public functions return `anyhow::Result` so that file names and line
//! numbers can be layered on with `.with_context(..)`. The variants below are
//! the root causes a caller may want to match on:
//!
//! ```ignore
//! match corpus.iter() {
//!     Err(err) => match err.downcast_ref::<CorpusError>() {
//!         Some(CorpusError::GroupCountMismatch { .. }) => { /* fix the data */ }
//!         _ => return Err(err),
//!     },
//!     Ok(stream) => { /* train */ }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    // ---- configuration -------------------------------------------------------
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownOption {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("corpus file '{}' has no matching '{expected_suffix}' counterpart", path.display())]
    MissingCounterpart {
        path: PathBuf,
        expected_suffix: String,
    },

    #[error("no '*{src_suffix}' / '*{tgt_suffix}' file pairs found in '{}'", dir.display())]
    EmptyCorpus {
        dir: PathBuf,
        src_suffix: String,
        tgt_suffix: String,
    },

    // ---- corpus format -------------------------------------------------------
    #[error(
        "inconsistent group size at line {line}: source has {src_groups} group(s), target has {tgt_groups}"
    )]
    GroupCountMismatch {
        line: usize,
        src_groups: usize,
        tgt_groups: usize,
    },

    #[error("{ended} side reached end of file at line {line} while the other side still has data")]
    UnbalancedEof { line: usize, ended: &'static str },

    // ---- on-disk records -----------------------------------------------------
    #[error("corrupt record at byte {offset}: {reason}")]
    CorruptRecord { offset: usize, reason: String },
}

impl CorpusError {
    /// Returns `true` for errors that should have been caught before any
    /// indexing work started.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnknownOption { .. }
                | Self::MissingCounterpart { .. }
                | Self::EmptyCorpus { .. }
        )
    }

    /// Returns `true` for data errors that invalidate the whole corpus.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::GroupCountMismatch { .. } | Self::UnbalancedEof { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_variants() {
        assert!(CorpusError::InvalidConfig("x".into()).is_config_error());
        assert!(CorpusError::UnbalancedEof {
            line: 3,
            ended: "source"
        }
        .is_format_error());
        assert!(!CorpusError::CorruptRecord {
            offset: 0,
            reason: "eof".into()
        }
        .is_config_error());
    }

    #[test]
    fn survives_anyhow_round_trip() {
        let err: anyhow::Error = CorpusError::GroupCountMismatch {
            line: 7,
            src_groups: 2,
            tgt_groups: 1,
        }
        .into();
        let err = err.context("while reading train.en.snt");
        let root = err.downcast_ref::<CorpusError>().unwrap();
        assert!(root.is_format_error());
        assert!(format!("{root}").contains("line 7"));
    }
}
