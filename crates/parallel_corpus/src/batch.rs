//! src/batch.rs
//!
//! The `SentencePairBatch` handed to the training loop, and its on-disk
//! record in the materialized epoch file.
//!
//! # Materialized file layout (little endian)
//! ```text
//! [i32 pair_count][u32 len][src lines joined by '\n'][u32 len][tgt lines joined by '\n']
//! ...
//! [i32 -1]                                   <- end of stream
//! ```
//! Lines never contain `'\n'` (they were read line by line), so the newline
//! is a safe separator; groups inside a line keep their `'\t'`.

use crate::codec::{write_i32, write_str, Cursor};
use crate::error::CorpusError;
use crate::pair::SentencePair;
use anyhow::{Context, Result};
use std::io::Write;

/// Separator between lines inside one record blob.
pub const LINE_SEPARATOR: char = '\n';

/// Pair count marking the end of the materialized stream.
pub const END_OF_STREAM: i32 = -1;

/// An ordered batch of aligned sentence pairs.
///
/// All pairs come from one length bucket, and together hold at most the
/// configured token budget unless the batch is a single over-budget pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentencePairBatch {
    pairs: Vec<SentencePair>,
}

impl SentencePairBatch {
    pub fn new(pairs: Vec<SentencePair>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[SentencePair] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<SentencePair> {
        self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn src_lines(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.src.as_str())
    }

    pub fn tgt_lines(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.tgt.as_str())
    }

    /// Combined source + target tokens over the batch.
    pub fn token_count(&self) -> usize {
        self.pairs.iter().map(SentencePair::token_count).sum()
    }
}

impl IntoIterator for SentencePairBatch {
    type Item = SentencePair;
    type IntoIter = std::vec::IntoIter<SentencePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Appends one batch record.
pub(crate) fn write_batch_record<W: Write>(
    w: &mut W,
    src_lines: &[&str],
    tgt_lines: &[&str],
) -> Result<()> {
    debug_assert_eq!(src_lines.len(), tgt_lines.len());
    let count = i32::try_from(src_lines.len())
        .with_context(|| format!("batch of {} pairs is too large", src_lines.len()))?;
    write_i32(w, count)?;
    write_str(w, &src_lines.join("\n"))?;
    write_str(w, &tgt_lines.join("\n"))?;
    Ok(())
}

pub(crate) fn write_end_of_stream<W: Write>(w: &mut W) -> Result<()> {
    write_i32(w, END_OF_STREAM)?;
    Ok(())
}

/// Decodes the record at `pos`. Returns `None` at the end-of-stream sentinel,
/// otherwise the batch and the position of the next record.
pub(crate) fn read_batch_record(
    bytes: &[u8],
    pos: usize,
) -> Result<Option<(SentencePairBatch, usize)>, CorpusError> {
    let mut cursor = Cursor::new(bytes, pos);
    let count = cursor.read_i32()?;
    if count == END_OF_STREAM {
        return Ok(None);
    }
    if count <= 0 {
        return Err(CorpusError::CorruptRecord {
            offset: pos,
            reason: format!("invalid pair count {count}"),
        });
    }
    let count = count as usize;

    let src_blob = cursor.read_str()?;
    let tgt_blob = cursor.read_str()?;
    let src_lines: Vec<&str> = src_blob.split(LINE_SEPARATOR).collect();
    let tgt_lines: Vec<&str> = tgt_blob.split(LINE_SEPARATOR).collect();
    if src_lines.len() != count || tgt_lines.len() != count {
        return Err(CorpusError::CorruptRecord {
            offset: pos,
            reason: format!(
                "expected {count} lines per side, found {} source and {} target",
                src_lines.len(),
                tgt_lines.len()
            ),
        });
    }

    let pairs = src_lines
        .into_iter()
        .zip(tgt_lines)
        .map(|(src, tgt)| SentencePair::new(src, tgt))
        .collect();
    Ok(Some((SentencePairBatch::new(pairs), cursor.position())))
}
