//! src/stream.rs
//!
//! Streaming Batch Reader over a materialized epoch file.
//!
//! The file is memory-mapped, so only the pages being decoded are resident.
//! Records are read strictly in order, one per `next()` call.
//!
//! # Cleanup
//! The stream owns the file through a `tempfile::TempPath`:
//! - Reaching the end-of-stream sentinel unmaps and deletes it immediately.
//! - Dropping the stream early (`break`, `?`, panic unwind) deletes it in
//!   `Drop`.
//!
//! A stream is single-pass and cannot be restarted; prepare a new epoch
//! instead.

use crate::batch::{read_batch_record, SentencePairBatch};
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{error, info, warn};

/// Progress is logged every time another `PROGRESS_STEP_PERCENT` percent of
/// the batches has been read.
const PROGRESS_STEP_PERCENT: usize = 10;

/// Lazy, finite, single-pass iterator of batches.
///
/// # Example
/// ```ignore
/// let stream = corpus.iter()?;
/// for batch in stream {
///     let batch = batch?;
///     train_step(batch.pairs())?;
/// }
/// // the epoch file is gone here, whether the loop finished or not
/// ```
pub struct BatchStream {
    mmap: Option<Mmap>,
    path: Option<TempPath>,
    display_path: PathBuf,
    pos: usize,
    total_batches: usize,
    batches_read: usize,
    next_progress: usize,
    done: bool,
}

impl BatchStream {
    /// Opens a materialized epoch file holding `total_batches` batches and
    /// takes ownership of it.
    pub fn open(path: TempPath, total_batches: usize) -> Result<Self> {
        let display_path = path.to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("Failed to open epoch file {}", display_path.display()))?;
        // SAFETY: the file was written and closed by the packer and is owned
        // exclusively by this stream; nothing modifies it while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map epoch file {}", display_path.display()))?;

        Ok(Self {
            mmap: Some(mmap),
            path: Some(path),
            display_path,
            pos: 0,
            total_batches,
            batches_read: 0,
            next_progress: PROGRESS_STEP_PERCENT,
            done: false,
        })
    }

    /// Number of batches the packer wrote.
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Number of batches yielded so far.
    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    /// Path of the backing file. It no longer exists once the stream has
    /// finished.
    pub fn path(&self) -> &Path {
        &self.display_path
    }

    /// Like `next()`, but also returns the 1-based index of the batch.
    pub fn next_batch(&mut self) -> Option<Result<(usize, SentencePairBatch)>> {
        self.next()
            .map(|batch| batch.map(|batch| (self.batches_read, batch)))
    }

    /// Unmaps and deletes the backing file. Safe to call more than once.
    fn finish(&mut self) {
        self.done = true;
        self.mmap.take();
        if let Some(path) = self.path.take() {
            if let Err(e) = path.close() {
                warn!(
                    file = %self.display_path.display(),
                    "Failed to delete epoch file: {e}"
                );
            }
        }
    }

    fn log_progress(&mut self) {
        if self.total_batches == 0 {
            return;
        }
        let percent = 100 * self.batches_read / self.total_batches;
        if percent >= self.next_progress {
            info!(
                "Processing batch '{}/{}' ({percent}%).",
                self.batches_read, self.total_batches
            );
            self.next_progress = (percent / PROGRESS_STEP_PERCENT + 1) * PROGRESS_STEP_PERCENT;
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<SentencePairBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let bytes: &[u8] = self.mmap.as_deref().unwrap_or(&[]);

        match read_batch_record(bytes, self.pos) {
            Ok(Some((batch, next_pos))) => {
                self.pos = next_pos;
                self.batches_read += 1;
                self.log_progress();
                Some(Ok(batch))
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                error!(file = %self.display_path.display(), "Corrupt epoch file: {e}");
                let err = anyhow::Error::from(e).context(format!(
                    "While reading batch {} of {}",
                    self.batches_read + 1,
                    self.display_path.display()
                ));
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for BatchStream {}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.finish();
    }
}
