//! src/packer.rs
//!
//! Batch Packer: turns a built index into one materialized epoch file.
//!
//! ```text
//!  loop:
//!    key   = BucketSampler.select(index)        (weighted by remaining count)
//!    batch = drain bucket[key] FIFO under the token budget
//!    write batch record
//!  write end-of-stream sentinel
//! ```
//!
//! The raw blob is consumed by the pass: it is closed once every pair has
//! been written, and removed by its drop guard if the pass fails.

use crate::batch::{write_batch_record, write_end_of_stream};
use crate::blob::RawBlob;
use crate::index::{BucketIndex, BuiltIndex};
use crate::ingest::IngestStats;
use crate::sampler::BucketSampler;
use crate::stream::BatchStream;
use anyhow::{ensure, Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Emit a progress line every this many batches.
const PROGRESS_LOG_INTERVAL: usize = 10_000;

/// A fully written epoch file, ready to be streamed.
///
/// Dropping it without streaming deletes the file.
pub struct MaterializedEpoch {
    path: TempPath,
    batches: usize,
    pairs: usize,
    stats: IngestStats,
}

impl MaterializedEpoch {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batch records written.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Number of sentence pairs over all batches.
    pub fn pairs(&self) -> usize {
        self.pairs
    }

    /// Ingestion counters of the build this epoch was packed from.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Opens the file for streaming; the stream takes over its cleanup.
    pub fn into_stream(self) -> Result<BatchStream> {
        BatchStream::open(self.path, self.batches)
    }
}

/// Drains a `BucketIndex` into budget-bounded batches.
#[derive(Debug, Clone, Copy)]
pub struct BatchPacker {
    token_budget: usize,
}

impl BatchPacker {
    pub fn new(token_budget: usize) -> Result<Self> {
        ensure!(
            token_budget > 0,
            "token_budget must be > 0, but got token_budget={token_budget}"
        );
        Ok(Self { token_budget })
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Packs every indexed pair into batches and writes them, in sampled
    /// order, to a new `.sorted` file in `work_dir`.
    pub fn pack(
        &self,
        built: BuiltIndex,
        sampler: &mut BucketSampler,
        work_dir: &Path,
    ) -> Result<MaterializedEpoch> {
        let BuiltIndex {
            blob,
            mut index,
            stats,
        } = built;

        let file = tempfile::Builder::new()
            .prefix("corpus-")
            .suffix(".sorted")
            .tempfile_in(work_dir)
            .with_context(|| format!("Failed to create epoch file in {}", work_dir.display()))?;
        let (file, path) = file.into_parts();
        let mut writer = BufWriter::with_capacity(1 << 20, file);

        info!(
            pairs = index.total(),
            buckets = index.len(),
            budget = self.token_budget,
            "Shuffling and packing sentence pairs"
        );
        let (batches, pairs) = self.write_batches(&blob, &mut index, sampler, &mut writer)?;
        write_end_of_stream(&mut writer)?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to flush epoch file {}", path.display()))?;

        debug_assert!(index.is_empty());
        if let Err(e) = blob.close() {
            warn!("{e:#}");
        }
        info!(batches, pairs, file = %path.display(), "Finished packing epoch");

        Ok(MaterializedEpoch {
            path,
            batches,
            pairs,
            stats,
        })
    }

    fn write_batches<W: Write>(
        &self,
        blob: &RawBlob,
        index: &mut BucketIndex,
        sampler: &mut BucketSampler,
        writer: &mut W,
    ) -> Result<(usize, usize)> {
        let mut src_lines = Vec::new();
        let mut tgt_lines = Vec::new();
        let mut batches = 0;
        let mut pairs = 0;

        while let Some(key) = sampler.select(index) {
            src_lines.clear();
            tgt_lines.clear();
            let tokens = self.drain_batch(blob, index, key, &mut src_lines, &mut tgt_lines)?;
            write_batch_record(writer, &src_lines, &tgt_lines)?;

            batches += 1;
            pairs += src_lines.len();
            if batches % PROGRESS_LOG_INTERVAL == 0 {
                info!("Created '{batches}' batches ('{pairs}' pairs) so far.");
            }
            debug!(key, size = src_lines.len(), tokens, "Packed batch");
        }
        Ok((batches, pairs))
    }

    /// Takes pairs from the front of bucket `key` into one batch.
    ///
    /// The first pair is always taken. Each further pair is taken only while
    /// the running total is below the budget and the pair (peeked from its
    /// record header) still fits. Returns the batch token count.
    fn drain_batch<'b>(
        &self,
        blob: &'b RawBlob,
        index: &mut BucketIndex,
        key: u64,
        src_lines: &mut Vec<&'b str>,
        tgt_lines: &mut Vec<&'b str>,
    ) -> Result<usize> {
        let mut tokens = 0;
        while let Some(offset) = index.front(key) {
            if !src_lines.is_empty() {
                let next = blob.header_at(offset)?.token_count();
                if tokens >= self.token_budget || tokens + next > self.token_budget {
                    break;
                }
            }
            index.pop_front(key);
            let record = blob.record_at(offset)?;
            tokens += record.header.token_count();
            src_lines.push(record.src);
            tgt_lines.push(record.tgt);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::RawBlobWriter;
    use crate::pair::{count_tokens, RawSentencePair};
    use tempfile::tempdir;

    const TEST_SEED: u64 = 7;

    fn raw(src: &str, tgt: &str, key: u64) -> RawSentencePair {
        RawSentencePair {
            src_text: src.into(),
            tgt_text: tgt.into(),
            src_token_count: count_tokens(src),
            tgt_token_count: count_tokens(tgt),
            is_truncated: false,
            bucket_key: key,
        }
    }

    fn built(dir: &Path, pairs: &[RawSentencePair]) -> Result<BuiltIndex> {
        let mut writer = RawBlobWriter::create_in(dir)?;
        let mut index = BucketIndex::new();
        for pair in pairs {
            let offset = writer.append(pair)?;
            index.insert(pair.bucket_key, offset);
        }
        Ok(BuiltIndex {
            blob: writer.finish()?,
            index,
            stats: IngestStats::default(),
        })
    }

    fn collect(epoch: MaterializedEpoch) -> Result<Vec<Vec<String>>> {
        epoch
            .into_stream()?
            .map(|batch| batch.map(|b| b.src_lines().map(str::to_string).collect()))
            .collect()
    }

    #[test]
    fn packs_two_then_one_under_budget() -> Result<()> {
        let dir = tempdir()?;
        let ten = "w ".repeat(5);
        let pairs: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|tag| raw(&format!("{tag} {ten}"), "x x x x", 1))
            .collect();
        assert_eq!(pairs[0].token_count(), 10);

        let mut sampler = BucketSampler::new(TEST_SEED, 0);
        let epoch = BatchPacker::new(25)?.pack(built(dir.path(), &pairs)?, &mut sampler, dir.path())?;
        assert_eq!(epoch.batches(), 2);
        assert_eq!(epoch.pairs(), 3);

        let batches = collect(epoch)?;
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);
        // FIFO within the bucket
        assert!(batches[0][0].starts_with('a'));
        assert!(batches[1][0].starts_with('c'));
        Ok(())
    }

    #[test]
    fn over_budget_pair_forms_its_own_batch() -> Result<()> {
        let dir = tempdir()?;
        let pairs = vec![
            raw("a b c d e f", "x y z", 1),
            raw("g", "h", 1),
            raw("i", "j", 1),
        ];
        let mut sampler = BucketSampler::new(TEST_SEED, 0);
        let epoch = BatchPacker::new(4)?.pack(built(dir.path(), &pairs)?, &mut sampler, dir.path())?;

        let batches = collect(epoch)?;
        assert_eq!(batches[0], vec!["a b c d e f"]);
        assert_eq!(batches[1], vec!["g", "i"]);
        Ok(())
    }

    #[test]
    fn batches_never_mix_buckets() -> Result<()> {
        let dir = tempdir()?;
        let pairs: Vec<_> = (0..40)
            .map(|i| raw(&format!("k{} s{i}", i % 3), "t", (i % 3) as u64))
            .collect();
        let mut sampler = BucketSampler::new(TEST_SEED, 1);
        let epoch = BatchPacker::new(9)?.pack(built(dir.path(), &pairs)?, &mut sampler, dir.path())?;

        let batches = collect(epoch)?;
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 40);
        for batch in &batches {
            let prefix = &batch[0][..2];
            assert!(batch.iter().all(|line| line.starts_with(prefix)));
            assert!(batch.len() * 3 <= 9);
        }
        Ok(())
    }

    #[test]
    fn removes_blob_and_keeps_only_epoch_file() -> Result<()> {
        let dir = tempdir()?;
        let built = built(dir.path(), &[raw("a", "b", 1)])?;
        let blob_path = built.blob.path().to_path_buf();

        let mut sampler = BucketSampler::new(TEST_SEED, 0);
        let epoch = BatchPacker::new(10)?.pack(built, &mut sampler, dir.path())?;
        assert!(!blob_path.exists());
        assert!(epoch.path().exists());
        assert!(epoch.path().to_string_lossy().ends_with(".sorted"));

        let epoch_path = epoch.path().to_path_buf();
        drop(epoch);
        assert!(!epoch_path.exists());
        Ok(())
    }

    #[test]
    fn rejects_zero_budget() {
        assert!(BatchPacker::new(0).is_err());
    }
}
