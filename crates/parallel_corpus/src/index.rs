//! src/index.rs
//!
//! Index Builder: writes every accepted pair to the raw blob and groups the
//! resulting offsets into length buckets.
//!
//! ```text
//!  file pairs ──→ PairIngestor ──→ RawBlobWriter.append() ──→ offset
//!                                                               │
//!                        BucketIndex[bucket_key].push_back(offset)
//! ```
//!
//! With `num_workers > 0` the file pairs are fanned out to a worker pool.
//! Workers only parse and classify lines; every accepted pair is sent back to
//! the calling thread, which owns the single blob writer and the index. Each
//! worker keeps its own `IngestStats`, merged once its file is done, so the
//! hot path shares no counters.
//!
//! The blob is always written in corpus order: file `i` is appended only
//! after file `i - 1` is complete. Pairs of a file that finishes ahead of its
//! turn are held in memory until then, so a parallel build yields the same
//! blob, index and (for a fixed seed) batch sequence as a sequential one.

use crate::blob::{RawBlob, RawBlobWriter};
use crate::config::CorpusConfig;
use crate::ingest::{IngestStats, Ingested, PairIngestor};
use crate::pair::RawSentencePair;
use crate::readers::{CorpusFiles, PairedTxtSource};
use crate::workers::WorkerPool;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Offsets of all pairs sharing one bucket key, in corpus order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthBucket {
    offsets: VecDeque<u64>,
    count: usize,
}

impl LengthBucket {
    fn push_back(&mut self, offset: u64) {
        self.offsets.push_back(offset);
        self.count += 1;
    }

    fn pop_front(&mut self) -> Option<u64> {
        let offset = self.offsets.pop_front()?;
        self.count -= 1;
        debug_assert_eq!(self.count, self.offsets.len());
        Some(offset)
    }

    pub fn front(&self) -> Option<u64> {
        self.offsets.front().copied()
    }

    /// Remaining pairs.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.offsets.iter().copied()
    }
}

/// Bucket key → `LengthBucket`, iterated in ascending key order.
///
/// Buckets are created on the first offset with a new key and removed as soon
/// as their last offset is taken, so an empty index means every pair has been
/// consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketIndex {
    buckets: BTreeMap<u64, LengthBucket>,
    total: usize,
}

impl BucketIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: u64, offset: u64) {
        self.buckets.entry(key).or_default().push_back(offset);
        self.total += 1;
    }

    /// Takes the oldest offset of bucket `key`, deleting the bucket once it
    /// is drained.
    pub fn pop_front(&mut self, key: u64) -> Option<u64> {
        let bucket = self.buckets.get_mut(&key)?;
        let offset = bucket.pop_front()?;
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        self.total -= 1;
        Some(offset)
    }

    /// Peeks the oldest offset of bucket `key`.
    pub fn front(&self, key: u64) -> Option<u64> {
        self.buckets.get(&key).and_then(LengthBucket::front)
    }

    pub fn bucket(&self, key: u64) -> Option<&LengthBucket> {
        self.buckets.get(&key)
    }

    /// `(key, remaining)` for every live bucket in ascending key order.
    pub fn counts(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.buckets.iter().map(|(&key, bucket)| (key, bucket.count()))
    }

    /// Remaining pairs over all buckets.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Result of a successful build.
pub struct BuiltIndex {
    pub blob: RawBlob,
    pub index: BucketIndex,
    pub stats: IngestStats,
}

/// Builds the raw blob and bucket index for one epoch.
pub struct IndexBuilder<'a> {
    config: &'a CorpusConfig,
    ingestor: PairIngestor,
}

/// Messages from ingestion workers to the writer thread.
/// `file` is the position of the file pair in `CorpusFiles::pairs()`.
enum WorkerMessage {
    Pair { file: usize, raw: RawSentencePair },
    Done { file: usize, stats: IngestStats },
    Failed(anyhow::Error),
}

const PAIR_CHANNEL_CAPACITY: usize = 4096;

fn describe(source: &PairedTxtSource) -> String {
    format!(
        "'{}' / '{}'",
        source.src_path().display(),
        source.tgt_path().display()
    )
}

/// Streams one file pair through the ingestor, handing accepted pairs to
/// `accept`. Returns `Ok(false)` if `accept` asked to stop early.
fn ingest_file_pair(
    ingestor: &PairIngestor,
    source: &PairedTxtSource,
    stats: &mut IngestStats,
    mut accept: impl FnMut(RawSentencePair) -> Result<bool>,
) -> Result<bool> {
    debug!(files = %describe(source), "Ingesting file pair");
    for line_pair in source.stream()? {
        let line_pair = line_pair.with_context(|| format!("While reading {}", describe(source)))?;
        let ingested = ingestor
            .ingest(line_pair.line, &line_pair.src, &line_pair.tgt, stats)
            .with_context(|| format!("While reading {}", describe(source)))?;
        if let Ingested::Accepted(raw) = ingested {
            if !accept(raw)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn ingest_worker(
    ingestor: PairIngestor,
    tasks: Receiver<(usize, PairedTxtSource)>,
    output: Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
) {
    for (file, source) in tasks {
        let mut stats = IngestStats::default();
        let result = ingest_file_pair(&ingestor, &source, &mut stats, |raw| {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(false);
            }
            Ok(output.send(WorkerMessage::Pair { file, raw }).is_ok())
        });
        let message = match result {
            Ok(true) => WorkerMessage::Done { file, stats },
            Ok(false) => return,
            Err(e) => WorkerMessage::Failed(e),
        };
        if output.send(message).is_err() {
            return;
        }
    }
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: &'a CorpusConfig) -> Self {
        Self {
            config,
            ingestor: PairIngestor::new(config),
        }
    }

    /// Ingests every file pair and returns the finished blob and index.
    ///
    /// Any fatal ingestion error aborts the build; the partial blob is
    /// deleted when the writer is dropped.
    pub fn build(&self, files: &CorpusFiles) -> Result<BuiltIndex> {
        info!(
            files = files.len(),
            workers = self.config.num_workers,
            "Start to build index for data set"
        );

        let mut writer = RawBlobWriter::create_in(&self.config.work_dir())?;
        let mut index = BucketIndex::new();

        let stats = if self.config.num_workers == 0 || files.len() == 1 {
            self.build_sequential(files, &mut writer, &mut index)?
        } else {
            self.build_parallel(files, &mut writer, &mut index)?
        };

        let blob = writer.finish()?;
        debug_assert_eq!(blob.len(), index.total());
        info!(
            pairs = index.total(),
            buckets = index.len(),
            blob = %blob.path().display(),
            "Finished building index for data set"
        );

        Ok(BuiltIndex { blob, index, stats })
    }

    /// Ingests the files with the calling thread only.
    fn build_sequential(
        &self,
        files: &CorpusFiles,
        writer: &mut RawBlobWriter,
        index: &mut BucketIndex,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        for source in files.pairs() {
            ingest_file_pair(&self.ingestor, source, &mut stats, |raw| {
                append(writer, index, &raw)?;
                Ok(true)
            })?;
        }
        Ok(stats)
    }

    /// Fans file pairs out to workers; this thread is the only blob writer
    /// and appends files strictly in corpus order.
    fn build_parallel(
        &self,
        files: &CorpusFiles,
        writer: &mut RawBlobWriter,
        index: &mut BucketIndex,
    ) -> Result<IngestStats> {
        let num_workers = self.config.num_workers.min(files.len());
        let ingestor = self.ingestor.clone();
        let mut pool = WorkerPool::new(
            "ingest-worker",
            num_workers,
            files.len(),
            PAIR_CHANNEL_CAPACITY,
            move |tasks, output, shutdown| {
                ingest_worker(ingestor.clone(), tasks, output, shutdown)
            },
        )?;

        // The task buffer holds every file pair, so this never blocks.
        for (file, source) in files.pairs().iter().enumerate() {
            pool.submit((file, source.clone()))?;
        }
        pool.close_tasks();

        let mut merge = OrderedMerge::new(files.len());
        let mut stats = IngestStats::default();
        while !merge.is_complete() {
            let message = pool
                .recv()
                .map_err(|_| anyhow!("Ingestion workers exited before finishing all files"))?;
            match message {
                WorkerMessage::Pair { file, raw } => {
                    if let Some(raw) = merge.hold(file, raw) {
                        append(writer, index, &raw)?;
                    }
                }
                WorkerMessage::Done { file, stats: partial } => {
                    stats.merge(&partial);
                    for raw in merge.finish(file) {
                        append(writer, index, &raw)?;
                    }
                }
                WorkerMessage::Failed(e) => return Err(e),
            }
        }
        Ok(stats)
    }
}

fn append(
    writer: &mut RawBlobWriter,
    index: &mut BucketIndex,
    raw: &RawSentencePair,
) -> Result<()> {
    let offset = writer.append(raw)?;
    index.insert(raw.bucket_key, offset);
    Ok(())
}

/// Restores corpus order over per-file streams arriving out of order.
///
/// Pairs of the file currently being written pass straight through; pairs of
/// later files are held until every earlier file is done.
struct OrderedMerge {
    current: usize,
    done: Vec<bool>,
    held: Vec<Vec<RawSentencePair>>,
}

impl OrderedMerge {
    fn new(num_files: usize) -> Self {
        Self {
            current: 0,
            done: vec![false; num_files],
            held: (0..num_files).map(|_| Vec::new()).collect(),
        }
    }

    fn is_complete(&self) -> bool {
        self.current == self.done.len()
    }

    /// Returns the pair if it can be written now, otherwise keeps it.
    fn hold(&mut self, file: usize, raw: RawSentencePair) -> Option<RawSentencePair> {
        if file == self.current {
            Some(raw)
        } else {
            self.held[file].push(raw);
            None
        }
    }

    /// Marks `file` done and returns the held pairs that became writable, in
    /// corpus order.
    fn finish(&mut self, file: usize) -> Vec<RawSentencePair> {
        self.done[file] = true;
        let mut ready = Vec::new();
        while !self.is_complete() && self.done[self.current] {
            self.current += 1;
            if !self.is_complete() {
                ready.append(&mut self.held[self.current]);
            }
        }
        ready
    }
}
