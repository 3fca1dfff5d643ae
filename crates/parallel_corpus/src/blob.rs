//! src/blob.rs
//!
//! The raw blob: a temporary file holding every accepted sentence pair, each
//! addressable by the byte offset at which its record starts.
//!
//! # Record layout (little endian)
//! ```text
//! [u32 src_tokens][u32 tgt_tokens][u32 src_len][src utf-8][u32 tgt_len][tgt utf-8]
//! ```
//! Token counts sit in the fixed-size header so the packer can check whether
//! a pair still fits the batch budget without decoding its text.
//!
//! The file is owned through a `tempfile::TempPath`, so it is removed when
//! the `RawBlob` (or the writer, on failure) is dropped.

use crate::codec::{to_u32, write_str, write_u32, Cursor};
use crate::pair::RawSentencePair;
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::TempPath;

/// Appends raw pair records to a fresh temporary file.
///
/// There is a single append cursor: the offset returned by [`append`](Self::append)
/// is the file position before the record was written.
pub struct RawBlobWriter {
    writer: BufWriter<File>,
    path: TempPath,
    position: u64,
    records: usize,
}

impl RawBlobWriter {
    /// Creates an empty blob file inside `dir`.
    pub fn create_in(dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("corpus-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create raw blob in {}", dir.display()))?;
        let (file, path) = file.into_parts();
        Ok(Self {
            writer: BufWriter::with_capacity(1 << 20, file),
            path,
            position: 0,
            records: 0,
        })
    }

    /// Writes one pair and returns the offset its record starts at.
    pub fn append(&mut self, pair: &RawSentencePair) -> Result<u64> {
        let offset = self.position;
        let mut written = 8;
        write_u32(&mut self.writer, to_u32(pair.src_token_count, "source token count")?)?;
        write_u32(&mut self.writer, to_u32(pair.tgt_token_count, "target token count")?)?;
        written += write_str(&mut self.writer, &pair.src_text)?;
        written += write_str(&mut self.writer, &pair.tgt_text)?;
        self.position += written;
        self.records += 1;
        Ok(offset)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the writer and maps the finished file for random access.
    pub fn finish(self) -> Result<RawBlob> {
        let Self {
            writer,
            path,
            position,
            records,
        } = self;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to flush raw blob {}", path.display()))?;
        drop(file);
        RawBlob::open(path, position, records)
    }
}

/// Header of one raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub src_tokens: usize,
    pub tgt_tokens: usize,
}

impl RecordHeader {
    pub fn token_count(&self) -> usize {
        self.src_tokens + self.tgt_tokens
    }
}

/// One decoded raw record, borrowing its text from the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub header: RecordHeader,
    pub src: &'a str,
    pub tgt: &'a str,
}

/// A finished, read-only raw blob.
pub struct RawBlob {
    mmap: Option<Mmap>,
    path: TempPath,
    records: usize,
}

impl RawBlob {
    fn open(path: TempPath, len: u64, records: usize) -> Result<Self> {
        let mmap = if len == 0 {
            None
        } else {
            let file = File::open(&path)
                .with_context(|| format!("Failed to reopen raw blob {}", path.display()))?;
            // SAFETY: the file is private to this pipeline, was fully written
            // and flushed above, and nothing writes to it while mapped.
            Some(unsafe { Mmap::map(&file) }
                .with_context(|| format!("Failed to map raw blob {}", path.display()))?)
        };
        Ok(Self {
            mmap,
            path,
            records,
        })
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Reads only the token counts of the record at `offset`.
    pub fn header_at(&self, offset: u64) -> Result<RecordHeader> {
        let mut cursor = Cursor::new(self.bytes(), offset as usize);
        let src_tokens = cursor.read_u32()? as usize;
        let tgt_tokens = cursor.read_u32()? as usize;
        Ok(RecordHeader {
            src_tokens,
            tgt_tokens,
        })
    }

    /// Decodes the full record at `offset`.
    pub fn record_at(&self, offset: u64) -> Result<RawRecord<'_>> {
        let mut cursor = Cursor::new(self.bytes(), offset as usize);
        let header = RecordHeader {
            src_tokens: cursor.read_u32()? as usize,
            tgt_tokens: cursor.read_u32()? as usize,
        };
        let src = cursor.read_str()?;
        let tgt = cursor.read_str()?;
        Ok(RawRecord { header, src, tgt })
    }

    /// Unmaps and deletes the file, reporting any removal failure.
    pub fn close(self) -> Result<()> {
        let Self { mmap, path, .. } = self;
        drop(mmap);
        let display = path.display().to_string();
        path.close()
            .with_context(|| format!("Failed to delete raw blob {display}"))
    }
}
