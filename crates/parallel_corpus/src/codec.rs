//! Little-endian primitives shared by the raw blob and the materialized
//! epoch file.
//!
//! Writers go through `std::io::Write`; readers decode straight from a
//! memory-mapped byte slice with a moving cursor.

use crate::error::CorpusError;
use anyhow::{Context, Result};
use std::io::Write;

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub(crate) fn write_i32<W: Write>(w: &mut W, value: i32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes `[u32 byte_len][utf-8 bytes]`. Returns the number of bytes written.
pub(crate) fn write_str<W: Write>(w: &mut W, s: &str) -> Result<u64> {
    let len = u32::try_from(s.len())
        .with_context(|| format!("string of {} bytes does not fit a record", s.len()))?;
    write_u32(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(4 + s.len() as u64)
}

pub(crate) fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("{what} {value} does not fit in u32"))
}

/// Read cursor over a byte slice.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CorpusError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| CorpusError::CorruptRecord {
                offset: self.pos,
                reason: format!(
                    "needed {n} bytes but only {} remain",
                    self.buf.len().saturating_sub(self.pos)
                ),
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CorpusError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, CorpusError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_str(&mut self) -> Result<&'a str, CorpusError> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|e| CorpusError::CorruptRecord {
            offset: start,
            reason: format!("invalid utf-8: {e}"),
        })
    }
}
