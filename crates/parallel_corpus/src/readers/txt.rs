use crate::error::CorpusError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// One aligned line pair with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePair {
    pub line: usize,
    pub src: String,
    pub tgt: String,
}

/// Reads a source file and a target file in lock-step, one line pair at a
/// time.
///
/// The stream ends cleanly when both files end together, or at the first line
/// that is blank on both sides. A file that ends while its counterpart still
/// has data yields `CorpusError::UnbalancedEof` and then nothing more, unless
/// that remaining line is blank.
///
/// # Example
/// ```ignore
/// let source = PairedTxtSource::new("train.en.snt", "train.de.snt");
/// for pair in source.stream()? {
///     let pair = pair?;
///     println!("{} ||| {}", pair.src, pair.tgt);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PairedTxtSource {
    src_path: PathBuf,
    tgt_path: PathBuf,
}

impl PairedTxtSource {
    pub fn new(src_path: impl Into<PathBuf>, tgt_path: impl Into<PathBuf>) -> Self {
        Self {
            src_path: src_path.into(),
            tgt_path: tgt_path.into(),
        }
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    pub fn tgt_path(&self) -> &Path {
        &self.tgt_path
    }

    /// Opens both files and returns an iterator over aligned line pairs.
    pub fn stream(&self) -> Result<PairedLines> {
        let src = File::open(&self.src_path)
            .with_context(|| format!("Failed to open source file: {}", self.src_path.display()))?;
        let tgt = File::open(&self.tgt_path)
            .with_context(|| format!("Failed to open target file: {}", self.tgt_path.display()))?;

        Ok(PairedLines {
            src: BufReader::new(src).lines(),
            tgt: BufReader::new(tgt).lines(),
            line: 0,
            done: false,
        })
    }
}

/// Iterator returned by [`PairedTxtSource::stream`].
pub struct PairedLines {
    src: Lines<BufReader<File>>,
    tgt: Lines<BufReader<File>>,
    line: usize,
    done: bool,
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

impl PairedLines {
    fn read_next(&mut self) -> Result<Option<LinePair>> {
        let line = self.line + 1;
        let src = self
            .src
            .next()
            .transpose()
            .with_context(|| format!("Error reading source line {line}"))?;
        let tgt = self
            .tgt
            .next()
            .transpose()
            .with_context(|| format!("Error reading target line {line}"))?;

        match (src.map(strip_cr), tgt.map(strip_cr)) {
            (None, None) => Ok(None),
            // A trailing blank line on the longer side still ends the pair.
            (Some(blank), None) | (None, Some(blank)) if blank.is_empty() => Ok(None),
            (Some(_), None) => Err(CorpusError::UnbalancedEof {
                line,
                ended: "target",
            }
            .into()),
            (None, Some(_)) => Err(CorpusError::UnbalancedEof {
                line,
                ended: "source",
            }
            .into()),
            (Some(src), Some(tgt)) => {
                if src.is_empty() && tgt.is_empty() {
                    return Ok(None);
                }
                self.line = line;
                Ok(Some(LinePair { line, src, tgt }))
            }
        }
    }
}

impl Iterator for PairedLines {
    type Item = Result<LinePair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(lines: &[&str]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_reads_aligned_lines() -> Result<()> {
        let src = write_lines(&["a b", "c\r"])?;
        let tgt = write_lines(&["x", "y z"])?;

        let pairs: Vec<_> = PairedTxtSource::new(src.path(), tgt.path())
            .stream()?
            .collect::<Result<_>>()?;
        assert_eq!(
            pairs,
            vec![
                LinePair {
                    line: 1,
                    src: "a b".into(),
                    tgt: "x".into()
                },
                LinePair {
                    line: 2,
                    src: "c".into(),
                    tgt: "y z".into()
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_blank_pair_terminates() -> Result<()> {
        let src = write_lines(&["a", "", "b"])?;
        let tgt = write_lines(&["x", "", "y"])?;
        let count = PairedTxtSource::new(src.path(), tgt.path())
            .stream()?
            .collect::<Result<Vec<_>>>()?
            .len();
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn test_trailing_blank_on_one_side_terminates() -> Result<()> {
        let src = write_lines(&["a b", ""])?;
        let tgt = write_lines(&["x"])?;
        let pairs = PairedTxtSource::new(src.path(), tgt.path())
            .stream()?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].src, "a b");

        let src = write_lines(&["a"])?;
        let tgt = write_lines(&["x", "\r"])?;
        let count = PairedTxtSource::new(src.path(), tgt.path())
            .stream()?
            .collect::<Result<Vec<_>>>()?
            .len();
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn test_one_sided_blank_is_a_pair() -> Result<()> {
        let src = write_lines(&["a", ""])?;
        let tgt = write_lines(&["x", "y"])?;
        let pairs = PairedTxtSource::new(src.path(), tgt.path())
            .stream()?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].src, "");
        Ok(())
    }

    #[test]
    fn test_unbalanced_eof_is_fatal() -> Result<()> {
        let src = write_lines(&["a", "b", "c"])?;
        let tgt = write_lines(&["x"])?;
        let mut stream = PairedTxtSource::new(src.path(), tgt.path()).stream()?;

        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        match err.downcast_ref::<CorpusError>() {
            Some(CorpusError::UnbalancedEof { line, ended }) => {
                assert_eq!(*line, 2);
                assert_eq!(*ended, "target");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(stream.next().is_none());
        Ok(())
    }
}
