use crate::error::CorpusError;
use crate::readers::txt::PairedTxtSource;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The set of `<key>.<src>.snt` / `<key>.<tgt>.snt` file pairs found in one
/// corpus directory.
///
/// Pairs are ordered by key. Suffixes are matched ASCII case-insensitively.
///
/// # Example
/// ```ignore
/// // data/
/// //   news.en.snt  news.de.snt
/// //   web.en.snt   web.de.snt
/// let files = CorpusFiles::discover("data", "en", "de")?;
/// assert_eq!(files.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CorpusFiles {
    dir: PathBuf,
    pairs: Vec<PairedTxtSource>,
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (key, tail) = name.split_at(split);
    (!key.is_empty() && tail.eq_ignore_ascii_case(suffix)).then_some(key)
}

impl CorpusFiles {
    /// Scans the top level of `dir` and pairs files by key.
    ///
    /// # Errors
    /// - `CorpusError::InvalidConfig` if both languages name the same suffix.
    /// - `CorpusError::MissingCounterpart` if a key has only one side.
    /// - `CorpusError::EmptyCorpus` if no pair is found.
    pub fn discover(dir: impl AsRef<Path>, src_lang: &str, tgt_lang: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let src_suffix = format!(".{src_lang}.snt");
        let tgt_suffix = format!(".{tgt_lang}.snt");
        if src_suffix.eq_ignore_ascii_case(&tgt_suffix) {
            return Err(CorpusError::InvalidConfig(format!(
                "source and target languages must differ, but both are '{src_lang}'"
            ))
            .into());
        }

        let mut src_files: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut tgt_files: BTreeMap<String, PathBuf> = BTreeMap::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read corpus directory: {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list corpus directory: {}", dir.display()))?
                .path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if let Some(key) = strip_suffix_ignore_case(name, &src_suffix) {
                debug!(file = %path.display(), key, "source file");
                src_files.insert(key.to_string(), path.clone());
            }
            if let Some(key) = strip_suffix_ignore_case(name, &tgt_suffix) {
                debug!(file = %path.display(), key, "target file");
                tgt_files.insert(key.to_string(), path.clone());
            }
        }

        for (key, path) in &tgt_files {
            if !src_files.contains_key(key) {
                return Err(CorpusError::MissingCounterpart {
                    path: path.clone(),
                    expected_suffix: src_suffix,
                }
                .into());
            }
        }

        let mut pairs = Vec::with_capacity(src_files.len());
        for (key, src_path) in src_files {
            let tgt_path = tgt_files.remove(&key).ok_or_else(|| CorpusError::MissingCounterpart {
                path: src_path.clone(),
                expected_suffix: tgt_suffix.clone(),
            })?;
            pairs.push(PairedTxtSource::new(src_path, tgt_path));
        }

        if pairs.is_empty() {
            return Err(CorpusError::EmptyCorpus {
                dir: dir.to_path_buf(),
                src_suffix,
                tgt_suffix,
            }
            .into());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            pairs,
        })
    }

    /// Builds the set from explicit file pairs, skipping discovery.
    pub fn from_pairs(pairs: Vec<PairedTxtSource>) -> Result<Self> {
        anyhow::ensure!(
            !pairs.is_empty(),
            CorpusError::InvalidConfig("at least one file pair is required".into())
        );
        Ok(Self {
            dir: PathBuf::new(),
            pairs,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pairs(&self) -> &[PairedTxtSource] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
