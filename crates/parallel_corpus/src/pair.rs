//! src/pair.rs
//!
//! Sentence pair types shared by every stage of the pipeline.
//!
//! A line may carry several aligned sub-fields ("groups") separated by a tab,
//! e.g. a sentence and its factor annotations. Tokens are counted by
//! whitespace inside each group and summed over the line.

use crate::config::ShuffleMode;

/// Separator between groups inside one line.
pub const GROUP_SEPARATOR: char = '\t';

/// Splits a line into its tab-delimited groups.
pub fn split_groups(line: &str) -> Vec<&str> {
    line.split(GROUP_SEPARATOR).collect()
}

/// Total whitespace-delimited tokens over all groups of a line.
pub fn count_tokens(line: &str) -> usize {
    line.split(GROUP_SEPARATOR)
        .map(|group| group.split_whitespace().count())
        .sum()
}

/// Keeps the first `max_tokens` tokens of a line in reading order.
///
/// Group structure survives: every group is kept, tokens inside a group are
/// re-joined with a single space, and groups past the cut become empty.
pub fn truncate_line(line: &str, max_tokens: usize) -> String {
    let mut remaining = max_tokens;
    let groups: Vec<String> = line
        .split(GROUP_SEPARATOR)
        .map(|group| {
            let kept: Vec<&str> = group.split_whitespace().take(remaining).collect();
            remaining -= kept.len();
            kept.join(" ")
        })
        .collect();
    groups.join(&GROUP_SEPARATOR.to_string())
}

/// Maps a token count onto its length class: `ceil(tokens / width)`.
#[inline]
pub fn length_class(tokens: usize, width: usize) -> u64 {
    tokens.div_ceil(width.max(1)) as u64
}

/// Computes the bucket key of a pair under the given shuffle mode.
pub fn bucket_key(mode: ShuffleMode, src_tokens: usize, tgt_tokens: usize, width: usize) -> u64 {
    match mode {
        ShuffleMode::Random => length_class(src_tokens + tgt_tokens, width),
        ShuffleMode::NoPadding => length_class(src_tokens.max(tgt_tokens), width),
        ShuffleMode::NoPaddingInSrc => length_class(src_tokens, width),
    }
}

/// A sentence pair accepted (possibly after truncation) by the ingestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSentencePair {
    pub src_text: String,
    pub tgt_text: String,
    pub src_token_count: usize,
    pub tgt_token_count: usize,
    pub is_truncated: bool,
    pub bucket_key: u64,
}

impl RawSentencePair {
    /// Combined source + target tokens.
    pub fn token_count(&self) -> usize {
        self.src_token_count + self.tgt_token_count
    }
}

/// One aligned source/target line pair as handed to the training loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    pub src: String,
    pub tgt: String,
}

impl SentencePair {
    pub fn new(src: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            tgt: tgt.into(),
        }
    }

    pub fn src_groups(&self) -> Vec<&str> {
        split_groups(&self.src)
    }

    pub fn tgt_groups(&self) -> Vec<&str> {
        split_groups(&self.tgt)
    }

    pub fn src_token_count(&self) -> usize {
        count_tokens(&self.src)
    }

    pub fn tgt_token_count(&self) -> usize {
        count_tokens(&self.tgt)
    }

    pub fn token_count(&self) -> usize {
        self.src_token_count() + self.tgt_token_count()
    }
}

impl From<RawSentencePair> for SentencePair {
    fn from(raw: RawSentencePair) -> Self {
        Self {
            src: raw.src_text,
            tgt: raw.tgt_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tokens_across_groups() {
        assert_eq!(count_tokens("a b c"), 3);
        assert_eq!(count_tokens("a  b\tc d e"), 5);
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("\t"), 0);
    }

    #[test]
    fn truncation_keeps_group_count() {
        let line = "a b c\td e f";
        let cut = truncate_line(line, 4);
        assert_eq!(cut, "a b c\td");
        assert_eq!(count_tokens(&cut), 4);

        let cut = truncate_line(line, 2);
        assert_eq!(cut, "a b\t");
        assert_eq!(split_groups(&cut).len(), 2);
    }

    #[test]
    fn truncation_noop_when_short() {
        assert_eq!(truncate_line("x y", 5), "x y");
    }

    #[test]
    fn bucket_keys_follow_mode() {
        // width 10: 1..=10 -> class 1, 11..=20 -> class 2
        assert_eq!(bucket_key(ShuffleMode::Random, 6, 5, 10), 2);
        assert_eq!(bucket_key(ShuffleMode::NoPadding, 6, 5, 10), 1);
        assert_eq!(bucket_key(ShuffleMode::NoPaddingInSrc, 12, 1, 10), 2);
        assert_eq!(bucket_key(ShuffleMode::Random, 0, 0, 10), 0);
        assert_eq!(bucket_key(ShuffleMode::NoPadding, 3, 7, 1), 7);
    }

    #[test]
    fn sentence_pair_exposes_groups() {
        let pair = SentencePair::new("a b\tA B", "x\tX");
        assert_eq!(pair.src_groups(), vec!["a b", "A B"]);
        assert_eq!(pair.tgt_groups(), vec!["x", "X"]);
        assert_eq!(pair.token_count(), 6);
    }
}
