//! Batching behaviour of ParallelCorpus.
//!
//! Tests cover:
//! - Too-long pairs under Ignore and Truncation
//! - Every accepted pair is emitted exactly once
//! - Batches respect the token budget and never mix buckets
//! - Packing of equal-length pairs into [2, 1]

mod common;
use common::{as_refs, collect_batches, init_tracing, varied_pairs, write_corpus};

use parallel_corpus::{
    pair::bucket_key, CorpusConfig, ParallelCorpus, SentencePair, ShuffleMode,
    TooLongSequencePolicy,
};

use anyhow::Result;
use std::collections::HashMap;
use tempfile::tempdir;

fn key_of(pair: &SentencePair, mode: ShuffleMode, width: usize) -> u64 {
    bucket_key(mode, pair.src_token_count(), pair.tgt_token_count(), width)
}

#[test]
fn ignore_policy_drops_too_long_pair() -> Result<()> {
    init_tracing();
    let data = tempdir()?;
    let work = tempdir()?;
    write_corpus(
        data.path(),
        "train",
        "src",
        "tgt",
        &[("a b c", "x y"), ("d e f g h i", "z")],
    )?;
    let config = CorpusConfig::builder()
        .max_src_tokens(5)
        .token_budget(100)
        .shuffle_mode(ShuffleMode::Random)
        .work_dir(work.path())
        .seed(1)
        .build();
    let corpus = ParallelCorpus::new(data.path(), "src", "tgt", config)?;

    let epoch = corpus.prepare_epoch(0)?;
    assert_eq!(epoch.stats().src_too_long, 1);
    assert_eq!(epoch.stats().rejected, 1);
    assert_eq!(epoch.stats().accepted, 1);

    let batches = collect_batches(epoch.into_stream()?)?;
    let pairs: Vec<SentencePair> = batches.into_iter().flatten().collect();
    assert_eq!(pairs, vec![SentencePair::new("a b c", "x y")]);
    Ok(())
}

#[test]
fn truncation_policy_clips_and_keeps_pairs() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    write_corpus(
        data.path(),
        "train",
        "src",
        "tgt",
        &[
            ("a b c d e f g", "x"),
            ("a b\tc d e", "x y z w\tv"),
            ("short", "ok"),
        ],
    )?;
    let config = CorpusConfig::builder()
        .max_src_tokens(3)
        .max_tgt_tokens(4)
        .token_budget(1)
        .too_long_policy(TooLongSequencePolicy::Truncation)
        .work_dir(work.path())
        .build();
    let corpus = ParallelCorpus::new(data.path(), "src", "tgt", config)?;

    let epoch = corpus.prepare_epoch(0)?;
    assert_eq!(epoch.stats().accepted, 3);
    assert_eq!(epoch.stats().truncated, 2);
    assert_eq!(epoch.stats().src_too_long, 2);
    assert_eq!(epoch.stats().tgt_too_long, 1);

    let mut pairs: Vec<SentencePair> = collect_batches(epoch.into_stream()?)?
        .into_iter()
        .flatten()
        .collect();
    pairs.sort_by(|a, b| a.src.cmp(&b.src));

    assert_eq!(pairs.len(), 3);
    assert!(pairs.iter().all(|p| p.src_token_count() <= 3));
    assert!(pairs.iter().all(|p| p.tgt_token_count() <= 4));

    let grouped = pairs.iter().find(|p| p.src.contains('\t')).unwrap();
    assert_eq!(grouped.src_groups(), vec!["a b", "c"]);
    assert_eq!(grouped.tgt_groups(), vec!["x y z w", ""]);
    assert_eq!(grouped.src_groups().len(), grouped.tgt_groups().len());

    let long = pairs.iter().find(|p| p.src.starts_with("a b c")).unwrap();
    assert_eq!(long.src, "a b c");
    assert_eq!(long.tgt, "x");
    Ok(())
}

#[test]
fn equal_length_pairs_pack_two_then_one() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    // 6 source + 4 target tokens each
    write_corpus(
        data.path(),
        "train",
        "src",
        "tgt",
        &[
            ("a1 a2 a3 a4 a5 a6", "b1 b2 b3 b4"),
            ("c1 c2 c3 c4 c5 c6", "d1 d2 d3 d4"),
            ("e1 e2 e3 e4 e5 e6", "f1 f2 f3 f4"),
        ],
    )?;
    let config = CorpusConfig::builder()
        .token_budget(25)
        .work_dir(work.path())
        .seed(9)
        .build();
    let corpus = ParallelCorpus::new(data.path(), "src", "tgt", config)?;

    let batches = collect_batches(corpus.iter()?)?;
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 1]);
    assert_eq!(batches[0][0].src, "a1 a2 a3 a4 a5 a6");
    assert_eq!(batches[0][1].src, "c1 c2 c3 c4 c5 c6");
    assert_eq!(batches[1][0].src, "e1 e2 e3 e4 e5 e6");
    Ok(())
}

#[test]
fn every_pair_is_emitted_once_within_budget_and_bucket() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let pairs = varied_pairs(300);
    let (first, second) = pairs.split_at(120);
    write_corpus(data.path(), "a", "src", "tgt", &as_refs(first))?;
    write_corpus(data.path(), "b", "src", "tgt", &as_refs(second))?;

    for mode in [
        ShuffleMode::Random,
        ShuffleMode::NoPadding,
        ShuffleMode::NoPaddingInSrc,
    ] {
        let budget = 24;
        let width = 4;
        let config = CorpusConfig::builder()
            .max_src_tokens(64)
            .max_tgt_tokens(64)
            .token_budget(budget)
            .shuffle_mode(mode)
            .length_class_width(width)
            .work_dir(work.path())
            .seed(5)
            .build();
        let corpus = ParallelCorpus::new(data.path(), "src", "tgt", config)?;
        let batches = collect_batches(corpus.iter()?)?;

        let mut seen: HashMap<String, usize> = HashMap::new();
        for batch in &batches {
            assert!(!batch.is_empty());

            let key = key_of(&batch[0], mode, width);
            assert!(batch.iter().all(|p| key_of(p, mode, width) == key), "{mode}");

            if batch.len() > 1 {
                let total: usize = batch.iter().map(SentencePair::token_count).sum();
                let last = batch[batch.len() - 1].token_count();
                assert!(total <= budget, "{mode}: batch of {total} tokens");
                assert!(total - last < budget);
            }

            for pair in batch {
                *seen.entry(pair.src.clone()).or_default() += 1;
            }
        }

        assert_eq!(seen.len(), pairs.len(), "{mode}");
        assert!(seen.values().all(|&n| n == 1));
    }
    Ok(())
}

#[test]
fn pairs_keep_corpus_order_within_a_bucket() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let pairs: Vec<(String, String)> = (0..50)
        .map(|i| (format!("p{i:02} x"), "y".to_string()))
        .collect();
    write_corpus(data.path(), "train", "src", "tgt", &as_refs(&pairs))?;
    let config = CorpusConfig::builder()
        .token_budget(7)
        .work_dir(work.path())
        .build();
    let corpus = ParallelCorpus::new(data.path(), "src", "tgt", config)?;

    // Single bucket, so the stream replays the corpus in order.
    let order: Vec<String> = collect_batches(corpus.iter()?)?
        .into_iter()
        .flatten()
        .map(|p| p.src)
        .collect();
    let expected: Vec<String> = pairs.into_iter().map(|(s, _)| s).collect();
    assert_eq!(order, expected);
    Ok(())
}
