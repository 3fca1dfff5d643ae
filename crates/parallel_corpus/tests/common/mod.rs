#![allow(dead_code)]

use parallel_corpus::{BatchStream, SentencePair, SentencePairBatch};

use anyhow::Result;
use std::path::Path;

/// Installs a test subscriber so `RUST_LOG=debug cargo test` shows the
/// pipeline logs. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Writes `<key>.<src_lang>.snt` and `<key>.<tgt_lang>.snt` into `dir`.
pub fn write_corpus(
    dir: &Path,
    key: &str,
    src_lang: &str,
    tgt_lang: &str,
    pairs: &[(&str, &str)],
) -> Result<()> {
    let mut src = String::new();
    let mut tgt = String::new();
    for (s, t) in pairs {
        src.push_str(s);
        src.push('\n');
        tgt.push_str(t);
        tgt.push('\n');
    }
    std::fs::write(dir.join(format!("{key}.{src_lang}.snt")), src)?;
    std::fs::write(dir.join(format!("{key}.{tgt_lang}.snt")), tgt)?;
    Ok(())
}

/// Deterministic pairs of varying length: pair `i` has `i % 13 + 1` source
/// tokens and `i % 5 + 1` target tokens, and its first source token is a
/// unique id.
pub fn varied_pairs(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| {
            let mut src = vec![format!("id{i}")];
            src.extend((0..i % 13).map(|j| format!("s{j}")));
            let tgt: Vec<String> = (0..=i % 5).map(|j| format!("t{j}")).collect();
            (src.join(" "), tgt.join(" "))
        })
        .collect()
}

pub fn as_refs(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
    pairs.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect()
}

/// Drains a stream into plain pair vectors, one per batch.
pub fn collect_batches(stream: BatchStream) -> Result<Vec<Vec<SentencePair>>> {
    stream
        .map(|batch| batch.map(SentencePairBatch::into_pairs))
        .collect()
}

/// Number of entries directly inside `dir`.
pub fn count_files(dir: &Path) -> Result<usize> {
    Ok(std::fs::read_dir(dir)?.count())
}
