pub mod corpus_files;
pub mod txt;

pub use corpus_files::CorpusFiles;
pub use txt::{LinePair, PairedLines, PairedTxtSource};
