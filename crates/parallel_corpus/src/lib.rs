pub mod batch;
pub mod blob;
mod codec;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod ingest;
pub mod packer;
pub mod pair;
pub mod readers;
pub mod sampler;
pub mod stream;
mod workers;

pub use batch::SentencePairBatch;
pub use config::{CorpusConfig, CorpusConfigBuilder, ShuffleMode, TooLongSequencePolicy};
pub use corpus::{ParallelCorpus, TokenFreqs};
pub use error::CorpusError;
pub use ingest::IngestStats;
pub use packer::MaterializedEpoch;
pub use pair::SentencePair;
pub use stream::BatchStream;
