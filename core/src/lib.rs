//! haneul-core
//!
//! Core dictionary, trie, language model, decoder and skip-bigram trainer
//! for a Korean morphological analyzer: segments an input sentence into
//! morphemes, tags each with a part-of-speech label, and returns the
//! top-K highest-scoring analyses.
//!
//! Public API:
//! - `Model` — assembled analyzer: `build_from_raw`, `load`, `analyze`
//! - `MorphemeStore` — dictionary of forms and morphemes
//! - `NGramModel` — n-gram back-off language model reader
//! - `SkipBigramModel` / `SkipBigramTrainer` — skip-bigram correction model
//! - `Config` — runtime decoder/trainer knobs

pub mod config;
pub use config::Config;

pub mod error;
pub use error::ModelError;

pub mod hangul;

pub mod pos;
pub use pos::PosTag;

pub mod store;
pub use store::{FormId, MorphemeId, MorphemeStore};

pub mod trie;
pub use trie::Trie;

pub mod lattice;
pub use lattice::Lattice;

pub mod ngram;
pub use ngram::NGramModel;

pub mod skipbigram;
pub use skipbigram::SkipBigramModel;

pub mod trainer;
pub use trainer::{SkipBigramTrainer, TrainSentence};

pub mod corpus;

pub mod decoder;
pub use decoder::AnalyzedMorpheme;

pub mod model;
pub use model::Model;
