//! Public facade: assembles the store, language model and decoder behind
//! `build_from_raw`/`load`/`analyze` (SPEC_FULL.md §6).

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::decoder::{self, AnalyzedMorpheme};
use crate::error::ModelError;
use crate::lattice;
use crate::ngram::NGramModel;
use crate::pos::PosTag;
use crate::skipbigram::SkipBigramModel;
use crate::store::MorphemeStore;
use crate::{corpus, hangul};

const MORPHEME_STORE_MAGIC: u32 = 0x4B495749;

/// A fully assembled analyzer: immutable and `Arc`-shareable once `prepare`
/// has run, mirroring the `Arc<Lexicon>`/`Arc<WordBigram>` sharing pattern
/// this crate's lineage uses post-load.
pub struct Model {
    store: MorphemeStore,
    lm: Arc<NGramModel>,
    skip_bigram: Option<Arc<SkipBigramModel>>,
    config: Config,
}

impl Model {
    /// Build a model from a directory of raw text sources: `dict.txt`
    /// (morpheme dictionary lines), `combined.txt` (combined entries,
    /// optional), `corpus.txt` (training sentences, optional — only needed
    /// if the caller intends to train a skip-bigram model afterward).
    pub fn build_from_raw(model_dir: impl AsRef<Path>, config: Config) -> anyhow::Result<Self> {
        let dir = model_dir.as_ref();
        let mut store = MorphemeStore::new();

        let dict_text = std::fs::read_to_string(dir.join("dict.txt"))?;
        corpus::load_dictionary(&mut store, &dict_text, config.condition_threshold, config.weight_cutoff);

        let combined_path = dir.join("combined.txt");
        if combined_path.exists() {
            let combined_text = std::fs::read_to_string(&combined_path)?;
            let mut discarded = 0usize;
            for line in combined_text.lines() {
                if line.trim().is_empty() || line.starts_with('#') {
                    continue;
                }
                if corpus::load_combined_entry(&mut store, line).is_none() {
                    discarded += 1;
                }
            }
            if discarded > 0 {
                tracing::warn!(count = discarded, "discarded malformed combined-entry lines");
            }
        }

        store.solidify()?;
        tracing::info!(forms = store.forms().len(), morphemes = store.morphemes().len(), "built morpheme store");

        let lm = Arc::new(NGramModel::new(3));

        Ok(Model { store, lm, skip_bigram: None, config })
    }

    /// Load a previously built model from binary artifacts in `model_dir`.
    pub fn load(model_dir: impl AsRef<Path>, config: Config) -> anyhow::Result<Self> {
        let dir = model_dir.as_ref();
        let store = load_store(dir.join("morpheme.bin"))?;
        let lm = Arc::new(NGramModel::load_bincode(dir.join("langMdl.bin"))?);
        let skip_bigram = dir
            .join("skipBigram.bin")
            .exists()
            .then(|| SkipBigramModel::load(dir.join("skipBigram.bin")))
            .transpose()?
            .map(Arc::new);

        Ok(Model { store, lm, skip_bigram, config })
    }

    pub fn save(&self, model_dir: impl AsRef<Path>) -> anyhow::Result<()> {
        let dir = model_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        save_store(&self.store, dir.join("morpheme.bin"))?;
        self.lm.save_bincode(dir.join("langMdl.bin"))?;
        if let Some(sb) = &self.skip_bigram {
            sb.save(dir.join("skipBigram.bin"))?;
        }
        Ok(())
    }

    /// Add a single unconditioned user word. Valid before `prepare`; callers
    /// must call `prepare` again afterward to rebuild the trie.
    pub fn add_user_word(&mut self, surface: &str, tag: PosTag) -> anyhow::Result<()> {
        let key = hangul::split_jamo(surface)?;
        self.store.add_user_word(&key, tag);
        Ok(())
    }

    /// Add a combined user rule: `surface` decomposes into `morphs` at
    /// decode time.
    pub fn add_user_rule(&mut self, surface: &str, morphs: &[(&str, PosTag)]) -> anyhow::Result<()> {
        let key = hangul::split_jamo(surface)?;
        let mut encoded = Vec::with_capacity(morphs.len());
        for (sub_surface, tag) in morphs {
            encoded.push((hangul::split_jamo(sub_surface)?, *tag));
        }
        self.store.add_user_rule(&key, &encoded);
        Ok(())
    }

    /// Rebuild the trie and validate invariants if not already solidified,
    /// or if user words/rules were added since the last `prepare`.
    pub fn prepare(&mut self) -> Result<(), ModelError> {
        self.store.solidify()
    }

    /// Analyze `text` (a Hangul-only sentence; callers pre-normalize
    /// whitespace and punctuation), returning up to `top_k` scored analyses,
    /// best first.
    pub fn analyze(&self, text: &str, top_k: usize) -> Vec<(Vec<AnalyzedMorpheme>, f32)> {
        let jamo = match hangul::split_jamo(text) {
            Ok(j) => j,
            Err(_) => Vec::new(),
        };
        let trie = match self.store.trie() {
            Some(t) => t,
            None => return if top_k == 0 { Vec::new() } else { vec![(Vec::new(), 0.0)] },
        };
        let lat = lattice::split(trie, &jamo);
        decoder::decode(
            &lat,
            &self.store,
            &self.lm,
            self.skip_bigram.as_deref(),
            &self.config,
            top_k,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &MorphemeStore {
        &self.store
    }
}

fn save_store(store: &MorphemeStore, path: impl AsRef<Path>) -> anyhow::Result<()> {
    use std::io::Write;
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);
    w.write_all(&MORPHEME_STORE_MAGIC.to_le_bytes())?;
    bincode::serialize_into(&mut w, &SerializedStore::from(store))?;
    Ok(())
}

fn load_store(path: impl AsRef<Path>) -> anyhow::Result<MorphemeStore> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut magic_bytes = [0u8; 4];
    file.read_exact(&mut magic_bytes)?;
    let magic = u32::from_le_bytes(magic_bytes);
    if magic != MORPHEME_STORE_MAGIC {
        return Err(ModelError::BadMagic {
            what: "morpheme.bin",
            expected: MORPHEME_STORE_MAGIC,
            found: magic,
        }
        .into());
    }
    let serialized: SerializedStore = bincode::deserialize_from(file)?;
    serialized.into_store()
}

/// Bincode-friendly mirror of `MorphemeStore`'s persisted fields; the trie
/// and interning map are build/inference-only and rebuilt by `solidify`
/// after deserialization rather than being serialized themselves.
#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedStore {
    forms: Vec<SerializedForm>,
    morphemes: Vec<SerializedMorpheme>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedForm {
    key: Vec<u8>,
    candidates: Vec<u32>,
    suffix: Vec<u8>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedMorpheme {
    tag: PosTag,
    vowel: crate::pos::VowelCondition,
    polarity: crate::pos::PolarityCondition,
    combine_socket: u8,
    chunks: Option<Vec<u32>>,
    combined_offset: Option<i32>,
    form_ref: u32,
}

impl From<&MorphemeStore> for SerializedStore {
    fn from(store: &MorphemeStore) -> Self {
        let forms = store
            .forms()
            .iter()
            .map(|f| SerializedForm {
                key: f.key.clone(),
                candidates: f.candidates.iter().map(|c| c.0).collect(),
                suffix: f.suffix.iter().copied().collect(),
            })
            .collect();
        let morphemes = store
            .morphemes()
            .iter()
            .map(|m| SerializedMorpheme {
                tag: m.tag,
                vowel: m.vowel,
                polarity: m.polarity,
                combine_socket: m.combine_socket,
                chunks: m.chunks.as_ref().map(|c| c.iter().map(|id| id.0).collect()),
                combined_offset: m.combined_offset,
                form_ref: m.form_ref.0,
            })
            .collect();
        SerializedStore { forms, morphemes }
    }
}

impl SerializedStore {
    fn into_store(self) -> anyhow::Result<MorphemeStore> {
        let mut store = MorphemeStore::from_parts(
            self.forms
                .into_iter()
                .map(|f| crate::store::Form {
                    key: f.key,
                    candidates: f.candidates.into_iter().map(crate::store::MorphemeId).collect(),
                    suffix: f.suffix.into_iter().collect(),
                })
                .collect(),
            self.morphemes
                .into_iter()
                .map(|m| crate::store::Morpheme {
                    tag: m.tag,
                    vowel: m.vowel,
                    polarity: m.polarity,
                    combine_socket: m.combine_socket,
                    chunks: m.chunks.map(|c| c.into_iter().map(crate::store::MorphemeId).collect()),
                    combined_offset: m.combined_offset,
                    form_ref: crate::store::FormId(m.form_ref),
                })
                .collect(),
        );
        store.solidify()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn analyze_on_unsolidified_store_returns_empty_result() {
        let model = Model {
            store: MorphemeStore::new(),
            lm: Arc::new(NGramModel::new(2)),
            skip_bigram: None,
            config: Config::default(),
        };
        let results = model.analyze("가", 3);
        assert_eq!(results, vec![(Vec::new(), 0.0)]);
    }

    #[test]
    fn build_from_raw_reads_dict_and_solidifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("dict.txt")).unwrap();
        writeln!(f, "가\tNNG\t100\t_\t0.9\t0.1\t0.1\t0.5").unwrap();
        let model = Model::build_from_raw(dir.path(), Config::default()).unwrap();
        assert!(model.store.is_solidified());
        assert!(model.store.forms().len() > 2);
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("morpheme.bin"), [0u8, 0, 0, 0]).unwrap();
        let err = load_store(dir.path().join("morpheme.bin"));
        assert!(err.is_err());
    }
}
