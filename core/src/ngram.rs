//! N-gram back-off language model reader.
//!
//! The on-disk "tree of contexts" from the reference format is represented
//! here, as in the teacher's own `ngram.rs`/`word_bigram.rs`, as a flat
//! `HashMap<ContextKey, ContextEntry>` rather than a literal pointer tree
//! (SPEC_FULL.md §4.5) — the idiomatic trade-off this crate's lineage
//! already makes.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::pos::{PosTag, ALL_TAGS};

/// Vocabulary tokens for the language model are morpheme ids.
pub type VocabId = u32;

/// Distinct from the morpheme store's `0x4B495749` magic.
const NGRAM_MAGIC: u32 = 0x4C474D4B;

const FLOOR_LOG_PROB: f32 = -20.0;

/// Right-hand continuations observed for one context, plus the back-off
/// weight applied when a queried token is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Sorted by `VocabId` so lookups can binary-search.
    next: Vec<(VocabId, f32)>,
    back_off: f32,
}

impl ContextEntry {
    fn lookup(&self, token: VocabId) -> Option<f32> {
        self.next
            .binary_search_by_key(&token, |&(t, _)| t)
            .ok()
            .map(|i| self.next[i].1)
    }
}

/// Context key: the sequence of vocabulary ids making up the conditioning
/// context, most recent last. Length is at most `order - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey(pub Vec<VocabId>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NGramModel {
    order: u32,
    unigram: HashMap<VocabId, f32>,
    contexts: HashMap<ContextKey, ContextEntry>,
}

impl NGramModel {
    pub fn new(order: u32) -> Self {
        NGramModel {
            order,
            unigram: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn insert_unigram(&mut self, token: VocabId, log_p: f32) {
        self.unigram.insert(token, log_p);
    }

    pub fn insert_context(&mut self, mut context: Vec<VocabId>, mut next: Vec<(VocabId, f32)>, back_off: f32) {
        next.sort_unstable_by_key(|&(t, _)| t);
        context.shrink_to_fit();
        self.contexts
            .insert(ContextKey(context), ContextEntry { next, back_off });
    }

    /// `log P(token | context)`, `context` ordered oldest-to-most-recent and
    /// truncated internally to at most `order - 1` entries.
    ///
    /// Walks from the longest available context down to the unigram,
    /// accumulating back-off weight at each miss, per SPEC_FULL.md §4.5.
    pub fn score(&self, context: &[VocabId], token: VocabId) -> f32 {
        let max_len = (self.order.saturating_sub(1)) as usize;
        let start = context.len().saturating_sub(max_len);
        let mut slice = &context[start..];
        let mut back_off_acc = 0.0f32;

        loop {
            if !slice.is_empty() {
                if let Some(entry) = self.contexts.get(&ContextKey(slice.to_vec())) {
                    if let Some(lp) = entry.lookup(token) {
                        return back_off_acc + lp;
                    }
                    back_off_acc += entry.back_off;
                }
                slice = &slice[1..];
                continue;
            }
            return back_off_acc + self.unigram.get(&token).copied().unwrap_or(FLOOR_LOG_PROB);
        }
    }

    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        use std::io::Write;
        writer.write_all(&NGRAM_MAGIC.to_le_bytes())?;
        bincode::serialize_into(&mut writer, self)?;
        Ok(())
    }

    pub fn load_bincode<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut magic_bytes = [0u8; 4];
        reader.read_exact(&mut magic_bytes)?;
        let magic = u32::from_le_bytes(magic_bytes);
        if magic != NGRAM_MAGIC {
            return Err(ModelError::BadMagic {
                what: "langMdl.bin",
                expected: NGRAM_MAGIC,
                found: magic,
            }
            .into());
        }
        let model: Self = bincode::deserialize_from(reader)?;
        Ok(model)
    }

    /// Tags whose unknown-word sentinel has a unigram entry, i.e. tags the
    /// loaded model actually saw during training. Used by the decoder's
    /// unknown-word fallback (SPEC_FULL.md §4.5).
    pub fn trained_tags(&self) -> HashSet<PosTag> {
        ALL_TAGS
            .iter()
            .copied()
            .filter(|tag| self.unigram.contains_key(&tag.sentinel_index()))
            .collect()
    }
}

/// Unknown-token vocabulary substitution: the POS sentinel for `tag`, or the
/// `NNP` sentinel if `tag` itself never occurred in the trained vocabulary.
pub fn unk_vocab_for(tag: PosTag, trained_tags: &std::collections::HashSet<PosTag>) -> VocabId {
    if trained_tags.contains(&tag) {
        tag.sentinel_index()
    } else {
        PosTag::Nnp.sentinel_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_bigram_hit_returns_its_logprob() {
        let mut m = NGramModel::new(2);
        m.insert_unigram(5, -3.0);
        m.insert_context(vec![1], vec![(5, -0.5)], -1.0);
        assert!((m.score(&[1], 5) - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn miss_backs_off_to_unigram() {
        let mut m = NGramModel::new(2);
        m.insert_unigram(9, -4.0);
        m.insert_context(vec![1], vec![(5, -0.5)], -1.5);
        let got = m.score(&[1], 9);
        assert!((got - (-1.5 + -4.0)).abs() < 1e-6);
    }

    #[test]
    fn empty_context_uses_unigram_directly() {
        let mut m = NGramModel::new(2);
        m.insert_unigram(3, -2.0);
        assert!((m.score(&[], 3) - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn context_longer_than_order_minus_one_is_truncated() {
        let mut m = NGramModel::new(2);
        m.insert_context(vec![2], vec![(7, -0.3)], -1.0);
        // order 2 => context length 1, so only the most recent token (2) matters.
        assert!((m.score(&[99, 2], 7) - (-0.3)).abs() < 1e-6);
    }

    #[test]
    fn unknown_token_falls_back_to_trained_tag_sentinel() {
        let mut trained = std::collections::HashSet::new();
        trained.insert(PosTag::Nng);
        assert_eq!(unk_vocab_for(PosTag::Nng, &trained), PosTag::Nng.sentinel_index());
        assert_eq!(unk_vocab_for(PosTag::Vv, &trained), PosTag::Nnp.sentinel_index());
    }

    #[test]
    fn trained_tags_reflects_which_sentinels_have_unigrams() {
        let mut m = NGramModel::new(2);
        m.insert_unigram(PosTag::Nng.sentinel_index(), -1.0);
        let trained = m.trained_tags();
        assert!(trained.contains(&PosTag::Nng));
        assert!(!trained.contains(&PosTag::Vv));
    }
}
