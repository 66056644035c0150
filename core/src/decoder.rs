//! Top-K beam decoder over the candidate lattice (SPEC_FULL.md §4.4).

use crate::config::Config;
use crate::hangul;
use crate::lattice::{EdgeKind, Lattice};
use crate::ngram::NGramModel;
use crate::pos::{PolarityCondition, PosTag, VowelCondition};
use crate::skipbigram::SkipBigramModel;
use crate::store::{MorphemeId, MorphemeStore, EOS};

/// One morpheme in a reconstructed analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedMorpheme {
    pub morpheme: MorphemeId,
    pub tag: PosTag,
    pub surface_start: u32,
    pub surface_end: u32,
}

#[derive(Clone)]
struct Hypothesis {
    /// Trailing LM context, most recent last, length = order - 1.
    context: Vec<u32>,
    score: f32,
    positive_run: bool,
    last_jamo: Option<u8>,
    last_socket: u8,
    emitted: Vec<AnalyzedMorpheme>,
}

/// Beam of hypotheses ending at one lattice position, ordered by score
/// descending, pruned to `top_k` with exact-duplicate-context collapsing.
struct Beam {
    hyps: Vec<Hypothesis>,
    top_k: usize,
}

impl Beam {
    fn new(top_k: usize) -> Self {
        Beam { hyps: Vec::new(), top_k }
    }

    fn push(&mut self, hyp: Hypothesis) {
        if let Some(existing) = self.hyps.iter_mut().find(|h| h.context == hyp.context) {
            if hyp.score > existing.score {
                *existing = hyp;
            }
            return;
        }
        self.hyps.push(hyp);
    }

    fn finalize(&mut self) {
        self.hyps.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        self.hyps.truncate(self.top_k);
    }
}

fn apply_condition_penalties(
    hyp: &Hypothesis,
    morph: &crate::store::Morpheme,
    cfg: &Config,
) -> f32 {
    let mut penalty = 0.0;
    match morph.vowel {
        VowelCondition::None | VowelCondition::Any => {}
        VowelCondition::Coda => {
            if !matches!(hyp.last_jamo, Some(j) if hangul::ends_with_coda(j)) {
                penalty += cfg.vowel_condition_penalty;
            }
        }
        VowelCondition::NoCoda => {
            if matches!(hyp.last_jamo, Some(j) if hangul::ends_with_coda(j)) {
                penalty += cfg.vowel_condition_penalty;
            }
        }
        VowelCondition::Vowel => {
            if !matches!(hyp.last_jamo, Some(j) if hangul::jungseong_is_positive(j) == Some(true)) {
                penalty += cfg.vowel_condition_penalty;
            }
        }
        VowelCondition::NoVowel => {
            if matches!(hyp.last_jamo, Some(j) if hangul::jungseong_is_positive(j) == Some(true)) {
                penalty += cfg.vowel_condition_penalty;
            }
        }
    }
    match morph.polarity {
        PolarityCondition::None => {}
        PolarityCondition::Positive => {
            if !hyp.positive_run {
                penalty += cfg.polarity_condition_penalty;
            }
        }
        PolarityCondition::NonPositive => {
            if hyp.positive_run {
                penalty += cfg.polarity_condition_penalty;
            }
        }
    }
    if morph.combine_socket != 0 && hyp.last_socket != morph.combine_socket {
        penalty += cfg.combine_socket_penalty;
    }
    penalty
}

fn push_context(context: &[u32], order: u32, id: u32) -> Vec<u32> {
    let max_len = order.saturating_sub(1) as usize;
    let mut v = context.to_vec();
    v.push(id);
    if v.len() > max_len {
        v.remove(0);
    }
    v
}

/// Extend `hyp` through a single morpheme (not a chunk expansion), applying
/// LM score (corrected by `skip_bigram` when a model is loaded), condition
/// penalties, and updating trailing state.
fn extend_one(
    hyp: &Hypothesis,
    morph_id: MorphemeId,
    store: &MorphemeStore,
    lm: &NGramModel,
    skip_bigram: Option<&SkipBigramModel>,
    cfg: &Config,
    surface_start: u32,
    surface_end: u32,
    score_override: Option<u32>,
) -> Hypothesis {
    let morph = store.morpheme(morph_id);
    let penalty = apply_condition_penalties(hyp, morph, cfg);

    let score_id = score_override.unwrap_or_else(|| {
        morph
            .combined_offset
            .map_or(morph_id.0, |off| (morph_id.0 as i64 + off as i64) as u32)
    });
    let base_score = lm.score(&hyp.context, score_id);
    // The skip-bigram model corrects the base LM score conditioned on the
    // immediately preceding token, per SPEC_FULL.md §4.6.
    let lm_score = match (skip_bigram, hyp.context.last()) {
        (Some(sb), Some(&condition)) => sb.query(condition, score_id, base_score),
        _ => base_score,
    };

    let form = store.form(morph.form_ref);
    let last_jamo = form.key.last().copied().or(hyp.last_jamo);
    let positive_run = match morph.polarity {
        PolarityCondition::Positive => true,
        PolarityCondition::NonPositive => false,
        PolarityCondition::None => hyp.positive_run,
    };

    let mut emitted = hyp.emitted.clone();
    emitted.push(AnalyzedMorpheme {
        morpheme: morph_id,
        tag: morph.tag,
        surface_start,
        surface_end,
    });

    Hypothesis {
        context: push_context(&hyp.context, lm.order(), morph_id.0),
        score: hyp.score + lm_score - penalty,
        positive_run,
        last_jamo,
        last_socket: morph.combine_socket,
        emitted,
    }
}

/// Extend `hyp` by a candidate morpheme, expanding through `chunks` in order
/// when present (SPEC_FULL.md §4.4).
fn extend(
    hyp: &Hypothesis,
    morph_id: MorphemeId,
    store: &MorphemeStore,
    lm: &NGramModel,
    skip_bigram: Option<&SkipBigramModel>,
    cfg: &Config,
    surface_start: u32,
    surface_end: u32,
) -> Hypothesis {
    let morph = store.morpheme(morph_id);
    match &morph.chunks {
        Some(chunks) => {
            let mut cur = hyp.clone();
            for &chunk_id in chunks {
                cur = extend_one(&cur, chunk_id, store, lm, skip_bigram, cfg, surface_start, surface_end, None);
            }
            cur
        }
        None => extend_one(hyp, morph_id, store, lm, skip_bigram, cfg, surface_start, surface_end, None),
    }
}

/// Run the beam search over `lattice`, returning up to `top_k` analyses with
/// their scores, best first. When `skip_bigram` is `Some`, it corrects every
/// LM lookup per SPEC_FULL.md §3/§4.6; a model with no skip-bigram file
/// loaded passes `None` and scores with the base n-gram model alone.
pub fn decode(
    lattice: &Lattice,
    store: &MorphemeStore,
    lm: &NGramModel,
    skip_bigram: Option<&SkipBigramModel>,
    cfg: &Config,
    top_k: usize,
) -> Vec<(Vec<AnalyzedMorpheme>, f32)> {
    if top_k == 0 {
        return Vec::new();
    }
    let n = lattice.len as usize;
    if n == 0 {
        return vec![(Vec::new(), 0.0)];
    }
    let mut beams: Vec<Beam> = (0..=n).map(|_| Beam::new(top_k)).collect();
    let trained_tags = lm.trained_tags();

    beams[0].push(Hypothesis {
        context: vec![crate::store::BOS.0],
        score: 0.0,
        positive_run: false,
        last_jamo: None,
        last_socket: 0,
        emitted: Vec::new(),
    });

    for end in 1..=n {
        let edges = &lattice.edges_ending_at[end];
        for edge in edges {
            let start = edge.start as usize;
            let predecessors: Vec<Hypothesis> = beams[start].hyps.clone();
            if predecessors.is_empty() {
                continue;
            }
            match edge.kind {
                EdgeKind::Form(form_id) => {
                    let form = store.form(form_id);
                    for &cand in &form.candidates {
                        for hyp in &predecessors {
                            let next = extend(hyp, cand, store, lm, skip_bigram, cfg, edge.start, edge.end);
                            beams[end].push(next);
                        }
                    }
                }
                EdgeKind::Unknown => {
                    let tag = PosTag::Unknown;
                    let unk_id = MorphemeId(tag.sentinel_index());
                    // The emitted morpheme is tagged UNKNOWN (SPEC_FULL.md §8),
                    // but the LM was trained on per-tag sentinels, so scoring
                    // falls back to whichever sentinel the model actually
                    // trained on (SPEC_FULL.md §4.5).
                    let score_vocab = crate::ngram::unk_vocab_for(tag, &trained_tags);
                    for hyp in &predecessors {
                        let next = extend_one(
                            hyp,
                            unk_id,
                            store,
                            lm,
                            skip_bigram,
                            cfg,
                            edge.start,
                            edge.end,
                            Some(score_vocab),
                        );
                        beams[end].push(next);
                    }
                }
            }
        }
        beams[end].finalize();
    }

    let mut finals: Vec<Hypothesis> = beams[n]
        .hyps
        .iter()
        .map(|h| {
            let mut h = h.clone();
            let base_score = lm.score(&h.context, EOS.0);
            let lm_score = match (skip_bigram, h.context.last()) {
                (Some(sb), Some(&condition)) => sb.query(condition, EOS.0, base_score),
                _ => base_score,
            };
            h.score += lm_score;
            h
        })
        .collect();

    finals.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    finals.truncate(top_k);
    finals.into_iter().map(|h| (h.emitted, h.score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice;

    fn build_store() -> MorphemeStore {
        let mut store = MorphemeStore::new();
        let f = store.intern_form(&[1, 31]); // 가
        store.add_morpheme(f, PosTag::Nng, VowelCondition::None, PolarityCondition::None, None, 0);
        store.solidify().unwrap();
        store
    }

    #[test]
    fn empty_input_yields_empty_analysis_with_zero_score() {
        let store = build_store();
        let lm = NGramModel::new(2);
        let cfg = Config::default();
        let lat = lattice::split(store.trie().unwrap(), &[]);
        let results = decode(&lat, &store, &lm, None, &cfg, 3);
        assert_eq!(results, vec![(Vec::new(), 0.0)]);
    }

    #[test]
    fn top_k_zero_yields_no_results() {
        let store = build_store();
        let lm = NGramModel::new(2);
        let cfg = Config::default();
        let lat = lattice::split(store.trie().unwrap(), &[]);
        let results = decode(&lat, &store, &lm, None, &cfg, 0);
        assert!(results.is_empty());
    }

    #[test]
    fn matched_form_produces_analysis_covering_full_span() {
        let store = build_store();
        let lm = NGramModel::new(2);
        let cfg = Config::default();
        let lat = lattice::split(store.trie().unwrap(), &[1, 31]);
        let results = decode(&lat, &store, &lm, None, &cfg, 3);
        assert!(!results.is_empty());
        let (morphemes, _score) = &results[0];
        assert_eq!(morphemes.first().unwrap().surface_start, 0);
        assert_eq!(morphemes.last().unwrap().surface_end, 2);
    }

    #[test]
    fn unmatched_input_falls_back_to_unknown_tag() {
        let store = build_store();
        let lm = NGramModel::new(2);
        let cfg = Config::default();
        let lat = lattice::split(store.trie().unwrap(), &[9, 9]);
        let results = decode(&lat, &store, &lm, None, &cfg, 1);
        assert_eq!(results[0].0[0].tag, PosTag::Unknown);
    }

    #[test]
    fn top_k_respects_requested_width() {
        let mut store = MorphemeStore::new();
        let f = store.intern_form(&[1, 31]);
        store.add_morpheme(f, PosTag::Nng, VowelCondition::None, PolarityCondition::None, None, 0);
        store.add_morpheme(f, PosTag::Vv, VowelCondition::None, PolarityCondition::None, None, 0);
        store.solidify().unwrap();
        let lm = NGramModel::new(2);
        let cfg = Config::default();
        let lat = lattice::split(store.trie().unwrap(), &[1, 31]);
        let results = decode(&lat, &store, &lm, None, &cfg, 1);
        assert_eq!(results.len(), 1);
    }
}
