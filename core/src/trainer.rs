//! Skip-bigram gradient trainer (SPEC_FULL.md §4.6).
//!
//! Pair collection filters a tokenized corpus down to a manageable
//! (condition, target) vocabulary by count and normalized-PMI thresholds;
//! the trainer then runs asynchronous SGD over sentence batches, with
//! workers flushing thread-local gradients into a shared logit vector
//! protected by one mutex per gradient block, the same fine-grained-locking
//! idiom this crate's sibling examples use for CPU-bound fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::Config;
use crate::ngram::VocabId;
use crate::pos::NUM_TAGS;
use crate::skipbigram::SkipBigramModel;
use crate::store::SENTINEL_BASE;

/// Whether `token` is a real lexical morpheme rather than a boundary or
/// per-tag unknown-word sentinel (`store::BOS`, `store::EOS`,
/// `[SENTINEL_BASE, SENTINEL_BASE + NUM_TAGS)`). Mirrors the reference
/// trainer's `tokenFilter`/`vocabValidness`, which excludes the same
/// non-content placeholders from pair collection (`SkipBigramTrainer.hpp`).
fn is_real_token(token: VocabId) -> bool {
    token >= SENTINEL_BASE + NUM_TAGS as u32
}

/// One training sentence: token ids (including leading `<s>`/trailing
/// `</s>`) paired with the base LM's per-position log-probability.
pub struct TrainSentence {
    pub tokens: Vec<VocabId>,
    pub lm_log_probs: Vec<f32>,
}

/// Count single-token and co-occurrence statistics over a window of
/// `window_size` to each side, then filter to the pairs the trainer will
/// actually model.
pub fn collect_pairs(sentences: &[Vec<VocabId>], cfg: &Config) -> Vec<(VocabId, VocabId)> {
    use std::collections::HashMap;

    let w = cfg.window_size as usize;
    let mut unigram: HashMap<VocabId, u32> = HashMap::new();
    let mut co: HashMap<(VocabId, VocabId), u32> = HashMap::new();
    let mut total: u64 = 0;

    for sent in sentences {
        for &tok in sent {
            if !is_real_token(tok) {
                continue;
            }
            *unigram.entry(tok).or_insert(0) += 1;
            total += 1;
        }
        for i in 0..sent.len() {
            let cond = sent[i];
            if !is_real_token(cond) {
                continue;
            }
            for j in 1..=w {
                if i + j >= sent.len() {
                    break;
                }
                let target = sent[i + j];
                if !is_real_token(target) {
                    continue;
                }
                *co.entry((cond, target)).or_insert(0) += 1;
            }
        }
    }

    let total_f = total.max(1) as f32;
    let mut scored: Vec<(f32, VocabId, VocabId)> = Vec::new();

    for (&(a, b), &co_count) in co.iter() {
        let count_a = *unigram.get(&a).unwrap_or(&0);
        let count_b = *unigram.get(&b).unwrap_or(&0);
        if count_a < cfg.min_cnt * w as u32 || count_b < cfg.min_cnt * w as u32 {
            continue;
        }
        if co_count < cfg.min_co_cnt {
            continue;
        }
        let p_b = count_b as f32 / total_f;
        let p_ab = co_count as f32 / (p_b * count_a as f32);
        if p_ab <= 0.0 {
            continue;
        }
        let p_joint = co_count as f32 / total_f;
        if p_joint <= 0.0 || p_joint >= 1.0 {
            continue;
        }
        let npmi = p_ab.ln() / -p_joint.ln();
        if npmi < 0.0 || npmi < cfg.pmi_threshold {
            continue;
        }
        scored.push((npmi, a, b));
    }

    scored.sort_unstable_by(|x, y| y.0.partial_cmp(&x.0).unwrap());
    scored.truncate(cfg.max_data_size);
    scored.into_iter().map(|(_, a, b)| (a, b)).collect()
}

/// Per-worker accumulation buffer: flushed into the shared logits every
/// `update_interval` sentences.
struct TrainContext {
    grad: Vec<f32>,
    dirty_blocks: Vec<bool>,
}

impl TrainContext {
    fn new(len: usize, num_blocks: usize) -> Self {
        TrainContext {
            grad: vec![0.0; len],
            dirty_blocks: vec![false; num_blocks],
        }
    }

    fn mark_dirty(&mut self, index: usize, block_size: usize) {
        self.dirty_blocks[index / block_size] = true;
    }

    fn clear(&mut self) {
        for g in self.grad.iter_mut() {
            *g = 0.0;
        }
        for d in self.dirty_blocks.iter_mut() {
            *d = false;
        }
    }
}

pub struct SkipBigramTrainer {
    cfg: Config,
    window: usize,
    /// `ptrs[c]..ptrs[c+1]` is condition `c`'s segment in `vocabs`/`logits`;
    /// the last slot of every segment is the implicit "other" target.
    ptrs: Vec<u32>,
    vocabs: Vec<VocabId>,
    logits: Vec<Mutex<f32>>,
}

fn log_softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = values.iter().map(|&v| (v - max).exp()).sum();
    let log_sum = sum.ln() + max;
    values.iter().map(|&v| v - log_sum).collect()
}

impl SkipBigramTrainer {
    /// Build a fresh trainer from filtered pairs: one condition segment per
    /// distinct left-hand token, holding its sorted right-hand targets plus
    /// an "other" slot initialized with `lm_initial_bias` so training starts
    /// by trusting the base LM.
    pub fn new(pairs: &[(VocabId, VocabId)], cfg: Config) -> Self {
        use std::collections::BTreeMap;

        let mut by_cond: BTreeMap<VocabId, Vec<VocabId>> = BTreeMap::new();
        for &(a, b) in pairs {
            by_cond.entry(a).or_default().push(b);
        }

        let max_cond = by_cond.keys().copied().max().unwrap_or(0);
        let mut ptrs = vec![0u32; max_cond as usize + 2];
        let mut vocabs = Vec::new();
        let mut logits = Vec::new();

        for c in 0..=max_cond {
            ptrs[c as usize] = vocabs.len() as u32;
            if let Some(targets) = by_cond.get(&c) {
                let mut targets = targets.clone();
                targets.sort_unstable();
                targets.dedup();
                for t in targets {
                    vocabs.push(t);
                    logits.push(Mutex::new(0.0));
                }
            }
            // implicit "other" slot
            vocabs.push(0);
            logits.push(Mutex::new(cfg.lm_initial_bias));
        }
        ptrs[max_cond as usize + 1] = vocabs.len() as u32;

        let window = cfg.window_size as usize;
        SkipBigramTrainer { cfg, window, ptrs, vocabs, logits }
    }

    fn segment_range(&self, condition: VocabId) -> Option<(usize, usize)> {
        let c = condition as usize;
        if c + 1 >= self.ptrs.len() {
            return None;
        }
        let b = self.ptrs[c] as usize;
        let e = self.ptrs[c + 1] as usize;
        if e <= b {
            None
        } else {
            Some((b, e))
        }
    }

    fn read_segment_logits(&self, b: usize, e: usize) -> Vec<f32> {
        (b..e).map(|i| *self.logits[i].lock().unwrap()).collect()
    }

    /// Run one sentence through the model, accumulating gradient into the
    /// worker's local buffer and returning the sentence's log-likelihood
    /// contribution (SPEC_FULL.md §4.6, steps 1-4).
    fn accumulate_gradient(&self, sent: &TrainSentence, ctx: &mut TrainContext) -> f32 {
        let x = &sent.tokens;
        let lm = &sent.lm_log_probs;
        let len = x.len();
        if len < 3 {
            return 0.0;
        }

        let w = self.window;
        // ll_buf[target_pos] holds up to 2*w candidate log-probs: the first
        // half from in-vocabulary hits, the second half from the "other"
        // slot plus the base LM. Unfilled slots stay at -inf.
        let mut ll_buf: Vec<Vec<f32>> = vec![vec![f32::NEG_INFINITY; 2 * w]; len];

        // Forward pass: for every non-boundary condition, fill the buffer
        // slots of every target within reach.
        struct PosInfo {
            i: usize,
            b: usize,
            e: usize,
            log_softmax: Vec<f32>,
        }
        let mut infos: Vec<PosInfo> = Vec::new();

        for i in 1..len - 1 {
            let cond = x[i];
            let (b, e) = match self.segment_range(cond) {
                Some(r) => r,
                None => {
                    // No observed continuations at all: every reachable
                    // target only gets the base-LM contribution.
                    for j in 1..=w {
                        let t = i + j;
                        if t >= len {
                            break;
                        }
                        ll_buf[t][w + (j - 1)] = lm[t];
                    }
                    continue;
                }
            };
            let seg = self.read_segment_logits(b, e);
            let ls = log_softmax(&seg);
            let seg_size = e - b;
            let other_ls = ls[seg_size - 1];

            for j in 1..=w {
                let t = i + j;
                if t >= len {
                    break;
                }
                let target = x[t];
                let found = self.vocabs[b..e - 1].binary_search(&target).ok();
                if let Some(idx) = found {
                    ll_buf[t][j - 1] = ls[idx];
                }
                ll_buf[t][w + (j - 1)] = other_ls + lm[t];
            }

            infos.push(PosInfo { i, b, e, log_softmax: ls });
        }

        // logsumexp per target position across its up-to-2w candidates.
        let mut log_denom = vec![f32::NEG_INFINITY; len];
        for t in 0..len {
            let slice = &ll_buf[t];
            let max = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            if !max.is_finite() {
                continue;
            }
            let sum: f32 = slice.iter().map(|&v| (v - max).exp()).sum();
            log_denom[t] = sum.ln() + max;
        }

        let ln_w = (w as f32).ln();
        let mut log_likelihood = 0.0f32;
        for t in 0..len {
            if log_denom[t].is_finite() {
                log_likelihood += log_denom[t] - ln_w;
            }
        }

        // Backward pass: distribute gradient for every (condition, target)
        // pair that contributed to a finite log_denom.
        for info in &infos {
            let PosInfo { i, b, e, log_softmax: ls } = info;
            let seg_size = e - b;
            let softmax: Vec<f32> = ls.iter().map(|&v| v.exp()).collect();
            let other_idx = seg_size - 1;
            let mut touched_other = false;

            for j in 1..=w {
                let t = i + j;
                if t >= len {
                    break;
                }
                let denom = log_denom[t].exp();
                if denom <= 0.0 {
                    continue;
                }
                let target = x[t];
                let found = self.vocabs[*b..*e - 1].binary_search(&target).ok();

                if let Some(idx) = found {
                    let s_idx = softmax[idx];
                    let scale = s_idx / denom;
                    for k in 0..seg_size {
                        let onehot = if k == idx { 1.0 } else { 0.0 };
                        ctx.grad[*b + k] += scale * (onehot - softmax[k]);
                    }
                    ctx.mark_dirty(*b + idx, Config::gradient_block_size());
                }

                let s_other = softmax[other_idx];
                let scale_other = s_other / denom * lm[t].exp();
                for k in 0..seg_size {
                    let onehot = if k == other_idx { 1.0 } else { 0.0 };
                    ctx.grad[*b + k] += scale_other * (onehot - softmax[k]);
                }
                touched_other = true;
            }

            if touched_other {
                ctx.mark_dirty(*b + other_idx, Config::gradient_block_size());
                let s_other = softmax[other_idx];
                if s_other < self.cfg.lm_regularizing_limit {
                    let factor = (self.cfg.lm_regularizing_limit - s_other) / self.cfg.lm_regularizing_limit;
                    for k in 0..seg_size {
                        let onehot = if k == other_idx { 1.0 } else { 0.0 };
                        ctx.grad[*b + k] += (onehot - softmax[k]) * factor;
                    }
                }
            }
            let _ = seg_size;
        }

        log_likelihood
    }

    fn flush(&self, ctx: &mut TrainContext, lr: f32) {
        let block_size = Config::gradient_block_size();
        for (block_idx, dirty) in ctx.dirty_blocks.iter().enumerate() {
            if !*dirty {
                continue;
            }
            let start = block_idx * block_size;
            let end = (start + block_size).min(ctx.grad.len());
            for i in start..end {
                if ctx.grad[i] != 0.0 {
                    let mut slot = self.logits[i].lock().unwrap();
                    *slot += lr * ctx.grad[i];
                }
            }
        }
        ctx.clear();
    }

    /// Run asynchronous SGD over `feeder`, a closure yielding batches of
    /// sentences (`None` ends training early). Terminates when either the
    /// feeder is exhausted or `cfg.total_steps` sentences have been
    /// consumed, whichever comes first. `seed` makes the within-batch
    /// shuffle order reproducible across runs.
    pub fn train<F>(&self, mut feeder: F, seed: u64)
    where
        F: FnMut() -> Option<Vec<TrainSentence>>,
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let num_blocks = self.logits.len().div_ceil(Config::gradient_block_size());
        let global_step = Arc::new(AtomicU64::new(0));
        let total_steps = self.cfg.total_steps.max(1);
        let num_workers = self.cfg.train_workers.max(1);

        let (tx, rx) = mpsc::channel::<Vec<TrainSentence>>();
        let rx = Arc::new(Mutex::new(rx));

        thread::scope(|scope| {
            for _ in 0..num_workers {
                let rx = Arc::clone(&rx);
                let global_step = Arc::clone(&global_step);
                scope.spawn(move || {
                    let mut ctx = TrainContext::new(self.logits.len(), num_blocks);
                    let mut since_flush: u32 = 0;
                    loop {
                        let batch = {
                            let guard = rx.lock().unwrap();
                            guard.recv()
                        };
                        let batch = match batch {
                            Ok(b) => b,
                            Err(_) => break,
                        };
                        for sentence in &batch {
                            let step = global_step.fetch_add(1, Ordering::Relaxed);
                            if step >= total_steps {
                                break;
                            }
                            let progress = step as f32 / total_steps as f32;
                            let lr = self.cfg.lr_start * (1.0 - progress) + self.cfg.lr_start * 1e-5 * progress;
                            self.accumulate_gradient(sentence, &mut ctx);
                            since_flush += 1;
                            if since_flush >= self.cfg.update_interval {
                                self.flush(&mut ctx, lr);
                                since_flush = 0;
                            }
                        }
                        if global_step.load(Ordering::Relaxed) >= total_steps {
                            break;
                        }
                    }
                    self.flush(&mut ctx, self.cfg.lr_start * 1e-5);
                });
            }

            loop {
                if global_step.load(Ordering::Relaxed) >= total_steps {
                    break;
                }
                match feeder() {
                    Some(mut batch) => {
                        batch.shuffle(&mut rng);
                        if tx.send(batch).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            drop(tx);
        });
    }

    /// Export the trained logits into a query-time `SkipBigramModel`,
    /// keeping only compensations above `trim_threshold`.
    pub fn export(&self, trim_threshold: f32) -> SkipBigramModel {
        let mut model = SkipBigramModel::empty(self.cfg.window_size);
        let num_conditions = self.ptrs.len().saturating_sub(1);

        for c in 0..num_conditions {
            let b = self.ptrs[c] as usize;
            let e = self.ptrs[c + 1] as usize;
            if e <= b {
                continue;
            }
            let seg = self.read_segment_logits(b, e);
            let ls = log_softmax(&seg);
            let seg_size = e - b;
            let discount = ls[seg_size - 1];

            let mut comps = Vec::new();
            for k in 0..seg_size - 1 {
                if ls[k] > trim_threshold {
                    comps.push((self.vocabs[b + k], ls[k]));
                }
            }
            model.set_condition(c as VocabId, discount, comps);
        }

        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(tokens: Vec<VocabId>) -> TrainSentence {
        let lm_log_probs = vec![-1.0; tokens.len()];
        TrainSentence { tokens, lm_log_probs }
    }

    #[test]
    fn collect_pairs_drops_rare_tokens() {
        let cfg = Config { min_cnt: 100, min_co_cnt: 1, window_size: 1, ..Config::default() };
        let sentences = vec![vec![0, 1, 2, 3]];
        let pairs = collect_pairs(&sentences, &cfg);
        assert!(pairs.is_empty());
    }

    #[test]
    fn collect_pairs_keeps_frequent_co_occurring_tokens() {
        let cfg = Config { min_cnt: 1, min_co_cnt: 1, window_size: 1, pmi_threshold: -10.0, ..Config::default() };
        let sentences: Vec<Vec<VocabId>> = (0..20).map(|_| vec![105, 106]).collect();
        let pairs = collect_pairs(&sentences, &cfg);
        assert!(pairs.contains(&(105, 106)));
    }

    #[test]
    fn collect_pairs_drops_sentinel_tokens_even_if_frequent() {
        let cfg = Config { min_cnt: 1, min_co_cnt: 1, window_size: 1, pmi_threshold: -10.0, ..Config::default() };
        // 5 and 6 fall inside the boundary/tag-sentinel range and must never
        // surface as a trained skip-bigram pair.
        let sentences: Vec<Vec<VocabId>> = (0..20).map(|_| vec![5, 6]).collect();
        let pairs = collect_pairs(&sentences, &cfg);
        assert!(pairs.is_empty());
    }

    #[test]
    fn training_one_step_does_not_panic_and_moves_logits() {
        let cfg = Config { train_workers: 1, total_steps: 5, update_interval: 1, ..Config::default() };
        let pairs = vec![(1u32, 2u32), (1, 3)];
        let trainer = SkipBigramTrainer::new(&pairs, cfg);
        let before = trainer.read_segment_logits(trainer.ptrs[1] as usize, trainer.ptrs[2] as usize);

        let mut fed = false;
        trainer.train(
            || {
                if fed {
                    None
                } else {
                    fed = true;
                    Some(vec![sentence(vec![0, 1, 2, 3, 0])])
                }
            },
            42,
        );

        let after = trainer.read_segment_logits(trainer.ptrs[1] as usize, trainer.ptrs[2] as usize);
        assert_ne!(before, after);
    }

    #[test]
    fn export_produces_sorted_compensations_per_condition() {
        let cfg = Config::default();
        let pairs = vec![(1u32, 2u32), (1, 3), (1, 9)];
        let trainer = SkipBigramTrainer::new(&pairs, cfg);
        let model = trainer.export(f32::NEG_INFINITY);
        // discount + base should be finite for the trained condition.
        let v = model.query(1, 2, -2.0);
        assert!(v.is_finite());
    }
}
