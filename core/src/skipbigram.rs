//! Skip-bigram correction model: a sparse, per-condition table of
//! compensation log-probabilities layered on top of the base n-gram model.
//!
//! This module is the query/export side (SPEC_FULL.md §4.6, tail); the
//! gradient trainer that produces a `SkipBigramModel` lives in `trainer.rs`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::ModelError;
use crate::ngram::VocabId;

const SKIPBIGRAM_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
struct Header {
    version: u32,
    vocab_size: u32,
    key_size: u8,
    window_size: u8,
    compressed: u8,
}

/// Per-condition compensation table: `discount` is the log-probability mass
/// assigned to the implicit "other" slot; `compensations` lists the targets
/// whose corrected log-probability beats what the base LM alone would give.
#[derive(Debug, Clone)]
pub struct SkipBigramModel {
    window_size: u8,
    /// Indexed by condition `VocabId`.
    discount: Vec<f32>,
    /// Indexed by condition `VocabId`: sorted `(target, log_prob)` pairs.
    compensations: Vec<Vec<(VocabId, f32)>>,
    /// Indexed by condition `VocabId`: whether the condition occurred often
    /// enough during training to be trusted at all.
    valid: Vec<bool>,
}

impl SkipBigramModel {
    pub fn empty(window_size: u8) -> Self {
        SkipBigramModel {
            window_size,
            discount: Vec::new(),
            compensations: Vec::new(),
            valid: Vec::new(),
        }
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    fn ensure_capacity(&mut self, condition: VocabId) {
        let idx = condition as usize;
        if idx >= self.discount.len() {
            self.discount.resize(idx + 1, 0.0);
            self.compensations.resize(idx + 1, Vec::new());
            self.valid.resize(idx + 1, false);
        }
    }

    pub fn set_condition(&mut self, condition: VocabId, discount: f32, mut compensations: Vec<(VocabId, f32)>) {
        self.ensure_capacity(condition);
        compensations.sort_unstable_by_key(|&(v, _)| v);
        let idx = condition as usize;
        self.discount[idx] = discount;
        self.compensations[idx] = compensations;
        self.valid[idx] = true;
    }

    fn compensation(&self, condition: VocabId, target: VocabId) -> Option<f32> {
        let idx = condition as usize;
        if idx >= self.compensations.len() || !self.valid[idx] {
            return None;
        }
        self.compensations[idx]
            .binary_search_by_key(&target, |&(v, _)| v)
            .ok()
            .map(|i| self.compensations[idx][i].1)
    }

    /// `log P(target | condition)`, correcting `lm_base` (the n-gram model's
    /// log-probability for the same pair) per SPEC_FULL.md §4.6:
    /// `max(compensation_if_present, discount + lm_base)`.
    pub fn query(&self, condition: VocabId, target: VocabId, lm_base: f32) -> f32 {
        let idx = condition as usize;
        let discount = if idx < self.discount.len() && self.valid[idx] {
            self.discount[idx]
        } else {
            return lm_base;
        };
        let backed_off = discount + lm_base;
        match self.compensation(condition, target) {
            Some(compensated) => compensated.max(backed_off),
            None => backed_off,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        let vocab_size = self.discount.len() as u32;
        w.write_all(&SKIPBIGRAM_VERSION.to_le_bytes())?;
        w.write_all(&vocab_size.to_le_bytes())?;
        w.write_all(&(std::mem::size_of::<VocabId>() as u8).to_le_bytes())?;
        w.write_all(&self.window_size.to_le_bytes())?;
        w.write_all(&[0u8])?; // compressed: always 0
        w.write_all(&[0u8])?; // pad

        for comps in &self.compensations {
            w.write_all(&(comps.len() as u32).to_le_bytes())?;
        }
        for comps in &self.compensations {
            for &(v, _) in comps {
                w.write_all(&v.to_le_bytes())?;
            }
        }
        for &d in &self.discount {
            w.write_all(&d.to_le_bytes())?;
        }
        for comps in &self.compensations {
            for &(_, lp) in comps {
                w.write_all(&lp.to_le_bytes())?;
            }
        }
        for &v in &self.valid {
            w.write_all(&[v as u8])?;
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let header = read_header(&mut r)?;
        if header.version != SKIPBIGRAM_VERSION {
            return Err(ModelError::UnknownVersion(header.version).into());
        }

        let n = header.vocab_size as usize;
        let mut counts = vec![0u32; n];
        for c in counts.iter_mut() {
            *c = read_u32(&mut r)?;
        }

        let mut compensations: Vec<Vec<(VocabId, f32)>> = Vec::with_capacity(n);
        for &c in &counts {
            let mut targets = Vec::with_capacity(c as usize);
            for _ in 0..c {
                targets.push((read_u32(&mut r)?, 0.0f32));
            }
            compensations.push(targets);
        }

        let mut discount = vec![0f32; n];
        for d in discount.iter_mut() {
            *d = read_f32(&mut r)?;
        }

        for comps in compensations.iter_mut() {
            for entry in comps.iter_mut() {
                entry.1 = read_f32(&mut r)?;
            }
        }

        let mut valid = vec![false; n];
        for v in valid.iter_mut() {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            *v = b[0] != 0;
        }

        Ok(SkipBigramModel {
            window_size: header.window_size,
            discount,
            compensations,
            valid,
        })
    }
}

fn read_header(r: &mut impl Read) -> anyhow::Result<Header> {
    let header = Header {
        version: read_u32(r)?,
        vocab_size: read_u32(r)?,
        key_size: read_u8(r)?,
        window_size: read_u8(r)?,
        compressed: read_u8(r)?,
    };
    let _pad = read_u8(r)?; // matches the pad byte `save` writes after `compressed`
    Ok(header)
}

fn read_u32(r: &mut impl Read) -> anyhow::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_f32(r: &mut impl Read) -> anyhow::Result<f32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_le_bytes(b))
}

fn read_u8(r: &mut impl Read) -> anyhow::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_prefers_compensation_when_it_beats_backoff() {
        let mut m = SkipBigramModel::empty(2);
        m.set_condition(1, -2.0, vec![(5, -0.1)]);
        let v = m.query(1, 5, -3.0);
        assert!((v - (-0.1)).abs() < 1e-6);
    }

    #[test]
    fn query_falls_back_to_discount_plus_base_when_uncompensated() {
        let mut m = SkipBigramModel::empty(2);
        m.set_condition(1, -2.0, vec![(5, -0.1)]);
        let v = m.query(1, 9, -3.0);
        assert!((v - (-2.0 + -3.0)).abs() < 1e-6);
    }

    #[test]
    fn unseen_condition_returns_bare_lm_base() {
        let m = SkipBigramModel::empty(2);
        assert_eq!(m.query(42, 7, -1.5), -1.5);
    }

    #[test]
    fn save_then_load_round_trips_query_results() {
        let mut m = SkipBigramModel::empty(2);
        m.set_condition(1, -2.0, vec![(5, -0.1), (8, -1.7)]);
        m.set_condition(3, -0.5, vec![]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipBigram.bin");
        m.save(&path).unwrap();
        let loaded = SkipBigramModel::load(&path).unwrap();

        assert_eq!(loaded.window_size(), m.window_size());
        for (condition, target, lm_base) in [(1, 5, -3.0), (1, 8, -3.0), (1, 9, -3.0), (3, 2, -4.0), (42, 7, -1.5)] {
            let before = m.query(condition, target, lm_base);
            let after = loaded.query(condition, target, lm_base);
            assert!((before - after).abs() < 1e-5, "condition {condition} target {target}: {before} vs {after}");
        }
    }
}
