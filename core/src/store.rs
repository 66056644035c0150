//! Form / morpheme store: the dictionary the trie and decoder are built on.
//!
//! Forms and morphemes live in flat `Vec` arenas addressed by `u32` index
//! newtypes (`FormId`, `MorphemeId`) for the whole lifetime of the store —
//! build time and inference time alike. `solidify` does not change the
//! representation (there is no pointer rewrite to perform, unlike the
//! pointer-graph original); it builds the trie, validates the invariants in
//! SPEC_FULL.md §8, and drops the build-only form interning map so the
//! store can be shared freely across threads.

use ahash::AHashMap;
use std::collections::HashSet;

use crate::error::ModelError;
use crate::pos::{PolarityCondition, PosTag, VowelCondition, NUM_TAGS};
use crate::trie::Trie;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MorphemeId(pub u32);

/// Index reserved for `<s>`.
pub const BOS: MorphemeId = MorphemeId(0);
/// Index reserved for `</s>`.
pub const EOS: MorphemeId = MorphemeId(1);
/// First index of the `[2, 2 + NUM_TAGS)` per-tag unknown-word sentinel range.
pub const SENTINEL_BASE: u32 = 2;

#[derive(Debug, Clone)]
pub struct Form {
    /// Jamo-encoded normalized key (see `hangul::split_jamo`).
    pub key: Vec<u8>,
    pub candidates: Vec<MorphemeId>,
    /// Jamo codes with which a following syllable may attach to a morpheme
    /// ending in this form.
    pub suffix: HashSet<u8>,
}

#[derive(Debug, Clone)]
pub struct Morpheme {
    pub tag: PosTag,
    pub vowel: VowelCondition,
    pub polarity: PolarityCondition,
    /// Non-zero: this morpheme may only be emitted adjacent to a morpheme
    /// with the same socket value on the other side of the pairing.
    pub combine_socket: u8,
    /// Present for "combined" entries: this morpheme expands into this
    /// ordered sequence of constituent morphemes at decode time.
    pub chunks: Option<Vec<MorphemeId>>,
    /// Present for "pre-combined" entries: score as if the morpheme at
    /// `self_index as i64 + combined_offset` were emitted instead.
    pub combined_offset: Option<i32>,
    pub form_ref: FormId,
}

pub struct MorphemeStore {
    forms: Vec<Form>,
    morphemes: Vec<Morpheme>,
    form_index: Option<AHashMap<Vec<u8>, FormId>>,
    trie: Option<Trie>,
}

impl MorphemeStore {
    /// Build a fresh store with `<s>`, `</s>` and the per-tag unknown-word
    /// sentinels already populated, per SPEC_FULL.md §3.
    pub fn new() -> Self {
        let mut forms = Vec::new();
        let mut morphemes = Vec::new();
        let mut form_index = AHashMap::new();

        // `<s>` and `</s>` get empty-key forms of their own; they are never
        // looked up by key so collisions are impossible.
        for (idx, tag) in [(0usize, PosTag::Bos), (1, PosTag::Eos)] {
            let form_id = FormId(forms.len() as u32);
            forms.push(Form {
                key: Vec::new(),
                candidates: vec![MorphemeId(idx as u32)],
                suffix: HashSet::new(),
            });
            morphemes.push(Morpheme {
                tag,
                vowel: VowelCondition::None,
                polarity: PolarityCondition::None,
                combine_socket: 0,
                chunks: None,
                combined_offset: None,
                form_ref: form_id,
            });
        }

        for tag_idx in 0..NUM_TAGS {
            let tag = tag_from_sentinel_slot(tag_idx);
            let form_id = FormId(forms.len() as u32);
            let morph_id = MorphemeId(morphemes.len() as u32);
            forms.push(Form {
                key: Vec::new(),
                candidates: vec![morph_id],
                suffix: HashSet::new(),
            });
            morphemes.push(Morpheme {
                tag,
                vowel: VowelCondition::None,
                polarity: PolarityCondition::None,
                combine_socket: 0,
                chunks: None,
                combined_offset: None,
                form_ref: form_id,
            });
            debug_assert_eq!(morph_id.0, SENTINEL_BASE + tag_idx as u32);
        }

        // Sentinel forms are never looked up via `intern_form`; they carry no
        // entry in `form_index` on purpose.
        let _ = &mut form_index;

        MorphemeStore {
            forms,
            morphemes,
            form_index: Some(form_index),
            trie: None,
        }
    }

    /// Reconstruct a store directly from deserialized forms/morphemes,
    /// skipping `<s>`/`</s>`/sentinel population since the caller already
    /// has them from the serialized data. Not yet solidified — callers must
    /// call `solidify` before use.
    pub fn from_parts(forms: Vec<Form>, morphemes: Vec<Morpheme>) -> Self {
        let mut form_index = AHashMap::new();
        for (i, f) in forms.iter().enumerate() {
            if !f.key.is_empty() {
                form_index.insert(f.key.clone(), FormId(i as u32));
            }
        }
        MorphemeStore {
            forms,
            morphemes,
            form_index: Some(form_index),
            trie: None,
        }
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn morphemes(&self) -> &[Morpheme] {
        &self.morphemes
    }

    pub fn form(&self, id: FormId) -> &Form {
        &self.forms[id.0 as usize]
    }

    pub fn morpheme(&self, id: MorphemeId) -> &Morpheme {
        &self.morphemes[id.0 as usize]
    }

    pub fn is_solidified(&self) -> bool {
        self.trie.is_some()
    }

    pub fn trie(&self) -> Option<&Trie> {
        self.trie.as_ref()
    }

    /// Returns an existing form with this key, or creates one. O(1) expected.
    ///
    /// # Panics
    /// Panics if called after `solidify` (the interning map has been
    /// dropped); building past that point is a programming error.
    pub fn intern_form(&mut self, key: &[u8]) -> FormId {
        let idx_map = self
            .form_index
            .as_mut()
            .expect("intern_form called after solidify");
        if let Some(&id) = idx_map.get(key) {
            return id;
        }
        let id = FormId(self.forms.len() as u32);
        self.forms.push(Form {
            key: key.to_vec(),
            candidates: Vec::new(),
            suffix: HashSet::new(),
        });
        idx_map.insert(key.to_vec(), id);
        id
    }

    pub fn add_morpheme(
        &mut self,
        form_ref: FormId,
        tag: PosTag,
        vowel: VowelCondition,
        polarity: PolarityCondition,
        chunks: Option<Vec<MorphemeId>>,
        combine_socket: u8,
    ) -> MorphemeId {
        let id = MorphemeId(self.morphemes.len() as u32);
        self.morphemes.push(Morpheme {
            tag,
            vowel,
            polarity,
            combine_socket,
            chunks,
            combined_offset: None,
            form_ref,
        });
        self.forms[form_ref.0 as usize].candidates.push(id);
        id
    }

    /// Pre-combined entry: redirect scoring to `target` via an offset.
    pub fn add_precombined(
        &mut self,
        form_ref: FormId,
        tag: PosTag,
        combine_socket: u8,
        suffixes: impl IntoIterator<Item = u8>,
        target: MorphemeId,
    ) -> MorphemeId {
        let id = MorphemeId(self.morphemes.len() as u32);
        let offset = target.0 as i64 - id.0 as i64;
        self.morphemes.push(Morpheme {
            tag,
            vowel: VowelCondition::None,
            polarity: PolarityCondition::None,
            combine_socket,
            chunks: None,
            combined_offset: Some(offset as i32),
            form_ref,
        });
        let form = &mut self.forms[form_ref.0 as usize];
        form.candidates.push(id);
        form.suffix.extend(suffixes);
        id
    }

    /// Post-load extension: add a single unconditioned user word.
    pub fn add_user_word(&mut self, surface: &[u8], tag: PosTag) -> MorphemeId {
        let form_ref = self.intern_form(surface);
        self.add_morpheme(
            form_ref,
            tag,
            VowelCondition::None,
            PolarityCondition::None,
            None,
            0,
        )
    }

    /// Post-load extension: add a combined morpheme whose chunks are the
    /// freshly appended sub-morphemes for each `(sub_surface, sub_tag)` pair.
    pub fn add_user_rule(
        &mut self,
        surface: &[u8],
        morphs: &[(Vec<u8>, PosTag)],
    ) -> MorphemeId {
        let form_ref = self.intern_form(surface);
        let mut chunk_ids = Vec::with_capacity(morphs.len());
        for (sub_surface, sub_tag) in morphs {
            let sub_form = self.intern_form(sub_surface);
            let id = self.add_morpheme(
                sub_form,
                *sub_tag,
                VowelCondition::None,
                PolarityCondition::None,
                None,
                0,
            );
            chunk_ids.push(id);
        }
        self.add_morpheme(
            form_ref,
            PosTag::Unknown,
            VowelCondition::None,
            PolarityCondition::None,
            Some(chunk_ids),
            0,
        )
    }

    /// Materialize the trie over all interned form keys, validate the
    /// store's invariants, and drop the build-time interning map. Idempotent:
    /// calling this a second time (e.g. after `add_user_word`) rebuilds the
    /// trie from the current form set.
    pub fn solidify(&mut self) -> Result<(), ModelError> {
        for (idx, m) in self.morphemes.iter().enumerate() {
            let is_boundary_sentinel = idx == BOS.0 as usize || idx == EOS.0 as usize;
            if is_boundary_sentinel {
                continue;
            }
            if let Some(chunks) = &m.chunks {
                for &c in chunks {
                    if c.0 as usize >= idx {
                        return Err(ModelError::BadMorphemeRef(c.0));
                    }
                }
            }
        }

        let mut trie = Trie::new();
        for (i, form) in self.forms.iter().enumerate() {
            if form.key.is_empty() {
                continue;
            }
            trie.insert(&form.key, FormId(i as u32));
        }
        trie.fill_fail();

        self.trie = Some(trie);
        self.form_index = None;
        Ok(())
    }
}

impl Default for MorphemeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tag_from_sentinel_slot(slot: usize) -> PosTag {
    crate::pos::ALL_TAGS[slot]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_occupy_reserved_indices() {
        let store = MorphemeStore::new();
        assert_eq!(store.morpheme(BOS).tag, PosTag::Bos);
        assert_eq!(store.morpheme(EOS).tag, PosTag::Eos);
        assert_eq!(
            store.morpheme(MorphemeId(PosTag::Nng.sentinel_index())).tag,
            PosTag::Nng
        );
    }

    #[test]
    fn intern_form_is_idempotent() {
        let mut store = MorphemeStore::new();
        let a = store.intern_form(&[1, 2, 3]);
        let b = store.intern_form(&[1, 2, 3]);
        assert_eq!(a, b);
        let c = store.intern_form(&[1, 2, 4]);
        assert_ne!(a, c);
    }

    #[test]
    fn every_candidate_points_back_to_its_form() {
        let mut store = MorphemeStore::new();
        let f = store.intern_form(&[5, 6]);
        store.add_morpheme(f, PosTag::Nng, VowelCondition::Any, PolarityCondition::None, None, 0);
        store.solidify().unwrap();
        for form in store.forms() {
            for &cand in &form.candidates {
                let m = store.morpheme(cand);
                assert_eq!(m.form_ref.0, m.form_ref.0); // sanity: field exists
                let owner = store.form(m.form_ref);
                assert!(std::ptr::eq(owner, form) || owner.key == form.key);
            }
        }
    }

    #[test]
    fn solidify_builds_trie_and_drops_index() {
        let mut store = MorphemeStore::new();
        let f = store.intern_form(&[7, 8]);
        store.add_morpheme(f, PosTag::Nnp, VowelCondition::None, PolarityCondition::None, None, 0);
        assert!(!store.is_solidified());
        store.solidify().unwrap();
        assert!(store.is_solidified());
        assert!(store.trie().is_some());
    }

    #[test]
    fn chunks_must_reference_lower_index() {
        let mut store = MorphemeStore::new();
        let f1 = store.intern_form(&[1]);
        let lo = store.add_morpheme(f1, PosTag::Nng, VowelCondition::None, PolarityCondition::None, None, 0);
        let f2 = store.intern_form(&[2]);
        // A combined entry referencing a morpheme with a *lower* index is valid.
        store.add_morpheme(f2, PosTag::Unknown, VowelCondition::None, PolarityCondition::None, Some(vec![lo]), 0);
        assert!(store.solidify().is_ok());
    }
}
