//! Candidate lattice construction: trie matches over normalized input,
//! turned into edges the decoder can extend hypotheses across.

use crate::store::{FormId, MorphemeStore};
use crate::trie::Trie;

/// One edge in the candidate lattice, spanning `[start, end)` in jamo-code
/// positions of the normalized input.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub start: u32,
    pub end: u32,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy)]
pub enum EdgeKind {
    Form(FormId),
    /// No dictionary entry covers this span; decoded as an `UNKNOWN` token.
    Unknown,
}

/// Candidate lattice over a normalized (jamo-code) input: for every position,
/// the edges that may end there.
#[derive(Debug, Clone)]
pub struct Lattice {
    pub len: u32,
    /// `edges_ending_at[p]` holds every edge with `end == p`.
    pub edges_ending_at: Vec<Vec<Edge>>,
}

/// Build the candidate lattice for `text` (already jamo-normalized).
///
/// Per SPEC_FULL.md §4.3: walk the automaton, collect every terminal
/// reachable via failure links at each position, and fill any stretch with no
/// match at all with a single `UNKNOWN` edge spanning the whole unmatched
/// run.
pub fn split(trie: &Trie, text: &[u8]) -> Lattice {
    let n = text.len() as u32;
    let mut edges_ending_at: Vec<Vec<Edge>> = vec![Vec::new(); n as usize + 1];

    if n == 0 {
        return Lattice { len: 0, edges_ending_at };
    }

    let matches = trie.match_all(text);
    let mut covered = vec![false; n as usize]; // covered[i] := some match ends at i+1

    for (i, ms) in matches.iter().enumerate() {
        let end = (i + 1) as u32;
        for m in ms {
            let start = end - m.len;
            edges_ending_at[end as usize].push(Edge {
                start,
                end,
                kind: EdgeKind::Form(m.form),
            });
            covered[i] = true;
        }
    }

    // Fill gaps: any maximal run of positions with no match ending there
    // becomes a single UNKNOWN edge covering the run, starting right after
    // the previous matched prefix start (or position 0).
    let mut i = 0usize;
    while i < n as usize {
        if covered[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n as usize && !covered[i] {
            i += 1;
        }
        edges_ending_at[i].push(Edge {
            start: start as u32,
            end: i as u32,
            kind: EdgeKind::Unknown,
        });
    }

    Lattice { len: n, edges_ending_at }
}

/// The jamo suffix set a morpheme store associates with a form, used by the
/// decoder to validate attachment between adjacent edges.
pub fn form_suffix<'a>(store: &'a MorphemeStore, form: FormId) -> &'a std::collections::HashSet<u8> {
    &store.form(form).suffix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::{PolarityCondition, PosTag, VowelCondition};
    use crate::store::MorphemeStore;

    fn store_with(keys: &[&[u8]]) -> MorphemeStore {
        let mut store = MorphemeStore::new();
        for k in keys {
            let f = store.intern_form(k);
            store.add_morpheme(f, PosTag::Nng, VowelCondition::Any, PolarityCondition::None, None, 0);
        }
        store.solidify().unwrap();
        store
    }

    #[test]
    fn empty_text_yields_empty_lattice() {
        let store = store_with(&[&[1, 2]]);
        let lat = split(store.trie().unwrap(), &[]);
        assert_eq!(lat.len, 0);
    }

    #[test]
    fn fully_unmatched_text_yields_single_unknown_edge() {
        let store = store_with(&[&[1, 2]]);
        let lat = split(store.trie().unwrap(), &[9, 9, 9]);
        let last = &lat.edges_ending_at[3];
        assert_eq!(last.len(), 1);
        match last[0].kind {
            EdgeKind::Unknown => {
                assert_eq!(last[0].start, 0);
                assert_eq!(last[0].end, 3);
            }
            _ => panic!("expected unknown edge"),
        }
    }

    #[test]
    fn matched_text_produces_form_edge() {
        let store = store_with(&[&[1, 2]]);
        let lat = split(store.trie().unwrap(), &[1, 2]);
        let edges = &lat.edges_ending_at[2];
        assert_eq!(edges.len(), 1);
        match edges[0].kind {
            EdgeKind::Form(_) => {
                assert_eq!(edges[0].start, 0);
                assert_eq!(edges[0].end, 2);
            }
            _ => panic!("expected form edge"),
        }
    }
}
