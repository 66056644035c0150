//! Arena-backed Aho-Corasick trie over jamo-code sequences.
//!
//! Keys are the jamo byte sequences produced by `hangul::split_jamo` (values
//! 1..=51). Nodes live in a flat `Vec` rather than a pointer tree, so
//! traversal is cache-friendly and freeing the structure needs no recursive
//! destructor — the representation this crate's lineage settles on for the
//! "single preferred" trie variant (SPEC_FULL.md §9).

use crate::store::FormId;

const ROOT: u32 = 0;
/// Jamo codes are small (<=51); a fixed-size child array beats a HashMap at
/// this fan-out and keeps traversal allocation-free.
const ALPHABET: usize = 64;

#[derive(Debug, Clone)]
struct Node {
    children: [u32; ALPHABET],
    fail: u32,
    /// Set when this node terminates at least one form's key.
    terminal: Option<FormId>,
    depth: u32,
}

impl Node {
    fn empty(depth: u32) -> Self {
        Node {
            children: [u32::MAX; ALPHABET],
            fail: ROOT,
            terminal: None,
            depth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Node>,
    filled: bool,
}

/// One matched form ending at a given position during `match_all`.
#[derive(Debug, Clone, Copy)]
pub struct Match {
    pub form: FormId,
    /// Length in jamo codes of the matched key.
    pub len: u32,
}

impl Trie {
    pub fn new() -> Self {
        Trie {
            nodes: vec![Node::empty(0)],
            filled: false,
        }
    }

    pub fn insert(&mut self, key: &[u8], form: FormId) {
        let mut cur = ROOT as usize;
        for (depth, &code) in key.iter().enumerate() {
            let code = code as usize;
            debug_assert!(code < ALPHABET, "jamo code {} out of range", code);
            let next = self.nodes[cur].children[code];
            cur = if next == u32::MAX {
                let id = self.nodes.len() as u32;
                self.nodes.push(Node::empty((depth + 1) as u32));
                self.nodes[cur].children[code] = id;
                id as usize
            } else {
                next as usize
            };
        }
        // Multiple forms can only share a terminal if they share a key, which
        // `MorphemeStore::intern_form` already dedupes.
        self.nodes[cur].terminal = Some(form);
    }

    /// Breadth-first failure-link assignment. Must be called exactly once
    /// after all keys are inserted and before any `match_all` call.
    pub fn fill_fail(&mut self) {
        use std::collections::VecDeque;
        let mut queue: VecDeque<u32> = VecDeque::new();

        let root_children: Vec<u32> = self.nodes[ROOT as usize]
            .children
            .iter()
            .copied()
            .filter(|&c| c != u32::MAX)
            .collect();
        for c in root_children {
            self.nodes[c as usize].fail = ROOT;
            queue.push_back(c);
        }

        while let Some(cur) = queue.pop_front() {
            let children = self.nodes[cur as usize].children;
            for code in 0..ALPHABET {
                let child = children[code];
                if child == u32::MAX {
                    continue;
                }
                let mut f = self.nodes[cur as usize].fail;
                let resolved = loop {
                    let fc = self.nodes[f as usize].children[code];
                    if fc != u32::MAX {
                        break fc;
                    }
                    if f == ROOT {
                        break ROOT;
                    }
                    f = self.nodes[f as usize].fail;
                };
                self.nodes[child as usize].fail = resolved;
                queue.push_back(child);
            }
        }
        self.filled = true;
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    fn step(&self, state: u32, code: u8) -> u32 {
        let code = code as usize;
        let mut s = state;
        loop {
            let next = self.nodes[s as usize].children[code];
            if next != u32::MAX {
                return next;
            }
            if s == ROOT {
                return ROOT;
            }
            s = self.nodes[s as usize].fail;
        }
    }

    /// All terminals reachable from `state` by following failure links,
    /// innermost (longest match) first.
    fn collect_terminals(&self, state: u32) -> Vec<Match> {
        let mut out = Vec::new();
        let mut s = state;
        loop {
            if let Some(form) = self.nodes[s as usize].terminal {
                out.push(Match {
                    form,
                    len: self.nodes[s as usize].depth,
                });
            }
            if s == ROOT {
                break;
            }
            s = self.nodes[s as usize].fail;
        }
        out
    }

    /// Walk the automaton over `text` (a jamo-code sequence), returning, for
    /// each position, every form matched ending there. `text[i]` corresponds
    /// to output index `i`.
    ///
    /// # Panics
    /// Panics if `fill_fail` has not been called.
    pub fn match_all(&self, text: &[u8]) -> Vec<Vec<Match>> {
        assert!(self.filled, "Trie::fill_fail must be called before match_all");
        let mut state = ROOT;
        let mut out = Vec::with_capacity(text.len());
        for &code in text {
            state = self.step(state, code);
            out.push(self.collect_terminals(state));
        }
        out
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}
