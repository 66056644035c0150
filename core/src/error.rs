//! Typed error kinds for the parts of the crate callers are expected to
//! match on. Aggregating I/O/parse failures at the loader boundary use
//! `anyhow::Result` instead (see `model::build_from_raw`, `model::load`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("character U+{:04X} is not a Hangul syllable", *.0 as u32)]
    NotHangul(char),

    #[error("bad magic in {what}: expected 0x{expected:08X}, found 0x{found:08X}")]
    BadMagic {
        what: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("truncated {what}: expected at least {expected} bytes, found {found}")]
    Truncated {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unknown model file version {0}")]
    UnknownVersion(u32),

    #[error("unknown POS tag: {0}")]
    UnknownTag(String),

    #[error("morpheme reference out of range: {0}")]
    BadMorphemeRef(u32),
}
