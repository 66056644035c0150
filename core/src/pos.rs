//! Part-of-speech tag set.
//!
//! The tag order matters: morpheme indices `[2, 2 + NUM_TAGS)` are reserved
//! sentinels, one per tag (see `store::RESERVED_SENTINEL_BASE`), and the
//! condition-derivation rule in `corpus::derive_conditions` keys off the
//! `JKS..=ETM` sub-range being contiguous and in this exact order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PosTag {
    /// Start-of-sentence boundary sentinel.
    Bos = 0,
    /// End-of-sentence boundary sentinel.
    Eos = 1,
    Nng,
    Nnp,
    Nnb,
    Np,
    Nr,
    Vv,
    Va,
    Vx,
    Vcp,
    Vcn,
    Mm,
    Maj,
    Mag,
    Ic,
    Jks,
    Jkc,
    Jkg,
    Jko,
    Jkb,
    Jkv,
    Jkq,
    Jx,
    Jc,
    Ep,
    Ef,
    Ec,
    Etn,
    Etm,
    Xpn,
    Xsn,
    Xsv,
    Xsa,
    Xr,
    Sf,
    Sp,
    Ss,
    Se,
    So,
    Sw,
    Sn,
    /// Catch-all for anything that doesn't parse as a known tag.
    Unknown,
}

pub const NUM_TAGS: usize = PosTag::Unknown as usize + 1;

impl PosTag {
    /// Tags in `[Jks, Etm]` carry the inflectional vowel/polarity conditions
    /// described in SPEC_FULL.md §4.2; all tags before this range (content
    /// words, boundary sentinels) never carry a hard condition.
    pub fn in_inflectional_range(self) -> bool {
        self >= PosTag::Jks && self <= PosTag::Etm
    }

    /// Parse the textual tag name used in the tab-separated dictionary and
    /// corpus files. Unrecognized names map to `Unknown` rather than erroring
    /// — malformed-but-present tag columns are common in the training data
    /// and must not abort the build (SPEC_FULL.md §7).
    pub fn parse(s: &str) -> PosTag {
        use PosTag::*;
        match s {
            "NNG" => Nng,
            "NNP" => Nnp,
            "NNB" => Nnb,
            "NP" => Np,
            "NR" => Nr,
            "VV" => Vv,
            "VA" => Va,
            "VX" => Vx,
            "VCP" => Vcp,
            "VCN" => Vcn,
            "MM" => Mm,
            "MAJ" => Maj,
            "MAG" => Mag,
            "IC" => Ic,
            "JKS" => Jks,
            "JKC" => Jkc,
            "JKG" => Jkg,
            "JKO" => Jko,
            "JKB" => Jkb,
            "JKV" => Jkv,
            "JKQ" => Jkq,
            "JX" => Jx,
            "JC" => Jc,
            "EP" => Ep,
            "EF" => Ef,
            "EC" => Ec,
            "ETN" => Etn,
            "ETM" => Etm,
            "XPN" => Xpn,
            "XSN" => Xsn,
            "XSV" => Xsv,
            "XSA" => Xsa,
            "XR" => Xr,
            "SF" => Sf,
            "SP" => Sp,
            "SS" => Ss,
            "SE" => Se,
            "SO" => So,
            "SW" => Sw,
            "SN" => Sn,
            "<s>" => Bos,
            "</s>" => Eos,
            _ => Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        use PosTag::*;
        match self {
            Bos => "<s>",
            Eos => "</s>",
            Nng => "NNG",
            Nnp => "NNP",
            Nnb => "NNB",
            Np => "NP",
            Nr => "NR",
            Vv => "VV",
            Va => "VA",
            Vx => "VX",
            Vcp => "VCP",
            Vcn => "VCN",
            Mm => "MM",
            Maj => "MAJ",
            Mag => "MAG",
            Ic => "IC",
            Jks => "JKS",
            Jkc => "JKC",
            Jkg => "JKG",
            Jko => "JKO",
            Jkb => "JKB",
            Jkv => "JKV",
            Jkq => "JKQ",
            Jx => "JX",
            Jc => "JC",
            Ep => "EP",
            Ef => "EF",
            Ec => "EC",
            Etn => "ETN",
            Etm => "ETM",
            Xpn => "XPN",
            Xsn => "XSN",
            Xsv => "XSV",
            Xsa => "XSA",
            Xr => "XR",
            Sf => "SF",
            Sp => "SP",
            Ss => "SS",
            Se => "SE",
            So => "SO",
            Sw => "SW",
            Sn => "SN",
            Unknown => "UNKNOWN",
        }
    }

    /// Whether `self` is at or after `Jks`, the threshold used by the weight
    /// cutoff in SPEC_FULL.md §4.2 and the unknown-token fallback in §4.5.
    pub fn is_inflectional_or_later(self) -> bool {
        self >= PosTag::Jks
    }

    /// The sentinel morpheme index reserved for "unknown word of this tag".
    pub fn sentinel_index(self) -> u32 {
        2 + self as u32
    }
}

/// All tag variants in declaration order, indexed by sentinel slot (0-based
/// from `Bos`) — the inverse of `sentinel_index`. Shared by `store::new`
/// (building the sentinel morphemes) and `ngram::NGramModel::trained_tags`
/// (recovering which tags the loaded model actually saw).
pub const ALL_TAGS: [PosTag; NUM_TAGS] = {
    use PosTag::*;
    [
        Bos, Eos, Nng, Nnp, Nnb, Np, Nr, Vv, Va, Vx, Vcp, Vcn, Mm, Maj, Mag, Ic, Jks, Jkc, Jkg,
        Jko, Jkb, Jkv, Jkq, Jx, Jc, Ep, Ef, Ec, Etn, Etm, Xpn, Xsn, Xsv, Xsa, Xr, Sf, Sp, Ss, Se,
        So, Sw, Sn, Unknown,
    ]
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VowelCondition {
    None,
    Any,
    Coda,
    NoCoda,
    Vowel,
    NoVowel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolarityCondition {
    None,
    Positive,
    NonPositive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_through_as_str() {
        for name in ["NNG", "JKS", "EF", "VV", "SN"] {
            let tag = PosTag::parse(name);
            assert_eq!(tag.as_str(), name);
        }
    }

    #[test]
    fn unknown_tag_name_maps_to_unknown() {
        assert_eq!(PosTag::parse("ZZZ"), PosTag::Unknown);
    }

    #[test]
    fn inflectional_range_matches_jks_through_etm() {
        assert!(PosTag::Jks.in_inflectional_range());
        assert!(PosTag::Etm.in_inflectional_range());
        assert!(!PosTag::Nng.in_inflectional_range());
        assert!(!PosTag::Xpn.in_inflectional_range());
    }

    #[test]
    fn sentinel_indices_are_distinct_and_start_at_two() {
        let a = PosTag::Nng.sentinel_index();
        let b = PosTag::Nnp.sentinel_index();
        assert_eq!(a, 2);
        assert_ne!(a, b);
    }
}
