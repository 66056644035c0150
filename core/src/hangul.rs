//! Hangul syllable <-> jamo conversion.
//!
//! A Hangul syllable in `[U+AC00, U+D7A4)` decomposes into a choseong
//! (initial consonant), a jungseong (medial vowel) and an optional jongseong
//! (final consonant). The model and trie never operate on raw syllables —
//! everything is keyed on jamo sequences so that forms sharing a prefix of
//! consonants/vowels also share a prefix in the trie.
//!
//! Reference upstream behavior: `KiwiLibrary/Utils.cpp` (`splitJamo`,
//! `joinJamo`, `splitCoda`). The numeric jamo codes below are chosen to keep
//! choseong, jungseong and jongseong in disjoint ranges packed into a single
//! byte, matching the original table layout.

use crate::error::ModelError;

pub const HANGUL_BASE: u32 = 0xAC00;
pub const HANGUL_END: u32 = 0xD7A4;

const CHO_TABLE: [u8; 19] = [1, 2, 4, 7, 8, 9, 17, 18, 19, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30];
const JONG_TABLE: [u8; 27] = [
    1, 2, 3, 4, 5, 6, 7, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 20, 21, 22, 23, 24, 26, 27, 28,
    29, 30,
];
/// Compatibility jamo base used when flushing an unattached choseong/jungseong.
const COMPAT_JAMO_BASE: u32 = 0x3130;

fn cho_inverse(code: u8) -> Option<u8> {
    CHO_TABLE.iter().position(|&c| c == code).map(|i| i as u8)
}

fn jong_inverse(code: u8) -> Option<u8> {
    if code == 0 {
        return Some(0);
    }
    JONG_TABLE
        .iter()
        .position(|&c| c == code)
        .map(|i| (i + 1) as u8)
}

/// Returns true if `ch` falls in the Hangul syllables block.
pub fn is_hangul_syllable(ch: char) -> bool {
    let c = ch as u32;
    (HANGUL_BASE..HANGUL_END).contains(&c)
}

/// Jungseong (medial vowel) codes occupy `[31, 52)`; every other code in a
/// jamo sequence is a choseong/jongseong consonant.
pub fn is_jungseong(code: u8) -> bool {
    (31..=51).contains(&code)
}

/// Whether a surface ending in `code` closes with a coda (jongseong).
/// A surface ending in a jungseong code has no coda.
pub fn ends_with_coda(code: u8) -> bool {
    !is_jungseong(code)
}

/// Bright/positive vowels trigger `-아` endings, dark vowels `-어`, in
/// standard Korean vowel harmony. Indexed by jungseong code minus 31,
/// following Unicode compatibility jamo order (ㅏㅐㅑㅒㅓㅔㅕㅖㅗㅘㅙㅚㅛㅜㅝㅞㅟㅠㅡㅢㅣ).
const JUNGSEONG_POSITIVE: [bool; 21] = [
    true, false, true, false, false, false, false, false, true, true, false, false, true, false,
    false, false, false, false, false, false, false,
];

/// Vowel-harmony polarity of a jungseong code, or `None` if `code` isn't a
/// jungseong.
pub fn jungseong_is_positive(code: u8) -> Option<bool> {
    if !is_jungseong(code) {
        return None;
    }
    JUNGSEONG_POSITIVE.get((code - 31) as usize).copied()
}

/// Decompose one syllable into 2 or 3 jamo codes, appended to `out`.
///
/// # Panics (debug only)
/// `ch` must be a Hangul syllable; callers pre-filter non-Hangul input.
pub fn split_jamo_char(ch: char, out: &mut Vec<u8>) -> Result<(), ModelError> {
    let c = ch as u32;
    if !(HANGUL_BASE..HANGUL_END).contains(&c) {
        return Err(ModelError::NotHangul(ch));
    }
    let t = c - HANGUL_BASE;
    let jong = (t % 28) as usize;
    let jung = ((t / 28) % 21) as usize;
    let cho = (t / 28 / 21) as usize;
    out.push(CHO_TABLE[cho]);
    out.push((jung + 31) as u8);
    if jong > 0 {
        out.push(JONG_TABLE[jong - 1]);
    }
    Ok(())
}

/// Decompose a full string of Hangul syllables into a jamo byte sequence.
pub fn split_jamo(hangul: &str) -> Result<Vec<u8>, ModelError> {
    let mut out = Vec::with_capacity(hangul.chars().count() * 3);
    for ch in hangul.chars() {
        split_jamo_char(ch, &mut out)?;
    }
    Ok(out)
}

/// Like [`split_jamo`], but keeps each syllable's jongseong as a standalone
/// trailing jamo rather than merging it into the next syllable's onset —
/// i.e. the syllable boundary is preserved, only the coda is factored out.
pub fn split_coda(hangul: &str) -> Result<Vec<char>, ModelError> {
    let mut out = Vec::with_capacity(hangul.chars().count() * 2);
    for ch in hangul.chars() {
        let c = ch as u32;
        if !(HANGUL_BASE..HANGUL_END).contains(&c) {
            return Err(ModelError::NotHangul(ch));
        }
        let coda = (c - HANGUL_BASE) % 28;
        out.push(char::from_u32(c - coda).unwrap());
        if coda != 0 {
            out.push(char::from_u32(coda + 0x11A7).unwrap());
        }
    }
    Ok(out)
}

/// Reassemble a jamo byte sequence into Hangul syllables (and standalone
/// compatibility jamo for any stray, unattached choseong/jungseong).
///
/// An invalid composition (e.g. two choseong with no intervening jungseong)
/// flushes whatever has accumulated so far and starts a new syllable, never
/// erroring — this mirrors the original `joinJamo`'s permissive behavior,
/// which must tolerate partially-matched jamo runs at decode time.
pub fn join_jamo(jamo: &[u8]) -> String {
    let mut ret = String::new();
    let mut cho: u8 = 0;
    let mut jung: u8 = 0;
    let mut jong: u8 = 0;

    let flush = |cho: &mut u8, jung: &mut u8, jong: &mut u8, ret: &mut String| {
        if *cho == 0 && *jung != 0 {
            ret.push(char::from_u32(COMPAT_JAMO_BASE + *jung as u32).unwrap());
            *jung = 0;
            return;
        }
        if *jung == 0 && *cho != 0 {
            ret.push(char::from_u32(COMPAT_JAMO_BASE + *cho as u32).unwrap());
            *cho = 0;
            return;
        }
        if *cho == 0 && *jung == 0 {
            return;
        }
        let cho_i = cho_inverse(*cho).unwrap_or(0) as u32;
        let jung_v = (*jung as u32).wrapping_sub(31);
        let jong_i = jong_inverse(*jong).unwrap_or(0) as u32;
        let code = (cho_i * 21 + jung_v) * 28 + jong_i + HANGUL_BASE;
        if let Some(c) = char::from_u32(code) {
            ret.push(c);
        }
        *cho = 0;
        *jung = 0;
        *jong = 0;
    };

    for &c in jamo {
        if c <= 30 {
            // consonant-range code: either a choseong or a jongseong.
            if cho == 0 {
                cho = c;
            } else if jung == 0 || jong_inverse(c).is_none() {
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
                cho = c;
            } else if jong == 0 {
                jong = c;
            } else {
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
                cho = c;
            }
        } else {
            // vowel-range code: jungseong.
            if cho == 0 {
                jung = c;
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
            } else if jung == 0 {
                jung = c;
            } else if jong == 0 {
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
                jung = c;
            } else if cho_inverse(jong).is_some() {
                let carried = jong;
                jong = 0;
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
                cho = carried;
                jung = c;
            } else {
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
                jung = c;
                flush(&mut cho, &mut jung, &mut jong, &mut ret);
            }
        }
    }
    flush(&mut cho, &mut jung, &mut jong, &mut ret);
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_then_join_roundtrips_every_syllable() {
        // Exhaustively testing all 11,172 syllables is cheap; do it rather
        // than sample, since a stride could hide a single miscoded cho/jung/
        // jong entry.
        for code in HANGUL_BASE..HANGUL_END {
            let ch = char::from_u32(code).unwrap();
            let s = ch.to_string();
            let jamo = split_jamo(&s).unwrap();
            let rejoined = join_jamo(&jamo);
            assert_eq!(rejoined, s, "roundtrip failed for U+{:04X}", code);
        }
    }

    #[test]
    fn split_jamo_rejects_non_hangul() {
        assert!(split_jamo("a").is_err());
        assert!(split_jamo("漢").is_err());
    }

    #[test]
    fn split_coda_preserves_syllable_count() {
        let out = split_coda("먹었다").unwrap();
        // 먹 has a coda (ㄱ), 었 has a coda (ㅆ), 다 has none.
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn coda_and_polarity_classify_jungseong_vs_consonant() {
        assert!(!ends_with_coda(31)); // ㅏ, a jungseong: no coda
        assert!(ends_with_coda(1)); // a consonant code
        assert_eq!(jungseong_is_positive(31), Some(true)); // ㅏ is bright
        assert_eq!(jungseong_is_positive(1), None);
    }

    #[test]
    fn join_jamo_flushes_unattached_choseong() {
        // A lone choseong with no jungseong following must surface as a
        // standalone compatibility jamo instead of being silently dropped.
        let jamo = vec![1u8]; // choseong ㄱ
        let s = join_jamo(&jamo);
        assert_eq!(s.chars().count(), 1);
    }
}
