//! End-to-end scenarios exercising the public `Model` facade: build from raw
//! dictionary text, analyze, and the user-word/bad-magic boundary cases.

use haneul_core::{Config, Model, PosTag};
use std::io::Write;

fn dict_dir(lines: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut f = std::fs::File::create(dir.path().join("dict.txt")).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    dir
}

#[test]
fn empty_input_returns_empty_analysis_with_zero_score() {
    let dir = dict_dir(&["가\tNNG\t100\t_\t0.9\t0.1\t0.1\t0.5"]);
    let model = Model::build_from_raw(dir.path(), Config::default()).unwrap();
    let results = model.analyze("", 5);
    assert_eq!(results, vec![(Vec::new(), 0.0)]);
}

#[test]
fn text_with_no_dictionary_coverage_falls_back_to_unknown_tag() {
    let dir = dict_dir(&["가\tNNG\t100\t_\t0.9\t0.1\t0.1\t0.5"]);
    let model = Model::build_from_raw(dir.path(), Config::default()).unwrap();
    let results = model.analyze("나라", 3);
    assert!(!results.is_empty());
    let (morphemes, _score) = &results[0];
    assert_eq!(morphemes.len(), 1);
    assert_eq!(morphemes[0].tag, PosTag::Unknown);
    assert_eq!(morphemes[0].surface_start, 0);
    assert_eq!(morphemes[0].surface_end, haneul_core::hangul::split_jamo("나라").unwrap().len() as u32);
}

#[test]
fn verb_stem_ending_sequence_decodes_into_three_morphemes() {
    let dir = dict_dir(&[
        "먹\tVV\t100\t_\t0.9\t0.1\t0.1\t0.5",
        "었\tEP\t100\t_\t0.1\t0.9\t0.1\t0.5",
        "다\tEF\t100\t_\t0.1\t0.9\t0.1\t0.5",
    ]);
    let model = Model::build_from_raw(dir.path(), Config::default()).unwrap();
    let results = model.analyze("먹었다", 3);
    assert!(!results.is_empty());
    let (morphemes, _score) = &results[0];
    let tags: Vec<PosTag> = morphemes.iter().map(|m| m.tag).collect();
    assert_eq!(tags, vec![PosTag::Vv, PosTag::Ep, PosTag::Ef]);
}

#[test]
fn noun_particle_sequence_decodes_into_two_morphemes() {
    let dir = dict_dir(&[
        "사람\tNNG\t100\t_\t0.9\t0.1\t0.1\t0.5",
        "이\tJKS\t100\t_\t0.1\t0.9\t0.1\t0.5",
    ]);
    let model = Model::build_from_raw(dir.path(), Config::default()).unwrap();
    let results = model.analyze("사람이", 3);
    assert!(!results.is_empty());
    let (morphemes, _score) = &results[0];
    let tags: Vec<PosTag> = morphemes.iter().map(|m| m.tag).collect();
    assert_eq!(tags, vec![PosTag::Nng, PosTag::Jks]);
}

#[test]
fn user_word_is_reachable_after_add_and_reprepare() {
    let dir = dict_dir(&["가\tJKS\t100\t_\t0.1\t0.9\t0.1\t0.5"]);
    let mut model = Model::build_from_raw(dir.path(), Config::default()).unwrap();

    model.add_user_word("꾸미꾸미", PosTag::Nnp).unwrap();
    model.prepare().unwrap();

    let results = model.analyze("꾸미꾸미가", 3);
    assert!(!results.is_empty());
    let (morphemes, _score) = &results[0];
    assert_eq!(morphemes[0].tag, PosTag::Nnp);
    assert_eq!(morphemes[0].surface_start, 0);
}

#[test]
fn save_then_load_round_trips_an_analysis() {
    let src_dir = dict_dir(&["가\tNNG\t100\t_\t0.9\t0.1\t0.1\t0.5"]);
    let model = Model::build_from_raw(src_dir.path(), Config::default()).unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    model.save(out_dir.path()).unwrap();

    let reloaded = Model::load(out_dir.path(), Config::default()).unwrap();
    let before = model.analyze("가", 1);
    let after = reloaded.analyze("가", 1);
    assert_eq!(before, after);
}

#[test]
fn bad_magic_on_load_is_a_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("morpheme.bin"), [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    let result = Model::load(dir.path(), Config::default());
    assert!(result.is_err());
}
