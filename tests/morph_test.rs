//! Tests for the morphological oracle and agreement constraints.

mod common;

use prediktor_core::morph::{
    AgreementRule, Case, Category, ConstraintSet, Dictionary, DictionaryError, FeatureValue,
    MorphOracle, Pos, Side, Tag,
};

#[test]
fn test_fixture_dictionary_loads() {
    let oracle = common::oracle();
    assert_eq!(oracle.dictionary().len(), 10);
    assert!(oracle.is_known("him"));
    assert!(!oracle.is_known("zork"));
}

#[test]
fn test_analyze_returns_every_reading() {
    let oracle = common::oracle();
    let readings = oracle.analyze("book");
    assert_eq!(readings.len(), 2);
    assert!(readings.iter().all(|a| a.lemma == "book" && a.tag.pos == Some(Pos::Noun)));
}

#[test]
fn test_analyze_falls_back_to_lowercase() {
    let oracle = common::oracle();
    assert_eq!(oracle.analyze("Him").len(), 1);
    assert_eq!(oracle.analyze("Him")[0].lemma, "he");
}

#[test]
fn test_oov_is_empty_not_error() {
    let oracle = common::oracle();
    assert!(oracle.analyze("zork").is_empty());
    assert!(oracle.analyze("").is_empty());
}

#[test]
fn test_generate_forms_by_tag() {
    let oracle = common::oracle();
    let tag = Tag::parse("PRO;ACC").unwrap();
    let forms: Vec<&str> = oracle.generate("she", &tag).into_iter().collect();
    assert_eq!(forms, vec!["her"]);
    assert!(oracle.generate("zork", &tag).is_empty());
}

#[test]
fn test_decomposed_input_matches_composed_entry() {
    let dict = Dictionary::parse("kniha\tknihu\tN;ACC;SG;FEM\nstůl\tstůl\tN;NOM;SG;MASC\n").unwrap();
    let oracle = MorphOracle::new(dict);
    // "stůl" with a combining ring above.
    assert_eq!(oracle.analyze("stu\u{30a}l").len(), 1);
}

#[test]
fn test_malformed_dictionary_line_is_reported() {
    let err = Dictionary::parse("kniha\tknihu\n").unwrap_err();
    assert!(matches!(err, DictionaryError::Malformed { line: 1, .. }));
}

#[test]
fn test_empty_dictionary_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.tsv");
    std::fs::write(&path, "").unwrap();
    let oracle = MorphOracle::from_file(&path).unwrap();
    assert!(oracle.dictionary().is_empty());
}

#[test]
fn test_preposition_governs_pronoun_case() {
    let oracle = common::oracle();
    let set = ConstraintSet::derive(&oracle, &["book", "to"], None);
    assert_eq!(set.len(), 1);

    let constraint = set.iter().next().unwrap();
    assert_eq!(constraint.rule, AgreementRule::Government);
    assert_eq!(constraint.category, Category::Case);
    assert_eq!(constraint.side, Side::Left);
    assert_eq!(constraint.source, "to");
    assert!(constraint.allowed.contains(&FeatureValue::Case(Case::Accusative)));

    assert_eq!(set.best_satisfied(Side::Left, oracle.analyze("him")), 1);
    assert_eq!(set.best_satisfied(Side::Left, oracle.analyze("her")), 1);
    assert_eq!(set.best_satisfied(Side::Left, oracle.analyze("she")), 0);
}

#[test]
fn test_no_constraints_without_triggers() {
    let oracle = common::oracle();
    assert!(ConstraintSet::derive(&oracle, &["gave", "the"], None).is_empty());
    assert!(ConstraintSet::derive(&oracle, &[], Some("yesterday")).is_empty());
    assert!(ConstraintSet::derive(&oracle, &["zork"], Some("zork")).is_empty());
}

#[test]
fn test_czech_agreement_both_sides() {
    let oracle = MorphOracle::new(
        Dictionary::parse(concat!(
            "velký\tvelkou\tADJ;ACC;SG;FEM\n",
            "kniha\tknihu\tN;ACC;SG;FEM\n",
            "kniha\tkniha\tN;NOM;SG;FEM\n",
            "on\ton\tPRO;NOM;3;SG;MASC\n",
            "číst\tčte\tV;PRS;3;SG\n",
            "číst\tčtou\tV;PRS;3;PL\n",
        ))
        .unwrap(),
    );

    let left = ConstraintSet::derive(&oracle, &["mu", "velkou"], None);
    assert_eq!(left.len(), 3);
    assert!(left.iter().all(|c| c.rule == AgreementRule::ModifierHead));

    let right = ConstraintSet::derive(&oracle, &[], Some("čte"));
    assert!(right.iter().all(|c| c.side == Side::Right && c.rule == AgreementRule::VerbSubject));
    assert_eq!(right.best_satisfied(Side::Right, oracle.analyze("on")), 2);
    assert_eq!(right.best_satisfied(Side::Right, oracle.analyze("kniha")), 2);
}
