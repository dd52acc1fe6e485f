//! Fuzz target for morphological dictionary parsing.
//!
//! Arbitrary dictionary text must parse or fail cleanly, and every parsed
//! form must be found again by analysis.

#![no_main]

use libfuzzer_sys::fuzz_target;
use prediktor_core::morph::{ConstraintSet, Dictionary, MorphOracle, Side, Tag};

fuzz_target!(|data: &str| {
    for line in data.lines() {
        if let Some(tag_text) = line.rsplit('\t').next() {
            let _ = Tag::parse(tag_text);
        }
    }

    let Ok(dictionary) = Dictionary::parse(data) else { return };
    let oracle = MorphOracle::new(dictionary);

    let words: Vec<&str> = data.split_whitespace().take(8).collect();
    for word in &words {
        for analysis in oracle.analyze(word) {
            let _ = oracle.generate(&analysis.lemma, &analysis.tag);
        }
    }

    let (following, preceding) = words.split_last().map_or((None, &[][..]), |(l, r)| (Some(*l), r));
    let preceding = &preceding[preceding.len().saturating_sub(2)..];
    let set = ConstraintSet::derive(&oracle, preceding, following);
    for word in &words {
        let readings = oracle.analyze(word);
        assert!(set.best_satisfied(Side::Left, readings) <= set.len());
        assert!(set.best_satisfied(Side::Right, readings) <= set.len());
    }
});
