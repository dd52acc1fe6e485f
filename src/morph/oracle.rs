//! Read-only morphological oracle over a loaded dictionary.

use std::collections::BTreeSet;
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

use super::dictionary::{Dictionary, DictionaryError, MorphAnalysis};
use super::tag::Tag;

/// Analyses surface forms and realizes lemmas. Never disambiguates.
///
/// Shared across requests behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct MorphOracle {
    dictionary: Dictionary,
}

impl MorphOracle {
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }

    pub fn from_file(path: &Path) -> Result<Self, DictionaryError> {
        Ok(Self::new(Dictionary::from_file(path)?))
    }

    /// Every analysis of `surface`. Empty means out of vocabulary.
    ///
    /// Tries the NFC form first, then its lowercase (sentence-initial
    /// capitals).
    pub fn analyze(&self, surface: &str) -> &[MorphAnalysis] {
        let normalized: String = surface.nfc().collect();
        let found = self.dictionary.lookup(&normalized);
        if !found.is_empty() {
            return found;
        }
        let lower = normalized.to_lowercase();
        if lower == normalized {
            return found;
        }
        self.dictionary.lookup(&lower)
    }

    pub fn is_known(&self, surface: &str) -> bool {
        !self.analyze(surface).is_empty()
    }

    /// Forms of `lemma` carrying every category set in `tag`. Empty when the
    /// combination is not realizable.
    pub fn generate(&self, lemma: &str, tag: &Tag) -> BTreeSet<&str> {
        let normalized: String = lemma.nfc().collect();
        self.dictionary.forms(&normalized, tag)
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }
}
