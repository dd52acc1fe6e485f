//! UniMorph-style dictionary loading.
//!
//! Format: one analysis per line, `lemma<TAB>form<TAB>FEAT;FEAT;...`. Blank
//! lines and lines starting with `#` are skipped. Forms and lemmas are stored
//! NFC-normalised so lookups are insensitive to composed/decomposed input.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::tag::Tag;

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("dictionary is not valid UTF-8 (byte {0})")]
    Encoding(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One reading of a surface form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MorphAnalysis {
    pub lemma: String,
    pub tag: Tag,
    pub surface_form: String,
}

/// Immutable form and lemma indexes.
#[derive(Debug, Default)]
pub struct Dictionary {
    by_form: HashMap<String, Vec<MorphAnalysis>>,
    by_lemma: HashMap<String, Vec<(String, Tag)>>,
    entries: usize,
}

impl Dictionary {
    /// Load a dictionary file through a read-only memory map.
    pub fn from_file(path: &Path) -> Result<Self, DictionaryError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::default());
        }
        // SAFETY: the map is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        let text = std::str::from_utf8(&mmap).map_err(|e| DictionaryError::Encoding(e.valid_up_to()))?;
        Self::parse(text)
    }

    /// Parse dictionary text.
    pub fn parse(text: &str) -> Result<Self, DictionaryError> {
        let mut dict = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t');
            let (Some(lemma), Some(form), Some(features), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(DictionaryError::Malformed {
                    line: line_no,
                    reason: "expected lemma, form and features separated by tabs".into(),
                });
            };
            let lemma = lemma.trim();
            let form = form.trim();
            if lemma.is_empty() || form.is_empty() {
                return Err(DictionaryError::Malformed {
                    line: line_no,
                    reason: "empty lemma or form".into(),
                });
            }
            let tag = Tag::parse(features).map_err(|e| DictionaryError::Malformed {
                line: line_no,
                reason: e.to_string(),
            })?;

            dict.insert(lemma.nfc().collect(), form.nfc().collect(), tag);
        }
        Ok(dict)
    }

    fn insert(&mut self, lemma: String, form: String, tag: Tag) {
        let analysis = MorphAnalysis { lemma: lemma.clone(), tag, surface_form: form.clone() };
        let readings = self.by_form.entry(form.clone()).or_default();
        if readings.contains(&analysis) {
            return;
        }
        readings.push(analysis);
        self.by_lemma.entry(lemma).or_default().push((form, tag));
        self.entries += 1;
    }

    /// Analyses stored under an already-normalised form.
    pub fn lookup(&self, form: &str) -> &[MorphAnalysis] {
        self.by_form.get(form).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forms of an already-normalised lemma whose tag carries `tag`.
    pub fn forms(&self, lemma: &str, tag: &Tag) -> BTreeSet<&str> {
        self.by_lemma
            .get(lemma)
            .into_iter()
            .flatten()
            .filter(|(_, t)| t.carries(tag))
            .map(|(form, _)| form.as_str())
            .collect()
    }

    /// Number of distinct analyses.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn form_count(&self) -> usize {
        self.by_form.len()
    }
}
