//! Count-based backoff language model.
//!
//! Reads n-gram counts from a JSON model file whose n-grams are written as
//! vocabulary pieces, so the file stays readable and is resolved against the
//! tokenizer at load time. Scores use an add-one unigram base and stupid
//! backoff for longer contexts, renormalised into a proper distribution.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Deserialize;

use super::error::ModelError;
use super::model::LanguageModel;
use super::tokenizer::Tokenizer;

const DEFAULT_BACKOFF: f32 = 0.4;

fn default_backoff() -> f32 {
    DEFAULT_BACKOFF
}

fn default_model_id() -> String {
    "ngram".to_string()
}

/// On-disk model description.
#[derive(Debug, Deserialize)]
struct NgramFile {
    #[serde(default = "default_model_id")]
    model_id: String,
    order: usize,
    #[serde(default = "default_backoff")]
    backoff: f32,
    ngrams: Vec<NgramEntry>,
}

#[derive(Debug, Deserialize)]
struct NgramEntry {
    tokens: Vec<String>,
    count: u32,
}

/// Observed continuations of one context.
#[derive(Debug, Default)]
struct Successors {
    total: u32,
    next: Vec<(u32, u32)>,
}

/// Backoff n-gram model over a fixed vocabulary.
#[derive(Debug)]
pub struct NgramModel {
    model_id: String,
    order: usize,
    backoff: f32,
    vocab_size: usize,
    bos: u32,
    unigram: Vec<u32>,
    unigram_total: u64,
    successors: HashMap<Vec<u32>, Successors>,
}

impl NgramModel {
    /// Load a JSON model file, resolving pieces against `tokenizer`.
    pub fn from_file(path: &Path, tokenizer: &Tokenizer) -> Result<Self, ModelError> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and only read during parsing.
        let mmap = unsafe { Mmap::map(&file)? };
        let parsed: NgramFile = serde_json::from_slice(&mmap)
            .map_err(|e| ModelError::InvalidFormat(format!("invalid model JSON: {}", e)))?;
        Self::from_parsed(parsed, tokenizer)
    }

    /// Parse a JSON model from a string.
    pub fn from_json(json: &str, tokenizer: &Tokenizer) -> Result<Self, ModelError> {
        let parsed: NgramFile = serde_json::from_str(json)
            .map_err(|e| ModelError::InvalidFormat(format!("invalid model JSON: {}", e)))?;
        Self::from_parsed(parsed, tokenizer)
    }

    fn from_parsed(parsed: NgramFile, tokenizer: &Tokenizer) -> Result<Self, ModelError> {
        let mut counts = Vec::with_capacity(parsed.ngrams.len());
        for entry in parsed.ngrams {
            let ids = entry
                .tokens
                .iter()
                .map(|piece| {
                    tokenizer
                        .lookup(piece)
                        .ok_or_else(|| ModelError::UnknownPiece(piece.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            counts.push((ids, entry.count));
        }
        Self::from_counts(
            parsed.model_id,
            parsed.order,
            parsed.backoff,
            tokenizer.vocab_size(),
            tokenizer.bos_token(),
            counts,
        )
    }

    /// Build a model from id n-grams and their counts.
    pub fn from_counts<I>(
        model_id: impl Into<String>,
        order: usize,
        backoff: f32,
        vocab_size: usize,
        bos: u32,
        counts: I,
    ) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (Vec<u32>, u32)>,
    {
        if order == 0 {
            return Err(ModelError::InvalidFormat("order must be >= 1".into()));
        }
        if !(backoff > 0.0 && backoff <= 1.0) {
            return Err(ModelError::InvalidFormat("backoff must be in (0, 1]".into()));
        }
        if (bos as usize) >= vocab_size {
            return Err(ModelError::InvalidToken(bos));
        }

        let mut unigram = vec![0u32; vocab_size];
        let mut successors: HashMap<Vec<u32>, Successors> = HashMap::new();

        for (ids, count) in counts {
            if ids.is_empty() || ids.len() > order {
                return Err(ModelError::InvalidFormat(format!(
                    "n-gram length {} outside 1..={}",
                    ids.len(),
                    order
                )));
            }
            if let Some(&bad) = ids.iter().find(|&&id| (id as usize) >= vocab_size) {
                return Err(ModelError::InvalidToken(bad));
            }
            if ids[1..].contains(&bos) {
                return Err(ModelError::InvalidFormat(
                    "beginning-of-segment may only open an n-gram".into(),
                ));
            }
            if count == 0 {
                continue;
            }
            let (last, context) = match ids.split_last() {
                Some(split) => split,
                None => continue,
            };
            if context.is_empty() {
                unigram[*last as usize] = unigram[*last as usize].saturating_add(count);
                continue;
            }
            let entry = successors.entry(context.to_vec()).or_default();
            entry.total = entry.total.saturating_add(count);
            match entry.next.iter_mut().find(|(id, _)| id == last) {
                Some((_, c)) => *c = c.saturating_add(count),
                None => entry.next.push((*last, count)),
            }
        }

        let unigram_total = unigram.iter().map(|&c| u64::from(c)).sum();
        Ok(Self {
            model_id: model_id.into(),
            order,
            backoff,
            vocab_size,
            bos,
            unigram,
            unigram_total,
            successors,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

impl LanguageModel for NgramModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn next_log_probs(&self, context: &[u32]) -> Result<Vec<f32>, ModelError> {
        if let Some(&bad) = context.iter().find(|&&id| (id as usize) >= self.vocab_size) {
            return Err(ModelError::InvalidToken(bad));
        }

        let denom = (self.unigram_total + self.vocab_size as u64) as f32;
        let mut probs: Vec<f32> = self
            .unigram
            .iter()
            .map(|&c| (c as f32 + 1.0) / denom)
            .collect();

        let longest = (self.order - 1).min(context.len());
        for k in 1..=longest {
            let ctx = &context[context.len() - k..];
            let Some(seen) = self.successors.get(ctx) else { continue };
            if seen.total == 0 {
                continue;
            }
            for p in probs.iter_mut() {
                *p *= self.backoff;
            }
            for &(id, count) in &seen.next {
                probs[id as usize] = count as f32 / seen.total as f32;
            }
        }

        probs[self.bos as usize] = 0.0;
        let total: f32 = probs.iter().sum();
        if !(total > 0.0) {
            return Err(ModelError::Backend("degenerate distribution".into()));
        }
        Ok(probs
            .into_iter()
            .map(|p| if p > 0.0 { (p / total).ln() } else { f32::NEG_INFINITY })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        Tokenizer::from_pieces(["<s>", "</s>", "a", "b", "c"]).unwrap()
    }

    const MODEL: &str = r#"{
        "model_id": "tiny",
        "order": 2,
        "ngrams": [
            {"tokens": ["a"], "count": 4},
            {"tokens": ["b"], "count": 2},
            {"tokens": ["<s>", "a"], "count": 3},
            {"tokens": ["a", "b"], "count": 5},
            {"tokens": ["a", "c"], "count": 1}
        ]
    }"#;

    #[test]
    fn distribution_is_normalized() {
        let tok = tokenizer();
        let model = NgramModel::from_json(MODEL, &tok).unwrap();
        let lp = model.next_log_probs(&[0]).unwrap();
        let total: f32 = lp.iter().map(|p| p.exp()).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert_eq!(lp[0], f32::NEG_INFINITY);
    }

    #[test]
    fn context_shifts_mass() {
        let tok = tokenizer();
        let model = NgramModel::from_json(MODEL, &tok).unwrap();
        let after_a = model.next_log_probs(&[0, 2]).unwrap();
        assert!(after_a[3] > after_a[4]);
        assert!(after_a[3] > after_a[2]);
        let after_bos = model.next_log_probs(&[0]).unwrap();
        assert!(after_bos[2] > after_bos[3]);
    }

    #[test]
    fn unknown_piece_is_rejected() {
        let tok = tokenizer();
        let json = r#"{"order": 2, "ngrams": [{"tokens": ["zzz"], "count": 1}]}"#;
        assert!(matches!(
            NgramModel::from_json(json, &tok),
            Err(ModelError::UnknownPiece(_))
        ));
    }

    #[test]
    fn out_of_range_context_is_rejected() {
        let tok = tokenizer();
        let model = NgramModel::from_json(MODEL, &tok).unwrap();
        assert!(matches!(
            model.next_log_probs(&[0, 99]),
            Err(ModelError::InvalidToken(99))
        ));
    }

    #[test]
    fn overlong_ngram_is_rejected() {
        let tok = tokenizer();
        let json = r#"{"order": 1, "ngrams": [{"tokens": ["a", "b"], "count": 1}]}"#;
        assert!(NgramModel::from_json(json, &tok).is_err());
    }
}
