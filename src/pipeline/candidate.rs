//! Candidate fills and their scored form.

use std::cmp::Ordering;

use crate::engine::Token;

/// A fill proposed by the generator, before morphological scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub surface_text: String,
    /// Tokens of the fill, byte ranges into `surface_text`.
    pub token_sequence: Vec<Token>,
    /// Natural-log probability the model assigns to the fill, including the
    /// join with the right context when one was scored.
    pub model_log_prob: f32,
}

impl Candidate {
    pub fn token_count(&self) -> usize {
        self.token_sequence.len()
    }
}

/// How the morphology check judged a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphFit {
    /// No analysis was available for any checked word.
    Unconstrained,
    /// Best analyses satisfied `satisfied` of `total` constraints.
    /// `unchecked` constraints belong to a side whose word had no analysis.
    Scored { satisfied: usize, unchecked: usize, total: usize },
}

/// A candidate with its final scores. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    candidate: Candidate,
    morph_score: f32,
    combined_score: f32,
    fit: MorphFit,
}

impl ScoredCandidate {
    pub(crate) fn new(
        candidate: Candidate,
        morph_score: f32,
        combined_score: f32,
        fit: MorphFit,
    ) -> Self {
        Self { candidate, morph_score, combined_score, fit }
    }

    pub fn surface_text(&self) -> &str {
        &self.candidate.surface_text
    }

    pub fn model_log_prob(&self) -> f32 {
        self.candidate.model_log_prob
    }

    pub fn morph_score(&self) -> f32 {
        self.morph_score
    }

    pub fn combined_score(&self) -> f32 {
        self.combined_score
    }

    pub fn fit(&self) -> MorphFit {
        self.fit
    }

    pub fn is_unconstrained(&self) -> bool {
        self.fit == MorphFit::Unconstrained
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    /// Ranking order: combined score desc, model log-prob desc, text asc.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .combined_score
            .total_cmp(&self.combined_score)
            .then_with(|| other.model_log_prob().total_cmp(&self.model_log_prob()))
            .then_with(|| self.surface_text().cmp(other.surface_text()))
    }
}
