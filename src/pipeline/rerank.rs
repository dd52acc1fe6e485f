//! Morphology filter and reranker.
//!
//! Scores every candidate once against the request's constraint set, fuses
//! the morphology score with the normalised model score, drops candidates
//! that break every constraint, and sorts the rest.

use serde::{Deserialize, Serialize};

use super::candidate::{Candidate, MorphFit, ScoredCandidate};
use crate::engine::{WordSegmenter, WordSpan};
use crate::morph::{ConstraintSet, MorphOracle, Side};

/// Morphology score given to candidates with no analysis.
pub const UNCONSTRAINED_SCORE: f32 = 0.5;

/// How model log-probabilities are mapped into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Min-max over the batch. An all-equal batch maps to 1.0.
    #[default]
    MinMax,
    /// `exp(log_prob / tokens)`, independent of the batch.
    TokenMean,
}

/// Score fusion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub weight_model: f32,
    pub weight_morph: f32,
    pub normalization: ScoreNormalization,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            weight_model: 0.4,
            weight_morph: 1.0,
            normalization: ScoreNormalization::MinMax,
        }
    }
}

impl RerankConfig {
    /// True when a fully agreeing candidate always outranks an unconstrained
    /// one, whatever the model scores.
    pub fn agreement_dominates(&self) -> bool {
        UNCONSTRAINED_SCORE * self.weight_morph > self.weight_model
    }
}

/// Result of one rerank pass.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub ranked: Vec<ScoredCandidate>,
    /// Candidates removed for satisfying no constraint.
    pub dropped: usize,
}

/// Per-request reranker over shared read-only resources.
pub struct Reranker<'a> {
    oracle: &'a MorphOracle,
    segmenter: &'a WordSegmenter,
    config: &'a RerankConfig,
}

impl<'a> Reranker<'a> {
    pub fn new(
        oracle: &'a MorphOracle,
        segmenter: &'a WordSegmenter,
        config: &'a RerankConfig,
    ) -> Self {
        Self { oracle, segmenter, config }
    }

    pub fn rerank(&self, candidates: Vec<Candidate>, constraints: &ConstraintSet) -> RerankOutcome {
        // Scores are final here; filtering below never revisits them.
        let scored = self.score(candidates, constraints);

        let any_agreeing = scored.iter().any(|c| c.morph_score() > 0.0);
        let before = scored.len();
        let mut ranked: Vec<ScoredCandidate> = if !constraints.is_empty() && any_agreeing {
            scored.into_iter().filter(|c| c.morph_score() > 0.0).collect()
        } else {
            scored
        };
        let dropped = before - ranked.len();

        ranked.sort_by(ScoredCandidate::ranking_cmp);
        RerankOutcome { ranked, dropped }
    }

    /// Score every candidate against the batch, in input order, without
    /// dropping anything.
    pub fn score(
        &self,
        candidates: Vec<Candidate>,
        constraints: &ConstraintSet,
    ) -> Vec<ScoredCandidate> {
        let fits: Vec<MorphFit> =
            candidates.iter().map(|c| self.morph_fit(&c.surface_text, constraints)).collect();
        let normalized = self.normalize(&candidates);

        candidates
            .into_iter()
            .zip(fits)
            .zip(normalized)
            .map(|((candidate, fit), norm)| {
                let morph = morph_score(fit);
                let combined = norm * self.config.weight_model + morph * self.config.weight_morph;
                ScoredCandidate::new(candidate, morph, combined, fit)
            })
            .collect()
    }

    /// Check the fill's first word against left-sourced constraints and its
    /// last word against right-sourced ones. A side whose word has no
    /// analysis stays unchecked; the fill is unconstrained only when every
    /// checked word is unknown.
    fn morph_fit(&self, surface: &str, constraints: &ConstraintSet) -> MorphFit {
        let words = self.segmenter.segment(surface);
        let (Some(first), Some(last)) = (words.first(), words.last()) else {
            return MorphFit::Unconstrained;
        };
        let first_readings = self.oracle.analyze(&first.text);
        let total = constraints.len();

        if constraints.is_empty() || same_word(first, last) {
            if first_readings.is_empty() {
                return MorphFit::Unconstrained;
            }
            let satisfied = first_readings
                .iter()
                .map(|a| constraints.iter().filter(|c| c.satisfied_by(a)).count())
                .max()
                .unwrap_or(0);
            return MorphFit::Scored { satisfied, unchecked: 0, total };
        }

        let last_readings = self.oracle.analyze(&last.text);
        let mut satisfied = 0;
        let mut unchecked = 0;
        for (side, readings) in [(Side::Left, first_readings), (Side::Right, last_readings)] {
            let on_side = constraints.iter().filter(|c| c.side == side).count();
            if on_side == 0 {
                continue;
            }
            if readings.is_empty() {
                unchecked += on_side;
            } else {
                satisfied += constraints.best_satisfied(side, readings);
            }
        }

        if unchecked == total {
            MorphFit::Unconstrained
        } else {
            MorphFit::Scored { satisfied, unchecked, total }
        }
    }

    fn normalize(&self, candidates: &[Candidate]) -> Vec<f32> {
        match self.config.normalization {
            ScoreNormalization::MinMax => {
                let (min, max) = candidates.iter().fold(
                    (f32::INFINITY, f32::NEG_INFINITY),
                    |(lo, hi), c| (lo.min(c.model_log_prob), hi.max(c.model_log_prob)),
                );
                let range = max - min;
                candidates
                    .iter()
                    .map(|c| {
                        if range > f32::EPSILON {
                            (c.model_log_prob - min) / range
                        } else {
                            1.0
                        }
                    })
                    .collect()
            }
            ScoreNormalization::TokenMean => candidates
                .iter()
                .map(|c| (c.model_log_prob / c.token_count().max(1) as f32).exp())
                .collect(),
        }
    }
}

fn same_word(a: &WordSpan, b: &WordSpan) -> bool {
    a.byte_range == b.byte_range
}

fn morph_score(fit: MorphFit) -> f32 {
    match fit {
        MorphFit::Unconstrained => UNCONSTRAINED_SCORE,
        MorphFit::Scored { total: 0, .. } => 1.0,
        MorphFit::Scored { satisfied, unchecked, total } => {
            (satisfied as f32 + UNCONSTRAINED_SCORE * unchecked as f32) / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::Dictionary;

    fn oracle() -> MorphOracle {
        MorphOracle::new(
            Dictionary::parse(concat!(
                "velký\tvelkou\tADJ;ACC;SG;FEM\n",
                "kniha\tknihu\tN;ACC;SG;FEM\n",
                "kniha\tkniha\tN;NOM;SG;FEM\n",
                "stůl\tstůl\tN;NOM;SG;MASC\n",
                "stůl\tstoly\tN;NOM;PL;MASC\n",
                "stůl\tstolům\tN;DAT;PL;MASC\n",
            ))
            .unwrap(),
        )
    }

    fn candidate(text: &str, log_prob: f32) -> Candidate {
        Candidate {
            surface_text: text.to_string(),
            token_sequence: Vec::new(),
            model_log_prob: log_prob,
        }
    }

    fn rerank(candidates: Vec<Candidate>, preceding: &[&str]) -> RerankOutcome {
        let oracle = oracle();
        let segmenter = WordSegmenter::new().unwrap();
        let config = RerankConfig::default();
        let constraints = ConstraintSet::derive(&oracle, preceding, None);
        Reranker::new(&oracle, &segmenter, &config).rerank(candidates, &constraints)
    }

    #[test]
    fn full_agreement_outranks_slightly_likelier_partial() {
        let out = rerank(
            vec![candidate(" kniha", -0.5), candidate(" knihu", -1.0), candidate(" stoly", -2.0)],
            &["velkou"],
        );
        let order: Vec<&str> = out.ranked.iter().map(|c| c.surface_text()).collect();
        assert_eq!(order, vec![" knihu", " kniha"]);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.ranked[0].morph_score(), 1.0);
        assert!((out.ranked[1].morph_score() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(out.ranked[1].fit(), MorphFit::Scored { satisfied: 2, unchecked: 0, total: 3 });
    }

    #[test]
    fn oov_is_kept_unconstrained() {
        let out = rerank(vec![candidate(" knihu", -1.0), candidate(" zork", -0.1)], &["velkou"]);
        let zork = out.ranked.iter().find(|c| c.surface_text() == " zork").unwrap();
        assert!(zork.is_unconstrained());
        assert_eq!(zork.morph_score(), UNCONSTRAINED_SCORE);
        assert_eq!(out.ranked[0].surface_text(), " knihu");
    }

    #[test]
    fn punctuation_only_fill_is_unconstrained() {
        let out = rerank(vec![candidate(".", -1.0)], &["velkou"]);
        assert!(out.ranked[0].is_unconstrained());
    }

    #[test]
    fn nothing_dropped_when_nobody_agrees() {
        let out = rerank(vec![candidate(" stoly", -1.0), candidate(" stolům", -2.0)], &["velkou"]);
        assert_eq!(out.dropped, 0);
        assert_eq!(out.ranked.len(), 2);
        assert_eq!(out.ranked[0].surface_text(), " stoly");
    }

    #[test]
    fn no_constraints_scores_known_words_fully() {
        let out = rerank(vec![candidate(" stůl", -1.0), candidate(" knihu", -1.0)], &[]);
        assert!(out.ranked.iter().all(|c| c.morph_score() == 1.0));
        // Equal model scores: min-max maps both to 1.0, text breaks the tie.
        assert_eq!(out.ranked[0].surface_text(), " knihu");
        assert!((out.ranked[0].combined_score() - 1.4).abs() < 1e-6);
    }

    #[test]
    fn token_mean_is_batch_independent() {
        let oracle = oracle();
        let segmenter = WordSegmenter::new().unwrap();
        let config = RerankConfig {
            normalization: ScoreNormalization::TokenMean,
            ..Default::default()
        };
        let reranker = Reranker::new(&oracle, &segmenter, &config);
        let single = reranker.rerank(vec![candidate(" knihu", -1.0)], &ConstraintSet::default());
        let pair = reranker.rerank(
            vec![candidate(" knihu", -1.0), candidate(" stůl", -9.0)],
            &ConstraintSet::default(),
        );
        let find = |out: &RerankOutcome| {
            out.ranked
                .iter()
                .find(|c| c.surface_text() == " knihu")
                .map(|c| c.combined_score())
                .unwrap()
        };
        assert_eq!(find(&single), find(&pair));
    }

    fn english_oracle() -> MorphOracle {
        MorphOracle::new(
            Dictionary::parse(concat!(
                "to\tto\tADP;ACC\n",
                "book\tbook\tN;NOM;SG\n",
                "book\tbook\tN;ACC;SG\n",
                "she\tshe\tPRO;NOM;3;SG;FEM\n",
                "he\thim\tPRO;ACC;3;SG;MASC\n",
                "we\tour\tPRO;GEN;1;PL\n",
            ))
            .unwrap(),
        )
    }

    fn rerank_english(candidates: Vec<Candidate>) -> RerankOutcome {
        let oracle = english_oracle();
        let segmenter = WordSegmenter::new().unwrap();
        let config = RerankConfig::default();
        let constraints = ConstraintSet::derive(&oracle, &["book", "to"], Some("book"));
        assert!(constraints.has_side(Side::Left) && constraints.has_side(Side::Right));
        Reranker::new(&oracle, &segmenter, &config).rerank(candidates, &constraints)
    }

    fn find<'a>(out: &'a RerankOutcome, text: &str) -> &'a ScoredCandidate {
        out.ranked.iter().find(|c| c.surface_text() == text).unwrap()
    }

    #[test]
    fn known_side_is_scored_when_other_side_is_oov() {
        let out = rerank_english(vec![
            candidate(" she zork", -1.0),
            candidate(" him zork", -1.0),
            candidate(" zork zork", -1.0),
        ]);

        let she = find(&out, " she zork");
        assert!(!she.is_unconstrained());
        assert_eq!(she.fit(), MorphFit::Scored { satisfied: 0, unchecked: 2, total: 3 });
        assert!((she.morph_score() - 1.0 / 3.0).abs() < 1e-6);

        let him = find(&out, " him zork");
        assert_eq!(him.fit(), MorphFit::Scored { satisfied: 1, unchecked: 2, total: 3 });
        assert!(him.morph_score() > she.morph_score());
        assert!(him.morph_score() < 1.0);

        let unknown = find(&out, " zork zork");
        assert!(unknown.is_unconstrained());
        assert_eq!(unknown.morph_score(), UNCONSTRAINED_SCORE);
    }

    #[test]
    fn known_violation_on_both_sides_is_dropped() {
        let out = rerank_english(vec![candidate(" our our", -0.1), candidate(" him book", -2.0)]);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.ranked.len(), 1);
        assert_eq!(out.ranked[0].surface_text(), " him book");
        assert_eq!(out.ranked[0].morph_score(), 1.0);
    }

    #[test]
    fn dropping_never_changes_surviving_scores() {
        let oracle = oracle();
        let segmenter = WordSegmenter::new().unwrap();
        let config = RerankConfig::default();
        let constraints = ConstraintSet::derive(&oracle, &["velkou"], None);
        let reranker = Reranker::new(&oracle, &segmenter, &config);
        let batch = vec![
            candidate(" stoly", -0.2),
            candidate(" kniha", -0.5),
            candidate(" knihu", -1.0),
            candidate(" zork", -1.5),
            candidate(" stolům", -3.0),
        ];

        let all = reranker.score(batch.clone(), &constraints);
        let out = reranker.rerank(batch, &constraints);
        assert_eq!(out.dropped, 2);
        for survivor in &out.ranked {
            let before = all.iter().find(|c| c.surface_text() == survivor.surface_text()).unwrap();
            assert_eq!(before.combined_score(), survivor.combined_score());
            assert_eq!(before.morph_score(), survivor.morph_score());
        }
    }

    #[test]
    fn default_weights_let_agreement_dominate() {
        assert!(RerankConfig::default().agreement_dominates());
        let skewed = RerankConfig { weight_model: 2.0, ..Default::default() };
        assert!(!skewed.agreement_dominates());
    }
}
