//! Candidate generation: beam search and seeded sampling over the model.
//!
//! The model sees `<s>` followed by the left context. Fills never contain the
//! reserved markers. When a right context is known, a finished fill is scored
//! by how well it joins that context; otherwise a fill ends on `</s>` or at
//! the token cap. Generation is all-or-nothing: a model fault or a cancelled
//! token discards every partial beam.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use super::config::{GenerationConfig, SearchStrategy};
use super::error::{GenerationError, ModelError};
use super::model::LanguageModel;
use super::sampling;
use super::tokenizer::Tokenizer;
use crate::pipeline::Candidate;

/// Minimum per-beam expansion fan-out.
const MIN_EXPANSION: usize = 4;

/// What the generator fills in between.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfillContext<'a> {
    /// Left context ids, without the beginning-of-segment marker.
    pub left: &'a [u32],
    /// Right context ids. Empty means "predict the continuation".
    pub right: &'a [u32],
    /// Text every fill must start with.
    pub prefix: &'a str,
}

#[derive(Debug, Clone)]
struct Beam {
    ids: Vec<u32>,
    score: f32,
    /// Bytes of the prefix already spelled by `ids`.
    consumed: usize,
}

/// Produces candidate fills for one request.
pub struct CandidateGenerator<'a> {
    model: &'a dyn LanguageModel,
    tokenizer: &'a Tokenizer,
    config: &'a GenerationConfig,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        tokenizer: &'a Tokenizer,
        config: &'a GenerationConfig,
    ) -> Self {
        Self { model, tokenizer, config }
    }

    /// Generate at most `max_candidates` distinct fills, best model score
    /// first. Returns fewer when the search finds fewer; never pads.
    pub fn generate(
        &self,
        input: &InfillContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, GenerationError> {
        self.config.validate()?;
        let finished = match self.config.strategy {
            SearchStrategy::Beam => self.beam_search(input, cancel)?,
            SearchStrategy::Sample => self.sample_fills(input, cancel)?,
        };
        self.into_candidates(finished)
    }

    fn beam_search(
        &self,
        input: &InfillContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, (Vec<u32>, f32)>, GenerationError> {
        let beam_width = self.config.beam_width;
        let max_tokens = self.config.max_candidate_tokens;
        let expand_k = beam_width.max(MIN_EXPANSION);

        let mut finished: HashMap<String, (Vec<u32>, f32)> = HashMap::new();
        let mut active = vec![Beam { ids: Vec::new(), score: 0.0, consumed: 0 }];

        for _step in 0..=max_tokens {
            if active.is_empty() {
                break;
            }

            if finished.len() >= beam_width {
                let mut scores: Vec<f32> = finished.values().map(|(_, s)| *s).collect();
                scores.sort_unstable_by(|a, b| b.total_cmp(a));
                let kth_finished = scores[beam_width - 1];
                let best_active = active
                    .iter()
                    .map(|b| b.score)
                    .fold(f32::NEG_INFINITY, f32::max);
                if kth_finished > best_active {
                    break;
                }
            }

            let mut expansions: Vec<Beam> = Vec::new();
            for beam in &active {
                let log_probs = self.next_log_probs(input.left, &beam.ids, cancel)?;
                let complete = !beam.ids.is_empty() && beam.consumed == input.prefix.len();

                if beam.ids.len() == max_tokens {
                    if complete {
                        let score = if input.right.is_empty() {
                            Some(beam.score)
                        } else {
                            self.meet_score(input, &beam.ids, &log_probs, cancel)?
                                .map(|meet| beam.score + meet)
                        };
                        if let Some(score) = score {
                            self.record(&mut finished, &beam.ids, score)?;
                        }
                    }
                    continue;
                }

                if complete {
                    let finish = if input.right.is_empty() {
                        Some(log_probs[self.tokenizer.eos_token() as usize])
                    } else {
                        self.meet_score(input, &beam.ids, &log_probs, cancel)?
                    };
                    if let Some(finish) = finish.filter(|s| s.is_finite()) {
                        self.record(&mut finished, &beam.ids, beam.score + finish)?;
                    }
                }

                for (id, lp, consumed) in
                    self.allowed_expansions(&log_probs, input.prefix, beam.consumed, expand_k)
                {
                    let mut ids = beam.ids.clone();
                    ids.push(id);
                    expansions.push(Beam { ids, score: beam.score + lp, consumed });
                }
            }

            expansions.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.ids.cmp(&b.ids)));
            expansions.truncate(beam_width);
            active = expansions;
        }

        Ok(finished)
    }

    fn sample_fills(
        &self,
        input: &InfillContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, (Vec<u32>, f32)>, GenerationError> {
        let params = &self.config.sampling;
        let eos = self.tokenizer.eos_token();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut finished: HashMap<String, (Vec<u32>, f32)> = HashMap::new();

        for _ in 0..self.config.beam_width {
            let mut beam = Beam { ids: Vec::new(), score: 0.0, consumed: 0 };
            let mut budget = params.confidence_budget;

            while beam.ids.len() < self.config.max_candidate_tokens {
                let log_probs = self.next_log_probs(input.left, &beam.ids, cancel)?;
                let complete = !beam.ids.is_empty() && beam.consumed == input.prefix.len();

                let weights = sampling::shape(&log_probs, params, |id| {
                    if self.tokenizer.is_special(id) {
                        return complete && id == eos;
                    }
                    self.advance_prefix(id, input.prefix, beam.consumed).is_some()
                });

                if let Some(remaining) = budget.as_mut() {
                    *remaining -= sampling::confidence_loss(&weights);
                    if *remaining < 0.0 {
                        break;
                    }
                }

                let Some(id) = sampling::sample(&weights, &mut rng) else { break };
                if id == eos {
                    break;
                }
                if complete && input.right.first() == Some(&id) {
                    break;
                }
                let Some(consumed) = self.advance_prefix(id, input.prefix, beam.consumed) else {
                    break;
                };
                beam.ids.push(id);
                beam.score += log_probs[id as usize];
                beam.consumed = consumed;
            }

            if !beam.ids.is_empty() && beam.consumed == input.prefix.len() {
                self.record(&mut finished, &beam.ids, beam.score)?;
            }
        }

        Ok(finished)
    }

    /// Log-probability of the first `lookahead` right-context tokens after
    /// the fill. `first` is the distribution right after the fill.
    fn meet_score(
        &self,
        input: &InfillContext<'_>,
        fill: &[u32],
        first: &[f32],
        cancel: &CancellationToken,
    ) -> Result<Option<f32>, GenerationError> {
        let lookahead = self.config.right_context_lookahead.clamp(1, input.right.len());
        let mut total = first[input.right[0] as usize];
        let mut joined = fill.to_vec();
        for j in 1..lookahead {
            if !total.is_finite() {
                break;
            }
            joined.push(input.right[j - 1]);
            let log_probs = self.next_log_probs(input.left, &joined, cancel)?;
            total += log_probs[input.right[j] as usize];
        }
        Ok(total.is_finite().then_some(total))
    }

    /// Top `k` tokens a beam may extend with, as (id, log-prob, consumed).
    fn allowed_expansions(
        &self,
        log_probs: &[f32],
        prefix: &str,
        consumed: usize,
        k: usize,
    ) -> Vec<(u32, f32, usize)> {
        let mut allowed: Vec<(u32, f32, usize)> = log_probs
            .iter()
            .enumerate()
            .filter(|(_, lp)| lp.is_finite())
            .map(|(id, &lp)| (id as u32, lp))
            .filter(|(id, _)| !self.tokenizer.is_special(*id))
            .filter_map(|(id, lp)| {
                self.advance_prefix(id, prefix, consumed).map(|c| (id, lp, c))
            })
            .collect();

        let by_score = |a: &(u32, f32, usize), b: &(u32, f32, usize)| -> Ordering {
            b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
        };
        if allowed.len() > k {
            allowed.select_nth_unstable_by(k - 1, by_score);
            allowed.truncate(k);
        }
        allowed.sort_unstable_by(by_score);
        allowed
    }

    /// Prefix bytes consumed after appending `id`, or None when the piece
    /// contradicts the unconsumed prefix.
    fn advance_prefix(&self, id: u32, prefix: &str, consumed: usize) -> Option<usize> {
        let piece = self.tokenizer.piece(id)?;
        let remaining = &prefix[consumed..];
        if remaining.is_empty() || piece.starts_with(remaining) {
            Some(prefix.len())
        } else if remaining.starts_with(piece) {
            Some(consumed + piece.len())
        } else {
            None
        }
    }

    fn next_log_probs(
        &self,
        left: &[u32],
        fill: &[u32],
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let mut context = Vec::with_capacity(left.len() + fill.len() + 1);
        context.push(self.tokenizer.bos_token());
        context.extend_from_slice(left);
        context.extend_from_slice(fill);

        let log_probs = self.model.next_log_probs(&context)?;
        if log_probs.len() != self.tokenizer.vocab_size() {
            return Err(ModelError::Backend(format!(
                "distribution has {} entries, vocabulary has {}",
                log_probs.len(),
                self.tokenizer.vocab_size()
            ))
            .into());
        }
        Ok(log_probs)
    }

    /// Keep the best-scoring id sequence per surface text.
    fn record(
        &self,
        finished: &mut HashMap<String, (Vec<u32>, f32)>,
        ids: &[u32],
        score: f32,
    ) -> Result<(), GenerationError> {
        let text = self.tokenizer.decode(ids)?;
        match finished.get_mut(&text) {
            Some(best) if best.1 >= score => {}
            Some(best) => *best = (ids.to_vec(), score),
            None => {
                finished.insert(text, (ids.to_vec(), score));
            }
        }
        Ok(())
    }

    fn into_candidates(
        &self,
        finished: HashMap<String, (Vec<u32>, f32)>,
    ) -> Result<Vec<Candidate>, GenerationError> {
        let mut candidates = finished
            .into_iter()
            .map(|(surface_text, (ids, score))| {
                Ok(Candidate {
                    token_sequence: self.tokenizer.tokens_for_ids(&ids)?,
                    surface_text,
                    model_log_prob: score,
                })
            })
            .collect::<Result<Vec<_>, GenerationError>>()?;

        candidates.sort_by(|a, b| {
            b.model_log_prob
                .total_cmp(&a.model_log_prob)
                .then_with(|| a.surface_text.cmp(&b.surface_text))
        });
        candidates.truncate(self.config.max_candidates);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::SamplingParams;

    // ids: 0 <unk>, 1 <s>, 2 </s>, 3 " a", 4 " b", 5 "c", 6 "."
    fn tokenizer() -> Tokenizer {
        Tokenizer::from_pieces(["<unk>", "<s>", "</s>", " a", " b", "c", "."]).unwrap()
    }

    /// Bigram table keyed on the last context token.
    struct TableModel;

    impl LanguageModel for TableModel {
        fn model_id(&self) -> &str {
            "table"
        }

        fn vocab_size(&self) -> usize {
            7
        }

        fn next_log_probs(&self, context: &[u32]) -> Result<Vec<f32>, ModelError> {
            let table: &[(u32, f32)] = match context.last() {
                Some(1) => &[(0, 0.05), (3, 0.6), (4, 0.3), (5, 0.05)],
                Some(3) => &[(2, 0.2), (5, 0.1), (6, 0.7)],
                Some(4) => &[(2, 0.9), (6, 0.1)],
                _ => &[(2, 1.0)],
            };
            let mut lp = vec![f32::NEG_INFINITY; 7];
            for &(id, p) in table {
                lp[id as usize] = p.ln();
            }
            Ok(lp)
        }
    }

    struct FailingModel;

    impl LanguageModel for FailingModel {
        fn model_id(&self) -> &str {
            "failing"
        }

        fn vocab_size(&self) -> usize {
            7
        }

        fn next_log_probs(&self, _context: &[u32]) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::Backend("device lost".into()))
        }
    }

    fn config(max_tokens: usize) -> GenerationConfig {
        GenerationConfig {
            beam_width: 4,
            max_candidate_tokens: max_tokens,
            max_candidates: 5,
            ..Default::default()
        }
    }

    fn texts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.surface_text.as_str()).collect()
    }

    #[test]
    fn beam_ranks_by_model_probability() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let out = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();

        assert_eq!(texts(&out), vec![" a.", " b", " a", " ac", "c"]);
        assert!((out[0].model_log_prob - 0.42f32.ln()).abs() < 1e-4);
        assert_eq!(out[0].token_count(), 2);
    }

    #[test]
    fn beam_is_deterministic() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let a = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();
        let b = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_marker_is_never_emitted() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let out = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();
        assert!(out.iter().all(|c| c.token_sequence.iter().all(|t| t.model_id != 0)));
    }

    #[test]
    fn right_context_scores_the_join() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let input = InfillContext { right: &[6], ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();

        // Only fills the model lets continue with "." survive; nothing is padded.
        assert_eq!(texts(&out), vec![" a", " b"]);
        assert!((out[0].model_log_prob - 0.42f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn token_cap_finishes_open_beams() {
        let tok = tokenizer();
        let config = config(1);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let out = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();

        assert_eq!(texts(&out), vec![" a", " b", "c"]);
        assert!((out[0].model_log_prob - 0.6f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn prefix_restricts_fills() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);

        let input = InfillContext { prefix: " b", ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();
        assert_eq!(texts(&out), vec![" b", " b."]);

        let input = InfillContext { prefix: " ", ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();
        assert!(out.iter().all(|c| c.surface_text.starts_with(' ')));
        assert!(!out.is_empty());
    }

    #[test]
    fn cancelled_token_discards_everything() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gen.generate(&InfillContext::default(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn model_fault_fails_generation() {
        let tok = tokenizer();
        let config = config(3);
        let gen = CandidateGenerator::new(&FailingModel, &tok, &config);
        let err = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, GenerationError::Model(ModelError::Backend(_))));
    }

    #[test]
    fn sampling_repeats_for_a_seed() {
        let tok = tokenizer();
        let config = GenerationConfig {
            strategy: SearchStrategy::Sample,
            sampling: SamplingParams { seed: 7, ..Default::default() },
            ..config(3)
        };
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let a = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();
        let b = gen.generate(&InfillContext::default(), &CancellationToken::new()).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.iter().all(|c| !c.surface_text.is_empty()));
        assert!(a.iter().all(|c| c.token_sequence.iter().all(|t| t.model_id != 0)));
    }

    #[test]
    fn sampling_ranks_only_tokens_matching_the_prefix() {
        let tok = tokenizer();
        let config = GenerationConfig {
            strategy: SearchStrategy::Sample,
            sampling: SamplingParams { top_k: 1, ..Default::default() },
            ..config(3)
        };
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let input = InfillContext { prefix: " b", ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();
        assert_eq!(texts(&out), vec![" b"]);
    }

    #[test]
    fn confidence_budget_counts_only_allowed_tokens() {
        let tok = tokenizer();
        let config = GenerationConfig {
            strategy: SearchStrategy::Sample,
            sampling: SamplingParams {
                top_k: 0,
                confidence_budget: Some(0.5),
                ..Default::default()
            },
            ..config(3)
        };
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let input = InfillContext { prefix: " b", ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();
        assert!(!out.is_empty());
        assert!(out.iter().all(|c| c.surface_text.starts_with(" b")));
    }

    #[test]
    fn sampling_stops_before_right_context() {
        let tok = tokenizer();
        let config = GenerationConfig {
            strategy: SearchStrategy::Sample,
            beam_width: 16,
            ..config(3)
        };
        let gen = CandidateGenerator::new(&TableModel, &tok, &config);
        let input = InfillContext { right: &[6], ..Default::default() };
        let out = gen.generate(&input, &CancellationToken::new()).unwrap();
        assert!(out.iter().all(|c| !c.surface_text.contains('.')));
    }
}
