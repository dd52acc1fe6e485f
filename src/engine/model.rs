//! Language model seam used by the candidate generator.

use super::error::ModelError;

/// A next-token distribution provider.
///
/// Implementations are loaded once and shared read-only across requests, so
/// they must be `Send + Sync` and must not mutate themselves per call.
pub trait LanguageModel: Send + Sync {
    /// Short identifier used in logs.
    fn model_id(&self) -> &str;

    /// Number of entries in every distribution returned by `next_log_probs`.
    fn vocab_size(&self) -> usize;

    /// Natural-log probabilities of every vocabulary id following `context`.
    ///
    /// Impossible tokens are `f32::NEG_INFINITY`. The context starts with the
    /// beginning-of-segment id.
    fn next_log_probs(&self, context: &[u32]) -> Result<Vec<f32>, ModelError>;
}

/// Log-softmax over raw scores, in place. Scores of `-inf` stay impossible.
pub fn log_softmax(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let sum: f32 = scores.iter().map(|&s| (s - max).exp()).sum();
    let log_sum = sum.ln() + max;
    for s in scores.iter_mut() {
        *s -= log_sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_softmax_normalizes() {
        let mut scores = vec![1.0f32, 2.0, 3.0];
        log_softmax(&mut scores);
        let total: f32 = scores.iter().map(|s| s.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(scores[2] > scores[1] && scores[1] > scores[0]);
    }

    #[test]
    fn log_softmax_keeps_impossible_tokens() {
        let mut scores = vec![f32::NEG_INFINITY, 0.0, 0.0];
        log_softmax(&mut scores);
        assert_eq!(scores[0], f32::NEG_INFINITY);
        assert!((scores[1] - 0.5f32.ln()).abs() < 1e-5);
    }
}
