//! Probability shaping and seeded draws for the sampling strategy.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use super::config::SamplingParams;

/// Turn log-probabilities into sampling weights over the tokens `allowed`
/// accepts: temperature, then top-k, then nucleus. Disallowed tokens get
/// zero weight before any cut, so top-k and top-p only rank allowed ones.
pub fn shape<F>(log_probs: &[f32], params: &SamplingParams, allowed: F) -> Vec<f32>
where
    F: Fn(u32) -> bool,
{
    let inv_t = 1.0 / params.temperature;
    let keep = |id: usize, lp: f32| lp.is_finite() && allowed(id as u32);
    let max = log_probs
        .iter()
        .enumerate()
        .filter(|&(id, &lp)| keep(id, lp))
        .map(|(_, &lp)| lp)
        .fold(f32::NEG_INFINITY, f32::max);

    let mut prs: Vec<f32> = log_probs
        .iter()
        .enumerate()
        .map(|(id, &lp)| if keep(id, lp) { ((lp - max) * inv_t).exp() } else { 0.0 })
        .collect();
    normalize(&mut prs);
    if params.top_k > 0 {
        apply_top_k(&mut prs, params.top_k);
    }
    apply_top_p(&mut prs, params.top_p);
    normalize(&mut prs);
    prs
}

/// Confidence spent by one step: `1 - (mass of the three likeliest tokens)^2`.
pub fn confidence_loss(prs: &[f32]) -> f32 {
    let mut top = [0.0f32; 3];
    for &p in prs {
        if p > top[2] {
            top[2] = p;
            top.sort_unstable_by(|a, b| b.total_cmp(a));
        }
    }
    let mass: f32 = top.iter().sum();
    1.0 - mass * mass
}

/// Draw one id from non-negative weights. None when every weight is zero.
pub fn sample(prs: &[f32], rng: &mut StdRng) -> Option<u32> {
    let distr = WeightedIndex::new(prs).ok()?;
    Some(distr.sample(rng) as u32)
}

fn normalize(prs: &mut [f32]) {
    let total: f32 = prs.iter().sum();
    if total > 0.0 {
        for p in prs.iter_mut() {
            *p /= total;
        }
    }
}

fn apply_top_k(prs: &mut [f32], top_k: usize) {
    if top_k >= prs.len() {
        return;
    }

    let mut argsort_indices = (0..prs.len()).collect::<Vec<_>>();
    argsort_indices.sort_unstable_by(|&i, &j| prs[j].total_cmp(&prs[i]).then(i.cmp(&j)));

    for index in argsort_indices.into_iter().skip(top_k) {
        prs[index] = 0.0;
    }
}

fn apply_top_p(prs: &mut [f32], top_p: f32) {
    if top_p <= 0.0 || top_p >= 1.0 {
        return;
    }

    let mut argsort_indices = (0..prs.len()).collect::<Vec<_>>();
    argsort_indices.sort_by(|&i, &j| prs[j].total_cmp(&prs[i]).then(i.cmp(&j)));

    let mut cumsum = 0.0;
    for index in argsort_indices {
        if cumsum >= top_p {
            prs[index] = 0.0;
        } else {
            cumsum += prs[index];
        }
    }
}
