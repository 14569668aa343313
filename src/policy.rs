//! Turning root visit counts into an action.

use rand::Rng;

use crate::math::{argmax_first, entropy_bits, sample_categorical};

/// Visit distribution sharpened (or flattened) by a temperature.
///
/// `temperature <= 0` yields a one-hot distribution on the most visited
/// action. All-zero visit counts yield the uniform distribution.
pub fn visit_count_distribution(visit_counts: &[u32], temperature: f32) -> Vec<f32> {
    let n = visit_counts.len();
    let max = visit_counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![1.0 / n as f32; n];
    }

    if temperature <= 0.0 {
        let mut probs = vec![0.0; n];
        if let Some(best) = argmax_first(visit_counts) {
            probs[best] = 1.0;
        }
        return probs;
    }

    // Scale by the max first so large counts and small temperatures don't overflow
    let exponent = 1.0 / temperature;
    let mut probs: Vec<f32> = visit_counts
        .iter()
        .map(|&v| (v as f32 / max as f32).powf(exponent))
        .collect();
    let sum: f32 = probs.iter().sum();
    for p in probs.iter_mut() {
        *p /= sum;
    }
    probs
}

/// Select an action position from root visit counts.
///
/// Returns the chosen index into `visit_counts` and the entropy (bits) of
/// the temperature-adjusted distribution, or `None` when there is nothing
/// to choose from.
///
/// # Arguments
/// * `visit_counts` - Visit counts of the root's children
/// * `temperature` - Sharpening temperature for sampling
/// * `deterministic` - Pick the most visited action instead of sampling
/// * `rng` - Random number generator used when sampling
pub fn select_action<R: Rng>(
    visit_counts: &[u32],
    temperature: f32,
    deterministic: bool,
    rng: &mut R,
) -> Option<(usize, f32)> {
    if visit_counts.is_empty() {
        return None;
    }

    let probs = visit_count_distribution(visit_counts, temperature);
    let action_pos = if deterministic {
        argmax_first(visit_counts)?
    } else {
        sample_categorical(&probs, rng.gen::<f32>())
    };

    Some((action_pos, entropy_bits(&probs)))
}

/// Entropy (bits) of the uniform distribution over `action_space` actions.
pub fn max_entropy(action_space: usize) -> f32 {
    if action_space == 0 {
        0.0
    } else {
        (action_space as f32).log2()
    }
}
