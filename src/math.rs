//! Mathematical utilities for tree search.

/// Compute softmax of a slice in-place.
///
/// Modifies the input slice to contain softmax probabilities.
pub fn softmax_inplace(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }

    // Find max for numerical stability
    let max_val = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max_val).exp();
        sum += *v;
    }

    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Sample from a categorical distribution.
///
/// # Arguments
/// * `probs` - Probability distribution (must sum to ~1.0)
/// * `rand_val` - Random value in [0, 1)
///
/// Returns the index of the sampled element.
pub fn sample_categorical(probs: &[f32], rand_val: f32) -> usize {
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if rand_val < cumsum {
            return i;
        }
    }
    // Fallback to last element (handles floating point errors)
    probs.len().saturating_sub(1)
}

/// Shannon entropy in bits. Zero-probability entries contribute nothing.
pub fn entropy_bits(probs: &[f32]) -> f32 {
    probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum()
}

/// Index of the largest element, preferring the lowest index on ties.
pub fn argmax_first<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
