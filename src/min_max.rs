//! Running min-max bounds used to rescale Q estimates into [0, 1].
//!
//! Value prefixes and bootstrapped values live on whatever scale the
//! environment's rewards use, while the exploration bonus does not. Each
//! root keeps its own bounds so UCB scores stay comparable within a tree.

/// Observed [min, max] range of Q values inside one search tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMaxStats {
    pub minimum: f32,
    pub maximum: f32,
    /// Smallest range used as the normalization denominator
    pub value_delta_max: f32,
}

impl MinMaxStats {
    /// Create empty bounds (`+inf`, `-inf`).
    pub fn new() -> Self {
        Self {
            minimum: f32::INFINITY,
            maximum: f32::NEG_INFINITY,
            value_delta_max: 0.0,
        }
    }

    pub fn set_delta(&mut self, value_delta_max: f32) {
        self.value_delta_max = value_delta_max;
    }

    /// Widen the bounds to include `value`.
    #[inline]
    pub fn update(&mut self, value: f32) {
        if value > self.maximum {
            self.maximum = value;
        }
        if value < self.minimum {
            self.minimum = value;
        }
    }

    /// Reset to the empty range, keeping `value_delta_max`.
    pub fn clear(&mut self) {
        self.minimum = f32::INFINITY;
        self.maximum = f32::NEG_INFINITY;
    }

    /// Map `value` onto the observed range.
    ///
    /// Returns `value` unchanged while the range is empty or degenerate.
    /// Values outside the observed range map outside [0, 1]; callers clamp.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let delta = self.maximum - self.minimum;
        if delta > 0.0 {
            (value - self.minimum) / delta.max(self.value_delta_max)
        } else {
            value
        }
    }

    /// Width of the observed range (negative infinity when empty).
    pub fn width(&self) -> f32 {
        self.maximum - self.minimum
    }
}

impl Default for MinMaxStats {
    fn default() -> Self {
        Self::new()
    }
}

/// One [`MinMaxStats`] per root, indexed in parallel with the roots.
#[derive(Clone, Debug, Default)]
pub struct MinMaxStatsList {
    pub stats: Vec<MinMaxStats>,
}

impl MinMaxStatsList {
    pub fn new(num: usize) -> Self {
        Self {
            stats: vec![MinMaxStats::new(); num],
        }
    }

    /// Set `value_delta_max` on every entry.
    pub fn set_delta(&mut self, value_delta_max: f32) {
        for s in &mut self.stats {
            s.set_delta(value_delta_max);
        }
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn get(&self, idx: usize) -> &MinMaxStats {
        &self.stats[idx]
    }
}
