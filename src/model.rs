//! Boundary with the learned dynamics/prediction model.
//!
//! The search never looks inside latent states; it only hands the model
//! coordinates into the model's own store plus the action to unroll.

use crate::error::{check_len, Result};
use crate::node::LatentIndex;

/// Batched output of one recurrent inference call, aligned by leaf.
#[derive(Clone, Debug, Default)]
pub struct ModelOutput {
    /// Predicted value prefix at each new latent state
    pub value_prefixes: Vec<f32>,
    /// Predicted value at each new latent state
    pub values: Vec<f32>,
    /// Policy logits over the full action space
    pub policy_logits: Vec<Vec<f32>>,
    /// Whether the value prefix restarts below each new state
    pub is_reset: Vec<bool>,
}

impl ModelOutput {
    /// Check that every field carries exactly `n` entries.
    pub fn validate(&self, n: usize) -> Result<()> {
        check_len("model value_prefixes", n, self.value_prefixes.len())?;
        check_len("model values", n, self.values.len())?;
        check_len("model policy_logits", n, self.policy_logits.len())?;
        check_len("model is_reset", n, self.is_reset.len())
    }
}

/// A learned model that unrolls latent states one step.
pub trait RecurrentModel {
    /// Apply `actions[i]` to the latent state stored at `parents[i]`.
    ///
    /// The model must store the resulting states at
    /// `LatentIndex { x: latent_step, y: i }` so later cycles can refer
    /// to them.
    fn recurrent_inference(
        &mut self,
        latent_step: usize,
        parents: &[LatentIndex],
        actions: &[u16],
    ) -> Result<ModelOutput>;
}

impl<F> RecurrentModel for F
where
    F: FnMut(usize, &[LatentIndex], &[u16]) -> Result<ModelOutput>,
{
    fn recurrent_inference(
        &mut self,
        latent_step: usize,
        parents: &[LatentIndex],
        actions: &[u16],
    ) -> Result<ModelOutput> {
        self(latent_step, parents, actions)
    }
}
