//! The batch of independent search trees handed to the driver.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::error::{check_len, MctsError, Result};
use crate::node::{LatentIndex, Node};
use crate::tree::{TreeArena, ROOT};

/// Estimated nodes per tree, used to size each arena up front.
const ARENA_CAPACITY: usize = 1024;

/// Source of epoch stamps, unique across every `Roots` in the process.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// A batch of root nodes plus their legal actions.
///
/// Each root owns its own arena; no tree references another. Trees are
/// reused across searches: [`Roots::clear`] empties them without
/// releasing their memory.
#[derive(Debug)]
pub struct Roots {
    arenas: Vec<TreeArena>,
    /// Renewed whenever existing node indices stop being meaningful
    epoch: u64,
}

impl Roots {
    /// Create one unexpanded root per legal-action set.
    pub fn new(legal_actions_list: Vec<Vec<u16>>) -> Self {
        let arenas = legal_actions_list
            .into_iter()
            .enumerate()
            .map(|(i, legal)| TreeArena::new(i, legal, ARENA_CAPACITY))
            .collect();
        Self {
            arenas,
            epoch: next_epoch(),
        }
    }

    /// Number of roots in the batch.
    pub fn root_num(&self) -> usize {
        self.arenas.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Expand every root and mix exploration noise into its priors.
    ///
    /// # Arguments
    /// * `root_noise_weight` - Fraction of each prior replaced by noise
    /// * `noises` - One sample per legal action, per root
    /// * `value_prefixes` - Predicted value prefix at each root
    /// * `policies` - Policy logits over the full action space, per root
    /// * `to_play` - Mover at each root
    pub fn prepare(
        &mut self,
        root_noise_weight: f32,
        noises: &[Vec<f32>],
        value_prefixes: &[f32],
        policies: &[Vec<f32>],
        to_play: &[i8],
    ) -> Result<()> {
        check_len("noises", self.root_num(), noises.len())?;
        for (arena, noise) in self.arenas.iter().zip(noises.iter()) {
            check_len("noises per root", arena.legal_actions().len(), noise.len())?;
        }

        self.prepare_no_noise(value_prefixes, policies, to_play)?;

        for (arena, noise) in self.arenas.iter_mut().zip(noises.iter()) {
            arena.add_exploration_noise(ROOT, root_noise_weight, noise)?;
        }
        Ok(())
    }

    /// Expand every root from the model's initial inference.
    pub fn prepare_no_noise(
        &mut self,
        value_prefixes: &[f32],
        policies: &[Vec<f32>],
        to_play: &[i8],
    ) -> Result<()> {
        let n = self.root_num();
        check_len("value_prefixes", n, value_prefixes.len())?;
        check_len("policies", n, policies.len())?;
        check_len("to_play", n, to_play.len())?;

        // Validate everything first so a bad root leaves the batch untouched
        for (arena, policy) in self.arenas.iter().zip(policies.iter()) {
            if arena.root().expanded() {
                return Err(MctsError::AlreadyExpanded {
                    root: arena.tree_idx(),
                });
            }
            if arena.legal_actions().is_empty() {
                return Err(MctsError::NoLegalActions {
                    root: arena.tree_idx(),
                });
            }
            if let Some(&action) = arena
                .legal_actions()
                .iter()
                .find(|&&a| a as usize >= policy.len())
            {
                return Err(MctsError::PolicyTooShort {
                    action,
                    len: policy.len(),
                });
            }
        }

        for (i, arena) in self.arenas.iter_mut().enumerate() {
            arena.expand(
                ROOT,
                to_play[i],
                LatentIndex::new(0, i),
                value_prefixes[i],
                &policies[i],
            )?;
        }

        self.epoch = next_epoch();
        debug!("prepared {} roots", n);
        Ok(())
    }

    /// Destroy every tree, keeping the legal actions and arena capacity.
    pub fn clear(&mut self) {
        for arena in &mut self.arenas {
            arena.clear();
        }
        self.epoch = next_epoch();
    }

    /// Actions along the most-visited path of every root.
    pub fn get_trajectories(&self) -> Vec<Vec<u16>> {
        self.arenas
            .iter()
            .map(|a| a.most_visited_trajectory(ROOT))
            .collect()
    }

    /// Child visit counts of every root, in legal-action order.
    pub fn get_distributions(&self) -> Vec<Vec<u32>> {
        self.arenas
            .iter()
            .map(|a| a.children_distribution(ROOT))
            .collect()
    }

    /// Mean value of every root.
    pub fn get_values(&self) -> Vec<f32> {
        self.arenas.iter().map(|a| a.root().value()).collect()
    }

    /// Root node of tree `index`.
    pub fn get_root(&self, index: usize) -> Option<&Node> {
        self.arenas.get(index).map(|a| a.root())
    }

    pub fn arena(&self, index: usize) -> Option<&TreeArena> {
        self.arenas.get(index)
    }

    pub fn arenas(&self) -> &[TreeArena] {
        &self.arenas
    }

    pub(crate) fn arenas_mut(&mut self) -> &mut [TreeArena] {
        &mut self.arenas
    }
}
