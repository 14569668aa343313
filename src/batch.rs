//! Batch coordination for latent-space tree search.
//!
//! Handles multiple search trees and coordinates one batched model
//! evaluation per simulation across all of them. Trees never share
//! state, so traversal and backpropagation fan out over roots with rayon.

use log::debug;
use rayon::prelude::*;

use crate::config::SearchConfig;
use crate::error::{check_len, MctsError, Result};
use crate::min_max::MinMaxStatsList;
use crate::model::RecurrentModel;
use crate::node::LatentIndex;
use crate::results::SearchResults;
use crate::roots::Roots;
use crate::search::{backpropagate, select_to_leaf, update_tree_q};
use crate::tree::ROOT;

/// Walk every root down to a leaf in lock-step.
///
/// # Arguments
/// * `roots` - Prepared roots
/// * `config` - Search hyperparameters
/// * `min_max_stats` - One set of bounds per root
/// * `virtual_to_play` - Mover at each root
pub fn batch_traverse(
    roots: &Roots,
    config: &SearchConfig,
    min_max_stats: &MinMaxStatsList,
    virtual_to_play: &[i8],
) -> Result<SearchResults> {
    config.validate()?;
    let n = roots.root_num();
    check_len("min_max_stats", n, min_max_stats.len())?;
    check_len("virtual_to_play", n, virtual_to_play.len())?;

    let leaves = roots
        .arenas()
        .par_iter()
        .zip(min_max_stats.stats.par_iter())
        .zip(virtual_to_play.par_iter())
        .map(|((arena, stats), &to_play)| select_to_leaf(arena, stats, config, to_play))
        .collect::<Result<Vec<_>>>()?;

    let results = SearchResults::new(leaves, roots.epoch());
    if n > 0 {
        let total: usize = results.search_lens().iter().sum();
        debug!(
            "traversed {} roots, mean search depth {:.2}",
            n,
            total as f32 / n as f32
        );
    }
    Ok(results)
}

/// Expand every leaf from the model output and back its value up.
///
/// All slices are aligned with `results`, which must come from a
/// traversal of these roots since their last `clear`/`prepare`.
///
/// # Arguments
/// * `latent_step` - Unroll step the model stored the new latent states at
/// * `value_prefixes` - Predicted value prefix at each leaf
/// * `values` - Predicted value at each leaf
/// * `policies` - Policy logits at each leaf
/// * `is_reset` - Whether the value prefix restarts below each leaf
/// * `to_play` - Mover at each leaf
#[allow(clippy::too_many_arguments)]
pub fn batch_backpropagate(
    roots: &mut Roots,
    latent_step: usize,
    config: &SearchConfig,
    value_prefixes: &[f32],
    values: &[f32],
    policies: &[Vec<f32>],
    min_max_stats: &mut MinMaxStatsList,
    results: &SearchResults,
    is_reset: &[bool],
    to_play: &[i8],
) -> Result<()> {
    config.validate()?;
    if results.epoch() != roots.epoch() {
        return Err(MctsError::StaleSearchResults);
    }
    let n = roots.root_num();
    check_len("search results", n, results.num())?;
    check_len("min_max_stats", n, min_max_stats.len())?;
    check_len("value_prefixes", n, value_prefixes.len())?;
    check_len("values", n, values.len())?;
    check_len("policies", n, policies.len())?;
    check_len("is_reset", n, is_reset.len())?;
    check_len("to_play", n, to_play.len())?;

    // Validate every leaf before touching any tree
    for ((arena, leaf), policy) in roots
        .arenas()
        .iter()
        .zip(results.leaves.iter())
        .zip(policies.iter())
    {
        if !leaf.path.nodes.iter().all(|&idx| arena.contains(idx)) {
            return Err(MctsError::StaleSearchResults);
        }
        if arena.get(leaf.path.leaf()).expanded() {
            if !leaf.depth_capped {
                return Err(MctsError::AlreadyExpanded {
                    root: arena.tree_idx(),
                });
            }
        } else {
            arena.check_interior_policy(policy.len())?;
        }
    }

    roots
        .arenas_mut()
        .par_iter_mut()
        .zip(min_max_stats.stats.par_iter_mut())
        .zip(results.leaves.par_iter())
        .enumerate()
        .try_for_each(|(i, ((arena, stats), leaf))| -> Result<()> {
            let leaf_idx = leaf.path.leaf();
            if !arena.get(leaf_idx).expanded() {
                arena.expand(
                    leaf_idx,
                    to_play[i],
                    LatentIndex::new(latent_step, i),
                    value_prefixes[i],
                    &policies[i],
                )?;
                arena.get_mut(leaf_idx).is_reset = is_reset[i];
            }

            backpropagate(arena, &leaf.path, stats, to_play[i], values[i], config);
            Ok(())
        })?;

    debug!("backpropagated {} leaves at latent step {}", n, latent_step);
    Ok(())
}

/// Manages a batch of search trees for a complete search.
///
/// Owns the roots and their min-max bounds and runs the
/// traverse / evaluate / backpropagate cycle against a [`RecurrentModel`].
pub struct BatchedMCTS {
    config: SearchConfig,
    roots: Roots,
    min_max_stats: MinMaxStatsList,
    /// Mover at each root, recorded by `prepare`
    root_to_play: Vec<i8>,
}

impl BatchedMCTS {
    /// Create a search over one root per legal-action set.
    pub fn new(config: SearchConfig, legal_actions_list: Vec<Vec<u16>>) -> Result<Self> {
        config.validate()?;
        let roots = Roots::new(legal_actions_list);
        let mut min_max_stats = MinMaxStatsList::new(roots.root_num());
        min_max_stats.set_delta(config.value_delta_max);
        Ok(Self {
            config,
            roots,
            min_max_stats,
            root_to_play: Vec::new(),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn min_max_stats(&self) -> &MinMaxStatsList {
        &self.min_max_stats
    }

    /// Expand the roots from initial inference and mix in root noise.
    pub fn prepare(
        &mut self,
        noises: &[Vec<f32>],
        value_prefixes: &[f32],
        policies: &[Vec<f32>],
        to_play: &[i8],
    ) -> Result<()> {
        self.roots.prepare(
            self.config.root_noise_weight,
            noises,
            value_prefixes,
            policies,
            to_play,
        )?;
        self.root_to_play = to_play.to_vec();
        Ok(())
    }

    /// Expand the roots from initial inference without noise.
    pub fn prepare_no_noise(
        &mut self,
        value_prefixes: &[f32],
        policies: &[Vec<f32>],
        to_play: &[i8],
    ) -> Result<()> {
        self.roots.prepare_no_noise(value_prefixes, policies, to_play)?;
        self.root_to_play = to_play.to_vec();
        Ok(())
    }

    /// Run one traverse / evaluate / backpropagate cycle.
    ///
    /// `latent_step` is where the model stores the new latent states.
    pub fn simulate<M: RecurrentModel>(&mut self, model: &mut M, latent_step: usize) -> Result<()> {
        let results = batch_traverse(
            &self.roots,
            &self.config,
            &self.min_max_stats,
            &self.root_to_play,
        )?;

        let output = model.recurrent_inference(
            latent_step,
            &results.latent_indices(),
            &results.last_actions(),
        )?;
        output.validate(results.num())?;

        batch_backpropagate(
            &mut self.roots,
            latent_step,
            &self.config,
            &output.value_prefixes,
            &output.values,
            &output.policy_logits,
            &mut self.min_max_stats,
            &results,
            &output.is_reset,
            &results.virtual_to_play(),
        )
    }

    /// Run `config.num_simulations` cycles.
    ///
    /// Roots occupy unroll step 0, so simulation `k` stores its latent
    /// states at step `k + 1`.
    pub fn run<M: RecurrentModel>(&mut self, model: &mut M) -> Result<()> {
        for sim in 0..self.config.num_simulations {
            self.simulate(model, sim + 1)?;
        }
        debug!(
            "finished {} simulations over {} roots",
            self.config.num_simulations,
            self.roots.root_num()
        );
        Ok(())
    }

    /// Visit count distributions over the full action space.
    ///
    /// Returns visit fractions for each root; all zeros before any
    /// simulation has run.
    pub fn get_policies(&self, action_size: usize) -> Vec<Vec<f32>> {
        self.roots
            .arenas()
            .iter()
            .map(|arena| {
                let mut policy = vec![0.0f32; action_size];
                let children = arena.get_children(ROOT);

                let total_visits: u32 = children
                    .iter()
                    .map(|c| arena.get(c.node_idx).visit_count)
                    .sum();

                if total_visits > 0 {
                    for child_entry in children {
                        if let Some(slot) = policy.get_mut(child_entry.action as usize) {
                            *slot = arena.get(child_entry.node_idx).visit_count as f32
                                / total_visits as f32;
                        }
                    }
                }

                policy
            })
            .collect()
    }

    pub fn get_distributions(&self) -> Vec<Vec<u32>> {
        self.roots.get_distributions()
    }

    pub fn get_trajectories(&self) -> Vec<Vec<u16>> {
        self.roots.get_trajectories()
    }

    pub fn get_values(&self) -> Vec<f32> {
        self.roots.get_values()
    }

    /// Recompute every root's min-max bounds from its current tree.
    pub fn rebuild_min_max_stats(&mut self) {
        for (arena, stats) in self
            .roots
            .arenas()
            .iter()
            .zip(self.min_max_stats.stats.iter_mut())
        {
            stats.clear();
            update_tree_q(arena, stats, &self.config);
        }
    }

    /// Drop every tree and reset the bounds for the next search.
    pub fn clear(&mut self) {
        self.roots.clear();
        for stats in &mut self.min_max_stats.stats {
            stats.clear();
        }
        self.root_to_play.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelOutput;

    /// Model that predicts the same outputs everywhere.
    fn constant_model(
        value_prefix: f32,
        value: f32,
        action_size: usize,
    ) -> impl FnMut(usize, &[LatentIndex], &[u16]) -> Result<ModelOutput> {
        move |_, parents, _| {
            let n = parents.len();
            Ok(ModelOutput {
                value_prefixes: vec![value_prefix; n],
                values: vec![value; n],
                policy_logits: vec![vec![0.0; action_size]; n],
                is_reset: vec![false; n],
            })
        }
    }

    #[test]
    fn test_batch_traverse_requires_prepare() {
        let roots = Roots::new(vec![vec![0, 1]]);
        let err = batch_traverse(
            &roots,
            &SearchConfig::default(),
            &MinMaxStatsList::new(1),
            &[0],
        );
        assert_eq!(err.unwrap_err(), MctsError::RootNotExpanded { root: 0 });
    }

    #[test]
    fn test_batch_traverse_size_mismatch() {
        let roots = Roots::new(vec![vec![0, 1], vec![0, 1]]);
        let err = batch_traverse(
            &roots,
            &SearchConfig::default(),
            &MinMaxStatsList::new(1),
            &[0, 0],
        );
        assert!(matches!(
            err,
            Err(MctsError::BatchSizeMismatch { what: "min_max_stats", .. })
        ));
    }

    #[test]
    fn test_one_cycle_expands_and_backs_up() {
        let config = SearchConfig::default();
        let mut roots = Roots::new(vec![vec![0, 1], vec![0, 1, 2]]);
        roots
            .prepare_no_noise(&[0.0, 0.0], &[vec![0.0; 3], vec![0.0; 3]], &[0, 0])
            .unwrap();
        let mut stats = MinMaxStatsList::new(2);

        let results = batch_traverse(&roots, &config, &stats, &[0, 0]).unwrap();
        assert_eq!(results.last_actions(), vec![0, 0]);
        assert_eq!(results.latent_state_index_y_lst(), vec![0, 1]);

        batch_backpropagate(
            &mut roots,
            1,
            &config,
            &[1.0, 1.0],
            &[0.5, 0.5],
            &[vec![0.0; 3], vec![0.0; 3]],
            &mut stats,
            &results,
            &[false, true],
            &[0, 0],
        )
        .unwrap();

        assert_eq!(roots.get_distributions(), vec![vec![1, 0], vec![1, 0, 0]]);
        let arena = roots.arena(1).unwrap();
        let leaf = arena.get(arena.get_child(ROOT, 0).unwrap());
        assert_eq!(leaf.latent, LatentIndex::new(1, 1));
        assert!(leaf.is_reset);
    }

    #[test]
    fn test_stale_results_rejected() {
        let config = SearchConfig::default();
        let mut roots = Roots::new(vec![vec![0, 1]]);
        let policies = vec![vec![0.0, 0.0]];
        roots.prepare_no_noise(&[0.0], &policies, &[0]).unwrap();
        let mut stats = MinMaxStatsList::new(1);
        let results = batch_traverse(&roots, &config, &stats, &[0]).unwrap();

        roots.clear();
        roots.prepare_no_noise(&[0.0], &policies, &[0]).unwrap();

        let err = batch_backpropagate(
            &mut roots,
            1,
            &config,
            &[0.0],
            &[0.0],
            &policies,
            &mut stats,
            &results,
            &[false],
            &[0],
        );
        assert_eq!(err.unwrap_err(), MctsError::StaleSearchResults);
    }

    #[test]
    fn test_backpropagate_twice_rejected() {
        let config = SearchConfig::default();
        let mut roots = Roots::new(vec![vec![0, 1]]);
        let policies = vec![vec![0.0, 0.0]];
        roots.prepare_no_noise(&[0.0], &policies, &[0]).unwrap();
        let mut stats = MinMaxStatsList::new(1);
        let results = batch_traverse(&roots, &config, &stats, &[0]).unwrap();

        let backup = |roots: &mut Roots, stats: &mut MinMaxStatsList| {
            batch_backpropagate(
                roots, 1, &config, &[0.0], &[0.0], &policies, stats, &results, &[false], &[0],
            )
        };
        backup(&mut roots, &mut stats).unwrap();
        assert_eq!(
            backup(&mut roots, &mut stats).unwrap_err(),
            MctsError::AlreadyExpanded { root: 0 }
        );
        assert_eq!(roots.get_root(0).unwrap().visit_count, 1);
    }

    #[test]
    fn test_run_spends_simulation_budget() {
        let config = SearchConfig::with_simulations(10);
        let mut mcts = BatchedMCTS::new(config, vec![vec![0, 1, 2], vec![1, 3]]).unwrap();
        mcts.prepare_no_noise(&[0.0, 0.0], &[vec![0.0; 4], vec![0.0; 4]], &[0, 0])
            .unwrap();

        let mut model = constant_model(0.0, 0.0, 4);
        mcts.run(&mut model).unwrap();

        for dist in mcts.get_distributions() {
            assert_eq!(dist.iter().sum::<u32>(), 10);
        }
        let policies = mcts.get_policies(4);
        assert_eq!(policies[1][0], 0.0);
        assert_eq!(policies[1][2], 0.0);
        assert!((policies[1].iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_model_output_length_checked() {
        let mut mcts = BatchedMCTS::new(SearchConfig::default(), vec![vec![0, 1]]).unwrap();
        mcts.prepare_no_noise(&[0.0], &[vec![0.0, 0.0]], &[0]).unwrap();

        let mut short_model = |_: usize, _: &[LatentIndex], _: &[u16]| -> Result<ModelOutput> {
            Ok(ModelOutput::default())
        };
        assert!(matches!(
            mcts.simulate(&mut short_model, 1),
            Err(MctsError::BatchSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_clear_allows_new_search() {
        let mut mcts = BatchedMCTS::new(SearchConfig::with_simulations(3), vec![vec![0, 1]]).unwrap();
        let policies = vec![vec![0.0, 0.0]];
        mcts.prepare_no_noise(&[0.0], &policies, &[0]).unwrap();
        mcts.run(&mut constant_model(0.1, 0.2, 2)).unwrap();
        assert_eq!(mcts.roots().get_root(0).unwrap().visit_count, 3);

        mcts.clear();
        assert_eq!(mcts.get_distributions(), vec![Vec::<u32>::new()]);
        mcts.prepare_no_noise(&[0.0], &policies, &[0]).unwrap();
        assert_eq!(mcts.get_distributions(), vec![vec![0, 0]]);
    }

    #[test]
    fn test_empty_leaf_policy_rejected_before_any_change() {
        let config = SearchConfig::default();
        let mut roots = Roots::new(vec![vec![0], vec![0]]);
        roots
            .prepare_no_noise(&[0.0, 0.0], &[vec![0.0], vec![0.0]], &[0, 0])
            .unwrap();
        let mut stats = MinMaxStatsList::new(2);
        let results = batch_traverse(&roots, &config, &stats, &[0, 0]).unwrap();

        let err = batch_backpropagate(
            &mut roots,
            1,
            &config,
            &[0.0, 0.0],
            &[0.0, 0.0],
            &[vec![0.0], vec![]],
            &mut stats,
            &results,
            &[false, false],
            &[0, 0],
        );
        assert_eq!(err.unwrap_err(), MctsError::EmptyPolicy { root: 1 });
        // Neither tree was touched
        assert_eq!(roots.get_distributions(), vec![vec![0], vec![0]]);
        assert!(roots.arenas().iter().all(|a| a.len() == 2));
    }

    #[test]
    fn test_results_from_other_roots_rejected() {
        let config = SearchConfig::with_simulations(5);
        let mut a = BatchedMCTS::new(config.clone(), vec![vec![0, 1]]).unwrap();
        a.prepare_no_noise(&[0.0], &[vec![0.0, 0.0]], &[0]).unwrap();
        a.run(&mut constant_model(0.0, 0.0, 2)).unwrap();
        let results = batch_traverse(a.roots(), &config, a.min_max_stats(), &[0]).unwrap();

        let mut b = Roots::new(vec![vec![0, 1]]);
        b.prepare_no_noise(&[0.0], &[vec![0.0, 0.0]], &[0]).unwrap();
        let mut stats = MinMaxStatsList::new(1);
        let err = batch_backpropagate(
            &mut b,
            1,
            &config,
            &[0.0],
            &[0.0],
            &[vec![0.0, 0.0]],
            &mut stats,
            &results,
            &[false],
            &[0],
        );
        assert_eq!(err.unwrap_err(), MctsError::StaleSearchResults);

        // Same epoch stamp, but the path points past the end of the tree
        let restamped = SearchResults::new(results.leaves.clone(), b.epoch());
        let err = batch_backpropagate(
            &mut b,
            1,
            &config,
            &[0.0],
            &[0.0],
            &[vec![0.0, 0.0]],
            &mut stats,
            &restamped,
            &[false],
            &[0],
        );
        assert_eq!(err.unwrap_err(), MctsError::StaleSearchResults);
        assert_eq!(b.arena(0).unwrap().len(), 3);
    }

    #[test]
    fn test_depth_capped_leaves_back_up_without_growing() {
        let config = SearchConfig::with_simulations(6).max_depth(1);
        let mut mcts = BatchedMCTS::new(config, vec![vec![0, 1]]).unwrap();
        mcts.prepare_no_noise(&[0.0], &[vec![0.0, 0.0]], &[0]).unwrap();
        mcts.run(&mut constant_model(0.1, 0.2, 2)).unwrap();

        let arena = mcts.roots().arena(0).unwrap();
        assert_eq!(arena.root().visit_count, 6);
        assert_eq!(mcts.get_distributions()[0].iter().sum::<u32>(), 6);
        for entry in arena.get_children(ROOT) {
            let child = arena.get(entry.node_idx);
            assert!(child.expanded());
            for grandchild in arena.get_children(entry.node_idx) {
                assert_eq!(arena.get(grandchild.node_idx).visit_count, 0);
                assert!(!arena.get(grandchild.node_idx).expanded());
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected_by_traverse() {
        let mut roots = Roots::new(vec![vec![0, 1]]);
        roots.prepare_no_noise(&[0.0], &[vec![0.0, 0.0]], &[0]).unwrap();
        let config = SearchConfig::default().max_depth(0);
        let err = batch_traverse(&roots, &config, &MinMaxStatsList::new(1), &[0]);
        assert!(matches!(err, Err(MctsError::InvalidConfig(_))));
    }
}
