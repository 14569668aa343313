//! Tree search operations: selection, traversal and backup.
//!
//! Implements the per-tree logic. The batch module drives these across
//! every root in lock-step.

use log::trace;
use smallvec::SmallVec;

use crate::config::SearchConfig;
use crate::error::{MctsError, Result};
use crate::min_max::MinMaxStats;
use crate::results::LeafResult;
use crate::tree::{TreeArena, ROOT};
use crate::ucb::{child_q, true_reward, ucb_score};

/// Maximum expected tree depth (for stack allocation)
pub const MAX_DEPTH: usize = 128;

/// Scores within this distance of the best count as tied.
const TIE_EPSILON: f32 = 1e-6;

/// A path through the search tree.
///
/// Stores node indices and actions taken from root to leaf.
#[derive(Clone, Debug)]
pub struct SearchPath {
    /// Node indices from root to leaf
    pub nodes: SmallVec<[u32; MAX_DEPTH]>,
    /// Actions taken (one fewer than nodes)
    pub actions: SmallVec<[u16; MAX_DEPTH]>,
}

impl SearchPath {
    /// Create a path starting from a root node.
    pub fn from_root(root_idx: u32) -> Self {
        let mut nodes = SmallVec::new();
        nodes.push(root_idx);
        Self {
            nodes,
            actions: SmallVec::new(),
        }
    }

    /// Add a step to the path.
    #[inline]
    pub fn push(&mut self, action: u16, node_idx: u32) {
        self.actions.push(action);
        self.nodes.push(node_idx);
    }

    /// Get the leaf node index.
    #[inline]
    pub fn leaf(&self) -> u32 {
        self.nodes[self.nodes.len() - 1]
    }

    /// Node the leaf was selected from, if the path left the root.
    #[inline]
    pub fn parent(&self) -> Option<u32> {
        self.nodes.len().checked_sub(2).map(|i| self.nodes[i])
    }

    /// Get the depth of the path (number of actions taken).
    #[inline]
    pub fn depth(&self) -> usize {
        self.actions.len()
    }

    /// Check if the path is empty (just root).
    #[inline]
    pub fn is_root_only(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::from_root(ROOT)
    }
}

/// Select the best child according to UCB score.
///
/// Ties (within 1e-6) go to the lowest action so repeated calls on the
/// same statistics always agree.
///
/// Returns (action, child_node_idx) of the best child.
pub fn select_child(
    arena: &TreeArena,
    node_idx: u32,
    min_max_stats: &MinMaxStats,
    mean_q: f32,
    config: &SearchConfig,
) -> Result<(u16, u32)> {
    let parent = arena.get(node_idx);
    let children = arena.get_children(node_idx);
    if children.is_empty() {
        return Err(MctsError::SelectOnLeaf);
    }

    let total_children_visits: u32 = children
        .iter()
        .map(|c| arena.get(c.node_idx).visit_count)
        .sum();

    let scores: SmallVec<[f32; 64]> = children
        .iter()
        .map(|c| {
            ucb_score(
                parent,
                arena.get(c.node_idx),
                mean_q,
                total_children_visits,
                min_max_stats,
                config,
            )
        })
        .collect();

    if let Some((entry, _)) = children
        .iter()
        .zip(scores.iter())
        .find(|(_, score)| !score.is_finite())
    {
        return Err(MctsError::NonFiniteScore {
            action: entry.action,
        });
    }

    let max_score = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut best: Option<(u16, u32)> = None;
    for (entry, &score) in children.iter().zip(scores.iter()) {
        if score >= max_score - TIE_EPSILON && best.map_or(true, |(a, _)| entry.action < a) {
            best = Some((entry.action, entry.node_idx));
        }
    }

    best.ok_or(MctsError::SelectOnLeaf)
}

/// Walk one tree from the root to an unexpanded node.
///
/// Stops early once `config.max_depth` actions were taken; the leaf is
/// then flagged as depth-capped and may already be expanded.
///
/// # Arguments
/// * `arena` - The tree arena
/// * `min_max_stats` - Bounds of this tree
/// * `config` - Search hyperparameters
/// * `to_play` - Mover at the root
pub fn select_to_leaf(
    arena: &TreeArena,
    min_max_stats: &MinMaxStats,
    config: &SearchConfig,
    to_play: i8,
) -> Result<LeafResult> {
    if !arena.root().expanded() {
        return Err(MctsError::RootNotExpanded {
            root: arena.tree_idx(),
        });
    }

    let mut path = SearchPath::from_root(ROOT);
    let mut node_idx = ROOT;
    let mut virtual_to_play = to_play;
    let mut parent_q = 0.0f32;
    let mut is_root = true;

    while arena.get(node_idx).expanded() && path.depth() < config.max_depth {
        let mean_q = arena.compute_mean_q(
            node_idx,
            is_root,
            parent_q,
            config.discount_factor,
            config.players,
        );
        is_root = false;
        parent_q = mean_q;

        let (action, child_idx) = select_child(arena, node_idx, min_max_stats, mean_q, config)?;
        trace!(
            "tree {}: depth {} picked action {} (mean_q {:.4})",
            arena.tree_idx(),
            path.depth(),
            action,
            mean_q
        );

        virtual_to_play = config.players.next_to_play(virtual_to_play);
        path.push(action, child_idx);
        node_idx = child_idx;
    }

    let parent_idx = path.parent().ok_or(MctsError::RootNotExpanded {
        root: arena.tree_idx(),
    })?;
    let last_action = path.actions[path.actions.len() - 1];

    Ok(LeafResult {
        parent_latent: arena.get(parent_idx).latent,
        last_action,
        to_play: virtual_to_play,
        depth_capped: arena.get(node_idx).expanded(),
        path,
    })
}

/// Backup a value through the search path.
///
/// Walks leaf to root accumulating the bootstrapped return
/// `G = reward + discount * G`, adding it to every node on the path and
/// widening the min-max bounds with each node's Q as seen from its parent
/// (the root contributes its own `value_prefix + discount * value`).
///
/// With several movers a node receives `+G` when it belongs to the leaf's
/// mover and `-G` otherwise, so every value sum is from the point of view
/// of the player to move there.
///
/// # Arguments
/// * `arena` - The tree arena
/// * `path` - Path from root to leaf
/// * `min_max_stats` - Bounds of this tree
/// * `to_play` - Mover at the leaf
/// * `value` - Predicted value at the leaf from the leaf mover's perspective
/// * `config` - Search hyperparameters
pub fn backpropagate(
    arena: &mut TreeArena,
    path: &SearchPath,
    min_max_stats: &mut MinMaxStats,
    to_play: i8,
    value: f32,
    config: &SearchConfig,
) {
    let single = config.players.is_single();
    let mut bootstrap_value = value;

    for i in (0..path.nodes.len()).rev() {
        let node_idx = path.nodes[i];
        let owned_by_leaf_mover = single || arena.get(node_idx).to_play == to_play;

        {
            let node = arena.get_mut(node_idx);
            node.visit_count += 1;
            node.value_sum += if owned_by_leaf_mover {
                bootstrap_value
            } else {
                -bootstrap_value
            };
        }

        let node = arena.get(node_idx);
        let reward = match i.checked_sub(1).map(|p| arena.get(path.nodes[p])) {
            Some(parent) => {
                min_max_stats.update(child_q(parent, node, config.discount_factor, config.players));
                true_reward(parent, node)
            }
            None => {
                min_max_stats.update(node.value_prefix + config.discount_factor * node.value());
                node.value_prefix
            }
        };

        bootstrap_value = if !single && owned_by_leaf_mover {
            -reward + config.discount_factor * bootstrap_value
        } else {
            reward + config.discount_factor * bootstrap_value
        };
    }
}

/// Widen a tree's min-max bounds with the Q of the root and every expanded node.
///
/// Used to rebuild the bounds of a tree that is reused across searches,
/// where the bounds were reset but the statistics were kept.
pub fn update_tree_q(arena: &TreeArena, min_max_stats: &mut MinMaxStats, config: &SearchConfig) {
    let root = arena.root();
    if root.visit_count > 0 {
        min_max_stats.update(root.value_prefix + config.discount_factor * root.value());
    }

    let mut stack: Vec<u32> = vec![ROOT];

    while let Some(node_idx) = stack.pop() {
        let parent = arena.get(node_idx);
        for entry in arena.get_children(node_idx) {
            let child = arena.get(entry.node_idx);
            if child.expanded() {
                min_max_stats.update(child_q(parent, child, config.discount_factor, config.players));
                stack.push(entry.node_idx);
            }
        }
    }
}
