//! UCB (Upper Confidence Bound) score calculation for tree search.
//!
//! Implements the pUCT rule used by MuZero/EfficientZero:
//! UCB(s,a) = norm(Q(s,a)) + P(s,a) * sqrt(N(s)) / (1 + N(s,a)) * (c1 + log((N(s) + c2 + 1) / c2))
//!
//! Q(s,a) is built from the value prefix the model predicted for the
//! child, not from a stored reward.

use crate::config::{Players, SearchConfig};
use crate::min_max::MinMaxStats;
use crate::node::Node;

/// Reward earned on the edge from `parent` to `child`.
///
/// Value prefixes accumulate from the last reset point; when the parent
/// started a new segment the child's prefix already is the reward.
#[inline]
pub fn true_reward(parent: &Node, child: &Node) -> f32 {
    if parent.is_reset {
        child.value_prefix
    } else {
        child.value_prefix - parent.value_prefix
    }
}

/// One-step bootstrapped Q of `child`, seen from `parent`'s mover.
#[inline]
pub fn child_q(parent: &Node, child: &Node, discount_factor: f32, players: Players) -> f32 {
    true_reward(parent, child)
        + discount_factor * players.value_for_parent(parent.to_play, child.to_play, child.value())
}

/// Exploration bonus of a child.
///
/// # Arguments
/// * `total_children_visits` - Visits summed over the parent's children N(s)
/// * `child_prior` - Prior probability P(s,a)
/// * `child_visit_count` - Number of visits to the child N(s,a)
#[inline]
pub fn exploration_score(
    total_children_visits: u32,
    child_prior: f32,
    child_visit_count: u32,
    pb_c_base: f32,
    pb_c_init: f32,
) -> f32 {
    let n = total_children_visits as f32;
    let pb_c = ((n + pb_c_base + 1.0) / pb_c_base).ln() + pb_c_init;
    pb_c * n.sqrt() / (child_visit_count as f32 + 1.0) * child_prior
}

/// Calculate the UCB score for a child node.
///
/// Children that were never visited, or that begin a new reward segment,
/// are valued at the parent's mean Q instead of their own statistics.
/// The exploitation term is min-max normalized and clamped to [0, 1].
#[inline]
pub fn ucb_score(
    parent: &Node,
    child: &Node,
    parent_mean_q: f32,
    total_children_visits: u32,
    min_max_stats: &MinMaxStats,
    config: &SearchConfig,
) -> f32 {
    let exploration = exploration_score(
        total_children_visits,
        child.prior,
        child.visit_count,
        config.pb_c_base,
        config.pb_c_init,
    );

    let q = if child.visit_count == 0 || child.is_reset {
        parent_mean_q
    } else {
        child_q(parent, child, config.discount_factor, config.players)
    };
    let exploitation = min_max_stats.normalize(q).clamp(0.0, 1.0);

    exploitation + exploration
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visited(prior: f32, visits: u32, value_sum: f32, value_prefix: f32, to_play: i8) -> Node {
        let mut node = Node::new(prior);
        node.visit_count = visits;
        node.value_sum = value_sum;
        node.value_prefix = value_prefix;
        node.to_play = to_play;
        node
    }

    #[test]
    fn test_exploration_zero_without_parent_visits() {
        assert_eq!(exploration_score(0, 0.5, 0, 19652.0, 1.25), 0.0);
    }

    #[test]
    fn test_exploration_formula() {
        // N = 100: (ln((100 + 19652 + 1) / 19652) + 1.25) * 10 / 1 * 0.5
        let expected = (((100.0f32 + 19653.0) / 19652.0).ln() + 1.25) * 10.0 * 0.5;
        let score = exploration_score(100, 0.5, 0, 19652.0, 1.25);
        assert!((score - expected).abs() < 1e-5);
    }

    #[test]
    fn test_exploration_decreases_with_visits() {
        let low = exploration_score(100, 0.5, 1, 19652.0, 1.25);
        let high = exploration_score(100, 0.5, 50, 19652.0, 1.25);
        assert!(low > high);
    }

    #[test]
    fn test_true_reward_respects_reset() {
        let mut parent = visited(1.0, 1, 0.0, 2.0, 0);
        let child = visited(0.5, 1, 0.0, 2.5, 0);
        assert!((true_reward(&parent, &child) - 0.5).abs() < 1e-6);
        parent.is_reset = true;
        assert!((true_reward(&parent, &child) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_child_q_two_player_negates_opponent_value() {
        let parent = visited(1.0, 2, 0.0, 0.0, 1);
        let child = visited(0.5, 1, 0.8, 0.0, 2);
        let q = child_q(&parent, &child, 1.0, Players::TwoPlayer);
        assert!((q + 0.8).abs() < 1e-6);
        let q = child_q(&parent, &child, 1.0, Players::Single);
        assert!((q - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_unvisited_child_uses_parent_mean_q() {
        let config = SearchConfig::default();
        let parent = visited(1.0, 0, 0.0, 0.0, 0);
        let child = Node::new(0.5);
        let stats = MinMaxStats::new();
        let score = ucb_score(&parent, &child, 0.3, 0, &stats, &config);
        assert!((score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_reset_child_uses_parent_mean_q() {
        let config = SearchConfig::default();
        let parent = visited(1.0, 5, 0.0, 0.0, 0);
        let mut child = visited(0.0, 4, 4.0, 0.9, 0);
        child.is_reset = true;
        let stats = MinMaxStats::new();
        let score = ucb_score(&parent, &child, 0.2, 4, &stats, &config);
        assert!((score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_exploitation_clamped() {
        let config = SearchConfig::default();
        let parent = visited(1.0, 3, 0.0, 0.0, 0);
        let child = visited(0.0, 2, 10.0, 0.0, 0);
        let mut stats = MinMaxStats::new();
        stats.update(0.0);
        stats.update(1.0);
        // Q is far above the observed range, exploitation saturates at 1
        let score = ucb_score(&parent, &child, 0.0, 2, &stats, &config);
        assert!((score - 1.0).abs() < 1e-6);
    }
}
