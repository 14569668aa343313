//! Per-cycle scratch state shared between traversal and backpropagation.

use crate::node::LatentIndex;
use crate::search::SearchPath;

/// Outcome of one traversal of one tree.
#[derive(Clone, Debug)]
pub struct LeafResult {
    /// Path from root to leaf
    pub path: SearchPath,
    /// Latent state the model must unroll from (the leaf's parent)
    pub parent_latent: LatentIndex,
    /// Action the model applies to `parent_latent`
    pub last_action: u16,
    /// Mover at the leaf
    pub to_play: i8,
    /// Traversal stopped at the depth limit rather than at an unexpanded node
    pub depth_capped: bool,
}

/// Leaves reached by one batch traversal, indexed by root.
///
/// Holds arena indices only. The results belong to the roots' epoch at
/// traversal time and are rejected once the roots were cleared or
/// prepared again.
#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    pub leaves: Vec<LeafResult>,
    pub(crate) epoch: u64,
}

impl SearchResults {
    pub fn new(leaves: Vec<LeafResult>, epoch: u64) -> Self {
        Self { leaves, epoch }
    }

    /// Number of in-flight simulations.
    pub fn num(&self) -> usize {
        self.leaves.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Unroll step of each leaf's parent latent state.
    pub fn latent_state_index_x_lst(&self) -> Vec<usize> {
        self.leaves.iter().map(|l| l.parent_latent.x).collect()
    }

    /// Batch position of each leaf's parent latent state.
    pub fn latent_state_index_y_lst(&self) -> Vec<usize> {
        self.leaves.iter().map(|l| l.parent_latent.y).collect()
    }

    pub fn latent_indices(&self) -> Vec<LatentIndex> {
        self.leaves.iter().map(|l| l.parent_latent).collect()
    }

    pub fn last_actions(&self) -> Vec<u16> {
        self.leaves.iter().map(|l| l.last_action).collect()
    }

    /// Number of actions taken to reach each leaf.
    pub fn search_lens(&self) -> Vec<usize> {
        self.leaves.iter().map(|l| l.path.depth()).collect()
    }

    /// Action sequence from the root to each leaf.
    pub fn action_sequences(&self) -> Vec<Vec<u16>> {
        self.leaves.iter().map(|l| l.path.actions.to_vec()).collect()
    }

    /// Mover at each leaf.
    pub fn virtual_to_play(&self) -> Vec<i8> {
        self.leaves.iter().map(|l| l.to_play).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ROOT;

    #[test]
    fn test_accessors_follow_leaf_order() {
        let mut a = SearchPath::from_root(ROOT);
        a.push(1, 2);
        let mut b = SearchPath::from_root(ROOT);
        b.push(0, 1);
        b.push(4, 7);

        let results = SearchResults::new(
            vec![
                LeafResult {
                    path: a,
                    parent_latent: LatentIndex::new(0, 0),
                    last_action: 1,
                    to_play: 0,
                    depth_capped: false,
                },
                LeafResult {
                    path: b,
                    parent_latent: LatentIndex::new(3, 1),
                    last_action: 4,
                    to_play: 0,
                    depth_capped: false,
                },
            ],
            0,
        );

        assert_eq!(results.num(), 2);
        assert_eq!(results.latent_state_index_x_lst(), vec![0, 3]);
        assert_eq!(results.latent_state_index_y_lst(), vec![0, 1]);
        assert_eq!(results.last_actions(), vec![1, 4]);
        assert_eq!(results.search_lens(), vec![1, 2]);
        assert_eq!(results.action_sequences(), vec![vec![1], vec![0, 4]]);
    }
}
