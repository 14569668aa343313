//! Tree arena for efficient node allocation.
//!
//! Uses contiguous memory allocation for better cache locality during
//! tree traversal. Nodes reference their children via indices rather
//! than pointers, so search paths stay valid while the arena grows and
//! teardown between searches is a pair of `Vec::clear` calls.

use smallvec::SmallVec;

use crate::config::Players;
use crate::error::{MctsError, Result};
use crate::math::{argmax_first, softmax_inplace};
use crate::node::{LatentIndex, Node};
use crate::ucb::child_q;

/// Arena index of the root node.
pub const ROOT: u32 = 0;

/// A child entry storing the action and the index of the child node.
#[derive(Clone, Copy, Debug)]
pub struct ChildEntry {
    /// Action that leads to this child
    pub action: u16,
    /// Index of the child node in the arena
    pub node_idx: u32,
}

/// Arena-based storage for one search tree.
///
/// The root always lives at [`ROOT`]. Legal actions are only known for
/// the root; interior nodes accept every action the model's policy covers.
#[derive(Debug)]
pub struct TreeArena {
    /// Position of this tree inside the root batch
    tree_idx: usize,
    /// Legal actions at the root, in the order noise samples refer to
    legal_actions: Vec<u16>,
    /// All nodes in this tree
    nodes: Vec<Node>,
    /// Children entries: (action, node_idx) pairs
    children: Vec<ChildEntry>,
}

impl TreeArena {
    /// Create an arena holding a single unexpanded root.
    pub fn new(tree_idx: usize, legal_actions: Vec<u16>, estimated_nodes: usize) -> Self {
        let mut arena = Self {
            tree_idx,
            legal_actions,
            nodes: Vec::with_capacity(estimated_nodes),
            children: Vec::with_capacity(estimated_nodes * 4),
        };
        arena.allocate_node(1.0);
        arena
    }

    /// Position of this tree inside the root batch.
    #[inline]
    pub fn tree_idx(&self) -> usize {
        self.tree_idx
    }

    /// Legal actions at the root.
    #[inline]
    pub fn legal_actions(&self) -> &[u16] {
        &self.legal_actions
    }

    /// Allocate a new node with the given prior.
    ///
    /// Returns the index of the new node.
    #[inline]
    fn allocate_node(&mut self, prior: f32) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node::new(prior));
        idx
    }

    /// Get a reference to a node by index.
    #[inline]
    pub fn get(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    /// Get a mutable reference to a node by index.
    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> &mut Node {
        &mut self.nodes[idx as usize]
    }

    #[inline]
    pub fn root(&self) -> &Node {
        self.get(ROOT)
    }

    /// Check that a policy of `len` logits can expand an interior node.
    ///
    /// Interior nodes get one child per logit, so the policy must be
    /// non-empty and every action must fit in a `u16`.
    pub fn check_interior_policy(&self, len: usize) -> Result<()> {
        if len == 0 {
            Err(MctsError::EmptyPolicy {
                root: self.tree_idx,
            })
        } else if len > u16::MAX as usize {
            Err(MctsError::TooManyActions { len })
        } else {
            Ok(())
        }
    }

    /// Whether `idx` refers to a node of this arena.
    #[inline]
    pub fn contains(&self, idx: u32) -> bool {
        (idx as usize) < self.nodes.len()
    }

    /// Add children to a node from actions and their priors.
    fn add_children(&mut self, parent_idx: u32, actions: &[u16], priors: &[f32]) {
        debug_assert_eq!(actions.len(), priors.len());

        let children_start = self.children.len() as u32;
        let children_count = actions.len() as u16;

        for (&action, &prior) in actions.iter().zip(priors.iter()) {
            let child_idx = self.allocate_node(prior);
            self.children.push(ChildEntry {
                action,
                node_idx: child_idx,
            });
        }

        let parent = self.get_mut(parent_idx);
        parent.children_start = children_start;
        parent.children_count = children_count;
    }

    /// Expand a node from the model's policy logits.
    ///
    /// Priors are the softmax of the logits restricted to the legal
    /// actions; illegal actions never get a child. `policy_logits` is
    /// indexed by action over the full action space.
    pub fn expand(
        &mut self,
        node_idx: u32,
        to_play: i8,
        latent: LatentIndex,
        value_prefix: f32,
        policy_logits: &[f32],
    ) -> Result<()> {
        if self.get(node_idx).expanded() {
            return Err(MctsError::AlreadyExpanded {
                root: self.tree_idx,
            });
        }

        let actions: SmallVec<[u16; 64]> = if node_idx == ROOT {
            if self.legal_actions.is_empty() {
                return Err(MctsError::NoLegalActions {
                    root: self.tree_idx,
                });
            }
            if self.legal_actions.len() > u16::MAX as usize {
                return Err(MctsError::TooManyActions {
                    len: self.legal_actions.len(),
                });
            }
            SmallVec::from_slice(&self.legal_actions)
        } else {
            self.check_interior_policy(policy_logits.len())?;
            (0..policy_logits.len() as u16).collect()
        };

        let mut priors: SmallVec<[f32; 64]> = SmallVec::with_capacity(actions.len());
        for &action in &actions {
            let logit = policy_logits
                .get(action as usize)
                .copied()
                .ok_or(MctsError::PolicyTooShort {
                    action,
                    len: policy_logits.len(),
                })?;
            priors.push(logit);
        }
        softmax_inplace(&mut priors);

        let node = self.get_mut(node_idx);
        node.to_play = to_play;
        node.latent = latent;
        node.value_prefix = value_prefix;

        self.add_children(node_idx, &actions, &priors);
        Ok(())
    }

    /// Mix exploration noise into the priors of a node's children.
    ///
    /// `noises` holds one sample per child in legal-action order;
    /// each prior becomes `(1 - fraction) * prior + fraction * noise`.
    pub fn add_exploration_noise(&mut self, node_idx: u32, fraction: f32, noises: &[f32]) -> Result<()> {
        let count = self.get(node_idx).children_count as usize;
        if noises.len() != count {
            return Err(MctsError::BatchSizeMismatch {
                what: "exploration noise",
                expected: count,
                actual: noises.len(),
            });
        }

        let start = self.get(node_idx).children_start as usize;
        for (i, &noise) in noises.iter().enumerate() {
            let child_idx = self.children[start + i].node_idx;
            let child = self.get_mut(child_idx);
            child.prior = child.prior * (1.0 - fraction) + noise * fraction;
        }
        Ok(())
    }

    /// Mean one-step Q over the visited children of a node.
    ///
    /// Below the root, `parent_q` counts as one extra sample; with no
    /// visited children it is returned unchanged. At the root only real
    /// children count and an unvisited root yields 0.
    pub fn compute_mean_q(
        &self,
        node_idx: u32,
        is_root: bool,
        parent_q: f32,
        discount_factor: f32,
        players: Players,
    ) -> f32 {
        let parent = self.get(node_idx);
        let mut total_q = 0.0f32;
        let mut visited = 0u32;

        for entry in self.get_children(node_idx) {
            let child = self.get(entry.node_idx);
            if child.visit_count > 0 {
                total_q += child_q(parent, child, discount_factor, players);
                visited += 1;
            }
        }

        if is_root && visited > 0 {
            total_q / visited as f32
        } else if is_root {
            0.0
        } else {
            (parent_q + total_q) / (visited + 1) as f32
        }
    }

    /// Get the children of a node.
    #[inline]
    pub fn get_children(&self, node_idx: u32) -> &[ChildEntry] {
        let node = self.get(node_idx);
        if node.children_count == 0 {
            return &[];
        }
        let start = node.children_start as usize;
        let end = start + node.children_count as usize;
        &self.children[start..end]
    }

    /// Get a specific child by action.
    ///
    /// Returns None if the action is not a valid child.
    pub fn get_child(&self, node_idx: u32, action: u16) -> Option<u32> {
        self.get_children(node_idx)
            .iter()
            .find(|c| c.action == action)
            .map(|c| c.node_idx)
    }

    /// Visit counts of a node's children in legal-action order.
    ///
    /// Empty for an unexpanded node.
    pub fn children_distribution(&self, node_idx: u32) -> Vec<u32> {
        self.get_children(node_idx)
            .iter()
            .map(|c| self.get(c.node_idx).visit_count)
            .collect()
    }

    /// Actions along the most-visited path below a node.
    ///
    /// Follows the child with the highest visit count (lowest action on
    /// ties) until reaching a node whose children were never visited.
    pub fn most_visited_trajectory(&self, node_idx: u32) -> Vec<u16> {
        let mut trajectory = Vec::new();
        let mut current = node_idx;

        loop {
            let mut candidates: SmallVec<[ChildEntry; 64]> =
                SmallVec::from_slice(self.get_children(current));
            candidates.sort_by_key(|c| c.action);
            let visits: SmallVec<[u32; 64]> = candidates
                .iter()
                .map(|c| self.get(c.node_idx).visit_count)
                .collect();

            match argmax_first(&visits) {
                Some(best) if visits[best] > 0 => {
                    trajectory.push(candidates[best].action);
                    current = candidates[best].node_idx;
                }
                _ => break,
            }
        }

        trajectory
    }

    /// Drop every node and start over from a fresh unexpanded root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
        self.allocate_node(1.0);
    }

    /// Get the number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// An arena always holds its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
