//! Node struct for the latent-space search tree.
//!
//! Each node stands for a latent state produced by the learned model and
//! tracks visit counts, value sums and the value prefix predicted on the
//! way to it.

/// Coordinate of a latent state inside the externally owned store.
///
/// `x` is the unroll step (0 for roots), `y` the position inside that
/// step's batch. Nodes never hold the latent state itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LatentIndex {
    pub x: usize,
    pub y: usize,
}

impl LatentIndex {
    #[inline]
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Search tree node with visit count and value statistics.
///
/// Uses arena allocation - children are stored as indices into a separate
/// children array rather than as owned pointers.
#[derive(Clone, Debug)]
pub struct Node {
    /// Prior probability from the parent's policy output
    pub prior: f32,
    /// Number of backups that passed through this node
    pub visit_count: u32,
    /// Sum of values backpropagated through this node
    pub value_sum: f32,
    /// Predicted cumulative reward since the last reset point
    pub value_prefix: f32,
    /// Mover at this node (0 in single-player searches)
    pub to_play: i8,
    /// Value prefixes of this node's children restart from zero
    pub is_reset: bool,
    /// Where the model stored this node's latent state
    pub latent: LatentIndex,
    /// Index into the arena's children array where this node's children start
    pub children_start: u32,
    /// Number of children
    pub children_count: u16,
}

impl Node {
    /// Create a new node with the given prior probability.
    #[inline]
    pub fn new(prior: f32) -> Self {
        Self {
            prior,
            visit_count: 0,
            value_sum: 0.0,
            value_prefix: 0.0,
            to_play: 0,
            is_reset: false,
            latent: LatentIndex::default(),
            children_start: 0,
            children_count: 0,
        }
    }

    /// Get the mean value of this node.
    ///
    /// Returns 0.0 if the node hasn't been visited yet.
    #[inline]
    pub fn value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    /// Check if this node has been expanded (has children).
    #[inline]
    pub fn expanded(&self) -> bool {
        self.children_count > 0
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(0.0)
    }
}
