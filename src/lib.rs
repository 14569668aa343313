//! efficientzero-mcts-rs: batched latent-space tree search for EfficientZero.
//!
//! Many independent search trees advance in lock-step so that each
//! simulation needs exactly one batched call into the learned model.
//! Python bindings via PyO3 are available behind the `python` feature.

pub mod batch;
pub mod config;
pub mod error;
pub mod math;
pub mod min_max;
pub mod model;
pub mod node;
pub mod policy;
pub mod results;
pub mod roots;
pub mod search;
pub mod tree;
pub mod ucb;

#[cfg(feature = "python")]
mod py_mcts;

pub use batch::{batch_backpropagate, batch_traverse, BatchedMCTS};
pub use config::{Players, SearchConfig};
pub use error::{MctsError, Result};
pub use min_max::{MinMaxStats, MinMaxStatsList};
pub use model::{ModelOutput, RecurrentModel};
pub use node::{LatentIndex, Node};
pub use policy::{max_entropy, select_action, visit_count_distribution};
pub use results::{LeafResult, SearchResults};
pub use roots::Roots;
pub use search::update_tree_q;
pub use tree::TreeArena;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn efficientzero_mcts_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Search state
    m.add_class::<py_mcts::PySearchConfig>()?;
    m.add_class::<py_mcts::PyRoots>()?;
    m.add_class::<py_mcts::PyMinMaxStatsList>()?;
    m.add_class::<py_mcts::PySearchResults>()?;

    // Batched steps
    m.add_function(wrap_pyfunction!(py_mcts::batch_traverse, m)?)?;
    m.add_function(wrap_pyfunction!(py_mcts::batch_backpropagate, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
