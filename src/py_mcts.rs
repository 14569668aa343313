//! Python bindings for the batched tree search.
//!
//! Mirrors the native API one to one: the Python side owns the model and
//! the latent-state store, Rust owns the trees. Traversal and
//! backpropagation release the GIL while they run.

use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::batch;
use crate::config::{Players, SearchConfig};
use crate::error::MctsError;
use crate::min_max::MinMaxStatsList;
use crate::results::SearchResults;
use crate::roots::Roots;

impl From<MctsError> for PyErr {
    fn from(err: MctsError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Search hyperparameters.
#[pyclass(name = "SearchConfig")]
#[derive(Clone)]
pub struct PySearchConfig {
    inner: SearchConfig,
}

#[pymethods]
impl PySearchConfig {
    /// Create a search configuration.
    ///
    /// Args:
    ///     pb_c_base: PUCT base constant (default 19652)
    ///     pb_c_init: PUCT init constant (default 1.25)
    ///     discount_factor: Per-step discount (default 0.997)
    ///     root_noise_weight: Fraction of root prior replaced by noise (default 0.25)
    ///     value_delta_max: Smallest normalization range (default 0.01)
    ///     players: Number of movers (default 1)
    ///     max_depth: Maximum traversal depth (default 256)
    ///     num_simulations: Simulations per search (default 50)
    #[new]
    #[pyo3(signature = (pb_c_base=19652.0, pb_c_init=1.25, discount_factor=0.997, root_noise_weight=0.25, value_delta_max=0.01, players=1, max_depth=256, num_simulations=50))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        pb_c_base: f32,
        pb_c_init: f32,
        discount_factor: f32,
        root_noise_weight: f32,
        value_delta_max: f32,
        players: usize,
        max_depth: usize,
        num_simulations: usize,
    ) -> PyResult<Self> {
        let inner = SearchConfig {
            pb_c_base,
            pb_c_init,
            discount_factor,
            root_noise_weight,
            value_delta_max,
            players: Players::from_count(players)?,
            max_depth,
            num_simulations,
        };
        inner.validate()?;
        Ok(Self { inner })
    }

    #[getter]
    fn num_simulations(&self) -> usize {
        self.inner.num_simulations
    }

    #[getter]
    fn players(&self) -> usize {
        self.inner.players.count()
    }

    #[getter]
    fn root_noise_weight(&self) -> f32 {
        self.inner.root_noise_weight
    }
}

/// Batch of search roots.
#[pyclass(name = "Roots")]
pub struct PyRoots {
    inner: Roots,
}

#[pymethods]
impl PyRoots {
    #[new]
    fn new(root_num: usize, legal_actions_list: Vec<Vec<u16>>) -> PyResult<Self> {
        if legal_actions_list.len() != root_num {
            return Err(MctsError::BatchSizeMismatch {
                what: "legal_actions_list",
                expected: root_num,
                actual: legal_actions_list.len(),
            }
            .into());
        }
        Ok(Self {
            inner: Roots::new(legal_actions_list),
        })
    }

    #[getter]
    fn num(&self) -> usize {
        self.inner.root_num()
    }

    fn prepare(
        &mut self,
        root_noise_weight: f32,
        noises: Vec<Vec<f32>>,
        value_prefixes: Vec<f32>,
        policies: Vec<Vec<f32>>,
        to_play: Vec<i8>,
    ) -> PyResult<()> {
        self.inner
            .prepare(root_noise_weight, &noises, &value_prefixes, &policies, &to_play)?;
        Ok(())
    }

    fn prepare_no_noise(
        &mut self,
        value_prefixes: Vec<f32>,
        policies: Vec<Vec<f32>>,
        to_play: Vec<i8>,
    ) -> PyResult<()> {
        self.inner.prepare_no_noise(&value_prefixes, &policies, &to_play)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn get_trajectories(&self) -> Vec<Vec<u16>> {
        self.inner.get_trajectories()
    }

    fn get_distributions(&self) -> Vec<Vec<u32>> {
        self.inner.get_distributions()
    }

    fn get_values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f32>> {
        self.inner.get_values().into_pyarray_bound(py)
    }
}

/// Per-root min-max bounds.
#[pyclass(name = "MinMaxStatsList")]
pub struct PyMinMaxStatsList {
    inner: MinMaxStatsList,
}

#[pymethods]
impl PyMinMaxStatsList {
    #[new]
    fn new(num: usize) -> Self {
        Self {
            inner: MinMaxStatsList::new(num),
        }
    }

    fn set_delta(&mut self, value_delta_max: f32) {
        self.inner.set_delta(value_delta_max);
    }
}

/// Leaves reached by the last traversal.
#[pyclass(name = "SearchResults")]
pub struct PySearchResults {
    inner: SearchResults,
}

#[pymethods]
impl PySearchResults {
    #[getter]
    fn num(&self) -> usize {
        self.inner.num()
    }

    #[getter]
    fn latent_state_index_x_lst(&self) -> Vec<usize> {
        self.inner.latent_state_index_x_lst()
    }

    #[getter]
    fn latent_state_index_y_lst(&self) -> Vec<usize> {
        self.inner.latent_state_index_y_lst()
    }

    #[getter]
    fn last_actions(&self) -> Vec<u16> {
        self.inner.last_actions()
    }

    #[getter]
    fn search_lens(&self) -> Vec<usize> {
        self.inner.search_lens()
    }

    #[getter]
    fn virtual_to_play(&self) -> Vec<i8> {
        self.inner.virtual_to_play()
    }
}

/// Walk every root to a leaf.
///
/// Returns:
///     SearchResults whose latent indices and last actions feed the
///     model's recurrent inference.
#[pyfunction]
pub fn batch_traverse(
    py: Python<'_>,
    roots: PyRef<'_, PyRoots>,
    config: PyRef<'_, PySearchConfig>,
    min_max_stats_lst: PyRef<'_, PyMinMaxStatsList>,
    virtual_to_play: Vec<i8>,
) -> PyResult<PySearchResults> {
    let roots = &roots.inner;
    let config = &config.inner;
    let stats = &min_max_stats_lst.inner;
    let inner =
        py.allow_threads(|| batch::batch_traverse(roots, config, stats, &virtual_to_play))?;
    Ok(PySearchResults { inner })
}

/// Expand the leaves from model output and back their values up.
#[pyfunction]
#[allow(clippy::too_many_arguments)]
pub fn batch_backpropagate(
    py: Python<'_>,
    mut roots: PyRefMut<'_, PyRoots>,
    latent_step: usize,
    config: PyRef<'_, PySearchConfig>,
    value_prefixes: PyReadonlyArray1<'_, f32>,
    values: PyReadonlyArray1<'_, f32>,
    policies: PyReadonlyArray2<'_, f32>,
    mut min_max_stats_lst: PyRefMut<'_, PyMinMaxStatsList>,
    results: PyRef<'_, PySearchResults>,
    is_reset: Vec<bool>,
    to_play: Vec<i8>,
) -> PyResult<()> {
    let value_prefixes = value_prefixes.as_array().to_vec();
    let values = values.as_array().to_vec();
    let policies: Vec<Vec<f32>> = policies
        .as_array()
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();

    let roots = &mut roots.inner;
    let stats = &mut min_max_stats_lst.inner;
    let config = &config.inner;
    let results = &results.inner;
    py.allow_threads(|| {
        batch::batch_backpropagate(
            roots,
            latent_step,
            config,
            &value_prefixes,
            &values,
            &policies,
            stats,
            results,
            &is_reset,
            &to_play,
        )
    })?;
    Ok(())
}

