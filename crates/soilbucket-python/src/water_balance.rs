use std::collections::HashMap;

use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;

use crate::convert::{contiguous_slice, grid_values, to_py_err};
use soilbucket_core::{
    Backend, EncodedRaster, ForcingSeries, LookupTables, ParameterTables, SimulationConfig,
    StudyArea,
};

// ---------------------------------------------------------------------------
// Typed pyclass result objects
// ---------------------------------------------------------------------------

define_table_result! {
    /// Per-period means over active cells.
    pub struct PeriodResult from soilbucket_core::ResultTable {
        year: i32, month: u32, act_et: f64, recharge: f64, runoff: f64, prec: f64,
        delta_storage: f64,
    }
}

define_scalar_result! {
    /// Whole-run closure terms.
    pub struct MassBalanceResult from soilbucket_core::MassBalance {
        total_prec, total_act_et, total_recharge, total_runoff, storage_change, error,
    }
}

/// Output of `run_water_balance`. Grids are zero on inactive cells.
#[pyclass(frozen)]
pub struct WaterBalanceResult {
    #[pyo3(get)]
    pub periods: Py<PeriodResult>,
    #[pyo3(get)]
    pub balance: Py<MassBalanceResult>,
    #[pyo3(get)]
    pub balance_error: f64,
    #[pyo3(get)]
    pub mask: Py<PyArray2<bool>>,
    #[pyo3(get)]
    pub initial_storage: Py<PyArray2<f64>>,
    #[pyo3(get)]
    pub final_storage: Py<PyArray2<f64>>,
    #[pyo3(get)]
    pub act_et: Py<PyArray2<f64>>,
    #[pyo3(get)]
    pub recharge: Py<PyArray2<f64>>,
    #[pyo3(get)]
    pub runoff: Py<PyArray2<f64>>,
}

fn grid_array(
    py: Python<'_>,
    shape: (usize, usize),
    values: Vec<f64>,
) -> PyResult<Py<PyArray2<f64>>> {
    Ok(PyArray1::from_vec(py, values)
        .reshape([shape.0, shape.1])?
        .unbind())
}

#[pyfunction]
#[pyo3(signature = (
    landuse, soil, threshold, crop_coefficient, extraction_depth, soil_capacity,
    dates, precip, pet, backend="host", workgroup_size=None, host_threads=None,
    landuse_index_floor=None,
))]
#[allow(clippy::too_many_arguments)]
fn run_water_balance<'py>(
    py: Python<'py>,
    landuse: PyReadonlyArray2<'py, i32>,
    soil: PyReadonlyArray2<'py, i32>,
    threshold: HashMap<i32, f64>,
    crop_coefficient: HashMap<i32, f64>,
    extraction_depth: HashMap<i32, f64>,
    soil_capacity: HashMap<i32, f64>,
    dates: Vec<String>,
    precip: PyReadonlyArray1<'py, f64>,
    pet: PyReadonlyArray1<'py, f64>,
    backend: &str,
    workgroup_size: Option<u32>,
    host_threads: Option<usize>,
    landuse_index_floor: Option<u32>,
) -> PyResult<WaterBalanceResult> {
    // Configuration first, so a bad backend name fails before any setup work.
    let defaults = SimulationConfig::default();
    let config = SimulationConfig {
        backend: backend.parse::<Backend>().map_err(to_py_err)?,
        workgroup_size: workgroup_size.unwrap_or(defaults.workgroup_size),
        host_threads,
        landuse_index_floor: landuse_index_floor.unwrap_or(defaults.landuse_index_floor),
        ..defaults
    };
    config.validate().map_err(to_py_err)?;

    let (rows, cols, lu_codes) = grid_values(&landuse);
    let (soil_rows, soil_cols, soil_codes) = grid_values(&soil);
    let lu = EncodedRaster::from_codes(rows, cols, &lu_codes).map_err(to_py_err)?;
    let so = EncodedRaster::from_codes(soil_rows, soil_cols, &soil_codes).map_err(to_py_err)?;

    let lookups = LookupTables {
        threshold,
        crop_coefficient,
        extraction_depth,
        soil_capacity,
    };
    let tables = ParameterTables::build(&lookups, &lu.mapping, &so.mapping);
    let area = StudyArea::new(lu.grid, so.grid, tables).map_err(to_py_err)?;

    let forcing = ForcingSeries::from_iso_dates(
        dates.as_slice(),
        contiguous_slice(&precip)?.to_vec(),
        contiguous_slice(&pet)?.to_vec(),
    )
    .map_err(to_py_err)?;

    let out = soilbucket_core::run_water_balance(&area, &forcing, &config).map_err(to_py_err)?;

    let shape = (rows, cols);
    let mask = PyArray1::from_slice(py, &out.cells.mask)
        .reshape([rows, cols])?
        .unbind();
    let initial = out.cells.scatter(&out.initial_storage).map_err(to_py_err)?;
    let initial_storage = grid_array(py, shape, initial)?;
    let final_storage = grid_array(py, shape, out.final_storage_grid().map_err(to_py_err)?)?;
    let act_et = grid_array(py, shape, out.act_et_grid().map_err(to_py_err)?)?;
    let recharge = grid_array(py, shape, out.recharge_grid().map_err(to_py_err)?)?;
    let runoff = grid_array(py, shape, out.runoff_grid().map_err(to_py_err)?)?;

    Ok(WaterBalanceResult {
        periods: Py::new(py, PeriodResult::from_table(py, out.rows))?,
        balance: Py::new(py, MassBalanceResult::from_core(&out.balance))?,
        balance_error: out.balance.error,
        mask,
        initial_storage,
        final_storage,
        act_et,
        recharge,
        runoff,
    })
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "water_balance")?;
    m.add_function(wrap_pyfunction!(run_water_balance, &m)?)?;
    m.add_class::<WaterBalanceResult>()?;
    m.add_class::<PeriodResult>()?;
    m.add_class::<MassBalanceResult>()?;
    parent.add_submodule(&m)?;
    Ok(())
}
