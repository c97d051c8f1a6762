use std::collections::HashMap;

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::convert::{contiguous_slice, to_py_err};
use soilbucket_core::encoding::Mapping;
use soilbucket_core::parameters;

/// Expand a `{code: value}` table into an array aligned with `codes`.
///
/// Codes absent from the table get 0.0.
#[pyfunction]
fn build_parameter_array<'py>(
    py: Python<'py>,
    table: HashMap<i32, f64>,
    codes: PyReadonlyArray1<'py, i32>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let mapping =
        Mapping::from_sorted_codes(contiguous_slice(&codes)?.to_vec()).map_err(to_py_err)?;
    let arr = parameters::build_parameter_array(&table, &mapping);
    Ok(PyArray1::from_slice(py, arr.as_slice()))
}

/// Codes in `codes` that have no entry in `table`.
#[pyfunction]
fn missing_codes(table: HashMap<i32, f64>, codes: PyReadonlyArray1<'_, i32>) -> PyResult<Vec<i32>> {
    let mapping =
        Mapping::from_sorted_codes(contiguous_slice(&codes)?.to_vec()).map_err(to_py_err)?;
    Ok(parameters::missing_codes(&table, &mapping))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "parameters")?;
    m.add_function(wrap_pyfunction!(build_parameter_array, &m)?)?;
    m.add_function(wrap_pyfunction!(missing_codes, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
