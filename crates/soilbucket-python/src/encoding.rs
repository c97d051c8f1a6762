use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;

use crate::convert::{contiguous_slice, grid_values, to_py_err};
use soilbucket_core::encoding::{EncodedRaster, Mapping};

/// Encode a categorical raster into 1-based indices.
///
/// Returns `(indices, codes)` where `codes[i - 1]` is the code of index `i`.
#[pyfunction]
fn encode_raster<'py>(
    py: Python<'py>,
    codes: PyReadonlyArray2<'py, i32>,
) -> PyResult<(Bound<'py, PyArray2<u32>>, Bound<'py, PyArray1<i32>>)> {
    let (rows, cols, values) = grid_values(&codes);
    let raster = EncodedRaster::from_codes(rows, cols, &values).map_err(to_py_err)?;
    let indices = PyArray1::from_vec(py, raster.grid.indices).reshape([rows, cols])?;
    let codes = PyArray1::from_slice(py, raster.mapping.codes());
    Ok((indices, codes))
}

/// Map indices back to their codes.
#[pyfunction]
fn decode_indices<'py>(
    py: Python<'py>,
    indices: PyReadonlyArray1<'py, u32>,
    codes: PyReadonlyArray1<'py, i32>,
) -> PyResult<Bound<'py, PyArray1<i32>>> {
    let mapping =
        Mapping::from_sorted_codes(contiguous_slice(&codes)?.to_vec()).map_err(to_py_err)?;
    let decoded = contiguous_slice(&indices)?
        .iter()
        .map(|&i| {
            mapping.code_of(i).ok_or_else(|| {
                pyo3::exceptions::PyValueError::new_err(format!(
                    "index {i} not in mapping of {} codes",
                    mapping.len()
                ))
            })
        })
        .collect::<PyResult<Vec<i32>>>()?;
    Ok(PyArray1::from_vec(py, decoded))
}

pub fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new(parent.py(), "encoding")?;
    m.add_function(wrap_pyfunction!(encode_raster, &m)?)?;
    m.add_function(wrap_pyfunction!(decode_indices, &m)?)?;
    parent.add_submodule(&m)?;
    Ok(())
}
