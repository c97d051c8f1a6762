use numpy::{Element, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use soilbucket_core::WaterBalanceError;

/// Validate that a numpy array is C-contiguous and return its slice.
pub fn contiguous_slice<'py, T: Element>(arr: &'py PyReadonlyArray1<'py, T>) -> PyResult<&'py [T]> {
    arr.as_slice()
        .map_err(|_| PyValueError::new_err("array must be C-contiguous"))
}

/// Copy a 2-D array into row-major order, returning (rows, cols, values).
pub fn grid_values<T: Element + Copy>(arr: &PyReadonlyArray2<'_, T>) -> (usize, usize, Vec<T>) {
    let view = arr.as_array();
    let (rows, cols) = view.dim();
    (rows, cols, view.iter().copied().collect())
}

/// Map core errors onto Python exceptions.
///
/// Device and backend availability failures are runtime errors; everything
/// else is a problem with the caller's inputs.
pub fn to_py_err(e: WaterBalanceError) -> PyErr {
    match e {
        WaterBalanceError::Device(_) | WaterBalanceError::BackendUnavailable { .. } => {
            PyRuntimeError::new_err(e.to_string())
        }
        _ => PyValueError::new_err(e.to_string()),
    }
}
