#[macro_use]
mod macros;
mod convert;

mod encoding;
mod parameters;
mod water_balance;

use pyo3::prelude::*;

/// Register a submodule in sys.modules so `from parent.child import ...` works.
fn register_submodule(
    py: Python<'_>,
    parent_name: &str,
    child: &Bound<'_, PyModule>,
) -> PyResult<()> {
    let child_name = child.name()?;
    let full_name = format!("{}.{}", parent_name, child_name);
    let sys = py.import("sys")?;
    let modules = sys.getattr("modules")?;
    modules.set_item(full_name, child)?;
    Ok(())
}

#[pyfunction]
fn rust_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Whether the device backend was compiled in.
#[pyfunction]
fn has_device_backend() -> bool {
    cfg!(feature = "gpu")
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    let parent_name = m.name()?.to_string();

    m.add_function(wrap_pyfunction!(rust_version, m)?)?;
    m.add_function(wrap_pyfunction!(has_device_backend, m)?)?;

    encoding::register(m)?;
    parameters::register(m)?;
    water_balance::register(m)?;

    // Register submodules in sys.modules for `from soilbucket._core.X import ...`
    for name in &["encoding", "parameters", "water_balance"] {
        let sub = m.getattr(*name)?;
        register_submodule(py, &parent_name, sub.downcast::<PyModule>()?)?;
    }

    Ok(())
}
