//! Execution backends for kernel dispatch.
//!
//! This module provides the `ExecutionBackend` trait, a synchronous
//! "run the kernel over every active cell" operation with two
//! implementations:
//!
//! - **Host**: rayon parallel-for over cells in `f64`
//! - **Device**: wgpu compute shader, one lane per cell, in `f32`
//!   (requires the `gpu` feature)
//!
//! Both read the same dense parameter tables and per-cell index arrays and
//! must agree within [`BACKEND_RTOL`](crate::constants::BACKEND_RTOL).

mod host;

#[cfg(feature = "gpu")]
mod device;

pub use host::HostBackend;

#[cfg(feature = "gpu")]
pub use device::{DeviceBackend, DeviceContext};

use tracing::info;

use crate::cells::CellBatch;
use crate::config::{Backend, SimulationConfig};
use crate::error::Result;
use crate::kernel::CellTotals;
use crate::parameters::ParameterTables;

/// A strategy that runs the water-balance kernel over all active cells.
pub trait ExecutionBackend {
    /// Which strategy this is.
    fn kind(&self) -> Backend;

    /// Number of active cells this context was built for.
    fn n_cells(&self) -> usize;

    /// Run the kernel over one batch of timesteps.
    ///
    /// `prec` and `pet` are the shared forcing for the batch. `storage` holds
    /// one value per cell and is updated in place. Returns per-cell sums over
    /// this batch only. Blocks until every cell has finished.
    fn dispatch(
        &mut self,
        prec: &[f64],
        pet: &[f64],
        storage: &mut [f64],
    ) -> Result<Vec<CellTotals>>;
}

/// Build the backend selected in `config` for the given cells and tables.
///
/// Configuration is validated before anything is allocated.
pub fn create_backend<'a>(
    config: &SimulationConfig,
    cells: &'a CellBatch,
    tables: &'a ParameterTables,
) -> Result<Box<dyn ExecutionBackend + 'a>> {
    config.validate()?;
    tables.check_covers(cells.max_landuse(), cells.max_soil())?;

    match config.backend {
        Backend::Host => {
            let backend = HostBackend::new(cells, tables, config.host_threads)?;
            info!(
                cells = cells.len(),
                threads = backend.threads(),
                "using host backend"
            );
            Ok(Box::new(backend))
        }
        Backend::Device => create_device(config, cells, tables),
    }
}

#[cfg(feature = "gpu")]
fn create_device<'a>(
    config: &SimulationConfig,
    cells: &'a CellBatch,
    tables: &'a ParameterTables,
) -> Result<Box<dyn ExecutionBackend + 'a>> {
    let context = DeviceContext::new()?;
    info!(
        adapter = %context.adapter_name(),
        cells = cells.len(),
        workgroup_size = config.workgroup_size,
        "using device backend"
    );
    let backend = DeviceBackend::new(context, cells, tables, config.workgroup_size)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "gpu"))]
fn create_device<'a>(
    _config: &SimulationConfig,
    _cells: &'a CellBatch,
    _tables: &'a ParameterTables,
) -> Result<Box<dyn ExecutionBackend + 'a>> {
    Err(crate::error::WaterBalanceError::backend_unavailable(
        Backend::Device.as_str(),
        "built without the `gpu` feature",
    ))
}

/// Check that forcing and storage lengths fit a dispatch.
pub(crate) fn check_dispatch_lengths(
    n_cells: usize,
    prec: &[f64],
    pet: &[f64],
    storage: &[f64],
) -> Result<()> {
    use crate::error::WaterBalanceError;

    if prec.len() != pet.len() {
        return Err(WaterBalanceError::shape_mismatch(
            format!("{} pet steps", prec.len()),
            format!("{}", pet.len()),
        ));
    }
    if storage.len() != n_cells {
        return Err(WaterBalanceError::shape_mismatch(
            format!("{n_cells} storage values"),
            format!("{}", storage.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WaterBalanceError;
    use crate::parameters::ParameterArray;

    fn fixture() -> (CellBatch, ParameterTables) {
        let cells = CellBatch {
            rows: 1,
            cols: 2,
            landuse: vec![1, 2],
            soil: vec![1, 1],
            mask: vec![true, true],
        };
        let tables = ParameterTables {
            threshold: ParameterArray::from_values(vec![10.0, 20.0]),
            crop_coefficient: ParameterArray::from_values(vec![0.8, 1.1]),
            extraction_depth: ParameterArray::from_values(vec![0.5, 1.0]),
            soil_capacity: ParameterArray::from_values(vec![150.0]),
        };
        (cells, tables)
    }

    #[test]
    fn creates_host_backend() {
        let (cells, tables) = fixture();
        let backend = create_backend(&SimulationConfig::default(), &cells, &tables).unwrap();
        assert_eq!(backend.kind(), Backend::Host);
        assert_eq!(backend.n_cells(), 2);
    }

    #[test]
    fn invalid_config_fails_before_allocation() {
        let (cells, tables) = fixture();
        let cfg = SimulationConfig {
            backend: Backend::Device,
            workgroup_size: 0,
            ..SimulationConfig::default()
        };
        let err = create_backend(&cfg, &cells, &tables).err().unwrap();
        assert!(matches!(err, WaterBalanceError::InvalidConfig(_)));
    }

    #[test]
    fn dispatch_length_checks() {
        assert!(check_dispatch_lengths(2, &[1.0], &[1.0], &[0.0, 0.0]).is_ok());
        assert!(check_dispatch_lengths(2, &[1.0], &[], &[0.0, 0.0]).is_err());
        assert!(check_dispatch_lengths(2, &[1.0], &[1.0], &[0.0]).is_err());
    }
}
