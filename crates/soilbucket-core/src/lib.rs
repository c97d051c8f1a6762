//! soilbucket: gridded daily soil-water bucket model.
//!
//! Encodes categorical land-use and soil rasters into dense indices, runs a
//! per-cell bucket recurrence on a host or device backend, aggregates the
//! fluxes into calendar months and audits mass-balance closure.

pub mod aggregate;
pub mod backend;
pub mod balance;
pub mod cells;
pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod forcing;
pub mod kernel;
pub mod parameters;
pub mod simulation;

pub use aggregate::{ResultRow, ResultTable};
pub use backend::{create_backend, ExecutionBackend};
pub use balance::{balance_error, MassBalance};
pub use cells::CellBatch;
pub use config::{Backend, SimulationConfig};
pub use encoding::{encode, Code, EncodedRaster, IndexGrid, Mapping};
pub use error::{Result, WaterBalanceError};
pub use forcing::ForcingSeries;
pub use parameters::{
    build_parameter_array, LookupTable, LookupTables, ParameterArray, ParameterTables,
};
pub use simulation::{run_water_balance, StudyArea, WaterBalanceOutput};
