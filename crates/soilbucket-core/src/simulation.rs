//! Whole-run orchestration.
//!
//! [`run_water_balance`] validates configuration, selects active cells,
//! brings up the backend, drives the period loop and audits closure.

use tracing::{info, warn};

use crate::aggregate::{aggregate_periods, ResultTable};
use crate::backend::create_backend;
use crate::balance::MassBalance;
use crate::cells::{select_above_floor, CellBatch};
use crate::config::SimulationConfig;
use crate::constants::INITIAL_FILL_FRACTION;
use crate::encoding::IndexGrid;
use crate::error::{Result, WaterBalanceError};
use crate::forcing::ForcingSeries;
use crate::kernel::CellTotalsTable;
use crate::parameters::ParameterTables;

/// Encoded grids and dense parameter tables for one study area.
///
/// Built once by the caller and passed to every run.
#[derive(Debug, Clone)]
pub struct StudyArea {
    landuse: IndexGrid,
    soil: IndexGrid,
    tables: ParameterTables,
}

impl StudyArea {
    /// Validates that the grids share a shape and that every index in them
    /// has a slot in the tables.
    pub fn new(landuse: IndexGrid, soil: IndexGrid, tables: ParameterTables) -> Result<Self> {
        if (landuse.rows, landuse.cols) != (soil.rows, soil.cols) {
            return Err(WaterBalanceError::shape_mismatch(
                format!("soil grid {}x{}", landuse.rows, landuse.cols),
                format!("{}x{}", soil.rows, soil.cols),
            ));
        }
        tables.check_covers(landuse.max_index(), soil.max_index())?;
        Ok(Self {
            landuse,
            soil,
            tables,
        })
    }

    pub fn landuse(&self) -> &IndexGrid {
        &self.landuse
    }

    pub fn soil(&self) -> &IndexGrid {
        &self.soil
    }

    pub fn tables(&self) -> &ParameterTables {
        &self.tables
    }

    /// Grid shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.landuse.rows, self.landuse.cols)
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct WaterBalanceOutput {
    /// One row per (year, month) period.
    pub rows: ResultTable,
    pub balance: MassBalance,
    /// Storage per active cell at the start of the run [mm].
    pub initial_storage: Vec<f64>,
    /// Storage per active cell after the last period [mm].
    pub final_storage: Vec<f64>,
    /// Whole-run sums per active cell [mm].
    pub cell_totals: CellTotalsTable,
    /// Active cells, for scattering per-cell outputs back onto the grid.
    pub cells: CellBatch,
}

impl WaterBalanceOutput {
    /// Final storage on the full grid, zero on inactive cells.
    pub fn final_storage_grid(&self) -> Result<Vec<f64>> {
        self.cells.scatter(&self.final_storage)
    }

    /// Whole-run actual ET on the full grid.
    pub fn act_et_grid(&self) -> Result<Vec<f64>> {
        self.cells.scatter(&self.cell_totals.act_et)
    }

    /// Whole-run recharge on the full grid.
    pub fn recharge_grid(&self) -> Result<Vec<f64>> {
        self.cells.scatter(&self.cell_totals.recharge)
    }

    /// Whole-run runoff on the full grid.
    pub fn runoff_grid(&self) -> Result<Vec<f64>> {
        self.cells.scatter(&self.cell_totals.runoff)
    }
}

/// Starting storage per cell: a fixed fraction of root-zone capacity.
pub fn initial_storage(cells: &CellBatch, tables: &ParameterTables) -> Vec<f64> {
    cells
        .landuse
        .iter()
        .zip(&cells.soil)
        .map(|(&lu, &so)| tables.capacity(lu, so) * INITIAL_FILL_FRACTION)
        .collect()
}

/// Run the bucket model over every active cell of `area`.
pub fn run_water_balance(
    area: &StudyArea,
    forcing: &ForcingSeries,
    config: &SimulationConfig,
) -> Result<WaterBalanceOutput> {
    config.validate()?;

    let cells = select_above_floor(&area.landuse, &area.soil, config.landuse_index_floor)?;
    if cells.is_empty() {
        warn!(
            floor = config.landuse_index_floor,
            "no active cells; every period mean will be zero"
        );
    }

    let initial = initial_storage(&cells, &area.tables);
    let mut storage = initial.clone();

    let aggregates = {
        let mut backend = create_backend(config, &cells, &area.tables)?;
        aggregate_periods(forcing, backend.as_mut(), &mut storage)?
    };

    let balance = MassBalance::audit(&aggregates.rows, &initial, &storage);
    if !balance.is_closed(config.closure_tolerance) {
        warn!(
            error = balance.error,
            tolerance = config.closure_tolerance,
            "mass balance does not close"
        );
    }
    info!(
        backend = %config.backend,
        cells = cells.len(),
        periods = aggregates.rows.len(),
        steps = forcing.len(),
        balance_error = balance.error,
        "water balance complete"
    );

    let mut cell_totals = CellTotalsTable::with_capacity(aggregates.cell_totals.len());
    for t in &aggregates.cell_totals {
        cell_totals.push(t);
    }

    Ok(WaterBalanceOutput {
        rows: aggregates.rows,
        balance,
        initial_storage: initial,
        final_storage: storage,
        cell_totals,
        cells,
    })
}
