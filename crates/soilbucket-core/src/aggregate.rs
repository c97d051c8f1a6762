//! Calendar-period aggregation.
//!
//! Drives one backend dispatch per (year, month) period in chronological
//! order, threading soil storage from each period into the next.

use soilbucket_macros::Columnar;
use tracing::debug;

use crate::backend::ExecutionBackend;
use crate::error::{Result, WaterBalanceError};
use crate::forcing::ForcingSeries;
use crate::kernel::CellTotals;

/// Per-active-cell means over one period [mm].
#[derive(Debug, Clone, Copy, Default, PartialEq, Columnar)]
#[columnar(table_name = "ResultTable")]
pub struct ResultRow {
    pub year: i32,
    pub month: u32,
    pub act_et: f64,
    pub recharge: f64,
    pub runoff: f64,
    pub prec: f64,
    pub delta_storage: f64,
}

/// Output of [`aggregate_periods`].
#[derive(Debug, Clone)]
pub struct PeriodAggregates {
    /// One row per period, chronological.
    pub rows: ResultTable,
    /// Per-cell sums over the whole run.
    pub cell_totals: Vec<CellTotals>,
}

/// Run `backend` over every period of `forcing`, updating `storage` in place.
///
/// `storage` must hold one value per active cell; on return it holds the
/// storage after the last period. With zero active cells every mean is 0.0.
pub fn aggregate_periods(
    forcing: &ForcingSeries,
    backend: &mut dyn ExecutionBackend,
    storage: &mut [f64],
) -> Result<PeriodAggregates> {
    let n_cells = backend.n_cells();
    if storage.len() != n_cells {
        return Err(WaterBalanceError::shape_mismatch(
            format!("{n_cells} storage values"),
            format!("{}", storage.len()),
        ));
    }

    let periods = forcing.periods();
    let mut rows = ResultTable::with_capacity(periods.len());
    let mut cell_totals = vec![CellTotals::default(); n_cells];
    let mut before = storage.to_vec();

    for slice in &periods {
        let steps = slice.steps.clone();
        let totals = backend.dispatch(
            &forcing.precip()[steps.clone()],
            &forcing.pet()[steps],
            storage,
        )?;

        let mut sum = CellTotals::default();
        for (acc, t) in cell_totals.iter_mut().zip(&totals) {
            acc.accumulate(t);
            sum.accumulate(t);
        }
        let delta: f64 = storage.iter().zip(&before).map(|(a, b)| a - b).sum();

        let row = ResultRow {
            year: slice.period.year,
            month: slice.period.month,
            act_et: mean(sum.act_et, n_cells),
            recharge: mean(sum.recharge, n_cells),
            runoff: mean(sum.runoff, n_cells),
            prec: mean(sum.prec, n_cells),
            delta_storage: mean(delta, n_cells),
        };
        debug!(
            year = row.year,
            month = row.month,
            steps = slice.len(),
            act_et = row.act_et,
            recharge = row.recharge,
            runoff = row.runoff,
            "period aggregated"
        );
        rows.push(&row);
        before.copy_from_slice(storage);
    }

    Ok(PeriodAggregates { rows, cell_totals })
}

#[inline]
fn mean(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
