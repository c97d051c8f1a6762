//! Bucket model process functions and the per-cell recurrence.
//!
//! Pure functions for each step of the daily soil-water update. The host
//! backend calls [`run_cell`] directly; the WGSL shader mirrors it in `f32`.

use soilbucket_macros::Columnar;

use crate::constants::SOIL_ET_FRACTION;
use crate::parameters::ParameterTables;

/// Static parameters of one cell, resolved from the dense tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParams {
    /// Infiltration threshold [mm/day].
    pub threshold: f64,
    /// Crop coefficient [-].
    pub kc: f64,
    /// Root-zone capacity [mm].
    pub capacity: f64,
    /// Storage [mm] above which ET is unstressed.
    pub soil_et: f64,
}

impl CellParams {
    /// Resolve parameters for a (land-use, soil) index pair.
    #[inline]
    pub fn resolve(tables: &ParameterTables, landuse: u32, soil: u32) -> Self {
        let capacity = tables.capacity(landuse, soil);
        Self {
            threshold: tables.threshold.get(landuse),
            kc: tables.crop_coefficient.get(landuse),
            capacity,
            soil_et: capacity * SOIL_ET_FRACTION,
        }
    }
}

/// Fluxes of a single timestep [mm].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepFluxes {
    pub eff_prec: f64,
    pub runoff: f64,
    pub recharge: f64,
    pub act_et: f64,
}

/// Per-cell sums over one dispatch [mm].
#[derive(Debug, Clone, Copy, Default, PartialEq, Columnar)]
pub struct CellTotals {
    pub act_et: f64,
    pub recharge: f64,
    pub runoff: f64,
    pub prec: f64,
}

impl CellTotals {
    /// Add one timestep's fluxes.
    #[inline]
    pub fn add_step(&mut self, prec: f64, f: &StepFluxes) {
        self.act_et += f.act_et;
        self.recharge += f.recharge;
        self.runoff += f.runoff;
        self.prec += prec;
    }

    /// Add another set of totals.
    #[inline]
    pub fn accumulate(&mut self, other: &CellTotals) {
        self.act_et += other.act_et;
        self.recharge += other.recharge;
        self.runoff += other.runoff;
        self.prec += other.prec;
    }
}

/// Step 1: Precipitation allowed to infiltrate, capped at the threshold.
#[inline]
pub fn effective_precipitation(prec: f64, threshold: f64) -> f64 {
    prec.min(threshold)
}

/// Step 2: Precipitation in excess of the threshold.
#[inline]
pub fn runoff(prec: f64, eff_prec: f64) -> f64 {
    prec - eff_prec
}

/// Step 3: Percolation below the root zone, from pre-update storage.
#[inline]
pub fn recharge(storage: f64, capacity: f64, eff_prec: f64) -> f64 {
    (storage + eff_prec - capacity).max(0.0)
}

/// Step 5: Actual ET, reduced linearly below the `soil_et` breakpoint.
///
/// A zero-capacity cell has no available water and yields 0.
#[inline]
pub fn actual_et(pet: f64, kc: f64, storage: f64, capacity: f64, soil_et: f64) -> f64 {
    let demand = pet * kc;
    if storage > soil_et {
        demand
    } else if capacity > 0.0 {
        demand * (storage / capacity)
    } else {
        0.0
    }
}

/// Execute one timestep for one cell.
///
/// Returns (new_storage, fluxes).
#[inline]
pub fn step(storage: f64, prec: f64, pet: f64, p: &CellParams) -> (f64, StepFluxes) {
    // 1-2. Partition precipitation
    let eff_prec = effective_precipitation(prec, p.threshold);
    let runoff = runoff(prec, eff_prec);

    // 3-4. Recharge against pre-update storage, then infiltrate
    let recharge = recharge(storage, p.capacity, eff_prec);
    let s = storage + eff_prec - recharge;

    // 5-6. Evapotranspiration from updated storage
    let act_et = actual_et(pet, p.kc, s, p.capacity, p.soil_et);
    let s = s - act_et;

    (
        s,
        StepFluxes {
            eff_prec,
            runoff,
            recharge,
            act_et,
        },
    )
}

/// Run one cell over a batch of timesteps, updating `storage` in place.
///
/// Returns sums over this batch only.
pub fn run_cell(storage: &mut f64, prec: &[f64], pet: &[f64], p: &CellParams) -> CellTotals {
    let mut totals = CellTotals::default();
    let mut s = *storage;
    for (&pr, &pe) in prec.iter().zip(pet) {
        let (next, fluxes) = step(s, pr, pe, p);
        totals.add_step(pr, &fluxes);
        s = next;
    }
    *storage = s;
    totals
}
