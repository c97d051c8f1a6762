//! Dense parameter tables.
//!
//! Lookup tables arrive keyed by raw code. They are expanded once into
//! arrays aligned with a [`Mapping`] so the kernel only ever indexes.

use std::collections::HashMap;

use tracing::debug;

use crate::encoding::{Code, Mapping};
use crate::error::{Result, WaterBalanceError};

/// Sparse code -> value lookup table.
pub type LookupTable = HashMap<Code, f64>;

/// Dense per-index parameter values; slot `idx - 1` belongs to index `idx`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterArray {
    values: Vec<f64>,
}

impl ParameterArray {
    /// Wrap values already in index order.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Value for a 1-based index. Index 0 and out-of-range indices read 0.0.
    #[inline]
    pub fn get(&self, index: u32) -> f64 {
        (index as usize)
            .checked_sub(1)
            .and_then(|pos| self.values.get(pos))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the array has no slots.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in index order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// Expand a sparse lookup table into a dense array aligned with `mapping`.
///
/// Indices whose code is absent from `table` receive 0.0. This never fails;
/// callers wanting a hard error should check [`missing_codes`] first.
pub fn build_parameter_array(table: &LookupTable, mapping: &Mapping) -> ParameterArray {
    let values: Vec<f64> = mapping
        .iter()
        .map(|(_, code)| table.get(&code).copied().unwrap_or(0.0))
        .collect();
    ParameterArray { values }
}

/// Codes present in `mapping` but absent from `table`, ascending.
pub fn missing_codes(table: &LookupTable, mapping: &Mapping) -> Vec<Code> {
    mapping
        .codes()
        .iter()
        .copied()
        .filter(|code| !table.contains_key(code))
        .collect()
}

/// Sparse lookup tables for every model parameter.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    /// Infiltration threshold [mm/day] by land-use code.
    pub threshold: LookupTable,
    /// Crop coefficient [-] by land-use code.
    pub crop_coefficient: LookupTable,
    /// Root extraction depth [m] by land-use code.
    pub extraction_depth: LookupTable,
    /// Available water capacity [mm/m] by soil code.
    pub soil_capacity: LookupTable,
}

/// The four dense parameter arrays consumed by the kernel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTables {
    pub threshold: ParameterArray,
    pub crop_coefficient: ParameterArray,
    pub extraction_depth: ParameterArray,
    pub soil_capacity: ParameterArray,
}

impl ParameterTables {
    /// Build dense tables from sparse lookups and the two raster mappings.
    pub fn build(lookups: &LookupTables, landuse: &Mapping, soil: &Mapping) -> Self {
        for (name, table, mapping) in [
            ("threshold", &lookups.threshold, landuse),
            ("crop_coefficient", &lookups.crop_coefficient, landuse),
            ("extraction_depth", &lookups.extraction_depth, landuse),
            ("soil_capacity", &lookups.soil_capacity, soil),
        ] {
            let missing = missing_codes(table, mapping);
            if !missing.is_empty() {
                debug!(table = name, ?missing, "codes without lookup entry default to 0.0");
            }
        }

        Self {
            threshold: build_parameter_array(&lookups.threshold, landuse),
            crop_coefficient: build_parameter_array(&lookups.crop_coefficient, landuse),
            extraction_depth: build_parameter_array(&lookups.extraction_depth, landuse),
            soil_capacity: build_parameter_array(&lookups.soil_capacity, soil),
        }
    }

    /// Number of land-use slots covered by all three land-use arrays.
    pub fn landuse_len(&self) -> usize {
        self.threshold
            .len()
            .min(self.crop_coefficient.len())
            .min(self.extraction_depth.len())
    }

    /// Ensure every index up to the given maxima has a slot.
    pub fn check_covers(&self, max_landuse: u32, max_soil: u32) -> Result<()> {
        for (table, arr) in [
            ("threshold", &self.threshold),
            ("crop_coefficient", &self.crop_coefficient),
            ("extraction_depth", &self.extraction_depth),
        ] {
            if max_landuse as usize > arr.len() {
                return Err(WaterBalanceError::IndexOutOfRange {
                    table,
                    index: max_landuse,
                    len: arr.len(),
                });
            }
        }
        if max_soil as usize > self.soil_capacity.len() {
            return Err(WaterBalanceError::IndexOutOfRange {
                table: "soil_capacity",
                index: max_soil,
                len: self.soil_capacity.len(),
            });
        }
        Ok(())
    }

    /// Root-zone capacity [mm] for a cell: soil capacity times extraction depth.
    #[inline]
    pub fn capacity(&self, landuse: u32, soil: u32) -> f64 {
        self.soil_capacity.get(soil) * self.extraction_depth.get(landuse)
    }
}
