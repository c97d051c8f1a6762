//! Active-cell selection and scatter-back.

use crate::encoding::IndexGrid;
use crate::error::{Result, WaterBalanceError};

/// Active cells of a grid as flat parallel arrays.
///
/// Order is the row-major scan order of the source grid and stays fixed for
/// the whole run, so per-cell outputs can be scattered back with `mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellBatch {
    pub rows: usize,
    pub cols: usize,
    /// Land-use index per active cell.
    pub landuse: Vec<u32>,
    /// Soil index per active cell.
    pub soil: Vec<u32>,
    /// Row-major flag per grid cell; `true` where the cell is active.
    pub mask: Vec<bool>,
}

impl CellBatch {
    /// Number of active cells.
    pub fn len(&self) -> usize {
        self.landuse.len()
    }

    /// Returns `true` when no cell passed the predicate.
    pub fn is_empty(&self) -> bool {
        self.landuse.is_empty()
    }

    /// Largest land-use index among active cells.
    pub fn max_landuse(&self) -> u32 {
        self.landuse.iter().copied().max().unwrap_or(0)
    }

    /// Largest soil index among active cells.
    pub fn max_soil(&self) -> u32 {
        self.soil.iter().copied().max().unwrap_or(0)
    }

    /// Place per-cell `values` back on the full grid, zero elsewhere.
    pub fn scatter(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.len() {
            return Err(WaterBalanceError::shape_mismatch(
                format!("{} active cells", self.len()),
                format!("{} values", values.len()),
            ));
        }
        let mut out = vec![0.0; self.mask.len()];
        let slots = self
            .mask
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i));
        for (slot, &v) in slots.zip(values) {
            out[slot] = v;
        }
        Ok(out)
    }
}

/// Select active cells where `is_active(landuse_index)` holds.
pub fn select_cells<F>(landuse: &IndexGrid, soil: &IndexGrid, is_active: F) -> Result<CellBatch>
where
    F: Fn(u32) -> bool,
{
    if (landuse.rows, landuse.cols) != (soil.rows, soil.cols) {
        return Err(WaterBalanceError::shape_mismatch(
            format!("soil grid {}x{}", landuse.rows, landuse.cols),
            format!("{}x{}", soil.rows, soil.cols),
        ));
    }

    let mask: Vec<bool> = landuse.indices.iter().map(|&lu| is_active(lu)).collect();
    let n_active = mask.iter().filter(|&&m| m).count();

    let mut lu_out = Vec::with_capacity(n_active);
    let mut soil_out = Vec::with_capacity(n_active);
    for ((&active, &lu), &so) in mask.iter().zip(&landuse.indices).zip(&soil.indices) {
        if active {
            lu_out.push(lu);
            soil_out.push(so);
        }
    }

    Ok(CellBatch {
        rows: landuse.rows,
        cols: landuse.cols,
        landuse: lu_out,
        soil: soil_out,
        mask,
    })
}

/// Select cells whose land-use index is strictly above `floor`.
pub fn select_above_floor(landuse: &IndexGrid, soil: &IndexGrid, floor: u32) -> Result<CellBatch> {
    select_cells(landuse, soil, |lu| lu > floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids() -> (IndexGrid, IndexGrid) {
        let lu = IndexGrid::new(2, 3, vec![1, 2, 3, 1, 4, 2]).unwrap();
        let soil = IndexGrid::new(2, 3, vec![1, 1, 2, 2, 3, 3]).unwrap();
        (lu, soil)
    }

    #[test]
    fn selects_in_row_major_order() {
        let (lu, soil) = grids();
        let batch = select_above_floor(&lu, &soil, 1).unwrap();
        assert_eq!(batch.landuse, vec![2, 3, 4, 2]);
        assert_eq!(batch.soil, vec![1, 2, 3, 3]);
        assert_eq!(batch.mask, vec![false, true, true, false, true, true]);
    }

    #[test]
    fn lengths_agree_with_mask() {
        let (lu, soil) = grids();
        for floor in 0..5 {
            let b = select_above_floor(&lu, &soil, floor).unwrap();
            let count = b.mask.iter().filter(|&&m| m).count();
            assert_eq!(b.landuse.len(), count);
            assert_eq!(b.soil.len(), count);
        }
    }

    #[test]
    fn custom_predicate() {
        let (lu, soil) = grids();
        let b = select_cells(&lu, &soil, |i| i == 2).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(b.max_landuse(), 2);
        assert_eq!(b.max_soil(), 3);
    }

    #[test]
    fn rejects_mismatched_grids() {
        let lu = IndexGrid::new(2, 2, vec![2; 4]).unwrap();
        let soil = IndexGrid::new(1, 4, vec![1; 4]).unwrap();
        assert!(select_above_floor(&lu, &soil, 1).is_err());
    }

    #[test]
    fn scatter_zero_fills_inactive() {
        let (lu, soil) = grids();
        let b = select_above_floor(&lu, &soil, 1).unwrap();
        let full = b.scatter(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(full, vec![0.0, 10.0, 20.0, 0.0, 30.0, 40.0]);
        assert!(b.scatter(&[1.0]).is_err());
    }

    #[test]
    fn nothing_active() {
        let (lu, soil) = grids();
        let b = select_above_floor(&lu, &soil, 10).unwrap();
        assert!(b.is_empty());
        assert_eq!(b.scatter(&[]).unwrap(), vec![0.0; 6]);
    }
}
