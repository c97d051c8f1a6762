//! Host backend: rayon parallel-for over active cells.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{check_dispatch_lengths, ExecutionBackend};
use crate::cells::CellBatch;
use crate::config::Backend;
use crate::error::{Result, WaterBalanceError};
use crate::kernel::{self, CellParams, CellTotals};
use crate::parameters::ParameterTables;

/// Host backend in double precision.
///
/// Cell parameters are resolved once at construction; each dispatch is a
/// parallel map over cells that touches only that cell's storage slot.
pub struct HostBackend {
    params: Vec<CellParams>,
    pool: Option<ThreadPool>,
}

impl HostBackend {
    /// Resolve per-cell parameters and optionally build a dedicated pool.
    pub fn new(
        cells: &CellBatch,
        tables: &ParameterTables,
        threads: Option<usize>,
    ) -> Result<Self> {
        let params = cells
            .landuse
            .iter()
            .zip(&cells.soil)
            .map(|(&lu, &soil)| CellParams::resolve(tables, lu, soil))
            .collect();

        let pool = match threads {
            Some(n) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("soilbucket-host-{i}"))
                    .build()
                    .map_err(|e| WaterBalanceError::InvalidConfig(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self { params, pool })
    }

    /// Worker threads used per dispatch.
    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
    }

    fn run(&self, prec: &[f64], pet: &[f64], storage: &mut [f64]) -> Vec<CellTotals> {
        storage
            .par_iter_mut()
            .zip(self.params.par_iter())
            .map(|(s, p)| kernel::run_cell(s, prec, pet, p))
            .collect()
    }
}

impl ExecutionBackend for HostBackend {
    fn kind(&self) -> Backend {
        Backend::Host
    }

    fn n_cells(&self) -> usize {
        self.params.len()
    }

    fn dispatch(
        &mut self,
        prec: &[f64],
        pet: &[f64],
        storage: &mut [f64],
    ) -> Result<Vec<CellTotals>> {
        check_dispatch_lengths(self.params.len(), prec, pet, storage)?;
        let totals = match &self.pool {
            Some(pool) => pool.install(|| self.run(prec, pet, storage)),
            None => self.run(prec, pet, storage),
        };
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterArray;
    use approx::assert_relative_eq;

    fn fixture(n: usize) -> (CellBatch, ParameterTables) {
        let landuse: Vec<u32> = (0..n).map(|i| (i % 3) as u32 + 1).collect();
        let soil: Vec<u32> = (0..n).map(|i| (i % 2) as u32 + 1).collect();
        let cells = CellBatch {
            rows: 1,
            cols: n,
            landuse,
            soil,
            mask: vec![true; n],
        };
        let tables = ParameterTables {
            threshold: ParameterArray::from_values(vec![8.0, 15.0, 30.0]),
            crop_coefficient: ParameterArray::from_values(vec![0.7, 0.9, 1.1]),
            extraction_depth: ParameterArray::from_values(vec![0.4, 0.8, 1.2]),
            soil_capacity: ParameterArray::from_values(vec![120.0, 180.0]),
        };
        (cells, tables)
    }

    #[test]
    fn matches_serial_kernel() {
        let (cells, tables) = fixture(10);
        let mut backend = HostBackend::new(&cells, &tables, None).unwrap();
        let prec = [0.0, 12.0, 40.0, 3.0];
        let pet = [3.0, 1.0, 0.5, 4.0];

        let mut storage = vec![50.0; 10];
        let totals = backend.dispatch(&prec, &pet, &mut storage).unwrap();

        for i in 0..10 {
            let p = CellParams::resolve(&tables, cells.landuse[i], cells.soil[i]);
            let mut s = 50.0;
            let expected = kernel::run_cell(&mut s, &prec, &pet, &p);
            assert_eq!(totals[i], expected);
            assert_eq!(storage[i], s);
        }
    }

    #[test]
    fn dedicated_pool_gives_same_result() {
        let (cells, tables) = fixture(257);
        let prec = [5.0, 0.0, 22.0];
        let pet = [2.0, 2.0, 2.0];

        let mut global = HostBackend::new(&cells, &tables, None).unwrap();
        let mut pooled = HostBackend::new(&cells, &tables, Some(2)).unwrap();
        assert_eq!(pooled.threads(), 2);

        let mut s1 = vec![30.0; 257];
        let mut s2 = s1.clone();
        let t1 = global.dispatch(&prec, &pet, &mut s1).unwrap();
        let t2 = pooled.dispatch(&prec, &pet, &mut s2).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn storage_carries_between_dispatches() {
        let (cells, tables) = fixture(3);
        let mut backend = HostBackend::new(&cells, &tables, None).unwrap();
        let prec = [10.0, 2.0, 0.0, 7.0];
        let pet = [1.0, 2.0, 3.0, 1.5];

        let mut whole = vec![40.0; 3];
        backend.dispatch(&prec, &pet, &mut whole).unwrap();

        let mut split = vec![40.0; 3];
        backend.dispatch(&prec[..2], &pet[..2], &mut split).unwrap();
        backend.dispatch(&prec[2..], &pet[2..], &mut split).unwrap();

        for (a, b) in whole.iter().zip(&split) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_wrong_storage_length() {
        let (cells, tables) = fixture(4);
        let mut backend = HostBackend::new(&cells, &tables, None).unwrap();
        let mut storage = vec![0.0; 3];
        assert!(backend.dispatch(&[1.0], &[1.0], &mut storage).is_err());
    }

    #[test]
    fn empty_batch_dispatch() {
        let (cells, tables) = fixture(0);
        let mut backend = HostBackend::new(&cells, &tables, None).unwrap();
        let mut storage: Vec<f64> = Vec::new();
        let totals = backend.dispatch(&[1.0], &[1.0], &mut storage).unwrap();
        assert!(totals.is_empty());
    }
}
