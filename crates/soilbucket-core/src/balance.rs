//! Whole-run mass-balance audit.

use crate::aggregate::ResultTable;

/// Closure terms of a run [mm, mean per active cell].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassBalance {
    pub total_prec: f64,
    pub total_act_et: f64,
    pub total_recharge: f64,
    pub total_runoff: f64,
    /// Mean of final minus initial storage.
    pub storage_change: f64,
    /// Residual `prec - (act_et + recharge + runoff) - storage_change`.
    pub error: f64,
}

impl MassBalance {
    /// Audit the period table against initial and final per-cell storage.
    pub fn audit(rows: &ResultTable, initial: &[f64], final_storage: &[f64]) -> Self {
        let total_prec: f64 = rows.prec.iter().sum();
        let total_act_et: f64 = rows.act_et.iter().sum();
        let total_recharge: f64 = rows.recharge.iter().sum();
        let total_runoff: f64 = rows.runoff.iter().sum();
        let storage_change = mean_change(initial, final_storage);

        Self {
            total_prec,
            total_act_et,
            total_recharge,
            total_runoff,
            storage_change,
            error: total_prec - (total_act_et + total_recharge + total_runoff) - storage_change,
        }
    }

    /// Returns `true` if the residual is within `atol` of zero.
    pub fn is_closed(&self, atol: f64) -> bool {
        self.error.abs() <= atol
    }
}

/// Closure residual of a run.
pub fn balance_error(rows: &ResultTable, initial: &[f64], final_storage: &[f64]) -> f64 {
    MassBalance::audit(rows, initial, final_storage).error
}

fn mean_change(initial: &[f64], final_storage: &[f64]) -> f64 {
    let n = initial.len().min(final_storage.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = final_storage.iter().zip(initial).map(|(f, i)| f - i).sum();
    sum / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultRow;
    use approx::assert_relative_eq;

    fn row(month: u32, act_et: f64, recharge: f64, runoff: f64, prec: f64) -> ResultRow {
        ResultRow {
            year: 2020,
            month,
            act_et,
            recharge,
            runoff,
            prec,
            delta_storage: 0.0,
        }
    }

    #[test]
    fn closed_budget_has_zero_error() {
        let mut rows = ResultTable::default();
        rows.push(&row(1, 20.0, 5.0, 3.0, 40.0));
        rows.push(&row(2, 25.0, 0.0, 1.0, 20.0));
        // inputs 60, outputs 54, storage must rise by 6 on average
        let initial = [50.0, 70.0];
        let final_storage = [58.0, 74.0];
        let mb = MassBalance::audit(&rows, &initial, &final_storage);

        assert_relative_eq!(mb.total_prec, 60.0);
        assert_relative_eq!(mb.storage_change, 6.0);
        assert_relative_eq!(mb.error, 0.0);
        assert!(mb.is_closed(1e-9));
    }

    #[test]
    fn residual_sign() {
        let mut rows = ResultTable::default();
        rows.push(&row(1, 10.0, 0.0, 0.0, 15.0));
        let err = balance_error(&rows, &[30.0], &[31.0]);
        assert_relative_eq!(err, 4.0);
        assert!(!MassBalance::audit(&rows, &[30.0], &[31.0]).is_closed(1.0));
    }

    #[test]
    fn empty_inputs() {
        let mb = MassBalance::audit(&ResultTable::default(), &[], &[]);
        assert_eq!(mb, MassBalance::default());
        assert!(mb.is_closed(0.0));
    }
}
