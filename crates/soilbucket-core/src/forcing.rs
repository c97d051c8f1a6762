//! Daily forcing series and calendar periods.

use std::ops::Range;

use chrono::{Datelike, NaiveDate};

use crate::error::{Result, WaterBalanceError};

/// A (year, month) aggregation bucket. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Period containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// One period and the timesteps that fall in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodSlice {
    pub period: Period,
    /// Timestep range into the forcing arrays.
    pub steps: Range<usize>,
}

impl PeriodSlice {
    /// Number of timesteps in the period.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the period holds no timesteps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Validated daily forcing shared by every cell.
///
/// All arrays have the same length, dates are ascending (repeats allowed),
/// and precipitation and PET are finite and non-negative.
#[derive(Debug, Clone)]
pub struct ForcingSeries {
    dates: Vec<NaiveDate>,
    precip: Vec<f64>,
    pet: Vec<f64>,
}

impl ForcingSeries {
    /// Create a new ForcingSeries with validation.
    ///
    /// Validates:
    /// - dates, precip and pet have the same length
    /// - no NaN, infinite or negative values
    /// - dates ascending (gaps and repeated days allowed)
    ///
    /// An empty series is valid and yields no periods.
    pub fn new(dates: Vec<NaiveDate>, precip: Vec<f64>, pet: Vec<f64>) -> Result<Self> {
        if precip.len() != dates.len() || pet.len() != dates.len() {
            return Err(WaterBalanceError::InvalidForcing(format!(
                "dates ({}), precip ({}) and pet ({}) lengths differ",
                dates.len(),
                precip.len(),
                pet.len()
            )));
        }
        check_values("precip", &precip)?;
        check_values("pet", &pet)?;
        if let Some(w) = dates.windows(2).find(|w| w[0] > w[1]) {
            return Err(WaterBalanceError::InvalidForcing(format!(
                "dates must be ascending, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { dates, precip, pet })
    }

    /// Build from ISO-8601 (`YYYY-MM-DD`) date strings.
    pub fn from_iso_dates<S: AsRef<str>>(
        dates: &[S],
        precip: Vec<f64>,
        pet: Vec<f64>,
    ) -> Result<Self> {
        let parsed = dates
            .iter()
            .map(|s| {
                let s = s.as_ref();
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                    WaterBalanceError::InvalidForcing(format!("cannot parse date '{s}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(parsed, precip, pet)
    }

    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns `true` if there are no timesteps.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Daily precipitation [mm/day].
    pub fn precip(&self) -> &[f64] {
        &self.precip
    }

    /// Daily potential evapotranspiration [mm/day].
    pub fn pet(&self) -> &[f64] {
        &self.pet
    }

    /// Distinct (year, month) periods in chronological order with their
    /// timestep ranges. Ranges are contiguous because dates never decrease.
    pub fn periods(&self) -> Vec<PeriodSlice> {
        let mut out: Vec<PeriodSlice> = Vec::new();
        for (t, &date) in self.dates.iter().enumerate() {
            let period = Period::of(date);
            match out.last_mut() {
                Some(last) if last.period == period => last.steps.end = t + 1,
                _ => out.push(PeriodSlice {
                    period,
                    steps: t..t + 1,
                }),
            }
        }
        out
    }
}

fn check_values(name: &str, values: &[f64]) -> Result<()> {
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(WaterBalanceError::InvalidForcing(format!(
            "{name} contains a non-finite value at step {pos}"
        )));
    }
    if let Some(pos) = values.iter().position(|&v| v < 0.0) {
        return Err(WaterBalanceError::InvalidForcing(format!(
            "{name} contains a negative value at step {pos}"
        )));
    }
    Ok(())
}
