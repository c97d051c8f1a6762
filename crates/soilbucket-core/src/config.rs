//! Run configuration and backend selection.

use std::fmt;
use std::str::FromStr;

use crate::constants::{
    CLOSURE_ATOL, DEFAULT_LANDUSE_INDEX_FLOOR, DEFAULT_WORKGROUP_SIZE, MAX_WORKGROUP_SIZE,
};
use crate::error::{Result, WaterBalanceError};

/// Execution strategy for kernel dispatch.
///
/// The set is closed: identifiers are parsed with [`Backend::from_str`], and
/// anything else is rejected before buffers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Thread-pool parallel-for over cells, double precision.
    #[default]
    Host,
    /// One compute lane per cell on a wgpu device, single precision.
    Device,
}

impl Backend {
    /// Canonical lowercase identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Host => "host",
            Backend::Device => "device",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = WaterBalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(Backend::Host),
            "device" | "gpu" => Ok(Backend::Device),
            _ => Err(WaterBalanceError::UnknownBackend(s.to_string())),
        }
    }
}

/// Settings for one water-balance run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Execution strategy.
    pub backend: Backend,
    /// Lanes per work group on the device backend.
    pub workgroup_size: u32,
    /// Worker threads on the host backend; `None` uses the global rayon pool.
    pub host_threads: Option<usize>,
    /// Cells whose land-use index is at or below this floor are skipped.
    pub landuse_index_floor: u32,
    /// Closure residual [mm] above which a warning is logged.
    pub closure_tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Host,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            host_threads: None,
            landuse_index_floor: DEFAULT_LANDUSE_INDEX_FLOOR,
            closure_tolerance: CLOSURE_ATOL,
        }
    }
}

impl SimulationConfig {
    /// Default settings with the given backend.
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Check every field; called before any allocation.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WORKGROUP_SIZE).contains(&self.workgroup_size) {
            return Err(WaterBalanceError::InvalidConfig(format!(
                "workgroup_size = {} is out of bounds [1, {}]",
                self.workgroup_size, MAX_WORKGROUP_SIZE
            )));
        }
        if self.host_threads == Some(0) {
            return Err(WaterBalanceError::InvalidConfig(
                "host_threads must be at least 1".to_string(),
            ));
        }
        if !(self.closure_tolerance.is_finite() && self.closure_tolerance >= 0.0) {
            return Err(WaterBalanceError::InvalidConfig(format!(
                "closure_tolerance = {} must be finite and non-negative",
                self.closure_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Backend parsing --

    #[test]
    fn parses_known_identifiers() {
        assert_eq!("host".parse::<Backend>().unwrap(), Backend::Host);
        assert_eq!("CPU".parse::<Backend>().unwrap(), Backend::Host);
        assert_eq!("device".parse::<Backend>().unwrap(), Backend::Device);
        assert_eq!(" gpu ".parse::<Backend>().unwrap(), Backend::Device);
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = "opencl".parse::<Backend>().unwrap_err();
        assert!(matches!(err, WaterBalanceError::UnknownBackend(ref s) if s == "opencl"));
    }

    #[test]
    fn display_roundtrip() {
        for b in [Backend::Host, Backend::Device] {
            assert_eq!(b.to_string().parse::<Backend>().unwrap(), b);
        }
    }

    // -- SimulationConfig --

    #[test]
    fn default_config_is_valid() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.workgroup_size, 64);
        assert_eq!(cfg.landuse_index_floor, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workgroup() {
        let cfg = SimulationConfig {
            workgroup_size: 0,
            ..SimulationConfig::default()
        };
        assert!(cfg.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_oversized_workgroup() {
        let cfg = SimulationConfig {
            workgroup_size: 512,
            ..SimulationConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_threads() {
        let cfg = SimulationConfig {
            host_threads: Some(0),
            ..SimulationConfig::with_backend(Backend::Host)
        };
        assert!(cfg.validate().is_err());
    }
}
