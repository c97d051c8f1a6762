//! Bucket model numerical constants and run defaults.
//!
//! Centralises the fixed values used by the kernel, the aggregator and the
//! backends.

// -- Soil water recurrence --

/// Fraction of root-zone capacity below which ET is reduced by moisture stress.
pub const SOIL_ET_FRACTION: f64 = 0.5;

/// Fraction of root-zone capacity used to fill the store at simulation start.
pub const INITIAL_FILL_FRACTION: f64 = 0.5;

// -- Cell selection --

/// Land-use cells with an index at or below this floor are inactive.
pub const DEFAULT_LANDUSE_INDEX_FLOOR: u32 = 1;

// -- Backends --

/// Default number of lanes per device work group.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Largest work group accepted; matches the wgpu default compute limits.
pub const MAX_WORKGROUP_SIZE: u32 = 256;

/// Largest work-group count along one dispatch dimension.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

// -- Tolerances --

/// Absolute closure tolerance [mm] for a full-year run.
pub const CLOSURE_ATOL: f64 = 1e-2;

/// Relative tolerance for host/device agreement.
pub const BACKEND_RTOL: f64 = 1e-4;
