use serde::{Deserialize, Serialize};

use crate::server::{CubeCount, CubeDim};

/// Properties of the hardware a device executes on.
///
/// These are the only capabilities the planners look at. They mirror what a device driver reports
/// through its capability query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareProperties {
    /// Number of units executing in lock-step in a plane (warp).
    pub plane_size: u32,
    /// Maximum number of units in a single cube.
    pub max_units_per_cube: u32,
    /// Maximum extents of a single cube.
    pub max_cube_dim: CubeDim,
    /// Maximum extents of the grid.
    pub max_cube_count: CubeCount,
    /// Maximum shared memory a single cube can allocate, in bytes.
    pub max_shared_memory_size: usize,
    /// Number of streaming multiprocessors.
    pub num_streaming_multiprocessors: u32,
    /// Maximum number of units resident on one streaming multiprocessor.
    pub max_units_per_sm: u32,
    /// Maximum number of cubes resident on one streaming multiprocessor.
    pub max_cubes_per_sm: u32,
    /// Shared memory available on one streaming multiprocessor, in bytes.
    pub max_shared_memory_per_sm: usize,
    /// 32-bit registers available on one streaming multiprocessor.
    pub registers_per_sm: u32,
}

impl HardwareProperties {
    /// Number of planes needed to hold `units` units.
    pub fn planes_for(&self, units: u32) -> u32 {
        units.div_ceil(self.plane_size)
    }
}

impl Default for HardwareProperties {
    /// A mid-range discrete accelerator.
    fn default() -> Self {
        Self {
            plane_size: 32,
            max_units_per_cube: 1024,
            max_cube_dim: CubeDim::new_3d(1024, 1024, 64),
            max_cube_count: CubeCount::new_3d(i32::MAX as u32, u16::MAX as u32, u16::MAX as u32),
            max_shared_memory_size: 48 * 1024,
            num_streaming_multiprocessors: 16,
            max_units_per_sm: 2048,
            max_cubes_per_sm: 32,
            max_shared_memory_per_sm: 96 * 1024,
            registers_per_sm: 64 * 1024,
        }
    }
}
