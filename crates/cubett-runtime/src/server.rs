use alloc::string::String;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of units in each dimension of a cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CubeDim {
    /// Units along x.
    pub x: u32,
    /// Units along y.
    pub y: u32,
    /// Units along z.
    pub z: u32,
}

impl CubeDim {
    /// A cube with a single unit.
    pub const fn new_single() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }

    /// A one dimensional cube.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// A two dimensional cube.
    pub const fn new_2d(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// A three dimensional cube.
    pub const fn new_3d(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of units in the cube.
    pub const fn num_elems(&self) -> u32 {
        self.x * self.y * self.z
    }
}

impl Default for CubeDim {
    fn default() -> Self {
        Self::new_single()
    }
}

/// Number of cubes in each dimension of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CubeCount {
    /// Cubes along x.
    pub x: u32,
    /// Cubes along y.
    pub y: u32,
    /// Cubes along z.
    pub z: u32,
}

impl CubeCount {
    /// A grid with a single cube.
    pub const fn new_single() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }

    /// A one dimensional grid.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// A two dimensional grid.
    pub const fn new_2d(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// A three dimensional grid.
    pub const fn new_3d(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of cubes in the grid.
    pub fn num_cubes(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Whether every extent is within the given maxima.
    pub fn fits(&self, max: &CubeCount) -> bool {
        self.x <= max.x && self.y <= max.y && self.z <= max.z
    }
}

impl Default for CubeCount {
    fn default() -> Self {
        Self::new_single()
    }
}

/// Kernel Launch Errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// Too many resources were requested
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// The queue worker is gone and can't accept new work.
    #[error("The execution queue {queue} is closed")]
    QueueClosed {
        /// Identifier of the closed queue.
        queue: u64,
    },
}

/// Resource limit errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    /// Shared memory exceeds maximum
    #[error(
        "Too much shared memory requested.\nRequested {requested} bytes, maximum {max} bytes available."
    )]
    SharedMemory {
        /// Value requested
        requested: usize,
        /// Maximum value
        max: usize,
    },
    /// Total units exceeds maximum
    #[error("Total unit count exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    Units {
        /// Requested value
        requested: u32,
        /// Maximum value
        max: u32,
    },
    /// `CubeDim` exceeds maximum
    #[error("Cube dim exceeds maximum bounds.\nRequested {requested:?}, max is {max:?}.")]
    CubeDim {
        /// Requested value
        requested: (u32, u32, u32),
        /// Maximum value
        max: (u32, u32, u32),
    },
    /// `CubeCount` exceeds maximum
    #[error("Cube count exceeds maximum bounds.\nRequested {requested:?}, max is {max:?}.")]
    CubeCount {
        /// Requested value
        requested: (u32, u32, u32),
        /// Maximum value
        max: (u32, u32, u32),
    },
}

/// Error that can happen asynchronously while executing submitted work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// A kernel accessed a buffer outside of its bounds.
    #[error("Kernel `{kernel}` accessed index {index} of a buffer holding {len} elements")]
    OutOfBounds {
        /// Name of the faulting kernel.
        kernel: &'static str,
        /// The faulting index.
        index: usize,
        /// Number of elements in the buffer.
        len: usize,
    },
    /// A generic runtime error.
    #[error("An error happened during execution of `{kernel}`\nCaused by:\n  {reason}")]
    Generic {
        /// Name of the faulting kernel.
        kernel: &'static str,
        /// The details of the generic error.
        reason: String,
    },
}
