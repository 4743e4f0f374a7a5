use alloc::string::String;
use core::fmt::Debug;

use cubett_runtime::{CubeCount, LaunchError, ServerError};

use crate::TransposeStrategy;

/// No launch configuration satisfies the device limits.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlanError {
    /// The minor group doesn't fit in the shared memory of one cube.
    #[error(
        "{strategy:?} requires {requested} bytes of shared memory, the device offers {max} bytes per cube"
    )]
    SharedMemory {
        /// Strategy being planned.
        strategy: TransposeStrategy,
        /// Bytes of shared memory requested.
        requested: usize,
        /// Bytes of shared memory available per cube.
        max: usize,
    },

    /// Even at the highest register storage, a cube would need too many units.
    #[error("{strategy:?} requires at least {requested} units per cube, max is {max}")]
    Units {
        /// Strategy being planned.
        strategy: TransposeStrategy,
        /// Smallest unit count per cube.
        requested: u32,
        /// Max unit count per cube.
        max: u32,
    },

    /// The grid is larger than the device allows.
    #[error("{strategy:?} requires a grid of {requested:?} cubes, max is {max:?}")]
    CubeCount {
        /// Strategy being planned.
        strategy: TransposeStrategy,
        /// Requested grid.
        requested: CubeCount,
        /// Max grid.
        max: CubeCount,
    },

    /// No candidate configuration has a single resident cube.
    #[error("No configuration of {strategy:?} has a resident cube on the device")]
    NoResidentCube {
        /// Strategy being planned.
        strategy: TransposeStrategy,
    },
}

/// Errors that can happen while planning or executing a transposition.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransposeError {
    /// No launch configuration was found for the plan.
    #[error("Unable to find a launch configuration\nCaused by:\n  {0}")]
    Infeasible(#[from] LaunchPlanError),

    /// The element width has no kernel.
    #[error("Elements of {size} bytes are not supported, only 2, 4 and 8 bytes elements are")]
    UnsupportedElementWidth {
        /// Size of the elements in bytes.
        size: usize,
    },

    /// The register storage of the plan is outside the generated kernels.
    #[error(
        "No kernel is generated for {num_reg_storage} elements of register storage per unit, supported range is 1..={max}"
    )]
    UnimplementedRegisterStorage {
        /// Register storage requested by the plan.
        num_reg_storage: u32,
        /// Highest generated register storage.
        max: u32,
    },

    /// The launch was rejected by the queue.
    #[error("The launch was rejected\nCaused by:\n  {0}")]
    Launch(#[from] LaunchError),

    /// The queue reported an error after submission.
    #[error("An error happened during execution\nCaused by:\n  {0}")]
    Execution(#[from] ServerError),

    /// The plan can't be built or executed as described.
    #[error("Invalid plan: {reason}")]
    InvalidPlan {
        /// Why the plan is invalid.
        reason: String,
    },

    /// Input and output are the same buffer.
    #[error("In-place transposition is not supported, input and output must be distinct buffers")]
    InPlace,

    /// A buffer is smaller than the elements it must hold.
    #[error("Buffer too small: {required} bytes are required, the buffer holds {actual} bytes")]
    BufferTooSmall {
        /// Bytes required.
        required: usize,
        /// Bytes available.
        actual: usize,
    },
}

impl TransposeError {
    pub(crate) fn invalid_plan<R: Into<String>>(reason: R) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }
}
