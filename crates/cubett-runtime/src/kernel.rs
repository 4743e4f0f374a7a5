use alloc::boxed::Box;
use core::fmt::Debug;

use crate::server::{CubeCount, CubeDim, ServerError};

/// Launch geometry of a kernel, validated against the device before submission.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchDescriptor {
    /// Units per cube.
    pub cube_dim: CubeDim,
    /// Cubes in the grid.
    pub cube_count: CubeCount,
    /// Dynamic shared memory per cube, in bytes.
    pub shared_memory_size: usize,
}

/// Work that can be submitted to an [execution queue](crate::queue::ExecutionQueue).
///
/// The task owns everything it needs: buffer handles, digit tables and scalars. It is moved to
/// the queue worker and consumed there.
pub trait CubeTask: Send + Debug + 'static {
    /// Name of the kernel, used in diagnostics.
    fn name(&self) -> &'static str;

    /// The launch geometry of the task.
    fn launch(&self) -> LaunchDescriptor;

    /// Execute every cube of the grid.
    fn execute(self: Box<Self>) -> Result<(), ServerError>;
}
