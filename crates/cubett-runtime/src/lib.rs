#![warn(missing_docs)]

//! cubett runtime crate: devices, buffers, ordered execution queues and the cube execution model.

extern crate alloc;

#[macro_use]
extern crate derive_new;

/// Cube execution model and plane collectives.
pub mod cube;
/// Device abstraction and the host device.
pub mod device;
/// Buffer handles.
pub mod handle;
/// Kernel tasks.
pub mod kernel;
/// Hardware properties.
pub mod properties;
/// Ordered execution queues.
pub mod queue;
/// Launch geometry and errors.
pub mod server;

pub use device::{ComputeDevice, HostDevice, OccupancyRequest};
pub use handle::{lock_pair, Handle};
pub use kernel::{CubeTask, LaunchDescriptor};
pub use properties::HardwareProperties;
pub use queue::ExecutionQueue;
pub use server::{CubeCount, CubeDim, LaunchError, ResourceLimitError, ServerError};
