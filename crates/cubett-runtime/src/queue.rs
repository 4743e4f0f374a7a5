use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use std::panic::AssertUnwindSafe;

use crate::handle::{lock_pair, Handle};
use crate::kernel::{CubeTask, LaunchDescriptor};
use crate::properties::HardwareProperties;
use crate::server::{LaunchError, ResourceLimitError, ServerError};

type Callback<Response> = async_channel::Sender<Response>;

enum Message {
    Execute(Box<dyn CubeTask>),
    Copy { src: Handle, dst: Handle, size: usize },
    Sync(Callback<()>),
}

/// An ordered execution queue (stream).
///
/// Work submitted to a queue runs on its own worker thread, first in first out. Submission never
/// waits for execution. Failures of executed work are recorded and can be collected with
/// [take_error](Self::take_error), which only sees work that already completed, or with
/// [sync](Self::sync), which waits for everything submitted before it.
#[derive(Debug, Clone)]
pub struct ExecutionQueue {
    state: Arc<QueueState>,
}

#[derive(Debug)]
struct QueueState {
    id: u64,
    sender: async_channel::Sender<Message>,
    errors: Arc<spin::Mutex<Vec<ServerError>>>,
    properties: HardwareProperties,
}

impl ExecutionQueue {
    /// Create a new queue validating launches against `properties`.
    pub fn new(properties: HardwareProperties) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = async_channel::unbounded::<Message>();
        let errors = Arc::new(spin::Mutex::new(Vec::new()));
        let errors_worker = errors.clone();

        std::thread::Builder::new()
            .name(format!("cubett-queue-{id}"))
            .spawn(move || {
                while let Ok(message) = receiver.recv_blocking() {
                    let result = match message {
                        Message::Execute(task) => run_task(task),
                        Message::Copy { src, dst, size } => copy_bytes(&src, &dst, size),
                        Message::Sync(callback) => {
                            // The caller may have given up waiting.
                            let _ = callback.send_blocking(());
                            Ok(())
                        }
                    };

                    if let Err(err) = result {
                        log::error!("Queue {id}: {err}");
                        errors_worker.lock().push(err);
                    }
                }
            })
            .unwrap_or_else(|err| panic!("Unable to spawn the worker of queue {id}: {err}"));

        Self {
            state: Arc::new(QueueState {
                id,
                sender,
                errors,
                properties,
            }),
        }
    }

    /// Identifier of the queue.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// The properties launches are validated against.
    pub fn properties(&self) -> &HardwareProperties {
        &self.state.properties
    }

    /// Submit a kernel for execution after all previously submitted work.
    ///
    /// The launch geometry is validated against the device limits first; a launch that doesn't fit
    /// is rejected without being queued.
    pub fn submit(&self, task: Box<dyn CubeTask>) -> Result<(), LaunchError> {
        validate_launch(&self.state.properties, &task.launch())?;
        log::trace!("Queue {}: submit {} {:?}", self.id(), task.name(), task.launch());

        self.send(Message::Execute(task))
    }

    /// Asynchronously copy the first `size` bytes of `src` into `dst`.
    pub fn copy(&self, src: &Handle, dst: &Handle, size: usize) -> Result<(), LaunchError> {
        self.send(Message::Copy {
            src: src.clone(),
            dst: dst.clone(),
            size,
        })
    }

    /// Take the first error raised by work that has already completed, if any.
    ///
    /// Work still pending in the queue isn't waited for, so a failure of the most recent
    /// submission may only show up on a later call.
    pub fn take_error(&self) -> Option<ServerError> {
        let mut errors = self.state.errors.lock();
        if errors.is_empty() {
            return None;
        }
        let first = errors.remove(0);
        errors.clear();
        Some(first)
    }

    /// Wait for all submitted work to complete and return the first error it raised.
    pub fn sync(&self) -> Result<(), ServerError> {
        let (callback, response) = async_channel::bounded(1);
        self.send(Message::Sync(callback))
            .map_err(|err| ServerError::Generic {
                kernel: "sync",
                reason: format!("{err}"),
            })?;

        response.recv_blocking().map_err(|_| ServerError::Generic {
            kernel: "sync",
            reason: format!("The worker of queue {} stopped", self.id()),
        })?;

        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn send(&self, message: Message) -> Result<(), LaunchError> {
        self.state
            .sender
            .send_blocking(message)
            .map_err(|_| LaunchError::QueueClosed { queue: self.id() })
    }
}

/// Check a launch geometry against the device limits.
pub fn validate_launch(
    properties: &HardwareProperties,
    launch: &LaunchDescriptor,
) -> Result<(), ResourceLimitError> {
    let dim = launch.cube_dim;
    let max_dim = properties.max_cube_dim;
    if dim.x > max_dim.x || dim.y > max_dim.y || dim.z > max_dim.z {
        return Err(ResourceLimitError::CubeDim {
            requested: (dim.x, dim.y, dim.z),
            max: (max_dim.x, max_dim.y, max_dim.z),
        });
    }

    if dim.num_elems() > properties.max_units_per_cube {
        return Err(ResourceLimitError::Units {
            requested: dim.num_elems(),
            max: properties.max_units_per_cube,
        });
    }

    if launch.shared_memory_size > properties.max_shared_memory_size {
        return Err(ResourceLimitError::SharedMemory {
            requested: launch.shared_memory_size,
            max: properties.max_shared_memory_size,
        });
    }

    let count = launch.cube_count;
    let max_count = properties.max_cube_count;
    if !count.fits(&max_count) {
        return Err(ResourceLimitError::CubeCount {
            requested: (count.x, count.y, count.z),
            max: (max_count.x, max_count.y, max_count.z),
        });
    }

    Ok(())
}

fn run_task(task: Box<dyn CubeTask>) -> Result<(), ServerError> {
    let name = task.name();

    match std::panic::catch_unwind(AssertUnwindSafe(move || task.execute())) {
        Ok(result) => result,
        Err(_) => Err(ServerError::Generic {
            kernel: name,
            reason: "The kernel panicked".into(),
        }),
    }
}

fn copy_bytes(src: &Handle, dst: &Handle, size: usize) -> Result<(), ServerError> {
    if src.same_buffer(dst) {
        return Ok(());
    }

    let (src, mut dst) = lock_pair("copy", src, dst)?;
    let len = src.size().min(dst.size());
    if size > len {
        return Err(ServerError::OutOfBounds {
            kernel: "copy",
            index: size - 1,
            len,
        });
    }

    dst.as_bytes_mut()[..size].copy_from_slice(&src.as_bytes()[..size]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{CubeCount, CubeDim};

    #[test_log::test]
    fn copy_is_ordered_and_synced() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let src = Handle::from_slice(&[1u32, 2, 3, 4]);
        let mid = Handle::empty(16);
        let dst = Handle::empty(16);

        queue.copy(&src, &mid, 16).unwrap();
        queue.copy(&mid, &dst, 8).unwrap();
        queue.sync().unwrap();

        assert_eq!(dst.to_vec::<u32>(), vec![1, 2, 0, 0]);
    }

    #[test_log::test]
    fn copy_out_of_bounds_is_reported_on_sync() {
        let queue = ExecutionQueue::new(HardwareProperties::default());
        let src = Handle::empty(8);
        let dst = Handle::empty(4);

        queue.copy(&src, &dst, 8).unwrap();

        assert!(matches!(
            queue.sync(),
            Err(ServerError::OutOfBounds { kernel: "copy", .. })
        ));
        assert_eq!(queue.sync(), Ok(()));
    }

    #[test]
    fn launch_exceeding_limits_is_rejected() {
        let properties = HardwareProperties::default();
        let launch = LaunchDescriptor::new(CubeDim::new_1d(2048), CubeCount::new_single(), 0);

        assert!(matches!(
            validate_launch(&properties, &launch),
            Err(ResourceLimitError::CubeDim { .. })
        ));

        let launch = LaunchDescriptor::new(
            CubeDim::new_1d(64),
            CubeCount::new_single(),
            properties.max_shared_memory_size + 1,
        );
        assert!(matches!(
            validate_launch(&properties, &launch),
            Err(ResourceLimitError::SharedMemory { .. })
        ));

        let launch = LaunchDescriptor::new(
            CubeDim::new_1d(64),
            CubeCount::new_3d(1, 1, u32::MAX),
            0,
        );
        assert!(matches!(
            validate_launch(&properties, &launch),
            Err(ResourceLimitError::CubeCount { .. })
        ));
    }
}
