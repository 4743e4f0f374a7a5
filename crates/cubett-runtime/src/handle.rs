use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bytemuck::Pod;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::server::ServerError;

/// Width in bytes of the widest natural load: one backing word.
pub const WORD_SIZE: usize = core::mem::size_of::<u128>();

/// Unique identifier of a buffer.
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug, PartialOrd, Ord)]
pub struct BufferId {
    value: u64,
}

impl BufferId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let value = COUNTER.fetch_add(1, Ordering::Relaxed);
        if value == u64::MAX {
            core::panic!("Buffer ID overflowed");
        }
        Self { value }
    }
}

/// Device memory backing one buffer.
///
/// The backing store is made of 16-byte words so that any element view, including the widest
/// vector view, starts aligned.
#[derive(Debug)]
pub struct Storage {
    words: Vec<u128>,
    size: usize,
}

impl Storage {
    fn zeroed(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(WORD_SIZE)],
            size,
        }
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The buffer content as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u128, u8>(&self.words)[..self.size]
    }

    /// The buffer content as mutable bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u128, u8>(&mut self.words)[..self.size]
    }

    /// The buffer viewed as elements. Trailing bytes that don't form a whole element are ignored.
    pub fn as_slice<E: Pod>(&self) -> &[E] {
        let len = self.size / core::mem::size_of::<E>();
        &bytemuck::cast_slice::<u128, E>(&self.words)[..len]
    }

    /// The buffer viewed as mutable elements.
    pub fn as_slice_mut<E: Pod>(&mut self) -> &mut [E] {
        let len = self.size / core::mem::size_of::<E>();
        &mut bytemuck::cast_slice_mut::<u128, E>(&mut self.words)[..len]
    }
}

/// Reference counted handle to a device buffer.
///
/// Cloning a handle doesn't copy the memory. Kernels take read locks on their inputs and a
/// write lock on their output for the duration of their execution, see [lock_pair].
#[derive(Debug, Clone)]
pub struct Handle {
    id: BufferId,
    size: usize,
    storage: Arc<RwLock<Storage>>,
}

impl Handle {
    /// Allocate a zero filled buffer of `size` bytes.
    pub fn empty(size: usize) -> Self {
        Self {
            id: BufferId::new(),
            size,
            storage: Arc::new(RwLock::new(Storage::zeroed(size))),
        }
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut storage = Storage::zeroed(data.len());
        storage.as_bytes_mut().copy_from_slice(data);

        Self {
            id: BufferId::new(),
            size: data.len(),
            storage: Arc::new(RwLock::new(storage)),
        }
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn from_slice<E: Pod>(data: &[E]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data))
    }

    /// The buffer identifier.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size of the buffer in bytes. Doesn't wait for the work using the buffer.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether both handles point to the same memory.
    pub fn same_buffer(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Lock the buffer for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read()
    }

    /// Lock the buffer for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write()
    }

    /// Copy the content of the buffer to the host.
    ///
    /// This doesn't wait for pending work; sync the queue writing to it first.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.read().as_bytes().to_vec()
    }

    /// Copy the content of the buffer to the host as elements.
    pub fn to_vec<E: Pod>(&self) -> Vec<E> {
        self.read().as_slice::<E>().to_vec()
    }
}

/// Lock `input` for reading and `output` for writing, in buffer id order.
///
/// Tasks moving data in opposite directions between two buffers, on two queues, take the locks in
/// the same order and can't deadlock. Both handles pointing to the same memory is an error.
pub fn lock_pair<'a>(
    kernel: &'static str,
    input: &'a Handle,
    output: &'a Handle,
) -> Result<(RwLockReadGuard<'a, Storage>, RwLockWriteGuard<'a, Storage>), ServerError> {
    if input.same_buffer(output) {
        return Err(ServerError::Generic {
            kernel,
            reason: "The input and the output are the same buffer".into(),
        });
    }

    if input.id < output.id {
        let input = input.read();
        Ok((input, output.write()))
    } else {
        let output = output.write();
        Ok((input.read(), output))
    }
}
