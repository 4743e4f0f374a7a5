use crate::properties::HardwareProperties;
use crate::queue::ExecutionQueue;
use crate::server::CubeDim;

/// Registers every unit needs regardless of its private storage.
const BASE_REGISTERS_PER_UNIT: u32 = 24;

/// A kernel configuration whose occupancy is queried.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccupancyRequest {
    /// Name of the kernel family.
    pub kernel: &'static str,
    /// Size of the moved elements, in bytes.
    pub elem_size: usize,
    /// Elements each unit holds in private storage.
    pub num_reg_storage: u32,
    /// Units per cube.
    pub cube_dim: CubeDim,
    /// Dynamic shared memory per cube, in bytes.
    pub shared_memory_size: usize,
}

/// A device able to execute cubes.
///
/// This is the seam between the planners and the hardware: the capability query, the occupancy
/// query and the default execution queue.
pub trait ComputeDevice: Send + Sync {
    /// Ordinal of the device.
    fn id(&self) -> u32;

    /// Number of devices visible to the process.
    fn device_count(&self) -> u32;

    /// Hardware limits of the device.
    fn properties(&self) -> &HardwareProperties;

    /// Maximum number of cubes of the given configuration concurrently resident on one
    /// streaming multiprocessor. Zero when the configuration can't run at all.
    ///
    /// This may be expensive; callers cache results when they query repeatedly.
    fn max_active_cubes(&self, request: &OccupancyRequest) -> u32;

    /// The default execution queue of the device.
    fn queue(&self) -> &ExecutionQueue;
}

/// A device executing cubes on the host, one queue worker thread per queue.
#[derive(Debug, Clone)]
pub struct HostDevice {
    id: u32,
    device_count: u32,
    properties: HardwareProperties,
    queue: ExecutionQueue,
}

impl HostDevice {
    /// Create the single host device with the given properties.
    pub fn new(properties: HardwareProperties) -> Self {
        Self::with_ordinal(0, 1, properties)
    }

    /// Create the device `id` out of `device_count` devices.
    ///
    /// # Panics
    /// Panics if `id` isn't smaller than `device_count`.
    pub fn with_ordinal(id: u32, device_count: u32, properties: HardwareProperties) -> Self {
        assert!(id < device_count, "Device {id} doesn't exist, only {device_count} devices");

        Self {
            id,
            device_count,
            queue: ExecutionQueue::new(properties.clone()),
            properties,
        }
    }

    /// Create an additional queue on this device.
    pub fn create_queue(&self) -> ExecutionQueue {
        ExecutionQueue::new(self.properties.clone())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(HardwareProperties::default())
    }
}

impl ComputeDevice for HostDevice {
    fn id(&self) -> u32 {
        self.id
    }

    fn device_count(&self) -> u32 {
        self.device_count
    }

    fn properties(&self) -> &HardwareProperties {
        &self.properties
    }

    fn max_active_cubes(&self, request: &OccupancyRequest) -> u32 {
        estimate_active_cubes(&self.properties, request)
    }

    fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }
}

/// Occupancy model: the number of resident cubes is limited by units, shared memory, registers
/// and the hardware cube slots of a streaming multiprocessor.
pub fn estimate_active_cubes(properties: &HardwareProperties, request: &OccupancyRequest) -> u32 {
    let units = request.cube_dim.num_elems();
    if units == 0 || units > properties.max_units_per_cube {
        return 0;
    }
    if request.shared_memory_size > properties.max_shared_memory_size {
        return 0;
    }

    // Units are allocated by whole planes.
    let allocated_units = properties.planes_for(units) * properties.plane_size;

    let by_units = properties.max_units_per_sm / allocated_units;
    let by_shared_memory = match request.shared_memory_size {
        0 => properties.max_cubes_per_sm,
        size => (properties.max_shared_memory_per_sm / size) as u32,
    };
    let words_per_elem = request.elem_size.div_ceil(4) as u32;
    let registers_per_unit =
        BASE_REGISTERS_PER_UNIT + request.num_reg_storage * (3 + words_per_elem);
    let by_registers = properties.registers_per_sm / (registers_per_unit * allocated_units);

    properties
        .max_cubes_per_sm
        .min(by_units)
        .min(by_shared_memory)
        .min(by_registers)
}
