use cubett_runtime::cube::{cubes, load, store, units};
use cubett_runtime::{CubeCount, CubeDim, CubeTask, Handle, LaunchDescriptor, ServerError};

/// Adds two `u32` buffers, one element per unit.
#[derive(Debug)]
pub struct DummyElementwiseAddition {
    pub lhs: Handle,
    pub rhs: Handle,
    pub out: Handle,
    pub launch: LaunchDescriptor,
}

impl DummyElementwiseAddition {
    pub fn new(lhs: Handle, rhs: Handle, out: Handle, len: u32) -> Self {
        let cube_dim = CubeDim::new_1d(32);
        let launch = LaunchDescriptor::new(cube_dim, CubeCount::new_1d(len.div_ceil(32)), 0);

        Self {
            lhs,
            rhs,
            out,
            launch,
        }
    }
}

impl CubeTask for DummyElementwiseAddition {
    fn name(&self) -> &'static str {
        "dummy_addition"
    }

    fn launch(&self) -> LaunchDescriptor {
        self.launch
    }

    fn execute(self: Box<Self>) -> Result<(), ServerError> {
        let lhs = self.lhs.read();
        let rhs = self.rhs.read();
        let mut out = self.out.write();
        let (lhs, rhs) = (lhs.as_slice::<u32>(), rhs.as_slice::<u32>());
        let out = out.as_slice_mut::<u32>();

        for cube in cubes(self.launch.cube_count) {
            for unit in units(self.launch.cube_dim) {
                let index = (cube.x * 32 + unit.index) as usize;
                if index < out.len() {
                    let value = load(self.name(), lhs, index)? + load(self.name(), rhs, index)?;
                    store(self.name(), out, index, value)?;
                }
            }
        }

        Ok(())
    }
}

/// Panics while executing.
#[derive(Debug)]
pub struct DummyPanic;

impl CubeTask for DummyPanic {
    fn name(&self) -> &'static str {
        "dummy_panic"
    }

    fn launch(&self) -> LaunchDescriptor {
        LaunchDescriptor::new(CubeDim::new_single(), CubeCount::new_single(), 0)
    }

    fn execute(self: Box<Self>) -> Result<(), ServerError> {
        panic!("Dummy kernel failure");
    }
}
