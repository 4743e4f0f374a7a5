use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

use cubett_runtime::cube::{cubes, load, store, units, CubePos};
use cubett_runtime::{lock_pair, CubeTask, Handle, LaunchDescriptor, ServerError};

use crate::codec::{lane_digits, major_offsets, minor_offsets, TensorConv, TensorConvInOut};
use crate::Element;

const NAME: &str = "transpose_packed";

/// Relays the whole minor group through shared memory, `N` elements per unit.
///
/// Cube `x` strides over the major group. Every unit decodes the offsets of its `N` slots once,
/// then each batch is copied to shared memory in input order and written back in output order.
#[derive(Debug)]
pub(crate) struct PackedKernel<E: Element, const N: usize> {
    pub launch: LaunchDescriptor,
    pub plane_dim: u32,
    pub vol_mmk: usize,
    pub vol_mbar: usize,
    pub mmk: Vec<TensorConvInOut>,
    pub msh: Vec<TensorConv>,
    pub mbar: Vec<TensorConvInOut>,
    pub input: Handle,
    pub output: Handle,
    pub _elem: PhantomData<E>,
}

impl<E: Element, const N: usize> PackedKernel<E, N> {
    fn execute_cube(
        &self,
        cube: CubePos,
        input: &[E],
        output: &mut [E],
        shared: &mut [E],
    ) -> Result<(), ServerError> {
        let cube_units = self.launch.cube_dim.num_elems() as usize;

        let mmk = lane_digits(&self.mmk, self.plane_dim);
        let msh = lane_digits(&self.msh, self.plane_dim);
        let mbar = lane_digits(&self.mbar, self.plane_dim);

        let offsets = units(self.launch.cube_dim)
            .map(|unit| {
                let unit = unit.index as usize;
                let table_len = self.mmk.len();
                let offsets = minor_offsets::<N>(&mmk, &msh, table_len, unit, cube_units, 0, 0);
                (unit, offsets)
            })
            .collect::<Vec<_>>();

        let mut pos_mbar = cube.x as usize;
        while pos_mbar < self.vol_mbar {
            let (pos_major_in, pos_major_out) = major_offsets(&mbar, pos_mbar);

            for (unit, offsets) in &offsets {
                for j in 0..N {
                    let pos_mmk = unit + j * cube_units;
                    if pos_mmk < self.vol_mmk {
                        let value = load(NAME, input, pos_major_in + offsets.input[j])?;
                        store(NAME, shared, pos_mmk, value)?;
                    }
                }
            }

            for (unit, offsets) in &offsets {
                for j in 0..N {
                    let pos_mmk = unit + j * cube_units;
                    if pos_mmk < self.vol_mmk {
                        let value = load(NAME, shared, offsets.shared[j])?;
                        store(NAME, output, pos_major_out + offsets.output[j], value)?;
                    }
                }
            }

            pos_mbar += self.launch.cube_count.x as usize;
        }

        Ok(())
    }
}

impl<E: Element, const N: usize> CubeTask for PackedKernel<E, N> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn launch(&self) -> LaunchDescriptor {
        self.launch
    }

    fn execute(self: Box<Self>) -> Result<(), ServerError> {
        let (input, mut output) = lock_pair(NAME, &self.input, &self.output)?;
        let input = input.as_slice::<E>();
        let output = output.as_slice_mut::<E>();

        let mut shared =
            vec![E::zeroed(); self.launch.shared_memory_size / core::mem::size_of::<E>()];

        for cube in cubes(self.launch.cube_count) {
            self.execute_cube(cube, input, output, &mut shared)?;
        }

        Ok(())
    }
}
