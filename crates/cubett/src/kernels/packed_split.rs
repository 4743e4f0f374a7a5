use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

use cubett_runtime::cube::{cubes, load, store, units, CubePos};
use cubett_runtime::{lock_pair, CubeTask, Handle, LaunchDescriptor, ServerError};

use crate::codec::{lane_digits, major_offsets, minor_offsets, TensorConv, TensorConvInOut};
use crate::Element;

const NAME: &str = "transpose_packed_split";

/// Relays a slice of the minor group through shared memory, `N` elements per unit.
///
/// Cube `x` selects the slice of the split axis, cube `y` strides over the major group. Slice `s`
/// covers split coordinates `s * split_dim / num_split` up to `(s + 1) * split_dim / num_split`,
/// so slices hold either `split_dim / num_split` coordinates or one more, each with its own
/// digit table.
#[derive(Debug)]
pub(crate) struct PackedSplitKernel<E: Element, const N: usize> {
    pub launch: LaunchDescriptor,
    pub plane_dim: u32,
    pub split_dim: usize,
    pub vol_mmk_unsplit: usize,
    pub vol_mbar: usize,
    pub size_mmk: usize,
    /// Input stride of the split axis.
    pub split_stride_in: usize,
    /// Output stride of the split axis.
    pub split_stride_out: usize,
    pub mmk: Vec<TensorConvInOut>,
    pub msh: Vec<TensorConv>,
    pub mbar: Vec<TensorConvInOut>,
    pub input: Handle,
    pub output: Handle,
    pub _elem: PhantomData<E>,
}

impl<E: Element, const N: usize> PackedSplitKernel<E, N> {
    fn execute_cube(
        &self,
        cube: CubePos,
        input: &[E],
        output: &mut [E],
        shared: &mut [E],
    ) -> Result<(), ServerError> {
        let cube_units = self.launch.cube_dim.num_elems() as usize;
        let num_split = self.launch.cube_count.x as usize;
        let split = cube.x as usize;

        let p0 = split * self.split_dim / num_split;
        let vol_split = (split + 1) * self.split_dim / num_split - p0;
        let plus_one = vol_split - self.split_dim / num_split;
        let vol_mmk_split = vol_split * self.vol_mmk_unsplit;

        let table = plus_one * self.size_mmk..(plus_one + 1) * self.size_mmk;
        let mmk = lane_digits(&self.mmk[table.clone()], self.plane_dim);
        let msh = lane_digits(&self.msh[table], self.plane_dim);
        let mbar = lane_digits(&self.mbar, self.plane_dim);

        let base_in = p0 * self.split_stride_in;
        let base_out = p0 * self.split_stride_out;
        let offsets = units(self.launch.cube_dim)
            .map(|unit| {
                let unit = unit.index as usize;
                let offsets = minor_offsets::<N>(
                    &mmk,
                    &msh,
                    self.size_mmk,
                    unit,
                    cube_units,
                    base_in,
                    base_out,
                );
                (unit, offsets)
            })
            .collect::<Vec<_>>();

        let mut pos_mbar = cube.y as usize;
        while pos_mbar < self.vol_mbar {
            let (pos_major_in, pos_major_out) = major_offsets(&mbar, pos_mbar);

            for (unit, offsets) in &offsets {
                for j in 0..N {
                    let pos_mmk = unit + j * cube_units;
                    if pos_mmk < vol_mmk_split {
                        let value = load(NAME, input, pos_major_in + offsets.input[j])?;
                        store(NAME, shared, pos_mmk, value)?;
                    }
                }
            }

            for (unit, offsets) in &offsets {
                for j in 0..N {
                    let pos_mmk = unit + j * cube_units;
                    if pos_mmk < vol_mmk_split {
                        let value = load(NAME, shared, offsets.shared[j])?;
                        store(NAME, output, pos_major_out + offsets.output[j], value)?;
                    }
                }
            }

            pos_mbar += self.launch.cube_count.y as usize;
        }

        Ok(())
    }
}

impl<E: Element, const N: usize> CubeTask for PackedSplitKernel<E, N> {
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
