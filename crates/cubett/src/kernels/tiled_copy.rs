use alloc::vec::Vec;
use core::marker::PhantomData;

use cubett_runtime::cube::{cubes, load, plane_ballot, store, units, CubePos};
use cubett_runtime::{lock_pair, CubeTask, Handle, LaunchDescriptor, ServerError};

use crate::codec::{lane_digits, major_offsets, TensorConvInOut};
use crate::launch::{TILE_DIM, TILE_ROWS};
use crate::Element;

const NAME: &str = "transpose_tiled_copy";
const NUM_ROWS: usize = (TILE_DIM / TILE_ROWS) as usize;

/// Copies tiles of the kept leading axis and the next input axis, one tile per cube.
///
/// The leading axis is contiguous in both layouts, so each unit buffers its rows in private
/// storage and no shared memory is needed.
#[derive(Debug)]
pub(crate) struct TiledCopyKernel<E: Element> {
    pub launch: LaunchDescriptor,
    pub plane_dim: u32,
    pub vol_mbar: usize,
    pub tiled_vol: (usize, usize),
    pub cu_dim_mk: usize,
    pub cu_dim_mm: usize,
    pub mbar: Vec<TensorConvInOut>,
    pub input: Handle,
    pub output: Handle,
    pub _elem: PhantomData<E>,
}

impl<E: Element> TiledCopyKernel<E> {
    fn execute_cube(
        &self,
        cube: CubePos,
        input: &[E],
        output: &mut [E],
    ) -> Result<(), ServerError> {
        let tile_dim = TILE_DIM as usize;
        let rows = TILE_ROWS as usize;
        let (vol_x, vol_y) = self.tiled_vol;

        let num_mm = vol_x.div_ceil(tile_dim);
        let bx = (cube.x as usize % num_mm) * tile_dim;
        let by = (cube.x as usize / num_mm) * tile_dim;

        let mbar = lane_digits(&self.mbar, self.plane_dim);

        // (mask, minor input offset, minor output offset) of every unit.
        let state = units(self.launch.cube_dim)
            .map(|unit| {
                let x = bx + unit.x as usize;
                let y = by + unit.y as usize;

                let mask = match x < vol_x {
                    true => plane_ballot(TILE_DIM, |lane| y + (lane as usize) < vol_y),
                    false => 0,
                };

                (mask, x + y * self.cu_dim_mk, x + y * self.cu_dim_mm)
            })
            .collect::<Vec<_>>();

        let mut values = [E::zeroed(); NUM_ROWS];
        let mut pos_mbar = cube.z as usize;
        while pos_mbar < self.vol_mbar {
            let (pos_major_in, pos_major_out) = major_offsets(&mbar, pos_mbar);

            for &(mask, pos_minor_in, pos_minor_out) in &state {
                let mut pos = pos_major_in + pos_minor_in;
                for (row, j) in (0..tile_dim).step_by(rows).enumerate() {
                    if mask & (1 << j) != 0 {
                        values[row] = load(NAME, input, pos)?;
                    }
                    pos += rows * self.cu_dim_mk;
                }

                let mut pos = pos_major_out + pos_minor_out;
                for (row, j) in (0..tile_dim).step_by(rows).enumerate() {
                    if mask & (1 << j) != 0 {
                        store(NAME, output, pos, values[row])?;
                    }
                    pos += rows * self.cu_dim_mm;
                }
            }

            pos_mbar += self.launch.cube_count.z as usize;
        }

        Ok(())
    }
}

impl<E: Element> CubeTask for TiledCopyKernel<E> {
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

        for cube in cubes(self.launch.cube_count) {
            self.execute_cube(cube, input, output)?;
        }

        Ok(())
    }
}
