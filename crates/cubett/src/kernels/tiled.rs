use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

use cubett_runtime::cube::{cubes, load, plane_ballot, store, units, CubePos};
use cubett_runtime::{lock_pair, CubeTask, Handle, LaunchDescriptor, ServerError};

use crate::codec::{lane_digits, major_offsets, TensorConvInOut};
use crate::launch::{tile_padding, TILE_DIM, TILE_ROWS};
use crate::Element;

const NAME: &str = "transpose_tiled";

/// Transposes `TILE_DIM x TILE_DIM` tiles through shared memory.
///
/// Cube `x` selects the tile in the (`Mm`, `Mk`) plane, cube `z` strides over the major group.
/// Units read tile rows `ty + j` at column `tx` and write back columns, so both the reads and the
/// writes are contiguous along the fastest axis of their layout.
#[derive(Debug)]
pub(crate) struct TiledKernel<E: Element> {
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

struct TiledUnit {
    tx: usize,
    ty: usize,
    mask_in: u64,
    mask_out: u64,
    pos_minor_in: usize,
    pos_minor_out: usize,
}

impl<E: Element> TiledKernel<E> {
    fn execute_cube(
        &self,
        cube: CubePos,
        input: &[E],
        output: &mut [E],
        tile: &mut [E],
    ) -> Result<(), ServerError> {
        let tile_dim = TILE_DIM as usize;
        let rows = TILE_ROWS as usize;
        let pitch = tile_dim + tile_padding(E::WIDTH);
        let (vol_x, vol_y) = self.tiled_vol;

        let num_mm = vol_x.div_ceil(tile_dim);
        let bx = (cube.x as usize % num_mm) * tile_dim;
        let by = (cube.x as usize / num_mm) * tile_dim;

        let mbar = lane_digits(&self.mbar, self.plane_dim);

        // Boundary masks are computed once per cube: bit `j` tells whether row `j` is in bounds.
        let state = units(self.launch.cube_dim)
            .map(|unit| {
                let (tx, ty) = (unit.x as usize, unit.y as usize);
                let (xin, yin) = (bx + tx, by + ty);
                let (xout, yout) = (bx + ty, by + tx);

                let mask_in = match xin < vol_x {
                    true => plane_ballot(TILE_DIM, |lane| yin + (lane as usize) < vol_y),
                    false => 0,
                };
                let mask_out = match yout < vol_y {
                    true => plane_ballot(TILE_DIM, |lane| xout + (lane as usize) < vol_x),
                    false => 0,
                };

                TiledUnit {
                    tx,
                    ty,
                    mask_in,
                    mask_out,
                    pos_minor_in: xin + yin * self.cu_dim_mk,
                    pos_minor_out: yout + xout * self.cu_dim_mm,
                }
            })
            .collect::<Vec<_>>();

        let mut pos_mbar = cube.z as usize;
        while pos_mbar < self.vol_mbar {
            let (pos_major_in, pos_major_out) = major_offsets(&mbar, pos_mbar);

            for unit in &state {
                let mut pos = pos_major_in + unit.pos_minor_in;
                for j in (0..tile_dim).step_by(rows) {
                    if unit.mask_in & (1 << j) != 0 {
                        let value = load(NAME, input, pos)?;
                        store(NAME, tile, (unit.ty + j) * pitch + unit.tx, value)?;
                    }
                    pos += rows * self.cu_dim_mk;
                }
            }

            for unit in &state {
                let mut pos = pos_major_out + unit.pos_minor_out;
                for j in (0..tile_dim).step_by(rows) {
                    if unit.mask_out & (1 << j) != 0 {
                        let value = load(NAME, tile, unit.tx * pitch + unit.ty + j)?;
                        store(NAME, output, pos, value)?;
                    }
                    pos += rows * self.cu_dim_mm;
                }
            }

            pos_mbar += self.launch.cube_count.z as usize;
        }

        Ok(())
    }
}

impl<E: Element> CubeTask for TiledKernel<E> {
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

        let tile_dim = TILE_DIM as usize;
        let mut tile = vec![E::zeroed(); tile_dim * (tile_dim + tile_padding(E::WIDTH))];

        for cube in cubes(self.launch.cube_count) {
            self.execute_cube(cube, input, output, &mut tile)?;
        }

        Ok(())
    }
}
