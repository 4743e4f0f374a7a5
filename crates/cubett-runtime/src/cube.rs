//! Execution model of the host device.
//!
//! A grid is executed one cube at a time. Inside a cube, kernels iterate over [units] once per
//! phase: every unit finishes a phase before any unit starts the next one, so the end of each
//! `for unit in units(..)` loop is a cube-wide barrier. Lanes of a plane exchange values through
//! the collectives of [Plane], which execute in lock-step and need no barrier.

use alloc::vec::Vec;
use core::ops::Add;

use crate::server::{CubeCount, CubeDim, ServerError};

/// Position of a cube in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubePos {
    /// Position along x.
    pub x: u32,
    /// Position along y.
    pub y: u32,
    /// Position along z.
    pub z: u32,
}

/// Position of a unit in its cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitPos {
    /// Position along x.
    pub x: u32,
    /// Position along y.
    pub y: u32,
    /// Position along z.
    pub z: u32,
    /// Linear position in the cube, x fastest.
    pub index: u32,
}

impl UnitPos {
    /// Lane of the unit in its plane.
    pub fn lane(&self, plane_dim: u32) -> u32 {
        self.index % plane_dim
    }

    /// Plane of the unit in its cube.
    pub fn plane(&self, plane_dim: u32) -> u32 {
        self.index / plane_dim
    }
}

/// Every cube of the grid, x fastest.
pub fn cubes(count: CubeCount) -> impl Iterator<Item = CubePos> {
    (0..count.z).flat_map(move |z| {
        (0..count.y).flat_map(move |y| (0..count.x).map(move |x| CubePos { x, y, z }))
    })
}

/// Every unit of a cube, x fastest.
pub fn units(dim: CubeDim) -> impl Iterator<Item = UnitPos> {
    (0..dim.z).flat_map(move |z| {
        (0..dim.y).flat_map(move |y| {
            (0..dim.x).map(move |x| UnitPos {
                x,
                y,
                z,
                index: x + dim.x * (y + dim.y * z),
            })
        })
    })
}

/// One value per lane of a plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane<T> {
    values: Vec<T>,
}

impl<T: Copy> Plane<T> {
    /// Each lane computes its own value.
    pub fn from_fn<F: FnMut(u32) -> T>(plane_dim: u32, mut func: F) -> Self {
        Self {
            values: (0..plane_dim).map(&mut func).collect(),
        }
    }

    /// Number of lanes.
    pub fn plane_dim(&self) -> u32 {
        self.values.len() as u32
    }

    /// The value held by `lane`.
    pub fn lane(&self, lane: u32) -> T {
        self.values[lane as usize]
    }

    /// Every lane reads the value of `src_lane`.
    pub fn shuffle(&self, src_lane: u32) -> T {
        self.values[(src_lane % self.plane_dim()) as usize]
    }

    /// Every lane computes a new value from its own.
    pub fn map<U: Copy, F: FnMut(T) -> U>(&self, func: F) -> Plane<U> {
        Plane {
            values: self.values.iter().copied().map(func).collect(),
        }
    }
}

impl<T: Copy + Add<Output = T>> Plane<T> {
    /// Butterfly reduction: at each step every lane adds the value of the lane whose index differs
    /// in one bit, for strides `plane_dim / 2` down to 1. Every lane ends up with the sum of all
    /// lanes. The plane dimension must be a power of two.
    pub fn sum(mut self) -> Self {
        let plane_dim = self.values.len();
        debug_assert!(plane_dim.is_power_of_two(), "Plane dim must be a power of two");

        let mut stride = plane_dim / 2;
        while stride >= 1 {
            let previous = self.values.clone();
            for (lane, value) in self.values.iter_mut().enumerate() {
                *value = previous[lane] + previous[lane ^ stride];
            }
            stride /= 2;
        }

        self
    }
}

/// Each of the first `lanes` lanes votes; bit `i` of the result is the vote of lane `i`.
pub fn plane_ballot<F: FnMut(u32) -> bool>(lanes: u32, mut vote: F) -> u64 {
    debug_assert!(lanes <= u64::BITS, "A ballot holds at most 64 lanes");

    (0..lanes).fold(0u64, |mask, lane| match vote(lane) {
        true => mask | (1 << lane),
        false => mask,
    })
}

/// Bounds checked read of a global or shared buffer.
#[inline]
pub fn load<E: Copy>(kernel: &'static str, buffer: &[E], index: usize) -> Result<E, ServerError> {
    buffer
        .get(index)
        .copied()
        .ok_or(ServerError::OutOfBounds {
            kernel,
            index,
            len: buffer.len(),
        })
}

/// Bounds checked write of a global or shared buffer.
#[inline]
pub fn store<E>(
    kernel: &'static str,
    buffer: &mut [E],
    index: usize,
    value: E,
) -> Result<(), ServerError> {
    let len = buffer.len();
    match buffer.get_mut(index) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(ServerError::OutOfBounds { kernel, index, len }),
    }
}
