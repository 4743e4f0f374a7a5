use alloc::vec::Vec;

use cubett_runtime::ExecutionQueue;

use crate::codec::{TensorConv, TensorConvInOut};
use crate::{ElemWidth, LaunchConfig, TensorSplit, TransposeStrategy};

/// A fully resolved transposition, read only during execution.
///
/// Digit tables hold one record per axis and must fit in one plane. Their meaning depends on the
/// strategy:
///
/// - `mbar` decodes a major position into input and output offsets, for every strategy but
///   [Trivial](TransposeStrategy::Trivial).
/// - `mmk` and `msh` decode a minor position of the packed strategies into input, output and
///   shared memory offsets. The split strategy stores two tables back to back: the first for cubes
///   covering `split_dim / num_split` coordinates of the split axis, the second for cubes covering
///   one more.
/// - `tiled_vol` holds the tile extents of the tiled strategies, `cu_dim_mk` and `cu_dim_mm` the
///   input stride of the tile rows and the output stride of the tile columns. The split strategy
///   stores the input and output strides of its split axis there.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Width of the moved elements.
    pub elem: ElemWidth,
    /// Axis partition and strategy.
    pub split: TensorSplit,
    /// Launch configuration.
    pub launch: LaunchConfig,
    /// Resident cubes per streaming multiprocessor of the launch configuration.
    pub active_cubes: u32,
    /// Major group digits.
    pub mbar: Vec<TensorConvInOut>,
    /// Minor group digits.
    pub mmk: Vec<TensorConvInOut>,
    /// Shared memory digits of the minor group, in output order.
    pub msh: Vec<TensorConv>,
    /// Tile extents along x and y.
    pub tiled_vol: (usize, usize),
    /// Input stride of a tile row.
    pub cu_dim_mk: usize,
    /// Output stride of a tile column.
    pub cu_dim_mm: usize,
    /// Queue the work is submitted to.
    pub queue: ExecutionQueue,
}

impl Plan {
    /// Strategy of the plan.
    pub fn strategy(&self) -> TransposeStrategy {
        self.split.strategy
    }

    /// Number of moved elements.
    pub fn volume(&self) -> usize {
        self.split.volume()
    }

    /// Bytes read from the input and written to the output.
    pub fn size(&self) -> usize {
        self.volume() * self.elem.size()
    }
}
