use serde::{Deserialize, Serialize};

use crate::ElemWidth;

/// Execution strategy of a transposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransposeStrategy {
    /// The permutation is the identity: a plain copy.
    Trivial,
    /// A square tile is relayed through shared memory and written back transposed.
    Tiled,
    /// The leading axis is kept: tiles are relayed through private storage.
    TiledCopy,
    /// The whole minor group is relayed through the shared memory of one cube.
    Packed,
    /// The minor group is split over several cubes along one axis.
    PackedSplit,
}

impl TransposeStrategy {
    /// Name of the kernel implementing the strategy.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Trivial => "transpose_trivial",
            Self::Tiled => "transpose_tiled",
            Self::TiledCopy => "transpose_tiled_copy",
            Self::Packed => "transpose_packed",
            Self::PackedSplit => "transpose_packed_split",
        }
    }
}

/// Partition of the axes into the minor group, moved by one cube, and the major group, iterated
/// over cubes.
///
/// Tiled strategies name the minor axes `Mm` (leading input axis) and `Mk` (leading output axis).
/// [TiledCopy](TransposeStrategy::TiledCopy) keeps the leading axis and tiles it against the next
/// input axis, `MkBar`. Packed strategies move a group of axes `Mmk`. The remaining axes form
/// `Mbar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSplit {
    /// Strategy the split was made for.
    pub strategy: TransposeStrategy,
    /// Volume of `Mm`.
    pub vol_mm: usize,
    /// Volume of `Mk`.
    pub vol_mk: usize,
    /// Volume of `MkBar`.
    pub vol_mk_bar: usize,
    /// Number of axes in `Mmk`.
    pub size_mmk: usize,
    /// Volume of `Mmk`.
    pub vol_mmk: usize,
    /// Number of axes in `Mbar`.
    pub size_mbar: usize,
    /// Volume of `Mbar`.
    pub vol_mbar: usize,
    /// Axis of `Mmk`, in input order, split over cubes.
    pub split_rank: usize,
    /// Extent of the split axis.
    pub split_dim: usize,
    /// Number of cubes the split axis is divided into.
    pub num_split: usize,
    /// Volume of `Mmk` without the split axis.
    pub vol_mmk_unsplit: usize,
}

impl TensorSplit {
    /// A plain copy of `volume` elements.
    pub fn trivial(volume: usize) -> Self {
        Self {
            vol_mmk: volume,
            ..Self::base(TransposeStrategy::Trivial)
        }
    }

    /// Tiles over `Mm` and `Mk`, batched over `Mbar`.
    pub fn tiled(vol_mm: usize, vol_mk: usize, size_mbar: usize, vol_mbar: usize) -> Self {
        Self {
            vol_mm,
            vol_mk,
            vol_mmk: vol_mm * vol_mk,
            size_mbar,
            vol_mbar,
            ..Self::base(TransposeStrategy::Tiled)
        }
    }

    /// Tiles over the kept leading axis and `MkBar`, batched over `Mbar`.
    pub fn tiled_copy(vol_mm: usize, vol_mk_bar: usize, size_mbar: usize, vol_mbar: usize) -> Self {
        Self {
            vol_mm,
            vol_mk_bar,
            vol_mmk: vol_mm * vol_mk_bar,
            size_mbar,
            vol_mbar,
            ..Self::base(TransposeStrategy::TiledCopy)
        }
    }

    /// `Mmk` relayed whole through shared memory, batched over `Mbar`.
    pub fn packed(size_mmk: usize, vol_mmk: usize, size_mbar: usize, vol_mbar: usize) -> Self {
        Self {
            size_mmk,
            vol_mmk,
            size_mbar,
            vol_mbar,
            ..Self::base(TransposeStrategy::Packed)
        }
    }

    /// `Mmk` with axis `split_rank` divided into `num_split` near even parts.
    pub fn packed_split(
        size_mmk: usize,
        vol_mmk: usize,
        split_rank: usize,
        split_dim: usize,
        num_split: usize,
        size_mbar: usize,
        vol_mbar: usize,
    ) -> Self {
        Self {
            size_mmk,
            vol_mmk,
            size_mbar,
            vol_mbar,
            split_rank,
            split_dim,
            num_split,
            vol_mmk_unsplit: vol_mmk / split_dim,
            ..Self::base(TransposeStrategy::PackedSplit)
        }
    }

    fn base(strategy: TransposeStrategy) -> Self {
        Self {
            strategy,
            vol_mm: 1,
            vol_mk: 1,
            vol_mk_bar: 1,
            size_mmk: 0,
            vol_mmk: 1,
            size_mbar: 0,
            vol_mbar: 1,
            split_rank: 0,
            split_dim: 1,
            num_split: 1,
            vol_mmk_unsplit: 1,
        }
    }

    /// Number of elements moved.
    pub fn volume(&self) -> usize {
        self.vol_mmk * self.vol_mbar
    }

    /// Largest `Mmk` volume one cube of the split strategy handles.
    pub fn vol_mmk_with_split(&self) -> usize {
        self.split_dim.div_ceil(self.num_split) * self.vol_mmk_unsplit
    }

    /// Bytes of shared memory one cube needs for elements of the given width.
    ///
    /// Tiled strategies size their tile statically, so only packed strategies request dynamic
    /// shared memory.
    pub fn shared_memory_size(&self, elem: ElemWidth) -> usize {
        match self.strategy {
            TransposeStrategy::Packed => self.vol_mmk * elem.size(),
            TransposeStrategy::PackedSplit => self.vol_mmk_with_split() * elem.size(),
            _ => 0,
        }
    }

    /// Minor volume actually moved by one cube.
    pub fn vol_mmk_used(&self) -> usize {
        match self.strategy {
            TransposeStrategy::Trivial | TransposeStrategy::Packed => self.vol_mmk,
            TransposeStrategy::PackedSplit => self.vol_mmk_with_split(),
            TransposeStrategy::Tiled => self.vol_mm * self.vol_mk,
            TransposeStrategy::TiledCopy => self.vol_mm * self.vol_mk_bar,
        }
    }
}
