use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use cubett_runtime::{ComputeDevice, ExecutionQueue};

use crate::codec::{TensorConv, TensorConvInOut};
use crate::launch::TILE_DIM;
use crate::{
    ElemWidth, LaunchPlan, LaunchPlanner, Plan, TensorSplit, TransposeError, TransposeStrategy,
};

/// Axes of a tensor once unit axes are dropped and axes staying adjacent are merged.
///
/// Shapes are column major: axis 0 is the fastest varying. Axis `i` of the output is axis
/// `permutation[i]` of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedLayout {
    /// Extent of each folded axis.
    pub shape: Vec<usize>,
    /// Folded permutation.
    pub permutation: Vec<usize>,
}

impl FoldedLayout {
    /// Fold `shape` and `permutation`, which must be valid.
    pub fn new(shape: &[usize], permutation: &[usize]) -> Self {
        let mut index = vec![usize::MAX; shape.len()];
        let mut kept = Vec::with_capacity(shape.len());
        for (axis, &dim) in shape.iter().enumerate() {
            if dim != 1 {
                index[axis] = kept.len();
                kept.push(dim);
            }
        }
        let permutation = permutation
            .iter()
            .filter(|axis| shape[**axis] != 1)
            .map(|axis| index[*axis])
            .collect::<Vec<_>>();

        if kept.is_empty() {
            return Self {
                shape: vec![1],
                permutation: vec![0],
            };
        }

        // Runs of consecutive input axes in output order move together.
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for &axis in &permutation {
            match groups.last_mut() {
                Some(group) if group.last().map(|last| last + 1) == Some(axis) => group.push(axis),
                _ => groups.push(vec![axis]),
            }
        }

        let mut input_order = (0..groups.len()).collect::<Vec<_>>();
        input_order.sort_by_key(|group| groups[*group][0]);
        let mut rank_of = vec![0; groups.len()];
        for (rank, group) in input_order.iter().enumerate() {
            rank_of[*group] = rank;
        }

        Self {
            shape: input_order
                .iter()
                .map(|group| groups[*group].iter().map(|axis| kept[*axis]).product())
                .collect(),
            permutation: (0..groups.len()).map(|group| rank_of[group]).collect(),
        }
    }

    /// Number of folded axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the permutation keeps every axis in place.
    pub fn is_identity(&self) -> bool {
        self.permutation
            .iter()
            .enumerate()
            .all(|(rank, axis)| rank == *axis)
    }

    /// Input stride of each axis.
    pub fn in_strides(&self) -> Vec<usize> {
        let mut stride = 1;
        self.shape
            .iter()
            .map(|dim| {
                let current = stride;
                stride *= dim;
                current
            })
            .collect()
    }

    /// Output stride of each input axis.
    pub fn out_strides(&self) -> Vec<usize> {
        let mut strides = vec![0; self.rank()];
        let mut stride = 1;
        for &axis in &self.permutation {
            strides[axis] = stride;
            stride *= self.shape[axis];
        }
        strides
    }
}

/// Derives a [plan](Plan) from a shape and a permutation.
///
/// Unless a strategy is forced, the first applicable one is selected: the identity is a plain
/// copy, a kept leading axis uses [TiledCopy](TransposeStrategy::TiledCopy), two leading axes of
/// at least a tile use [Tiled](TransposeStrategy::Tiled), otherwise
/// [Packed](TransposeStrategy::Packed) is used when a launch configuration exists for it, and
/// [PackedSplit](TransposeStrategy::PackedSplit) with the fewest splits otherwise.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    shape: Vec<usize>,
    permutation: Vec<usize>,
    elem: ElemWidth,
    strategy: Option<TransposeStrategy>,
    num_split: Option<usize>,
    queue: Option<ExecutionQueue>,
}

struct Draft {
    split: TensorSplit,
    mbar: Vec<TensorConvInOut>,
    mmk: Vec<TensorConvInOut>,
    msh: Vec<TensorConv>,
    tiled_vol: (usize, usize),
    cu_dim_mk: usize,
    cu_dim_mm: usize,
}

impl PlanBuilder {
    /// Transpose a tensor of `shape` so that output axis `i` is input axis `permutation[i]`.
    pub fn new(shape: &[usize], permutation: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            permutation: permutation.to_vec(),
            elem: ElemWidth::Bits32,
            strategy: None,
            num_split: None,
            queue: None,
        }
    }

    /// Width of the elements, 32 bits by default.
    pub fn elem(mut self, elem: ElemWidth) -> Self {
        self.elem = elem;
        self
    }

    /// Force a strategy.
    pub fn strategy(mut self, strategy: TransposeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Force the number of splits of the split strategy.
    pub fn num_split(mut self, num_split: usize) -> Self {
        self.num_split = Some(num_split);
        self
    }

    /// Submit to `queue` instead of the default queue of the device.
    pub fn queue(mut self, queue: ExecutionQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Build the plan and its launch configuration.
    pub fn build<D: ComputeDevice + ?Sized>(
        self,
        device: &D,
        planner: &LaunchPlanner,
    ) -> Result<Plan, TransposeError> {
        self.validate(device.properties().plane_size)?;

        let layout = FoldedLayout::new(&self.shape, &self.permutation);
        let (draft, launch) = match self.strategy {
            Some(strategy) => self.forced(&layout, strategy, device, planner)?,
            None => self.automatic(&layout, device, planner)?,
        };
        let queue = self.queue.unwrap_or_else(|| device.queue().clone());

        Ok(Plan {
            elem: self.elem,
            split: draft.split,
            launch: launch.config,
            active_cubes: launch.active_cubes,
            mbar: draft.mbar,
            mmk: draft.mmk,
            msh: draft.msh,
            tiled_vol: draft.tiled_vol,
            cu_dim_mk: draft.cu_dim_mk,
            cu_dim_mm: draft.cu_dim_mm,
            queue,
        })
    }

    fn validate(&self, plane_size: u32) -> Result<(), TransposeError> {
        let rank = self.shape.len();
        if rank == 0 {
            return Err(TransposeError::invalid_plan("The tensor has no axis"));
        }
        if rank > plane_size as usize {
            return Err(TransposeError::invalid_plan(format!(
                "Rank {rank} exceeds the plane size {plane_size}"
            )));
        }
        if self.permutation.len() != rank {
            return Err(TransposeError::invalid_plan(format!(
                "The permutation has {} axes, the shape {rank}",
                self.permutation.len()
            )));
        }
        if let Some(axis) = self.shape.iter().position(|dim| *dim == 0) {
            return Err(TransposeError::invalid_plan(format!(
                "Axis {axis} has an extent of zero"
            )));
        }

        let mut seen = vec![false; rank];
        for &axis in &self.permutation {
            if axis >= rank || seen[axis] {
                return Err(TransposeError::invalid_plan(format!(
                    "{:?} is not a permutation of {rank} axes",
                    self.permutation
                )));
            }
            seen[axis] = true;
        }

        Ok(())
    }

    fn automatic<D: ComputeDevice + ?Sized>(
        &self,
        layout: &FoldedLayout,
        device: &D,
        planner: &LaunchPlanner,
    ) -> Result<(Draft, LaunchPlan), TransposeError> {
        let tile = TILE_DIM as usize;

        let draft = if layout.is_identity() {
            trivial_draft(layout)
        } else if layout.permutation[0] == 0 {
            tiled_copy_draft(layout)
        } else if layout.shape[0] >= tile && layout.shape[layout.permutation[0]] >= tile {
            tiled_draft(layout)
        } else {
            let draft = packed_draft(layout);
            match planner.plan_launch(device, self.elem, &draft.split) {
                Ok(launch) => return Ok((draft, launch)),
                Err(err) => {
                    log::debug!("Falling back to the split strategy: {err}");
                    return self.split_search(layout, device, planner);
                }
            }
        };

        let launch = planner.plan_launch(device, self.elem, &draft.split)?;
        Ok((draft, launch))
    }

    fn forced<D: ComputeDevice + ?Sized>(
        &self,
        layout: &FoldedLayout,
        strategy: TransposeStrategy,
        device: &D,
        planner: &LaunchPlanner,
    ) -> Result<(Draft, LaunchPlan), TransposeError> {
        let leading_kept = layout.permutation[0] == 0;

        let draft = match strategy {
            TransposeStrategy::Trivial if layout.is_identity() => trivial_draft(layout),
            TransposeStrategy::Tiled if layout.rank() >= 2 && !leading_kept => tiled_draft(layout),
            TransposeStrategy::TiledCopy if layout.rank() >= 2 && leading_kept => {
                tiled_copy_draft(layout)
            }
            TransposeStrategy::Packed => packed_draft(layout),
            TransposeStrategy::PackedSplit => match self.num_split {
                Some(num_split) => {
                    let (_, split_dim) = split_axis(layout, &minor_group(layout));
                    if num_split == 0 || num_split > split_dim {
                        return Err(TransposeError::invalid_plan(format!(
                            "Can't split an axis of extent {split_dim} in {num_split}"
                        )));
                    }
                    packed_split_draft(layout, num_split)
                }
                None => return self.split_search(layout, device, planner),
            },
            strategy => {
                return Err(TransposeError::invalid_plan(format!(
                    "{strategy:?} doesn't apply to shape {:?} with permutation {:?}",
                    self.shape, self.permutation
                )));
            }
        };

        let launch = planner.plan_launch(device, self.elem, &draft.split)?;
        Ok((draft, launch))
    }

    fn split_search<D: ComputeDevice + ?Sized>(
        &self,
        layout: &FoldedLayout,
        device: &D,
        planner: &LaunchPlanner,
    ) -> Result<(Draft, LaunchPlan), TransposeError> {
        let (_, split_dim) = split_axis(layout, &minor_group(layout));
        let mut last_error = None;

        for num_split in 1..=split_dim {
            let draft = packed_split_draft(layout, num_split);
            match planner.plan_launch(device, self.elem, &draft.split) {
                Ok(launch) => return Ok((draft, launch)),
                Err(err) => last_error = Some(err),
            }
        }

        Err(match last_error {
            Some(err) => err.into(),
            None => TransposeError::invalid_plan("The split axis is empty"),
        })
    }
}

fn empty_draft(split: TensorSplit) -> Draft {
    Draft {
        split,
        mbar: Vec::new(),
        mmk: Vec::new(),
        msh: Vec::new(),
        tiled_vol: (1, 1),
        cu_dim_mk: 1,
        cu_dim_mm: 1,
    }
}

fn trivial_draft(layout: &FoldedLayout) -> Draft {
    empty_draft(TensorSplit::trivial(layout.volume()))
}

/// Digits of the given axes, in input order, used as a major group.
fn major_table(layout: &FoldedLayout, axes: &[usize]) -> Vec<TensorConvInOut> {
    let in_strides = layout.in_strides();
    let out_strides = layout.out_strides();
    let mut c = 1;

    axes.iter()
        .map(|&axis| {
            let d = layout.shape[axis];
            let conv = TensorConvInOut::new(c, d, in_strides[axis], c, d, out_strides[axis]);
            c *= d;
            conv
        })
        .collect()
}

fn tiled_draft(layout: &FoldedLayout) -> Draft {
    let mk = layout.permutation[0];
    let mbar_axes = (1..layout.rank())
        .filter(|axis| *axis != mk)
        .collect::<Vec<_>>();
    let vol_mbar = mbar_axes.iter().map(|axis| layout.shape[*axis]).product();

    Draft {
        split: TensorSplit::tiled(layout.shape[0], layout.shape[mk], mbar_axes.len(), vol_mbar),
        mbar: major_table(layout, &mbar_axes),
        tiled_vol: (layout.shape[0], layout.shape[mk]),
        cu_dim_mk: layout.in_strides()[mk],
        cu_dim_mm: layout.out_strides()[0],
        ..empty_draft(TensorSplit::trivial(1))
    }
}

fn tiled_copy_draft(layout: &FoldedLayout) -> Draft {
    let mbar_axes = (2..layout.rank()).collect::<Vec<_>>();
    let vol_mbar = mbar_axes.iter().map(|axis| layout.shape[*axis]).product();

    Draft {
        split: TensorSplit::tiled_copy(
            layout.shape[0],
            layout.shape[1],
            mbar_axes.len(),
            vol_mbar,
        ),
        mbar: major_table(layout, &mbar_axes),
        tiled_vol: (layout.shape[0], layout.shape[1]),
        cu_dim_mk: layout.in_strides()[1],
        cu_dim_mm: layout.out_strides()[1],
        ..empty_draft(TensorSplit::trivial(1))
    }
}

/// Union of the smallest input ordered and output ordered axis prefixes spanning a tile.
fn minor_group(layout: &FoldedLayout) -> Vec<bool> {
    let tile = TILE_DIM as usize;
    let mut in_mmk = vec![false; layout.rank()];

    let mut vol = 1;
    for axis in 0..layout.rank() {
        in_mmk[axis] = true;
        vol *= layout.shape[axis];
        if vol >= tile {
            break;
        }
    }

    vol = 1;
    for &axis in &layout.permutation {
        in_mmk[axis] = true;
        vol *= layout.shape[axis];
        if vol >= tile {
            break;
        }
    }

    in_mmk
}

/// The minor axis with the largest extent, and that extent.
fn split_axis(layout: &FoldedLayout, in_mmk: &[bool]) -> (usize, usize) {
    (0..layout.rank())
        .filter(|axis| in_mmk[*axis])
        .map(|axis| (axis, layout.shape[axis]))
        .fold((0, 0), |best, candidate| match candidate.1 > best.1 {
            true => candidate,
            false => best,
        })
}

/// Minor digits, with the extent of the split axis replaced when there is one.
fn minor_tables(
    layout: &FoldedLayout,
    in_mmk: &[bool],
    split: Option<(usize, usize)>,
) -> (Vec<TensorConvInOut>, Vec<TensorConv>) {
    let in_strides = layout.in_strides();
    let out_strides = layout.out_strides();
    let extent = |axis: usize| match split {
        Some((split_axis, split_extent)) if split_axis == axis => split_extent,
        _ => layout.shape[axis],
    };

    let mmk_in = (0..layout.rank())
        .filter(|axis| in_mmk[*axis])
        .collect::<Vec<_>>();
    let mmk_out = layout
        .permutation
        .iter()
        .copied()
        .filter(|axis| in_mmk[*axis])
        .collect::<Vec<_>>();

    // Shared memory holds the minor group in input order.
    let mut shared_strides = vec![0; layout.rank()];
    let mut vol = 1;
    for &axis in &mmk_in {
        shared_strides[axis] = vol;
        vol *= extent(axis);
    }

    let mut mmk = Vec::with_capacity(mmk_in.len());
    let mut msh = Vec::with_capacity(mmk_in.len());
    let (mut c_in, mut c_out) = (1, 1);
    for (&axis_in, &axis_out) in mmk_in.iter().zip(&mmk_out) {
        let (d_in, d_out) = (extent(axis_in), extent(axis_out));

        mmk.push(TensorConvInOut::new(
            c_in,
            d_in,
            in_strides[axis_in],
            c_out,
            d_out,
            out_strides[axis_out],
        ));
        msh.push(TensorConv::new(c_out, d_out, shared_strides[axis_out]));

        c_in *= d_in;
        c_out *= d_out;
    }

    (mmk, msh)
}

fn major_axes(layout: &FoldedLayout, in_mmk: &[bool]) -> Vec<usize> {
    (0..layout.rank()).filter(|axis| !in_mmk[*axis]).collect()
}

fn packed_draft(layout: &FoldedLayout) -> Draft {
    let in_mmk = minor_group(layout);
    let (mmk, msh) = minor_tables(layout, &in_mmk, None);
    let mbar_axes = major_axes(layout, &in_mmk);

    let vol_mmk = mmk.iter().map(|conv| conv.d_in).product();
    let vol_mbar = mbar_axes.iter().map(|axis| layout.shape[*axis]).product();

    Draft {
        split: TensorSplit::packed(mmk.len(), vol_mmk, mbar_axes.len(), vol_mbar),
        mbar: major_table(layout, &mbar_axes),
        mmk,
        msh,
        ..empty_draft(TensorSplit::trivial(1))
    }
}

fn packed_split_draft(layout: &FoldedLayout, num_split: usize) -> Draft {
    let in_mmk = minor_group(layout);
    let (split_rank, split_dim) = split_axis(layout, &in_mmk);
    let mbar_axes = major_axes(layout, &in_mmk);

    // Cubes cover either `base` or `base + 1` coordinates of the split axis.
    let base = split_dim / num_split;
    let (mut mmk, mut msh) = minor_tables(layout, &in_mmk, Some((split_rank, base)));
    let (mmk_plus_one, msh_plus_one) = minor_tables(layout, &in_mmk, Some((split_rank, base + 1)));
    let size_mmk = mmk.len();
    mmk.extend(mmk_plus_one);
    msh.extend(msh_plus_one);

    let vol_mmk = (0..layout.rank())
        .filter(|axis| in_mmk[*axis])
        .map(|axis| layout.shape[axis])
        .product();
    let vol_mbar = mbar_axes.iter().map(|axis| layout.shape[*axis]).product();

    Draft {
        split: TensorSplit::packed_split(
            size_mmk,
            vol_mmk,
            split_rank,
            split_dim,
            num_split,
            mbar_axes.len(),
            vol_mbar,
        ),
        mbar: major_table(layout, &mbar_axes),
        mmk,
        msh,
        cu_dim_mk: layout.in_strides()[split_rank],
        cu_dim_mm: layout.out_strides()[split_rank],
        ..empty_draft(TensorSplit::trivial(1))
    }
}
