mod packed;
mod packed_split;
mod tiled;
mod tiled_copy;

use alloc::boxed::Box;
use core::marker::PhantomData;

use cubett_runtime::{CubeTask, Handle};

use crate::{Element, Plan, TransposeError, MAX_REG_STORAGE};

pub(crate) use packed::PackedKernel;
pub(crate) use packed_split::PackedSplitKernel;
pub(crate) use tiled::TiledKernel;
pub(crate) use tiled_copy::TiledCopyKernel;

/// Expands to a match selecting the const generic specialization of `$builder` for each
/// register storage in the list, or `None` outside of it.
macro_rules! reg_storage_table {
    ($builder:ident::<$elem:ty> $args:tt, $num_reg_storage:expr, [$($n:literal),*]) => {
        match $num_reg_storage {
            $($n => Some($builder::<$elem, $n> $args),)*
            _ => None,
        }
    };
}

pub(crate) fn tiled_task<E: Element>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Box<dyn CubeTask> {
    Box::new(TiledKernel::<E> {
        launch: plan.launch.descriptor(),
        plane_dim: plan.queue.properties().plane_size,
        vol_mbar: plan.split.vol_mbar,
        tiled_vol: plan.tiled_vol,
        cu_dim_mk: plan.cu_dim_mk,
        cu_dim_mm: plan.cu_dim_mm,
        mbar: plan.mbar.clone(),
        input: input.clone(),
        output: output.clone(),
        _elem: PhantomData,
    })
}

pub(crate) fn tiled_copy_task<E: Element>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Box<dyn CubeTask> {
    Box::new(TiledCopyKernel::<E> {
        launch: plan.launch.descriptor(),
        plane_dim: plan.queue.properties().plane_size,
        vol_mbar: plan.split.vol_mbar,
        tiled_vol: plan.tiled_vol,
        cu_dim_mk: plan.cu_dim_mk,
        cu_dim_mm: plan.cu_dim_mm,
        mbar: plan.mbar.clone(),
        input: input.clone(),
        output: output.clone(),
        _elem: PhantomData,
    })
}

fn packed_kernel<E: Element, const N: usize>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Box<dyn CubeTask> {
    Box::new(PackedKernel::<E, N> {
        launch: plan.launch.descriptor(),
        plane_dim: plan.queue.properties().plane_size,
        vol_mmk: plan.split.vol_mmk,
        vol_mbar: plan.split.vol_mbar,
        mmk: plan.mmk.clone(),
        msh: plan.msh.clone(),
        mbar: plan.mbar.clone(),
        input: input.clone(),
        output: output.clone(),
        _elem: PhantomData,
    })
}

fn packed_split_kernel<E: Element, const N: usize>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Box<dyn CubeTask> {
    Box::new(PackedSplitKernel::<E, N> {
        launch: plan.launch.descriptor(),
        plane_dim: plan.queue.properties().plane_size,
        split_dim: plan.split.split_dim,
        vol_mmk_unsplit: plan.split.vol_mmk_unsplit,
        vol_mbar: plan.split.vol_mbar,
        size_mmk: plan.split.size_mmk,
        split_stride_in: plan.cu_dim_mk,
        split_stride_out: plan.cu_dim_mm,
        mmk: plan.mmk.clone(),
        msh: plan.msh.clone(),
        mbar: plan.mbar.clone(),
        input: input.clone(),
        output: output.clone(),
        _elem: PhantomData,
    })
}

pub(crate) fn packed_task<E: Element>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Result<Box<dyn CubeTask>, TransposeError> {
    let num_reg_storage = plan.launch.num_reg_storage;

    let task = reg_storage_table!(
        packed_kernel::<E>(plan, input, output),
        num_reg_storage,
        [1, 2, 3, 4, 5, 6, 7, 8]
    );

    task.ok_or_else(|| unimplemented_reg_storage(num_reg_storage))
}

pub(crate) fn packed_split_task<E: Element>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Result<Box<dyn CubeTask>, TransposeError> {
    let num_reg_storage = plan.launch.num_reg_storage;

    let task = reg_storage_table!(
        packed_split_kernel::<E>(plan, input, output),
        num_reg_storage,
        [1, 2, 3, 4, 5, 6, 7, 8]
    );

    task.ok_or_else(|| unimplemented_reg_storage(num_reg_storage))
}

fn unimplemented_reg_storage(num_reg_storage: u32) -> TransposeError {
    log::warn!("No kernel is generated for a register storage of {num_reg_storage}");

    TransposeError::UnimplementedRegisterStorage {
        num_reg_storage,
        max: MAX_REG_STORAGE,
    }
}
