use alloc::format;

use cubett_runtime::{ComputeDevice, Handle};

use crate::kernels::{packed_split_task, packed_task, tiled_copy_task, tiled_task};
use crate::{
    ElemWidth, Element, LaunchPlanner, Plan, PlanBuilder, TransposeError, TransposeStrategy,
};

/// Submit the transposition described by `plan` from `input` to `output`.
///
/// Submission is asynchronous. Right after it, the queue is checked for errors of work that
/// already completed: a failure of this launch may only be reported by a later call or by
/// syncing the queue.
pub fn execute(plan: &Plan, input: &Handle, output: &Handle) -> Result<(), TransposeError> {
    validate(plan, input, output)?;

    // Kernels only move data, elements are handled as words of the same width.
    match plan.elem {
        ElemWidth::Bits16 => execute_typed::<u16>(plan, input, output),
        ElemWidth::Bits32 => execute_typed::<u32>(plan, input, output),
        ElemWidth::Bits64 => execute_typed::<u64>(plan, input, output),
    }
}

/// Plan and execute the transposition of a tensor of `shape` so that output axis `i` is input
/// axis `permutation[i]`.
pub fn transpose<E: Element, D: ComputeDevice + ?Sized>(
    device: &D,
    planner: &LaunchPlanner,
    shape: &[usize],
    permutation: &[usize],
    input: &Handle,
    output: &Handle,
) -> Result<(), TransposeError> {
    let plan = PlanBuilder::new(shape, permutation)
        .elem(E::WIDTH)
        .build(device, planner)?;

    execute(&plan, input, output)
}

fn execute_typed<E: Element>(
    plan: &Plan,
    input: &Handle,
    output: &Handle,
) -> Result<(), TransposeError> {
    let task = match plan.strategy() {
        TransposeStrategy::Trivial => None,
        TransposeStrategy::Tiled => Some(tiled_task::<E>(plan, input, output)),
        TransposeStrategy::TiledCopy => Some(tiled_copy_task::<E>(plan, input, output)),
        TransposeStrategy::Packed => Some(packed_task::<E>(plan, input, output)?),
        TransposeStrategy::PackedSplit => Some(packed_split_task::<E>(plan, input, output)?),
    };

    match task {
        Some(task) => plan.queue.submit(task)?,
        None => plan.queue.copy(input, output, plan.size())?,
    }

    match plan.queue.take_error() {
        Some(err) => Err(TransposeError::Execution(err)),
        None => Ok(()),
    }
}

fn validate(plan: &Plan, input: &Handle, output: &Handle) -> Result<(), TransposeError> {
    if input.same_buffer(output) {
        return Err(TransposeError::InPlace);
    }

    let required = plan.size();
    for handle in [input, output] {
        if handle.size() < required {
            return Err(TransposeError::BufferTooSmall {
                required,
                actual: handle.size(),
            });
        }
    }

    let plane_size = plan.queue.properties().plane_size as usize;
    if plan.mbar.len() > plane_size || plan.split.size_mmk > plane_size {
        return Err(TransposeError::invalid_plan(format!(
            "Digit tables of {} and {} records don't fit in a plane of {plane_size} lanes",
            plan.mbar.len(),
            plan.split.size_mmk
        )));
    }

    let num_tables = match plan.strategy() {
        TransposeStrategy::Packed => 1,
        TransposeStrategy::PackedSplit => 2,
        _ => 0,
    };
    let expected = num_tables * plan.split.size_mmk;
    if num_tables > 0 && (plan.mmk.len() != expected || plan.msh.len() != expected) {
        return Err(TransposeError::invalid_plan(format!(
            "Expected {expected} minor digits, got {} and {} shared memory digits",
            plan.mmk.len(),
            plan.msh.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::reference;
    use cubett_runtime::HostDevice;
    use pretty_assertions::assert_eq;

    fn planner() -> LaunchPlanner {
        LaunchPlanner::from_config(&GlobalConfig::default())
    }

    #[test_log::test]
    fn trivial_plan_copies_the_buffer() {
        let device = HostDevice::default();
        let data = (0..60u32).collect::<Vec<_>>();
        let input = Handle::from_slice(&data);
        let output = Handle::empty(data.len() * 4);

        transpose::<u32, _>(&device, &planner(), &[3, 4, 5], &[0, 1, 2], &input, &output)
            .unwrap();
        device.queue().sync().unwrap();

        assert_eq!(output.to_vec::<u32>(), data);
    }

    #[test_log::test]
    fn transposes_a_matrix() {
        let device = HostDevice::default();
        let data = (0..6u32).collect::<Vec<_>>();
        let input = Handle::from_slice(&data);
        let output = Handle::empty(24);

        transpose::<u32, _>(&device, &planner(), &[2, 3], &[1, 0], &input, &output).unwrap();
        device.queue().sync().unwrap();

        assert_eq!(
            output.to_vec::<u32>(),
            reference::permute(&data, &[2, 3], &[1, 0])
        );
    }

    #[test]
    fn in_place_is_rejected() {
        let device = HostDevice::default();
        let buffer = Handle::empty(64);

        let err = transpose::<f32, _>(&device, &planner(), &[4, 4], &[1, 0], &buffer, &buffer);

        assert_eq!(err, Err(TransposeError::InPlace));
    }

    #[test]
    fn small_buffers_are_rejected() {
        let device = HostDevice::default();
        let input = Handle::empty(64);
        let output = Handle::empty(32);

        let err = transpose::<f32, _>(&device, &planner(), &[4, 4], &[1, 0], &input, &output);

        assert_eq!(
            err,
            Err(TransposeError::BufferTooSmall {
                required: 64,
                actual: 32
            })
        );
    }

    #[test]
    fn register_storage_outside_the_table_is_reported() {
        let device = HostDevice::default();
        let mut plan = PlanBuilder::new(&[4, 6, 8], &[2, 0, 1])
            .build(&device, &planner())
            .unwrap();
        plan.launch.num_reg_storage = 9;

        let err = execute(&plan, &Handle::empty(768), &Handle::empty(768));

        assert_eq!(
            err,
            Err(TransposeError::UnimplementedRegisterStorage {
                num_reg_storage: 9,
                max: 8
            })
        );
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let device = HostDevice::default();
        let mut plan = PlanBuilder::new(&[4, 6, 8], &[2, 0, 1])
            .build(&device, &planner())
            .unwrap();
        plan.msh.pop();

        let err = execute(&plan, &Handle::empty(768), &Handle::empty(768));

        assert!(matches!(err, Err(TransposeError::InvalidPlan { .. })));
    }

    #[test_log::test]
    fn submission_doesnt_wait_for_locked_buffers() {
        let device = HostDevice::default();
        let plan = PlanBuilder::new(&[64, 48], &[1, 0])
            .build(&device, &planner())
            .unwrap();
        let data = (0..3072u32).collect::<Vec<_>>();
        let input = Handle::from_slice(&data);
        let output = Handle::empty(3072 * 4);

        let guard = output.write();
        execute(&plan, &input, &output).unwrap();
        execute(&plan, &input, &output).unwrap();
        drop(guard);
        device.queue().sync().unwrap();

        assert_eq!(
            output.to_vec::<u32>(),
            reference::permute(&data, &[64, 48], &[1, 0])
        );
    }
}
