#![allow(dead_code)]

use cubett::config::GlobalConfig;
use cubett::reference::permute;
use cubett::{execute, Element, LaunchPlanner, PlanBuilder, TransposeError, TransposeStrategy};
use cubett_runtime::{Handle, HostDevice};
use pretty_assertions::assert_eq;

pub fn planner() -> LaunchPlanner {
    LaunchPlanner::from_config(&GlobalConfig::default())
}

/// Distinct non zero values, as long as the volume fits the element width.
pub fn sequence<E: Element>(volume: usize) -> Vec<E> {
    let size = core::mem::size_of::<E>();
    let bytes = (0..volume)
        .flat_map(|i| ((i + 1) as u64).to_le_bytes().into_iter().take(size))
        .collect::<Vec<u8>>();

    Handle::from_bytes(&bytes).to_vec::<E>()
}

/// Build a plan for `builder`, run it and wait for the result.
pub fn run<E: Element>(
    device: &HostDevice,
    planner: &LaunchPlanner,
    builder: PlanBuilder,
    data: &[E],
) -> Result<(TransposeStrategy, Vec<E>), TransposeError> {
    let plan = builder.elem(E::WIDTH).build(device, planner)?;
    let input = Handle::from_slice(data);
    let output = Handle::empty(core::mem::size_of_val(data));

    execute(&plan, &input, &output)?;
    plan.queue.sync()?;

    Ok((plan.strategy(), output.to_vec::<E>()))
}

/// Transpose with `builder` and compare against the naive permutation, bit for bit.
pub fn assert_matches_reference<E: Element + Default>(
    builder: PlanBuilder,
    shape: &[usize],
    permutation: &[usize],
) -> TransposeStrategy {
    let device = HostDevice::default();
    let planner = planner();
    let data = sequence::<E>(shape.iter().product());

    let (strategy, output) = run(&device, &planner, builder, &data).unwrap();
    let expected = permute(&data, shape, permutation);

    assert_eq!(
        bytemuck::cast_slice::<E, u8>(&output),
        bytemuck::cast_slice::<E, u8>(&expected),
        "{strategy:?} transposition of {shape:?} by {permutation:?}"
    );

    strategy
}

/// Force `strategy` and compare against the naive permutation.
pub fn assert_strategy<E: Element + Default>(
    strategy: TransposeStrategy,
    shape: &[usize],
    permutation: &[usize],
) {
    let builder = PlanBuilder::new(shape, permutation).strategy(strategy);
    let selected = assert_matches_reference::<E>(builder, shape, permutation);

    assert_eq!(selected, strategy);
}

/// Force the split strategy with `num_split` splits and compare against the naive permutation.
pub fn assert_split<E: Element + Default>(shape: &[usize], permutation: &[usize], num_split: usize) {
    let builder = PlanBuilder::new(shape, permutation)
        .strategy(TransposeStrategy::PackedSplit)
        .num_split(num_split);
    let selected = assert_matches_reference::<E>(builder, shape, permutation);

    assert_eq!(selected, TransposeStrategy::PackedSplit);
}
