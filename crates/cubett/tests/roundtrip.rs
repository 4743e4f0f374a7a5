mod common;

use common::{planner, run, sequence};
use cubett::reference::{inverse_permutation, permute, permuted_shape};
use cubett::PlanBuilder;
use cubett_runtime::HostDevice;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn permutations(rank: usize) -> Vec<Vec<usize>> {
    if rank == 0 {
        return vec![Vec::new()];
    }

    let mut all = Vec::new();
    for shorter in permutations(rank - 1) {
        for position in 0..rank {
            let mut permutation = shorter.clone();
            permutation.insert(position, rank - 1);
            all.push(permutation);
        }
    }
    all
}

/// Transpose by `permutation`, then by its inverse, checking both steps.
fn assert_round_trip(device: &HostDevice, shape: &[usize], permutation: &[usize]) {
    let planner = planner();
    let data = sequence::<u32>(shape.iter().product());

    let builder = PlanBuilder::new(shape, permutation);
    let (strategy, transposed) = run(device, &planner, builder, &data).unwrap();
    assert_eq!(
        transposed,
        permute(&data, shape, permutation),
        "{strategy:?} transposition of {shape:?} by {permutation:?}"
    );

    let inverse = inverse_permutation(permutation);
    let transposed_shape = permuted_shape(shape, permutation);
    let builder = PlanBuilder::new(&transposed_shape, &inverse);
    let (strategy, restored) = run(device, &planner, builder, &transposed).unwrap();
    assert_eq!(
        restored, data,
        "{strategy:?} transposition of {transposed_shape:?} by {inverse:?}"
    );
}

#[test_log::test]
fn every_permutation_up_to_rank_5() {
    let device = HostDevice::default();
    let shapes: [&[usize]; 4] = [&[37, 45], &[9, 13, 11], &[5, 3, 7, 4], &[3, 2, 5, 4, 3]];

    for shape in shapes {
        for permutation in permutations(shape.len()) {
            assert_round_trip(&device, shape, &permutation);
        }
    }
}

#[test_log::test]
fn sampled_permutations_up_to_rank_8() {
    let device = HostDevice::default();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for rank in 6..=8 {
        for _ in 0..12 {
            let shape = (0..rank)
                .map(|_| rng.random_range(1..=4))
                .collect::<Vec<usize>>();
            let mut permutation = (0..rank).collect::<Vec<usize>>();
            permutation.shuffle(&mut rng);

            assert_round_trip(&device, &shape, &permutation);
        }
    }
}

#[test_log::test]
fn large_leading_axes_round_trip() {
    let device = HostDevice::default();

    assert_round_trip(&device, &[200, 3, 130], &[2, 1, 0]);
    assert_round_trip(&device, &[16, 3000, 2], &[1, 2, 0]);
}
