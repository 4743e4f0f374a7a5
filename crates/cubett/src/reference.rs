//! Host reference of the transposition, used to validate the kernels.

use alloc::vec;
use alloc::vec::Vec;

/// Permute the column major tensor `data` of `shape` so that output axis `i` is input axis
/// `permutation[i]`.
pub fn permute<E: Copy + Default>(data: &[E], shape: &[usize], permutation: &[usize]) -> Vec<E> {
    let volume = shape.iter().product::<usize>();
    assert_eq!(data.len(), volume, "The data doesn't match the shape");

    let mut out_strides = vec![0; shape.len()];
    let mut stride = 1;
    for &axis in permutation {
        out_strides[axis] = stride;
        stride *= shape[axis];
    }

    let mut output = vec![E::default(); volume];
    for (pos, value) in data.iter().enumerate() {
        let mut rest = pos;
        let mut offset = 0;
        for (axis, dim) in shape.iter().enumerate() {
            offset += (rest % dim) * out_strides[axis];
            rest /= dim;
        }
        output[offset] = *value;
    }

    output
}

/// Shape of the output of a permutation.
pub fn permuted_shape(shape: &[usize], permutation: &[usize]) -> Vec<usize> {
    permutation.iter().map(|axis| shape[*axis]).collect()
}

/// The permutation undoing `permutation`.
pub fn inverse_permutation(permutation: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; permutation.len()];
    for (rank, &axis) in permutation.iter().enumerate() {
        inverse[axis] = rank;
    }
    inverse
}
