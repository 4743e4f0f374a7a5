//! Mixed radix position codec.
//!
//! A linear position inside an axis group is decomposed into one digit per axis. Each digit is
//! `(pos / c) % d`, scaled by the stride `ct` of that axis in the layout being addressed. Summing
//! the scaled digits of every axis gives the flattened offset. Tables hold one record per axis and
//! are small enough for one record per lane of a plane, so the digits of all axes are decoded in
//! parallel and combined with a plane sum.

use cubett_runtime::cube::Plane;
use serde::{Deserialize, Serialize};

/// A record holding the identity digit, used to pad lanes past the end of a table.
pub trait Digit: Copy {
    /// Record whose digit is zero for every position.
    const IDENTITY: Self;
}

/// Decoding of one axis in a single layout.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorConv {
    /// Volume of the axes decoded before this one.
    pub c: usize,
    /// Extent of the axis.
    pub d: usize,
    /// Stride of the axis.
    pub ct: usize,
}

/// Decoding of one axis in both the input and the output layout.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorConvInOut {
    /// Volume of the input ordered axes decoded before this one.
    pub c_in: usize,
    /// Extent of the input ordered axis.
    pub d_in: usize,
    /// Input stride of the input ordered axis.
    pub ct_in: usize,
    /// Volume of the output ordered axes decoded before this one.
    pub c_out: usize,
    /// Extent of the output ordered axis.
    pub d_out: usize,
    /// Output stride of the output ordered axis.
    pub ct_out: usize,
}

impl TensorConv {
    /// Scaled digit of `pos`.
    #[inline]
    pub fn digit(&self, pos: usize) -> usize {
        ((pos / self.c) % self.d) * self.ct
    }
}

impl TensorConvInOut {
    /// Scaled input digit of `pos`.
    #[inline]
    pub fn digit_in(&self, pos: usize) -> usize {
        ((pos / self.c_in) % self.d_in) * self.ct_in
    }

    /// Scaled output digit of `pos`.
    #[inline]
    pub fn digit_out(&self, pos: usize) -> usize {
        ((pos / self.c_out) % self.d_out) * self.ct_out
    }
}

impl Digit for TensorConv {
    const IDENTITY: Self = Self { c: 1, d: 1, ct: 1 };
}

impl Digit for TensorConvInOut {
    const IDENTITY: Self = Self {
        c_in: 1,
        d_in: 1,
        ct_in: 1,
        c_out: 1,
        d_out: 1,
        ct_out: 1,
    };
}

/// Lane `i` holds record `i` of the table, lanes past its end hold the identity.
pub fn lane_digits<T: Digit>(table: &[T], plane_dim: u32) -> Plane<T> {
    debug_assert!(table.len() <= plane_dim as usize);

    Plane::from_fn(plane_dim, |lane| {
        table.get(lane as usize).copied().unwrap_or(T::IDENTITY)
    })
}

/// Input and output offsets of the major position `pos`.
///
/// Every lane decodes the digit of its record, then a plane sum gives each lane the full offset.
pub fn major_offsets(lanes: &Plane<TensorConvInOut>, pos: usize) -> (usize, usize) {
    let offset_in = lanes.map(|conv| conv.digit_in(pos)).sum().lane(0);
    let offset_out = lanes.map(|conv| conv.digit_out(pos)).sum().lane(0);

    (offset_in, offset_out)
}

/// Offsets of the register slots of one unit, relative to the major offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinorOffsets<const N: usize> {
    /// Input offset of each slot.
    pub input: [usize; N],
    /// Output offset of each slot.
    pub output: [usize; N],
    /// Shared memory slot read back for each slot.
    pub shared: [usize; N],
}

/// Precompute the offsets of the `N` register slots of a unit.
///
/// Slot `j` covers minor position `unit + j * cube_units`. Table record `i` is read from lane `i`
/// with a shuffle, for the first `table_len` lanes. Input and output offsets start at
/// `base_in` and `base_out`.
pub fn minor_offsets<const N: usize>(
    mmk: &Plane<TensorConvInOut>,
    msh: &Plane<TensorConv>,
    table_len: usize,
    unit: usize,
    cube_units: usize,
    base_in: usize,
    base_out: usize,
) -> MinorOffsets<N> {
    let mut offsets = MinorOffsets {
        input: [base_in; N],
        output: [base_out; N],
        shared: [0; N],
    };

    for i in 0..table_len as u32 {
        let conv = mmk.shuffle(i);
        let sh = msh.shuffle(i);

        for j in 0..N {
            let pos = unit + j * cube_units;
            offsets.input[j] += conv.digit_in(pos);
            offsets.output[j] += conv.digit_out(pos);
            offsets.shared[j] += sh.digit(pos);
        }
    }

    offsets
}

/// Decode `pos` with every record of `table`, one after the other.
pub fn decode(table: &[TensorConvInOut], pos: usize) -> (usize, usize) {
    table.iter().fold((0, 0), |(offset_in, offset_out), conv| {
        (offset_in + conv.digit_in(pos), offset_out + conv.digit_out(pos))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Shape (4, 6, 8) permuted by (2, 0, 1): output shape (8, 4, 6) with strides (1, 8, 32).
    fn table_4_6_8() -> [TensorConvInOut; 3] {
        [
            TensorConvInOut::new(1, 4, 1, 1, 4, 8),
            TensorConvInOut::new(4, 6, 4, 4, 6, 32),
            TensorConvInOut::new(24, 8, 24, 24, 8, 1),
        ]
    }

    fn expected_output_offset(pos: usize) -> usize {
        let (i, j, k) = (pos % 4, (pos / 4) % 6, pos / 24);
        k + 8 * i + 32 * j
    }

    #[test]
    fn decode_predicts_the_permuted_offset() {
        let table = table_4_6_8();

        for pos in 0..192 {
            assert_eq!(decode(&table, pos), (pos, expected_output_offset(pos)));
        }
    }

    #[test]
    fn plane_reduction_matches_serial_decoding() {
        let table = table_4_6_8();
        let lanes = lane_digits(&table, 32);

        for pos in 0..192 {
            assert_eq!(major_offsets(&lanes, pos), decode(&table, pos));
        }
    }

    #[test]
    fn padding_lanes_contribute_nothing() {
        let lanes = lane_digits(&[TensorConvInOut::new(1, 5, 3, 1, 5, 7)], 8);

        assert_eq!(lanes.lane(1), TensorConvInOut::IDENTITY);
        assert_eq!(major_offsets(&lanes, 4), (12, 28));
        assert_eq!(major_offsets(&lane_digits(&[], 8), 17), (0, 0));
    }

    #[test]
    fn minor_offsets_cover_every_slot() {
        let table = table_4_6_8();
        let mmk = lane_digits(&table, 32);
        let msh = lane_digits(&[TensorConv::new(1, 4, 1)], 32);

        let offsets = minor_offsets::<3>(&mmk, &msh, 1, 5, 64, 100, 200);

        for j in 0..3 {
            let pos = 5 + j * 64;
            assert_eq!(offsets.input[j], 100 + pos % 4);
            assert_eq!(offsets.output[j], 200 + (pos % 4) * 8);
            assert_eq!(offsets.shared[j], pos % 4);
        }
    }
}
