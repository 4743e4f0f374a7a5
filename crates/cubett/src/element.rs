use bytemuck::Pod;
use core::fmt::Debug;
use serde::{Deserialize, Serialize};

use crate::TransposeError;

/// Width class of the moved elements.
///
/// Kernels only move data, so every element of a given width is handled by the same kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElemWidth {
    /// 2 bytes, e.g. `f16`.
    Bits16,
    /// 4 bytes, e.g. `f32`.
    Bits32,
    /// 8 bytes, e.g. `f64`.
    Bits64,
}

impl ElemWidth {
    /// Every supported width.
    pub const ALL: [ElemWidth; 3] = [ElemWidth::Bits16, ElemWidth::Bits32, ElemWidth::Bits64];

    /// Number of width classes.
    pub const NUM_CLASSES: u64 = 3;

    /// The width class of elements of `size` bytes.
    pub fn from_size(size: usize) -> Result<Self, TransposeError> {
        match size {
            2 => Ok(Self::Bits16),
            4 => Ok(Self::Bits32),
            8 => Ok(Self::Bits64),
            size => Err(TransposeError::UnsupportedElementWidth { size }),
        }
    }

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Dense index of the class, in `0..NUM_CLASSES`.
    pub const fn class(self) -> u64 {
        match self {
            Self::Bits16 => 0,
            Self::Bits32 => 1,
            Self::Bits64 => 2,
        }
    }
}

/// An element that can be transposed.
pub trait Element: Pod + Send + Sync + Debug + PartialEq + 'static {
    /// The width class of the element.
    const WIDTH: ElemWidth;
}

macro_rules! impl_element {
    ($width:ident, [$($ty:ty),*]) => {
        $(
            impl Element for $ty {
                const WIDTH: ElemWidth = ElemWidth::$width;
            }
        )*
    };
}

impl_element!(Bits16, [u16, i16, half::f16, half::bf16]);
impl_element!(Bits32, [u32, i32, f32]);
impl_element!(Bits64, [u64, i64, f64]);
