#![warn(missing_docs)]

//! Arbitrary rank tensor transposition.
//!
//! A transposition is described by a [Plan]: the strategy moving the elements, the digit tables
//! decoding positions and the launch configuration selected by the [LaunchPlanner]. Plans are
//! usually derived with a [PlanBuilder], then submitted with [execute].
//!
//! ```no_run
//! use cubett::{LaunchPlanner, PlanBuilder, ElemWidth};
//! use cubett_runtime::{ComputeDevice, Handle, HostDevice};
//!
//! let device = HostDevice::default();
//! let planner = LaunchPlanner::new();
//! let input = Handle::from_slice(&(0..24u32).collect::<Vec<_>>());
//! let output = Handle::empty(24 * 4);
//!
//! let plan = PlanBuilder::new(&[2, 3, 4], &[2, 0, 1])
//!     .elem(ElemWidth::Bits32)
//!     .build(&device, &planner)
//!     .unwrap();
//! cubett::execute(&plan, &input, &output).unwrap();
//! device.queue().sync().unwrap();
//! ```

extern crate alloc;

#[macro_use]
extern crate derive_new;

mod builder;
mod dispatch;
mod element;
mod error;
mod kernels;
mod launch;
mod memcpy;
mod plan;
mod split;

/// Occupancy cache of the launch planner.
pub mod cache;
/// Mixed radix position codec.
pub mod codec;
/// Global configuration.
pub mod config;
pub mod reference;

pub use builder::*;
pub use dispatch::*;
pub use element::*;
pub use error::*;
pub use launch::*;
pub use memcpy::*;
pub use plan::*;
pub use split::*;
