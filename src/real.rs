//! The configured floating-point precision.
//!
//! Every numeric type in the core is generic over [`Real`] rather than
//! hard-coded to `f32` or `f64`; a single compiled binary always
//! instantiates exactly one of the two, selected by the `f32`/`f64` cargo
//! features (mirroring the `2d`/`3d` dimension switch next to it).

use num_traits::Float;
use num_traits::FromPrimitive;
use num_traits::ToPrimitive;

/// A real scalar usable throughout the solver, the neighbor grid and the
/// distributor. Blanket-implemented for `f32` and `f64`; never implemented
/// for anything else, so mixing precisions within one binary is a compile
/// error rather than a silent truncation.
pub trait Real:
    Float
    + FromPrimitive
    + ToPrimitive
    + Send
    + Sync
    + std::fmt::Debug
    + std::iter::Sum
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(x: f64) -> Self;
}

impl Real for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl Real for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn from_f64(x: f64) -> Self {
        x
    }
}

#[cfg(feature = "f32")]
pub type R = f32;
#[cfg(not(feature = "f32"))]
pub type R = f64;
