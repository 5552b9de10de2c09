//! Fixed-rank vector algebra and axis-aligned bounding boxes.
//!
//! The dimension of the simulation (2-D or 3-D) is a compile-time choice,
//! selected through the `2d`/`3d` cargo features exactly like the rest of
//! the crate's dimension-generic code. [`VecD`] is a type alias onto
//! whichever of [`Vec2`]/[`Vec3`] is active; application code should almost
//! always spell the dimension-generic name rather than `Vec2`/`Vec3`
//! directly, so that switching the feature flag recompiles cleanly.

mod aabb;
mod vec2;
mod vec3;

pub use aabb::Aabb;
pub use vec2::Vec2;
pub use vec3::Vec3;

use crate::real::Real;

/// Shared componentwise algebra implemented by both [`Vec2`] and [`Vec3`].
/// `cross` is deliberately not part of this trait: it is only defined in
/// 3-D (see [`Vec3::cross`]) and has no meaningful 2-D analogue in this
/// crate.
pub trait Vector<R: Real>:
    Copy
    + Clone
    + std::fmt::Debug
    + PartialEq
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<R, Output = Self>
    + std::ops::Div<R, Output = Self>
    + std::ops::Neg<Output = Self>
{
    /// Number of scalar components (2 or 3).
    const DIM: usize;

    fn zero() -> Self;
    fn splat(v: R) -> Self;
    fn x(&self) -> R;

    fn dot(&self, other: &Self) -> R;

    fn magnitude_squared(&self) -> R {
        self.dot(self)
    }

    fn magnitude(&self) -> R {
        self.magnitude_squared().sqrt()
    }

    fn inv_magnitude(&self) -> R {
        R::ONE / self.magnitude()
    }

    fn normalized(&self) -> Self {
        *self * self.inv_magnitude()
    }

    fn floor(&self) -> Self;
    fn ceil(&self) -> Self;

    /// Componentwise clamp against per-component bounds.
    fn clamp(&self, min: &Self, max: &Self) -> Self;

    /// Componentwise clamp against the same scalar bound on every axis.
    fn clamp_scalar(&self, min: R, max: R) -> Self {
        self.clamp(&Self::splat(min), &Self::splat(max))
    }

    fn componentwise_min(&self, other: &Self) -> Self;
    fn componentwise_max(&self, other: &Self) -> Self;

    /// Product of all components: length in 1-D, area in 2-D, volume in 3-D.
    fn component_product(&self) -> R;
}

/// The vector type used throughout the rest of the crate: [`Vec2`] when
/// compiled with the `2d` feature, [`Vec3`] otherwise.
#[cfg(feature = "2d")]
pub type VecD<R> = Vec2<R>;
#[cfg(not(feature = "2d"))]
pub type VecD<R> = Vec3<R>;

/// Flattens an array of position-like vectors into their raw scalar
/// components, in axis-major order (`x0, y0[, z0], x1, y1[, z1], ...`).
///
/// The distributor communicates particle fields as plain `R` slices rather
/// than a custom MPI struct datatype for `VecD`: every rank already agrees
/// on the compiled-in dimension, so a struct datatype would buy nothing
/// beyond one more failure mode in the send path.
#[cfg(feature = "2d")]
pub fn flatten<R: Real>(values: &[Vec2<R>]) -> std::vec::Vec<R> {
    values.iter().flat_map(|v| [v.x, v.y]).collect()
}
#[cfg(not(feature = "2d"))]
pub fn flatten<R: Real>(values: &[Vec3<R>]) -> std::vec::Vec<R> {
    values.iter().flat_map(|v| [v.x, v.y, v.z]).collect()
}

#[cfg(feature = "2d")]
pub fn unflatten<R: Real>(scalars: &[R]) -> std::vec::Vec<Vec2<R>> {
    debug_assert_eq!(scalars.len() % 2, 0);
    scalars
        .chunks_exact(2)
        .map(|c| Vec2::new(c[0], c[1]))
        .collect()
}
#[cfg(not(feature = "2d"))]
pub fn unflatten<R: Real>(scalars: &[R]) -> std::vec::Vec<Vec3<R>> {
    debug_assert_eq!(scalars.len() % 3, 0);
    scalars
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0], c[1], c[2]))
        .collect()
}

#[cfg(feature = "2d")]
pub const DIM: usize = 2;
#[cfg(not(feature = "2d"))]
pub const DIM: usize = 3;
