//! Smoothing kernels shared by the density, constraint, viscosity,
//! vorticity and surface-tension terms of the solver.
//!
//! Each kernel is a small, stateless, freely-`Copy`-able value holding only
//! its precomputed normalization constant, so that it can be captured by
//! value into a `for_each_index` body without touching the allocator (the
//! same shape `sph2d_rs`'s `smoothing_kernel::Kernel` impls use, generalized
//! here to 2-D/3-D and to a generic `Real`).

use std::f64::consts::PI;

use crate::real::Real;
use crate::vector::Vector;
use crate::vector::VecD;

fn pi<R: Real>() -> R {
    R::from_f64(PI)
}

/// Density-estimation kernel. Zero outside the support radius `h`.
#[derive(Clone, Copy, Debug)]
pub struct Poly6<R> {
    h: R,
    h2: R,
    normalization: R,
}

impl<R: Real> Poly6<R> {
    pub fn new(h: R) -> Self {
        let h2 = h * h;
        #[cfg(feature = "2d")]
        let normalization = R::from_f64(4.0) / (pi::<R>() * h2 * h2 * h2 * h2);
        #[cfg(not(feature = "2d"))]
        let normalization = R::from_f64(315.0) / (R::from_f64(64.0) * pi::<R>() * h2 * h2 * h2 * h2 * h);
        Self { h, h2, normalization }
    }

    /// `W_poly6(r)`. Evaluated from a squared distance to avoid a
    /// redundant `sqrt` at every call site (the bulk of solver time is
    /// spent here).
    pub fn evaluate_squared(&self, r_squared: R) -> R {
        if r_squared > self.h2 {
            return R::ZERO;
        }
        let diff = self.h2 - r_squared;
        self.normalization * diff * diff * diff
    }

    pub fn evaluate(&self, r: R) -> R {
        self.evaluate_squared(r * r)
    }
}

/// Gradient of the poly6 kernel, `W_del_poly6(p, q)`. Points from `q`
/// towards `p`; zero once `|p - q| > h`.
#[derive(Clone, Copy, Debug)]
pub struct DelPoly6<R> {
    h: R,
    h2: R,
    normalization: R,
}

impl<R: Real> DelPoly6<R> {
    pub fn new(h: R) -> Self {
        let h2 = h * h;
        #[cfg(feature = "2d")]
        let normalization = R::from_f64(-24.0) / (pi::<R>() * h2 * h2 * h2 * h2);
        #[cfg(not(feature = "2d"))]
        let normalization =
            R::from_f64(-945.0) / (R::from_f64(32.0) * pi::<R>() * h2 * h2 * h2 * h2 * h);
        Self { h, h2, normalization }
    }

    pub fn gradient(&self, p: &VecD<R>, q: &VecD<R>) -> VecD<R> {
        let r = *p - *q;
        let r2 = r.magnitude_squared();
        if r2 > self.h2 || r2 <= R::ZERO {
            return VecD::<R>::zero();
        }
        let diff = self.h2 - r2;
        r * (self.normalization * diff * diff)
    }
}

/// Gradient of the spiky kernel, `W_del_spikey(p, q)`. Used for the
/// constraint gradient, the Delta-p correction, vorticity confinement and
/// the surface-tension color-field gradient. A small epsilon is added to
/// the radius in the denominator so coincident particles never divide by
/// zero.
#[derive(Clone, Copy, Debug)]
pub struct Spikey<R> {
    h: R,
    normalization: R,
    epsilon: R,
}

impl<R: Real> Spikey<R> {
    pub fn new(h: R) -> Self {
        #[cfg(feature = "2d")]
        let normalization = R::from_f64(-30.0) / (pi::<R>() * h * h * h * h * h);
        #[cfg(not(feature = "2d"))]
        let normalization = R::from_f64(-45.0) / (pi::<R>() * h * h * h * h * h * h);
        Self {
            h,
            normalization,
            epsilon: R::from_f64(1e-6) * h,
        }
    }

    pub fn gradient(&self, p: &VecD<R>, q: &VecD<R>) -> VecD<R> {
        let r = *p - *q;
        let r_mag = r.magnitude();
        if r_mag > self.h || r_mag <= R::ZERO {
            return VecD::<R>::zero();
        }
        let diff = self.h - r_mag;
        let coefficient = self.normalization * diff * diff / (r_mag + self.epsilon);
        r * coefficient
    }
}

/// Surface-tension cohesion kernel, `W_cspline(r)`. A cubic spline with a
/// short-range repulsive-like branch for `r <= h/2` and a longer-range
/// attractive branch for `h/2 < r <= h`.
#[derive(Clone, Copy, Debug)]
pub struct CSpline<R> {
    h: R,
    half_h: R,
    normalization: R,
}

impl<R: Real> CSpline<R> {
    pub fn new(h: R) -> Self {
        #[cfg(feature = "2d")]
        let normalization = R::from_f64(32.0) / (pi::<R>() * h * h * h * h * h * h * h * h);
        #[cfg(not(feature = "2d"))]
        let normalization = R::from_f64(32.0) / (pi::<R>() * h * h * h * h * h * h * h * h * h);
        Self {
            h,
            half_h: h / R::from_f64(2.0),
            normalization,
        }
    }

    pub fn evaluate(&self, r: R) -> R {
        if r > self.h || r <= R::ZERO {
            return R::ZERO;
        }
        let h_minus_r = self.h - r;
        let term = h_minus_r * h_minus_r * h_minus_r * r * r * r;
        if r > self.half_h {
            self.normalization * term
        } else {
            let h6 = self.h * self.h * self.h * self.h * self.h * self.h;
            self.normalization * (R::from_f64(2.0) * term - h6 / R::from_f64(64.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poly6_vanishes_beyond_h() {
        let k = Poly6::<f64>::new(1.0);
        assert_eq!(k.evaluate(1.0 + 1e-9), 0.0);
        assert!(k.evaluate(0.0) > 0.0);
    }

    #[test]
    fn spikey_gradient_vanishes_at_and_beyond_h() {
        let k = Spikey::<f64>::new(1.0);
        let p = VecD::<f64>::zero();
        #[cfg(feature = "2d")]
        let q = VecD::<f64>::new(1.0, 0.0);
        #[cfg(not(feature = "2d"))]
        let q = VecD::<f64>::new(1.0, 0.0, 0.0);
        assert_eq!(k.gradient(&p, &q).magnitude(), 0.0);
        assert_eq!(k.gradient(&p, &p).magnitude(), 0.0);
    }

    #[test]
    fn del_poly6_gradient_points_from_q_to_p_and_vanishes_beyond_h() {
        let k = DelPoly6::<f64>::new(1.0);
        let p = VecD::<f64>::zero();
        #[cfg(feature = "2d")]
        let q = VecD::<f64>::new(0.5, 0.0);
        #[cfg(not(feature = "2d"))]
        let q = VecD::<f64>::new(0.5, 0.0, 0.0);
        let gradient = k.gradient(&p, &q);
        // p - q points in -x; the gradient must point the same way.
        assert!(gradient.x() < 0.0);
        assert!(gradient.magnitude() > 0.0);

        #[cfg(feature = "2d")]
        let far = VecD::<f64>::new(1.0 + 1e-9, 0.0);
        #[cfg(not(feature = "2d"))]
        let far = VecD::<f64>::new(1.0 + 1e-9, 0.0, 0.0);
        assert_eq!(k.gradient(&p, &far).magnitude(), 0.0);
        assert_eq!(k.gradient(&p, &p).magnitude(), 0.0);
    }
}
