//! The particle store: structure-of-arrays buffers shared by every other
//! component, sized once to a per-process maximum capacity.

use rand::Rng;

use crate::real::Real;
use crate::vector::Aabb;
use crate::vector::Vector;
use crate::vector::VecD;

/// Per-process SoA particle buffers. Every array always has the same
/// length (`size()`); `append`/`pop` touch all of them atomically so that
/// invariant can never be observed broken from outside this module.
pub struct ParticleStore<R: Real> {
    capacity: usize,
    position: Vec<VecD<R>>,
    position_star: Vec<VecD<R>>,
    velocity: Vec<VecD<R>>,
    density: Vec<R>,
    lambda: Vec<R>,
    scratch_vec: Vec<VecD<R>>,
    scratch_scalar: Vec<R>,
}

impl<R: Real> ParticleStore<R> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            position: Vec::with_capacity(capacity),
            position_star: Vec::with_capacity(capacity),
            velocity: Vec::with_capacity(capacity),
            density: Vec::with_capacity(capacity),
            lambda: Vec::with_capacity(capacity),
            scratch_vec: Vec::with_capacity(capacity),
            scratch_scalar: Vec::with_capacity(capacity),
        }
    }

    pub fn size(&self) -> usize {
        self.position.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity - self.size()
    }

    pub fn position(&self) -> &[VecD<R>] {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut [VecD<R>] {
        &mut self.position
    }

    pub fn position_star(&self) -> &[VecD<R>] {
        &self.position_star
    }

    pub fn position_star_mut(&mut self) -> &mut [VecD<R>] {
        &mut self.position_star
    }

    pub fn velocity(&self) -> &[VecD<R>] {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut [VecD<R>] {
        &mut self.velocity
    }

    pub fn density(&self) -> &[R] {
        &self.density
    }

    pub fn density_mut(&mut self) -> &mut [R] {
        &mut self.density
    }

    pub fn lambda(&self) -> &[R] {
        &self.lambda
    }

    pub fn lambda_mut(&mut self) -> &mut [R] {
        &mut self.lambda
    }

    pub fn scratch_vec(&self) -> &[VecD<R>] {
        &self.scratch_vec
    }

    pub fn scratch_vec_mut(&mut self) -> &mut [VecD<R>] {
        &mut self.scratch_vec
    }

    pub fn scratch_scalar_mut(&mut self) -> &mut [R] {
        &mut self.scratch_scalar
    }

    /// Appends a single particle with its scalar fields default-initialised
    /// to zero. Panics if capacity is exhausted: exceeding `N_max` is a
    /// configuration error (the caller picked a capacity too small for the
    /// run), not a recoverable runtime condition.
    pub fn append(&mut self, position: VecD<R>, position_star: VecD<R>, velocity: VecD<R>) {
        self.append_batch(&[position], &[position_star], &[velocity]);
    }

    pub fn append_batch(
        &mut self,
        positions: &[VecD<R>],
        position_stars: &[VecD<R>],
        velocities: &[VecD<R>],
    ) {
        assert_eq!(positions.len(), position_stars.len());
        assert_eq!(positions.len(), velocities.len());
        let count = positions.len();
        assert!(
            count <= self.available(),
            "particle store overflow: tried to append {count} particles with only {} of {} slots free",
            self.available(),
            self.capacity
        );
        self.position.extend_from_slice(positions);
        self.position_star.extend_from_slice(position_stars);
        self.velocity.extend_from_slice(velocities);
        self.density.resize(self.position.len(), R::ZERO);
        self.lambda.resize(self.position.len(), R::ZERO);
        self.scratch_vec.resize(self.position.len(), VecD::<R>::zero());
        self.scratch_scalar.resize(self.position.len(), R::ZERO);
    }

    /// Removes `count` particles from the tail of every array.
    pub fn pop(&mut self, count: usize) {
        assert!(
            count <= self.size(),
            "tried to pop {count} particles but only {} are resident",
            self.size()
        );
        let new_len = self.size() - count;
        self.position.truncate(new_len);
        self.position_star.truncate(new_len);
        self.velocity.truncate(new_len);
        self.density.truncate(new_len);
        self.lambda.truncate(new_len);
        self.scratch_vec.truncate(new_len);
        self.scratch_scalar.truncate(new_len);
    }

    /// Tiles `aabb` with a regular lattice at `spacing`, placing one
    /// particle at the center of each lattice cell, and appends them all
    /// with the given initial velocity. Returns the number of particles
    /// added.
    pub fn construct_fluid(&mut self, aabb: &Aabb<VecD<R>>, velocity: VecD<R>, spacing: R) -> usize {
        let positions = lattice_positions(aabb, spacing);
        let count = positions.len();
        let velocities = vec![velocity; count];
        self.append_batch(&positions, &positions, &velocities);
        count
    }
}

fn axis_count<R: Real>(component: R) -> usize {
    component.to_usize().unwrap_or(0).max(1)
}

#[cfg(feature = "2d")]
fn lattice_positions<R: Real>(aabb: &Aabb<VecD<R>>, spacing: R) -> Vec<VecD<R>> {
    let counts = aabb.bin_count_in_volume(spacing);
    let nx = axis_count(counts.x);
    let ny = axis_count(counts.y);
    let half = spacing / R::from_f64(2.0);
    let mut positions = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = aabb.min.x + spacing * R::from_f64(i as f64) + half;
            let y = aabb.min.y + spacing * R::from_f64(j as f64) + half;
            positions.push(VecD::<R>::new(x, y));
        }
    }
    positions
}

#[cfg(not(feature = "2d"))]
fn lattice_positions<R: Real>(aabb: &Aabb<VecD<R>>, spacing: R) -> Vec<VecD<R>> {
    let counts = aabb.bin_count_in_volume(spacing);
    let nx = axis_count(counts.x);
    let ny = axis_count(counts.y);
    let nz = axis_count(counts.z);
    let half = spacing / R::from_f64(2.0);
    let mut positions = Vec::with_capacity(nx * ny * nz);
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let x = aabb.min.x + spacing * R::from_f64(i as f64) + half;
                let y = aabb.min.y + spacing * R::from_f64(j as f64) + half;
                let z = aabb.min.z + spacing * R::from_f64(k as f64) + half;
                positions.push(VecD::<R>::new(x, y, z));
            }
        }
    }
    positions
}

/// Nudges `jittered` a small distance along `direction` so two particles
/// that landed within `1e-8` of each other no longer coincide exactly; used
/// by the density pass's collision regularization.
pub fn nudge_along<R: Real>(position: VecD<R>, direction: VecD<R>, amount: R) -> VecD<R> {
    if direction.magnitude_squared() <= R::ZERO {
        let mut rng = rand::thread_rng();
        let fallback = VecD::<R>::splat(R::from_f64(rng.gen_range(-1.0..1.0)));
        return position + fallback * amount;
    }
    position + direction.normalized() * amount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "2d")]
    fn p(x: f64, y: f64) -> VecD<f64> {
        VecD::new(x, y)
    }

    #[cfg(not(feature = "2d"))]
    fn p(x: f64, y: f64, z: f64) -> VecD<f64> {
        VecD::new(x, y, z)
    }

    #[test]
    #[cfg(feature = "2d")]
    fn append_and_pop_keep_arrays_in_sync() {
        let mut store = ParticleStore::<f64>::with_capacity(4);
        store.append(p(0.0, 0.0), p(0.0, 0.0), p(0.0, 0.0));
        store.append(p(1.0, 0.0), p(1.0, 0.0), p(0.0, 0.0));
        assert_eq!(store.size(), 2);
        assert_eq!(store.density().len(), 2);
        store.pop(1);
        assert_eq!(store.size(), 1);
        assert_eq!(store.position()[0], p(0.0, 0.0));
    }

    #[test]
    #[cfg(feature = "2d")]
    #[should_panic(expected = "overflow")]
    fn append_beyond_capacity_panics() {
        let mut store = ParticleStore::<f64>::with_capacity(1);
        store.append(p(0.0, 0.0), p(0.0, 0.0), p(0.0, 0.0));
        store.append(p(1.0, 0.0), p(1.0, 0.0), p(0.0, 0.0));
    }

    #[test]
    #[cfg(feature = "2d")]
    fn construct_fluid_fills_capacity_deterministically() {
        let mut store = ParticleStore::<f64>::with_capacity(10_000);
        let aabb = Aabb::new(p(0.0, 0.0), p(1.0, 1.0));
        let added = store.construct_fluid(&aabb, p(0.0, 0.0), 0.1);
        assert_eq!(added, store.size());
        assert!(store.position().iter().all(|pos| aabb.contains(pos)));
    }
}
