//! The uniform-grid neighbor index.
//!
//! Bins the `local_span` of a [`ParticleStore`](crate::particles::ParticleStore)
//! over a uniform grid sized to the global boundary, then answers
//! fixed-capacity neighbor queries against `position_star`. Rebuilt from
//! scratch every step; it never outlives the positions it was built from
//! (grounded in `sph2d-rs`'s `NeighborhoodSearch`, generalized here to
//! 2-D/3-D, a generic `Real`, and the crate's own [`parallel`](crate::parallel)
//! backend rather than a serial loop).

use num_traits::ToPrimitive;

use crate::parallel::{self, Span};
use crate::real::Real;
use crate::vector::{Aabb, Vector, VecD};

/// Neighbor lists never exceed this many entries per particle; overflow
/// beyond it is silently dropped. Tied to `bin_spacing = 1.2h` and the
/// configured rest density — calibration scenarios are expected to stay
/// well under it.
pub const MAX_NEIGHBORS: usize = 60;

/// A fixed-capacity neighbor list for a single particle.
#[derive(Clone, Copy, Debug)]
pub struct NeighborList {
    ids: [u32; MAX_NEIGHBORS],
    count: usize,
}

impl NeighborList {
    fn empty() -> Self {
        Self {
            ids: [0; MAX_NEIGHBORS],
            count: 0,
        }
    }

    fn push(&mut self, id: usize) -> bool {
        if self.count == MAX_NEIGHBORS {
            return false;
        }
        self.ids[self.count] = id as u32;
        self.count += 1;
        true
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ids[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for NeighborList {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-axis bin counts and the row-major linearization of a bin coordinate.
#[derive(Clone, Copy, Debug)]
struct GridShape {
    #[cfg(feature = "2d")]
    counts: (i64, i64),
    #[cfg(not(feature = "2d"))]
    counts: (i64, i64, i64),
}

impl GridShape {
    #[cfg(feature = "2d")]
    fn linearize(&self, i: i64, j: i64) -> Option<i64> {
        if i < 0 || j < 0 || i >= self.counts.0 || j >= self.counts.1 {
            return None;
        }
        Some(j * self.counts.0 + i)
    }

    #[cfg(not(feature = "2d"))]
    fn linearize(&self, i: i64, j: i64, k: i64) -> Option<i64> {
        if i < 0 || j < 0 || k < 0 || i >= self.counts.0 || j >= self.counts.1 || k >= self.counts.2
        {
            return None;
        }
        Some((k * self.counts.1 + j) * self.counts.0 + i)
    }
}

/// A uniform grid over the global boundary, padded by one bin on every
/// side, used to bin particles and answer fixed-radius neighbor queries.
pub struct NeighborIndex<R: Real> {
    bin_spacing: R,
    origin: VecD<R>,
    shape: GridShape,
    sorted_bin_ids: Vec<i64>,
    sorted_particle_ids: Vec<u32>,
    bin_begin: Vec<usize>,
    bin_end: Vec<usize>,
    num_bins: usize,
}

impl<R: Real> NeighborIndex<R> {
    /// Builds an empty index sized to `boundary`, ready for [`Self::find`].
    pub fn new(boundary: &Aabb<VecD<R>>, bin_spacing: R) -> Self {
        let extent = boundary.extent();
        #[cfg(feature = "2d")]
        let shape = {
            let nx = (extent.x / bin_spacing).ceil().to_i64().unwrap_or(0) + 2;
            let ny = (extent.y() / bin_spacing).ceil().to_i64().unwrap_or(0) + 2;
            GridShape { counts: (nx.max(1), ny.max(1)) }
        };
        #[cfg(not(feature = "2d"))]
        let shape = {
            let nx = (extent.x / bin_spacing).ceil().to_i64().unwrap_or(0) + 2;
            let ny = (extent.y() / bin_spacing).ceil().to_i64().unwrap_or(0) + 2;
            let nz = (extent.z() / bin_spacing).ceil().to_i64().unwrap_or(0) + 2;
            GridShape { counts: (nx.max(1), ny.max(1), nz.max(1)) }
        };
        let num_bins = {
            #[cfg(feature = "2d")]
            {
                (shape.counts.0 * shape.counts.1) as usize
            }
            #[cfg(not(feature = "2d"))]
            {
                (shape.counts.0 * shape.counts.1 * shape.counts.2) as usize
            }
        };
        Self {
            bin_spacing,
            origin: boundary.min,
            shape,
            sorted_bin_ids: Vec::new(),
            sorted_particle_ids: Vec::new(),
            bin_begin: vec![0; num_bins],
            bin_end: vec![0; num_bins],
            num_bins,
        }
    }

    fn bin_coord(&self, p: &VecD<R>) -> VecD<R> {
        (*p - self.origin) / self.bin_spacing + VecD::<R>::splat(R::ONE)
    }

    #[cfg(feature = "2d")]
    fn bin_id_of(&self, p: &VecD<R>) -> Option<i64> {
        let c = self.bin_coord(p).floor();
        let i = c.x().to_i64()?;
        let j = c.y().to_i64()?;
        self.shape.linearize(i, j)
    }

    #[cfg(not(feature = "2d"))]
    fn bin_id_of(&self, p: &VecD<R>) -> Option<i64> {
        let c = self.bin_coord(p).floor();
        let i = c.x().to_i64()?;
        let j = c.y().to_i64()?;
        let k = c.z().to_i64()?;
        self.shape.linearize(i, j, k)
    }

    /// Rebuilds the index from `positions[to_bin_span]`, then fills a
    /// neighbor list for every particle in `to_fill_span` against
    /// `positions`. Both spans index into the same `positions` slice;
    /// `to_fill_span` is typically the whole `local_span` while
    /// `to_bin_span` may be narrower when only part of it needs binning.
    pub fn find(
        &mut self,
        to_bin_span: Span,
        to_fill_span: Span,
        positions: &[VecD<R>],
    ) -> Vec<NeighborList> {
        let bin_count = to_bin_span.len();
        let mut bin_ids = vec![0i64; bin_count];
        let mut particle_ids = vec![0u32; bin_count];
        for local_i in 0..bin_count {
            let global_i = to_bin_span.begin + local_i;
            bin_ids[local_i] = self.bin_id_of(&positions[global_i]).unwrap_or(-1);
            particle_ids[local_i] = global_i as u32;
        }
        parallel::sort_by_key(&mut bin_ids, &mut particle_ids);

        let search_keys: Vec<i64> = (0..self.num_bins as i64).collect();
        parallel::lower_bound(&bin_ids, &search_keys, &mut self.bin_begin);
        parallel::upper_bound(&bin_ids, &search_keys, &mut self.bin_end);
        self.sorted_bin_ids = bin_ids;
        self.sorted_particle_ids = particle_ids;

        let h2 = self.bin_spacing * self.bin_spacing;
        let fill_count = to_fill_span.len();
        parallel::map_index(Span::new(0, fill_count), |local_i| {
            let global_i = to_fill_span.begin + local_i;
            let p = positions[global_i];
            let mut list = NeighborList::empty();
            self.for_each_candidate_bin(&p, |bin_id| {
                let begin = self.bin_begin[bin_id as usize];
                let end = self.bin_end[bin_id as usize];
                for slot in begin..end {
                    let candidate = self.sorted_particle_ids[slot] as usize;
                    if candidate == global_i {
                        continue;
                    }
                    let dist2 = (positions[candidate] - p).magnitude_squared();
                    if dist2 < h2 {
                        if !list.push(candidate) {
                            return;
                        }
                    }
                }
            });
            list
        })
    }

    #[cfg(feature = "2d")]
    fn for_each_candidate_bin<F: FnMut(i64)>(&self, p: &VecD<R>, mut body: F) {
        let c = self.bin_coord(p).floor();
        let ci = c.x().to_i64().unwrap_or(0);
        let cj = c.y().to_i64().unwrap_or(0);
        for dj in -1..=1 {
            for di in -1..=1 {
                if let Some(bin_id) = self.shape.linearize(ci + di, cj + dj) {
                    body(bin_id);
                }
            }
        }
    }

    #[cfg(not(feature = "2d"))]
    fn for_each_candidate_bin<F: FnMut(i64)>(&self, p: &VecD<R>, mut body: F) {
        let c = self.bin_coord(p).floor();
        let ci = c.x().to_i64().unwrap_or(0);
        let cj = c.y().to_i64().unwrap_or(0);
        let ck = c.z().to_i64().unwrap_or(0);
        for dk in -1..=1 {
            for dj in -1..=1 {
                for di in -1..=1 {
                    if let Some(bin_id) = self.shape.linearize(ci + di, cj + dj, ck + dk) {
                        body(bin_id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "2d")]
    fn p(x: f64, y: f64) -> VecD<f64> {
        VecD::new(x, y)
    }

    #[test]
    #[cfg(feature = "2d")]
    fn finds_only_particles_within_bin_spacing() {
        let boundary = Aabb::new(p(0.0, 0.0), p(10.0, 10.0));
        let mut index = NeighborIndex::<f64>::new(&boundary, 1.2);
        let positions = vec![p(5.0, 5.0), p(5.5, 5.0), p(8.0, 8.0)];
        let span = Span::new(0, positions.len());
        let lists = index.find(span, span, &positions);
        assert_eq!(lists[0].as_slice(), &[1]);
        assert_eq!(lists[1].as_slice(), &[0]);
        assert!(lists[2].is_empty());
    }

    #[test]
    #[cfg(feature = "2d")]
    fn neighbor_list_never_contains_self() {
        let boundary = Aabb::new(p(0.0, 0.0), p(10.0, 10.0));
        let mut index = NeighborIndex::<f64>::new(&boundary, 1.2);
        let positions = vec![p(5.0, 5.0), p(5.01, 5.0)];
        let span = Span::new(0, positions.len());
        let lists = index.find(span, span, &positions);
        for (i, list) in lists.iter().enumerate() {
            assert!(!list.as_slice().contains(&(i as u32)));
        }
    }

    #[test]
    #[cfg(feature = "2d")]
    fn overflow_beyond_cap_is_dropped_silently() {
        let boundary = Aabb::new(p(0.0, 0.0), p(10.0, 10.0));
        let mut index = NeighborIndex::<f64>::new(&boundary, 1.2);
        let mut positions = vec![p(5.0, 5.0)];
        for i in 0..(MAX_NEIGHBORS + 10) {
            let offset = (i as f64) * 0.001;
            positions.push(p(5.0 + offset, 5.0));
        }
        let span = Span::new(0, positions.len());
        let lists = index.find(span, span, &positions);
        assert_eq!(lists[0].len(), MAX_NEIGHBORS);
    }
}
