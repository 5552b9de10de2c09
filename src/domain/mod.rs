//! The 1-D slab domain decomposition.
//!
//! Each process owns a contiguous `[begin, end)` slice along the x-axis of
//! the global boundary. Particles near the slab's own edges are mirrored to
//! the two neighboring processes as halos; particles that drift past a
//! slab's boundary migrate there outright. Grounded in the communication
//! layer's `exchange_with_neighbors`/`DataByRank` building blocks (see
//! `crate::communication`), generalized from the teacher's own
//! `domain::Extent`/`domain::DomainDecomposition` shape to the spec's
//! 1-D slab-with-load-balancing scheme rather than a recursive spatial
//! split.

use crate::communication::{Communicator, Rank};
use crate::parallel::{self, Bucket, Span};
use crate::particles::ParticleStore;
use crate::real::Real;
use crate::vector::{flatten, unflatten, Aabb, Vector, VecD};

/// Index layout of a rank's local particle arrays, in the order the spec
/// requires: interior, edge-left, edge-right, halo-left, halo-right.
#[derive(Clone, Copy, Debug, Default)]
pub struct Layout {
    pub resident: usize,
    pub edge_left: usize,
    pub edge_right: usize,
    pub halo_left: usize,
    pub halo_right: usize,
}

impl Layout {
    pub fn local(&self) -> usize {
        self.resident + self.halo_left + self.halo_right
    }

    /// `[resident, resident+halo_left)`.
    pub fn halo_left_span(&self) -> Span {
        Span::new(self.resident, self.resident + self.halo_left)
    }

    /// `[resident+halo_left, local)`.
    pub fn halo_right_span(&self) -> Span {
        Span::new(self.resident + self.halo_left, self.local())
    }

    pub fn resident_span(&self) -> Span {
        Span::new(0, self.resident)
    }
}

/// Which scalar field a halo sync call targets. Both variants reuse the
/// same underlying communicator since they are never in flight at once.
enum ScalarComm {
    Lambda,
    Density,
}

/// Which vector field a halo sync call targets.
enum VectorComm {
    PositionStar,
    Velocity,
    ScratchVec,
}

/// Owns the messaging for one process's slab: its boundaries, its
/// neighbors, and the three per-field communicators used by every sync.
/// One `Domain` exists per process, constructed once at startup.
pub struct Domain<R: Real> {
    rank: Rank,
    num_ranks: usize,
    /// Added to `rank` to get the world rank used to address a
    /// communicator. Zero under the `local` test harness (there is no
    /// reserved snapshot-consumer rank). Under the real MPI backend the
    /// snapshot consumer occupies world rank
    /// `crate::communication::SNAPSHOT_CONSUMER_RANK`, so the compute
    /// sub-communicator's local ranks `0..num_ranks` sit at world ranks
    /// `world_rank_offset..world_rank_offset+num_ranks`. `rank` itself
    /// stays a local, 0-indexed compute-group rank throughout so the slab
    /// math above never needs to know the offset exists.
    world_rank_offset: Rank,
    begin: R,
    end: R,
    global_boundary: Aabb<VecD<R>>,
    edge_width: R,
    layout: Layout,
    edge_left_indices: Vec<usize>,
    edge_right_indices: Vec<usize>,
    comm_position: Communicator<R>,
    comm_position_star: Communicator<R>,
    comm_velocity: Communicator<R>,
    comm_count: Communicator<u64>,
    comm_scalar: Communicator<R>,
    comm_scratch_vec: Communicator<R>,
}

impl<R: Real> Domain<R> {
    /// Slices `global_boundary` into `num_ranks` equal-width slabs along the
    /// x-axis and returns the slab for `rank`. `rank` is a local,
    /// 0-indexed rank within the compute sub-communicator; `world_rank_offset`
    /// is added to it wherever a communicator call needs an actual world
    /// rank to address a peer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rank: Rank,
        num_ranks: usize,
        world_rank_offset: Rank,
        global_boundary: Aabb<VecD<R>>,
        edge_width: R,
        comm_position: Communicator<R>,
        comm_position_star: Communicator<R>,
        comm_velocity: Communicator<R>,
        comm_count: Communicator<u64>,
        comm_scalar: Communicator<R>,
        comm_scratch_vec: Communicator<R>,
    ) -> Self {
        let total_width = global_boundary.extent().x;
        let slab_width = total_width / R::from_f64(num_ranks as f64);
        let begin = global_boundary.min.x + slab_width * R::from_f64(rank as f64);
        let end = begin + slab_width;
        Self {
            rank,
            num_ranks,
            world_rank_offset,
            begin,
            end,
            global_boundary,
            edge_width,
            layout: Layout::default(),
            edge_left_indices: Vec::new(),
            edge_right_indices: Vec::new(),
            comm_position,
            comm_position_star,
            comm_velocity,
            comm_count,
            comm_scalar,
            comm_scratch_vec,
        }
    }

    pub fn left_neighbor(&self) -> Option<Rank> {
        if self.rank == 0 {
            None
        } else {
            Some(self.rank - 1 + self.world_rank_offset)
        }
    }

    pub fn right_neighbor(&self) -> Option<Rank> {
        if (self.rank as usize) + 1 == self.num_ranks {
            None
        } else {
            Some(self.rank + 1 + self.world_rank_offset)
        }
    }

    pub fn begin(&self) -> R {
        self.begin
    }

    pub fn end(&self) -> R {
        self.end
    }

    pub fn global_boundary(&self) -> &Aabb<VecD<R>> {
        &self.global_boundary
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Populates `store` with the subset of a global lattice-fill that
    /// falls inside this rank's own slab.
    ///
    /// The slab's own `x` bound is snapped back onto the global lattice
    /// (an integer number of `spacing` steps from `global_aabb.min.x`)
    /// before tiling, so that two ranks tiling adjacent slabs never leave a
    /// seam or overlap at the boundary between them.
    pub fn initialize_fluid(
        &mut self,
        store: &mut ParticleStore<R>,
        global_aabb: &Aabb<VecD<R>>,
        velocity: VecD<R>,
        spacing: R,
    ) {
        self.distribute_fluid(store, global_aabb, velocity, spacing);
        self.layout.resident = store.size();
    }

    /// Tiles the portion of `global_aabb` that overlaps this rank's slab
    /// and appends the resulting particles to `store`. Shared by
    /// [`Domain::initialize_fluid`] (the startup fluid fill) and
    /// [`Domain::process_parameters`] (emitter injection), both of which
    /// need the same lattice-alignment so a volume spanning a slab
    /// boundary tiles seamlessly regardless of which rank it lands on.
    fn distribute_fluid(
        &self,
        store: &mut ParticleStore<R>,
        global_aabb: &Aabb<VecD<R>>,
        velocity: VecD<R>,
        spacing: R,
    ) {
        let contains_start = global_aabb.min.x >= self.begin && global_aabb.min.x <= self.end;
        let contains_end = global_aabb.max.x >= self.begin && global_aabb.max.x <= self.end;
        let filled_with_fluid = global_aabb.min.x <= self.begin && global_aabb.max.x >= self.begin;
        if !contains_start && !contains_end && !filled_with_fluid {
            return;
        }

        // The first lattice cell whose *center* lands at or past `begin`,
        // not merely the first cell edge at or before it: a lattice seam
        // that straddles a slab boundary stays with the rank to its left,
        // so every rank's tiling starts on a cell center that already
        // satisfies `begin <= position.x` instead of relying on the first
        // `domain_sync` to migrate the straddling particle back out.
        let steps_before = ((self.begin - global_aabb.min.x) / spacing - R::from_f64(0.5))
            .ceil()
            .max(R::ZERO);
        let mut local_aabb = *global_aabb;
        local_aabb.min.x = global_aabb.min.x + steps_before * spacing;
        local_aabb.max.x = if contains_end { global_aabb.max.x } else { self.end };
        if local_aabb.min.x >= local_aabb.max.x {
            return;
        }
        store.construct_fluid(&local_aabb, velocity, spacing);
    }

    /// Applies any parameter-driven particle injection that must be
    /// distributed to the rank owning the target volume. Currently the
    /// only such change is emitter-driven appends: when `EMITTER_ACTIVE`
    /// is set, a small cube of side `1.1 * particle_rest_spacing` centered
    /// on `emitter_center` is tiled and appended to whichever rank's slab
    /// contains it, using the same lattice alignment as the initial fill.
    pub fn process_parameters(
        &mut self,
        store: &mut ParticleStore<R>,
        params: &crate::parameters::Parameters<R>,
    ) {
        if !params
            .simulation_mode
            .contains(crate::parameters::SimulationMode::EMITTER_ACTIVE)
        {
            return;
        }
        let spacing = R::from_f64(params.physical.particle_rest_spacing);
        let extent = VecD::<R>::splat(spacing * R::from_f64(1.1));
        let half = extent / R::from_f64(2.0);
        let min = params.regions.emitter_center - half;
        let max = min + extent;
        let emitter_aabb = Aabb::new(min, max);
        self.distribute_fluid(store, &emitter_aabb, params.regions.emitter_velocity, spacing);
        self.layout.resident = store.size() - self.layout.halo_left - self.layout.halo_right;
    }

    /// Cheap per-step load balancer: shifts this slab's boundaries by a
    /// small fraction of `edge_width` towards whichever side is carrying
    /// fewer particles than the global average, never shrinking a slab
    /// below `3 * edge_width`.
    pub fn balance_domains(&mut self, resident_count: usize) {
        let own = resident_count as u64;
        let global_total = self.global_resident_count(own);
        let even = global_total / self.num_ranks as u64;
        let threshold = even / 20;
        let dx = self.edge_width * R::from_f64(0.15);
        let min_width = self.edge_width * R::from_f64(3.0);
        let slab_width = self.end - self.begin;

        let (left_count, right_count) = self.comm_count.exchange_with_neighbors(
            self.left_neighbor(),
            &[own],
            self.right_neighbor(),
            &[own],
        );
        let left_count = left_count.first().copied();
        let right_count = right_count.first().copied();

        if slab_width <= min_width {
            return;
        }

        if own > even + threshold {
            if let (Some(left_neighbor_count), Some(_)) = (left_count, self.left_neighbor()) {
                if left_neighbor_count < own {
                    self.begin = self.begin + dx;
                    return;
                }
            }
            if let (Some(right_neighbor_count), Some(_)) = (right_count, self.right_neighbor()) {
                if right_neighbor_count < own {
                    self.end = self.end - dx;
                }
            }
        } else if own + threshold < even {
            if let (Some(left_neighbor_count), Some(_)) = (left_count, self.left_neighbor()) {
                if left_neighbor_count > own {
                    self.begin = self.begin - dx;
                    return;
                }
            }
            if let (Some(right_neighbor_count), Some(_)) = (right_count, self.right_neighbor()) {
                if right_neighbor_count > own {
                    self.end = self.end + dx;
                }
            }
        }
    }

    /// Sums `own` across every rank of the compute sub-communicator and
    /// returns the total to all of them. Deliberately built from
    /// `blocking_send_vec`/`receive_vec` (point-to-point gather at local
    /// rank 0, then point-to-point broadcast back out) rather than a true
    /// collective: `comm_count` is bound to the full `MPI_COMM_WORLD`
    /// communicator under the real backend, and the snapshot consumer
    /// (world rank `crate::communication::SNAPSHOT_CONSUMER_RANK`) never
    /// reaches this call, so a real `all_gather`/`all_reduce` here would
    /// wait on a peer that never participates. Scoping the exchange to the
    /// known `0..num_ranks` compute ranks avoids that entirely.
    fn global_resident_count(&mut self, own: u64) -> u64 {
        if self.rank == 0 {
            let mut total = own;
            for local_rank in 1..self.num_ranks as Rank {
                let from = local_rank + self.world_rank_offset;
                let received = self.comm_count.receive_vec(from);
                total += received.first().copied().unwrap_or(0);
            }
            for local_rank in 1..self.num_ranks as Rank {
                let to = local_rank + self.world_rank_offset;
                self.comm_count.blocking_send_vec(to, &[total]);
            }
            total
        } else {
            let root = self.world_rank_offset;
            self.comm_count.blocking_send_vec(root, &[own]);
            self.comm_count.receive_vec(root).first().copied().unwrap_or(own)
        }
    }

    /// Drops the current halo region, shrinking the live arrays back down
    /// to just the resident particles. Called whenever the caller knows the
    /// halo is about to become stale (a boundary move, or before the next
    /// `domain_sync`) so the next sync starts from a clean resident-only
    /// state rather than accumulating halos across steps.
    pub fn invalidate_halo(&mut self, store: &mut ParticleStore<R>) {
        let halo_count = self.layout.halo_left + self.layout.halo_right;
        if halo_count > 0 {
            store.pop(halo_count);
            self.layout.halo_left = 0;
            self.layout.halo_right = 0;
        }
    }

    /// One full OOB-migration-then-halo-sync pass. Must be called once per
    /// step, after the halo has been invalidated and before the neighbor
    /// index is rebuilt.
    pub fn domain_sync(&mut self, store: &mut ParticleStore<R>) {
        self.invalidate_halo(store);
        self.migrate_out_of_bounds(store);
        self.sync_halos(store);
    }

    fn migrate_out_of_bounds(&mut self, store: &mut ParticleStore<R>) {
        let resident = self.layout.resident;
        let (left_idx, _equal_idx, right_idx) = parallel::partition3(resident, |i| {
            let x = store.position_star()[i].x();
            if x < self.begin {
                Bucket::Less
            } else if x > self.end {
                Bucket::Greater
            } else {
                Bucket::Equal
            }
        });

        let gather = |indices: &[usize], field: &[VecD<R>]| -> Vec<VecD<R>> {
            indices.iter().map(|&i| field[i]).collect()
        };
        let oob_left_positions = gather(&left_idx, store.position());
        let oob_left_position_stars = gather(&left_idx, store.position_star());
        let oob_left_velocities = gather(&left_idx, store.velocity());
        let oob_right_positions = gather(&right_idx, store.position());
        let oob_right_position_stars = gather(&right_idx, store.position_star());
        let oob_right_velocities = gather(&right_idx, store.velocity());

        // Drop the migrated-out particles first, then append whatever
        // arrives from each neighbor (left then right), so the three
        // scalar exchanges below and the local removal can run in either
        // order without the indices in `left_idx`/`right_idx` going stale.
        let mut removed: Vec<usize> = left_idx.iter().chain(right_idx.iter()).copied().collect();
        removed.sort_unstable();
        self.remove_indices(store, &removed);

        let (recv_left_positions, recv_right_positions) = self.comm_position.exchange_with_neighbors(
            self.left_neighbor(),
            &flatten(&oob_left_positions),
            self.right_neighbor(),
            &flatten(&oob_right_positions),
        );
        let (recv_left_position_stars, recv_right_position_stars) = self
            .comm_position_star
            .exchange_with_neighbors(
                self.left_neighbor(),
                &flatten(&oob_left_position_stars),
                self.right_neighbor(),
                &flatten(&oob_right_position_stars),
            );
        let (recv_left_velocities, recv_right_velocities) = self.comm_velocity.exchange_with_neighbors(
            self.left_neighbor(),
            &flatten(&oob_left_velocities),
            self.right_neighbor(),
            &flatten(&oob_right_velocities),
        );

        let incoming_positions: Vec<VecD<R>> = unflatten(&recv_left_positions)
            .into_iter()
            .chain(unflatten(&recv_right_positions))
            .collect();
        let incoming_position_stars: Vec<VecD<R>> = unflatten(&recv_left_position_stars)
            .into_iter()
            .chain(unflatten(&recv_right_position_stars))
            .collect();
        let incoming_velocities: Vec<VecD<R>> = unflatten(&recv_left_velocities)
            .into_iter()
            .chain(unflatten(&recv_right_velocities))
            .collect();

        store.append_batch(&incoming_positions, &incoming_position_stars, &incoming_velocities);
        self.layout.resident = store.size() - self.layout.halo_left - self.layout.halo_right;
    }

    fn remove_indices(&mut self, store: &mut ParticleStore<R>, sorted_indices: &[usize]) {
        if sorted_indices.is_empty() {
            return;
        }
        let keep_positions: Vec<VecD<R>> = keep_all_but(store.position(), sorted_indices);
        let keep_position_stars: Vec<VecD<R>> = keep_all_but(store.position_star(), sorted_indices);
        let keep_velocities: Vec<VecD<R>> = keep_all_but(store.velocity(), sorted_indices);
        store.pop(store.size());
        store.append_batch(&keep_positions, &keep_position_stars, &keep_velocities);
    }

    /// Sends this slab's edge particles to each neighbor and appends the
    /// received halos at `[resident, resident+halo_left)` and
    /// `[resident+halo_left, local)`.
    fn sync_halos(&mut self, store: &mut ParticleStore<R>) {
        let resident = self.layout.resident;
        let (edge_left, edge_right) = self.find_edges(store, resident);
        self.layout.edge_left = edge_left.len();
        self.layout.edge_right = edge_right.len();

        let gather = |indices: &[usize], field: &[VecD<R>]| -> Vec<VecD<R>> {
            indices.iter().map(|&i| field[i]).collect()
        };
        let to_left_positions = gather(&edge_left, store.position());
        let to_right_positions = gather(&edge_right, store.position());
        let to_left_position_stars = gather(&edge_left, store.position_star());
        let to_right_position_stars = gather(&edge_right, store.position_star());
        let to_left_velocities = gather(&edge_left, store.velocity());
        let to_right_velocities = gather(&edge_right, store.velocity());

        self.edge_left_indices = edge_left;
        self.edge_right_indices = edge_right;

        let (from_left_positions, from_right_positions) = self.comm_position.exchange_with_neighbors(
            self.left_neighbor(),
            &flatten(&to_left_positions),
            self.right_neighbor(),
            &flatten(&to_right_positions),
        );
        let (from_left_position_stars, from_right_position_stars) = self
            .comm_position_star
            .exchange_with_neighbors(
                self.left_neighbor(),
                &flatten(&to_left_position_stars),
                self.right_neighbor(),
                &flatten(&to_right_position_stars),
            );
        let (from_left_velocities, from_right_velocities) = self.comm_velocity.exchange_with_neighbors(
            self.left_neighbor(),
            &flatten(&to_left_velocities),
            self.right_neighbor(),
            &flatten(&to_right_velocities),
        );

        let halo_left_positions = unflatten(&from_left_positions);
        let halo_right_positions = unflatten(&from_right_positions);
        self.layout.halo_left = halo_left_positions.len();
        self.layout.halo_right = halo_right_positions.len();

        let halo_positions: Vec<VecD<R>> = halo_left_positions
            .into_iter()
            .chain(halo_right_positions)
            .collect();
        let halo_position_stars: Vec<VecD<R>> = unflatten(&from_left_position_stars)
            .into_iter()
            .chain(unflatten(&from_right_position_stars))
            .collect();
        let halo_velocities: Vec<VecD<R>> = unflatten(&from_left_velocities)
            .into_iter()
            .chain(unflatten(&from_right_velocities))
            .collect();

        store.append_batch(&halo_positions, &halo_position_stars, &halo_velocities);
    }

    /// Refreshes one scalar per-particle array's halo slots from the same
    /// edge partition `sync_halos` last computed, without touching residents
    /// or re-running migration. Used between solver sub-steps, where only a
    /// single field (lambda, then density) needs a fresh halo each pass.
    fn sync_scalar_halo(&mut self, comm_index: ScalarComm, field: &mut [R]) {
        let to_left: Vec<R> = self.edge_left_indices.iter().map(|&i| field[i]).collect();
        let to_right: Vec<R> = self.edge_right_indices.iter().map(|&i| field[i]).collect();
        let comm = match comm_index {
            ScalarComm::Lambda | ScalarComm::Density => &mut self.comm_scalar,
        };
        let (from_left, from_right) =
            comm.exchange_with_neighbors(self.left_neighbor(), &to_left, self.right_neighbor(), &to_right);
        let halo_left = self.layout.halo_left_span();
        let halo_right = self.layout.halo_right_span();
        field[halo_left.begin..halo_left.end].copy_from_slice(&from_left);
        field[halo_right.begin..halo_right.end].copy_from_slice(&from_right);
    }

    /// Same as [`Domain::sync_scalar_halo`] but for a `VecD<R>` array,
    /// flattened to raw components for the exchange and unflattened back.
    fn sync_vector_halo(&mut self, comm_index: VectorComm, field: &mut [VecD<R>]) {
        let to_left: Vec<VecD<R>> = self.edge_left_indices.iter().map(|&i| field[i]).collect();
        let to_right: Vec<VecD<R>> = self.edge_right_indices.iter().map(|&i| field[i]).collect();
        let comm = match comm_index {
            VectorComm::PositionStar => &mut self.comm_position_star,
            VectorComm::Velocity => &mut self.comm_velocity,
            VectorComm::ScratchVec => &mut self.comm_scratch_vec,
        };
        let (from_left, from_right) =
            comm.exchange_with_neighbors(self.left_neighbor(), &flatten(&to_left), self.right_neighbor(), &flatten(&to_right));
        let from_left = unflatten(&from_left);
        let from_right = unflatten(&from_right);
        let halo_left = self.layout.halo_left_span();
        let halo_right = self.layout.halo_right_span();
        field[halo_left.begin..halo_left.end].copy_from_slice(&from_left);
        field[halo_right.begin..halo_right.end].copy_from_slice(&from_right);
    }

    /// Refreshes the halo slots of `store.lambda()` from the current edge
    /// partition, once per PBD inner iteration.
    pub fn initiate_sync_halo_lambda(&mut self, store: &mut ParticleStore<R>) {
        self.sync_scalar_halo(ScalarComm::Lambda, store.lambda_mut());
    }

    /// Refreshes the halo slots of `store.density()`.
    pub fn initiate_sync_halo_density(&mut self, store: &mut ParticleStore<R>) {
        self.sync_scalar_halo(ScalarComm::Density, store.density_mut());
    }

    /// Refreshes the halo slots of `store.position_star()` after a Δp
    /// commit.
    pub fn initiate_sync_halo_position_star(&mut self, store: &mut ParticleStore<R>) {
        self.sync_vector_halo(VectorComm::PositionStar, store.position_star_mut());
    }

    /// Refreshes the halo slots of `store.velocity()`.
    pub fn initiate_sync_halo_velocity(&mut self, store: &mut ParticleStore<R>) {
        self.sync_vector_halo(VectorComm::Velocity, store.velocity_mut());
    }

    /// Refreshes the halo slots of `store.scratch_vec()` (the color-field
    /// gradient, then the vorticity) between the passes that produce it and
    /// the passes that read neighbor values of it.
    pub fn initiate_sync_halo_scratch_vec(&mut self, store: &mut ParticleStore<R>) {
        self.sync_vector_halo(VectorComm::ScratchVec, store.scratch_vec_mut());
    }

    fn find_edges(&self, store: &ParticleStore<R>, resident: usize) -> (Vec<usize>, Vec<usize>) {
        let mut edge_left = Vec::new();
        let mut edge_right = Vec::new();
        for i in 0..resident {
            let x = store.position_star()[i].x();
            if x - self.begin < self.edge_width {
                edge_left.push(i);
            }
            if self.end - x < self.edge_width {
                edge_right.push(i);
            }
        }
        (edge_left, edge_right)
    }
}

fn keep_all_but<R: Real>(field: &[VecD<R>], sorted_remove: &[usize]) -> Vec<VecD<R>> {
    let mut result = Vec::with_capacity(field.len().saturating_sub(sorted_remove.len()));
    let mut remove_iter = sorted_remove.iter().peekable();
    for (i, value) in field.iter().enumerate() {
        if remove_iter.peek() == Some(&&i) {
            remove_iter.next();
            continue;
        }
        result.push(*value);
    }
    result
}

#[cfg(all(test, feature = "local"))]
mod tests {
    use std::thread;

    use super::*;
    use crate::communication::local_communicators;
    use crate::real::R as Scalar;

    fn make_domain(
        rank: Rank,
        num_ranks: usize,
        world_rank_offset: Rank,
        comm_position: Communicator<Scalar>,
        comm_position_star: Communicator<Scalar>,
        comm_velocity: Communicator<Scalar>,
        comm_count: Communicator<u64>,
        comm_scalar: Communicator<Scalar>,
        comm_scratch_vec: Communicator<Scalar>,
    ) -> Domain<Scalar> {
        let global_boundary = Aabb::new(
            VecD::<Scalar>::splat(0.0),
            VecD::<Scalar>::splat(3.0),
        );
        Domain::new(
            rank,
            num_ranks,
            world_rank_offset,
            global_boundary,
            0.1,
            comm_position,
            comm_position_star,
            comm_velocity,
            comm_count,
            comm_scalar,
            comm_scratch_vec,
        )
    }

    #[test]
    fn neighbor_addressing_honors_world_rank_offset() {
        let mut position = local_communicators::<Scalar>(3);
        let mut position_star = local_communicators::<Scalar>(3);
        let mut velocity = local_communicators::<Scalar>(3);
        let mut count = local_communicators::<u64>(3);
        let mut scalar = local_communicators::<Scalar>(3);
        let mut scratch_vec = local_communicators::<Scalar>(3);
        let domain = make_domain(
            1,
            3,
            1,
            position.remove(&1).unwrap(),
            position_star.remove(&1).unwrap(),
            velocity.remove(&1).unwrap(),
            count.remove(&1).unwrap(),
            scalar.remove(&1).unwrap(),
            scratch_vec.remove(&1).unwrap(),
        );
        // Local rank 1 of 3, offset 1 (world rank 0 is the snapshot
        // consumer): world neighbors are 1 (local 0) and 3 (local 2).
        assert_eq!(domain.left_neighbor(), Some(1));
        assert_eq!(domain.right_neighbor(), Some(3));
    }

    #[test]
    fn edge_rank_has_no_neighbor_on_open_side() {
        let mut position = local_communicators::<Scalar>(3);
        let mut position_star = local_communicators::<Scalar>(3);
        let mut velocity = local_communicators::<Scalar>(3);
        let mut count = local_communicators::<u64>(3);
        let mut scalar = local_communicators::<Scalar>(3);
        let mut scratch_vec = local_communicators::<Scalar>(3);
        let domain = make_domain(
            0,
            3,
            0,
            position.remove(&0).unwrap(),
            position_star.remove(&0).unwrap(),
            velocity.remove(&0).unwrap(),
            count.remove(&0).unwrap(),
            scalar.remove(&0).unwrap(),
            scratch_vec.remove(&0).unwrap(),
        );
        assert_eq!(domain.left_neighbor(), None);
        assert_eq!(domain.right_neighbor(), Some(1));
    }

    #[test]
    fn balance_domains_leaves_an_even_split_unchanged() {
        let mut position = local_communicators::<Scalar>(3);
        let mut position_star = local_communicators::<Scalar>(3);
        let mut velocity = local_communicators::<Scalar>(3);
        let mut count = local_communicators::<u64>(3);
        let mut scalar = local_communicators::<Scalar>(3);
        let mut scratch_vec = local_communicators::<Scalar>(3);

        let handles: Vec<_> = (0..3)
            .map(|rank: Rank| {
                let mut domain = make_domain(
                    rank,
                    3,
                    0,
                    position.remove(&rank).unwrap(),
                    position_star.remove(&rank).unwrap(),
                    velocity.remove(&rank).unwrap(),
                    count.remove(&rank).unwrap(),
                    scalar.remove(&rank).unwrap(),
                    scratch_vec.remove(&rank).unwrap(),
                );
                thread::spawn(move || {
                    let begin_before = domain.begin();
                    let end_before = domain.end();
                    domain.balance_domains(100);
                    (domain.begin(), domain.end(), begin_before, end_before)
                })
            })
            .collect();
        for handle in handles {
            let (begin_after, end_after, begin_before, end_before) = handle.join().unwrap();
            assert_eq!(begin_after, begin_before);
            assert_eq!(end_after, end_before);
        }
    }

    #[test]
    fn balance_domains_shrinks_the_overloaded_side_towards_its_lighter_neighbor() {
        let mut position = local_communicators::<Scalar>(2);
        let mut position_star = local_communicators::<Scalar>(2);
        let mut velocity = local_communicators::<Scalar>(2);
        let mut count = local_communicators::<u64>(2);
        let mut scalar = local_communicators::<Scalar>(2);
        let mut scratch_vec = local_communicators::<Scalar>(2);

        let resident_counts = [1000usize, 10usize];
        let handles: Vec<_> = (0..2)
            .map(|rank: Rank| {
                let mut domain = make_domain(
                    rank,
                    2,
                    0,
                    position.remove(&rank).unwrap(),
                    position_star.remove(&rank).unwrap(),
                    velocity.remove(&rank).unwrap(),
                    count.remove(&rank).unwrap(),
                    scalar.remove(&rank).unwrap(),
                    scratch_vec.remove(&rank).unwrap(),
                );
                let own = resident_counts[rank as usize];
                thread::spawn(move || {
                    let end_before = domain.end();
                    let begin_before = domain.begin();
                    domain.balance_domains(own);
                    (rank, domain.begin(), domain.end(), begin_before, end_before)
                })
            })
            .collect();
        let mut results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_by_key(|(rank, ..)| *rank);
        let (_, rank0_begin, rank0_end, rank0_begin_before, _) = results[0];
        let (_, _, rank1_end, _, rank1_end_before) = results[1];
        // Rank 0 (1000 residents) is overloaded relative to rank 1 (10
        // residents): its own slab shrinks from the right towards rank 1.
        assert_eq!(rank0_begin, rank0_begin_before);
        assert!(rank0_end < rank0_begin + (3.0 / 2.0));
        // Rank 1 grows to match, its own right edge (the domain boundary)
        // stays put.
        assert_eq!(rank1_end, rank1_end_before);
    }
}
