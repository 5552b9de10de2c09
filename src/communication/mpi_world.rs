use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::mem;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::Mutex;

use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::request::scope;
use mpi::request::WaitGuard;
use mpi::topology::SystemCommunicator;
use mpi::traits::Communicator as MpiCommunicator;
use mpi::traits::CommunicatorCollectives;
use mpi::traits::Destination;
use mpi::traits::Equivalence;
use mpi::traits::MatchedReceiveVec;
use mpi::traits::Source;
use mpi::Count;
use mpi::Tag;
use mpi::Threading;

use super::DataByRank;
use super::Rank;
use super::SizedCommunicator;

/// The MPI universe is opened once for the lifetime of the process and
/// handed out to every [`MpiWorld`]. It is wrapped in an `Option` so that
/// shutdown can explicitly drop it (which calls `MPI_Finalize`) instead of
/// relying on a `static` destructor that never runs.
pub struct StaticUniverse(Arc<Mutex<Option<Universe>>>);

impl StaticUniverse {
    pub fn world(&self) -> SystemCommunicator {
        self.0.lock().unwrap().as_ref().unwrap().world()
    }

    pub fn finalize(&self) {
        let _ = self.0.lock().unwrap().take();
    }
}

static MPI_UNIVERSE: once_cell::sync::Lazy<StaticUniverse> = once_cell::sync::Lazy::new(|| {
    let (mut universe, threading) = mpi::initialize_with_threading(Threading::Funneled)
        .expect("failed to initialize MPI universe");
    universe.set_buffer_size(1 << 20);
    debug_assert!(
        threading >= Threading::Funneled,
        "MPI implementation does not support the funneled threading level we rely on"
    );
    StaticUniverse(Arc::new(Mutex::new(Some(universe))))
});

pub fn finalize_mpi() {
    MPI_UNIVERSE.finalize();
}

fn tag_for_type<T: 'static>() -> Tag {
    let mut hasher = DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    // Truncate down to a positive i16-range value: tags only need to be
    // unique enough to keep concurrently active message types from being
    // matched against each other, a handful of bits is plenty.
    (hasher.finish() as i16).unsigned_abs() as i32
}

/// A point-to-point and collective communicator scoped to messages of type
/// `T`, built directly on top of `rsmpi`. One instance exists per message
/// kind (positions, velocities, resident counts, ...); the type-derived tag
/// keeps unrelated exchanges from matching each other's messages.
#[derive(Clone)]
pub struct MpiWorld<T> {
    world: SystemCommunicator,
    tag: Tag,
    _marker: std::marker::PhantomData<T>,
}

impl<T: 'static> MpiWorld<T> {
    pub fn new() -> Self {
        Self {
            world: MPI_UNIVERSE.world(),
            tag: tag_for_type::<T>(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: 'static> Default for MpiWorld<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SizedCommunicator for MpiWorld<T> {
    fn rank(&self) -> Rank {
        self.world.rank()
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }
}

impl<T> MpiWorld<T>
where
    T: Equivalence,
{
    pub fn blocking_send_vec(&mut self, rank: Rank, data: &[T]) {
        self.world.process_at_rank(rank).send_with_tag(data, self.tag);
    }

    pub fn receive_vec(&mut self, rank: Rank) -> Vec<T> {
        let (data, _) = self
            .world
            .process_at_rank(rank)
            .matched_probe_with_tag(self.tag)
            .matched_receive_vec();
        data
    }

    /// Post every send in `to_each_rank` as a non-blocking message, then
    /// block on receiving from every other rank in the communicator
    /// (ranks with nothing to send still receive an empty slice so that
    /// the matched receive on the peer side always finds a message).
    /// This is the 12-request building block from which the distributor's
    /// OOB and halo exchanges are assembled: it is invoked three times per
    /// phase, once each for positions, position-stars and velocities.
    pub fn exchange_slices(&mut self, to_each_rank: DataByRank<Vec<T>>) -> DataByRank<Vec<T>>
    where
        T: Clone,
    {
        let empty = Vec::new();
        scope(|scope| {
            let mut guards: Vec<WaitGuard<[T], _>> = Vec::new();
            for rank in self.other_ranks() {
                let data = to_each_rank.get(&rank).unwrap_or(&empty);
                let process = self.world.process_at_rank(rank);
                let request = process.immediate_send_with_tag(scope, data.as_slice(), self.tag);
                guards.push(WaitGuard::from(request));
            }
            let mut received = DataByRank::empty();
            for rank in self.other_ranks() {
                received.insert(rank, self.receive_vec(rank));
            }
            received
        })
    }
}

impl<T> MpiWorld<T>
where
    T: Equivalence + Clone,
{
    pub fn all_gather(&mut self, send: &T) -> Vec<T> {
        unchecked_all_gather(self.world, send)
    }

    pub fn all_gather_sum(&mut self, send: &T) -> T
    where
        T: std::iter::Sum,
    {
        self.all_gather(send).into_iter().sum()
    }

    pub fn all_reduce_sum(&mut self, send: &u64) -> u64 {
        let mut result = 0u64;
        self.world
            .all_reduce_into(send, &mut result, SystemOperation::sum());
        result
    }

    /// Exchanges one message with each present neighbor in a 1-D slab
    /// topology: posts both sends non-blocking, then blocks on both
    /// receives. Used three times per direction-pair by the distributor's
    /// OOB and halo sync (positions, position-stars, velocities), which is
    /// where the spec's "12 requests total" figure for one sync phase comes
    /// from: 3 fields times 2 directions times (send, receive).
    pub fn exchange_with_neighbors(
        &mut self,
        left: Option<Rank>,
        to_left: &[T],
        right: Option<Rank>,
        to_right: &[T],
    ) -> (Vec<T>, Vec<T>)
    where
        T: Clone,
    {
        scope(|scope| {
            let mut guards: Vec<WaitGuard<[T], _>> = Vec::new();
            if let Some(rank) = left {
                let process = self.world.process_at_rank(rank);
                let request = process.immediate_send_with_tag(scope, to_left, self.tag);
                guards.push(WaitGuard::from(request));
            }
            if let Some(rank) = right {
                let process = self.world.process_at_rank(rank);
                let request = process.immediate_send_with_tag(scope, to_right, self.tag);
                guards.push(WaitGuard::from(request));
            }
            let from_left = left.map(|rank| self.receive_vec(rank)).unwrap_or_default();
            let from_right = right.map(|rank| self.receive_vec(rank)).unwrap_or_default();
            (from_left, from_right)
        })
    }

    pub fn all_gather_varcount(&mut self, send: &[T]) -> Vec<T> {
        let mut count_world: MpiWorld<i32> = MpiWorld {
            world: self.world,
            tag: self.tag,
            _marker: std::marker::PhantomData,
        };
        let counts: Vec<Count> = count_world.all_gather(&(send.len() as Count));
        let total: usize = counts.iter().map(|c| *c as usize).sum();
        let mut result_buffer: Vec<T> = unsafe { uninitialized_buffer(total) };
        let displacements: Vec<Count> = counts
            .iter()
            .scan(0, |acc, &c| {
                let start = *acc;
                *acc += c;
                Some(start)
            })
            .collect();
        let mut partition = PartitionMut::new(&mut result_buffer, counts, &displacements[..]);
        self.world.all_gather_varcount_into(send, &mut partition);
        result_buffer
    }
}

unsafe fn uninitialized_buffer<T>(len: usize) -> Vec<T> {
    let mut buffer: Vec<MaybeUninit<T>> = Vec::with_capacity(len);
    buffer.set_len(len);
    mem::transmute(buffer)
}

fn unchecked_all_gather<T: Equivalence>(world: SystemCommunicator, send: &T) -> Vec<T> {
    let mut buffer = unsafe { uninitialized_buffer(world.size() as usize) };
    world.all_gather_into(send, &mut buffer[..]);
    buffer
}
