use std::collections::HashMap;
use std::mem;
use std::ptr;
use std::slice;
use std::sync::mpsc::channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;

use super::DataByRank;
use super::Rank;
use super::SizedCommunicator;

/// Bytes travelling over a [`LocalCommunicator`] channel. Reinterpreting raw
/// bytes back into `T` only requires that the sender and receiver agree on
/// the type, which a single-process test harness can guarantee.
struct Payload(Vec<u8>);

/// An in-process stand-in for [`super::mpi_world::MpiWorld`], used so the
/// distributor and solver can be exercised by ordinary `#[test]` functions
/// spawning one OS thread per simulated rank, without linking against a
/// real MPI implementation.
pub struct LocalCommunicator<T> {
    senders: DataByRank<Sender<Payload>>,
    receivers: DataByRank<Receiver<Payload>>,
    rank: Rank,
    size: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T> SizedCommunicator for LocalCommunicator<T> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

impl<T: Send> LocalCommunicator<T> {
    pub fn blocking_send_vec(&mut self, rank: Rank, data: &[T]) {
        let bytes = unsafe {
            slice::from_raw_parts(data.as_ptr() as *const u8, mem::size_of_val(data)).to_vec()
        };
        self.senders[rank]
            .send(Payload(bytes))
            .expect("peer rank's channel endpoint was dropped");
    }

    pub fn receive_vec(&mut self, rank: Rank) -> Vec<T> {
        let Payload(bytes) = self.receivers[rank]
            .recv()
            .expect("peer rank's channel endpoint was dropped");
        let item_size = mem::size_of::<T>();
        debug_assert_eq!(bytes.len() % item_size.max(1), 0);
        if item_size == 0 {
            return Vec::new();
        }
        bytes
            .chunks_exact(item_size)
            .map(|chunk| unsafe { ptr::read(chunk.as_ptr() as *const T) })
            .collect()
    }

    pub fn exchange_slices(&mut self, to_each_rank: DataByRank<Vec<T>>) -> DataByRank<Vec<T>>
    where
        T: Clone,
    {
        let empty = Vec::new();
        for rank in self.other_ranks() {
            let data = to_each_rank.get(&rank).unwrap_or(&empty);
            self.blocking_send_vec(rank, data);
        }
        let mut received = DataByRank::empty();
        for rank in self.other_ranks() {
            received.insert(rank, self.receive_vec(rank));
        }
        received
    }

    /// See [`super::mpi_world::MpiWorld::exchange_with_neighbors`]. The
    /// channel backend has no real concurrency to overlap, so this simply
    /// sends to whichever neighbors are present and then receives from
    /// them in the same order, which is observationally identical to the
    /// nonblocking-then-wait-all pattern used over real MPI.
    pub fn exchange_with_neighbors(
        &mut self,
        left: Option<Rank>,
        to_left: &[T],
        right: Option<Rank>,
        to_right: &[T],
    ) -> (Vec<T>, Vec<T>) {
        if let Some(rank) = left {
            self.blocking_send_vec(rank, to_left);
        }
        if let Some(rank) = right {
            self.blocking_send_vec(rank, to_right);
        }
        let from_left = left.map(|rank| self.receive_vec(rank)).unwrap_or_default();
        let from_right = right.map(|rank| self.receive_vec(rank)).unwrap_or_default();
        (from_left, from_right)
    }
}

impl<T: Send + Clone> LocalCommunicator<T> {
    pub fn all_gather(&mut self, send: &T) -> Vec<T> {
        for rank in self.other_ranks() {
            self.blocking_send_vec(rank, &[send.clone()]);
        }
        let mut result = vec![send.clone(); self.size];
        for rank in self.other_ranks() {
            let mut received = self.receive_vec(rank);
            result[rank as usize] = received.remove(0);
        }
        result
    }

    pub fn all_gather_sum(&mut self, send: &T) -> T
    where
        T: std::iter::Sum,
    {
        self.all_gather(send).into_iter().sum()
    }

    pub fn all_gather_varcount(&mut self, send: &[T]) -> Vec<T> {
        for rank in self.other_ranks() {
            self.blocking_send_vec(rank, send);
        }
        let mut result = Vec::new();
        let mut by_rank: HashMap<Rank, Vec<T>> = HashMap::new();
        by_rank.insert(self.rank, send.to_vec());
        for rank in self.other_ranks() {
            by_rank.insert(rank, self.receive_vec(rank));
        }
        for rank in 0..self.size as Rank {
            result.extend(by_rank.remove(&rank).unwrap_or_default());
        }
        result
    }
}

/// Builds one fully-connected mesh of channels, one [`LocalCommunicator`]
/// per simulated rank. Intended to be handed out to `num_ranks` worker
/// threads, mirroring how `MpiWorld::new` hands every real MPI rank its own
/// handle onto the same `SystemCommunicator`.
pub fn local_communicators<T: Send + 'static>(num_ranks: usize) -> HashMap<Rank, LocalCommunicator<T>> {
    let mut senders: HashMap<(Rank, Rank), Sender<Payload>> = HashMap::new();
    let mut receivers: HashMap<(Rank, Rank), Receiver<Payload>> = HashMap::new();
    for from in 0..num_ranks as Rank {
        for to in 0..num_ranks as Rank {
            if from == to {
                continue;
            }
            let (tx, rx) = channel();
            senders.insert((from, to), tx);
            receivers.insert((from, to), rx);
        }
    }
    (0..num_ranks as Rank)
        .map(|rank| {
            let mut rank_senders = DataByRank::empty();
            let mut rank_receivers = DataByRank::empty();
            for other in 0..num_ranks as Rank {
                if other == rank {
                    continue;
                }
                rank_senders.insert(other, senders.remove(&(rank, other)).unwrap());
                rank_receivers.insert(other, receivers.remove(&(other, rank)).unwrap());
            }
            (
                rank,
                LocalCommunicator {
                    senders: rank_senders,
                    receivers: rank_receivers,
                    rank,
                    size: num_ranks,
                    _marker: std::marker::PhantomData,
                },
            )
        })
        .collect()
}
