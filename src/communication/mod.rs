//! Point-to-point and collective message passing between compute ranks.
//!
//! The distributor (`crate::domain`) is written against the
//! [`Communicator`] type alias below rather than against `MpiWorld` or
//! `LocalCommunicator` directly, so that the exact same decomposition code
//! runs unmodified under real MPI and under the in-process test harness.

mod data_by_rank;
mod local;
mod sized_communicator;

pub use data_by_rank::DataByRank;
pub use sized_communicator::SizedCommunicator;

/// A process rank. Defined independently of the `mpi` crate (rather than
/// as an alias for `mpi::Rank`) so that this module still type-checks when
/// built with `--features local` alone, which pulls in neither the `mpi`
/// crate nor its types.
pub type Rank = i32;

#[cfg(feature = "mpi-backend")]
mod mpi_world;

#[cfg(feature = "mpi-backend")]
pub use mpi_world::finalize_mpi;
#[cfg(feature = "mpi-backend")]
pub type Communicator<T> = mpi_world::MpiWorld<T>;
#[cfg(feature = "mpi-backend")]
pub fn new_communicator<T: 'static>() -> Communicator<T> {
    mpi_world::MpiWorld::new()
}

#[cfg(feature = "local")]
pub type Communicator<T> = local::LocalCommunicator<T>;
#[cfg(feature = "local")]
pub use local::local_communicators;

/// The rank reserved for the snapshot/renderer consumer (see `crate::snapshot`).
/// Every other rank participates in the compute sub-communicator.
pub const SNAPSHOT_CONSUMER_RANK: Rank = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WorldRank(pub Rank);

impl WorldRank {
    pub fn is_snapshot_consumer(&self) -> bool {
        self.0 == SNAPSHOT_CONSUMER_RANK
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NumRanks(pub usize);

#[cfg(all(test, feature = "local"))]
mod tests {
    use std::thread;

    use super::local::local_communicators;

    #[test]
    fn local_communicator_round_trip() {
        let mut comms = local_communicators::<i32>(3);
        let handles: Vec<_> = (0..3)
            .map(|rank| {
                let mut comm = comms.remove(&rank).unwrap();
                thread::spawn(move || {
                    let target = (rank + 1).rem_euclid(3);
                    comm.blocking_send_vec(target, &[rank, target]);
                    let from_prev = (rank + 3 - 1).rem_euclid(3);
                    let received = comm.receive_vec(from_prev);
                    assert_eq!(received, vec![from_prev, rank]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
