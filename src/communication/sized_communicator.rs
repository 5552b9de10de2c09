use super::Rank;

/// Topology information shared by every communicator backend, regardless of
/// whether messages travel over MPI or an in-process channel.
pub trait SizedCommunicator {
    fn rank(&self) -> Rank;
    fn size(&self) -> usize;

    fn other_ranks(&self) -> Vec<Rank> {
        (0i32..self.size() as i32)
            .filter(|rank| *rank != self.rank())
            .collect()
    }

    fn all_ranks(&self) -> Vec<Rank> {
        (0i32..self.size() as i32).collect()
    }

    fn is_main(&self) -> bool {
        self.rank() == 0
    }
}
