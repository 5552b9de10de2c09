use core::fmt::Debug;
use std::collections::hash_map;
use std::collections::HashMap;
use std::ops::Index;
use std::ops::IndexMut;

use super::Rank;
use super::SizedCommunicator;

/// A sparse map from peer rank to some per-rank payload. Ranks outside the
/// communicator's topology (including our own rank) are simply absent.
pub struct DataByRank<T>(HashMap<Rank, T>);

impl<T: Debug> Debug for DataByRank<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone> Clone for DataByRank<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> DataByRank<T> {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }
}

impl<T: Default> DataByRank<T> {
    pub fn from_communicator(communicator: &impl SizedCommunicator) -> Self {
        Self(
            (0..communicator.size())
                .filter(|rank| *rank != communicator.rank() as usize)
                .map(|rank| (rank as Rank, T::default()))
                .collect(),
        )
    }
}

impl<T> DataByRank<Vec<T>> {
    pub fn push(&mut self, rank: Rank, data: T) {
        self.0.entry(rank).or_insert_with(Vec::new).push(data);
    }

    pub fn drain_all(&mut self) -> impl Iterator<Item = (Rank, Vec<T>)> + '_ {
        self.0.iter_mut().map(|(k, v)| (*k, v.drain(..).collect()))
    }
}

impl<T> Index<Rank> for DataByRank<T> {
    type Output = T;

    fn index(&self, index: Rank) -> &Self::Output {
        self.get(&index)
            .unwrap_or_else(|| panic!("no data stored for rank {index}"))
    }
}

impl<T> IndexMut<Rank> for DataByRank<T> {
    fn index_mut(&mut self, index: Rank) -> &mut Self::Output {
        self.get_mut(&index)
            .unwrap_or_else(|| panic!("no data stored for rank {index}"))
    }
}

impl<T> DataByRank<T> {
    pub fn get(&self, rank: &Rank) -> Option<&T> {
        self.0.get(rank)
    }

    pub fn get_mut(&mut self, rank: &Rank) -> Option<&mut T> {
        self.0.get_mut(rank)
    }

    pub fn insert(&mut self, rank: Rank, data: T) {
        self.0.insert(rank, data);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rank, &T)> {
        self.0.iter()
    }
}

impl<T> IntoIterator for DataByRank<T> {
    type Item = (Rank, T);
    type IntoIter = hash_map::IntoIter<Rank, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T> FromIterator<(Rank, T)> for DataByRank<T> {
    fn from_iter<I: IntoIterator<Item = (Rank, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
