//! The parallelism abstraction every per-particle pass is written against.
//!
//! The core depends only on these four operations, never on `rayon`
//! directly outside this module, so a single-threaded or GPU backend could
//! be dropped in later without touching the solver, neighbor index or
//! distributor. Today the only backend is the CPU thread pool (`rayon`),
//! mirroring how `splashsurf_lib` keeps its parallelism behind a handful of
//! free functions rather than scattering `par_iter()` through the solver.

use std::ops::Range;

use rayon::prelude::*;

/// A half-open `[begin, end)` range of particle indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        assert!(begin <= end, "span begin {begin} is past its end {end}");
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

/// Invokes `body(i)` for every `i` in `span`. Iteration order is
/// unspecified; `body` must not write to indices other than `i` in any
/// shared buffer it closes over.
pub fn for_each_index<F>(span: Span, body: F)
where
    F: Fn(usize) + Sync,
{
    span.as_range().into_par_iter().for_each(body);
}

/// Invokes `body(i)` for every `i` in `span` and collects the results in
/// order, for passes that build a brand-new per-index value (such as a
/// freshly filled neighbor list) rather than mutating shared storage.
pub fn map_index<T, F>(span: Span, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    span.as_range().into_par_iter().map(body).collect()
}

/// Parallel sort of `keys`, reordering `values` to match. Not required to
/// be stable among equal keys.
pub fn sort_by_key<K, V>(keys: &mut [K], values: &mut [V])
where
    K: Ord + Send + Clone,
    V: Send + Clone,
{
    assert_eq!(keys.len(), values.len());
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.par_sort_unstable_by(|&a, &b| keys[a].cmp(&keys[b]));
    let sorted_keys: Vec<K> = order.iter().map(|&i| keys[i].clone()).collect();
    let sorted_values: Vec<V> = order.iter().map(|&i| values[i].clone()).collect();
    keys.clone_from_slice(&sorted_keys);
    values.clone_from_slice(&sorted_values);
}

/// For every key in `search_keys`, the index of the first element in the
/// sorted range `haystack` that is not less than it (a batched, parallel
/// `partition_point`).
pub fn lower_bound<K: Ord + Sync>(haystack: &[K], search_keys: &[K], out: &mut [usize]) {
    assert_eq!(search_keys.len(), out.len());
    out.par_iter_mut()
        .zip(search_keys.par_iter())
        .for_each(|(slot, key)| {
            *slot = haystack.partition_point(|x| x < key);
        });
}

/// For every key in `search_keys`, the index of the first element in the
/// sorted range `haystack` that is greater than it.
pub fn upper_bound<K: Ord + Sync>(haystack: &[K], search_keys: &[K], out: &mut [usize]) {
    assert_eq!(search_keys.len(), out.len());
    out.par_iter_mut()
        .zip(search_keys.par_iter())
        .for_each(|(slot, key)| {
            *slot = haystack.partition_point(|x| x <= key);
        });
}

/// Three-way partition of `[0, len)` by `predicate`, returning the indices
/// for which the predicate was `Less`, `Equal` and `Greater` respectively,
/// in that relative order within each bucket being unspecified. Implemented
/// as two consecutive two-way partitions, per the spec's own description of
/// this operation.
pub enum Bucket {
    Less,
    Equal,
    Greater,
}

pub fn partition3<F>(len: usize, predicate: F) -> (Vec<usize>, Vec<usize>, Vec<usize>)
where
    F: Fn(usize) -> Bucket + Sync,
{
    let classified: Vec<Bucket> = (0..len).into_par_iter().map(&predicate).collect();
    let mut less = Vec::new();
    let mut equal = Vec::new();
    let mut greater = Vec::new();
    for (i, bucket) in classified.into_iter().enumerate() {
        match bucket {
            Bucket::Less => less.push(i),
            Bucket::Equal => equal.push(i),
            Bucket::Greater => greater.push(i),
        }
    }
    (less, equal, greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_each_index_visits_every_element() {
        let mut hits = vec![0usize; 100];
        let hits_ptr = hits.as_mut_ptr() as usize;
        for_each_index(Span::new(0, 100), move |i| unsafe {
            *(hits_ptr as *mut usize).add(i) = 1;
        });
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn sort_by_key_reorders_values_in_lockstep() {
        let mut keys = vec![3, 1, 2];
        let mut values = vec!["c", "a", "b"];
        sort_by_key(&mut keys, &mut values);
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn lower_and_upper_bound_bracket_equal_runs() {
        let haystack = vec![0, 0, 1, 1, 1, 3];
        let keys = vec![1];
        let mut lo = vec![0];
        let mut hi = vec![0];
        lower_bound(&haystack, &keys, &mut lo);
        upper_bound(&haystack, &keys, &mut hi);
        assert_eq!(lo[0], 2);
        assert_eq!(hi[0], 5);
    }

    #[test]
    fn partition3_buckets_by_predicate() {
        let (less, equal, greater) = partition3(5, |i| match i {
            0 | 1 => Bucket::Less,
            2 => Bucket::Equal,
            _ => Bucket::Greater,
        });
        assert_eq!(less, vec![0, 1]);
        assert_eq!(equal, vec![2]);
        assert_eq!(greater, vec![3, 4]);
    }
}
