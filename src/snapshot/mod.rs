//! The snapshot path: the per-step world-gather that hands resident
//! particle positions to an opaque downstream consumer, and the one
//! concrete sink (a persistent binary trace) this crate ships alongside
//! the in-process "hand positions to the renderer" default.
//!
//! Per the counting protocol, this is the one place where the
//! snapshot-consumer rank and the compute ranks participate in the same
//! collective: everyone calls [`gather_step`] once a step, the consumer
//! contributing an empty position slice so it still counts towards the
//! collective without owning any particles itself.

use std::fs::File;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::communication::Communicator;
use crate::error::SnapshotError;
use crate::real::Real;
use crate::vector::{flatten, unflatten, VecD};

/// One step's worth of gathered resident positions, plus the per-rank
/// counts the gather produced them from. `counts[r]` is the number of
/// positions in `positions` contributed by world rank `r` (the snapshot
/// consumer's own entry is always `0`).
#[derive(Clone, Debug)]
pub struct GatheredSnapshot<R: Real> {
    pub counts: Vec<u64>,
    pub positions: Vec<VecD<R>>,
}

impl<R: Real> GatheredSnapshot<R> {
    /// Per-rank `(offset, count)` pairs into `positions`, in rank order.
    fn rank_spans(&self) -> Vec<(usize, usize)> {
        let mut offset = 0usize;
        self.counts
            .iter()
            .map(|&count| {
                let span = (offset, count as usize);
                offset += count as usize;
                span
            })
            .collect()
    }
}

/// Gathers resident positions across the world communicator: a world-gather
/// of per-rank counts, then a world-gatherv of the positions themselves.
/// `own_positions` must be empty on the snapshot-consumer rank, which
/// contributes a `0` count and receives the full gathered buffer back like
/// every other participant.
pub fn gather_step<R: Real>(
    comm_count: &mut Communicator<u64>,
    comm_position: &mut Communicator<R>,
    own_positions: &[VecD<R>],
) -> GatheredSnapshot<R> {
    let own_count = own_positions.len() as u64;
    let counts = comm_count.all_gather(&own_count);
    let own_flat = flatten(own_positions);
    let gathered_flat = comm_position.all_gather_varcount(&own_flat);
    let positions = unflatten(&gathered_flat);
    GatheredSnapshot { counts, positions }
}

/// Reconciles whether every rank in the world communicator (compute ranks
/// and the snapshot consumer alike) still wants to run another step.
/// `keep_going` is this rank's own vote; the consumer always votes `true`
/// since cancellation is driven entirely by the compute side (the `EXIT`
/// simulation-mode bit). The loop continues only while every vote is `true`,
/// so one rank deciding to stop reliably stops every other rank at the same
/// iteration boundary instead of leaving the collective gather orphaned.
pub fn gather_continue_flag(comm: &mut Communicator<u8>, keep_going: bool) -> bool {
    let votes = comm.all_gather(&(keep_going as u8));
    votes.iter().all(|&vote| vote == 1)
}

/// Opaque consumer of one step's gathered positions. The core commits only
/// to invoking whichever sink was configured once per step; what happens
/// downstream (rendering, writing to disk, nothing at all) is entirely up
/// to the sink.
pub trait SnapshotSink<R: Real> {
    fn consume(&mut self, step: u64, snapshot: &GatheredSnapshot<R>) -> Result<(), SnapshotError>;
}

/// The default sink: hands the gathered snapshot off to whatever in-process
/// consumer (a renderer, a test assertion) wants to read it back via
/// [`WorldGatherSink::latest`], logging the step's particle count at debug
/// level the way the rest of the crate logs phase boundaries.
#[derive(Default)]
pub struct WorldGatherSink<R: Real> {
    latest: Option<GatheredSnapshot<R>>,
}

impl<R: Real> WorldGatherSink<R> {
    pub fn new() -> Self {
        Self { latest: None }
    }

    pub fn latest(&self) -> Option<&GatheredSnapshot<R>> {
        self.latest.as_ref()
    }
}

impl<R: Real> SnapshotSink<R> for WorldGatherSink<R> {
    fn consume(&mut self, step: u64, snapshot: &GatheredSnapshot<R>) -> Result<(), SnapshotError> {
        log::debug!(
            "snapshot step {step}: {} resident particles across {} ranks",
            snapshot.positions.len(),
            snapshot.counts.len()
        );
        self.latest = Some(snapshot.clone());
        Ok(())
    }
}

/// Persistent trace output: one record per step, each laid out as
/// `{global_bytes, local_bytes, offset_bytes, positions}` where
/// `local_bytes`/`offset_bytes` are per contributing rank, computed as an
/// exclusive scan of each rank's byte count, so a reader can seek directly
/// to any rank's slice of a step without decoding the whole record.
pub struct BinaryTraceSink {
    path: PathBuf,
    file: File,
}

impl BinaryTraceSink {
    pub fn create(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::create(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { path: path.to_path_buf(), file })
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io { path: self.path.display().to_string(), source }
    }
}

impl<R: Real> SnapshotSink<R> for BinaryTraceSink {
    fn consume(&mut self, step: u64, snapshot: &GatheredSnapshot<R>) -> Result<(), SnapshotError> {
        let component_size = std::mem::size_of::<R>();
        let spans = snapshot.rank_spans();
        let global_bytes = (snapshot.positions.len() * crate::vector::DIM * component_size) as u64;

        self.file.write_all(&step.to_le_bytes()).map_err(|e| self.io_error(e))?;
        self.file.write_all(&global_bytes.to_le_bytes()).map_err(|e| self.io_error(e))?;
        self.file
            .write_all(&(spans.len() as u64).to_le_bytes())
            .map_err(|e| self.io_error(e))?;
        for (offset, count) in &spans {
            let local_bytes = (*count * crate::vector::DIM * component_size) as u64;
            let offset_bytes = (*offset * crate::vector::DIM * component_size) as u64;
            self.file.write_all(&local_bytes.to_le_bytes()).map_err(|e| self.io_error(e))?;
            self.file.write_all(&offset_bytes.to_le_bytes()).map_err(|e| self.io_error(e))?;
        }

        let flat = flatten(&snapshot.positions);
        let bytes = unsafe {
            std::slice::from_raw_parts(flat.as_ptr() as *const u8, std::mem::size_of_val(flat.as_slice()))
        };
        self.file.write_all(bytes).map_err(|e| self.io_error(e))?;
        self.file.flush().map_err(|e| self.io_error(e))?;
        // Leave the cursor at EOF: records are appended sequentially, never
        // rewritten, so the next `consume` picks up right where this left off.
        self.file.seek(SeekFrom::End(0)).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vector;

    #[test]
    fn rank_spans_is_an_exclusive_scan_of_counts() {
        let snapshot = GatheredSnapshot::<f64> {
            counts: vec![0, 3, 2, 5],
            positions: Vec::new(),
        };
        assert_eq!(snapshot.rank_spans(), vec![(0, 0), (0, 3), (3, 2), (5, 5)]);
    }

    #[test]
    fn world_gather_sink_stores_the_latest_snapshot() {
        let mut sink = WorldGatherSink::<f64>::new();
        assert!(sink.latest().is_none());
        let snapshot = GatheredSnapshot { counts: vec![0, 2], positions: vec![] };
        sink.consume(0, &snapshot).unwrap();
        assert!(sink.latest().is_some());
    }

    #[test]
    fn binary_trace_sink_writes_a_header_per_step() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hydrosweep-trace-test-{}.bin", std::process::id()));
        let mut sink = BinaryTraceSink::create(&path).unwrap();
        let snapshot = GatheredSnapshot::<f64> {
            counts: vec![0, 1],
            positions: vec![crate::vector::VecD::<f64>::splat(1.0)],
        };
        SnapshotSink::consume(&mut sink, 0, &snapshot).unwrap();
        let written = std::fs::metadata(&path).unwrap().len();
        assert!(written > 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(feature = "local")]
    fn continue_flag_stops_every_rank_once_any_rank_votes_to_stop() {
        use std::thread;

        use crate::communication::local_communicators;

        let mut comms = local_communicators::<u8>(3);
        let votes = [true, true, false];
        let handles: Vec<_> = (0..3)
            .map(|rank| {
                let mut comm = comms.remove(&rank).unwrap();
                let keep_going = votes[rank as usize];
                thread::spawn(move || gather_continue_flag(&mut comm, keep_going))
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap());
        }
    }
}
