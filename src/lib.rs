//! # hydrosweep
//!
//! The core of a distributed, parallel, position-based-dynamics (PBD)
//! smoothed-particle-hydrodynamics (SPH) fluid solver: the per-step
//! constraint-projection pipeline, the uniform-grid neighbor search that
//! feeds it, and the 1-D slab domain decomposition that keeps particles
//! and halo regions coherent across processes.
//!
//! The crate is dimension- and precision-generic at compile time via the
//! `2d`/`3d` and `f32`/`f64` cargo features (exactly one of each pair must
//! be active; see the `static_assertions`-style checks below). Across
//! processes the solver runs SPMD over MPI (`rsmpi`); the `local` feature
//! swaps in an in-process channel communicator so the distributor and
//! solver can be exercised by ordinary `#[test]` functions without a real
//! MPI launcher.
//!
//! Two binaries consume this library: `hydrosweep-compute` (the N-rank
//! solver loop) and `hydrosweep-snapshot` (the 1-rank snapshot consumer).
//! Everything outside `src/bin/` is a plain library — no binary-specific
//! state (argv, exit codes, the process-wide logger) leaks into it.

#[cfg(all(feature = "2d", feature = "3d"))]
compile_error!("features \"2d\" and \"3d\" are mutually exclusive; pick exactly one dimension");
#[cfg(all(feature = "f32", feature = "f64"))]
compile_error!("features \"f32\" and \"f64\" are mutually exclusive; pick exactly one precision");
#[cfg(all(feature = "mpi-backend", feature = "local"))]
compile_error!(
    "features \"mpi-backend\" and \"local\" are mutually exclusive; the test suite builds with \
     --no-default-features --features \"3d,f64,local\""
);

pub mod communication;
pub mod config;
pub mod domain;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod neighbor;
pub mod parallel;
pub mod parameters;
pub mod particles;
pub mod real;
pub mod snapshot;
pub mod solver;
pub mod vector;
