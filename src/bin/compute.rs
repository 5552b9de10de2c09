//! The N-rank compute driver: owns one slab of the fluid and runs the
//! per-step PBD-SPH pipeline until the `EXIT` simulation-mode bit is set or
//! `--steps` is reached. Launched alongside exactly one
//! `hydrosweep-snapshot` process (world rank
//! [`SNAPSHOT_CONSUMER_RANK`](hydrosweep::communication::SNAPSHOT_CONSUMER_RANK))
//! in an MPMD `mpirun` invocation; every other world rank runs this binary.

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hydrosweep::communication;
use hydrosweep::communication::Communicator;
use hydrosweep::communication::Rank;
use hydrosweep::communication::SizedCommunicator;
use hydrosweep::communication::SNAPSHOT_CONSUMER_RANK;
use hydrosweep::config;
use hydrosweep::domain::Domain;
use hydrosweep::error::ConfigError;
use hydrosweep::error::Result;
use hydrosweep::logging;
use hydrosweep::parameters::Parameters;
use hydrosweep::parameters::SimulationMode;
use hydrosweep::particles::ParticleStore;
use hydrosweep::real::R;
use hydrosweep::snapshot;
use hydrosweep::snapshot::SnapshotSink;
use hydrosweep::snapshot::WorldGatherSink;
use hydrosweep::solver::Solver;
use hydrosweep::vector::Vector;
use hydrosweep::vector::VecD;

#[derive(Parser, Debug)]
#[clap(name = "hydrosweep-compute", author, version, about, long_about = None)]
struct CommandLineOptions {
    /// Path to the `.ini` parameters file, read on compute rank 0 and
    /// broadcast to the rest of the compute sub-communicator.
    parameter_file_path: PathBuf,
    /// Increase log verbosity; repeatable (`-v`, `-vv`, `-vvv`).
    #[clap(short, parse(from_occurrences))]
    verbosity: usize,
    /// Stop after this many steps regardless of `simulation_mode`. Absent
    /// means run until the `EXIT` bit is observed on a parameter reload.
    #[clap(long)]
    steps: Option<u64>,
    /// Directory per-rank log files are written under.
    #[clap(long, default_value = "logs")]
    log_dir: PathBuf,
}

/// Reads and parses `path` on local compute rank 0, broadcasting the raw
/// file text to every other compute rank so they parse an identical copy
/// rather than each reading the file independently. Re-invoked once per
/// step so that edits to the parameters file (in particular the `EXIT`
/// bit) propagate to every rank, matching the "broadcast on change"
/// parameter model.
fn load_and_broadcast_parameters(
    local_rank: Rank,
    num_ranks: usize,
    world_rank_offset: Rank,
    comm: &mut Communicator<u8>,
    path: &Path,
) -> Result<config::Sections> {
    if local_rank == 0 {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for peer in 1..num_ranks as Rank {
            comm.blocking_send_vec(peer + world_rank_offset, contents.as_bytes());
        }
        Ok(config::parse_sections(&contents, path)?)
    } else {
        let bytes = comm.receive_vec(world_rank_offset);
        let contents = String::from_utf8(bytes)
            .expect("parameter broadcast payload was not valid utf-8");
        Ok(config::parse_sections(&contents, path)?)
    }
}

fn run() -> Result<()> {
    let options = CommandLineOptions::parse();

    let bootstrap = communication::new_communicator::<u8>();
    let world_rank = bootstrap.rank();
    let world_size = bootstrap.size();
    assert_ne!(
        world_rank, SNAPSHOT_CONSUMER_RANK,
        "hydrosweep-compute must not run on the rank reserved for the snapshot consumer"
    );
    drop(bootstrap);

    let world_rank_offset = SNAPSHOT_CONSUMER_RANK + 1;
    let local_rank = world_rank - world_rank_offset;
    let num_ranks = world_size - 1;

    logging::setup(local_rank, num_ranks, &options.log_dir, options.verbosity, false);

    let mut comm_params = communication::new_communicator::<u8>();
    let sections = load_and_broadcast_parameters(
        local_rank,
        num_ranks,
        world_rank_offset,
        &mut comm_params,
        &options.parameter_file_path,
    )?;
    let mut params = Parameters::<R>::from_sections(&sections)?;

    let edge_width = R::from_f64(params.edge_width());
    let mut domain = Domain::new(
        local_rank,
        num_ranks,
        world_rank_offset,
        params.regions.boundary,
        edge_width,
        communication::new_communicator(),
        communication::new_communicator(),
        communication::new_communicator(),
        communication::new_communicator(),
        communication::new_communicator(),
        communication::new_communicator(),
    );

    let mut store = ParticleStore::<R>::with_capacity(params.sim.max_particles_local);
    let spacing = R::from_f64(params.physical.particle_rest_spacing);
    domain.initialize_fluid(&mut store, &params.regions.initial_fluid, VecD::<R>::zero(), spacing);

    let mut solver = Solver::new(&params);
    let mut comm_count = communication::new_communicator::<u64>();
    let mut comm_position = communication::new_communicator::<R>();
    let mut comm_continue = communication::new_communicator::<u8>();
    let mut sink = WorldGatherSink::<R>::new();

    let mut step = 0u64;
    loop {
        let sections =
            load_and_broadcast_parameters(local_rank, num_ranks, world_rank_offset, &mut comm_params, &options.parameter_file_path)?;
        params = Parameters::<R>::from_sections(&sections)?;

        domain.process_parameters(&mut store, &params);
        solver.step(&mut store, &mut domain, &params);

        let resident = domain.layout().resident_span();
        let own_positions = &store.position()[resident.begin..resident.end];
        let gathered = snapshot::gather_step(&mut comm_count, &mut comm_position, own_positions);
        sink.consume(step, &gathered)?;

        domain.invalidate_halo(&mut store);

        let reached_step_budget = options.steps.is_some_and(|budget| step + 1 >= budget);
        let exiting = params.simulation_mode.contains(SimulationMode::EXIT) || reached_step_budget;
        let keep_going = snapshot::gather_continue_flag(&mut comm_continue, !exiting);
        if !keep_going {
            log::info!("rank {local_rank} stopping after step {step}");
            break;
        }
        step += 1;
    }

    communication::finalize_mpi();
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            log::error!("hydrosweep-compute exiting with error: {err}");
            communication::finalize_mpi();
            ExitCode::from(1)
        }
    }
}
