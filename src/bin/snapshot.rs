//! The single snapshot-consumer process: world rank
//! [`SNAPSHOT_CONSUMER_RANK`](hydrosweep::communication::SNAPSHOT_CONSUMER_RANK).
//! Every step it takes part in the same world-gather the compute ranks
//! drive, contributing no particles of its own, and hands the gathered
//! positions off to whichever [`SnapshotSink`] was configured.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hydrosweep::communication;
use hydrosweep::communication::SizedCommunicator;
use hydrosweep::communication::SNAPSHOT_CONSUMER_RANK;
use hydrosweep::error::Result;
use hydrosweep::logging;
use hydrosweep::real::R;
use hydrosweep::snapshot;
use hydrosweep::snapshot::BinaryTraceSink;
use hydrosweep::snapshot::SnapshotSink;
use hydrosweep::snapshot::WorldGatherSink;

#[derive(Parser, Debug)]
#[clap(name = "hydrosweep-snapshot", author, version, about, long_about = None)]
struct CommandLineOptions {
    /// Increase log verbosity; repeatable (`-v`, `-vv`, `-vvv`).
    #[clap(short, parse(from_occurrences))]
    verbosity: usize,
    /// Write a persistent binary trace to this path instead of just
    /// handing gathered snapshots to the in-process `WorldGatherSink`.
    #[clap(long)]
    trace_file: Option<PathBuf>,
    /// Directory the consumer's own log file is written under.
    #[clap(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn run() -> Result<()> {
    let options = CommandLineOptions::parse();

    let bootstrap = communication::new_communicator::<u8>();
    let world_rank = bootstrap.rank();
    assert_eq!(
        world_rank, SNAPSHOT_CONSUMER_RANK,
        "hydrosweep-snapshot must run on the rank reserved for the snapshot consumer"
    );
    drop(bootstrap);

    logging::setup(0, 1, &options.log_dir, options.verbosity, true);

    let mut sink: Box<dyn SnapshotSink<R>> = match &options.trace_file {
        Some(path) => Box::new(BinaryTraceSink::create(path)?),
        None => Box::new(WorldGatherSink::<R>::new()),
    };

    let mut comm_count = communication::new_communicator::<u64>();
    let mut comm_position = communication::new_communicator::<R>();
    let mut comm_continue = communication::new_communicator::<u8>();

    let mut step = 0u64;
    loop {
        let gathered = snapshot::gather_step(&mut comm_count, &mut comm_position, &[]);
        sink.consume(step, &gathered)?;

        let keep_going = snapshot::gather_continue_flag(&mut comm_continue, true);
        if !keep_going {
            log::info!("snapshot consumer stopping after step {step}");
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
            log::error!("hydrosweep-snapshot exiting with error: {err}");
            communication::finalize_mpi();
            ExitCode::from(1)
        }
    }
}
