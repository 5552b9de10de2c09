//! Log setup for the two binaries. Mirrors the teacher's own
//! `simulation_builder::log_setup`: rank 0 logs to the terminal and to a
//! per-rank file, every other rank logs to its file only (unless silenced),
//! with the local UTC offset captured once via `chrono` and handed to
//! `simplelog`'s `time`-based config.

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::ColorChoice;
use simplelog::CombinedLogger;
use simplelog::ConfigBuilder;
use simplelog::LevelPadding;
use simplelog::TermLogger;
use simplelog::TerminalMode;
use simplelog::WriteLogger;
use time::UtcOffset;

/// `0` = info, `1` = debug, `2` = trace; any other level is rejected.
pub fn level_from_verbosity(verbosity: usize) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Trace,
        v => panic!("unsupported verbosity level: {v}"),
    }
}

fn rank_log_path(output_dir: &Path, rank: i32, num_ranks: usize) -> PathBuf {
    let padding = ((num_ranks.max(1) as f64).log10().floor() as usize) + 1;
    output_dir.join(format!("rank_{:0padding$}.log", rank, padding = padding))
}

/// Initializes the global logger for one process. Only rank 0 writes to the
/// terminal; every rank writes its own log file under `output_dir` unless
/// `only_main_rank` silences the others entirely.
pub fn setup(rank: i32, num_ranks: usize, output_dir: &Path, verbosity: usize, only_main_rank: bool) {
    fs::create_dir_all(output_dir)
        .unwrap_or_else(|_| panic!("failed to create log directory at {output_dir:?}"));
    let level = level_from_verbosity(verbosity);
    let local = chrono::Local::now();
    let offset = local.offset();
    let config = ConfigBuilder::default()
        .set_level_padding(LevelPadding::Right)
        .set_time_offset(UtcOffset::from_whole_seconds(offset.local_minus_utc()).unwrap())
        .set_thread_level(LevelFilter::Off)
        .build();
    let output_file = rank_log_path(output_dir, rank, num_ranks);

    if rank == 0 {
        CombinedLogger::init(vec![
            TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
            WriteLogger::new(level, config, File::create(output_file).unwrap()),
        ])
        .unwrap();
    } else if !only_main_rank {
        WriteLogger::init(level, config, File::create(output_file).unwrap()).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_verbosity_maps_known_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Info);
        assert_eq!(level_from_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(2), LevelFilter::Trace);
    }

    #[test]
    fn rank_log_path_pads_to_rank_count_width() {
        let dir = Path::new("logs");
        assert_eq!(rank_log_path(dir, 3, 12), dir.join("rank_03.log"));
        assert_eq!(rank_log_path(dir, 3, 200), dir.join("rank_003.log"));
    }
}
