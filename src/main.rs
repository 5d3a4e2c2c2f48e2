use anyhow::{Context, Result};
use clap::{crate_name, crate_version, Arg, ArgAction, Command};
use env_logger::Builder;
use log::{info, LevelFilter};
use rusty_tsh::defaults::CONFIG_FILE_NAME;
use rusty_tsh::dynamics::{run_ensemble, TrajectoryResult};
use rusty_tsh::initialization::{DynamicConfiguration, SystemData};
use rusty_tsh::interface::TullySingleCrossing;
use rusty_tsh::output::write_trajectory;
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("surface hopping dynamics with fewest switches and global switches")
        .arg(
            Arg::new("config")
                .help("Sets the configuration file to use")
                .takes_value(true)
                .default_value(CONFIG_FILE_NAME)
                .index(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .help("Increases the print level")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Directory for the output files")
                .takes_value(true)
                .default_value("."),
        )
        .get_matches();

    // read the configuration file, if it does not exist in the directory
    // the program initializes the default settings and writes a configuration file
    let config_file_path: &Path = Path::new(
        matches
            .get_one::<String>("config")
            .map(String::as_str)
            .unwrap_or(CONFIG_FILE_NAME),
    );
    let config: DynamicConfiguration = DynamicConfiguration::from_file(config_file_path)
        .with_context(|| format!("Unable to load {}", config_file_path.display()))?;

    let verbose: i8 = config.verbose + matches.get_count("verbose") as i8;
    let log_level: LevelFilter = match verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        v if v > 2 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    };

    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    let output_directory: PathBuf = PathBuf::from(
        matches
            .get_one::<String>("output")
            .map(String::as_str)
            .unwrap_or("."),
    );
    std::fs::create_dir_all(&output_directory)
        .with_context(|| format!("Unable to create {}", output_directory.display()))?;

    info!(
        "{} trajectories with {:?}, {} steps of {} fs",
        config.ensemble.ntraj, config.hopping.hopping_method, config.nstep, config.stepsize
    );
    let system: SystemData = SystemData::from(&config.model);
    let results = run_ensemble(&config, &system, |_| {
        TullySingleCrossing::from_config(&config.model, config.coupling_type)
    });

    let mut finished: Vec<TrajectoryResult> = Vec::new();
    for result in results.into_iter().flatten() {
        write_trajectory(
            &config.print,
            &output_directory,
            result.index,
            &result.hop_log,
            &result.output,
        )
        .with_context(|| format!("Unable to write the output of trajectory {}", result.index))?;
        finished.push(result);
    }

    let nstates: usize = config.nstates;
    let mut final_populations: Vec<usize> = vec![0; nstates];
    for result in finished.iter() {
        final_populations[result.final_state] += 1;
    }
    info!(
        "{} of {} trajectories finished",
        finished.len(),
        config.ensemble.ntraj
    );
    for (state, count) in final_populations.iter().enumerate() {
        let fraction: f64 = if finished.is_empty() {
            0.0
        } else {
            *count as f64 / finished.len() as f64
        };
        info!("final population of state {}: {:.4}", state, fraction);
    }
    Ok(())
}
