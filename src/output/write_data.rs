use crate::constants;
use crate::dynamics::HopRecord;
use crate::error::Result;
use crate::initialization::{PrintConfiguration, TrajectoryState};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Energies and state of a trajectory after one committed step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StepOutput {
    pub step: usize,
    // time in fs
    pub time: f64,
    pub state: usize,
    pub kinetic_energy: f64,
    pub potential_energy: f64,
    pub total_energy: f64,
    pub energies: Vec<f64>,
    pub populations: Vec<f64>,
}

impl StepOutput {
    pub fn new(trajectory: &TrajectoryState) -> StepOutput {
        let kinetic_energy: f64 = trajectory.kinetic_energy();
        let potential_energy: f64 = trajectory.potential_energy();
        StepOutput {
            step: trajectory.step,
            time: trajectory.actual_time / constants::FS_TO_AU,
            state: trajectory.state,
            kinetic_energy,
            potential_energy,
            total_energy: kinetic_energy + potential_energy,
            energies: trajectory.energies.to_vec(),
            populations: trajectory.populations().to_vec(),
        }
    }
}

/// Write the hop log as JSON lines, one record per step.
pub fn write_hop_log(file_path: &Path, records: &[HopRecord]) -> Result<()> {
    let mut stream = BufWriter::new(File::create(file_path)?);
    for record in records {
        let line: String = serde_json::to_string(record).map_err(std::io::Error::from)?;
        writeln!(stream, "{}", line)?;
    }
    stream.flush()?;
    Ok(())
}

pub fn read_hop_log(file_path: &Path) -> Result<Vec<HopRecord>> {
    let reader = BufReader::new(File::open(file_path)?);
    let mut records: Vec<HopRecord> = Vec::new();
    for line in reader.lines() {
        let line: String = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(std::io::Error::from)?);
    }
    Ok(records)
}

/// Active state of every step: time (fs) and state
pub fn write_states(file_path: &Path, outputs: &[StepOutput]) -> Result<()> {
    let mut stream = BufWriter::new(File::create(file_path)?);
    writeln!(stream, "# time/fs\tstate")?;
    for output in outputs {
        writeln!(stream, "{:.4}\t{}", output.time, output.state)?;
    }
    stream.flush()?;
    Ok(())
}

/// Kinetic, potential and total energy followed by the energies of all states (Hartree)
pub fn write_energies(file_path: &Path, outputs: &[StepOutput]) -> Result<()> {
    let mut stream = BufWriter::new(File::create(file_path)?);
    writeln!(stream, "# time/fs\tkinetic\tpotential\ttotal\tstates")?;
    for output in outputs {
        let mut string: String = format!(
            "{:.4}\t{:.10}\t{:.10}\t{:.10}",
            output.time, output.kinetic_energy, output.potential_energy, output.total_energy
        );
        for energy in output.energies.iter() {
            string.push_str(&format!("\t{:.10}", energy));
        }
        writeln!(stream, "{}", string)?;
    }
    stream.flush()?;
    Ok(())
}

fn trajectory_file(directory: &Path, name: &str, index: usize, extension: &str) -> PathBuf {
    directory.join(format!("{}_{}.{}", name, index, extension))
}

/// Write the files of one trajectory that are switched on in the print settings.
pub fn write_trajectory(
    config: &PrintConfiguration,
    directory: &Path,
    index: usize,
    hop_log: &[HopRecord],
    outputs: &[StepOutput],
) -> Result<()> {
    if config.print_hopping {
        write_hop_log(
            &trajectory_file(directory, &config.hopping_file_name, index, "jsonl"),
            hop_log,
        )?;
    }
    if config.print_state {
        write_states(&trajectory_file(directory, "state", index, "dat"), outputs)?;
    }
    if config.print_energies {
        write_energies(&trajectory_file(directory, "energies", index, "dat"), outputs)?;
    }
    Ok(())
}

#[cfg(test)]
use crate::dynamics::HopOutcome;

#[test]
fn hop_log_is_written_as_json_lines() {
    let record = HopRecord {
        step: 3,
        time: 12.4,
        state_before: 1,
        state_after: 0,
        hop_attempted: true,
        hop_accepted: true,
        frustrated: false,
        outcome: HopOutcome::Accepted,
        target: Some(0),
        probabilities: [(0, 0.25)].into_iter().collect(),
        energy_gap: Some(-0.01),
        random_number: Some(0.1),
        renormalized: false,
    };
    let directory: PathBuf = std::env::temp_dir().join(format!("hop_log_{}", std::process::id()));
    std::fs::create_dir_all(&directory).unwrap();
    let path: PathBuf = directory.join("hopping.jsonl");
    write_hop_log(&path, &[record.clone(), record.clone()]).unwrap();
    let content: String = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.contains("\"outcome\":\"accepted\""));
    assert_eq!(read_hop_log(&path).unwrap(), vec![record.clone(), record]);
    std::fs::remove_dir_all(&directory).unwrap();
}
