//! Scenario tests of the surface hopping engine with synthetic two state
//! backends and the Tully model.

use approx::assert_relative_eq;
use ndarray::prelude::*;
use rusty_tsh::dynamics::{
    check_density_matrix, run_trajectory, HopOutcome, HopRecord, SurfaceHoppingEngine,
};
use rusty_tsh::initialization::{DynamicConfiguration, SystemData, TrajectoryState};
use rusty_tsh::interface::{BackendData, Couplings, TullySingleCrossing};

fn two_states(e_0: f64, e_1: f64, d_01: f64) -> BackendData {
    let mut nacv: Array4<f64> = Array4::zeros((2, 2, 1, 3));
    nacv[[0, 1, 0, 0]] = d_01;
    nacv[[1, 0, 0, 0]] = -d_01;
    BackendData {
        states: vec![0, 1],
        energies: array![e_0, e_1],
        gradients: Array3::zeros((2, 1, 3)),
        couplings: Couplings::Nonadiabatic(nacv),
    }
}

/// the gap between both states closes at step 50
fn avoided_crossing(step: usize) -> BackendData {
    let distance: f64 = (step as f64 - 50.0).abs();
    two_states(0.0, 0.02 * distance + 1.0e-4, 1.0)
}

fn particle(velocity: f64) -> SystemData {
    SystemData::new(array![[0.0, 0.0, 0.0]], array![[velocity, 0.0, 0.0]], array![2000.0]).unwrap()
}

fn setup(
    config_string: &str,
    velocity: f64,
    initial_data: BackendData,
) -> (SurfaceHoppingEngine, TrajectoryState) {
    let config: DynamicConfiguration = DynamicConfiguration::from_toml(config_string).unwrap();
    let engine = SurfaceHoppingEngine::new(&config).unwrap();
    let trajectory = TrajectoryState::new(&config, particle(velocity), initial_data).unwrap();
    (engine, trajectory)
}

const GLOBAL_SWITCHES: &str = "[hopping]
hopping_method = \"global-switches\"
energy_gap_threshold = 0.01
coupling_threshold = 0.001
";

#[test]
fn global_switches_hops_at_the_avoided_crossing() {
    let (engine, mut trajectory) = setup(GLOBAL_SWITCHES, 0.01, avoided_crossing(0));
    for step in 1..=100 {
        let energy_before: f64 = trajectory.kinetic_energy();
        let state_before: usize = trajectory.state;
        let data: BackendData = avoided_crossing(step);
        let potential_before: f64 = data.energies[state_before];
        let summary = engine.step(&mut trajectory, data).unwrap();
        assert_eq!(summary.record.step, step);
        if summary.hopped() {
            // total energy on the new surface equals the one before the hop
            assert_relative_eq!(
                trajectory.total_energy(),
                energy_before + potential_before,
                max_relative = 1e-8
            );
        }
    }
    let hops: Vec<&HopRecord> = trajectory
        .hop_log
        .iter()
        .filter(|record| record.hop_attempted)
        .collect();
    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].step, 50);
    assert_eq!(hops[0].outcome, HopOutcome::Accepted);
    assert_eq!(hops[0].state_before, 0);
    assert_eq!(hops[0].state_after, 1);
    assert_eq!(trajectory.state, 1);
    // global switches does not use random numbers
    assert!(trajectory.rng.is_none());
    assert!(trajectory.hop_log.iter().all(|record| record.random_number.is_none()));
}

#[test]
fn fewest_switches_never_hops_without_coupling() {
    let (engine, mut trajectory) = setup(
        "[hopping]\nhopping_method = \"fewest-switches\"\nrandom_seed = 42\n",
        0.01,
        two_states(0.0, 0.01, 0.0),
    );
    for step in 0..1000 {
        let gap: f64 = 0.01 + 0.005 * (step as f64 * 0.1).sin();
        let summary = engine.step(&mut trajectory, two_states(0.0, gap, 0.0)).unwrap();
        assert!(summary
            .record
            .probabilities
            .values()
            .all(|prob| *prob == 0.0));
        assert!(!summary.record.hop_attempted);
        let trace: f64 = trajectory.populations().sum();
        assert!((trace - 1.0).abs() < 1e-6);
        assert!(check_density_matrix(trajectory.density.view(), 1e-6).is_ok());
    }
    assert_eq!(trajectory.hop_log.len(), 1000);
    assert_eq!(trajectory.state, 0);
}

#[test]
fn insufficient_kinetic_energy_frustrates_every_hop() {
    // kinetic energy 1e-5 Hartree, gap 5e-3 Hartree
    let config: &str = "[hopping]
hopping_method = \"global-switches\"
energy_gap_threshold = 0.01
coupling_threshold = 1.0e-5
frustrated_hop_policy = \"ignore\"
";
    let (engine, mut trajectory) = setup(config, 1.0e-4, two_states(0.0, 0.005, 1.0));
    for _ in 0..20 {
        let velocities: Array2<f64> = trajectory.velocities.clone();
        let summary = engine.step(&mut trajectory, two_states(0.0, 0.005, 1.0)).unwrap();
        assert_eq!(summary.record.outcome, HopOutcome::Frustrated);
        assert!(summary.record.frustrated && !summary.record.hop_accepted);
        assert_eq!(trajectory.velocities, velocities);
        assert_eq!(trajectory.state, 0);
    }

    // the stochastic algorithm with a strong coupling may propose hops, but never accepts them
    let (engine, mut trajectory) = setup(
        "[hopping]\nfrustrated_hop_policy = \"reflect\"\n",
        1.0e-4,
        two_states(0.0, 0.005, 50.0),
    );
    for _ in 0..200 {
        let kinetic: f64 = trajectory.kinetic_energy();
        let summary = engine.step(&mut trajectory, two_states(0.0, 0.005, 50.0)).unwrap();
        assert_ne!(summary.record.outcome, HopOutcome::Accepted);
        assert_relative_eq!(trajectory.kinetic_energy(), kinetic, max_relative = 1e-12);
    }
    assert!(trajectory.hop_log.iter().any(|record| record.frustrated));
    assert_eq!(trajectory.state, 0);
}

#[test]
fn identical_seeds_give_identical_hop_logs() {
    let config: DynamicConfiguration =
        DynamicConfiguration::from_toml("nstep = 400\n[hopping]\nrandom_seed = 11\n").unwrap();
    let system: SystemData = SystemData::from(&config.model);
    let run = |config: &DynamicConfiguration| -> String {
        let model = TullySingleCrossing::from_config(&config.model, config.coupling_type);
        let result = run_trajectory(config, &system, model, 0).unwrap();
        result
            .hop_log
            .iter()
            .map(|record| serde_json::to_string(record).unwrap())
            .collect::<Vec<String>>()
            .join("\n")
    };
    let first: String = run(&config);
    let second: String = run(&config);
    assert_eq!(first.as_bytes(), second.as_bytes());

    let mut other: DynamicConfiguration = config.clone();
    other.hopping.random_seed = 12;
    assert_ne!(first, run(&other));
}

#[test]
fn tully_model_with_overlaps_keeps_a_valid_density() {
    let config: DynamicConfiguration = DynamicConfiguration::from_toml(
        "nstep = 400\ncoupling_type = \"overlap\"\n[hopping]\nrescale_type = \"uniform\"\n",
    )
    .unwrap();
    let system: SystemData = SystemData::from(&config.model);
    let model = TullySingleCrossing::from_config(&config.model, config.coupling_type);
    let result = run_trajectory(&config, &system, model, 0).unwrap();
    assert_eq!(result.hop_log.len(), 400);
    assert!(result.hop_log.iter().all(|record| !record.renormalized));
    for output in result.output.iter() {
        let trace: f64 = output.populations.iter().sum();
        assert!((trace - 1.0).abs() < 1e-6);
    }
    // the particle passed the crossing region and the population was transferred
    let last = result.output.last().unwrap();
    assert!(last.populations[1] > 1.0e-3);
}
