//! The surface hopping engine combines the propagation of the electronic
//! density matrix, the hopping decision and the velocity adjustment into a
//! single step. Every step passes through the phases
//! `Idle -> Propagating -> DecidingHop -> Adjusting -> Committed`.
//! All results of a step are computed first and only written into the
//! [TrajectoryState] in the `Committed` phase, so that a failing step leaves
//! the trajectory untouched.
use crate::c64;
use crate::dynamics::{
    align_nonadiabatic_coupling, antisymmetrize_nonadiabatic_coupling, check_density_matrix,
    get_decoherence_correction, get_kinetic_energy, get_nonadiabatic_scalar_coupling,
    get_overlap_scalar_coupling, renormalize_density, Adjustment, AmplitudePropagator,
    HopProposal, HoppingInput, HoppingScheme, SwitchingModel, VelocityAdjuster,
};
use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::{
    CouplingType, DynamicConfiguration, FrustratedHopPolicy, HoppingMethod, TrajectoryState,
};
use crate::interface::{BackendData, Couplings};
use log::{info, trace, warn};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepPhase {
    Idle,
    Propagating,
    DecidingHop,
    Adjusting,
    Committed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HopOutcome {
    NoHop,
    Accepted,
    Frustrated,
}

/// Record of the hopping decision of one committed step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HopRecord {
    pub step: usize,
    // time in atomic units
    pub time: f64,
    pub state_before: usize,
    pub state_after: usize,
    pub hop_attempted: bool,
    pub hop_accepted: bool,
    pub frustrated: bool,
    pub outcome: HopOutcome,
    pub target: Option<usize>,
    pub probabilities: BTreeMap<usize, f64>,
    // E_target - E_active at the end of the step
    pub energy_gap: Option<f64>,
    pub random_number: Option<f64>,
    // the density matrix was renormalized after the propagation
    pub renormalized: bool,
}

/// Result of [SurfaceHoppingEngine::step]. The [fmt::Display] implementation
/// gives a short description of the step.
#[derive(Clone, Debug)]
pub struct StepSummary {
    pub method: HoppingMethod,
    pub policy: FrustratedHopPolicy,
    pub record: HopRecord,
}

impl StepSummary {
    pub fn hopped(&self) -> bool {
        self.record.hop_accepted
    }
}

impl fmt::Display for StepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record: &HopRecord = &self.record;
        if self.method == HoppingMethod::None {
            return write!(f, "no surface hopping is performed");
        }
        match (record.outcome, record.target) {
            (HopOutcome::Accepted, Some(target)) => write!(
                f,
                "step {}: hop from state {} to state {}, energy gap {:.6} Hartree",
                record.step,
                record.state_before,
                target,
                record.energy_gap.unwrap_or(0.0)
            ),
            (HopOutcome::Frustrated, Some(target)) => write!(
                f,
                "step {}: frustrated hop from state {} to state {}, velocities {}",
                record.step,
                record.state_before,
                target,
                match self.policy {
                    FrustratedHopPolicy::Ignore => "unchanged",
                    FrustratedHopPolicy::Reflect => "reflected",
                }
            ),
            _ => {
                let max_probability: f64 =
                    record.probabilities.values().cloned().fold(0.0, f64::max);
                write!(
                    f,
                    "step {}: no hop, trajectory stays in state {} (max. probability {:.3e})",
                    record.step, record.state_after, max_probability
                )
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SurfaceHoppingEngine {
    pub scheme: HoppingScheme,
    pub propagator: AmplitudePropagator,
    pub adjuster: VelocityAdjuster,
    pub coupling_type: CouplingType,
    pub density_tolerance: f64,
    pub population_floor: f64,
    // constant C of the decoherence correction, if it is turned on
    pub decoherence_constant: Option<f64>,
}

impl SurfaceHoppingEngine {
    pub fn new(config: &DynamicConfiguration) -> Result<Self> {
        config.validate()?;
        let hopping = &config.hopping;
        Ok(SurfaceHoppingEngine {
            scheme: HoppingScheme::from_config(hopping)?,
            propagator: AmplitudePropagator::from_config(hopping),
            adjuster: VelocityAdjuster::from_config(hopping),
            coupling_type: config.coupling_type,
            density_tolerance: hopping.density_tolerance,
            population_floor: hopping.population_floor,
            decoherence_constant: if hopping.decoherence_correction {
                Some(hopping.decoherence_constant)
            } else {
                None
            },
        })
    }

    fn enter(&self, step: usize, phase: StepPhase) {
        trace!("step {}: {:?}", step, phase);
    }

    /// Advance the electronic part of the trajectory by one nuclear step with
    /// the backend data at the new geometry. The trajectory already holds the
    /// coordinates and velocities at t + dt; the velocities enter the scalar
    /// couplings v * d_ij and are rescaled after an accepted hop.
    pub fn step(&self, trajectory: &mut TrajectoryState, data: BackendData) -> Result<StepSummary> {
        let step: usize = trajectory.step + 1;
        let stepsize: f64 = trajectory.stepsize;
        let state: usize = trajectory.state;
        self.enter(step, StepPhase::Idle);
        data.validate(&trajectory.states, trajectory.n_atoms, self.coupling_type, step)?;
        if trajectory.density.dim() != (trajectory.nstates, trajectory.nstates) {
            return Err(SurfaceHoppingError::backend(
                step,
                "the density matrix does not match the number of states",
            ));
        }

        // couplings at t + dt and the scalar couplings at both ends of the step
        let (couplings, coupling_old, coupling_new): (Couplings, Array2<f64>, Array2<f64>) =
            match data.couplings {
                Couplings::Nonadiabatic(nacv) => {
                    let mut nacv: Array4<f64> = antisymmetrize_nonadiabatic_coupling(nacv.view());
                    if let Couplings::Nonadiabatic(last) = &trajectory.couplings {
                        nacv = align_nonadiabatic_coupling(last.view(), nacv.view());
                    }
                    let scalar: Array2<f64> =
                        get_nonadiabatic_scalar_coupling(nacv.view(), trajectory.velocities.view());
                    (
                        Couplings::Nonadiabatic(nacv),
                        trajectory.nonadiabatic_scalar.clone(),
                        scalar,
                    )
                }
                // the overlap gives the couplings in the middle of the step,
                // they are kept constant over the whole step
                Couplings::Overlap(s_mat) => {
                    let scalar: Array2<f64> = get_overlap_scalar_coupling(s_mat.view(), stepsize);
                    (Couplings::Overlap(s_mat), scalar.clone(), scalar)
                }
            };

        let mut rng: Option<StdRng> = trajectory.rng.clone();
        let mut density: Array2<c64> = trajectory.density.clone();
        let mut velocities: Array2<f64> = trajectory.velocities.clone();
        let mut new_state: usize = state;
        let mut proposal: HopProposal = HopProposal::default();
        let mut renormalized: bool = false;
        let mut outcome: HopOutcome = HopOutcome::NoHop;

        if self.scheme.is_enabled() {
            self.enter(step, StepPhase::Propagating);
            let propagated: Array2<c64> = self.propagator.propagate(
                trajectory.density.view(),
                trajectory.energies.view(),
                data.energies.view(),
                coupling_old.view(),
                coupling_new.view(),
                stepsize,
            )?;
            density = match check_density_matrix(propagated.view(), self.density_tolerance) {
                Ok(()) => propagated,
                Err(SurfaceHoppingError::NumericalDrift {
                    trace_deviation,
                    hermiticity_deviation,
                }) => {
                    warn!(
                        "step {}: density matrix renormalized (trace deviation {:.3e}, hermiticity deviation {:.3e})",
                        step, trace_deviation, hermiticity_deviation
                    );
                    renormalized = true;
                    renormalize_density(propagated.view())?
                }
                Err(err) => return Err(err),
            };

            self.enter(step, StepPhase::DecidingHop);
            let input: HoppingInput = HoppingInput {
                state,
                energies: data.energies.view(),
                density_old: trajectory.density.view(),
                density_new: density.view(),
                coupling_old: coupling_old.view(),
                coupling_new: coupling_new.view(),
                stepsize,
            };
            proposal = self.scheme.propose(&input, rng.as_mut())?;

            if let Some(target) = proposal.target {
                self.enter(step, StepPhase::Adjusting);
                let nonadiabatic: Option<ArrayView2<f64>> = match &couplings {
                    Couplings::Nonadiabatic(nacv) => Some(nacv.slice(s![state, target, .., ..])),
                    Couplings::Overlap(_) => None,
                };
                let adjustment: Adjustment = self.adjuster.adjust(
                    trajectory.velocities.view(),
                    trajectory.masses.view(),
                    nonadiabatic,
                    data.energies[state],
                    data.energies[target],
                );
                outcome = match adjustment {
                    Adjustment::Accepted(new_velocities) => {
                        info!(
                            "step {}: hop from state {} to state {}",
                            step, state, target
                        );
                        velocities = new_velocities;
                        new_state = target;
                        HopOutcome::Accepted
                    }
                    Adjustment::Frustrated(new_velocities) => {
                        info!(
                            "step {}: frustrated hop from state {} to state {} ({:?})",
                            step, state, target, self.adjuster.frustrated_hop_policy
                        );
                        velocities = new_velocities;
                        HopOutcome::Frustrated
                    }
                };
            }

            if let Some(constant) = self.decoherence_constant {
                density = get_decoherence_correction(
                    density.view(),
                    data.energies.view(),
                    new_state,
                    get_kinetic_energy(velocities.view(), trajectory.masses.view()),
                    stepsize,
                    constant,
                    self.population_floor,
                );
            }
        }

        self.enter(step, StepPhase::Committed);
        let record: HopRecord = HopRecord {
            step,
            time: trajectory.actual_time + stepsize,
            state_before: state,
            state_after: new_state,
            hop_attempted: proposal.target.is_some(),
            hop_accepted: outcome == HopOutcome::Accepted,
            frustrated: outcome == HopOutcome::Frustrated,
            outcome,
            target: proposal.target,
            energy_gap: proposal
                .target
                .map(|target| data.energies[target] - data.energies[state]),
            probabilities: proposal.probabilities,
            random_number: proposal.random_number,
            renormalized,
        };

        // the couplings of the next step start from the committed velocities
        trajectory.nonadiabatic_scalar = match &couplings {
            Couplings::Nonadiabatic(nacv) => {
                get_nonadiabatic_scalar_coupling(nacv.view(), velocities.view())
            }
            Couplings::Overlap(_) => coupling_new,
        };
        trajectory.couplings = couplings;
        trajectory.last_state = state;
        trajectory.state = new_state;
        trajectory.velocities = velocities;
        trajectory.density = density;
        trajectory.rng = rng;
        trajectory.hamiltonian = Array2::from_diag(&data.energies);
        trajectory.energies = data.energies;
        trajectory.gradients = data.gradients;
        trajectory.actual_time += stepsize;
        trajectory.step = step;
        trajectory.hop_log.push(record.clone());
        self.enter(step, StepPhase::Idle);

        Ok(StepSummary {
            method: self.scheme.method(),
            policy: self.adjuster.frustrated_hop_policy,
            record,
        })
    }
}

#[cfg(test)]
use crate::initialization::SystemData;

#[cfg(test)]
fn engine_setup(config: &DynamicConfiguration) -> (SurfaceHoppingEngine, TrajectoryState) {
    let system: SystemData =
        SystemData::new(array![[0.0, 0.0, 0.0]], array![[0.01, 0.0, 0.0]], array![2000.0]).unwrap();
    let engine = SurfaceHoppingEngine::new(config).unwrap();
    let trajectory = TrajectoryState::new(config, system, two_states(0.0, 0.05, 0.0)).unwrap();
    (engine, trajectory)
}

#[cfg(test)]
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

#[test]
fn disabled_hopping_only_commits_the_data() {
    let config: DynamicConfiguration =
        DynamicConfiguration::from_toml("[hopping]\nhopping_method = \"none\"\n").unwrap();
    let (engine, mut trajectory) = engine_setup(&config);
    let density: Array2<c64> = trajectory.density.clone();
    let summary: StepSummary = engine.step(&mut trajectory, two_states(0.0, 0.04, 1.0)).unwrap();
    assert_eq!(summary.to_string(), "no surface hopping is performed");
    assert_eq!(trajectory.density, density);
    assert_eq!(trajectory.step, 1);
    assert_eq!(trajectory.energies, array![0.0, 0.04]);
    assert_eq!(trajectory.hop_log.len(), 1);
    assert!(trajectory.hop_log[0].probabilities.is_empty());
}

#[test]
fn backend_error_leaves_the_trajectory_untouched() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    let (engine, mut trajectory) = engine_setup(&config);
    engine.step(&mut trajectory, two_states(0.0, 0.05, 0.3)).unwrap();
    let before: TrajectoryState = trajectory.clone();
    let mut data: BackendData = two_states(0.0, 0.05, 0.3);
    data.states = vec![0];
    data.energies = array![0.0];
    let result = engine.step(&mut trajectory, data);
    assert!(matches!(
        result,
        Err(SurfaceHoppingError::BackendData { step: 2, .. })
    ));
    assert_eq!(trajectory.step, before.step);
    assert_eq!(trajectory.density, before.density);
    assert_eq!(trajectory.hop_log, before.hop_log);
    assert_eq!(trajectory.energies, before.energies);
}

#[test]
fn sign_flip_of_the_coupling_vector_is_removed() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    let (engine, mut trajectory) = engine_setup(&config);
    engine.step(&mut trajectory, two_states(0.0, 0.05, 0.3)).unwrap();
    engine.step(&mut trajectory, two_states(0.0, 0.05, -0.3)).unwrap();
    assert!(trajectory.nonadiabatic_scalar[[0, 1]] > 0.0);
}

#[test]
fn propagated_density_stays_valid() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    let (engine, mut trajectory) = engine_setup(&config);
    for _ in 0..50 {
        let summary = engine.step(&mut trajectory, two_states(0.0, 0.05, 0.5)).unwrap();
        assert!(!summary.record.renormalized);
        assert!(check_density_matrix(trajectory.density.view(), 1e-6).is_ok());
        for prob in summary.record.probabilities.values() {
            assert!((0.0..=1.0).contains(prob));
        }
    }
}

#[test]
fn substep_limit_halts_the_step() {
    let config: DynamicConfiguration =
        DynamicConfiguration::from_toml("[hopping]\nmax_integration_steps = 1000\n").unwrap();
    let (engine, mut trajectory) = engine_setup(&config);
    let result = engine.step(&mut trajectory, two_states(0.0, 0.05, 1.0e6));
    assert!(matches!(
        result,
        Err(SurfaceHoppingError::IntegrationLimit { limit: 1000, .. })
    ));
    assert_eq!(trajectory.step, 0);
    assert!(trajectory.hop_log.is_empty());
}
