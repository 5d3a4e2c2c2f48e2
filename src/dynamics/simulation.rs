use crate::dynamics::{
    get_accelerations, get_coord_verlet, get_velocities_verlet, HopRecord, StepSummary,
    SurfaceHoppingEngine,
};
use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::{sample_velocities, DynamicConfiguration, SystemData, TrajectoryState};
use crate::interface::{BackendData, ElectronicStructureInterface};
use crate::output::StepOutput;
use log::{debug, error, info};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Surface hopping dynamics of a single trajectory. The nuclei are propagated
/// with the velocity Verlet algorithm on the active state, the electronic
/// part of every step is done by the [SurfaceHoppingEngine].
pub struct Simulation<I: ElectronicStructureInterface> {
    pub nstep: usize,
    pub engine: SurfaceHoppingEngine,
    pub interface: I,
    pub trajectory: TrajectoryState,
    pub output: Vec<StepOutput>,
}

/// Everything that is reported of a finished trajectory
#[derive(Clone, Debug)]
pub struct TrajectoryResult {
    pub index: usize,
    pub final_state: usize,
    pub hop_log: Vec<HopRecord>,
    pub output: Vec<StepOutput>,
}

impl<I: ElectronicStructureInterface> Simulation<I> {
    pub fn new(config: &DynamicConfiguration, system: SystemData, mut interface: I) -> Result<Self> {
        let engine: SurfaceHoppingEngine = SurfaceHoppingEngine::new(config)?;
        let states: Vec<usize> = (0..config.nstates).collect();
        let data: BackendData = interface
            .compute_data(system.coordinates.view(), &states)
            .map_err(|err| SurfaceHoppingError::backend(0, format!("{:#}", err)))?;
        let trajectory: TrajectoryState = TrajectoryState::new(config, system, data)?;
        let output: Vec<StepOutput> = vec![StepOutput::new(&trajectory)];
        Ok(Simulation {
            nstep: config.nstep,
            engine,
            interface,
            trajectory,
            output,
        })
    }

    /// One step of velocity Verlet on the active state, followed by the
    /// electronic step at the new geometry. A hop rescales the velocities at
    /// t + dt, the next step uses the forces of the new active state.
    pub fn verlet_step(&mut self) -> Result<StepSummary> {
        let stepsize: f64 = self.trajectory.stepsize;
        let step: usize = self.trajectory.step + 1;
        let state: usize = self.trajectory.state;
        let old_accelerations: Array2<f64> = self.trajectory.accelerations();
        let coordinates: Array2<f64> = get_coord_verlet(
            self.trajectory.coordinates.view(),
            self.trajectory.velocities.view(),
            old_accelerations.view(),
            stepsize,
        );

        // energies, gradients and couplings at the new geometry
        let data: BackendData = self
            .interface
            .compute_data(coordinates.view(), &self.trajectory.states)
            .map_err(|err| SurfaceHoppingError::backend(step, format!("{:#}", err)))?;
        data.validate(
            &self.trajectory.states,
            self.trajectory.n_atoms,
            self.engine.coupling_type,
            step,
        )?;
        let accelerations: Array2<f64> = get_accelerations(
            data.gradients.slice(s![state, .., ..]),
            self.trajectory.masses.view(),
        );
        let velocities: Array2<f64> = get_velocities_verlet(
            self.trajectory.velocities.view(),
            old_accelerations.view(),
            accelerations.view(),
            stepsize,
        );

        let old_coordinates: Array2<f64> =
            std::mem::replace(&mut self.trajectory.coordinates, coordinates);
        let old_velocities: Array2<f64> =
            std::mem::replace(&mut self.trajectory.velocities, velocities);
        let summary: StepSummary = match self.engine.step(&mut self.trajectory, data) {
            Ok(summary) => summary,
            Err(err) => {
                self.trajectory.coordinates = old_coordinates;
                self.trajectory.velocities = old_velocities;
                return Err(err);
            }
        };
        debug!("{}", summary);
        self.output.push(StepOutput::new(&self.trajectory));
        Ok(summary)
    }

    pub fn verlet_dynamics(&mut self) -> Result<()> {
        for _ in 0..self.nstep {
            self.verlet_step()?;
        }
        Ok(())
    }

    pub fn into_result(self, index: usize) -> TrajectoryResult {
        TrajectoryResult {
            index,
            final_state: self.trajectory.state,
            hop_log: self.trajectory.hop_log,
            output: self.output,
        }
    }
}

/// Run a single trajectory of the ensemble. Trajectory `index` uses the seed
/// `random_seed + index` for the hopping and a seed derived from it for the
/// initial momenta.
pub fn run_trajectory<I: ElectronicStructureInterface>(
    config: &DynamicConfiguration,
    system: &SystemData,
    interface: I,
    index: usize,
) -> Result<TrajectoryResult> {
    let mut trajectory_config: DynamicConfiguration = config.clone();
    let seed: u64 = config.hopping.random_seed.wrapping_add(index as u64);
    trajectory_config.hopping.random_seed = seed;

    let mut system: SystemData = system.clone();
    let mut rng: StdRng = StdRng::seed_from_u64(seed.rotate_left(32));
    system.velocities = sample_velocities(&system, config.ensemble.momentum_width, &mut rng);

    let mut simulation: Simulation<I> = Simulation::new(&trajectory_config, system, interface)?;
    simulation.verlet_dynamics()?;
    let result: TrajectoryResult = simulation.into_result(index);
    info!(
        "trajectory {} finished in state {} after {} hops",
        index,
        result.final_state,
        result.hop_log.iter().filter(|record| record.hop_accepted).count()
    );
    Ok(result)
}

/// Run `ntraj` independent trajectories in parallel. A failing trajectory
/// is reported and does not stop the others.
pub fn run_ensemble<I, F>(
    config: &DynamicConfiguration,
    system: &SystemData,
    make_interface: F,
) -> Vec<Result<TrajectoryResult>>
where
    I: ElectronicStructureInterface,
    F: Fn(usize) -> I + Sync,
{
    (0..config.ensemble.ntraj)
        .into_par_iter()
        .map(|index| {
            let result = run_trajectory(config, system, make_interface(index), index);
            if let Err(err) = &result {
                error!("trajectory {} failed: {}", index, err);
            }
            result
        })
        .collect()
}

#[cfg(test)]
use crate::initialization::CouplingType;
#[cfg(test)]
use crate::interface::TullySingleCrossing;

#[test]
fn verlet_dynamics_on_the_ground_state_conserves_energy() {
    let config: DynamicConfiguration =
        DynamicConfiguration::from_toml("nstep = 300\n[hopping]\nhopping_method = \"none\"\n")
            .unwrap();
    let system: SystemData = SystemData::from(&config.model);
    let model = TullySingleCrossing::from_config(&config.model, CouplingType::Nac);
    let mut simulation = Simulation::new(&config, system, model).unwrap();
    simulation.verlet_dynamics().unwrap();
    let first: f64 = simulation.output[0].total_energy;
    for output in simulation.output.iter() {
        assert!((output.total_energy - first).abs() < 1e-4);
        assert_eq!(output.state, 0);
    }
    assert_eq!(simulation.output.len(), 301);
}

#[test]
fn accepted_hops_conserve_the_total_energy_of_the_trajectory() {
    let config: DynamicConfiguration = DynamicConfiguration::from_toml(
        "nstep = 600\n[model]\nmomentum = 15.0\n[ensemble]\nntraj = 40\n",
    )
    .unwrap();
    let system: SystemData = SystemData::from(&config.model);
    let results = run_ensemble(&config, &system, |_| {
        TullySingleCrossing::from_config(&config.model, CouplingType::Nac)
    });
    let mut hops: usize = 0;
    for result in results.into_iter() {
        let result: TrajectoryResult = result.unwrap();
        for record in result.hop_log.iter() {
            let before: f64 = result.output[record.step - 1].total_energy;
            let after: f64 = result.output[record.step].total_energy;
            if record.hop_accepted {
                hops += 1;
            }
            // hop steps show the same small drift as every other Verlet step
            assert!(
                (after - before).abs() < 1e-5,
                "step {}: energy changed by {:e}, hop {}",
                record.step,
                after - before,
                record.hop_accepted
            );
        }
    }
    assert!(hops > 0);
}

#[test]
fn failing_trajectory_does_not_stop_the_ensemble() {
    struct Failing;
    impl ElectronicStructureInterface for Failing {
        fn compute_data(
            &mut self,
            _coordinates: ArrayView2<f64>,
            _states: &[usize],
        ) -> anyhow::Result<BackendData> {
            anyhow::bail!("no convergence")
        }
    }
    enum Backend {
        Model(TullySingleCrossing),
        Failing(Failing),
    }
    impl ElectronicStructureInterface for Backend {
        fn compute_data(
            &mut self,
            coordinates: ArrayView2<f64>,
            states: &[usize],
        ) -> anyhow::Result<BackendData> {
            match self {
                Backend::Model(model) => model.compute_data(coordinates, states),
                Backend::Failing(failing) => failing.compute_data(coordinates, states),
            }
        }
    }

    let config: DynamicConfiguration =
        DynamicConfiguration::from_toml("nstep = 20\n[ensemble]\nntraj = 3\n").unwrap();
    let system: SystemData = SystemData::from(&config.model);
    let results = run_ensemble(&config, &system, |index| {
        if index == 1 {
            Backend::Failing(Failing)
        } else {
            Backend::Model(TullySingleCrossing::from_config(&config.model, CouplingType::Nac))
        }
    });
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(SurfaceHoppingError::BackendData { step: 0, .. })
    ));
    assert_eq!(results[2].as_ref().unwrap().index, 2);
}
