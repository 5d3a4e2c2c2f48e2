use crate::c64;
use crate::dynamics::{
    antisymmetrize_nonadiabatic_coupling, get_accelerations, get_kinetic_energy,
    get_nonadiabatic_scalar_coupling, HopRecord,
};
use crate::error::Result;
use crate::initialization::{DynamicConfiguration, HoppingMethod, SystemData};
use crate::interface::{BackendData, Couplings};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Complete state of one trajectory. It is created once from the data of the
/// first geometry and afterwards only changed by
/// [SurfaceHoppingEngine::step](crate::dynamics::SurfaceHoppingEngine::step)
/// and the nuclear integrator.
#[derive(Clone, Debug)]
pub struct TrajectoryState {
    pub nstates: usize,
    // indices of the tracked electronic states, requested from the backend
    pub states: Vec<usize>,
    // active electronic state
    pub state: usize,
    // active state before the last step
    pub last_state: usize,
    pub n_atoms: usize,
    pub coordinates: Array2<f64>,
    pub velocities: Array2<f64>,
    pub masses: Array1<f64>,
    pub energies: Array1<f64>,
    pub gradients: Array3<f64>,
    pub couplings: Couplings,
    // D_ij = <i|d/dt j> of the last committed step
    pub nonadiabatic_scalar: Array2<f64>,
    // electronic hamiltonian diag(E) at the last committed step
    pub hamiltonian: Array2<f64>,
    // electronic density matrix rho_ij = c_i c_j^*
    pub density: Array2<c64>,
    pub stepsize: f64,
    pub actual_time: f64,
    pub step: usize,
    pub hop_log: Vec<HopRecord>,
    // random number generator of the fewest switches algorithm
    pub rng: Option<StdRng>,
}

impl TrajectoryState {
    pub fn new(
        config: &DynamicConfiguration,
        system: SystemData,
        initial_data: BackendData,
    ) -> Result<Self> {
        config.validate()?;
        let nstates: usize = config.nstates;
        let states: Vec<usize> = (0..nstates).collect();
        initial_data.validate(&states, system.n_atoms, config.coupling_type, 0)?;

        let (couplings, nonadiabatic_scalar): (Couplings, Array2<f64>) = match initial_data.couplings
        {
            Couplings::Nonadiabatic(nacv) => {
                let nacv: Array4<f64> = antisymmetrize_nonadiabatic_coupling(nacv.view());
                let scalar: Array2<f64> =
                    get_nonadiabatic_scalar_coupling(nacv.view(), system.velocities.view());
                (Couplings::Nonadiabatic(nacv), scalar)
            }
            // time-derivative couplings need a previous step
            Couplings::Overlap(s_mat) => (
                Couplings::Overlap(s_mat),
                Array2::zeros((nstates, nstates)),
            ),
        };

        let mut density: Array2<c64> = Array2::zeros((nstates, nstates));
        density[[config.initial_state, config.initial_state]] = c64::new(1.0, 0.0);

        let rng: Option<StdRng> = match config.hopping.hopping_method {
            HoppingMethod::FewestSwitches => {
                Some(StdRng::seed_from_u64(config.hopping.random_seed))
            }
            _ => None,
        };

        Ok(TrajectoryState {
            nstates,
            states,
            state: config.initial_state,
            last_state: config.initial_state,
            n_atoms: system.n_atoms,
            coordinates: system.coordinates,
            velocities: system.velocities,
            masses: system.masses,
            hamiltonian: Array2::from_diag(&initial_data.energies),
            energies: initial_data.energies,
            gradients: initial_data.gradients,
            couplings,
            nonadiabatic_scalar,
            density,
            stepsize: config.stepsize_au(),
            actual_time: 0.0,
            step: 0,
            hop_log: Vec::new(),
            rng,
        })
    }

    /// Populations of the electronic states, the diagonal of the density matrix
    pub fn populations(&self) -> Array1<f64> {
        self.density.diag().mapv(|val| val.re)
    }

    pub fn kinetic_energy(&self) -> f64 {
        get_kinetic_energy(self.velocities.view(), self.masses.view())
    }

    pub fn potential_energy(&self) -> f64 {
        self.energies[self.state]
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential_energy()
    }

    /// Accelerations -grad E / m on the active state
    pub fn accelerations(&self) -> Array2<f64> {
        get_accelerations(
            self.gradients.slice(s![self.state, .., ..]),
            self.masses.view(),
        )
    }
}

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[cfg(test)]
fn single_particle() -> SystemData {
    SystemData::new(array![[0.0, 0.0, 0.0]], array![[0.01, 0.0, 0.0]], array![2000.0]).unwrap()
}

#[cfg(test)]
fn nac_data() -> BackendData {
    let mut nacv: Array4<f64> = Array4::zeros((2, 2, 1, 3));
    nacv[[0, 1, 0, 0]] = 0.5;
    let mut gradients: Array3<f64> = Array3::zeros((2, 1, 3));
    gradients[[0, 0, 0]] = 0.02;
    BackendData {
        states: vec![0, 1],
        energies: array![-0.01, 0.01],
        gradients,
        couplings: Couplings::Nonadiabatic(nacv),
    }
}

#[test]
fn initial_density_is_pure_state() {
    let mut config: DynamicConfiguration = DynamicConfiguration::default();
    config.initial_state = 1;
    let trajectory = TrajectoryState::new(&config, single_particle(), nac_data()).unwrap();
    assert_eq!(trajectory.populations(), array![0.0, 1.0]);
    assert_eq!(trajectory.state, 1);
    assert!(trajectory.rng.is_some());
    // the lower triangle of the couplings is completed
    assert_eq!(trajectory.nonadiabatic_scalar[[0, 1]], 0.005);
    assert_eq!(trajectory.nonadiabatic_scalar[[1, 0]], -0.005);
}

#[test]
fn accelerations_follow_the_active_state() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    let trajectory = TrajectoryState::new(&config, single_particle(), nac_data()).unwrap();
    assert_abs_diff_eq!(
        trajectory.accelerations(),
        array![[-1.0e-5, 0.0, 0.0]],
        epsilon = 1e-15
    );
    assert_abs_diff_eq!(trajectory.total_energy(), 0.09, epsilon = 1e-12);
}

#[test]
fn incomplete_initial_data_is_rejected() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    let mut data: BackendData = nac_data();
    data.energies = array![0.0, f64::INFINITY];
    assert!(TrajectoryState::new(&config, single_particle(), data).is_err());
}
