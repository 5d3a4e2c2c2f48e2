use crate::c64;
use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::{HoppingConfiguration, HoppingMethod};
use ndarray::prelude::*;
use rand::distributions::Standard;
use rand::prelude::*;
use std::collections::BTreeMap;

/// Data of one nuclear step from which the hopping decision is made.
pub struct HoppingInput<'a> {
    pub state: usize,
    // energies at t + dt
    pub energies: ArrayView1<'a, f64>,
    pub density_old: ArrayView2<'a, c64>,
    pub density_new: ArrayView2<'a, c64>,
    pub coupling_old: ArrayView2<'a, f64>,
    pub coupling_new: ArrayView2<'a, f64>,
    pub stepsize: f64,
}

/// Result of a hopping algorithm: the target state, if any, and the
/// probabilities for all other states in ascending order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HopProposal {
    pub target: Option<usize>,
    pub probabilities: BTreeMap<usize, f64>,
    pub random_number: Option<f64>,
}

/// Common interface of the hopping algorithms
pub trait SwitchingModel {
    /// Propose at most one target state. Stochastic algorithms draw exactly
    /// one random number from `rng` per call.
    fn propose(&self, input: &HoppingInput, rng: Option<&mut StdRng>) -> Result<HopProposal>;
}

/// Fewest switches surface hopping, J. C. Tully, JCP 93, 1061 (1990)
#[derive(Clone, Debug)]
pub struct FewestSwitches {
    pub population_floor: f64,
}

/// Global switches: deterministic hops to the most strongly coupled state
/// once the energy gap closes.
#[derive(Clone, Debug)]
pub struct GlobalSwitches {
    pub energy_gap_threshold: f64,
    pub coupling_threshold: f64,
}

/// Hopping algorithm of a trajectory, resolved once from the configuration.
#[derive(Clone, Debug)]
pub enum HoppingScheme {
    Disabled,
    FewestSwitches(FewestSwitches),
    GlobalSwitches(GlobalSwitches),
}

impl HoppingScheme {
    pub fn from_config(config: &HoppingConfiguration) -> Result<Self> {
        let scheme: HoppingScheme = match config.hopping_method {
            HoppingMethod::None => HoppingScheme::Disabled,
            HoppingMethod::FewestSwitches => HoppingScheme::FewestSwitches(FewestSwitches {
                population_floor: config.population_floor,
            }),
            HoppingMethod::GlobalSwitches => {
                match (config.energy_gap_threshold, config.coupling_threshold) {
                    (Some(energy_gap_threshold), Some(coupling_threshold)) => {
                        HoppingScheme::GlobalSwitches(GlobalSwitches {
                            energy_gap_threshold,
                            coupling_threshold,
                        })
                    }
                    _ => {
                        return Err(SurfaceHoppingError::config(
                            "global switches requires energy_gap_threshold and coupling_threshold",
                        ))
                    }
                }
            }
        };
        Ok(scheme)
    }

    pub fn method(&self) -> HoppingMethod {
        match self {
            HoppingScheme::Disabled => HoppingMethod::None,
            HoppingScheme::FewestSwitches(_) => HoppingMethod::FewestSwitches,
            HoppingScheme::GlobalSwitches(_) => HoppingMethod::GlobalSwitches,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, HoppingScheme::Disabled)
    }
}

impl SwitchingModel for HoppingScheme {
    fn propose(&self, input: &HoppingInput, rng: Option<&mut StdRng>) -> Result<HopProposal> {
        match self {
            HoppingScheme::Disabled => Ok(HopProposal::default()),
            HoppingScheme::FewestSwitches(model) => model.propose(input, rng),
            HoppingScheme::GlobalSwitches(model) => model.propose(input, rng),
        }
    }
}

impl SwitchingModel for FewestSwitches {
    fn propose(&self, input: &HoppingInput, rng: Option<&mut StdRng>) -> Result<HopProposal> {
        let rng: &mut StdRng = rng.ok_or_else(|| {
            SurfaceHoppingError::config("fewest switches requires a random number generator")
        })?;
        let probabilities: BTreeMap<usize, f64> = get_fewest_switches_probabilities(
            input.density_old,
            input.density_new,
            input.coupling_old,
            input.coupling_new,
            input.state,
            input.stepsize,
            self.population_floor,
        );
        // one random number per step, independent of the probabilities
        let random_number: f64 = rng.sample(Standard);
        Ok(HopProposal {
            target: select_stochastic(&probabilities, random_number),
            probabilities,
            random_number: Some(random_number),
        })
    }
}

impl SwitchingModel for GlobalSwitches {
    fn propose(&self, input: &HoppingInput, _rng: Option<&mut StdRng>) -> Result<HopProposal> {
        let target: Option<usize> = select_global_switch(
            input.energies,
            input.coupling_new,
            input.state,
            self.energy_gap_threshold,
            self.coupling_threshold,
        );
        let probabilities: BTreeMap<usize, f64> = (0..input.energies.len())
            .filter(|state| *state != input.state)
            .map(|state| (state, if Some(state) == target { 1.0 } else { 0.0 }))
            .collect();
        Ok(HopProposal {
            target,
            probabilities,
            random_number: None,
        })
    }
}

/// Population flux from the active state i into state j,
/// b_ji = -2 Re(rho_ij) D_ji
fn get_population_flux(
    density: ArrayView2<c64>,
    coupling: ArrayView2<f64>,
    state: usize,
    target: usize,
) -> f64 {
    -2.0 * density[[state, target]].re * coupling[[target, state]]
}

/// Fewest switches probabilities g_ij = dt b_ji / rho_ii of the active state i.
/// The flux is averaged over both ends of the nuclear step and the
/// probabilities are clamped to [0, 1].
pub fn get_fewest_switches_probabilities(
    density_old: ArrayView2<c64>,
    density_new: ArrayView2<c64>,
    coupling_old: ArrayView2<f64>,
    coupling_new: ArrayView2<f64>,
    state: usize,
    stepsize: f64,
    population_floor: f64,
) -> BTreeMap<usize, f64> {
    let nstates: usize = density_new.dim().0;
    let population: f64 = density_old[[state, state]].re;
    let mut probabilities: BTreeMap<usize, f64> = BTreeMap::new();
    for target in (0..nstates).filter(|target| *target != state) {
        let probability: f64 = if population < population_floor {
            0.0
        } else {
            let flux: f64 = 0.5
                * (get_population_flux(density_old, coupling_old, state, target)
                    + get_population_flux(density_new, coupling_new, state, target));
            (stepsize * flux / population).clamp(0.0, 1.0)
        };
        probabilities.insert(target, probability);
    }
    probabilities
}

/// The states are tested in ascending order. The first state whose
/// cumulative probability exceeds the random number is the hop target.
pub fn select_stochastic(probabilities: &BTreeMap<usize, f64>, random_number: f64) -> Option<usize> {
    let mut sum: f64 = 0.0;
    for (state, prob) in probabilities.iter() {
        if *prob > 0.0 {
            sum += prob;
            if random_number < sum {
                return Some(*state);
            }
        }
    }
    None
}

/// The state j with the largest |D_ij| to the active state i is the target
/// if |E_j - E_i| is below the gap threshold and |D_ij| above the coupling threshold.
pub fn select_global_switch(
    energies: ArrayView1<f64>,
    coupling: ArrayView2<f64>,
    state: usize,
    energy_gap_threshold: f64,
    coupling_threshold: f64,
) -> Option<usize> {
    let mut candidate: Option<(usize, f64)> = None;
    for target in (0..energies.len()).filter(|target| *target != state) {
        let magnitude: f64 = coupling[[state, target]].abs();
        match candidate {
            Some((_, best)) if best >= magnitude => {}
            _ => candidate = Some((target, magnitude)),
        }
    }
    let (target, magnitude): (usize, f64) = candidate?;
    let gap: f64 = (energies[target] - energies[state]).abs();
    if gap < energy_gap_threshold && magnitude > coupling_threshold {
        Some(target)
    } else {
        None
    }
}

/// Decoherence correction according to eqn. (17) in
/// G. Granucci, M. Persico, J. Chem. Phys. 126, 134114 (2007).
/// The amplitudes of the inactive states k decay with
/// tau_k = (1 + C / E_kin) / |E_k - E_a| and the active state a takes up the
/// lost population. The coherences are scaled accordingly, so that the
/// density matrix stays a pure state if it was one.
pub fn get_decoherence_correction(
    density: ArrayView2<c64>,
    energies: ArrayView1<f64>,
    state: usize,
    kinetic_energy: f64,
    stepsize: f64,
    decoherence_constant: f64,
    population_floor: f64,
) -> Array2<c64> {
    let nstates: usize = density.dim().0;
    let population: f64 = density[[state, state]].re;
    if !(kinetic_energy > 0.0) || population < population_floor {
        return density.to_owned();
    }
    let mut factors: Array1<f64> = Array1::ones(nstates);
    let mut remaining: f64 = 1.0;
    for k in (0..nstates).filter(|k| *k != state) {
        let rate: f64 = (energies[k] - energies[state]).abs()
            / (1.0 + decoherence_constant / kinetic_energy);
        factors[k] = (-stepsize * rate).exp();
        remaining -= density[[k, k]].re * factors[k].powi(2);
    }
    factors[state] = (remaining.max(0.0) / population).sqrt();

    let mut new_density: Array2<c64> = density.to_owned();
    for ((k, l), val) in new_density.indexed_iter_mut() {
        *val *= factors[k] * factors[l];
    }
    new_density
}

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[cfg(test)]
fn coherent_density(population: f64, coherence: c64) -> Array2<c64> {
    array![
        [c64::new(population, 0.0), coherence],
        [coherence.conj(), c64::new(1.0 - population, 0.0)]
    ]
}

#[test]
fn probabilities_are_bounded_and_floored() {
    let coupling: Array2<f64> = array![[0.0, 0.3], [-0.3, 0.0]];
    let density: Array2<c64> = coherent_density(0.8, c64::new(0.4, 0.0));
    let probabilities = get_fewest_switches_probabilities(
        density.view(),
        density.view(),
        coupling.view(),
        coupling.view(),
        0,
        10.0,
        1e-10,
    );
    // b_10 = -2 * 0.4 * (-0.3) = 0.24, g = 10 * 0.24 / 0.8 > 1
    assert_eq!(probabilities[&1], 1.0);

    // population flows into the active state, no hop
    let probabilities = get_fewest_switches_probabilities(
        density.view(),
        density.view(),
        (-1.0 * &coupling).view(),
        (-1.0 * &coupling).view(),
        0,
        0.1,
        1e-10,
    );
    assert_eq!(probabilities[&1], 0.0);

    // empty active state
    let density: Array2<c64> = coherent_density(0.0, c64::new(0.0, 0.0));
    let probabilities = get_fewest_switches_probabilities(
        density.view(),
        density.view(),
        coupling.view(),
        coupling.view(),
        0,
        0.1,
        1e-10,
    );
    assert_eq!(probabilities[&1], 0.0);
}

#[test]
fn fewest_switches_probability_matches_flux() {
    let coupling: Array2<f64> = array![[0.0, 0.03], [-0.03, 0.0]];
    let density: Array2<c64> = coherent_density(0.9, c64::new(0.2, 0.1));
    let probabilities = get_fewest_switches_probabilities(
        density.view(),
        density.view(),
        coupling.view(),
        coupling.view(),
        0,
        2.0,
        1e-10,
    );
    assert_abs_diff_eq!(probabilities[&1], 2.0 * 2.0 * 0.2 * 0.03 / 0.9, epsilon = 1e-14);
}

#[test]
fn cumulative_selection_in_ascending_order() {
    let probabilities: BTreeMap<usize, f64> = [(0, 0.1), (2, 0.0), (3, 0.3)].into_iter().collect();
    assert_eq!(select_stochastic(&probabilities, 0.05), Some(0));
    assert_eq!(select_stochastic(&probabilities, 0.1), Some(3));
    assert_eq!(select_stochastic(&probabilities, 0.39), Some(3));
    assert_eq!(select_stochastic(&probabilities, 0.45), None);
}

#[test]
fn fewest_switches_draws_one_number_per_step() {
    let model = FewestSwitches {
        population_floor: 1e-10,
    };
    let density: Array2<c64> = coherent_density(1.0, c64::new(0.0, 0.0));
    let zero: Array2<f64> = Array2::zeros((2, 2));
    let energies: Array1<f64> = array![0.0, 0.1];
    let input = HoppingInput {
        state: 0,
        energies: energies.view(),
        density_old: density.view(),
        density_new: density.view(),
        coupling_old: zero.view(),
        coupling_new: zero.view(),
        stepsize: 1.0,
    };
    let mut rng: StdRng = StdRng::seed_from_u64(7);
    let mut reference: StdRng = StdRng::seed_from_u64(7);
    for _ in 0..10 {
        let proposal: HopProposal = model.propose(&input, Some(&mut rng)).unwrap();
        let expected: f64 = reference.sample(Standard);
        assert_eq!(proposal.random_number, Some(expected));
        assert_eq!(proposal.target, None);
    }
    assert!(model.propose(&input, None).is_err());
}

#[test]
fn global_switch_needs_small_gap_and_large_coupling() {
    let coupling: Array2<f64> = array![
        [0.0, 0.002, -0.05],
        [-0.002, 0.0, 0.0],
        [0.05, 0.0, 0.0]
    ];
    // state 2 is the most strongly coupled state
    let energies: Array1<f64> = array![0.0, 0.001, 0.005];
    assert_eq!(
        select_global_switch(energies.view(), coupling.view(), 0, 0.01, 0.001),
        Some(2)
    );
    let energies: Array1<f64> = array![0.0, 0.001, 0.05];
    assert_eq!(
        select_global_switch(energies.view(), coupling.view(), 0, 0.01, 0.001),
        None
    );
    assert_eq!(
        select_global_switch(energies.view(), coupling.view(), 1, 0.01, 0.001),
        Some(0)
    );
    assert_eq!(
        select_global_switch(energies.view(), coupling.view(), 1, 0.01, 0.003),
        None
    );
}

#[test]
fn decoherence_keeps_the_trace() {
    let density: Array2<c64> = coherent_density(0.6, c64::new(0.3, 0.0));
    let energies: Array1<f64> = array![-0.05, 0.05];
    let corrected: Array2<c64> =
        get_decoherence_correction(density.view(), energies.view(), 0, 0.01, 40.0, 0.1, 1e-10);
    let trace: f64 = corrected.diag().iter().map(|val| val.re).sum();
    assert_abs_diff_eq!(trace, 1.0, epsilon = 1e-14);
    assert!(corrected[[1, 1]].re < 0.4);
    assert!(corrected[[0, 0]].re > 0.6);
    // hermitian
    assert_abs_diff_eq!(corrected[[0, 1]].re, corrected[[1, 0]].re, epsilon = 1e-15);
    // without kinetic energy nothing happens
    let unchanged: Array2<c64> =
        get_decoherence_correction(density.view(), energies.view(), 0, 0.0, 40.0, 0.1, 1e-10);
    assert_eq!(unchanged, density);
}
