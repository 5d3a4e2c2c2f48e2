use crate::c64;
use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::HoppingConfiguration;
use log::debug;
use ndarray::prelude::*;

/// Integration of the electronic equation of motion of the density matrix
///     d rho / dt = -i [H, rho],  H_kl = E_k delta_kl - i D_kl
/// over one nuclear step. The energies E and the scalar couplings
/// D_kl = <k|d/dt l> are interpolated linearly between both ends of the step
/// and every small step is integrated with the classical Runge-Kutta scheme.
#[derive(Clone, Debug)]
pub struct AmplitudePropagator {
    // minimal number of small steps per nuclear step
    pub integration_steps: usize,
    // maximal phase rotation within one small step
    pub max_substep_phase: f64,
    // upper limit for the number of small steps per nuclear step
    pub max_integration_steps: usize,
}

impl AmplitudePropagator {
    pub fn new(
        integration_steps: usize,
        max_substep_phase: f64,
        max_integration_steps: usize,
    ) -> Self {
        let integration_steps: usize = integration_steps.max(1);
        AmplitudePropagator {
            integration_steps,
            max_substep_phase,
            max_integration_steps: max_integration_steps.max(integration_steps),
        }
    }

    pub fn from_config(config: &HoppingConfiguration) -> Self {
        Self::new(
            config.integration_steps,
            config.max_substep_phase,
            config.max_integration_steps,
        )
    }

    /// Number of small steps that keeps the phase rotation of every coherence
    /// within one small step below the maximal phase. Fails if more than
    /// `max_integration_steps` small steps would be needed.
    pub fn get_substeps(
        &self,
        energies_old: ArrayView1<f64>,
        energies_new: ArrayView1<f64>,
        coupling_old: ArrayView2<f64>,
        coupling_new: ArrayView2<f64>,
        stepsize: f64,
    ) -> Result<usize> {
        let mut max_rate: f64 = 0.0;
        for energies in [energies_old.view(), energies_new.view()] {
            let e_max: f64 = energies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let e_min: f64 = energies.iter().cloned().fold(f64::INFINITY, f64::min);
            max_rate = max_rate.max(e_max - e_min);
        }
        for coupling in [coupling_old.view(), coupling_new.view()] {
            max_rate = coupling.iter().fold(max_rate, |acc, val| acc.max(val.abs()));
        }
        let required: f64 = (max_rate * stepsize / self.max_substep_phase).ceil();
        if !required.is_finite() || required > self.max_integration_steps as f64 {
            return Err(SurfaceHoppingError::IntegrationLimit {
                required,
                limit: self.max_integration_steps,
            });
        }
        if required > self.integration_steps as f64 {
            let n_delta: usize = required as usize;
            debug!(
                "number of small steps increased from {} to {}",
                self.integration_steps, n_delta
            );
            Ok(n_delta)
        } else {
            Ok(self.integration_steps)
        }
    }

    /// Propagate the density matrix from t to t + dt.
    pub fn propagate(
        &self,
        density: ArrayView2<c64>,
        energies_old: ArrayView1<f64>,
        energies_new: ArrayView1<f64>,
        coupling_old: ArrayView2<f64>,
        coupling_new: ArrayView2<f64>,
        stepsize: f64,
    ) -> Result<Array2<c64>> {
        let n_delta: usize = self.get_substeps(
            energies_old.view(),
            energies_new.view(),
            coupling_old.view(),
            coupling_new.view(),
            stepsize,
        )?;
        let delta_rk: f64 = stepsize / n_delta as f64;

        // the hamiltonian is evaluated at the beginning, the middle and the end of every small step
        let hamiltonian_at = |time: f64| -> Array2<c64> {
            get_interpolated_hamiltonian(
                energies_old,
                energies_new,
                coupling_old,
                coupling_new,
                time / stepsize,
            )
        };

        let mut rho: Array2<c64> = density.to_owned();
        let mut h_start: Array2<c64> = hamiltonian_at(0.0);
        for i in 0..n_delta {
            let t_i: f64 = i as f64 * delta_rk;
            let h_mid: Array2<c64> = hamiltonian_at(t_i + 0.5 * delta_rk);
            let h_end: Array2<c64> = hamiltonian_at(t_i + delta_rk);
            rho = runge_kutta_integration(
                rho.view(),
                h_start.view(),
                h_mid.view(),
                h_end.view(),
                delta_rk,
            );
            h_start = h_end;
        }
        Ok(rho)
    }
}

/// Effective electronic hamiltonian H = diag(E) - i D at the fraction
/// `fraction` of the nuclear step.
pub fn get_interpolated_hamiltonian(
    energies_old: ArrayView1<f64>,
    energies_new: ArrayView1<f64>,
    coupling_old: ArrayView2<f64>,
    coupling_new: ArrayView2<f64>,
    fraction: f64,
) -> Array2<c64> {
    let nstates: usize = energies_old.len();
    let mut hamiltonian: Array2<c64> = Array2::zeros((nstates, nstates));
    for k in 0..nstates {
        for l in 0..nstates {
            let d_kl: f64 =
                coupling_old[[k, l]] + (coupling_new[[k, l]] - coupling_old[[k, l]]) * fraction;
            hamiltonian[[k, l]] = c64::new(0.0, -d_kl);
        }
        hamiltonian[[k, k]] +=
            energies_old[k] + (energies_new[k] - energies_old[k]) * fraction;
    }
    hamiltonian
}

pub fn runge_kutta_integration(
    density: ArrayView2<c64>,
    h_start: ArrayView2<c64>,
    h_mid: ArrayView2<c64>,
    h_end: ArrayView2<c64>,
    delta_rk: f64,
) -> Array2<c64> {
    let k_1: Array2<c64> = runge_kutta_helper(density, h_start) * c64::from(delta_rk);
    let tmp: Array2<c64> = &density + &(&k_1 * c64::from(0.5));

    let k_2: Array2<c64> = runge_kutta_helper(tmp.view(), h_mid) * c64::from(delta_rk);
    let tmp: Array2<c64> = &density + &(&k_2 * c64::from(0.5));

    let k_3: Array2<c64> = runge_kutta_helper(tmp.view(), h_mid) * c64::from(delta_rk);
    let tmp: Array2<c64> = &density + &k_3;

    let k_4: Array2<c64> = runge_kutta_helper(tmp.view(), h_end) * c64::from(delta_rk);

    &density + &((k_1 + k_2 * c64::from(2.0) + k_3 * c64::from(2.0) + k_4) / c64::from(6.0))
}

// right hand side -i [H, rho]
fn runge_kutta_helper(density: ArrayView2<c64>, hamiltonian: ArrayView2<c64>) -> Array2<c64> {
    let commutator: Array2<c64> = hamiltonian.dot(&density) - density.dot(&hamiltonian);
    commutator.mapv(|val| c64::new(0.0, -1.0) * val)
}

/// Check that the density matrix has unit trace and is hermitian.
pub fn check_density_matrix(density: ArrayView2<c64>, tolerance: f64) -> Result<()> {
    let trace: c64 = density.diag().sum();
    let trace_deviation: f64 = (trace - c64::new(1.0, 0.0)).norm();
    let hermiticity_deviation: f64 = density
        .indexed_iter()
        .map(|((i, j), val)| (val - density[[j, i]].conj()).norm())
        .fold(0.0, f64::max);
    if trace_deviation > tolerance
        || hermiticity_deviation > tolerance
        || !trace_deviation.is_finite()
        || !hermiticity_deviation.is_finite()
    {
        return Err(SurfaceHoppingError::NumericalDrift {
            trace_deviation,
            hermiticity_deviation,
        });
    }
    Ok(())
}

/// Restore a valid density matrix: symmetrize rho -> (rho + rho^+)/2 and
/// rescale to unit trace. A density matrix without positive populations
/// cannot be recovered.
pub fn renormalize_density(density: ArrayView2<c64>) -> Result<Array2<c64>> {
    let adjoint: Array2<c64> = density.t().mapv(|val| val.conj());
    let hermitian: Array2<c64> = (&density + &adjoint).mapv(|val| val * 0.5);
    let trace: f64 = hermitian.diag().iter().map(|val| val.re).sum();
    if !(trace > 0.0) || !trace.is_finite() {
        return Err(SurfaceHoppingError::NumericalDrift {
            trace_deviation: (trace - 1.0).abs(),
            hermiticity_deviation: f64::NAN,
        });
    }
    Ok(hermitian.mapv(|val| val / trace))
}

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[cfg(test)]
fn pure_state(nstates: usize, state: usize) -> Array2<c64> {
    let mut density: Array2<c64> = Array2::zeros((nstates, nstates));
    density[[state, state]] = c64::new(1.0, 0.0);
    density
}

#[test]
fn decoupled_states_keep_their_populations() {
    let propagator = AmplitudePropagator::new(20, 0.05, 100_000);
    let energies: Array1<f64> = array![-0.01, 0.01];
    let zero: Array2<f64> = Array2::zeros((2, 2));
    let mut density: Array2<c64> = Array2::zeros((2, 2));
    density[[0, 0]] = c64::new(0.5, 0.0);
    density[[1, 1]] = c64::new(0.5, 0.0);
    density[[0, 1]] = c64::new(0.5, 0.0);
    density[[1, 0]] = c64::new(0.5, 0.0);
    for _ in 0..100 {
        density = propagator.propagate(
            density.view(),
            energies.view(),
            energies.view(),
            zero.view(),
            zero.view(),
            10.0,
        )
        .unwrap();
        assert!(check_density_matrix(density.view(), 1e-6).is_ok());
    }
    assert_abs_diff_eq!(density[[0, 0]].re, 0.5, epsilon = 1e-10);
    assert_abs_diff_eq!(density[[1, 1]].re, 0.5, epsilon = 1e-10);
    // only the phase of the coherence rotates, rho_01 = 0.5 exp(-i (E_0 - E_1) t)
    let expected: c64 = c64::new(0.0, 0.02 * 1000.0).exp() * 0.5;
    assert_abs_diff_eq!(density[[0, 1]].re, expected.re, epsilon = 1e-6);
    assert_abs_diff_eq!(density[[0, 1]].im, expected.im, epsilon = 1e-6);
}

#[test]
fn constant_coupling_gives_rabi_oscillation() {
    // degenerate states coupled by a constant D, rho_00(t) = cos^2(D t)
    let propagator = AmplitudePropagator::new(100, 0.05, 100_000);
    let energies: Array1<f64> = array![0.0, 0.0];
    let d: f64 = 0.02;
    let coupling: Array2<f64> = array![[0.0, d], [-d, 0.0]];
    let mut density: Array2<c64> = pure_state(2, 0);
    let stepsize: f64 = 5.0;
    for step in 1..=30 {
        density = propagator.propagate(
            density.view(),
            energies.view(),
            energies.view(),
            coupling.view(),
            coupling.view(),
            stepsize,
        )
        .unwrap();
        let time: f64 = step as f64 * stepsize;
        assert_abs_diff_eq!(density[[0, 0]].re, (d * time).cos().powi(2), epsilon = 1e-8);
        assert_abs_diff_eq!(density[[0, 1]].im, 0.0, epsilon = 1e-10);
        // hermiticity
        assert_abs_diff_eq!(density[[0, 1]].re, density[[1, 0]].re, epsilon = 1e-12);
        assert_abs_diff_eq!(density[[0, 1]].im, -density[[1, 0]].im, epsilon = 1e-12);
    }
}

#[test]
fn large_couplings_increase_the_number_of_substeps() {
    let propagator = AmplitudePropagator::new(10, 0.05, 100_000);
    let energies: Array1<f64> = array![0.0, 0.5];
    let small: Array2<f64> = Array2::zeros((2, 2));
    let large: Array2<f64> = array![[0.0, 2.0], [-2.0, 0.0]];
    let n_small: usize = propagator.get_substeps(
        energies.view(),
        energies.view(),
        small.view(),
        small.view(),
        0.5,
    )
    .unwrap();
    assert_eq!(n_small, 10);
    let n_large: usize = propagator.get_substeps(
        energies.view(),
        energies.view(),
        small.view(),
        large.view(),
        0.5,
    )
    .unwrap();
    assert_eq!(n_large, 20);
}

#[test]
fn huge_couplings_exceed_the_substep_limit() {
    let propagator = AmplitudePropagator::new(100, 0.25, 100_000);
    let energies: Array1<f64> = array![0.0, 0.01];
    let coupling: Array2<f64> = array![[0.0, 1.0e9], [-1.0e9, 0.0]];
    let density: Array2<c64> = pure_state(2, 0);
    let result = propagator.propagate(
        density.view(),
        energies.view(),
        energies.view(),
        coupling.view(),
        coupling.view(),
        4.13,
    );
    assert!(matches!(
        result,
        Err(SurfaceHoppingError::IntegrationLimit {
            limit: 100_000,
            ..
        })
    ));
    // just below the limit the integration still runs
    let coupling: Array2<f64> = array![[0.0, 1.0], [-1.0, 0.0]];
    let n_delta: usize = propagator
        .get_substeps(
            energies.view(),
            energies.view(),
            coupling.view(),
            coupling.view(),
            20_000.0,
        )
        .unwrap();
    assert_eq!(n_delta, 80_000);
}

#[test]
fn drift_is_detected_and_removed() {
    let mut density: Array2<c64> = pure_state(2, 0);
    density[[0, 0]] = c64::new(1.1, 0.0);
    density[[0, 1]] = c64::new(0.0, 0.1);
    density[[1, 0]] = c64::new(0.0, 0.05);
    let result = check_density_matrix(density.view(), 1e-6);
    assert!(matches!(
        result,
        Err(SurfaceHoppingError::NumericalDrift { .. })
    ));
    let fixed: Array2<c64> = renormalize_density(density.view()).unwrap();
    assert!(check_density_matrix(fixed.view(), 1e-12).is_ok());
    assert_abs_diff_eq!(fixed[[0, 0]].re, 1.0, epsilon = 1e-14);
}

#[test]
fn empty_density_cannot_be_renormalized() {
    let density: Array2<c64> = Array2::zeros((2, 2));
    assert!(renormalize_density(density.view()).is_err());
}
