//! Analytic model potentials that implement the [ElectronicStructureInterface].
//! They are used for testing and as the backend of the command line program.
use crate::initialization::{CouplingType, ModelConfiguration};
use crate::interface::{BackendData, Couplings, ElectronicStructureInterface};
use anyhow::{bail, ensure};
use ndarray::prelude::*;

/// Single avoided crossing of J. C. Tully, JCP 93, 1061 (1990).
/// The particle moves along the x-axis, the y and z components of the
/// gradients and couplings are zero.
#[derive(Clone, Debug)]
pub struct TullySingleCrossing {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub coupling_type: CouplingType,
    // adiabatic eigenvectors of the last call (columns), needed for the overlaps
    last_vectors: Option<Array2<f64>>,
}

/// Adiabatic quantities of the two state model at one position
pub struct AdiabaticData {
    pub energies: Array1<f64>,
    pub gradients: Array1<f64>,
    pub vectors: Array2<f64>,
    // d_01 = <0|d/dx 1>
    pub nac: f64,
}

impl TullySingleCrossing {
    pub fn new(a: f64, b: f64, c: f64, d: f64, coupling_type: CouplingType) -> Self {
        TullySingleCrossing {
            a,
            b,
            c,
            d,
            coupling_type,
            last_vectors: None,
        }
    }

    pub fn from_config(config: &ModelConfiguration, coupling_type: CouplingType) -> Self {
        Self::new(config.a, config.b, config.c, config.d, coupling_type)
    }

    /// Diabatic matrix elements V_11 and V_12 and their derivatives.
    /// V_22 = -V_11 holds for this model.
    fn diabatic(&self, x: f64) -> (f64, f64, f64, f64) {
        let v11: f64 = if x > 0.0 {
            self.a * (1.0 - (-self.b * x).exp())
        } else {
            -self.a * (1.0 - (self.b * x).exp())
        };
        let dv11: f64 = self.a * self.b * (-self.b * x.abs()).exp();
        let v12: f64 = self.c * (-self.d * x.powi(2)).exp();
        let dv12: f64 = -2.0 * self.d * x * v12;
        (v11, dv11, v12, dv12)
    }

    pub fn adiabatic(&self, x: f64) -> AdiabaticData {
        let (v11, dv11, v12, dv12): (f64, f64, f64, f64) = self.diabatic(x);
        let radius: f64 = (v11.powi(2) + v12.powi(2)).sqrt();
        // mixing angle, 2 theta = atan2(V_12, V_11) lies in (0, pi) since V_12 > 0
        let theta: f64 = 0.5 * v12.atan2(v11);
        let dtheta: f64 = 0.5 * (v11 * dv12 - v12 * dv11) / radius.powi(2);
        let de: f64 = (v11 * dv11 + v12 * dv12) / radius;

        let vectors: Array2<f64> = array![
            [-theta.sin(), theta.cos()],
            [theta.cos(), theta.sin()]
        ];
        AdiabaticData {
            energies: array![-radius, radius],
            gradients: array![-de, de],
            vectors,
            nac: dtheta,
        }
    }
}

impl ElectronicStructureInterface for TullySingleCrossing {
    fn compute_data(
        &mut self,
        coordinates: ArrayView2<f64>,
        states: &[usize],
    ) -> anyhow::Result<BackendData> {
        ensure!(
            coordinates.dim() == (1, 3),
            "the Tully model describes a single particle, got {} atoms",
            coordinates.nrows()
        );
        if let Some(state) = states.iter().find(|state| **state > 1) {
            bail!("the Tully model has two states, state {} was requested", state);
        }
        let nstates: usize = states.len();
        let adiabatic: AdiabaticData = self.adiabatic(coordinates[[0, 0]]);

        let energies: Array1<f64> = states.iter().map(|s| adiabatic.energies[*s]).collect();
        let mut gradients: Array3<f64> = Array3::zeros((nstates, 1, 3));
        for (idx, state) in states.iter().enumerate() {
            gradients[[idx, 0, 0]] = adiabatic.gradients[*state];
        }

        let couplings: Couplings = match self.coupling_type {
            CouplingType::Nac => {
                let mut nacv: Array4<f64> = Array4::zeros((nstates, nstates, 1, 3));
                for (i, si) in states.iter().enumerate() {
                    for (j, sj) in states.iter().enumerate() {
                        if si != sj {
                            let sign: f64 = if si < sj { 1.0 } else { -1.0 };
                            nacv[[i, j, 0, 0]] = sign * adiabatic.nac;
                        }
                    }
                }
                Couplings::Nonadiabatic(nacv)
            }
            CouplingType::Overlap => {
                let last: Array2<f64> = self
                    .last_vectors
                    .take()
                    .unwrap_or_else(|| adiabatic.vectors.clone());
                let full: Array2<f64> = last.t().dot(&adiabatic.vectors);
                let mut s_mat: Array2<f64> = Array2::zeros((nstates, nstates));
                for (i, si) in states.iter().enumerate() {
                    for (j, sj) in states.iter().enumerate() {
                        s_mat[[i, j]] = full[[*si, *sj]];
                    }
                }
                Couplings::Overlap(s_mat)
            }
        };
        self.last_vectors = Some(adiabatic.vectors);

        Ok(BackendData {
            states: states.to_vec(),
            energies,
            gradients,
            couplings,
        })
    }
}

#[cfg(test)]
use approx::{assert_abs_diff_eq, assert_relative_eq};

#[cfg(test)]
fn tully() -> TullySingleCrossing {
    TullySingleCrossing::new(0.01, 1.6, 0.005, 1.0, CouplingType::Nac)
}

#[test]
fn energies_are_symmetric() {
    let model = tully();
    let data: AdiabaticData = model.adiabatic(0.0);
    assert_relative_eq!(data.energies[0], -0.005, epsilon = 1e-12);
    assert_relative_eq!(data.energies[1], 0.005, epsilon = 1e-12);
    // far from the crossing the gap approaches 2A
    let data: AdiabaticData = model.adiabatic(-10.0);
    assert_relative_eq!(data.energies[1] - data.energies[0], 0.02, epsilon = 1e-6);
}

#[test]
fn gradients_match_finite_differences() {
    let model = tully();
    let h: f64 = 1e-5;
    for x in [-1.3, -0.2, 0.4, 2.0] {
        let plus: AdiabaticData = model.adiabatic(x + h);
        let minus: AdiabaticData = model.adiabatic(x - h);
        let data: AdiabaticData = model.adiabatic(x);
        for state in 0..2 {
            let numerical: f64 = (plus.energies[state] - minus.energies[state]) / (2.0 * h);
            assert_abs_diff_eq!(data.gradients[state], numerical, epsilon = 1e-7);
        }
    }
}

#[test]
fn nac_matches_derivative_of_eigenvectors() {
    let model = tully();
    let h: f64 = 1e-5;
    let x: f64 = 0.3;
    let plus: AdiabaticData = model.adiabatic(x + h);
    let minus: AdiabaticData = model.adiabatic(x - h);
    let data: AdiabaticData = model.adiabatic(x);
    let derivative: Array1<f64> =
        (&plus.vectors.column(1) - &minus.vectors.column(1)) / (2.0 * h);
    let numerical: f64 = data.vectors.column(0).dot(&derivative);
    assert_abs_diff_eq!(data.nac, numerical, epsilon = 1e-6);
}

#[test]
fn overlap_of_first_call_is_identity() {
    let mut model = TullySingleCrossing::new(0.01, 1.6, 0.005, 1.0, CouplingType::Overlap);
    let coordinates: Array2<f64> = array![[0.5, 0.0, 0.0]];
    let data: BackendData = model.compute_data(coordinates.view(), &[0, 1]).unwrap();
    match data.couplings {
        Couplings::Overlap(s_mat) => {
            assert_abs_diff_eq!(s_mat, Array2::<f64>::eye(2), epsilon = 1e-12)
        }
        _ => panic!("expected overlaps"),
    }
}

#[test]
fn unknown_state_is_an_error() {
    let mut model = tully();
    let coordinates: Array2<f64> = array![[0.5, 0.0, 0.0]];
    assert!(model.compute_data(coordinates.view(), &[0, 2]).is_err());
}
