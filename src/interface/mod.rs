pub mod models;

pub use models::*;

use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::CouplingType;
use ndarray::prelude::*;

/// Coupling data between the electronic states at the current geometry.
#[derive(Clone, Debug, PartialEq)]
pub enum Couplings {
    /// nonadiabatic coupling vectors d_ij = <i|grad j> with shape [nstates, nstates, n_atoms, 3]
    Nonadiabatic(Array4<f64>),
    /// overlaps S_ij = <i(t)|j(t+dt)> between the wavefunctions of the
    /// last and the current step with shape [nstates, nstates]
    Overlap(Array2<f64>),
}

impl Couplings {
    pub fn coupling_type(&self) -> CouplingType {
        match self {
            Couplings::Nonadiabatic(_) => CouplingType::Nac,
            Couplings::Overlap(_) => CouplingType::Overlap,
        }
    }
}

/// Energies, gradients and couplings of all requested states at one geometry
#[derive(Clone, Debug)]
pub struct BackendData {
    pub states: Vec<usize>,
    pub energies: Array1<f64>,
    // gradients of the energies with shape [nstates, n_atoms, 3]
    pub gradients: Array3<f64>,
    pub couplings: Couplings,
}

impl BackendData {
    /// Check that the data covers exactly the requested states with consistent shapes.
    pub fn validate(
        &self,
        states: &[usize],
        n_atoms: usize,
        coupling_type: CouplingType,
        step: usize,
    ) -> Result<()> {
        let nstates: usize = states.len();
        if self.states.as_slice() != states {
            return Err(SurfaceHoppingError::backend(
                step,
                format!(
                    "the states {:?} were requested, but data for {:?} was returned",
                    states, self.states
                ),
            ));
        }
        if self.energies.len() != nstates {
            return Err(SurfaceHoppingError::backend(
                step,
                format!(
                    "expected {} energies, got {}",
                    nstates,
                    self.energies.len()
                ),
            ));
        }
        if let Some(idx) = self.energies.iter().position(|val| !val.is_finite()) {
            return Err(SurfaceHoppingError::backend(
                step,
                format!("the energy of state {} is not finite", states[idx]),
            ));
        }
        if self.gradients.dim() != (nstates, n_atoms, 3) {
            return Err(SurfaceHoppingError::backend(
                step,
                format!(
                    "gradients have the shape {:?}, expected {:?}",
                    self.gradients.dim(),
                    (nstates, n_atoms, 3)
                ),
            ));
        }
        if self.couplings.coupling_type() != coupling_type {
            return Err(SurfaceHoppingError::backend(
                step,
                format!(
                    "couplings of type {:?} were configured, but {:?} was returned",
                    coupling_type,
                    self.couplings.coupling_type()
                ),
            ));
        }
        let finite: bool = match &self.couplings {
            Couplings::Nonadiabatic(nacv) => {
                if nacv.dim() != (nstates, nstates, n_atoms, 3) {
                    return Err(SurfaceHoppingError::backend(
                        step,
                        format!(
                            "nonadiabatic couplings have the shape {:?}, expected {:?}",
                            nacv.dim(),
                            (nstates, nstates, n_atoms, 3)
                        ),
                    ));
                }
                nacv.iter().all(|val| val.is_finite())
            }
            Couplings::Overlap(s_mat) => {
                if s_mat.dim() != (nstates, nstates) {
                    return Err(SurfaceHoppingError::backend(
                        step,
                        format!(
                            "overlap matrix has the shape {:?}, expected {:?}",
                            s_mat.dim(),
                            (nstates, nstates)
                        ),
                    ));
                }
                s_mat.iter().all(|val| val.is_finite())
            }
        };
        if !finite || !self.gradients.iter().all(|val| val.is_finite()) {
            return Err(SurfaceHoppingError::backend(
                step,
                "gradients or couplings contain non-finite values",
            ));
        }
        Ok(())
    }
}

/// Trait that provides an interface for an electronic structure method.
/// The function compute data returns the energies, the gradients and the
/// couplings of the requested states at the given coordinates (in bohr).
pub trait ElectronicStructureInterface {
    fn compute_data(
        &mut self,
        coordinates: ArrayView2<f64>,
        states: &[usize],
    ) -> anyhow::Result<BackendData>;
}

#[cfg(test)]
fn two_state_data() -> BackendData {
    BackendData {
        states: vec![0, 1],
        energies: array![0.0, 0.1],
        gradients: Array3::zeros((2, 1, 3)),
        couplings: Couplings::Nonadiabatic(Array4::zeros((2, 2, 1, 3))),
    }
}

#[test]
fn consistent_data_is_accepted() {
    let data: BackendData = two_state_data();
    assert!(data.validate(&[0, 1], 1, CouplingType::Nac, 0).is_ok());
}

#[test]
fn missing_state_is_rejected() {
    let mut data: BackendData = two_state_data();
    data.energies = array![0.0];
    data.states = vec![0];
    let result = data.validate(&[0, 1], 1, CouplingType::Nac, 3);
    assert!(matches!(
        result,
        Err(SurfaceHoppingError::BackendData { step: 3, .. })
    ));
}

#[test]
fn wrong_coupling_kind_is_rejected() {
    let data: BackendData = two_state_data();
    assert!(data.validate(&[0, 1], 1, CouplingType::Overlap, 0).is_err());
}

#[test]
fn non_finite_energy_is_rejected() {
    let mut data: BackendData = two_state_data();
    data.energies[1] = f64::NAN;
    assert!(data.validate(&[0, 1], 1, CouplingType::Nac, 0).is_err());
}
