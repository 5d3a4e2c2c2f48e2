use crate::error::{Result, SurfaceHoppingError};
use crate::initialization::ModelConfiguration;
use ndarray::prelude::*;

/// Struct that hold the data of the nuclei of one trajectory:
/// the cartesian coordinates, the velocities and the masses (atomic units)
#[derive(Clone, Debug)]
pub struct SystemData {
    pub n_atoms: usize,
    pub coordinates: Array2<f64>,
    pub velocities: Array2<f64>,
    pub masses: Array1<f64>,
}

impl SystemData {
    pub fn new(
        coordinates: Array2<f64>,
        velocities: Array2<f64>,
        masses: Array1<f64>,
    ) -> Result<Self> {
        let n_atoms: usize = masses.len();
        if coordinates.dim() != (n_atoms, 3) || velocities.dim() != (n_atoms, 3) {
            return Err(SurfaceHoppingError::config(format!(
                "coordinates {:?} and velocities {:?} do not match {} atoms",
                coordinates.dim(),
                velocities.dim(),
                n_atoms
            )));
        }
        if masses.iter().any(|mass| !(*mass > 0.0)) {
            return Err(SurfaceHoppingError::config("all masses must be positive"));
        }
        Ok(SystemData {
            n_atoms,
            coordinates,
            velocities,
            masses,
        })
    }
}

impl From<&ModelConfiguration> for SystemData {
    /// Creates the single particle of the model potential from its
    /// position and momentum along the x-axis.
    fn from(model: &ModelConfiguration) -> Self {
        let mut coordinates: Array2<f64> = Array2::zeros((1, 3));
        coordinates[[0, 0]] = model.position;
        let mut velocities: Array2<f64> = Array2::zeros((1, 3));
        velocities[[0, 0]] = model.momentum / model.mass;

        SystemData {
            n_atoms: 1,
            coordinates,
            velocities,
            masses: array![model.mass],
        }
    }
}

#[test]
fn inconsistent_shapes_are_rejected() {
    let result = SystemData::new(Array2::zeros((2, 3)), Array2::zeros((1, 3)), array![1.0, 1.0]);
    assert!(result.is_err());
    let result = SystemData::new(Array2::zeros((1, 3)), Array2::zeros((1, 3)), array![0.0]);
    assert!(result.is_err());
}
