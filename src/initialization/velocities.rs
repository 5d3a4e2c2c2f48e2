use crate::initialization::SystemData;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Gaussian distribution of the momentum components around the initial momenta.
pub struct GaussianMomenta {
    dist: Normal<f64>,
}

impl GaussianMomenta {
    /// Returns None if the width does not describe a spread of the momenta.
    pub fn new(width: f64) -> Option<GaussianMomenta> {
        if !(width > 0.0) {
            return None;
        }
        Normal::new(0.0, width)
            .ok()
            .map(|dist| GaussianMomenta { dist })
    }
}

/// Add a random momentum of the given width to every cartesian component of
/// the initial velocities. The random numbers are drawn from `rng`, so the
/// initial conditions of a trajectory are reproducible from its seed.
pub fn sample_velocities<R: Rng>(system: &SystemData, width: f64, rng: &mut R) -> Array2<f64> {
    let mut velocities: Array2<f64> = system.velocities.clone();
    let momenta: GaussianMomenta = match GaussianMomenta::new(width) {
        Some(momenta) => momenta,
        None => return velocities,
    };
    for atom in 0..system.n_atoms {
        let mass_inv: f64 = 1.0 / system.masses[atom];
        for xyz in 0..3 {
            velocities[[atom, xyz]] += mass_inv * momenta.dist.sample(rng);
        }
    }
    velocities
}

#[cfg(test)]
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn zero_width_keeps_velocities() {
    let system = SystemData::new(
        ndarray::array![[0.0, 0.0, 0.0]],
        ndarray::array![[0.01, 0.0, 0.0]],
        ndarray::array![2000.0],
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    assert_eq!(sample_velocities(&system, 0.0, &mut rng), system.velocities);
}

#[test]
fn sampling_is_reproducible() {
    let system = SystemData::new(
        ndarray::array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        Array2::zeros((2, 3)),
        ndarray::array![2000.0, 1000.0],
    )
    .unwrap();
    let first = sample_velocities(&system, 1.0, &mut StdRng::seed_from_u64(7));
    let second = sample_velocities(&system, 1.0, &mut StdRng::seed_from_u64(7));
    assert_eq!(first, second);
    assert!(first.iter().any(|val| *val != 0.0));
}
