use crate::dynamics::get_kinetic_energy;
use crate::initialization::{FrustratedHopPolicy, HoppingConfiguration, RescaleType};
use ndarray::prelude::*;

/// Outcome of the velocity adjustment after a proposed hop
#[derive(Clone, Debug, PartialEq)]
pub enum Adjustment {
    /// the hop takes place, the velocities conserve the total energy
    Accepted(Array2<f64>),
    /// not enough kinetic energy along the rescaling direction, the velocities
    /// are kept or reflected depending on the policy
    Frustrated(Array2<f64>),
}

impl Adjustment {
    pub fn velocities(&self) -> ArrayView2<f64> {
        match self {
            Adjustment::Accepted(velocities) | Adjustment::Frustrated(velocities) => {
                velocities.view()
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Adjustment::Accepted(_))
    }
}

/// Rescaling of the nuclear velocities after a hop from the active state to the
/// target state, so that the total energy is conserved.
#[derive(Clone, Debug)]
pub struct VelocityAdjuster {
    pub rescale_type: RescaleType,
    pub frustrated_hop_policy: FrustratedHopPolicy,
}

impl VelocityAdjuster {
    pub fn new(rescale_type: RescaleType, frustrated_hop_policy: FrustratedHopPolicy) -> Self {
        VelocityAdjuster {
            rescale_type,
            frustrated_hop_policy,
        }
    }

    pub fn from_config(config: &HoppingConfiguration) -> Self {
        Self::new(config.rescale_type, config.frustrated_hop_policy)
    }

    /// `nonadiabatic` is the coupling vector d_ij between the active and the
    /// target state, required for the rescaling along the coupling vector.
    pub fn adjust(
        &self,
        velocities: ArrayView2<f64>,
        masses: ArrayView1<f64>,
        nonadiabatic: Option<ArrayView2<f64>>,
        energy_old: f64,
        energy_new: f64,
    ) -> Adjustment {
        let delta_e: f64 = energy_old - energy_new;
        match (self.rescale_type, nonadiabatic) {
            (RescaleType::Nac, Some(nacv)) => self.rescaled_velocities(velocities, masses, nacv, delta_e),
            _ => self.uniformly_rescaled_velocities(velocities, masses, delta_e),
        }
    }

    /// The velocities are changed along the mass weighted coupling vector,
    /// v' = v - gamma d / m, with the root gamma of
    /// a gamma^2 - b gamma - dE = 0 of the smaller magnitude.
    pub fn rescaled_velocities(
        &self,
        velocities: ArrayView2<f64>,
        masses: ArrayView1<f64>,
        nonadiabatic: ArrayView2<f64>,
        delta_e: f64,
    ) -> Adjustment {
        let mut mass_weigh_nad: Array2<f64> = nonadiabatic.to_owned();
        for (mut row, mass) in mass_weigh_nad.outer_iter_mut().zip(masses.iter()) {
            row /= *mass;
        }
        let a: f64 = 0.5 * (&nonadiabatic * &mass_weigh_nad).sum();
        let b: f64 = (&velocities * &nonadiabatic).sum();

        // without a direction no energy can be transferred
        if !(a > f64::EPSILON) {
            return Adjustment::Frustrated(velocities.to_owned());
        }

        let val: f64 = b.powi(2) + 4.0 * a * delta_e;
        if val < 0.0 {
            return match self.frustrated_hop_policy {
                FrustratedHopPolicy::Ignore => Adjustment::Frustrated(velocities.to_owned()),
                // invert the velocity component along the coupling vector
                FrustratedHopPolicy::Reflect => {
                    let gamma: f64 = b / a;
                    Adjustment::Frustrated(&velocities - &(gamma * &mass_weigh_nad))
                }
            };
        }
        let gamma: f64 = if b < 0.0 {
            (b + val.sqrt()) / (2.0 * a)
        } else {
            (b - val.sqrt()) / (2.0 * a)
        };
        Adjustment::Accepted(&velocities - &(gamma * &mass_weigh_nad))
    }

    /// All velocities are scaled by the same factor.
    pub fn uniformly_rescaled_velocities(
        &self,
        velocities: ArrayView2<f64>,
        masses: ArrayView1<f64>,
        delta_e: f64,
    ) -> Adjustment {
        let kinetic_energy: f64 = get_kinetic_energy(velocities, masses);
        if !(kinetic_energy > 0.0) || kinetic_energy + delta_e < 0.0 {
            return match self.frustrated_hop_policy {
                FrustratedHopPolicy::Ignore => Adjustment::Frustrated(velocities.to_owned()),
                FrustratedHopPolicy::Reflect => Adjustment::Frustrated(-1.0 * &velocities),
            };
        }
        let vel_scale: f64 = ((kinetic_energy + delta_e) / kinetic_energy).sqrt();
        Adjustment::Accepted(vel_scale * &velocities)
    }
}

#[cfg(test)]
use approx::assert_relative_eq;

#[cfg(test)]
fn two_atoms() -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    let velocities: Array2<f64> = array![[0.01, -0.002, 0.0], [0.0, 0.004, -0.001]];
    let masses: Array1<f64> = array![1000.0, 3000.0];
    let nacv: Array2<f64> = array![[0.8, 0.1, 0.0], [-0.2, 0.5, 0.3]];
    (velocities, masses, nacv)
}

#[test]
fn accepted_hop_conserves_total_energy() {
    let (velocities, masses, nacv) = two_atoms();
    let kinetic: f64 = get_kinetic_energy(velocities.view(), masses.view());
    for rescale_type in [RescaleType::Nac, RescaleType::Uniform] {
        let adjuster = VelocityAdjuster::new(rescale_type, FrustratedHopPolicy::Ignore);
        // hops up and down
        for (e_old, e_new) in [(0.0, 0.01), (0.02, -0.01)] {
            let adjustment: Adjustment =
                adjuster.adjust(velocities.view(), masses.view(), Some(nacv.view()), e_old, e_new);
            assert!(adjustment.is_accepted());
            let new_kinetic: f64 = get_kinetic_energy(adjustment.velocities(), masses.view());
            assert_relative_eq!(new_kinetic + e_new, kinetic + e_old, max_relative = 1e-10);
        }
    }
}

#[test]
fn rescaling_along_the_coupling_keeps_orthogonal_components() {
    let (velocities, masses, nacv) = two_atoms();
    let adjuster = VelocityAdjuster::new(RescaleType::Nac, FrustratedHopPolicy::Ignore);
    let adjustment: Adjustment =
        adjuster.adjust(velocities.view(), masses.view(), Some(nacv.view()), 0.0, 0.01);
    let change: Array2<f64> = &adjustment.velocities() - &velocities;
    // the change is parallel to d / m
    let ratio: f64 = change[[0, 0]] / (nacv[[0, 0]] / masses[0]);
    for atom in 0..2 {
        for xyz in 0..3 {
            assert_relative_eq!(
                change[[atom, xyz]],
                ratio * nacv[[atom, xyz]] / masses[atom],
                epsilon = 1e-15
            );
        }
    }
}

#[test]
fn insufficient_kinetic_energy_is_frustrated() {
    let (velocities, masses, nacv) = two_atoms();
    let kinetic: f64 = get_kinetic_energy(velocities.view(), masses.view());
    for rescale_type in [RescaleType::Nac, RescaleType::Uniform] {
        let adjuster = VelocityAdjuster::new(rescale_type, FrustratedHopPolicy::Ignore);
        let adjustment: Adjustment = adjuster.adjust(
            velocities.view(),
            masses.view(),
            Some(nacv.view()),
            0.0,
            1.5 * kinetic,
        );
        assert_eq!(adjustment, Adjustment::Frustrated(velocities.clone()));
    }
}

#[test]
fn reflection_inverts_the_component_along_the_coupling() {
    let (velocities, masses, nacv) = two_atoms();
    let kinetic: f64 = get_kinetic_energy(velocities.view(), masses.view());
    let adjuster = VelocityAdjuster::new(RescaleType::Nac, FrustratedHopPolicy::Reflect);
    let adjustment: Adjustment =
        adjuster.adjust(velocities.view(), masses.view(), Some(nacv.view()), 0.0, 10.0);
    assert!(!adjustment.is_accepted());
    let reflected: ArrayView2<f64> = adjustment.velocities();
    // the kinetic energy is unchanged, the projection on d changes its sign
    assert_relative_eq!(
        get_kinetic_energy(reflected, masses.view()),
        kinetic,
        max_relative = 1e-12
    );
    let b_old: f64 = (&velocities * &nacv).sum();
    let b_new: f64 = (&reflected * &nacv).sum();
    assert_relative_eq!(b_new, -b_old, max_relative = 1e-12);

    let adjuster = VelocityAdjuster::new(RescaleType::Uniform, FrustratedHopPolicy::Reflect);
    let adjustment: Adjustment =
        adjuster.adjust(velocities.view(), masses.view(), None, 0.0, 10.0);
    assert_eq!(adjustment, Adjustment::Frustrated(-1.0 * &velocities));
}

#[test]
fn vanishing_coupling_vector_frustrates_the_hop() {
    let (velocities, masses, _) = two_atoms();
    let adjuster = VelocityAdjuster::new(RescaleType::Nac, FrustratedHopPolicy::Reflect);
    let zero: Array2<f64> = Array2::zeros((2, 3));
    let adjustment: Adjustment =
        adjuster.adjust(velocities.view(), masses.view(), Some(zero.view()), 0.0, 1e-6);
    assert_eq!(adjustment, Adjustment::Frustrated(velocities));
}
