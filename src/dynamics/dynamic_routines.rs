use ndarray::prelude::*;

/// New coordinates of the velocity Verlet algorithm,
/// x(t+dt) = x(t) + v(t) dt + 1/2 a(t) dt^2
pub fn get_coord_verlet(
    coordinates: ArrayView2<f64>,
    velocities: ArrayView2<f64>,
    accelerations: ArrayView2<f64>,
    stepsize: f64,
) -> Array2<f64> {
    &coordinates + &(stepsize * &velocities + 0.5 * stepsize.powi(2) * &accelerations)
}

/// New velocities of the velocity Verlet algorithm,
/// v(t+dt) = v(t) + 1/2 (a(t) + a(t+dt)) dt
pub fn get_velocities_verlet(
    velocities: ArrayView2<f64>,
    old_accelerations: ArrayView2<f64>,
    accelerations: ArrayView2<f64>,
    stepsize: f64,
) -> Array2<f64> {
    &velocities + &(stepsize * 0.5 * &(&old_accelerations + &accelerations))
}

/// Accelerations a = -grad E / m from the gradient of one electronic state
pub fn get_accelerations(gradient: ArrayView2<f64>, masses: ArrayView1<f64>) -> Array2<f64> {
    let mut accelerations: Array2<f64> = -1.0 * &gradient;
    for (mut row, mass) in accelerations.outer_iter_mut().zip(masses.iter()) {
        row /= *mass;
    }
    accelerations
}

pub fn get_kinetic_energy(velocities: ArrayView2<f64>, masses: ArrayView1<f64>) -> f64 {
    let mut kinetic: f64 = 0.0;
    for index in 0..masses.len() {
        kinetic += masses[index] * 0.5 * velocities.slice(s![index, ..]).mapv(|val| val.powi(2)).sum();
    }
    kinetic
}

#[cfg(test)]
use approx::assert_relative_eq;

#[test]
fn kinetic_energy_of_two_atoms() {
    let velocities: Array2<f64> = array![[1.0, 0.0, 0.0], [0.0, 2.0, 2.0]];
    let masses: Array1<f64> = array![2.0, 0.5];
    assert_eq!(get_kinetic_energy(velocities.view(), masses.view()), 3.0);
}

#[test]
fn verlet_integrates_the_harmonic_oscillator() {
    // x(t) = cos(omega t) with omega = 1
    let stepsize: f64 = 0.01;
    let mut x: Array2<f64> = array![[1.0, 0.0, 0.0]];
    let mut v: Array2<f64> = Array2::zeros((1, 3));
    let mut a: Array2<f64> = -1.0 * &x;
    for _ in 0..100 {
        x = get_coord_verlet(x.view(), v.view(), a.view(), stepsize);
        let a_new: Array2<f64> = -1.0 * &x;
        v = get_velocities_verlet(v.view(), a.view(), a_new.view(), stepsize);
        a = a_new;
    }
    assert_relative_eq!(x[[0, 0]], 1.0_f64.cos(), max_relative = 1e-4);
    assert_relative_eq!(v[[0, 0]], -1.0_f64.sin(), max_relative = 1e-4);
}
