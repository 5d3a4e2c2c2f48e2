use itertools::Itertools;
use ndarray::prelude::*;

/// Enforce d_ji = -d_ij and d_ii = 0 on a set of nonadiabatic coupling vectors.
/// The upper triangle (i < j) is taken as the reference.
pub fn antisymmetrize_nonadiabatic_coupling(nonadiabatic: ArrayView4<f64>) -> Array4<f64> {
    let nstates: usize = nonadiabatic.dim().0;
    let mut nacv: Array4<f64> = Array4::zeros(nonadiabatic.raw_dim());
    for (i, j) in (0..nstates).tuple_combinations() {
        let d_ij: ArrayView2<f64> = nonadiabatic.slice(s![i, j, .., ..]);
        nacv.slice_mut(s![i, j, .., ..]).assign(&d_ij);
        nacv.slice_mut(s![j, i, .., ..]).assign(&(-1.0 * &d_ij));
    }
    nacv
}

/// The phase of the electronic wavefunctions is arbitrary, so the sign of a
/// coupling vector can flip between two steps. Every vector whose overlap with
/// the vector of the last step is negative is inverted.
pub fn align_nonadiabatic_coupling(
    nonadiabatic_old: ArrayView4<f64>,
    nonadiabatic_new: ArrayView4<f64>,
) -> Array4<f64> {
    let nstates: usize = nonadiabatic_new.dim().0;
    let mut nac_new: Array4<f64> = nonadiabatic_new.to_owned();
    if nonadiabatic_old.raw_dim() != nonadiabatic_new.raw_dim() {
        return nac_new;
    }
    for (i, j) in (0..nstates).tuple_combinations() {
        let old: ArrayView2<f64> = nonadiabatic_old.slice(s![i, j, .., ..]);
        let new: ArrayView2<f64> = nonadiabatic_new.slice(s![i, j, .., ..]);
        let sign: f64 = (&old * &new).sum();
        if sign < 0.0 {
            nac_new.slice_mut(s![i, j, .., ..]).mapv_inplace(|val| -val);
            nac_new.slice_mut(s![j, i, .., ..]).mapv_inplace(|val| -val);
        }
    }
    nac_new
}

/// Scalar nonadiabatic couplings D_ij = sum_atoms v * d_ij, the
/// time-derivative couplings <i|d/dt j> along the nuclear trajectory.
pub fn get_nonadiabatic_scalar_coupling(
    nonadiabatic: ArrayView4<f64>,
    velocities: ArrayView2<f64>,
) -> Array2<f64> {
    let nstates: usize = nonadiabatic.dim().0;
    let mut nonadiabatic_scalar: Array2<f64> = Array2::zeros((nstates, nstates));
    for (i, j) in (0..nstates).tuple_combinations() {
        let value: f64 = (&nonadiabatic.slice(s![i, j, .., ..]) * &velocities).sum();
        nonadiabatic_scalar[[i, j]] = value;
        nonadiabatic_scalar[[j, i]] = -value;
    }
    nonadiabatic_scalar
}

/// Fix the phases of the states at the current step, so that the diagonal
/// of the overlap matrix S_ij = <i(t)|j(t+dt)> is positive.
pub fn align_overlap_matrix(overlap: ArrayView2<f64>) -> Array2<f64> {
    let mut s_mat: Array2<f64> = overlap.to_owned();
    for j in 0..s_mat.ncols() {
        if s_mat[[j, j]] < 0.0 {
            s_mat.column_mut(j).mapv_inplace(|val| -val);
        }
    }
    s_mat
}

/// Time-derivative couplings at the midpoint of the nuclear step from the
/// wavefunction overlaps, T_ij = (S_ij - S_ji) / (2 dt),
/// see S. Hammes-Schiffer, J. C. Tully, JCP 101, 4657 (1994)
pub fn get_overlap_scalar_coupling(overlap: ArrayView2<f64>, stepsize: f64) -> Array2<f64> {
    let s_mat: Array2<f64> = align_overlap_matrix(overlap);
    (&s_mat - &s_mat.t()) / (2.0 * stepsize)
}

#[cfg(test)]
use approx::assert_abs_diff_eq;

#[test]
fn scalar_coupling_is_antisymmetric() {
    let mut nacv: Array4<f64> = Array4::zeros((3, 3, 2, 3));
    nacv[[0, 1, 0, 0]] = 0.5;
    nacv[[0, 2, 1, 2]] = -0.2;
    nacv[[1, 2, 1, 1]] = 1.0;
    let nacv: Array4<f64> = antisymmetrize_nonadiabatic_coupling(nacv.view());
    let velocities: Array2<f64> = array![[0.1, 0.0, 0.0], [0.0, 0.3, 0.4]];
    let scalar: Array2<f64> = get_nonadiabatic_scalar_coupling(nacv.view(), velocities.view());
    assert_abs_diff_eq!(scalar[[0, 1]], 0.05, epsilon = 1e-14);
    assert_abs_diff_eq!(scalar[[0, 2]], -0.08, epsilon = 1e-14);
    assert_abs_diff_eq!(scalar[[1, 2]], 0.3, epsilon = 1e-14);
    assert_abs_diff_eq!(scalar, -scalar.t().to_owned(), epsilon = 1e-14);
    assert_eq!(scalar.diag().sum(), 0.0);
}

#[test]
fn flipped_coupling_vector_is_aligned() {
    let mut old: Array4<f64> = Array4::zeros((2, 2, 1, 3));
    old[[0, 1, 0, 0]] = 1.0;
    old[[1, 0, 0, 0]] = -1.0;
    let new: Array4<f64> = -1.0 * &old;
    let aligned: Array4<f64> = align_nonadiabatic_coupling(old.view(), new.view());
    assert_eq!(aligned, old);
}

#[test]
fn overlap_couplings_of_a_rotation() {
    // rotation of the adiabatic states by a small angle within one step
    let angle: f64 = 0.01;
    let dt: f64 = 2.0;
    let overlap: Array2<f64> = array![
        [angle.cos(), angle.sin()],
        [angle.sin(), -angle.cos()]
    ];
    let tdc: Array2<f64> = get_overlap_scalar_coupling(overlap.view(), dt);
    // the second state changed its phase and is aligned first
    assert_abs_diff_eq!(tdc[[0, 1]], -angle.sin() / dt, epsilon = 1e-12);
    assert_abs_diff_eq!(tdc[[1, 0]], angle.sin() / dt, epsilon = 1e-12);
    assert_eq!(tdc[[0, 0]], 0.0);
}
