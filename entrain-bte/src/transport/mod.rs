// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transport tensors assembled from converged response functions.
//!
//! Every coefficient is a Brillouin-zone sum of the outer product between
//! the group velocity and the response vector, weighted by a
//! species-dependent scalar and normalised by the zone volume,
//! `g / (N V) * sum_k w(eps_k) v_k (x) R_k`.

use crate::carriers::CarrierSystem;
use crate::constants::ELECTRON_CHARGE;
use crate::response::{Conditions, ResponseFunction};
use nalgebra::{Matrix3, RealField};

/// The electronic transport tensors at one set of conditions
#[derive(Clone, Copy, Debug)]
pub struct ElectronCoefficients<T: RealField> {
    /// Electrical conductivity
    pub sigma: Matrix3<T>,
    /// Thermoelectric conductivity `sigma S`
    pub sigma_s: Matrix3<T>,
    /// Electronic thermal conductivity at vanishing electric field
    pub kappa_zero: Matrix3<T>,
    /// Peltier response over temperature, the reciprocal partner of
    /// `sigma S`
    pub alpha_over_t: Matrix3<T>,
}

/// The vibrational transport tensors at one set of conditions
#[derive(Clone, Copy, Debug)]
pub struct PhononCoefficients<T: RealField> {
    /// Lattice thermal conductivity
    pub kappa: Matrix3<T>,
    /// The drag contribution to the Peltier response over temperature.
    /// Without electron coupling the phonon electric response vanishes and
    /// so does this tensor.
    pub alpha_over_t: Matrix3<T>,
}

/// The zone sum `g / (N V) * sum_k w(eps_k) v_k (x) R_k` over the
/// transport-active states
pub fn weighted_tensor<T, W>(
    system: &dyn CarrierSystem<T>,
    response: &ResponseFunction<T>,
    weight: W,
) -> Matrix3<T>
where
    T: Copy + RealField,
    W: Fn(T) -> T,
{
    let normalisation = system.degeneracy()
        / (T::from_usize(system.num_wavevectors()).unwrap() * system.cell_volume());
    let mut tensor = Matrix3::zeros();
    for active_index in 0..response.num_states() {
        let global = system.global_state(active_index);
        let velocity = system.velocity(global);
        let vector = response.vector(active_index);
        let scale = weight(system.energy(global)) * normalisation;
        for row in 0..3 {
            for column in 0..3 {
                tensor[(row, column)] += velocity[row] * vector[column] * scale;
            }
        }
    }
    tensor
}

/// The zone sum of [`weighted_tensor`] split by band, outermost index the
/// band
pub fn band_resolved_tensor<T, W>(
    system: &dyn CarrierSystem<T>,
    response: &ResponseFunction<T>,
    weight: W,
) -> Vec<Matrix3<T>>
where
    T: Copy + RealField,
    W: Fn(T) -> T,
{
    let bands = system.bands();
    let normalisation = system.degeneracy()
        / (T::from_usize(system.num_wavevectors()).unwrap() * system.cell_volume());
    let mut tensors = vec![Matrix3::zeros(); bands];
    for active_index in 0..response.num_states() {
        let global = system.global_state(active_index);
        let band = global % bands;
        let velocity = system.velocity(global);
        let vector = response.vector(active_index);
        let scale = weight(system.energy(global)) * normalisation;
        for row in 0..3 {
            for column in 0..3 {
                tensors[band][(row, column)] += velocity[row] * vector[column] * scale;
            }
        }
    }
    tensors
}

/// Assemble the electronic tensors from the electric and thermal responses
pub fn electron_coefficients<T: Copy + RealField>(
    system: &dyn CarrierSystem<T>,
    electric: &ResponseFunction<T>,
    thermal: &ResponseFunction<T>,
    conditions: Conditions<T>,
) -> ElectronCoefficients<T> {
    let charge = T::from_f64(ELECTRON_CHARGE).unwrap();
    let mu = conditions.chemical_potential;
    ElectronCoefficients {
        sigma: weighted_tensor(system, electric, |_| charge),
        sigma_s: weighted_tensor(system, thermal, |_| charge),
        kappa_zero: weighted_tensor(system, thermal, |energy| energy - mu),
        alpha_over_t: weighted_tensor(system, electric, |energy| {
            (energy - mu) / conditions.temperature
        }),
    }
}

/// Assemble the vibrational tensors from the thermal and electric responses
pub fn phonon_coefficients<T: Copy + RealField>(
    system: &dyn CarrierSystem<T>,
    thermal: &ResponseFunction<T>,
    electric: &ResponseFunction<T>,
    temperature: T,
) -> PhononCoefficients<T> {
    PhononCoefficients {
        kappa: weighted_tensor(system, thermal, |energy| energy),
        alpha_over_t: weighted_tensor(system, electric, |energy| energy / temperature),
    }
}

/// The isotropic average of a tensor, a third of its trace
pub fn trace_average<T: Copy + RealField>(tensor: &Matrix3<T>) -> T {
    (tensor[(0, 0)] + tensor[(1, 1)] + tensor[(2, 2)]) / T::from_f64(3.0).unwrap()
}

/// Whether a scalar moved by less than the relative tolerance between
/// iterations. Exactly equal values converge regardless of magnitude; a
/// vanished previous value only converges against an equally vanished
/// current one.
pub(crate) fn within_tolerance<T: Copy + RealField>(current: T, previous: T, tolerance: T) -> bool {
    if current == previous {
        true
    } else if previous == T::zero() {
        false
    } else {
        ((current - previous) / previous).abs() <= tolerance
    }
}

/// The trace-averaged electronic scalars tracked by the inner loop
#[derive(Clone, Copy, Debug)]
pub struct TrackedElectronCoefficients<T> {
    /// Trace average of the electrical conductivity
    pub sigma: T,
    /// Trace average of the thermoelectric conductivity
    pub sigma_s: T,
    /// Trace average of the zero-field electronic thermal conductivity
    pub kappa_zero: T,
    /// Trace average of the Peltier response over temperature
    pub alpha_over_t: T,
}

impl<T: Copy + RealField> TrackedElectronCoefficients<T> {
    /// Collapse the full tensors onto their tracked trace averages
    pub fn from_coefficients(coefficients: &ElectronCoefficients<T>) -> Self {
        Self {
            sigma: trace_average(&coefficients.sigma),
            sigma_s: trace_average(&coefficients.sigma_s),
            kappa_zero: trace_average(&coefficients.kappa_zero),
            alpha_over_t: trace_average(&coefficients.alpha_over_t),
        }
    }

    /// Whether every tracked scalar moved by less than the tolerance
    pub fn is_change_within_tolerance(&self, previous: &Self, tolerance: T) -> bool {
        within_tolerance(self.sigma, previous.sigma, tolerance)
            && within_tolerance(self.sigma_s, previous.sigma_s, tolerance)
            && within_tolerance(self.kappa_zero, previous.kappa_zero, tolerance)
            && within_tolerance(self.alpha_over_t, previous.alpha_over_t, tolerance)
    }
}

/// The trace-averaged vibrational scalars tracked by the outer loop
#[derive(Clone, Copy, Debug)]
pub struct TrackedPhononCoefficients<T> {
    /// Trace average of the lattice thermal conductivity
    pub kappa: T,
    /// Trace average of the drag Peltier response over temperature
    pub alpha_over_t: T,
}

impl<T: Copy + RealField> TrackedPhononCoefficients<T> {
    /// Collapse the full tensors onto their tracked trace averages
    pub fn from_coefficients(coefficients: &PhononCoefficients<T>) -> Self {
        Self {
            kappa: trace_average(&coefficients.kappa),
            alpha_over_t: trace_average(&coefficients.alpha_over_t),
        }
    }

    /// Whether every tracked scalar moved by less than the tolerance
    pub fn is_change_within_tolerance(&self, previous: &Self, tolerance: T) -> bool {
        within_tolerance(self.kappa, previous.kappa, tolerance)
            && within_tolerance(self.alpha_over_t, previous.alpha_over_t, tolerance)
    }
}

#[cfg(test)]
mod test {
    use super::{band_resolved_tensor, trace_average, weighted_tensor};
    use crate::carriers::model::ParabolicBand;
    use crate::comms::SerialCommunicator;
    use crate::response::{Conditions, FieldKind, FieldTermBuilder, ResponseFunction};
    use crate::scattering::RateTable;
    use approx::assert_relative_eq;
    use entrain_bzgrid::{BzMesh, SymmetryGroup};
    use nalgebra::Matrix3;
    use ndarray::Array2;

    #[test]
    fn trace_average_of_the_identity_is_one() {
        assert_relative_eq!(trace_average(&Matrix3::<f64>::identity()), 1.0);
    }

    #[test]
    fn exactly_equal_scalars_converge_even_at_zero() {
        assert!(super::within_tolerance(0.0, 0.0, 1e-6));
        assert!(super::within_tolerance(2.0, 2.0, 0.0));
        assert!(!super::within_tolerance(1e-30, 0.0, 1e-6));
        assert!(super::within_tolerance(1.0 + 1e-8, 1.0, 1e-6));
        assert!(!super::within_tolerance(1.1, 1.0, 1e-6));
    }

    fn relaxation_time_response(
        mesh: &BzMesh<f64>,
        electrons: &crate::carriers::ElectronSystem<f64>,
        bands: usize,
    ) -> ResponseFunction<f64> {
        let rates = RateTable::new(Array2::from_elem(
            (mesh.num_irreducible_points(), bands),
            1e12,
        ));
        let term = FieldTermBuilder::new()
            .with_mesh(mesh)
            .with_system(electrons)
            .with_rates(&rates)
            .with_communicator(&SerialCommunicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 0.0,
            })
            .build(FieldKind::Electric)
            .unwrap();
        ResponseFunction::from_field_term(&term)
    }

    #[test]
    fn cubic_symmetry_yields_an_isotropic_diagonal_tensor() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let response = relaxation_time_response(&mesh, &electrons, 1);
        let tensor = weighted_tensor(&electrons, &response, |_| 1.0);
        let scale = tensor[(0, 0)].abs();
        assert!(scale > 0.0);
        assert_relative_eq!(tensor[(0, 0)], tensor[(1, 1)], max_relative = 1e-10);
        assert_relative_eq!(tensor[(1, 1)], tensor[(2, 2)], max_relative = 1e-10);
        for row in 0..3 {
            for column in 0..3 {
                if row != column {
                    assert_relative_eq!(
                        tensor[(row, column)] / scale,
                        0.0,
                        epsilon = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn band_resolved_tensors_sum_to_the_total() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 3, 0.0..1e-17, 2.0).unwrap();
        let response = relaxation_time_response(&mesh, &electrons, 3);
        let total = weighted_tensor(&electrons, &response, |energy| energy + 1e-20);
        let by_band = band_resolved_tensor(&electrons, &response, |energy| energy + 1e-20);
        let recombined: Matrix3<f64> = by_band.iter().sum();
        assert_relative_eq!((total - recombined).norm(), 0.0, epsilon = total.norm() * 1e-12);
    }
}
