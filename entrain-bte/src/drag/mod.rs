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

//! Phonon-drag coupling between the two species.
//!
//! The electron equation is driven by the phonon response through the
//! phonon partners of the electron-phonon records. Partners are tagged on
//! the electron mesh, folded onto a half zone through the odd parity of the
//! response, and the phonon response is sampled at them through a trilinear
//! stencil so the two species may live on different mesh densities.

mod onsager;

pub use onsager::{
    diffusive_thermal_response, enforce_kelvin_onsager, BisectionReport,
};

use crate::carriers::CarrierSystem;
use crate::collision::SweepError;
use crate::comms::{local_range, Communicator};
use crate::response::{FieldTerm, ResponseFunction};
use crate::scattering::{ElectronProcessStore, PhononPartner, RateTable};
use entrain_bzgrid::{BzMesh, InterpolationStencil};
use nalgebra::{RealField, Vector3};
use ndarray::Array2;
use num_traits::ToPrimitive;

/// Samples the phonon response at the electron-phonon partner wavevectors
/// and folds it into the drag source term of the electron equation
pub struct DragEngine<'a, T: RealField> {
    electron_mesh: &'a BzMesh<T>,
    electrons: &'a dyn CarrierSystem<T>,
    store: &'a dyn ElectronProcessStore<T>,
    rates: &'a RateTable<T>,
    communicator: &'a dyn Communicator<T>,
    stencil: InterpolationStencil<T>,
    phonon_branches: usize,
    phonon_states: usize,
}

impl<'a, T: Copy + RealField + ToPrimitive> DragEngine<'a, T> {
    /// Precompute the sampling stencil from the phonon mesh onto the
    /// electron mesh
    pub fn new(
        electron_mesh: &'a BzMesh<T>,
        electrons: &'a dyn CarrierSystem<T>,
        phonon_mesh: &BzMesh<T>,
        phonon_branches: usize,
        store: &'a dyn ElectronProcessStore<T>,
        rates: &'a RateTable<T>,
        communicator: &'a dyn Communicator<T>,
    ) -> Self {
        Self {
            electron_mesh,
            electrons,
            store,
            rates,
            communicator,
            stencil: InterpolationStencil::build(phonon_mesh, electron_mesh),
            phonon_branches,
            phonon_states: phonon_mesh.num_points() * phonon_branches,
        }
    }

    /// Sample the phonon response at a partner wavevector. Partners folded
    /// onto the stored half zone carry the `reversed` tag and sample the
    /// negated response, as the response is odd under wavevector reversal.
    pub fn interpolate(
        &self,
        phonon_response: &ResponseFunction<T>,
        partner: &PhononPartner,
    ) -> Vector3<T> {
        let fine_wavevector = partner.state / self.phonon_branches;
        let branch = partner.state % self.phonon_branches;
        let corners = self.stencil.corners(fine_wavevector);
        let weights = self.stencil.weights(fine_wavevector);
        let mut value = Vector3::zeros();
        for (&corner, &weight) in corners.iter().zip(weights.iter()) {
            value += phonon_response.vector(corner * self.phonon_branches + branch) * weight;
        }
        if partner.reversed {
            -value
        } else {
            value
        }
    }

    /// Assemble the drag source term of the electron equation from the
    /// current phonon response
    pub fn compute_drag_term(
        &self,
        phonon_response: &ResponseFunction<T>,
    ) -> Result<FieldTerm<T>, SweepError> {
        if phonon_response.num_states() != self.phonon_states {
            return Err(SweepError::Extents(format!(
                "phonon response covers {} states, the stencil was built for {}",
                phonon_response.num_states(),
                self.phonon_states
            )));
        }

        let bands = self.electrons.bands();
        let sources = self.electron_mesh.num_irreducible_points() * bands;
        let active = self.electrons.active_states();
        let mut data = Array2::from_elem((active, 3), T::zero());
        let range = local_range(sources, self.communicator.size(), self.communicator.rank());
        for source in range {
            let (ibz_index, band) = (source / bands, source % bands);
            let lifetime = self.rates.lifetime(ibz_index, band);
            if lifetime == T::zero() {
                continue;
            }
            let mut momentum = Vector3::zeros();
            for process in self.store.phonon_mediated(source)? {
                momentum += self.interpolate(phonon_response, &process.phonon) * process.weight;
            }
            let seed = -momentum * lifetime;

            for image in self.electron_mesh.orbit(ibz_index).images() {
                let state = image.fbz_index * bands + band;
                let active_index = match self.electrons.active_index(state) {
                    Some(index) => index,
                    None => continue,
                };
                let rotated =
                    self.electron_mesh.group().rotation(image.rotation).cartesian * seed;
                for axis in 0..3 {
                    data[(active_index, axis)] = rotated[axis];
                }
            }
        }

        if self.communicator.size() > 1 {
            self.communicator
                .all_reduce_sum(data.as_slice_mut().expect("drag term is contiguous"));
        }
        Ok(FieldTerm::from_data(data))
    }
}

#[cfg(test)]
mod test {
    use super::DragEngine;
    use crate::carriers::model::{ParabolicBand, SineBranch};
    use crate::carriers::CarrierSystem;
    use crate::comms::SerialCommunicator;
    use crate::response::ResponseFunction;
    use crate::scattering::{
        ElectronElectronProcess, ElectronProcessStore, ImpurityProcess, PhononMediatedProcess,
        PhononPartner, RateTable, StoreError,
    };
    use approx::assert_relative_eq;
    use entrain_bzgrid::{BzMesh, SymmetryGroup};
    use nalgebra::Vector3;
    use ndarray::Array2;

    struct QuietStore;

    impl ElectronProcessStore<f64> for QuietStore {
        fn phonon_mediated(
            &self,
            _state: usize,
        ) -> Result<Vec<PhononMediatedProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn impurity(&self, _state: usize) -> Result<Vec<ImpurityProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn electron_electron(
            &self,
            _state: usize,
        ) -> Result<Vec<ElectronElectronProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn reversed_partners_sample_the_negated_response() {
        let mesh: BzMesh<f64> = BzMesh::new([3, 3, 3], SymmetryGroup::identity());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 1), 1e12));
        let store = QuietStore;
        let communicator = SerialCommunicator;
        let engine = DragEngine::new(
            &mesh,
            &electrons,
            &mesh,
            1,
            &store,
            &rates,
            &communicator,
        );

        // An odd response: R(-q) = -R(q)
        let mut response = ResponseFunction::zeros(mesh.num_points());
        for index in 0..mesh.num_points() {
            let point = mesh.folded_point(index);
            response.set_vector(index, Vector3::new(point.x, point.y, point.z));
        }
        for index in 1..mesh.num_points() {
            let negated = mesh.negative_index(index);
            let folded = engine.interpolate(
                &response,
                &PhononPartner {
                    state: negated,
                    reversed: true,
                },
            );
            let direct = engine.interpolate(
                &response,
                &PhononPartner {
                    state: index,
                    reversed: false,
                },
            );
            assert_relative_eq!((folded - direct).norm(), 0.0, epsilon = 1e-12);
        }
    }

    /// One phonon-mediated record from the first state to its partner
    struct OneRecordStore;

    impl ElectronProcessStore<f64> for OneRecordStore {
        fn phonon_mediated(
            &self,
            state: usize,
        ) -> Result<Vec<PhononMediatedProcess<f64>>, StoreError> {
            if state == 0 {
                Ok(vec![PhononMediatedProcess {
                    final_state: 1,
                    phonon: PhononPartner {
                        state: 1,
                        reversed: false,
                    },
                    weight: 1e10,
                }])
            } else {
                Ok(Vec::new())
            }
        }

        fn impurity(&self, _state: usize) -> Result<Vec<ImpurityProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn electron_electron(
            &self,
            _state: usize,
        ) -> Result<Vec<ElectronElectronProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn a_single_record_injects_the_weighted_phonon_momentum() {
        let mesh: BzMesh<f64> = BzMesh::new([2, 1, 1], SymmetryGroup::identity());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 1), 1e12));
        let store = OneRecordStore;
        let communicator = SerialCommunicator;
        let engine = DragEngine::new(
            &mesh,
            &electrons,
            &mesh,
            1,
            &store,
            &rates,
            &communicator,
        );

        let partner = Vector3::new(2e-9, 1e-9, -4e-9);
        let mut response = ResponseFunction::zeros(mesh.num_points());
        response.set_vector(1, partner);
        let drag = engine.compute_drag_term(&response).unwrap();

        // -tau * weight = -1e-12 * 1e10
        assert_relative_eq!(
            (drag.vector(0) + partner * 1e-2).norm(),
            0.0,
            epsilon = 1e-22
        );
        assert_relative_eq!(drag.vector(1).norm(), 0.0);
    }

    #[test]
    fn without_records_the_drag_term_vanishes() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let electrons = band.system(&mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let phonons = branch.system(&mesh, 1).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 1), 1e12));
        let store = QuietStore;
        let communicator = SerialCommunicator;
        let engine = DragEngine::new(
            &mesh,
            &electrons,
            &mesh,
            1,
            &store,
            &rates,
            &communicator,
        );
        let response = ResponseFunction::zeros(phonons.active_states());
        let drag = engine.compute_drag_term(&response).unwrap();
        for state in 0..drag.num_states() {
            assert_relative_eq!(drag.vector(state).norm(), 0.0);
        }
    }
}
