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

//! The electron collision kernel.

use super::SweepError;
use crate::carriers::CarrierSystem;
use crate::comms::{local_range, Communicator};
use crate::constants::{ELECTRON_CHARGE, HBAR};
use crate::response::{FieldTerm, ResponseFunction};
use crate::scattering::{ElectronProcessStore, RateTable};
use entrain_bzgrid::BzMesh;
use nalgebra::{Matrix3, RealField, Vector3};
use ndarray::Array2;
use rayon::prelude::*;

/// One fixed-point sweep of the electron equation.
///
/// The dragless sweep folds the phonon-mediated, impurity and
/// electron-electron in-scattering terms into the next iterate; the dragful
/// sweep additionally adds a precomputed drag term. An optional magnetic
/// field contributes a Lorentz term built from the wavevector gradient of
/// the current iterate; with a field applied the point group is broken, so
/// the caller must supply a mesh reduced with the trivial group and the
/// post-sweep symmetry projection is skipped.
pub struct ElectronKernel<'a, T: RealField> {
    mesh: &'a BzMesh<T>,
    system: &'a dyn CarrierSystem<T>,
    rates: &'a RateTable<T>,
    store: &'a dyn ElectronProcessStore<T>,
    communicator: &'a dyn Communicator<T>,
    magnetic_field: Option<Vector3<T>>,
}

impl<'a, T: Copy + RealField> ElectronKernel<'a, T> {
    pub(super) fn new(
        mesh: &'a BzMesh<T>,
        system: &'a dyn CarrierSystem<T>,
        rates: &'a RateTable<T>,
        store: &'a dyn ElectronProcessStore<T>,
        communicator: &'a dyn Communicator<T>,
    ) -> Self {
        Self {
            mesh,
            system,
            rates,
            store,
            communicator,
            magnetic_field: None,
        }
    }

    /// Apply a static magnetic field, in Tesla, to subsequent sweeps
    pub fn with_magnetic_field(mut self, field: Vector3<T>) -> Self {
        self.magnetic_field = Some(field);
        self
    }

    /// One sweep without phonon drag
    pub fn advance_dragless(
        &self,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
    ) -> Result<ResponseFunction<T>, SweepError>
    where
        T: Send + Sync,
    {
        self.advance(response, field_term, None)
    }

    /// One sweep with the phonon-drag term added to the source
    pub fn advance_with_drag(
        &self,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        drag: &FieldTerm<T>,
    ) -> Result<ResponseFunction<T>, SweepError>
    where
        T: Send + Sync,
    {
        self.advance(response, field_term, Some(drag))
    }

    fn advance(
        &self,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        drag: Option<&FieldTerm<T>>,
    ) -> Result<ResponseFunction<T>, SweepError>
    where
        T: Send + Sync,
    {
        let active = self.system.active_states();
        if response.num_states() != active || field_term.num_states() != active {
            return Err(SweepError::Extents(format!(
                "response covers {} states, field term {}, window holds {active}",
                response.num_states(),
                field_term.num_states()
            )));
        }
        if let Some(drag) = drag {
            if drag.num_states() != active {
                return Err(SweepError::Extents(format!(
                    "drag term covers {} states, window holds {active}",
                    drag.num_states()
                )));
            }
        }

        let bands = self.system.bands();
        let sources = self.mesh.num_irreducible_points() * bands;
        let range = local_range(sources, self.communicator.size(), self.communicator.rank());

        let data = range
            .into_par_iter()
            .try_fold(
                || Array2::from_elem((active, 3), T::zero()),
                |mut local, source| {
                    self.accumulate(source, response, field_term, drag, &mut local)?;
                    Ok::<_, SweepError>(local)
                },
            )
            .try_reduce(
                || Array2::from_elem((active, 3), T::zero()),
                |left, right| Ok(left + right),
            )?;

        let mut next = ResponseFunction::zeros(active);
        next.data_mut().assign(&data);
        if self.communicator.size() > 1 {
            self.communicator.all_reduce_sum(
                next.data_mut()
                    .as_slice_mut()
                    .expect("response table is contiguous"),
            );
        }
        if self.magnetic_field.is_none() {
            next.symmetrize(self.mesh, self.system);
        }
        Ok(next)
    }

    /// In-scattering at one irreducible source, written onto every image row
    fn accumulate(
        &self,
        source: usize,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        drag: Option<&FieldTerm<T>>,
        local: &mut Array2<T>,
    ) -> Result<(), SweepError> {
        let bands = self.system.bands();
        let (ibz_index, band) = (source / bands, source % bands);
        let lifetime = self.rates.lifetime(ibz_index, band);
        let representative = self.mesh.representative(ibz_index) * bands + band;

        let mut incoming = Vector3::zeros();
        if lifetime != T::zero() {
            for process in self.store.phonon_mediated(source)? {
                incoming += response.vector(process.final_state) * process.weight;
            }
            for process in self.store.impurity(source)? {
                incoming += response.vector(process.final_state) * process.weight;
            }
            for process in self.store.electron_electron(source)? {
                let exchanged = response.vector(process.k3) + response.vector(process.k4)
                    - response.vector(process.k2);
                incoming += exchanged * process.weight;
            }
            if let Some(field) = self.magnetic_field {
                let cross = self.system.velocity(representative).cross(&field);
                let factor = T::from_f64(ELECTRON_CHARGE / HBAR).unwrap();
                incoming += self.gradient(representative, response) * cross * factor;
            }
        }

        for image in self.mesh.orbit(ibz_index).images() {
            let state = image.fbz_index * bands + band;
            let active_index = match self.system.active_index(state) {
                Some(index) => index,
                None => continue,
            };
            let rotated = self.mesh.group().rotation(image.rotation).cartesian * incoming;
            let mut row = field_term.vector(active_index) + rotated * lifetime;
            if let Some(drag) = drag {
                row += drag.vector(active_index);
            }
            for axis in 0..3 {
                local[(active_index, axis)] = row[axis];
            }
        }
        Ok(())
    }

    /// Finite-difference wavevector gradient of the current iterate at one
    /// full-mesh state. Differences are central where both neighbours lie in
    /// the window, one-sided at window edges, zero for isolated states.
    fn gradient(&self, global_state: usize, response: &ResponseFunction<T>) -> Matrix3<T> {
        let bands = self.system.bands();
        let wavevector = global_state / bands;
        let band = global_state % bands;
        let step = self.system.grid_step();
        let centre = self
            .system
            .active_index(global_state)
            .map(|index| response.vector(index));

        let mut jacobian = Matrix3::zeros();
        for axis in 0..3 {
            let forward = self
                .system
                .active_index(self.mesh.neighbour(wavevector, axis, true) * bands + band)
                .map(|index| response.vector(index));
            let backward = self
                .system
                .active_index(self.mesh.neighbour(wavevector, axis, false) * bands + band)
                .map(|index| response.vector(index));
            let two = T::from_f64(2.0).unwrap();
            let difference = match (forward, backward, centre) {
                (Some(forward), Some(backward), _) => (forward - backward) / (two * step[axis]),
                (Some(forward), None, Some(centre)) => (forward - centre) / step[axis],
                (None, Some(backward), Some(centre)) => (centre - backward) / step[axis],
                _ => Vector3::zeros(),
            };
            for row in 0..3 {
                jacobian[(row, axis)] = difference[row];
            }
        }
        jacobian
    }
}

#[cfg(test)]
mod test {
    use crate::carriers::model::ParabolicBand;
    use crate::carriers::CarrierSystem;
    use crate::collision::CollisionKernelBuilder;
    use crate::comms::SerialCommunicator;
    use crate::response::{Conditions, FieldKind, FieldTermBuilder, ResponseFunction};
    use crate::scattering::{
        ElectronElectronProcess, ElectronProcessStore, ImpurityProcess, PhononMediatedProcess,
        RateTable, StoreError,
    };
    use approx::assert_relative_eq;
    use entrain_bzgrid::{BzMesh, SymmetryGroup};
    use nalgebra::Vector3;
    use ndarray::Array2;

    /// A store with no transition probabilities at all
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
    fn without_in_scattering_the_sweep_reproduces_the_field_term() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 2, 0.0..1e-17, 2.0).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 2), 1e12));
        let communicator = SerialCommunicator;
        let term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 2e-20,
            })
            .build(FieldKind::Electric)
            .unwrap();
        let store = QuietStore;
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_electron_store(&store)
            .with_communicator(&communicator)
            .build();
        let response = ResponseFunction::from_field_term(&term);
        let next = kernel.advance_dragless(&response, &term).unwrap();
        for state in 0..next.num_states() {
            assert_relative_eq!(
                (next.vector(state) - term.vector(state)).norm(),
                0.0,
                epsilon = 1e-25
            );
        }
    }

    /// One impurity record from the first state to its partner
    struct OneHopStore;

    impl ElectronProcessStore<f64> for OneHopStore {
        fn phonon_mediated(
            &self,
            _state: usize,
        ) -> Result<Vec<PhononMediatedProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn impurity(&self, state: usize) -> Result<Vec<ImpurityProcess<f64>>, StoreError> {
            if state == 0 {
                Ok(vec![ImpurityProcess {
                    final_state: 2,
                    weight: 1e10,
                }])
            } else {
                Ok(Vec::new())
            }
        }

        fn electron_electron(
            &self,
            _state: usize,
        ) -> Result<Vec<ElectronElectronProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn a_single_transition_adds_its_weighted_partner_response() {
        let mesh: BzMesh<f64> = BzMesh::new([2, 1, 1], SymmetryGroup::identity());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 2, 0.0..1e-17, 2.0).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 2), 1e12));
        let communicator = SerialCommunicator;
        let term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 2e-20,
            })
            .build(FieldKind::Electric)
            .unwrap();
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_electron_store(&OneHopStore)
            .with_communicator(&communicator)
            .build();

        let partner = Vector3::new(1e-8, -2e-8, 3e-8);
        let mut seed = ResponseFunction::zeros(electrons.active_states());
        for state in 0..seed.num_states() {
            seed.set_vector(state, partner);
        }
        let next = kernel.advance_dragless(&seed, &term).unwrap();

        // tau * weight = 1e-12 * 1e10
        let correction = partner * 1e-2;
        assert_relative_eq!(
            (next.vector(0) - term.vector(0) - correction).norm(),
            0.0,
            epsilon = 1e-22
        );
        // no record at the second band of the same wavevector
        assert_relative_eq!(
            (next.vector(1) - term.vector(1)).norm(),
            0.0,
            epsilon = 1e-25
        );
    }

    #[test]
    fn mismatched_response_extents_are_fatal() {
        let mesh: BzMesh<f64> = BzMesh::new([2, 2, 2], SymmetryGroup::identity());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 1), 1e12));
        let communicator = SerialCommunicator;
        let term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 0.0,
            })
            .build(FieldKind::Electric)
            .unwrap();
        let store = QuietStore;
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&electrons)
            .with_rates(&rates)
            .with_electron_store(&store)
            .with_communicator(&communicator)
            .build();
        let stunted = ResponseFunction::zeros(electrons.active_states() - 1);
        assert!(kernel.advance_dragless(&stunted, &term).is_err());
    }
}
