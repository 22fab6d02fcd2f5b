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

//! The phonon collision kernel.

use super::SweepError;
use crate::carriers::CarrierSystem;
use crate::comms::{local_range, Communicator};
use crate::response::{FieldTerm, ResponseFunction};
use crate::scattering::{PhononProcessStore, RateTable, ThreePhononClass};
use entrain_bzgrid::BzMesh;
use nalgebra::{RealField, Vector3};
use ndarray::Array2;
use rayon::prelude::*;

/// One fixed-point sweep of the phonon equation.
///
/// The dragless sweep folds the three-phonon and mass-defect in-scattering
/// terms into the next iterate. The dragful sweep additionally couples to
/// the electron response through the phonon-electron records, weighted by
/// the electron spin degeneracy.
pub struct PhononKernel<'a, T: RealField> {
    mesh: &'a BzMesh<T>,
    system: &'a dyn CarrierSystem<T>,
    rates: &'a RateTable<T>,
    store: &'a dyn PhononProcessStore<T>,
    communicator: &'a dyn Communicator<T>,
}

impl<'a, T: Copy + RealField> PhononKernel<'a, T> {
    pub(super) fn new(
        mesh: &'a BzMesh<T>,
        system: &'a dyn CarrierSystem<T>,
        rates: &'a RateTable<T>,
        store: &'a dyn PhononProcessStore<T>,
        communicator: &'a dyn Communicator<T>,
    ) -> Self {
        Self {
            mesh,
            system,
            rates,
            store,
            communicator,
        }
    }

    /// One sweep without the electron coupling
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

    /// One sweep including the drag exerted by the electron response
    pub fn advance_with_drag(
        &self,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        electron_response: &ResponseFunction<T>,
        spin_degeneracy: T,
    ) -> Result<ResponseFunction<T>, SweepError>
    where
        T: Send + Sync,
    {
        self.advance(response, field_term, Some((electron_response, spin_degeneracy)))
    }

    fn advance(
        &self,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        electrons: Option<(&ResponseFunction<T>, T)>,
    ) -> Result<ResponseFunction<T>, SweepError>
    where
        T: Send + Sync,
    {
        let active = self.system.active_states();
        if response.num_states() != active || field_term.num_states() != active {
            return Err(SweepError::Extents(format!(
                "response covers {} states, field term {}, mesh holds {active}",
                response.num_states(),
                field_term.num_states()
            )));
        }

        let branches = self.system.bands();
        let sources = self.mesh.num_irreducible_points() * branches;
        let range = local_range(sources, self.communicator.size(), self.communicator.rank());

        let data = range
            .into_par_iter()
            .try_fold(
                || Array2::from_elem((active, 3), T::zero()),
                |mut local, source| {
                    self.accumulate(source, response, field_term, electrons, &mut local)?;
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
        next.symmetrize(self.mesh, self.system);
        Ok(next)
    }

    fn accumulate(
        &self,
        source: usize,
        response: &ResponseFunction<T>,
        field_term: &FieldTerm<T>,
        electrons: Option<(&ResponseFunction<T>, T)>,
        local: &mut Array2<T>,
    ) -> Result<(), SweepError> {
        let branches = self.system.bands();
        let (ibz_index, branch) = (source / branches, source % branches);
        let lifetime = self.rates.lifetime(ibz_index, branch);

        let mut incoming = Vector3::zeros();
        if lifetime != T::zero() {
            let half = T::from_f64(0.5).unwrap();
            for process in self.store.three_phonon(source)? {
                let partners = match process.class {
                    // Combination events exchange momentum with both partners
                    ThreePhononClass::Plus => {
                        response.vector(process.q3) - response.vector(process.q2)
                    }
                    // Decay events share the momentum between the products
                    ThreePhononClass::Minus => {
                        (response.vector(process.q3) + response.vector(process.q2)) * half
                    }
                };
                incoming += partners * process.weight;
            }
            for process in self.store.mass_defect(source)? {
                incoming += response.vector(process.partner) * process.weight;
            }
            if let Some((electron_response, spin_degeneracy)) = electrons {
                let mut momentum = Vector3::zeros();
                for process in self.store.phonon_electron(source)? {
                    let transferred = electron_response.vector(process.final_state)
                        - electron_response.vector(process.initial);
                    momentum += transferred * process.weight;
                }
                incoming += momentum * spin_degeneracy;
            }
        }

        for image in self.mesh.orbit(ibz_index).images() {
            let state = image.fbz_index * branches + branch;
            let rotated = self.mesh.group().rotation(image.rotation).cartesian * incoming;
            let row = field_term.vector(state) + rotated * lifetime;
            for axis in 0..3 {
                local[(state, axis)] = row[axis];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::carriers::model::SineBranch;
    use crate::collision::CollisionKernelBuilder;
    use crate::comms::SerialCommunicator;
    use crate::response::{Conditions, FieldKind, FieldTermBuilder, ResponseFunction};
    use crate::scattering::{
        MassDefectProcess, PhononElectronProcess, PhononProcessStore, RateTable,
        StoreError, ThreePhononProcess,
    };
    use approx::assert_relative_eq;
    use entrain_bzgrid::{BzMesh, SymmetryGroup};
    use nalgebra::Vector3;
    use ndarray::Array2;

    struct QuietStore;

    impl PhononProcessStore<f64> for QuietStore {
        fn three_phonon(&self, _state: usize) -> Result<Vec<ThreePhononProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn mass_defect(&self, _state: usize) -> Result<Vec<MassDefectProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn phonon_electron(
            &self,
            _state: usize,
        ) -> Result<Vec<PhononElectronProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn without_in_scattering_the_sweep_reproduces_the_field_term() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let phonons = branch.system(&mesh, 2).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 2), 1e9));
        let communicator = SerialCommunicator;
        let term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&phonons)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 0.0,
            })
            .build(FieldKind::Temperature)
            .unwrap();
        let store = QuietStore;
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&phonons)
            .with_rates(&rates)
            .with_phonon_store(&store)
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

    /// One phonon-electron record at the first source
    struct OneCoupledStore;

    impl PhononProcessStore<f64> for OneCoupledStore {
        fn three_phonon(&self, _state: usize) -> Result<Vec<ThreePhononProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn mass_defect(&self, _state: usize) -> Result<Vec<MassDefectProcess<f64>>, StoreError> {
            Ok(Vec::new())
        }

        fn phonon_electron(
            &self,
            state: usize,
        ) -> Result<Vec<PhononElectronProcess<f64>>, StoreError> {
            if state == 0 {
                Ok(vec![PhononElectronProcess {
                    initial: 0,
                    final_state: 1,
                    weight: 1e9,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn the_drag_coupled_sweep_injects_the_electron_momentum_transfer() {
        let mesh: BzMesh<f64> = BzMesh::new([2, 1, 1], SymmetryGroup::identity());
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let phonons = branch.system(&mesh, 1).unwrap();
        let rates = RateTable::new(Array2::from_elem((mesh.num_irreducible_points(), 1), 1e11));
        let communicator = SerialCommunicator;
        let term = FieldTermBuilder::new()
            .with_mesh(&mesh)
            .with_system(&phonons)
            .with_rates(&rates)
            .with_communicator(&communicator)
            .with_conditions(Conditions {
                temperature: 300.0,
                chemical_potential: 0.0,
            })
            .build(FieldKind::Temperature)
            .unwrap();
        let store = OneCoupledStore;
        let kernel = CollisionKernelBuilder::new()
            .with_mesh(&mesh)
            .with_system(&phonons)
            .with_rates(&rates)
            .with_phonon_store(&store)
            .with_communicator(&communicator)
            .build();

        let initial = Vector3::new(1e-9, 0.0, 2e-9);
        let exchanged = Vector3::new(3e-9, -1e-9, 0.0);
        let mut electron_response = ResponseFunction::zeros(2);
        electron_response.set_vector(0, initial);
        electron_response.set_vector(1, exchanged);

        let response = ResponseFunction::zeros(mesh.num_points());
        let next = kernel
            .advance_with_drag(&response, &term, &electron_response, 2.0)
            .unwrap();

        // tau * spin degeneracy * weight = 1e-11 * 2 * 1e9
        let injected = (exchanged - initial) * 2e-2;
        assert_relative_eq!(
            (next.vector(0) - term.vector(0) - injected).norm(),
            0.0,
            epsilon = 1e-22
        );
        assert_relative_eq!(
            (next.vector(1) - term.vector(1)).norm(),
            0.0,
            epsilon = 1e-25
        );
    }
}
