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

//! Response functions and the driving-field source terms that seed them.
//!
//! The linearised response of each species to a driving field is a cartesian
//! 3-vector per transport-active state. Its zeroth iterate, the field term,
//! is the relaxation-time solution `tau * c * eps^p * v` where the
//! coefficient `c` and the energy power `p` depend on the species and the
//! field. Field terms are assembled over the irreducible wedge, replicated
//! onto the full zone through the orbit rotations, and summed across ranks.

use crate::carriers::{CarrierSystem, Species};
use crate::comms::{local_range, Communicator};
use crate::error::BuildError;
use crate::scattering::RateTable;
use entrain_bzgrid::BzMesh;
use nalgebra::{RealField, Vector3};
use ndarray::Array2;
use std::marker::PhantomData;

/// The driving fields a response can be computed against
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A static temperature gradient
    Temperature,
    /// A static electric field
    Electric,
}

/// The per-state source term of the linearised equation, one cartesian
/// vector per transport-active state
#[derive(Clone, Debug)]
pub struct FieldTerm<T> {
    data: Array2<T>,
}

impl<T: Copy + RealField> FieldTerm<T> {
    pub(crate) fn from_data(data: Array2<T>) -> Self {
        Self { data }
    }

    /// Number of transport-active states covered
    pub fn num_states(&self) -> usize {
        self.data.dim().0
    }

    /// The source vector of one active state
    pub fn vector(&self, active_index: usize) -> Vector3<T> {
        Vector3::new(
            self.data[(active_index, 0)],
            self.data[(active_index, 1)],
            self.data[(active_index, 2)],
        )
    }

    /// Read access to the underlying (states, 3) table
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }
}

/// A response function over the transport-active states, one cartesian
/// vector per state
#[derive(Clone, Debug)]
pub struct ResponseFunction<T> {
    data: Array2<T>,
}

impl<T: Copy + RealField> ResponseFunction<T> {
    /// The relaxation-time iterate: the response equals the field term
    pub fn from_field_term(field_term: &FieldTerm<T>) -> Self {
        Self {
            data: field_term.data.clone(),
        }
    }

    /// A vanishing response over `num_states` active states
    pub fn zeros(num_states: usize) -> Self {
        Self {
            data: Array2::from_elem((num_states, 3), T::zero()),
        }
    }

    /// Number of transport-active states covered
    pub fn num_states(&self) -> usize {
        self.data.dim().0
    }

    /// The response vector of one active state
    pub fn vector(&self, active_index: usize) -> Vector3<T> {
        Vector3::new(
            self.data[(active_index, 0)],
            self.data[(active_index, 1)],
            self.data[(active_index, 2)],
        )
    }

    /// Overwrite the response vector of one active state
    pub fn set_vector(&mut self, active_index: usize, vector: Vector3<T>) {
        for axis in 0..3 {
            self.data[(active_index, axis)] = vector[axis];
        }
    }

    /// Read access to the underlying (states, 3) table
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Mutable access to the underlying table
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Project each state onto the invariant subspace of its wavevector's
    /// small group. Exact input data passes through unchanged; the
    /// projection removes symmetry-breaking noise accumulated by the
    /// iteration.
    pub fn symmetrize(&mut self, mesh: &BzMesh<T>, system: &dyn CarrierSystem<T>) {
        let bands = system.bands();
        for active_index in 0..self.num_states() {
            let wavevector = system.global_state(active_index) / bands;
            let projected = mesh.projector(wavevector) * self.vector(active_index);
            self.set_vector(active_index, projected);
        }
    }
}

/// The run conditions a field term is evaluated at
#[derive(Clone, Copy, Debug)]
pub struct Conditions<T> {
    /// Temperature in Kelvin
    pub temperature: T,
    /// Electron chemical potential in Joules. Must be zero for phonons.
    pub chemical_potential: T,
}

/// Typed-state builder for [`FieldTerm`]. All collaborators must be attached
/// before [`FieldTermBuilder::build`] becomes available.
pub struct FieldTermBuilder<T, RefMesh, RefSystem, RefRates, RefComm, Cond> {
    mesh: RefMesh,
    system: RefSystem,
    rates: RefRates,
    communicator: RefComm,
    conditions: Cond,
    marker: PhantomData<T>,
}

impl<T: Copy + RealField> FieldTermBuilder<T, (), (), (), (), ()> {
    /// Start an empty builder
    pub fn new() -> Self {
        Self {
            mesh: (),
            system: (),
            rates: (),
            communicator: (),
            conditions: (),
            marker: PhantomData,
        }
    }
}

impl<T: Copy + RealField> Default for FieldTermBuilder<T, (), (), (), (), ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, RefMesh, RefSystem, RefRates, RefComm, Cond>
    FieldTermBuilder<T, RefMesh, RefSystem, RefRates, RefComm, Cond>
{
    /// Attach the wavevector mesh
    pub fn with_mesh(
        self,
        mesh: &BzMesh<T>,
    ) -> FieldTermBuilder<T, &BzMesh<T>, RefSystem, RefRates, RefComm, Cond>
    where
        T: RealField,
    {
        FieldTermBuilder {
            mesh,
            system: self.system,
            rates: self.rates,
            communicator: self.communicator,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    /// Attach the carrier system
    pub fn with_system(
        self,
        system: &dyn CarrierSystem<T>,
    ) -> FieldTermBuilder<T, RefMesh, &dyn CarrierSystem<T>, RefRates, RefComm, Cond> {
        FieldTermBuilder {
            mesh: self.mesh,
            system,
            rates: self.rates,
            communicator: self.communicator,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    /// Attach the aggregated scattering rates
    pub fn with_rates(
        self,
        rates: &RateTable<T>,
    ) -> FieldTermBuilder<T, RefMesh, RefSystem, &RateTable<T>, RefComm, Cond> {
        FieldTermBuilder {
            mesh: self.mesh,
            system: self.system,
            rates,
            communicator: self.communicator,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    /// Attach the communicator
    pub fn with_communicator(
        self,
        communicator: &dyn Communicator<T>,
    ) -> FieldTermBuilder<T, RefMesh, RefSystem, RefRates, &dyn Communicator<T>, Cond> {
        FieldTermBuilder {
            mesh: self.mesh,
            system: self.system,
            rates: self.rates,
            communicator,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    /// Attach the run conditions
    pub fn with_conditions(
        self,
        conditions: Conditions<T>,
    ) -> FieldTermBuilder<T, RefMesh, RefSystem, RefRates, RefComm, Conditions<T>> {
        FieldTermBuilder {
            mesh: self.mesh,
            system: self.system,
            rates: self.rates,
            communicator: self.communicator,
            conditions,
            marker: PhantomData,
        }
    }
}

impl<'a, T: Copy + RealField>
    FieldTermBuilder<
        T,
        &'a BzMesh<T>,
        &'a dyn CarrierSystem<T>,
        &'a RateTable<T>,
        &'a dyn Communicator<T>,
        Conditions<T>,
    >
{
    /// Assemble the field term for the given driving field.
    ///
    /// Each rank sweeps its block of the irreducible wedge, evaluates the
    /// relaxation-time vector at the orbit representative and rotates it
    /// onto every image; the per-rank tables are then summed across the
    /// communicator so each rank holds the full term.
    #[tracing::instrument(name = "Field term builder", level = "info", skip(self))]
    pub fn build(self, field: FieldKind) -> Result<FieldTerm<T>, BuildError> {
        let species = self.system.species();
        if species == Species::Phonon && self.conditions.chemical_potential != T::zero() {
            return Err(BuildError::ChemicalPotential(
                "phonons carry no charge so their chemical potential is pinned at zero".into(),
            ));
        }
        if self.conditions.temperature <= T::zero() {
            return Err(BuildError::Conditions(
                "the temperature must be strictly positive".into(),
            ));
        }

        let bands = self.system.bands();
        let sources = self.mesh.num_irreducible_points() * bands;
        if self.rates.dim() != (self.mesh.num_irreducible_points(), bands) {
            return Err(BuildError::Extents(format!(
                "rate table has extents {:?}, expected ({}, {bands})",
                self.rates.dim(),
                self.mesh.num_irreducible_points()
            )));
        }

        let mut data = Array2::from_elem((self.system.active_states(), 3), T::zero());
        let range = local_range(sources, self.communicator.size(), self.communicator.rank());
        for source in range {
            let (ibz_index, band) = (source / bands, source % bands);
            let lifetime = self.rates.lifetime(ibz_index, band);
            if lifetime == T::zero() {
                continue;
            }
            let representative = self.mesh.representative(ibz_index) * bands + band;
            let energy = self.system.energy(representative);
            let coefficient = match (species, field) {
                (_, FieldKind::Temperature) => {
                    (energy - self.conditions.chemical_potential) / self.conditions.temperature
                }
                (Species::Electron, FieldKind::Electric) => {
                    T::from_f64(crate::constants::ELECTRON_CHARGE).unwrap()
                }
                // An electric field does not drive the neutral lattice
                (Species::Phonon, FieldKind::Electric) => T::zero(),
            };
            let velocity = self.system.velocity(representative);
            let seed = velocity * (lifetime * coefficient);

            for image in self.mesh.orbit(ibz_index).images() {
                let state = image.fbz_index * bands + band;
                let active_index = match self.system.active_index(state) {
                    Some(index) => index,
                    None => continue,
                };
                let rotated = self.mesh.group().rotation(image.rotation).cartesian * seed;
                for axis in 0..3 {
                    data[(active_index, axis)] = rotated[axis];
                }
            }
        }

        if self.communicator.size() > 1 {
            self.communicator
                .all_reduce_sum(data.as_slice_mut().expect("field term is contiguous"));
        }

        Ok(FieldTerm { data })
    }
}
