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

//! Collision kernels: one fixed-point sweep of the linearised equation.
//!
//! A sweep maps a response iterate onto the next one,
//! `R'[k] = F[k] + tau[k] * sum_k' P[k,k'] R[k']`, with the in-scattering
//! sum evaluated at the orbit representatives over a rank-local block of the
//! irreducible wedge, replicated onto the full zone through the orbit
//! rotations and summed across ranks. Each species has its own kernel; both
//! are assembled through the shared typed-state builder.

mod electron;
mod phonon;

pub use electron::ElectronKernel;
pub use phonon::PhononKernel;

use crate::carriers::CarrierSystem;
use crate::comms::Communicator;
use crate::scattering::{ElectronProcessStore, PhononProcessStore, RateTable, StoreError};
use entrain_bzgrid::BzMesh;
use miette::Diagnostic;
use nalgebra::RealField;
use std::marker::PhantomData;
use thiserror::Error;

/// Failures raised during a collision sweep
#[derive(Debug, Error, Diagnostic)]
pub enum SweepError {
    /// The process store could not serve a record
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A collaborator disagrees with the mesh or window extents
    #[error("sweep extents mismatch: {0}")]
    Extents(String),
}

/// Typed-state builder shared by both collision kernels. The store attached
/// last selects which kernel [`CollisionKernelBuilder::build`] produces.
pub struct CollisionKernelBuilder<T, RefMesh, RefSystem, RefRates, RefStore, RefComm> {
    mesh: RefMesh,
    system: RefSystem,
    rates: RefRates,
    store: RefStore,
    communicator: RefComm,
    marker: PhantomData<T>,
}

impl<T: Copy + RealField> CollisionKernelBuilder<T, (), (), (), (), ()> {
    /// Start an empty builder
    pub fn new() -> Self {
        Self {
            mesh: (),
            system: (),
            rates: (),
            store: (),
            communicator: (),
            marker: PhantomData,
        }
    }
}

impl<T: Copy + RealField> Default for CollisionKernelBuilder<T, (), (), (), (), ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, RefMesh, RefSystem, RefRates, RefStore, RefComm>
    CollisionKernelBuilder<T, RefMesh, RefSystem, RefRates, RefStore, RefComm>
{
    /// Attach the wavevector mesh
    pub fn with_mesh(
        self,
        mesh: &BzMesh<T>,
    ) -> CollisionKernelBuilder<T, &BzMesh<T>, RefSystem, RefRates, RefStore, RefComm>
    where
        T: RealField,
    {
        CollisionKernelBuilder {
            mesh,
            system: self.system,
            rates: self.rates,
            store: self.store,
            communicator: self.communicator,
            marker: PhantomData,
        }
    }

    /// Attach the carrier system
    pub fn with_system(
        self,
        system: &dyn CarrierSystem<T>,
    ) -> CollisionKernelBuilder<T, RefMesh, &dyn CarrierSystem<T>, RefRates, RefStore, RefComm>
    {
        CollisionKernelBuilder {
            mesh: self.mesh,
            system,
            rates: self.rates,
            store: self.store,
            communicator: self.communicator,
            marker: PhantomData,
        }
    }

    /// Attach the aggregated scattering rates
    pub fn with_rates(
        self,
        rates: &RateTable<T>,
    ) -> CollisionKernelBuilder<T, RefMesh, RefSystem, &RateTable<T>, RefStore, RefComm> {
        CollisionKernelBuilder {
            mesh: self.mesh,
            system: self.system,
            rates,
            store: self.store,
            communicator: self.communicator,
            marker: PhantomData,
        }
    }

    /// Attach an electron process store
    pub fn with_electron_store(
        self,
        store: &dyn ElectronProcessStore<T>,
    ) -> CollisionKernelBuilder<
        T,
        RefMesh,
        RefSystem,
        RefRates,
        &dyn ElectronProcessStore<T>,
        RefComm,
    > {
        CollisionKernelBuilder {
            mesh: self.mesh,
            system: self.system,
            rates: self.rates,
            store,
            communicator: self.communicator,
            marker: PhantomData,
        }
    }

    /// Attach a phonon process store
    pub fn with_phonon_store(
        self,
        store: &dyn PhononProcessStore<T>,
    ) -> CollisionKernelBuilder<
        T,
        RefMesh,
        RefSystem,
        RefRates,
        &dyn PhononProcessStore<T>,
        RefComm,
    > {
        CollisionKernelBuilder {
            mesh: self.mesh,
            system: self.system,
            rates: self.rates,
            store,
            communicator: self.communicator,
            marker: PhantomData,
        }
    }

    /// Attach the communicator
    pub fn with_communicator(
        self,
        communicator: &dyn Communicator<T>,
    ) -> CollisionKernelBuilder<T, RefMesh, RefSystem, RefRates, RefStore, &dyn Communicator<T>>
    {
        CollisionKernelBuilder {
            mesh: self.mesh,
            system: self.system,
            rates: self.rates,
            store: self.store,
            communicator,
            marker: PhantomData,
        }
    }
}

impl<'a, T: Copy + RealField>
    CollisionKernelBuilder<
        T,
        &'a BzMesh<T>,
        &'a dyn CarrierSystem<T>,
        &'a RateTable<T>,
        &'a dyn ElectronProcessStore<T>,
        &'a dyn Communicator<T>,
    >
{
    /// Assemble the electron kernel
    pub fn build(self) -> ElectronKernel<'a, T> {
        ElectronKernel::new(
            self.mesh,
            self.system,
            self.rates,
            self.store,
            self.communicator,
        )
    }
}

impl<'a, T: Copy + RealField>
    CollisionKernelBuilder<
        T,
        &'a BzMesh<T>,
        &'a dyn CarrierSystem<T>,
        &'a RateTable<T>,
        &'a dyn PhononProcessStore<T>,
        &'a dyn Communicator<T>,
    >
{
    /// Assemble the phonon kernel
    pub fn build(self) -> PhononKernel<'a, T> {
        PhononKernel::new(
            self.mesh,
            self.system,
            self.rates,
            self.store,
            self.communicator,
        )
    }
}
