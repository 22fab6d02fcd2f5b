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

//! The outer, vibrational, self-consistent loop.
//!
//! Drives the whole calculation: the relaxation-time seed, the dragless
//! iterated stage for both species, and, for dragful calculations, the
//! nested stage where each outer iteration refreshes the drag terms from
//! the phonon responses, reconverges the electron inner loop against them
//! and sweeps the phonons with the electron coupling. Convergence is judged
//! on the tracked vibrational scalars.

mod convergence;
mod methods;

pub(crate) use convergence::Convergence;
pub(crate) use methods::{Outer, OuterReport};

use crate::carriers::CarrierSystem;
use crate::collision::{ElectronKernel, PhononKernel};
use crate::drag::{BisectionReport, DragEngine};
use crate::response::{Conditions, FieldTerm, ResponseFunction};
use nalgebra::RealField;
use std::marker::PhantomData;

/// The electronic collaborators of the outer loop
pub(crate) struct ElectronSide<'a, T: RealField> {
    pub(crate) system: &'a dyn CarrierSystem<T>,
    pub(crate) kernel: &'a ElectronKernel<'a, T>,
    pub(crate) electric_term: &'a FieldTerm<T>,
    pub(crate) thermal_term: &'a FieldTerm<T>,
}

/// The vibrational collaborators of the outer loop
pub(crate) struct PhononSide<'a, T: RealField> {
    pub(crate) system: &'a dyn CarrierSystem<T>,
    pub(crate) kernel: &'a PhononKernel<'a, T>,
    pub(crate) electric_term: &'a FieldTerm<T>,
    pub(crate) thermal_term: &'a FieldTerm<T>,
}

pub(crate) struct OuterLoopBuilder<T, RefConvergenceSettings, RefElectrons, RefPhonons, ValueConditions>
{
    convergence_settings: RefConvergenceSettings,
    electrons: RefElectrons,
    phonons: RefPhonons,
    conditions: ValueConditions,
    marker: PhantomData<T>,
}

impl<T> OuterLoopBuilder<T, (), (), (), ()> {
    pub(crate) fn new() -> Self {
        Self {
            convergence_settings: (),
            electrons: (),
            phonons: (),
            conditions: (),
            marker: PhantomData,
        }
    }
}

impl<T, RefConvergenceSettings, RefElectrons, RefPhonons, ValueConditions>
    OuterLoopBuilder<T, RefConvergenceSettings, RefElectrons, RefPhonons, ValueConditions>
{
    pub(crate) fn with_convergence_settings(
        self,
        convergence_settings: &Convergence<T>,
    ) -> OuterLoopBuilder<T, &Convergence<T>, RefElectrons, RefPhonons, ValueConditions>
    where
        T: RealField,
    {
        OuterLoopBuilder {
            convergence_settings,
            electrons: self.electrons,
            phonons: self.phonons,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_electrons<'e>(
        self,
        electrons: &'e ElectronSide<'e, T>,
    ) -> OuterLoopBuilder<T, RefConvergenceSettings, &'e ElectronSide<'e, T>, RefPhonons, ValueConditions>
    where
        T: RealField,
    {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            electrons,
            phonons: self.phonons,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_phonons<'p>(
        self,
        phonons: &'p PhononSide<'p, T>,
    ) -> OuterLoopBuilder<T, RefConvergenceSettings, RefElectrons, &'p PhononSide<'p, T>, ValueConditions>
    where
        T: RealField,
    {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            electrons: self.electrons,
            phonons,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_conditions(
        self,
        conditions: Conditions<T>,
    ) -> OuterLoopBuilder<T, RefConvergenceSettings, RefElectrons, RefPhonons, Conditions<T>> {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            electrons: self.electrons,
            phonons: self.phonons,
            conditions,
            marker: PhantomData,
        }
    }
}

pub(crate) struct OuterLoop<'a, T: RealField> {
    convergence_settings: &'a Convergence<T>,
    electrons: &'a ElectronSide<'a, T>,
    phonons: &'a PhononSide<'a, T>,
    conditions: Conditions<T>,
    drag_engine: Option<&'a DragEngine<'a, T>>,
    electron_electric: ResponseFunction<T>,
    electron_thermal: ResponseFunction<T>,
    phonon_electric: ResponseFunction<T>,
    phonon_thermal: ResponseFunction<T>,
    bisection: Option<BisectionReport<T>>,
}

impl<'a, T: Copy + RealField>
    OuterLoopBuilder<T, &'a Convergence<T>, &'a ElectronSide<'a, T>, &'a PhononSide<'a, T>, Conditions<T>>
{
    /// Assemble the loop, seeded with the relaxation-time responses
    pub(crate) fn build(self) -> OuterLoop<'a, T> {
        OuterLoop {
            convergence_settings: self.convergence_settings,
            electrons: self.electrons,
            phonons: self.phonons,
            conditions: self.conditions,
            drag_engine: None,
            electron_electric: ResponseFunction::from_field_term(self.electrons.electric_term),
            electron_thermal: ResponseFunction::from_field_term(self.electrons.thermal_term),
            phonon_electric: ResponseFunction::from_field_term(self.phonons.electric_term),
            phonon_thermal: ResponseFunction::from_field_term(self.phonons.thermal_term),
            bisection: None,
        }
    }
}

impl<'a, T: Copy + RealField> OuterLoop<'a, T> {
    /// Attach the drag engine required by dragful calculations
    pub(crate) fn attach_drag_engine(&mut self, engine: &'a DragEngine<'a, T>) {
        self.drag_engine = Some(engine);
    }

    pub(crate) fn electron_electric_response(&self) -> &ResponseFunction<T> {
        &self.electron_electric
    }

    pub(crate) fn electron_thermal_response(&self) -> &ResponseFunction<T> {
        &self.electron_thermal
    }

    pub(crate) fn phonon_electric_response(&self) -> &ResponseFunction<T> {
        &self.phonon_electric
    }

    pub(crate) fn phonon_thermal_response(&self) -> &ResponseFunction<T> {
        &self.phonon_thermal
    }

    /// The reciprocity search report, present once a dragful loop has run
    pub(crate) fn bisection_report(&self) -> Option<BisectionReport<T>> {
        self.bisection
    }
}
