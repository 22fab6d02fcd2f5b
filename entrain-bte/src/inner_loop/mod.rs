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

//! The inner, electronic, self-consistent loop.
//!
//! Holds the electric and thermal electron responses and sweeps them
//! against a fixed phonon background until the four tracked electronic
//! scalars stop moving. Drag terms, when present, stay frozen for the
//! whole inner loop; the outer loop refreshes them between calls.

mod methods;

pub(crate) use methods::Inner;

use crate::carriers::CarrierSystem;
use crate::collision::ElectronKernel;
use crate::outer_loop::Convergence;
use crate::response::{Conditions, FieldTerm, ResponseFunction};
use crate::transport::TrackedElectronCoefficients;
use nalgebra::RealField;
use std::marker::PhantomData;

/// The outcome of one inner loop
#[derive(Clone, Copy, Debug)]
pub(crate) struct InnerReport<T> {
    /// The tracked scalars at exit
    pub(crate) coefficients: TrackedElectronCoefficients<T>,
    /// Sweeps consumed
    pub(crate) iterations: usize,
    /// Whether the scalars settled before the iteration cap. A capped loop
    /// exits quietly and leaves the judgement to the caller.
    pub(crate) converged: bool,
}

pub(crate) struct InnerLoopBuilder<
    T,
    RefConvergenceSettings,
    RefSystem,
    RefKernel,
    RefElectricTerm,
    RefThermalTerm,
    ValueConditions,
> {
    convergence_settings: RefConvergenceSettings,
    system: RefSystem,
    kernel: RefKernel,
    electric_term: RefElectricTerm,
    thermal_term: RefThermalTerm,
    conditions: ValueConditions,
    marker: PhantomData<T>,
}

impl<T> InnerLoopBuilder<T, (), (), (), (), (), ()> {
    pub(crate) fn new() -> Self {
        Self {
            convergence_settings: (),
            system: (),
            kernel: (),
            electric_term: (),
            thermal_term: (),
            conditions: (),
            marker: PhantomData,
        }
    }
}

impl<T, RefConvergenceSettings, RefSystem, RefKernel, RefElectricTerm, RefThermalTerm, ValueConditions>
    InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        RefSystem,
        RefKernel,
        RefElectricTerm,
        RefThermalTerm,
        ValueConditions,
    >
{
    pub(crate) fn with_convergence_settings(
        self,
        convergence_settings: &Convergence<T>,
    ) -> InnerLoopBuilder<
        T,
        &Convergence<T>,
        RefSystem,
        RefKernel,
        RefElectricTerm,
        RefThermalTerm,
        ValueConditions,
    >
    where
        T: RealField,
    {
        InnerLoopBuilder {
            convergence_settings,
            system: self.system,
            kernel: self.kernel,
            electric_term: self.electric_term,
            thermal_term: self.thermal_term,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_system(
        self,
        system: &dyn CarrierSystem<T>,
    ) -> InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        &dyn CarrierSystem<T>,
        RefKernel,
        RefElectricTerm,
        RefThermalTerm,
        ValueConditions,
    > {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            system,
            kernel: self.kernel,
            electric_term: self.electric_term,
            thermal_term: self.thermal_term,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_kernel<'k>(
        self,
        kernel: &'k ElectronKernel<'k, T>,
    ) -> InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        RefSystem,
        &'k ElectronKernel<'k, T>,
        RefElectricTerm,
        RefThermalTerm,
        ValueConditions,
    >
    where
        T: RealField,
    {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            system: self.system,
            kernel,
            electric_term: self.electric_term,
            thermal_term: self.thermal_term,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_electric_term(
        self,
        electric_term: &FieldTerm<T>,
    ) -> InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        RefSystem,
        RefKernel,
        &FieldTerm<T>,
        RefThermalTerm,
        ValueConditions,
    > {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            system: self.system,
            kernel: self.kernel,
            electric_term,
            thermal_term: self.thermal_term,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_thermal_term(
        self,
        thermal_term: &FieldTerm<T>,
    ) -> InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        RefSystem,
        RefKernel,
        RefElectricTerm,
        &FieldTerm<T>,
        ValueConditions,
    > {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            system: self.system,
            kernel: self.kernel,
            electric_term: self.electric_term,
            thermal_term,
            conditions: self.conditions,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_conditions(
        self,
        conditions: Conditions<T>,
    ) -> InnerLoopBuilder<
        T,
        RefConvergenceSettings,
        RefSystem,
        RefKernel,
        RefElectricTerm,
        RefThermalTerm,
        Conditions<T>,
    > {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            system: self.system,
            kernel: self.kernel,
            electric_term: self.electric_term,
            thermal_term: self.thermal_term,
            conditions,
            marker: PhantomData,
        }
    }
}

pub(crate) struct InnerLoop<'a, T: RealField> {
    convergence_settings: &'a Convergence<T>,
    system: &'a dyn CarrierSystem<T>,
    kernel: &'a ElectronKernel<'a, T>,
    electric_term: &'a FieldTerm<T>,
    thermal_term: &'a FieldTerm<T>,
    conditions: Conditions<T>,
    drag: Option<(&'a FieldTerm<T>, &'a FieldTerm<T>)>,
    electric_response: ResponseFunction<T>,
    thermal_response: ResponseFunction<T>,
}

impl<'a, T: Copy + RealField>
    InnerLoopBuilder<
        T,
        &'a Convergence<T>,
        &'a dyn CarrierSystem<T>,
        &'a ElectronKernel<'a, T>,
        &'a FieldTerm<T>,
        &'a FieldTerm<T>,
        Conditions<T>,
    >
{
    /// Assemble the loop, seeded with the relaxation-time responses
    pub(crate) fn build(self) -> InnerLoop<'a, T> {
        InnerLoop {
            convergence_settings: self.convergence_settings,
            system: self.system,
            kernel: self.kernel,
            electric_term: self.electric_term,
            thermal_term: self.thermal_term,
            conditions: self.conditions,
            drag: None,
            electric_response: ResponseFunction::from_field_term(self.electric_term),
            thermal_response: ResponseFunction::from_field_term(self.thermal_term),
        }
    }
}

impl<'a, T: Copy + RealField> InnerLoop<'a, T> {
    /// Replace the relaxation-time seed with responses carried over from an
    /// earlier stage
    pub(crate) fn seed_responses(
        &mut self,
        electric: ResponseFunction<T>,
        thermal: ResponseFunction<T>,
    ) {
        self.electric_response = electric;
        self.thermal_response = thermal;
    }

    /// Freeze a pair of drag source terms, electric then thermal, into the
    /// remaining sweeps
    pub(crate) fn attach_drag_terms(
        &mut self,
        electric: &'a FieldTerm<T>,
        thermal: &'a FieldTerm<T>,
    ) {
        self.drag = Some((electric, thermal));
    }

    pub(crate) fn electric_response(&self) -> &ResponseFunction<T> {
        &self.electric_response
    }

    pub(crate) fn thermal_response(&self) -> &ResponseFunction<T> {
        &self.thermal_response
    }

    /// Overwrite the thermal response, used after the reciprocity rescale
    pub(crate) fn set_thermal_response(&mut self, response: ResponseFunction<T>) {
        self.thermal_response = response;
    }

    pub(crate) fn conditions(&self) -> Conditions<T> {
        self.conditions
    }
}
