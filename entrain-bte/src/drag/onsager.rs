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

//! Kelvin-Onsager reciprocity enforcement.
//!
//! The iterated drag solution breaks the reciprocity between the Seebeck
//! and Peltier responses by the truncation of the fixed point. It is
//! restored by rescaling the drag part of the thermal response,
//! `R_T(lambda) = R_diff + lambda * R_drag`, with the scale found by
//! bisection so the thermoelectric tensor recomputed from the rescaled
//! response matches the reciprocal constraint.

use crate::carriers::CarrierSystem;
use crate::constants::ELECTRON_CHARGE;
use crate::response::{Conditions, ResponseFunction};
use nalgebra::RealField;

/// The rescale is searched on `lambda` in `[0, 2]`
const BRACKET_UPPER: f64 = 2.0;
/// Relative tolerance on the reciprocity residual
const RELATIVE_TOLERANCE: f64 = 1e-6;
/// Bisection iteration cap
const MAXIMUM_ITERATIONS: usize = 100;

/// The outcome of the reciprocity bisection
#[derive(Clone, Copy, Debug)]
pub struct BisectionReport<T> {
    /// The drag rescale the search settled on
    pub lambda: T,
    /// The residual against the reciprocal constraint at `lambda`
    pub residual: T,
    /// Bisection iterations consumed
    pub iterations: usize,
    /// Whether the residual met the tolerance. A bracket that does not
    /// straddle the constraint terminates the search unconverged.
    pub converged: bool,
}

/// The diffusive part of the thermal response, derived state by state from
/// the electric response: `R_diff[k] = (eps_k - mu) / (q T) * R_E[k]`
pub fn diffusive_thermal_response<T: Copy + RealField>(
    system: &dyn CarrierSystem<T>,
    electric: &ResponseFunction<T>,
    conditions: Conditions<T>,
) -> ResponseFunction<T> {
    let charge = T::from_f64(ELECTRON_CHARGE).unwrap();
    let mut diffusive = ResponseFunction::zeros(electric.num_states());
    for active_index in 0..electric.num_states() {
        let energy = system.energy(system.global_state(active_index));
        let factor = (energy - conditions.chemical_potential)
            / (charge * conditions.temperature);
        diffusive.set_vector(active_index, electric.vector(active_index) * factor);
    }
    diffusive
}

/// Rescale the drag part of a thermal response until `evaluate` of the
/// candidate `R_diff + lambda * R_drag` meets `constraint`.
///
/// `evaluate` maps a candidate response onto the scalar thermoelectric
/// measure compared against the constraint, typically the trace-averaged
/// `sigma S`. Returns the rescaled response together with the search report;
/// on an unconverged search the returned response uses the bracket endpoint
/// with the smaller residual.
pub fn enforce_kelvin_onsager<T, F>(
    diffusive: &ResponseFunction<T>,
    drag: &ResponseFunction<T>,
    constraint: T,
    evaluate: F,
) -> (ResponseFunction<T>, BisectionReport<T>)
where
    T: Copy + RealField,
    F: Fn(&ResponseFunction<T>) -> T,
{
    let candidate = |lambda: T| {
        let mut rescaled = ResponseFunction::zeros(diffusive.num_states());
        for state in 0..diffusive.num_states() {
            rescaled.set_vector(
                state,
                diffusive.vector(state) + drag.vector(state) * lambda,
            );
        }
        rescaled
    };
    let residual = |lambda: T| evaluate(&candidate(lambda)) - constraint;

    let tolerance = T::from_f64(RELATIVE_TOLERANCE).unwrap()
        * (constraint.abs() + T::from_f64(f64::MIN_POSITIVE).unwrap());

    let mut lower = T::zero();
    let mut upper = T::from_f64(BRACKET_UPPER).unwrap();
    let mut residual_lower = residual(lower);
    let residual_upper = residual(upper);

    // A bracket that does not straddle the constraint cannot be bisected
    if residual_lower * residual_upper > T::zero() {
        let (lambda, residual) = if residual_lower.abs() <= residual_upper.abs() {
            (lower, residual_lower)
        } else {
            (upper, residual_upper)
        };
        return (
            candidate(lambda),
            BisectionReport {
                lambda,
                residual,
                iterations: 0,
                converged: false,
            },
        );
    }

    let half = T::from_f64(0.5).unwrap();
    let mut iterations = 0;
    let mut midpoint = (lower + upper) * half;
    let mut residual_midpoint = residual(midpoint);
    while residual_midpoint.abs() > tolerance && iterations < MAXIMUM_ITERATIONS {
        if residual_lower * residual_midpoint <= T::zero() {
            upper = midpoint;
        } else {
            lower = midpoint;
            residual_lower = residual_midpoint;
        }
        midpoint = (lower + upper) * half;
        residual_midpoint = residual(midpoint);
        iterations += 1;
    }

    (
        candidate(midpoint),
        BisectionReport {
            lambda: midpoint,
            residual: residual_midpoint,
            iterations,
            converged: residual_midpoint.abs() <= tolerance,
        },
    )
}

#[cfg(test)]
mod test {
    use super::enforce_kelvin_onsager;
    use crate::response::ResponseFunction;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn unit_drag(num_states: usize, slope: f64) -> ResponseFunction<f64> {
        let mut drag = ResponseFunction::zeros(num_states);
        for state in 0..num_states {
            drag.set_vector(state, Vector3::new(slope, 0.0, 0.0));
        }
        drag
    }

    #[test]
    fn a_linear_measure_settles_on_the_exact_rescale() {
        let diffusive = ResponseFunction::zeros(4);
        let drag = unit_drag(4, 3.0);
        // evaluate is linear in lambda with slope 3
        let (_, report) = enforce_kelvin_onsager(&diffusive, &drag, 4.5, |candidate| {
            candidate.vector(0).x
        });
        assert!(report.converged);
        assert_relative_eq!(report.lambda, 1.5, epsilon = 1e-5);
    }

    #[test]
    fn a_flat_measure_terminates_unconverged() {
        let diffusive = ResponseFunction::zeros(4);
        let drag = unit_drag(4, 0.0);
        let (_, report) = enforce_kelvin_onsager(&diffusive, &drag, 1.0, |candidate| {
            candidate.vector(0).x
        });
        assert!(!report.converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn a_constraint_already_met_converges_immediately() {
        let diffusive = ResponseFunction::zeros(2);
        let drag = unit_drag(2, 1.0);
        let (_, report) = enforce_kelvin_onsager(&diffusive, &drag, 1.0, |candidate| {
            candidate.vector(0).x
        });
        assert!(report.converged);
        assert_relative_eq!(report.lambda, 1.0, epsilon = 1e-5);
    }
}
