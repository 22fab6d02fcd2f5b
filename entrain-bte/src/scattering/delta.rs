//! Energy-conserving delta-function evaluators.
//!
//! The on-the-fly process generator needs a smeared representation of the
//! energy-conservation delta. Two strategies are provided behind one trait
//! and selected at configuration time: fixed-width Gaussian smearing, and a
//! linear-tetrahedron style hat whose support adapts to the local energy
//! spread of the mesh cell.

use nalgebra::RealField;
use serde::Deserialize;

/// Configuration-level selection of the delta evaluator
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeltaRule {
    /// Fixed-width Gaussian smearing
    Gaussian,
    /// Adaptive linear hat derived from the local band slope
    Tetrahedron,
}

impl DeltaRule {
    /// Instantiate the selected evaluator. `width` is the smearing width of
    /// the Gaussian strategy and is ignored by the adaptive one.
    pub fn evaluator<T: Copy + RealField>(&self, width: T) -> Box<dyn DeltaEvaluator<T>> {
        match self {
            DeltaRule::Gaussian => Box::new(GaussianDelta { width }),
            DeltaRule::Tetrahedron => Box::new(TetrahedronDelta),
        }
    }
}

/// A smeared energy-conservation delta. `separation` is the energy mismatch
/// of the process and `spread` the local energy scale of the mesh cell, the
/// band slope times the grid step.
pub trait DeltaEvaluator<T>: Send + Sync {
    /// The delta weight, normalized to unit integral over the separation
    fn weight(&self, separation: T, spread: T) -> T;
}

/// Gaussian smearing with a fixed width
pub struct GaussianDelta<T> {
    /// Smearing width in the same units as the energies
    pub width: T,
}

impl<T: Copy + RealField> DeltaEvaluator<T> for GaussianDelta<T> {
    fn weight(&self, separation: T, _spread: T) -> T {
        let reduced = separation / self.width;
        (-reduced * reduced).exp() / (self.width * T::pi().sqrt())
    }
}

/// A linear hat spanning the energy spread of the local mesh cell,
/// approximating the linear-tetrahedron weight on a regular grid. Falls
/// back to nothing for flat cells, where no crossing can occur.
pub struct TetrahedronDelta;

impl<T: Copy + RealField> DeltaEvaluator<T> for TetrahedronDelta {
    fn weight(&self, separation: T, spread: T) -> T {
        if spread <= T::zero() {
            return T::zero();
        }
        let reduced = separation.abs() / spread;
        if reduced >= T::one() {
            T::zero()
        } else {
            (T::one() - reduced) / spread
        }
    }
}

#[cfg(test)]
mod test {
    use super::{DeltaEvaluator, DeltaRule, GaussianDelta, TetrahedronDelta};
    use approx::assert_relative_eq;

    #[test]
    fn gaussian_is_normalised() {
        let delta = GaussianDelta { width: 0.05_f64 };
        let step = 0.001;
        let integral: f64 = (-1000..1000)
            .map(|n| delta.weight(n as f64 * step, 0.0) * step)
            .sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn hat_is_normalised_and_compact() {
        let delta = TetrahedronDelta;
        let spread = 0.2_f64;
        let step = 1e-4;
        let integral: f64 = (-4000..4000)
            .map(|n| delta.weight(n as f64 * step, spread) * step)
            .sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-3);
        assert_eq!(delta.weight(0.3, spread), 0.0);
    }

    #[test]
    fn flat_cells_carry_no_weight() {
        let delta = TetrahedronDelta;
        assert_eq!(delta.weight(0.0_f64, 0.0), 0.0);
    }

    #[test]
    fn rule_selects_the_strategy() {
        let gaussian = DeltaRule::Gaussian.evaluator(0.1_f64);
        let adaptive = DeltaRule::Tetrahedron.evaluator(0.1_f64);
        assert!(gaussian.weight(0.0, 0.0) > 0.0);
        assert_eq!(adaptive.weight(0.0, 0.0), 0.0);
    }
}
