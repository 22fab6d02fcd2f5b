use super::{InnerLoop, InnerReport};
use crate::transport::{electron_coefficients, TrackedElectronCoefficients};
use nalgebra::RealField;

pub(crate) trait Inner<T> {
    /// Recompute the tracked electronic scalars and confirm whether the
    /// change is within tolerance of the values on the previous iteration
    fn is_loop_converged(
        &self,
        previous: &mut TrackedElectronCoefficients<T>,
    ) -> color_eyre::Result<bool>;
    /// Carry out a single sweep of both electron responses
    fn single_iteration(&mut self) -> color_eyre::Result<()>;
    /// Run the self-consistent inner loop until the tracked scalars settle
    /// or the iteration cap is reached
    fn run_loop(&mut self) -> color_eyre::Result<InnerReport<T>>;
}

impl<'a, T> Inner<T> for InnerLoop<'a, T>
where
    T: Copy + RealField + Send + Sync,
{
    fn is_loop_converged(
        &self,
        previous: &mut TrackedElectronCoefficients<T>,
    ) -> color_eyre::Result<bool> {
        let coefficients = electron_coefficients(
            self.system,
            &self.electric_response,
            &self.thermal_response,
            self.conditions,
        );
        let current = TrackedElectronCoefficients::from_coefficients(&coefficients);
        let converged = current
            .is_change_within_tolerance(previous, self.convergence_settings.inner_tolerance());
        *previous = current;
        Ok(converged)
    }

    fn single_iteration(&mut self) -> color_eyre::Result<()> {
        match self.drag {
            None => {
                self.electric_response = self
                    .kernel
                    .advance_dragless(&self.electric_response, self.electric_term)?;
                self.thermal_response = self
                    .kernel
                    .advance_dragless(&self.thermal_response, self.thermal_term)?;
            }
            Some((electric_drag, thermal_drag)) => {
                self.electric_response = self.kernel.advance_with_drag(
                    &self.electric_response,
                    self.electric_term,
                    electric_drag,
                )?;
                self.thermal_response = self.kernel.advance_with_drag(
                    &self.thermal_response,
                    self.thermal_term,
                    thermal_drag,
                )?;
            }
        }
        Ok(())
    }

    fn run_loop(&mut self) -> color_eyre::Result<InnerReport<T>> {
        let mut tracked = TrackedElectronCoefficients {
            sigma: T::zero(),
            sigma_s: T::zero(),
            kappa_zero: T::zero(),
            alpha_over_t: T::zero(),
        };
        // Seed the comparison from the relaxation-time iterate
        let _ = self.is_loop_converged(&mut tracked)?;

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.convergence_settings.maximum_inner_iterations() {
            self.single_iteration()?;
            iterations += 1;
            if self.is_loop_converged(&mut tracked)? {
                converged = true;
                break;
            }
            tracing::trace!("inner iteration {iterations} complete");
        }
        if !converged {
            // A capped loop exits quietly, the flag carries the judgement
            tracing::warn!(
                "inner loop hit the iteration cap of {}",
                self.convergence_settings.maximum_inner_iterations()
            );
        }
        Ok(InnerReport {
            coefficients: tracked,
            iterations,
            converged,
        })
    }
}
