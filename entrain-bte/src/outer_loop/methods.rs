use super::OuterLoop;
use crate::app::Calculation;
use crate::drag::{diffusive_thermal_response, enforce_kelvin_onsager, BisectionReport};
use crate::inner_loop::{Inner, InnerLoopBuilder, InnerReport};
use crate::response::{FieldTerm, ResponseFunction};
use crate::transport::{
    electron_coefficients, phonon_coefficients, trace_average, weighted_tensor,
    TrackedElectronCoefficients, TrackedPhononCoefficients,
};
use color_eyre::eyre::eyre;
use nalgebra::RealField;
use num_traits::ToPrimitive;

/// The outcome of the full calculation at one set of conditions
#[derive(Clone, Copy, Debug)]
pub(crate) struct OuterReport<T> {
    /// The tracked electronic scalars at exit
    pub(crate) electron: TrackedElectronCoefficients<T>,
    /// The tracked vibrational scalars at exit
    pub(crate) phonon: TrackedPhononCoefficients<T>,
    /// Sweeps consumed by the last inner loop
    pub(crate) inner_iterations: usize,
    /// Outer iterations consumed across the stages
    pub(crate) outer_iterations: usize,
    /// Whether the vibrational scalars settled before the iteration cap
    pub(crate) converged: bool,
    /// The reciprocity search report, present for dragful calculations
    pub(crate) bisection: Option<BisectionReport<T>>,
}

pub(crate) trait Outer<T> {
    /// Recompute the tracked vibrational scalars and confirm whether the
    /// change is within tolerance of the values on the previous iteration
    fn is_loop_converged(
        &self,
        previous: &mut TrackedPhononCoefficients<T>,
    ) -> color_eyre::Result<bool>;
    /// One dragful outer iteration: refresh the drag terms, reconverge the
    /// electrons against them and sweep the phonons with the coupling
    fn single_iteration(&mut self) -> color_eyre::Result<InnerReport<T>>;
    /// Run the staged calculation to convergence
    fn run_loop(&mut self) -> color_eyre::Result<OuterReport<T>>;
}

impl<'a, T> Outer<T> for OuterLoop<'a, T>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    fn is_loop_converged(
        &self,
        previous: &mut TrackedPhononCoefficients<T>,
    ) -> color_eyre::Result<bool> {
        let coefficients = phonon_coefficients(
            self.phonons.system,
            &self.phonon_thermal,
            &self.phonon_electric,
            self.conditions.temperature,
        );
        let current = TrackedPhononCoefficients::from_coefficients(&coefficients);
        let converged = current
            .is_change_within_tolerance(previous, self.convergence_settings.outer_tolerance());
        *previous = current;
        Ok(converged)
    }

    fn single_iteration(&mut self) -> color_eyre::Result<InnerReport<T>> {
        let engine = self
            .drag_engine
            .ok_or_else(|| eyre!("a dragful calculation requires a drag engine"))?;
        let electric_drag = engine.compute_drag_term(&self.phonon_electric)?;
        let thermal_drag = engine.compute_drag_term(&self.phonon_thermal)?;
        let report = self.run_inner(Some((&electric_drag, &thermal_drag)))?;

        let spin_degeneracy = self.electrons.system.degeneracy();
        self.phonon_electric = self.phonons.kernel.advance_with_drag(
            &self.phonon_electric,
            self.phonons.electric_term,
            &self.electron_electric,
            spin_degeneracy,
        )?;
        self.phonon_thermal = self.phonons.kernel.advance_with_drag(
            &self.phonon_thermal,
            self.phonons.thermal_term,
            &self.electron_thermal,
            spin_degeneracy,
        )?;
        Ok(report)
    }

    fn run_loop(&mut self) -> color_eyre::Result<OuterReport<T>> {
        // Stage one: the electron inner loop against the static phonon
        // background
        let mut electron_report = self.run_inner(None)?;
        tracing::info!(
            "dragless inner loop finished in {} iterations",
            electron_report.iterations
        );

        // Stage two: iterate the phonon responses without electron coupling
        let mut tracked = TrackedPhononCoefficients {
            kappa: T::zero(),
            alpha_over_t: T::zero(),
        };
        let _ = self.is_loop_converged(&mut tracked)?;
        let mut outer_iterations = 0;
        let mut converged = false;
        while outer_iterations < self.convergence_settings.maximum_outer_iterations() {
            self.phonon_thermal = self
                .phonons
                .kernel
                .advance_dragless(&self.phonon_thermal, self.phonons.thermal_term)?;
            self.phonon_electric = self
                .phonons
                .kernel
                .advance_dragless(&self.phonon_electric, self.phonons.electric_term)?;
            outer_iterations += 1;
            if self.is_loop_converged(&mut tracked)? {
                converged = true;
                break;
            }
        }
        tracing::info!("dragless phonon stage finished in {outer_iterations} iterations");

        // Stage three: the nested dragful loop
        if self.convergence_settings.calculation_type() == Calculation::Dragful {
            converged = false;
            let mut drag_iterations = 0;
            while drag_iterations < self.convergence_settings.maximum_outer_iterations() {
                electron_report = self.single_iteration()?;
                drag_iterations += 1;
                if self.is_loop_converged(&mut tracked)? {
                    converged = true;
                    break;
                }
                tracing::trace!("outer iteration {drag_iterations} complete");
            }
            outer_iterations += drag_iterations;

            self.enforce_reciprocity(&tracked);
            let coefficients = electron_coefficients(
                self.electrons.system,
                &self.electron_electric,
                &self.electron_thermal,
                self.conditions,
            );
            electron_report.coefficients =
                TrackedElectronCoefficients::from_coefficients(&coefficients);
        }

        if !converged {
            // A capped loop exits quietly, the flag carries the judgement
            tracing::warn!(
                "outer loop hit the iteration cap of {}",
                self.convergence_settings.maximum_outer_iterations()
            );
        }

        Ok(OuterReport {
            electron: electron_report.coefficients,
            phonon: tracked,
            inner_iterations: electron_report.iterations,
            outer_iterations,
            converged,
            bisection: self.bisection,
        })
    }
}

impl<'a, T> OuterLoop<'a, T>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    /// Run the electron inner loop against the current drag terms, carrying
    /// the responses across outer iterations
    fn run_inner(
        &mut self,
        drag: Option<(&FieldTerm<T>, &FieldTerm<T>)>,
    ) -> color_eyre::Result<InnerReport<T>> {
        let mut inner = InnerLoopBuilder::new()
            .with_convergence_settings(self.convergence_settings)
            .with_system(self.electrons.system)
            .with_kernel(self.electrons.kernel)
            .with_electric_term(self.electrons.electric_term)
            .with_thermal_term(self.electrons.thermal_term)
            .with_conditions(self.conditions)
            .build();
        inner.seed_responses(self.electron_electric.clone(), self.electron_thermal.clone());
        if let Some((electric_drag, thermal_drag)) = drag {
            inner.attach_drag_terms(electric_drag, thermal_drag);
        }
        let report = inner.run_loop()?;
        self.electron_electric = inner.electric_response().clone();
        self.electron_thermal = inner.thermal_response().clone();
        Ok(report)
    }

    /// Rescale the drag part of the electron thermal response until the
    /// thermoelectric tensor recomputed from it matches the Peltier side of
    /// the Kelvin relation, including the phonon drag contribution
    fn enforce_reciprocity(&mut self, phonons: &TrackedPhononCoefficients<T>) {
        let charge = T::from_f64(crate::constants::ELECTRON_CHARGE).unwrap();
        let electron_alpha = trace_average(&weighted_tensor(
            self.electrons.system,
            &self.electron_electric,
            |energy| (energy - self.conditions.chemical_potential) / self.conditions.temperature,
        ));
        let constraint = electron_alpha + phonons.alpha_over_t;

        let diffusive = diffusive_thermal_response(
            self.electrons.system,
            &self.electron_electric,
            self.conditions,
        );
        let mut drag_part = ResponseFunction::zeros(self.electron_thermal.num_states());
        for state in 0..drag_part.num_states() {
            drag_part.set_vector(
                state,
                self.electron_thermal.vector(state) - diffusive.vector(state),
            );
        }

        let (rescaled, report) =
            enforce_kelvin_onsager(&diffusive, &drag_part, constraint, |candidate| {
                trace_average(&weighted_tensor(self.electrons.system, candidate, |_| charge))
            });
        tracing::info!(
            "reciprocity rescale settled on lambda {:?} after {} bisections",
            report.lambda,
            report.iterations
        );
        self.electron_thermal = rescaled;
        self.bisection = Some(report);
    }
}

#[cfg(test)]
mod test {
    use super::Outer;
    use crate::app::Calculation;
    use crate::carriers::model::{ParabolicBand, SineBranch};
    use crate::collision::CollisionKernelBuilder;
    use crate::comms::SerialCommunicator;
    use crate::outer_loop::{Convergence, ElectronSide, OuterLoopBuilder, PhononSide};
    use crate::response::{Conditions, FieldKind, FieldTerm, FieldTermBuilder};
    use crate::scattering::{
        ElectronElectronProcess, ElectronProcessStore, ImpurityProcess, MassDefectProcess,
        PhononElectronProcess, PhononMediatedProcess, PhononProcessStore, RateTable, StoreError,
        ThreePhononProcess,
    };
    use crate::carriers::{ElectronSystem, PhononSystem};
    use entrain_bzgrid::{BzMesh, SymmetryGroup};
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

    struct Fixture {
        electron_mesh: BzMesh<f64>,
        phonon_mesh: BzMesh<f64>,
        electrons: ElectronSystem<f64>,
        phonons: PhononSystem<f64>,
        electron_rates: RateTable<f64>,
        phonon_rates: RateTable<f64>,
        conditions: Conditions<f64>,
    }

    fn fixture() -> Fixture {
        let electron_mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let phonon_mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let electrons = band.system(&electron_mesh, 1, 0.0..1e-17, 2.0).unwrap();
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let phonons = branch.system(&phonon_mesh, 1).unwrap();
        let electron_rates = RateTable::new(Array2::from_elem(
            (electron_mesh.num_irreducible_points(), 1),
            1e12,
        ));
        let phonon_rates = RateTable::new(Array2::from_elem(
            (phonon_mesh.num_irreducible_points(), 1),
            1e11,
        ));
        let conditions = Conditions {
            temperature: 300.0,
            chemical_potential: 2e-20,
        };
        Fixture {
            electron_mesh,
            phonon_mesh,
            electrons,
            phonons,
            electron_rates,
            phonon_rates,
            conditions,
        }
    }

    fn field_term(
        fixture: &Fixture,
        communicator: &SerialCommunicator,
        phonon_side: bool,
        field: FieldKind,
    ) -> FieldTerm<f64> {
        let builder = FieldTermBuilder::new();
        if phonon_side {
            builder
                .with_mesh(&fixture.phonon_mesh)
                .with_system(&fixture.phonons)
                .with_rates(&fixture.phonon_rates)
                .with_communicator(communicator)
                .with_conditions(Conditions {
                    temperature: fixture.conditions.temperature,
                    chemical_potential: 0.0,
                })
                .build(field)
                .unwrap()
        } else {
            builder
                .with_mesh(&fixture.electron_mesh)
                .with_system(&fixture.electrons)
                .with_rates(&fixture.electron_rates)
                .with_communicator(communicator)
                .with_conditions(fixture.conditions)
                .build(field)
                .unwrap()
        }
    }

    #[test]
    fn a_quiet_system_settles_on_its_relaxation_time_solution() {
        let fixture = fixture();
        let communicator = SerialCommunicator;
        let store = QuietStore;

        let electron_electric = field_term(&fixture, &communicator, false, FieldKind::Electric);
        let electron_thermal = field_term(&fixture, &communicator, false, FieldKind::Temperature);
        let phonon_electric = field_term(&fixture, &communicator, true, FieldKind::Electric);
        let phonon_thermal = field_term(&fixture, &communicator, true, FieldKind::Temperature);

        let electron_kernel = CollisionKernelBuilder::new()
            .with_mesh(&fixture.electron_mesh)
            .with_system(&fixture.electrons)
            .with_rates(&fixture.electron_rates)
            .with_electron_store(&store)
            .with_communicator(&communicator)
            .build();
        let phonon_kernel = CollisionKernelBuilder::new()
            .with_mesh(&fixture.phonon_mesh)
            .with_system(&fixture.phonons)
            .with_rates(&fixture.phonon_rates)
            .with_phonon_store(&store)
            .with_communicator(&communicator)
            .build();

        let convergence = Convergence {
            outer_tolerance: 1e-6,
            inner_tolerance: 1e-6,
            maximum_outer_iterations: 10,
            maximum_inner_iterations: 10,
            calculation_type: Calculation::Dragless,
        };
        let electron_side = ElectronSide {
            system: &fixture.electrons,
            kernel: &electron_kernel,
            electric_term: &electron_electric,
            thermal_term: &electron_thermal,
        };
        let phonon_side = PhononSide {
            system: &fixture.phonons,
            kernel: &phonon_kernel,
            electric_term: &phonon_electric,
            thermal_term: &phonon_thermal,
        };
        let mut outer_loop = OuterLoopBuilder::new()
            .with_convergence_settings(&convergence)
            .with_electrons(&electron_side)
            .with_phonons(&phonon_side)
            .with_conditions(fixture.conditions)
            .build();

        let report = outer_loop.run_loop().unwrap();

        // With no in-scattering every sweep reproduces the field term, so
        // both stages settle on their first comparison
        assert!(report.converged);
        assert_eq!(report.inner_iterations, 1);
        assert!(report.bisection.is_none());
        for state in 0..electron_electric.num_states() {
            let difference = (outer_loop.electron_electric_response().vector(state)
                - electron_electric.vector(state))
            .norm();
            assert!(difference < 1e-25);
        }
    }

    #[test]
    fn a_dragful_calculation_without_an_engine_is_rejected() {
        let fixture = fixture();
        let communicator = SerialCommunicator;
        let store = QuietStore;

        let electron_electric = field_term(&fixture, &communicator, false, FieldKind::Electric);
        let electron_thermal = field_term(&fixture, &communicator, false, FieldKind::Temperature);
        let phonon_electric = field_term(&fixture, &communicator, true, FieldKind::Electric);
        let phonon_thermal = field_term(&fixture, &communicator, true, FieldKind::Temperature);

        let electron_kernel = CollisionKernelBuilder::new()
            .with_mesh(&fixture.electron_mesh)
            .with_system(&fixture.electrons)
            .with_rates(&fixture.electron_rates)
            .with_electron_store(&store)
            .with_communicator(&communicator)
            .build();
        let phonon_kernel = CollisionKernelBuilder::new()
            .with_mesh(&fixture.phonon_mesh)
            .with_system(&fixture.phonons)
            .with_rates(&fixture.phonon_rates)
            .with_phonon_store(&store)
            .with_communicator(&communicator)
            .build();

        let convergence = Convergence {
            outer_tolerance: 1e-6,
            inner_tolerance: 1e-6,
            maximum_outer_iterations: 10,
            maximum_inner_iterations: 10,
            calculation_type: Calculation::Dragful,
        };
        let electron_side = ElectronSide {
            system: &fixture.electrons,
            kernel: &electron_kernel,
            electric_term: &electron_electric,
            thermal_term: &electron_thermal,
        };
        let phonon_side = PhononSide {
            system: &fixture.phonons,
            kernel: &phonon_kernel,
            electric_term: &phonon_electric,
            thermal_term: &phonon_thermal,
        };
        let mut outer_loop = OuterLoopBuilder::new()
            .with_convergence_settings(&convergence)
            .with_electrons(&electron_side)
            .with_phonons(&phonon_side)
            .with_conditions(fixture.conditions)
            .build();

        assert!(outer_loop.run_loop().is_err());
    }
}
