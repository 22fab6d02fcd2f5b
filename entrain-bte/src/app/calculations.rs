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

//! Assembly of complete transport solves from the run configuration.
//!
//! Each temperature in the sweep gets its own solve: the scattering rates,
//! field terms and collision kernels are rebuilt at the new conditions and
//! the outer loop is run to convergence. When more than one rank is
//! configured the same solve is executed cooperatively by a pool of worker
//! threads which split the irreducible wedge between them.

use super::{Calculation, Configuration, EntrainError, Styles, Tracker, TrackerBuilder};
use crate::archive::{DirectoryArchive, ResponseArchive, RunLabel};
use crate::collision::{CollisionKernelBuilder, ElectronKernel, PhononKernel};
use crate::comms::{Communicator, SerialCommunicator, ThreadCommunicator};
use crate::constants::ELECTRON_CHARGE;
use crate::drag::DragEngine;
use crate::outer_loop::{Convergence, ElectronSide, Outer, OuterLoopBuilder, OuterReport, PhononSide};
use crate::response::{Conditions, FieldKind, FieldTermBuilder};
use crate::scattering::model::{ModelInteraction, OnTheFlyStore};
use crate::scattering::{
    aggregate_rates, electron_channel_rates, phonon_channel_rates, representative_speeds,
    SurfaceChannel,
};
use crate::transport::{
    band_resolved_tensor, electron_coefficients, phonon_coefficients, trace_average,
    ElectronCoefficients, PhononCoefficients,
};
use color_eyre::eyre::eyre;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use nalgebra::{Matrix3, RealField, Vector3};
use ndarray::Array2;
use num_traits::ToPrimitive;
use owo_colors::OwoColorize;
use std::path::Path;

/// The full output of one solve: the transport tensors, their band and
/// branch decompositions and the convergence report of the loop that
/// produced them
pub(crate) struct TransportSolution<T: RealField> {
    pub(crate) electron: ElectronCoefficients<T>,
    pub(crate) phonon: PhononCoefficients<T>,
    pub(crate) sigma_by_band: Vec<Matrix3<T>>,
    pub(crate) kappa_by_branch: Vec<Matrix3<T>>,
    pub(crate) report: OuterReport<T>,
    /// The solved response tables, kept for the archive: the electron and
    /// phonon responses under each driving field, and the aggregated rates
    pub(crate) tables: SolutionTables<T>,
}

pub(crate) struct SolutionTables<T> {
    pub(crate) electron_electric: Array2<T>,
    pub(crate) electron_thermal: Array2<T>,
    pub(crate) phonon_electric: Array2<T>,
    pub(crate) phonon_thermal: Array2<T>,
    pub(crate) electron_rates: Array2<T>,
    pub(crate) phonon_rates: Array2<T>,
}

/// Drive a solve at every configured temperature, reporting and archiving
/// each in turn
pub(crate) fn temperature_sweep<T>(
    config: &Configuration<T>,
    calculation: Calculation,
    term: &console::Term,
    styles: &Styles,
) -> color_eyre::Result<()>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    let tracker = TrackerBuilder::new().with_configuration(config).build()?;

    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{prefix:.bold.dim} {spinner} {msg} [{wide_bar:.cyan/blue}] {percent}% ({eta})");
    let progress = ProgressBar::with_draw_target(
        config.sweep.temperatures.len() as u64,
        ProgressDrawTarget::term(term.clone(), 60),
    );
    progress.set_style(spinner_style);

    for &temperature in &config.sweep.temperatures {
        let kelvin = temperature
            .to_f64()
            .ok_or_else(|| eyre!("temperature does not fit in an f64"))?;
        term.write_line(&format!(
            "{}",
            format!("Solving at {kelvin:.2} K").style(styles.stage_style)
        ))?;

        let solution = solve_across_ranks(config, &tracker, calculation, temperature, None)?;
        report_solution(&solution, term, styles)?;
        archive_solution(config, calculation, kelvin, &solution)?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(())
}

/// Sweep the configured magnetic field strengths at the first temperature.
///
/// The field breaks the point-group symmetry, so the carrier systems are
/// rebuilt on meshes with the trivial group and the symmetrising projector
/// is bypassed. Drag coupling is not solved in the presence of a field.
pub(crate) fn hall_sweep<T>(
    config: &Configuration<T>,
    term: &console::Term,
    styles: &Styles,
) -> color_eyre::Result<()>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    let temperature = *config
        .sweep
        .temperatures
        .first()
        .ok_or_else(|| eyre!("the sweep holds no temperatures"))?;
    let tracker = TrackerBuilder::new()
        .forcing_trivial_group()
        .with_configuration(config)
        .build()?;

    for &strength in &config.sweep.magnetic_field_strengths {
        let field = Vector3::new(T::zero(), T::zero(), strength);
        term.write_line(&format!(
            "{}",
            format!(
                "Hall solve at B = {:.3e} T",
                strength.to_f64().unwrap_or(f64::NAN)
            )
            .style(styles.stage_style)
        ))?;

        let solution =
            solve_across_ranks(config, &tracker, Calculation::Dragless, temperature, Some(field))?;
        term.write_line(&format!(
            "{}",
            format!(
                "  sigma_xy = {:.6e} S/m",
                solution.electron.sigma[(0, 1)].to_f64().unwrap_or(f64::NAN)
            )
            .style(styles.tensor_style)
        ))?;
        if !solution.report.converged {
            term.write_line(&format!(
                "{}",
                "  the loop exhausted its iteration budget".style(styles.warning_style)
            ))?;
        }
    }

    Ok(())
}

/// Run the solve on a single rank, or fan it out over a pool of worker
/// threads when the configuration asks for more than one
fn solve_across_ranks<T>(
    config: &Configuration<T>,
    tracker: &Tracker<T>,
    calculation: Calculation,
    temperature: T,
    magnetic_field: Option<Vector3<T>>,
) -> color_eyre::Result<TransportSolution<T>>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    if config.global.number_of_ranks <= 1 {
        return solve_at_temperature(
            config,
            tracker,
            calculation,
            temperature,
            magnetic_field,
            &SerialCommunicator,
        );
    }

    let communicators = ThreadCommunicator::pool(config.global.number_of_ranks);
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(communicators.len());
        for communicator in communicators {
            handles.push(scope.spawn(move || {
                solve_at_temperature(
                    config,
                    tracker,
                    calculation,
                    temperature,
                    magnetic_field,
                    &communicator,
                )
            }));
        }
        // Every rank computes the full solution, rank zero's copy is kept
        let mut solution = None;
        for handle in handles {
            let rank_solution = handle
                .join()
                .map_err(|_| eyre!("a worker rank panicked"))??;
            if solution.is_none() {
                solution = Some(rank_solution);
            }
        }
        solution.ok_or_else(|| eyre!("the worker pool produced no solution"))
    })
}

/// Assemble and run one solve at fixed conditions.
///
/// Rates, field terms, kernels and the outer loop are built afresh: all of
/// them depend on the temperature through the occupation factors baked into
/// the process weights.
fn solve_at_temperature<T>(
    config: &Configuration<T>,
    tracker: &Tracker<T>,
    calculation: Calculation,
    temperature: T,
    magnetic_field: Option<Vector3<T>>,
    communicator: &dyn Communicator<T>,
) -> color_eyre::Result<TransportSolution<T>>
where
    T: Copy + RealField + ToPrimitive + Send + Sync,
{
    let electron_conditions = Conditions {
        temperature,
        chemical_potential: config.electrons.chemical_potential,
    };
    let phonon_conditions = Conditions {
        temperature,
        chemical_potential: T::zero(),
    };

    let interaction = ModelInteraction {
        deformation_potential: config.scattering.deformation_potential,
        impurity_strength: config.scattering.impurity_strength,
        anharmonicity: config.scattering.anharmonicity,
        mass_variance: config.scattering.mass_variance,
        temperature,
        chemical_potential: config.electrons.chemical_potential,
    };
    let store = OnTheFlyStore::new(
        tracker.electrons(),
        tracker.phonons(),
        tracker.electron_mesh(),
        tracker.phonon_mesh(),
        config.scattering.delta_rule.evaluator(config.scattering.delta_width),
        interaction,
    )
    .map_err(EntrainError::Build)?;

    let surface = surface_channel(config);
    let electron_channels =
        electron_channel_rates(tracker.electron_mesh(), tracker.electrons(), &store)
            .map_err(EntrainError::Store)?;
    let electron_speeds = representative_speeds(tracker.electron_mesh(), tracker.electrons());
    let electron_rates =
        aggregate_rates(&electron_channels, surface.map(|channel| (channel, &electron_speeds)))?;

    let phonon_channels = phonon_channel_rates(tracker.phonon_mesh(), tracker.phonons(), &store)
        .map_err(EntrainError::Store)?;
    let phonon_speeds = representative_speeds(tracker.phonon_mesh(), tracker.phonons());
    let phonon_rates =
        aggregate_rates(&phonon_channels, surface.map(|channel| (channel, &phonon_speeds)))?;

    let electron_electric = FieldTermBuilder::new()
        .with_mesh(tracker.electron_mesh())
        .with_system(tracker.electrons())
        .with_rates(&electron_rates)
        .with_communicator(communicator)
        .with_conditions(electron_conditions)
        .build(FieldKind::Electric)?;
    let electron_thermal = FieldTermBuilder::new()
        .with_mesh(tracker.electron_mesh())
        .with_system(tracker.electrons())
        .with_rates(&electron_rates)
        .with_communicator(communicator)
        .with_conditions(electron_conditions)
        .build(FieldKind::Temperature)?;
    let phonon_electric = FieldTermBuilder::new()
        .with_mesh(tracker.phonon_mesh())
        .with_system(tracker.phonons())
        .with_rates(&phonon_rates)
        .with_communicator(communicator)
        .with_conditions(phonon_conditions)
        .build(FieldKind::Electric)?;
    let phonon_thermal = FieldTermBuilder::new()
        .with_mesh(tracker.phonon_mesh())
        .with_system(tracker.phonons())
        .with_rates(&phonon_rates)
        .with_communicator(communicator)
        .with_conditions(phonon_conditions)
        .build(FieldKind::Temperature)?;

    let mut electron_kernel: ElectronKernel<'_, T> = CollisionKernelBuilder::new()
        .with_mesh(tracker.electron_mesh())
        .with_system(tracker.electrons())
        .with_rates(&electron_rates)
        .with_electron_store(&store)
        .with_communicator(communicator)
        .build();
    if let Some(field) = magnetic_field {
        electron_kernel = electron_kernel.with_magnetic_field(field);
    }
    let phonon_kernel: PhononKernel<'_, T> = CollisionKernelBuilder::new()
        .with_mesh(tracker.phonon_mesh())
        .with_system(tracker.phonons())
        .with_rates(&phonon_rates)
        .with_phonon_store(&store)
        .with_communicator(communicator)
        .build();

    let convergence = Convergence {
        outer_tolerance: config.outer_loop.tolerance,
        inner_tolerance: config.inner_loop.tolerance,
        maximum_outer_iterations: config.outer_loop.maximum_iterations,
        maximum_inner_iterations: config.inner_loop.maximum_iterations,
        calculation_type: calculation,
    };
    let electron_side = ElectronSide {
        system: tracker.electrons(),
        kernel: &electron_kernel,
        electric_term: &electron_electric,
        thermal_term: &electron_thermal,
    };
    let phonon_side = PhononSide {
        system: tracker.phonons(),
        kernel: &phonon_kernel,
        electric_term: &phonon_electric,
        thermal_term: &phonon_thermal,
    };

    let drag_engine = DragEngine::new(
        tracker.electron_mesh(),
        tracker.electrons(),
        tracker.phonon_mesh(),
        config.phonons.branches,
        &store,
        &electron_rates,
        communicator,
    );

    let mut outer_loop = OuterLoopBuilder::new()
        .with_convergence_settings(&convergence)
        .with_electrons(&electron_side)
        .with_phonons(&phonon_side)
        .with_conditions(electron_conditions)
        .build();
    if calculation == Calculation::Dragful {
        outer_loop.attach_drag_engine(&drag_engine);
    }

    let report = outer_loop.run_loop()?;

    let charge = T::from_f64(ELECTRON_CHARGE).unwrap();
    let electron = electron_coefficients(
        tracker.electrons(),
        outer_loop.electron_electric_response(),
        outer_loop.electron_thermal_response(),
        electron_conditions,
    );
    let phonon = phonon_coefficients(
        tracker.phonons(),
        outer_loop.phonon_thermal_response(),
        outer_loop.phonon_electric_response(),
        temperature,
    );
    let sigma_by_band = band_resolved_tensor(
        tracker.electrons(),
        outer_loop.electron_electric_response(),
        |_| charge,
    );
    let kappa_by_branch = band_resolved_tensor(
        tracker.phonons(),
        outer_loop.phonon_thermal_response(),
        |energy| energy,
    );

    let tables = SolutionTables {
        electron_electric: outer_loop.electron_electric_response().data().clone(),
        electron_thermal: outer_loop.electron_thermal_response().data().clone(),
        phonon_electric: outer_loop.phonon_electric_response().data().clone(),
        phonon_thermal: outer_loop.phonon_thermal_response().data().clone(),
        electron_rates: electron_rates.data().clone(),
        phonon_rates: phonon_rates.data().clone(),
    };

    Ok(TransportSolution {
        electron,
        phonon,
        sigma_by_band,
        kappa_by_branch,
        report,
        tables,
    })
}

fn surface_channel<T: Copy + RealField>(config: &Configuration<T>) -> Option<SurfaceChannel<T>> {
    if let Some(length) = config.scattering.grain_length {
        Some(SurfaceChannel::Grain { length })
    } else {
        config
            .scattering
            .film_thickness
            .map(|thickness| SurfaceChannel::Film { thickness })
    }
}

/// Print the isotropic averages of the solved tensors
fn report_solution<T>(
    solution: &TransportSolution<T>,
    term: &console::Term,
    styles: &Styles,
) -> color_eyre::Result<()>
where
    T: Copy + RealField + ToPrimitive,
{
    let as_f64 = |value: T| value.to_f64().unwrap_or(f64::NAN);
    term.write_line(&format!(
        "{}",
        format!(
            "  sigma   = {:.6e} S/m",
            as_f64(trace_average(&solution.electron.sigma))
        )
        .style(styles.tensor_style)
    ))?;
    term.write_line(&format!(
        "{}",
        format!(
            "  kappa_e = {:.6e} W/mK, kappa_ph = {:.6e} W/mK",
            as_f64(trace_average(&solution.electron.kappa_zero)),
            as_f64(trace_average(&solution.phonon.kappa))
        )
        .style(styles.tensor_style)
    ))?;
    term.write_line(&format!(
        "{}",
        format!(
            "  alpha/T = {:.6e} (electron) + {:.6e} (phonon)",
            as_f64(trace_average(&solution.electron.alpha_over_t)),
            as_f64(trace_average(&solution.phonon.alpha_over_t))
        )
        .style(styles.tensor_style)
    ))?;
    for (band, sigma) in solution.sigma_by_band.iter().enumerate() {
        tracing::info!(
            "band {band}: sigma = {:.6e} S/m",
            as_f64(trace_average(sigma))
        );
    }
    for (branch, kappa) in solution.kappa_by_branch.iter().enumerate() {
        tracing::info!(
            "branch {branch}: kappa = {:.6e} W/mK",
            as_f64(trace_average(kappa))
        );
    }
    if let Some(bisection) = solution.report.bisection {
        tracing::info!(
            "reciprocity rescale lambda = {:.6} after {} bisections",
            as_f64(bisection.lambda),
            bisection.iterations
        );
    }
    if !solution.report.converged {
        term.write_line(&format!(
            "{}",
            format!(
                "  the outer loop exhausted its {} iterations",
                solution.report.outer_iterations
            )
            .style(styles.warning_style)
        ))?;
    }
    Ok(())
}

/// Persist the solved responses under the stage label of the calculation
fn archive_solution<T>(
    config: &Configuration<T>,
    calculation: Calculation,
    kelvin: f64,
    solution: &TransportSolution<T>,
) -> color_eyre::Result<()>
where
    T: Copy + RealField + ToPrimitive,
{
    let archive = DirectoryArchive::at_temperature(Path::new(&config.archive.directory), kelvin)
        .map_err(EntrainError::Archive)?;
    let label = match calculation {
        Calculation::Dragless => RunLabel::NodragIterated(solution.report.outer_iterations),
        Calculation::Dragful => RunLabel::DragIterated(solution.report.outer_iterations),
    };

    let bands: Vec<usize> = (0..config.electrons.bands).collect();
    let branches: Vec<usize> = (0..config.phonons.branches).collect();
    archive.write(
        label,
        "electron_electric",
        &solution.tables.electron_electric,
        Some(&bands),
    )?;
    archive.write(
        label,
        "electron_thermal",
        &solution.tables.electron_thermal,
        Some(&bands),
    )?;
    archive.write(
        label,
        "phonon_electric",
        &solution.tables.phonon_electric,
        Some(&branches),
    )?;
    archive.write(
        label,
        "phonon_thermal",
        &solution.tables.phonon_thermal,
        Some(&branches),
    )?;
    archive.write(
        RunLabel::Rta,
        "electron_rates",
        &solution.tables.electron_rates,
        Some(&bands),
    )?;
    archive.write(
        RunLabel::Rta,
        "phonon_rates",
        &solution.tables.phonon_rates,
        Some(&branches),
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::{Calculation, TrackerBuilder};
    use super::{solve_at_temperature, Configuration};
    use crate::app::configuration::{
        ArchiveConfiguration, ElectronConfiguration, GlobalConfiguration, LoopConfiguration,
        MeshConfiguration, PhononConfiguration, ScatteringConfiguration, SweepConfiguration,
    };
    use crate::comms::SerialCommunicator;
    use crate::scattering::delta::DeltaRule;
    use crate::transport::trace_average;

    fn toy_configuration() -> Configuration<f64> {
        Configuration {
            global: GlobalConfiguration {
                number_of_ranks: 1,
                marker: std::marker::PhantomData,
            },
            mesh: MeshConfiguration {
                // The phonon mesh needs points away from the self-inverse
                // planes, where the group velocity vanishes
                electron_divisions: [4, 4, 4],
                phonon_divisions: [4, 4, 4],
                use_inversion: true,
            },
            electrons: ElectronConfiguration {
                effective_mass: 1.0,
                lattice_constant: 5e-10,
                band_separation: 1e-19,
                bands: 1,
                window_minimum: 0.0,
                window_maximum: 1e-18,
                spin_degeneracy: 2.0,
                chemical_potential: 5e-20,
            },
            phonons: PhononConfiguration {
                maximum_frequency: 5e13,
                branches: 1,
                branch_softening: 0.5,
            },
            scattering: ScatteringConfiguration {
                deformation_potential: 1e-2,
                impurity_strength: 1e-3,
                anharmonicity: 1e-3,
                mass_variance: 1e-4,
                delta_rule: DeltaRule::Gaussian,
                delta_width: 2e-20,
                grain_length: None,
                film_thickness: None,
            },
            sweep: SweepConfiguration {
                temperatures: vec![300.0],
                magnetic_field_strengths: vec![],
            },
            inner_loop: LoopConfiguration {
                maximum_iterations: 200,
                tolerance: 1e-4,
            },
            outer_loop: LoopConfiguration {
                maximum_iterations: 50,
                tolerance: 1e-3,
            },
            archive: ArchiveConfiguration {
                directory: String::new(),
            },
        }
    }

    #[test]
    fn a_dragless_solve_on_a_toy_crystal_converges() {
        let config = toy_configuration();
        let tracker = TrackerBuilder::new()
            .with_configuration(&config)
            .build()
            .unwrap();
        let solution = solve_at_temperature(
            &config,
            &tracker,
            Calculation::Dragless,
            300.0,
            None,
            &SerialCommunicator,
        )
        .unwrap();

        assert!(solution.report.converged);
        assert!(trace_average(&solution.electron.sigma) > 0.0);
        assert!(trace_average(&solution.phonon.kappa) > 0.0);
        // Without drag coupling the phonons never acquire an electric
        // response, so their cross coefficient stays pinned at zero
        assert_eq!(trace_average(&solution.phonon.alpha_over_t), 0.0);
    }
}
