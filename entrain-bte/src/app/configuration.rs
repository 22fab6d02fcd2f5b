use crate::scattering::DeltaRule;
use color_eyre::eyre::eyre;
use config::{Config, File};
use serde::{de::DeserializeOwned, Deserialize};
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[allow(unused)]
pub(crate) struct Configuration<T> {
    pub(crate) global: GlobalConfiguration<T>,
    pub(crate) mesh: MeshConfiguration,
    pub(crate) electrons: ElectronConfiguration<T>,
    pub(crate) phonons: PhononConfiguration<T>,
    pub(crate) scattering: ScatteringConfiguration<T>,
    pub(crate) sweep: SweepConfiguration<T>,
    pub(crate) inner_loop: LoopConfiguration<T>,
    pub(crate) outer_loop: LoopConfiguration<T>,
    pub(crate) archive: ArchiveConfiguration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GlobalConfiguration<T> {
    /// Communicator ranks the zone sweeps are partitioned over
    pub(crate) number_of_ranks: usize,
    #[serde(skip)]
    pub(crate) marker: std::marker::PhantomData<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeshConfiguration {
    pub(crate) electron_divisions: [usize; 3],
    pub(crate) phonon_divisions: [usize; 3],
    pub(crate) use_inversion: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ElectronConfiguration<T> {
    pub(crate) effective_mass: T,
    pub(crate) lattice_constant: T,
    pub(crate) band_separation: T,
    pub(crate) bands: usize,
    pub(crate) window_minimum: T,
    pub(crate) window_maximum: T,
    pub(crate) spin_degeneracy: T,
    pub(crate) chemical_potential: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PhononConfiguration<T> {
    pub(crate) maximum_frequency: T,
    pub(crate) branches: usize,
    pub(crate) branch_softening: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScatteringConfiguration<T> {
    pub(crate) deformation_potential: T,
    pub(crate) impurity_strength: T,
    pub(crate) anharmonicity: T,
    pub(crate) mass_variance: T,
    pub(crate) delta_rule: DeltaRule,
    pub(crate) delta_width: T,
    /// Casimir grain size; absent means no grain-boundary channel
    pub(crate) grain_length: Option<T>,
    /// Thin-film thickness; absent means bulk
    pub(crate) film_thickness: Option<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SweepConfiguration<T> {
    pub(crate) temperatures: Vec<T>,
    /// Magnetic field strengths along z for the Hall sweep, may be empty
    pub(crate) magnetic_field_strengths: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoopConfiguration<T> {
    pub(crate) maximum_iterations: usize,
    pub(crate) tolerance: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveConfiguration {
    pub(crate) directory: String,
}

impl<T: DeserializeOwned> Configuration<T> {
    pub(crate) fn build(overlay: Option<&Path>) -> color_eyre::Result<Self> {
        // If I am running it here we should automatically be more debuggy
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // The default settings for the simulation which we use in the general case
            .add_source(File::with_name("../.config/default"))
            // The override settings which may be set by the user, optional
            .add_source(File::with_name(&format!("../.config/{}", run_mode)).required(false));
        // A run file passed on the command line overrides both
        if let Some(path) = overlay {
            builder = builder.add_source(File::from(path));
        }
        let s = builder.build()?;

        s.try_deserialize()
            .map_err(|e| eyre!(format!("Failed to deserialize the config file: {:?}", e)))
    }
}
