//! The tracker owns the meshes and carrier systems of one run.

use super::Configuration;
use crate::carriers::model::{ParabolicBand, SineBranch};
use crate::carriers::{ElectronSystem, PhononSystem};
use crate::error::BuildError;
use entrain_bzgrid::{BzMesh, SymmetryGroup};
use nalgebra::RealField;
use num_traits::ToPrimitive;
use std::marker::PhantomData;

pub(crate) struct TrackerBuilder<T, RefConfiguration> {
    configuration: RefConfiguration,
    /// Build the meshes with the trivial point group even when the
    /// configuration asks for inversion, required once a magnetic field
    /// breaks the symmetry
    force_trivial_group: bool,
    marker: PhantomData<T>,
}

impl<T> TrackerBuilder<T, ()> {
    pub(crate) fn new() -> Self {
        Self {
            configuration: (),
            force_trivial_group: false,
            marker: PhantomData,
        }
    }
}

impl<T, RefConfiguration> TrackerBuilder<T, RefConfiguration> {
    pub(crate) fn with_configuration(
        self,
        configuration: &Configuration<T>,
    ) -> TrackerBuilder<T, &Configuration<T>> {
        TrackerBuilder {
            configuration,
            force_trivial_group: self.force_trivial_group,
            marker: PhantomData,
        }
    }

    pub(crate) fn forcing_trivial_group(mut self) -> Self {
        self.force_trivial_group = true;
        self
    }
}

pub(crate) struct Tracker<T: RealField> {
    electron_mesh: BzMesh<T>,
    phonon_mesh: BzMesh<T>,
    electrons: ElectronSystem<T>,
    phonons: PhononSystem<T>,
}

impl<'a, T: Copy + RealField + ToPrimitive> TrackerBuilder<T, &'a Configuration<T>> {
    #[tracing::instrument(name = "Tracker builder", level = "info", skip(self))]
    pub(crate) fn build(self) -> Result<Tracker<T>, BuildError> {
        let configuration = self.configuration;
        let group = if configuration.mesh.use_inversion && !self.force_trivial_group {
            SymmetryGroup::with_inversion()
        } else {
            SymmetryGroup::identity()
        };
        let electron_mesh = BzMesh::new(configuration.mesh.electron_divisions, group.clone());
        let phonon_mesh = BzMesh::new(configuration.mesh.phonon_divisions, group);

        let band = ParabolicBand {
            effective_mass: configuration.electrons.effective_mass,
            lattice_constant: configuration.electrons.lattice_constant,
            band_separation: configuration.electrons.band_separation,
        };
        let electrons = band.system(
            &electron_mesh,
            configuration.electrons.bands,
            configuration.electrons.window_minimum..configuration.electrons.window_maximum,
            configuration.electrons.spin_degeneracy,
        )?;

        let branch = SineBranch {
            maximum_frequency: configuration.phonons.maximum_frequency,
            lattice_constant: configuration.electrons.lattice_constant,
            branch_softening: configuration.phonons.branch_softening,
        };
        let phonons = branch.system(&phonon_mesh, configuration.phonons.branches)?;

        Ok(Tracker {
            electron_mesh,
            phonon_mesh,
            electrons,
            phonons,
        })
    }
}

impl<T: Copy + RealField> Tracker<T> {
    pub(crate) fn electron_mesh(&self) -> &BzMesh<T> {
        &self.electron_mesh
    }

    pub(crate) fn phonon_mesh(&self) -> &BzMesh<T> {
        &self.phonon_mesh
    }

    pub(crate) fn electrons(&self) -> &ElectronSystem<T> {
        &self.electrons
    }

    pub(crate) fn phonons(&self) -> &PhononSystem<T> {
        &self.phonons
    }
}
