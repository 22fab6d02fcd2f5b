//! Shared fixtures for the benchmarks: toy crystals on coarse meshes,
//! uniform rate tables, randomised responses and in-memory process stores.

pub mod stores;

use entrain_bte::carriers::model::{ParabolicBand, SineBranch};
use entrain_bte::carriers::{CarrierSystem, ElectronSystem, PhononSystem};
use entrain_bte::response::ResponseFunction;
use entrain_bte::scattering::RateTable;
use entrain_bzgrid::{BzMesh, SymmetryGroup};
use nalgebra::Vector3;
use ndarray::Array2;
use rand::{thread_rng, Rng};

/// A parabolic-band electron system on an inversion-symmetric mesh, with a
/// transport window wide enough to keep every state active
pub fn toy_electron_fixture(
    divisions: [usize; 3],
    bands: usize,
) -> (BzMesh<f64>, ElectronSystem<f64>) {
    let mesh = BzMesh::new(divisions, SymmetryGroup::with_inversion());
    let band = ParabolicBand {
        effective_mass: 1.0,
        lattice_constant: 5e-10,
        band_separation: 1e-19,
    };
    let system = band
        .system(&mesh, bands, 0.0..1e-17, 2.0)
        .expect("the toy band structure is valid");
    (mesh, system)
}

/// A sine-dispersion phonon system on an inversion-symmetric mesh
pub fn toy_phonon_fixture(
    divisions: [usize; 3],
    branches: usize,
) -> (BzMesh<f64>, PhononSystem<f64>) {
    let mesh = BzMesh::new(divisions, SymmetryGroup::with_inversion());
    let branch = SineBranch {
        maximum_frequency: 5e13,
        lattice_constant: 5e-10,
        branch_softening: 0.5,
    };
    let system = branch
        .system(&mesh, branches)
        .expect("the toy dispersion is valid");
    (mesh, system)
}

/// The same scattering rate at every irreducible state
pub fn uniform_rate_table(mesh: &BzMesh<f64>, bands: usize, rate: f64) -> RateTable<f64> {
    RateTable::new(Array2::from_elem(
        (mesh.num_irreducible_points(), bands),
        rate,
    ))
}

/// A response function with uniformly random vectors, for exercising sweeps
/// whose output value does not matter
pub fn random_response(system: &dyn CarrierSystem<f64>) -> ResponseFunction<f64> {
    let mut rng = thread_rng();
    let mut response = ResponseFunction::zeros(system.active_states());
    for active in 0..system.active_states() {
        response.set_vector(
            active,
            Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ),
        );
    }
    response
}
