//! Analytic model band structures.
//!
//! These generators make the binary runnable without external ab-initio
//! data: a periodic parabolic conduction band for the electrons and a
//! sine-dispersion acoustic branch for the phonons, both evaluated over a
//! cubic cell. They make no claim to ab-initio accuracy.

use super::{ElectronSystem, PhononSystem};
use crate::constants::{ELECTRON_MASS, HBAR};
use crate::error::BuildError;
use entrain_bzgrid::BzMesh;
use nalgebra::{RealField, Vector3};
use ndarray::{Array2, Array3};
use num_traits::ToPrimitive;
use std::ops::Range;

/// An isotropic parabolic conduction band over a cubic cell
pub struct ParabolicBand<T> {
    /// Effective mass in units of the bare electron mass
    pub effective_mass: T,
    /// Cubic lattice constant in metres
    pub lattice_constant: T,
    /// Energy offset between successive bands in Joules
    pub band_separation: T,
}

impl<T: Copy + RealField + ToPrimitive> ParabolicBand<T> {
    /// Evaluate the band structure on a mesh. Band `n` is the periodic
    /// continuation of the parabola shifted up by `n` band separations:
    /// each axis contributes through `sin(k a / 2)`, which matches the bare
    /// wavevector near the zone centre. The group velocity is odd in `k`
    /// and vanishes at the zone centre and on the boundary planes, as a
    /// periodic even dispersion requires.
    #[numeric_literals::replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn system(
        &self,
        mesh: &BzMesh<T>,
        bands: usize,
        window: Range<T>,
        spin_degeneracy: T,
    ) -> Result<ElectronSystem<T>, BuildError> {
        let mass = self.effective_mass * T::from_f64(ELECTRON_MASS).unwrap();
        let hbar = T::from_f64(HBAR).unwrap();

        let num_points = mesh.num_points();
        let mut energies = Array2::from_elem((num_points, bands), T::zero());
        let mut velocities = Array3::from_elem((num_points, bands, 3), T::zero());
        for index in 0..num_points {
            let folded = mesh.folded_point(index);
            let mut kinetic = T::zero();
            let mut velocity = Vector3::zeros();
            for axis in 0..3 {
                // folded coordinates lie in [-1/2, 1/2), so the half-phase
                // k a / 2 is pi times the coordinate
                let phase = T::pi() * folded[axis];
                let periodic = 2.0 * phase.sin() / self.lattice_constant;
                kinetic += hbar * hbar * periodic * periodic / (2.0 * mass);
                velocity[axis] = hbar * (2.0 * phase).sin() / (mass * self.lattice_constant);
            }
            for band in 0..bands {
                energies[(index, band)] = kinetic + T::from_usize(band).unwrap() * self.band_separation;
                for axis in 0..3 {
                    velocities[(index, band, axis)] = velocity[axis];
                }
            }
        }

        ElectronSystem::new(
            energies,
            velocities,
            window,
            spin_degeneracy,
            self.cell_volume(),
            self.grid_step(mesh),
        )
    }

    fn cell_volume(&self) -> T {
        self.lattice_constant * self.lattice_constant * self.lattice_constant
    }

    #[numeric_literals::replace_float_literals(T::from_f64(literal).unwrap())]
    fn grid_step(&self, mesh: &BzMesh<T>) -> Vector3<T> {
        let reciprocal = 2.0 * T::pi() / self.lattice_constant;
        Vector3::new(
            reciprocal / T::from_usize(mesh.dimensions()[0]).unwrap(),
            reciprocal / T::from_usize(mesh.dimensions()[1]).unwrap(),
            reciprocal / T::from_usize(mesh.dimensions()[2]).unwrap(),
        )
    }
}

/// A sine-dispersion branch, linear near the zone centre and flat at the
/// boundary
pub struct SineBranch<T> {
    /// Zone-boundary angular frequency in radians per second
    pub maximum_frequency: T,
    /// Cubic lattice constant in metres
    pub lattice_constant: T,
    /// Frequency scaling between successive branches
    pub branch_softening: T,
}

impl<T: Copy + RealField + ToPrimitive> SineBranch<T> {
    /// Evaluate the dispersion on a mesh. Energies are stored as the phonon
    /// quantum `hbar omega` with each axis entering through `sin(q a / 2)`,
    /// so the dispersion is periodic, linear near the zone centre and
    /// reaches `maximum_frequency` at the cube corner. The group velocity
    /// `d omega / dq` is odd in `q` and vanishes on the boundary planes.
    #[numeric_literals::replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn system(&self, mesh: &BzMesh<T>, branches: usize) -> Result<PhononSystem<T>, BuildError> {
        let hbar = T::from_f64(HBAR).unwrap();
        let reciprocal = 2.0 * T::pi() / self.lattice_constant;

        let num_points = mesh.num_points();
        let mut energies = Array2::from_elem((num_points, branches), T::zero());
        let mut velocities = Array3::from_elem((num_points, branches, 3), T::zero());
        for index in 0..num_points {
            let folded = mesh.folded_point(index);
            let mut axial = Vector3::zeros();
            let mut doubled = Vector3::zeros();
            for axis in 0..3 {
                let phase = T::pi() * folded[axis];
                axial[axis] = phase.sin();
                doubled[axis] = (2.0 * phase).sin();
            }
            let envelope = axial.norm() / 3.0.sqrt();
            let mut scale = T::one();
            for branch in 0..branches {
                let omega = self.maximum_frequency * scale * envelope;
                energies[(index, branch)] = hbar * omega;
                if envelope > T::zero() {
                    let prefactor = self.maximum_frequency * scale * self.lattice_constant
                        / (4.0 * 3.0.sqrt() * axial.norm());
                    for axis in 0..3 {
                        velocities[(index, branch, axis)] = prefactor * doubled[axis];
                    }
                }
                scale *= self.branch_softening;
            }
        }

        PhononSystem::new(
            energies,
            velocities,
            self.lattice_constant * self.lattice_constant * self.lattice_constant,
            Vector3::new(
                reciprocal / T::from_usize(mesh.dimensions()[0]).unwrap(),
                reciprocal / T::from_usize(mesh.dimensions()[1]).unwrap(),
                reciprocal / T::from_usize(mesh.dimensions()[2]).unwrap(),
            ),
        )
    }
}

#[cfg(test)]
mod test {
    use super::{ParabolicBand, SineBranch};
    use crate::carriers::CarrierSystem;
    use approx::assert_relative_eq;
    use entrain_bzgrid::{BzMesh, SymmetryGroup};

    #[test]
    fn band_energy_vanishes_at_the_zone_centre() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let system = band.system(&mesh, 2, 0.0..1.0, 2.0).unwrap();
        assert_relative_eq!(system.energy(0), 0.0);
        assert_relative_eq!(system.energy(1), 1e-20);
    }

    #[test]
    fn group_velocity_vanishes_at_self_inverse_points() {
        // On an even mesh every coordinate in {0, 1/2} folds onto itself
        // under inversion; an even periodic dispersion has zero slope there
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::with_inversion());
        let band = ParabolicBand {
            effective_mass: 0.2,
            lattice_constant: 5e-10,
            band_separation: 1e-20,
        };
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let electrons = band.system(&mesh, 2, 0.0..1.0, 2.0).unwrap();
        let phonons = branch.system(&mesh, 1).unwrap();
        let mut seen = 0;
        for index in 0..mesh.num_points() {
            if mesh.negative_index(index) != index {
                continue;
            }
            seen += 1;
            for band_index in 0..2 {
                assert_relative_eq!(
                    electrons.velocity(index * 2 + band_index).norm(),
                    0.0,
                    epsilon = 1e-6
                );
            }
            assert_relative_eq!(phonons.velocity(index).norm(), 0.0, epsilon = 1e-9);
        }
        assert_eq!(seen, 8);
    }

    #[test]
    fn sine_branch_is_odd_under_wavevector_reversal() {
        // Odd dimensions so no point other than the zone centre is its own
        // time-reversed image
        let mesh: BzMesh<f64> = BzMesh::new([3, 3, 3], SymmetryGroup::identity());
        let branch = SineBranch {
            maximum_frequency: 5e13,
            lattice_constant: 5e-10,
            branch_softening: 0.5,
        };
        let system = branch.system(&mesh, 1).unwrap();
        for index in 0..mesh.num_points() {
            let negated = mesh.negative_index(index);
            assert_relative_eq!(system.energy(index), system.energy(negated), epsilon = 1e-30);
            let forward = system.velocity(index);
            let backward = system.velocity(negated);
            assert_relative_eq!(forward.x, -backward.x, epsilon = 1e-6);
        }
    }
}
