//! Carrier systems: the electronic and vibrational band structures consumed
//! by the solver.
//!
//! Energies and group velocities are collaborator-provided, per-state and
//! read-only to the core. States are addressed by a flat id
//! `ik * bands + ib` over the full mesh; the electron system additionally
//! restricts transport to an energy window, with a sorted active-state list
//! mapping global ids onto the window-restricted index space.

pub mod model;

use crate::error::BuildError;
use nalgebra::{RealField, Vector3};
use ndarray::{Array2, Array3};
use std::ops::Range;

/// The two particle species coupled by the solver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Species {
    /// Charge carriers
    Electron,
    /// Lattice vibrations
    Phonon,
}

/// The read-only band-structure interface consumed by field-term
/// construction, the collision kernels and the transport sums
pub trait CarrierSystem<T>: Send + Sync
where
    T: Copy + RealField,
{
    /// Which species this system describes
    fn species(&self) -> Species;
    /// Bands (electrons) or branches (phonons) per wavevector
    fn bands(&self) -> usize;
    /// Points on the full wavevector mesh
    fn num_wavevectors(&self) -> usize;
    /// Energy of a full-mesh state, addressed by flat global id
    fn energy(&self, global_state: usize) -> T;
    /// Group velocity of a full-mesh state
    fn velocity(&self, global_state: usize) -> Vector3<T>;
    /// Number of states participating in transport
    fn active_states(&self) -> usize;
    /// Map a global state id into the transport-restricted index space.
    /// States outside the energy window are absent.
    fn active_index(&self, global_state: usize) -> Option<usize>;
    /// Inverse of [`CarrierSystem::active_index`]
    fn global_state(&self, active_index: usize) -> usize;
    /// Degeneracy carried by each state (spin for electrons)
    fn degeneracy(&self) -> T;
    /// Primitive-cell volume entering the Brillouin-zone sums
    fn cell_volume(&self) -> T;
    /// Cartesian wavevector spacing along each mesh axis
    fn grid_step(&self) -> Vector3<T>;
}

/// The electronic band structure on the full mesh, restricted to a transport
/// energy window
pub struct ElectronSystem<T: RealField> {
    energies: Array2<T>,
    velocities: Array3<T>,
    window: EnergyWindow<T>,
    spin_degeneracy: T,
    cell_volume: T,
    grid_step: Vector3<T>,
}

impl<T: Copy + RealField> ElectronSystem<T> {
    /// Build the system, checking the energy and velocity tables agree on
    /// their extents and listing the states inside the transport window
    pub fn new(
        energies: Array2<T>,
        velocities: Array3<T>,
        window: Range<T>,
        spin_degeneracy: T,
        cell_volume: T,
        grid_step: Vector3<T>,
    ) -> Result<Self, BuildError> {
        let (num_wavevectors, bands) = energies.dim();
        if velocities.dim() != (num_wavevectors, bands, 3) {
            return Err(BuildError::Extents(format!(
                "velocity table has extents {:?}, expected ({num_wavevectors}, {bands}, 3)",
                velocities.dim()
            )));
        }
        let window = EnergyWindow::new(&energies, window);
        Ok(Self {
            energies,
            velocities,
            window,
            spin_degeneracy,
            cell_volume,
            grid_step,
        })
    }

    /// The transport energy window
    pub fn window(&self) -> &EnergyWindow<T> {
        &self.window
    }
}

impl<T: Copy + RealField> CarrierSystem<T> for ElectronSystem<T>
where
    T: Send + Sync,
{
    fn species(&self) -> Species {
        Species::Electron
    }

    fn bands(&self) -> usize {
        self.energies.dim().1
    }

    fn num_wavevectors(&self) -> usize {
        self.energies.dim().0
    }

    fn energy(&self, global_state: usize) -> T {
        let bands = self.bands();
        self.energies[(global_state / bands, global_state % bands)]
    }

    fn velocity(&self, global_state: usize) -> Vector3<T> {
        let bands = self.bands();
        let (ik, ib) = (global_state / bands, global_state % bands);
        Vector3::new(
            self.velocities[(ik, ib, 0)],
            self.velocities[(ik, ib, 1)],
            self.velocities[(ik, ib, 2)],
        )
    }

    fn active_states(&self) -> usize {
        self.window.len()
    }

    fn active_index(&self, global_state: usize) -> Option<usize> {
        self.window.window_index(global_state)
    }

    fn global_state(&self, active_index: usize) -> usize {
        self.window.global_index(active_index)
    }

    fn degeneracy(&self) -> T {
        self.spin_degeneracy
    }

    fn cell_volume(&self) -> T {
        self.cell_volume
    }

    fn grid_step(&self) -> Vector3<T> {
        self.grid_step
    }
}

/// The transport energy window: the sorted list of global state ids whose
/// energies fall inside the configured range, searched by bisection
pub struct EnergyWindow<T> {
    range: Range<T>,
    active: Vec<usize>,
}

impl<T: Copy + RealField> EnergyWindow<T> {
    fn new(energies: &Array2<T>, range: Range<T>) -> Self {
        let (num_wavevectors, bands) = energies.dim();
        let active = (0..num_wavevectors * bands)
            .filter(|&state| {
                let energy = energies[(state / bands, state % bands)];
                energy >= range.start && energy < range.end
            })
            .collect();
        Self { range, active }
    }

    /// The energy range spanned by the window
    pub fn range(&self) -> &Range<T> {
        &self.range
    }

    /// Number of states inside the window
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Window-restricted index of a global state, if it lies in the window
    pub fn window_index(&self, global_state: usize) -> Option<usize> {
        self.active.binary_search(&global_state).ok()
    }

    /// Global state id of a window entry
    pub fn global_index(&self, window_index: usize) -> usize {
        self.active[window_index]
    }
}

/// The vibrational band structure on the full mesh. Every state participates
/// in transport and the chemical potential is identically zero.
pub struct PhononSystem<T: RealField> {
    energies: Array2<T>,
    velocities: Array3<T>,
    cell_volume: T,
    grid_step: Vector3<T>,
}

impl<T: Copy + RealField> PhononSystem<T> {
    /// Build the system, checking extents between the tables
    pub fn new(
        energies: Array2<T>,
        velocities: Array3<T>,
        cell_volume: T,
        grid_step: Vector3<T>,
    ) -> Result<Self, BuildError> {
        let (num_wavevectors, branches) = energies.dim();
        if velocities.dim() != (num_wavevectors, branches, 3) {
            return Err(BuildError::Extents(format!(
                "velocity table has extents {:?}, expected ({num_wavevectors}, {branches}, 3)",
                velocities.dim()
            )));
        }
        Ok(Self {
            energies,
            velocities,
            cell_volume,
            grid_step,
        })
    }
}

impl<T: Copy + RealField> CarrierSystem<T> for PhononSystem<T>
where
    T: Send + Sync,
{
    fn species(&self) -> Species {
        Species::Phonon
    }

    fn bands(&self) -> usize {
        self.energies.dim().1
    }

    fn num_wavevectors(&self) -> usize {
        self.energies.dim().0
    }

    fn energy(&self, global_state: usize) -> T {
        let branches = self.bands();
        self.energies[(global_state / branches, global_state % branches)]
    }

    fn velocity(&self, global_state: usize) -> Vector3<T> {
        let branches = self.bands();
        let (iq, ib) = (global_state / branches, global_state % branches);
        Vector3::new(
            self.velocities[(iq, ib, 0)],
            self.velocities[(iq, ib, 1)],
            self.velocities[(iq, ib, 2)],
        )
    }

    fn active_states(&self) -> usize {
        self.energies.len()
    }

    fn active_index(&self, global_state: usize) -> Option<usize> {
        (global_state < self.energies.len()).then(|| global_state)
    }

    fn global_state(&self, active_index: usize) -> usize {
        active_index
    }

    fn degeneracy(&self) -> T {
        T::one()
    }

    fn cell_volume(&self) -> T {
        self.cell_volume
    }

    fn grid_step(&self) -> Vector3<T> {
        self.grid_step
    }
}

#[cfg(test)]
mod test {
    use super::{CarrierSystem, ElectronSystem};
    use nalgebra::Vector3;
    use ndarray::{Array2, Array3};

    #[test]
    fn window_lookup_round_trips_through_the_global_index() {
        let energies =
            Array2::from_shape_fn((4, 2), |(ik, ib)| 0.1 * ik as f64 + 0.05 * ib as f64);
        let velocities = Array3::zeros((4, 2, 3));
        let system = ElectronSystem::new(
            energies,
            velocities,
            0.1..0.3,
            2.0,
            1.0,
            Vector3::from_element(1.0),
        )
        .unwrap();
        assert!(system.active_states() > 0);
        for window_index in 0..system.active_states() {
            let global = system.global_state(window_index);
            assert_eq!(system.active_index(global), Some(window_index));
        }
    }

    #[test]
    fn out_of_window_states_are_absent() {
        let energies = Array2::from_shape_fn((2, 1), |(ik, _)| ik as f64);
        let velocities = Array3::zeros((2, 1, 3));
        let system = ElectronSystem::new(
            energies,
            velocities,
            0.5..1.5,
            2.0,
            1.0,
            Vector3::from_element(1.0),
        )
        .unwrap();
        assert_eq!(system.active_index(0), None);
        assert_eq!(system.active_index(1), Some(0));
    }

    #[test]
    fn mismatched_velocity_extents_are_rejected() {
        let energies = Array2::zeros((4, 2));
        let velocities = Array3::zeros((4, 3, 3));
        assert!(ElectronSystem::new(
            energies,
            velocities,
            0.0..1.0,
            2.0,
            1.0,
            Vector3::from_element(1.0_f64),
        )
        .is_err());
    }
}
