//! On-the-fly process generation from the analytic model.
//!
//! Instead of reading persisted transition probabilities this store derives
//! them when asked, from deformation-potential style couplings between the
//! analytic band structures and the configured delta evaluator. It sits
//! behind the same traits as the disk store, so the collision kernels do not
//! know which one they are consuming.

use super::delta::DeltaEvaluator;
use super::processes::{
    ElectronElectronProcess, ImpurityProcess, MassDefectProcess, PhononElectronProcess,
    PhononMediatedProcess, PhononPartner, ThreePhononClass, ThreePhononProcess,
};
use super::store::{ElectronProcessStore, PhononProcessStore, StoreError};
use crate::carriers::{CarrierSystem, ElectronSystem, PhononSystem};
use crate::constants::BOLTZMANN;
use crate::error::BuildError;
use entrain_bzgrid::BzMesh;
use nalgebra::RealField;
use num_traits::ToPrimitive;

/// Model coupling strengths and the run conditions they are evaluated at
#[derive(Clone, Copy, Debug)]
pub struct ModelInteraction<T> {
    /// Electron-phonon coupling prefactor
    pub deformation_potential: T,
    /// Charged-impurity coupling prefactor
    pub impurity_strength: T,
    /// Three-phonon coupling prefactor
    pub anharmonicity: T,
    /// Mass-defect coupling prefactor
    pub mass_variance: T,
    /// Temperature in Kelvin
    pub temperature: T,
    /// Electron chemical potential in Joules
    pub chemical_potential: T,
}

/// A process store computing records on demand from the analytic model
pub struct OnTheFlyStore<'a, T: RealField> {
    electrons: &'a ElectronSystem<T>,
    phonons: &'a PhononSystem<T>,
    electron_mesh: &'a BzMesh<T>,
    phonon_mesh: &'a BzMesh<T>,
    delta: Box<dyn DeltaEvaluator<T>>,
    interaction: ModelInteraction<T>,
    /// Per-axis ratio between the electron and phonon mesh divisions
    scale: [usize; 3],
}

impl<'a, T: Copy + RealField + ToPrimitive> OnTheFlyStore<'a, T> {
    /// Build the generator. The electron mesh must be a per-axis multiple of
    /// the phonon mesh so momentum transfer stays on-grid.
    pub fn new(
        electrons: &'a ElectronSystem<T>,
        phonons: &'a PhononSystem<T>,
        electron_mesh: &'a BzMesh<T>,
        phonon_mesh: &'a BzMesh<T>,
        delta: Box<dyn DeltaEvaluator<T>>,
        interaction: ModelInteraction<T>,
    ) -> Result<Self, BuildError> {
        let mut scale = [0_usize; 3];
        for axis in 0..3 {
            let fine = electron_mesh.dimensions()[axis];
            let coarse = phonon_mesh.dimensions()[axis];
            if fine % coarse != 0 {
                return Err(BuildError::Extents(format!(
                    "electron mesh division {fine} is not a multiple of the phonon division {coarse}"
                )));
            }
            scale[axis] = fine / coarse;
        }
        Ok(Self {
            electrons,
            phonons,
            electron_mesh,
            phonon_mesh,
            delta,
            interaction,
            scale,
        })
    }

    fn bose(&self, energy: T) -> T {
        let thermal = T::from_f64(BOLTZMANN).unwrap() * self.interaction.temperature;
        T::one() / ((energy / thermal).exp() - T::one())
    }

    fn fermi(&self, energy: T) -> T {
        let thermal = T::from_f64(BOLTZMANN).unwrap() * self.interaction.temperature;
        T::one() / (((energy - self.interaction.chemical_potential) / thermal).exp() + T::one())
    }

    /// Local energy spread of a state, the band slope over one grid step
    fn spread(&self, system: &dyn CarrierSystem<T>, global_state: usize) -> T {
        let velocity = system.velocity(global_state);
        let step = system.grid_step();
        (velocity.x * step.x).abs() + (velocity.y * step.y).abs() + (velocity.z * step.z).abs()
    }

    /// Map a phonon-mesh wavevector onto the electron mesh
    fn refine(&self, phonon_wavevector: usize) -> usize {
        let coords = self.phonon_mesh.coords(phonon_wavevector);
        self.electron_mesh.index_of(&[
            coords[0] * self.scale[0],
            coords[1] * self.scale[1],
            coords[2] * self.scale[2],
        ])
    }

    /// Displace an electron wavevector by a phonon-mesh momentum transfer
    fn displace(&self, electron_wavevector: usize, phonon_wavevector: usize) -> usize {
        let k = self.electron_mesh.coords(electron_wavevector);
        let q = self.phonon_mesh.coords(phonon_wavevector);
        self.electron_mesh.index_of(&[
            k[0] + q[0] * self.scale[0],
            k[1] + q[1] * self.scale[1],
            k[2] + q[2] * self.scale[2],
        ])
    }

    fn check_electron_source(&self, state: usize) -> Result<(usize, usize), StoreError> {
        let bands = self.electrons.bands();
        let sources = self.electron_mesh.num_irreducible_points() * bands;
        if state >= sources {
            return Err(StoreError::UnknownState(state));
        }
        Ok((state / bands, state % bands))
    }

    fn check_phonon_source(&self, state: usize) -> Result<(usize, usize), StoreError> {
        let branches = self.phonons.bands();
        let sources = self.phonon_mesh.num_irreducible_points() * branches;
        if state >= sources {
            return Err(StoreError::UnknownState(state));
        }
        Ok((state / branches, state % branches))
    }

    /// A phonon partner on the electron mesh, folded onto the stored half
    /// zone through the odd parity of the response
    fn partner(&self, fine_wavevector: usize, branch: usize) -> PhononPartner {
        let branches = self.phonons.bands();
        let negated = self.electron_mesh.negative_index(fine_wavevector);
        if fine_wavevector <= negated {
            PhononPartner {
                state: fine_wavevector * branches + branch,
                reversed: false,
            }
        } else {
            PhononPartner {
                state: negated * branches + branch,
                reversed: true,
            }
        }
    }
}

impl<'a, T: Copy + RealField + ToPrimitive> ElectronProcessStore<T> for OnTheFlyStore<'a, T> {
    fn phonon_mediated(&self, state: usize) -> Result<Vec<PhononMediatedProcess<T>>, StoreError> {
        let (ik_ibz, band) = self.check_electron_source(state)?;
        let bands = self.electrons.bands();
        let branches = self.phonons.bands();
        let source = self.electron_mesh.representative(ik_ibz) * bands + band;
        let energy = self.electrons.energy(source);
        let coupling =
            self.interaction.deformation_potential * self.interaction.deformation_potential;

        let mut records = Vec::new();
        for iq in 0..self.phonon_mesh.num_points() {
            let displaced = self.displace(self.electron_mesh.representative(ik_ibz), iq);
            for branch in 0..branches {
                let quantum = self.phonons.energy(iq * branches + branch);
                if quantum <= T::zero() {
                    continue;
                }
                let occupation = self.bose(quantum);
                for final_band in 0..bands {
                    let final_global = displaced * bands + final_band;
                    let final_state = match self.electrons.active_index(final_global) {
                        Some(window) => window,
                        None => continue,
                    };
                    let spread = self.spread(self.electrons, final_global);
                    let final_energy = self.electrons.energy(final_global);
                    let absorption =
                        occupation * self.delta.weight(final_energy - energy - quantum, spread);
                    let emission = (occupation + T::one())
                        * self.delta.weight(final_energy - energy + quantum, spread);
                    let weight = coupling * quantum * (absorption + emission);
                    if weight == T::zero() {
                        continue;
                    }
                    records.push(PhononMediatedProcess {
                        final_state,
                        phonon: self.partner(self.refine(iq), branch),
                        weight,
                    });
                }
            }
        }
        Ok(records)
    }

    fn impurity(&self, state: usize) -> Result<Vec<ImpurityProcess<T>>, StoreError> {
        let (ik_ibz, band) = self.check_electron_source(state)?;
        let bands = self.electrons.bands();
        let source = self.electron_mesh.representative(ik_ibz) * bands + band;
        let energy = self.electrons.energy(source);

        let mut records = Vec::new();
        for final_global in 0..self.electron_mesh.num_points() * bands {
            if final_global == source {
                continue;
            }
            let final_state = match self.electrons.active_index(final_global) {
                Some(window) => window,
                None => continue,
            };
            let spread = self.spread(self.electrons, final_global);
            let weight = self.interaction.impurity_strength
                * self
                    .delta
                    .weight(self.electrons.energy(final_global) - energy, spread);
            if weight == T::zero() {
                continue;
            }
            records.push(ImpurityProcess {
                final_state,
                weight,
            });
        }
        Ok(records)
    }

    fn electron_electron(
        &self,
        state: usize,
    ) -> Result<Vec<ElectronElectronProcess<T>>, StoreError> {
        // The analytic model carries no four-state processes; a known state
        // legitimately has an empty record set
        self.check_electron_source(state)?;
        Ok(Vec::new())
    }
}

impl<'a, T: Copy + RealField + ToPrimitive> PhononProcessStore<T> for OnTheFlyStore<'a, T> {
    fn three_phonon(&self, state: usize) -> Result<Vec<ThreePhononProcess<T>>, StoreError> {
        let (iq_ibz, branch) = self.check_phonon_source(state)?;
        let branches = self.phonons.bands();
        let q1 = self.phonon_mesh.representative(iq_ibz);
        let quantum = self.phonons.energy(q1 * branches + branch);
        if quantum <= T::zero() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for iq2 in 0..self.phonon_mesh.num_points() {
            let c1 = self.phonon_mesh.coords(q1);
            let c2 = self.phonon_mesh.coords(iq2);
            let sum = self
                .phonon_mesh
                .index_of(&[c1[0] + c2[0], c1[1] + c2[1], c1[2] + c2[2]]);
            let dims = self.phonon_mesh.dimensions();
            let difference = self.phonon_mesh.index_of(&[
                c1[0] + dims[0] - c2[0],
                c1[1] + dims[1] - c2[1],
                c1[2] + dims[2] - c2[2],
            ]);
            for branch2 in 0..branches {
                let quantum2 = self.phonons.energy(iq2 * branches + branch2);
                if quantum2 <= T::zero() {
                    continue;
                }
                let occupation2 = self.bose(quantum2);
                for branch3 in 0..branches {
                    // Combination: q + q2 -> q3 with q3 = q + q2
                    let plus_global = sum * branches + branch3;
                    let plus_energy = self.phonons.energy(plus_global);
                    if plus_energy > T::zero() {
                        let spread = self.spread(self.phonons, plus_global);
                        let weight = self.interaction.anharmonicity
                            * occupation2
                            * self
                                .delta
                                .weight(plus_energy - quantum - quantum2, spread);
                        if weight != T::zero() {
                            records.push(ThreePhononProcess {
                                class: ThreePhononClass::Plus,
                                q2: iq2 * branches + branch2,
                                q3: plus_global,
                                weight,
                            });
                        }
                    }
                    // Decay: q -> q2 + q3 with q3 = q - q2
                    let minus_global = difference * branches + branch3;
                    let minus_energy = self.phonons.energy(minus_global);
                    if minus_energy > T::zero() {
                        let spread = self.spread(self.phonons, minus_global);
                        let weight = self.interaction.anharmonicity
                            * (occupation2 + T::one())
                            * self
                                .delta
                                .weight(quantum - quantum2 - minus_energy, spread);
                        if weight != T::zero() {
                            records.push(ThreePhononProcess {
                                class: ThreePhononClass::Minus,
                                q2: iq2 * branches + branch2,
                                q3: minus_global,
                                weight,
                            });
                        }
                    }
                }
            }
        }
        Ok(records)
    }

    fn mass_defect(&self, state: usize) -> Result<Vec<MassDefectProcess<T>>, StoreError> {
        let (iq_ibz, branch) = self.check_phonon_source(state)?;
        let branches = self.phonons.bands();
        let source = self.phonon_mesh.representative(iq_ibz) * branches + branch;
        let quantum = self.phonons.energy(source);
        if quantum <= T::zero() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for partner in 0..self.phonon_mesh.num_points() * branches {
            if partner == source {
                continue;
            }
            let spread = self.spread(self.phonons, partner);
            let weight = self.interaction.mass_variance
                * quantum
                * quantum
                * self.delta.weight(self.phonons.energy(partner) - quantum, spread);
            if weight != T::zero() {
                records.push(MassDefectProcess { partner, weight });
            }
        }
        Ok(records)
    }

    fn phonon_electron(
        &self,
        state: usize,
    ) -> Result<Vec<PhononElectronProcess<T>>, StoreError> {
        let (iq_ibz, branch) = self.check_phonon_source(state)?;
        let branches = self.phonons.bands();
        let bands = self.electrons.bands();
        let iq = self.phonon_mesh.representative(iq_ibz);
        let quantum = self.phonons.energy(iq * branches + branch);
        if quantum <= T::zero() {
            return Ok(Vec::new());
        }
        let coupling =
            self.interaction.deformation_potential * self.interaction.deformation_potential;

        let mut records = Vec::new();
        for ik in 0..self.electron_mesh.num_points() {
            let displaced = self.displace(ik, iq);
            for band in 0..bands {
                let initial_global = ik * bands + band;
                let initial = match self.electrons.active_index(initial_global) {
                    Some(window) => window,
                    None => continue,
                };
                for final_band in 0..bands {
                    let final_global = displaced * bands + final_band;
                    let final_state = match self.electrons.active_index(final_global) {
                        Some(window) => window,
                        None => continue,
                    };
                    let initial_energy = self.electrons.energy(initial_global);
                    let final_energy = self.electrons.energy(final_global);
                    let spread = self.spread(self.electrons, final_global);
                    let balance =
                        self.fermi(initial_energy) * (T::one() - self.fermi(final_energy));
                    let weight = coupling
                        * quantum
                        * balance
                        * self
                            .delta
                            .weight(final_energy - initial_energy - quantum, spread);
                    if weight != T::zero() {
                        records.push(PhononElectronProcess {
                            initial,
                            final_state,
                            weight,
                        });
                    }
                }
            }
        }
        Ok(records)
    }
}
