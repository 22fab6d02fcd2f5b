//! In-memory process stores.
//!
//! The production stores either read persisted records or generate them
//! from the analytic model; these hold hand-built record sets in hash maps
//! so a benchmark or test controls exactly which transitions exist.

use entrain_bte::scattering::{
    ElectronElectronProcess, ElectronProcessStore, ImpurityProcess, MassDefectProcess,
    PhononElectronProcess, PhononMediatedProcess, PhononProcessStore, StoreError,
    ThreePhononProcess,
};
use std::collections::HashMap;

/// An electron store backed by hash maps. States below `num_sources` with
/// no inserted records resolve to empty lists, matching the store contract.
pub struct InMemoryElectronStore<T> {
    num_sources: usize,
    phonon_mediated: HashMap<usize, Vec<PhononMediatedProcess<T>>>,
    impurity: HashMap<usize, Vec<ImpurityProcess<T>>>,
    electron_electron: HashMap<usize, Vec<ElectronElectronProcess<T>>>,
}

impl<T> InMemoryElectronStore<T> {
    /// An empty store serving `num_sources` irreducible source states
    pub fn new(num_sources: usize) -> Self {
        Self {
            num_sources,
            phonon_mediated: HashMap::new(),
            impurity: HashMap::new(),
            electron_electron: HashMap::new(),
        }
    }

    /// Attach phonon-mediated records to a source state
    pub fn insert_phonon_mediated(
        &mut self,
        state: usize,
        processes: Vec<PhononMediatedProcess<T>>,
    ) {
        self.phonon_mediated.insert(state, processes);
    }

    /// Attach impurity records to a source state
    pub fn insert_impurity(&mut self, state: usize, processes: Vec<ImpurityProcess<T>>) {
        self.impurity.insert(state, processes);
    }

    /// Attach electron-electron records to a source state
    pub fn insert_electron_electron(
        &mut self,
        state: usize,
        processes: Vec<ElectronElectronProcess<T>>,
    ) {
        self.electron_electron.insert(state, processes);
    }

    fn check(&self, state: usize) -> Result<(), StoreError> {
        if state < self.num_sources {
            Ok(())
        } else {
            Err(StoreError::UnknownState(state))
        }
    }
}

impl<T: Copy + Send + Sync> ElectronProcessStore<T> for InMemoryElectronStore<T> {
    fn phonon_mediated(&self, state: usize) -> Result<Vec<PhononMediatedProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self.phonon_mediated.get(&state).cloned().unwrap_or_default())
    }

    fn impurity(&self, state: usize) -> Result<Vec<ImpurityProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self.impurity.get(&state).cloned().unwrap_or_default())
    }

    fn electron_electron(
        &self,
        state: usize,
    ) -> Result<Vec<ElectronElectronProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self
            .electron_electron
            .get(&state)
            .cloned()
            .unwrap_or_default())
    }
}

/// A phonon store backed by hash maps
pub struct InMemoryPhononStore<T> {
    num_sources: usize,
    three_phonon: HashMap<usize, Vec<ThreePhononProcess<T>>>,
    mass_defect: HashMap<usize, Vec<MassDefectProcess<T>>>,
    phonon_electron: HashMap<usize, Vec<PhononElectronProcess<T>>>,
}

impl<T> InMemoryPhononStore<T> {
    /// An empty store serving `num_sources` irreducible source states
    pub fn new(num_sources: usize) -> Self {
        Self {
            num_sources,
            three_phonon: HashMap::new(),
            mass_defect: HashMap::new(),
            phonon_electron: HashMap::new(),
        }
    }

    /// Attach three-phonon records to a source state
    pub fn insert_three_phonon(&mut self, state: usize, processes: Vec<ThreePhononProcess<T>>) {
        self.three_phonon.insert(state, processes);
    }

    /// Attach mass-defect records to a source state
    pub fn insert_mass_defect(&mut self, state: usize, processes: Vec<MassDefectProcess<T>>) {
        self.mass_defect.insert(state, processes);
    }

    /// Attach phonon-electron records to a source state
    pub fn insert_phonon_electron(
        &mut self,
        state: usize,
        processes: Vec<PhononElectronProcess<T>>,
    ) {
        self.phonon_electron.insert(state, processes);
    }

    fn check(&self, state: usize) -> Result<(), StoreError> {
        if state < self.num_sources {
            Ok(())
        } else {
            Err(StoreError::UnknownState(state))
        }
    }
}

impl<T: Copy + Send + Sync> PhononProcessStore<T> for InMemoryPhononStore<T> {
    fn three_phonon(&self, state: usize) -> Result<Vec<ThreePhononProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self.three_phonon.get(&state).cloned().unwrap_or_default())
    }

    fn mass_defect(&self, state: usize) -> Result<Vec<MassDefectProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self.mass_defect.get(&state).cloned().unwrap_or_default())
    }

    fn phonon_electron(
        &self,
        state: usize,
    ) -> Result<Vec<PhononElectronProcess<T>>, StoreError> {
        self.check(state)?;
        Ok(self.phonon_electron.get(&state).cloned().unwrap_or_default())
    }
}
