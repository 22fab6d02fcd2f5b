use super::processes::{
    ElectronElectronProcess, ImpurityProcess, MassDefectProcess, PhononElectronProcess,
    PhononMediatedProcess, ThreePhononProcess,
};
use miette::Diagnostic;

/// Failures raised by the keyed process stores. A lookup for a state the
/// store has never seen is fatal: it means the scattering data and the band
/// structure disagree about which states exist.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum StoreError {
    /// No record set exists for the requested source state
    #[error("no transition-probability record for state {0}")]
    UnknownState(usize),
    /// A persisted record could not be parsed
    #[error("malformed record: {0}")]
    Malformed(String),
    /// The backing file could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Keyed access to the transition probabilities touching one irreducible
/// electron source state. A known state with no processes yields empty
/// lists; an unknown state is an error.
pub trait ElectronProcessStore<T>: Send + Sync {
    /// Phonon absorption and emission records for a source state
    fn phonon_mediated(&self, state: usize) -> Result<Vec<PhononMediatedProcess<T>>, StoreError>;
    /// Charged-impurity records for a source state
    fn impurity(&self, state: usize) -> Result<Vec<ImpurityProcess<T>>, StoreError>;
    /// Electron-electron records for a source state
    fn electron_electron(
        &self,
        state: usize,
    ) -> Result<Vec<ElectronElectronProcess<T>>, StoreError>;
}

/// Keyed access to the transition probabilities touching one irreducible
/// phonon source state
pub trait PhononProcessStore<T>: Send + Sync {
    /// Three-phonon records for a source state
    fn three_phonon(&self, state: usize) -> Result<Vec<ThreePhononProcess<T>>, StoreError>;
    /// Mass-defect records for a source state
    fn mass_defect(&self, state: usize) -> Result<Vec<MassDefectProcess<T>>, StoreError>;
    /// Phonon-electron records for a source state
    fn phonon_electron(&self, state: usize)
        -> Result<Vec<PhononElectronProcess<T>>, StoreError>;
}
