//! Transition-probability records.
//!
//! Each record links one irreducible source state to its scattering
//! partners with a signed weight. Partner indices are expressed in each
//! species' own transport index space: electron partners are energy-window
//! indices, phonon partners are full-mesh state ids. Phonon partners seen
//! from the electron side carry a `reversed` tag instead of a second stored
//! half-zone: the odd parity of the response, `R(-q) = -R(q)`, turns a
//! lookup at `-q` into a sign flip on the stored `+q` value.

/// A phonon wavevector partner referenced from an electron-side record. The
/// state id addresses the evaluation mesh of the drag engine's stencil.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhononPartner {
    /// Flat phonon state id on the stencil's fine mesh
    pub state: usize,
    /// Whether the physical partner is the time-reversed image `-q`
    pub reversed: bool,
}

/// Phonon absorption plus emission linking two electron states, with the
/// combined weight `X⁺ + X⁻`
#[derive(Clone, Copy, Debug)]
pub struct PhononMediatedProcess<T> {
    /// Window index of the final electron state
    pub final_state: usize,
    /// The mediating phonon
    pub phonon: PhononPartner,
    /// Combined absorption and emission weight
    pub weight: T,
}

/// Elastic charged-impurity scattering between two electron states
#[derive(Clone, Copy, Debug)]
pub struct ImpurityProcess<T> {
    /// Window index of the final electron state
    pub final_state: usize,
    /// Scattering weight
    pub weight: T,
}

/// A four-state electron-electron process
#[derive(Clone, Copy, Debug)]
pub struct ElectronElectronProcess<T> {
    /// Window index of the second incoming state
    pub k2: usize,
    /// Window index of the first outgoing state
    pub k3: usize,
    /// Window index of the second outgoing state
    pub k4: usize,
    /// Scattering weight
    pub weight: T,
}

/// Whether a three-phonon record describes a combination (`plus`) or a
/// decay (`minus`) process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreePhononClass {
    /// `q + q2 -> q3`
    Plus,
    /// `q -> q2 + q3`
    Minus,
}

/// A three-phonon record touching one irreducible source state
#[derive(Clone, Copy, Debug)]
pub struct ThreePhononProcess<T> {
    /// Process class
    pub class: ThreePhononClass,
    /// Full-mesh state id of the second phonon
    pub q2: usize,
    /// Full-mesh state id of the third phonon
    pub q3: usize,
    /// Scattering weight, `W⁺` or `W⁻` by class
    pub weight: T,
}

/// Elastic mass-defect (isotope or substitution) scattering between two
/// phonon states
#[derive(Clone, Copy, Debug)]
pub struct MassDefectProcess<T> {
    /// Full-mesh state id of the partner phonon
    pub partner: usize,
    /// Matrix element
    pub weight: T,
}

/// A phonon-electron record: the phonon scatters an electron between two
/// window states, transferring momentum into the electron system
#[derive(Clone, Copy, Debug)]
pub struct PhononElectronProcess<T> {
    /// Window index of the initial electron state
    pub initial: usize,
    /// Window index of the final electron state
    pub final_state: usize,
    /// Scattering weight `Y`
    pub weight: T,
}
