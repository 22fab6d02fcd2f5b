// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use miette::Diagnostic;

/// Construction failures for the core data containers. These are fatal:
/// tables with mismatched extents or unphysical run conditions cannot be
/// reconciled at runtime.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum BuildError {
    /// Collaborating tables disagree on their extents
    #[error("{0}")]
    Extents(String),
    /// Phonons carry no charge, so their chemical potential must be exactly zero
    #[error("nonzero phonon chemical potential: {0}")]
    ChemicalPotential(String),
    /// A run condition outside the domain of the model
    #[error("{0}")]
    Conditions(String),
}
