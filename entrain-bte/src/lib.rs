// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Entrain is a coupled electron-phonon Boltzmann transport solver written in Rust
//!
//! # Overview
//! Entrain solves the linearized Boltzmann transport equation for electrons and
//! phonons in a crystalline solid, producing the electrical conductivity, the
//! electronic and lattice thermal conductivities and the thermoelectric cross
//! coefficients under temperature-gradient and electric-field perturbations.
//!
//! The solve proceeds in stages. A relaxation-time solution is formed from the
//! aggregated scattering rates, each species is then iterated to its own fixed
//! point, and when drag coupling is requested the two species are iterated
//! together: every phonon sweep feeds a recomputed drag injection term into an
//! electron loop which runs to its own convergence. The drag-coupled
//! temperature-gradient response is finally rescaled so the electron and
//! phonon cross coefficients satisfy the Kelvin-Onsager identity.
//!
//! # Usage
//! Entrain is distributed as a binary crate, and is intended to be run from the
//! command line. Runs are configured through a `.toml` file:
//!
//! ```toml
//! [global]
//! temperatures = [300.0]
//! spin_degeneracy = 2.0
//! ```
//!
//! where further sections control the meshes, the analytic model inputs and
//! the convergence of the inner and outer loops.

#![warn(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::type_complexity)]

/// The command line global application, tracing and display primitives
pub mod app;

/// Run archive for response functions and rate tables
pub mod archive;

/// Electronic and vibrational band structure carriers
pub mod carriers;

/// The electron and phonon collision kernels which advance a response function
pub mod collision;

/// Collective operations over the cooperating worker ranks
pub mod comms;

/// Physical constants
mod constants;

/// The drag coupling engine linking the two species
pub mod drag;

/// Error handling
mod error;

/// The inner loop, which iterates the electron response to convergence
mod inner_loop;

/// The outer loop, which sweeps the phonon response and recomputes the drag term
mod outer_loop;

/// Field terms and response functions
pub mod response;

/// Scattering rates, process records and their keyed stores
pub mod scattering;

/// Brillouin-zone sums reducing a response function to transport tensors
pub mod transport;

pub use error::BuildError;
