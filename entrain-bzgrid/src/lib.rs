#![allow(dead_code)]

//! Brillouin-zone meshes and their symmetry decomposition.
//!
//! This crate holds the wavevector-space primitives used by the transport
//! solver: regular Monkhorst-Pack style meshes, the reduction of a full mesh
//! into symmetry orbits with one irreducible representative per orbit, the
//! small-group projectors used to symmetrize response functions, and the
//! trilinear stencils used to move data between meshes of different
//! resolution.

mod interpolate;
mod mesh;
mod symmetry;

pub use interpolate::*;
pub use mesh::*;
pub use symmetry::*;
