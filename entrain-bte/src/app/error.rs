// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Error
//! The error type for the binary

use miette::Diagnostic;

#[derive(thiserror::Error, Debug, Diagnostic)]
pub(crate) enum EntrainError {
    #[error(transparent)]
    #[diagnostic(code(entrain::io_error))]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    #[diagnostic(code(entrain::config_error))]
    ConfigError(#[from] anyhow::Error),
    #[error(transparent)]
    Sweep(#[from] crate::collision::SweepError),
    #[error(transparent)]
    Store(#[from] crate::scattering::StoreError),
    #[error(transparent)]
    Archive(#[from] crate::archive::ArchiveError),
    #[error(transparent)]
    Build(#[from] crate::error::BuildError),
}
