// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run archives: persisted response tables keyed by calculation stage.
//!
//! Each solver stage can checkpoint its response tables so a later run can
//! restart from them, or a postprocessing step can revisit them. The
//! directory archive lays runs out as one directory per temperature with one
//! plain-text file per labelled table; only the root rank touches the
//! filesystem, other ranks receive tables over the communicator.

use crate::comms::Communicator;
use miette::Diagnostic;
use nalgebra::RealField;
use ndarray::Array2;
use num_traits::ToPrimitive;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures raised by archive access
#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    /// The underlying filesystem operation failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The archived table could not be parsed
    #[error("malformed archive entry: {0}")]
    Malformed(String),
    /// No entry exists under the requested label
    #[error("no archive entry for label {0}")]
    UnknownLabel(String),
}

/// The calculation stage a checkpoint belongs to. Iterated stages carry the
/// iteration the table was taken at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunLabel {
    /// The relaxation-time seed
    Rta,
    /// The iterated solution without drag coupling
    NodragIterated(usize),
    /// The fully coupled iterated solution
    DragIterated(usize),
    /// The partially decoupled solution, drag in one direction only
    PartdcplIterated(usize),
}

impl fmt::Display for RunLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunLabel::Rta => write!(formatter, "rta"),
            RunLabel::NodragIterated(iteration) => {
                write!(formatter, "nodrag_iterated_{iteration:03}")
            }
            RunLabel::DragIterated(iteration) => {
                write!(formatter, "drag_iterated_{iteration:03}")
            }
            RunLabel::PartdcplIterated(iteration) => {
                write!(formatter, "partdcpl_iterated_{iteration:03}")
            }
        }
    }
}

/// Storage for labelled response tables
pub trait ResponseArchive<T> {
    /// Persist a table under a stage label and a quantity name, with an
    /// optional list of the bands it covers
    fn write(
        &self,
        label: RunLabel,
        name: &str,
        table: &Array2<T>,
        bands: Option<&[usize]>,
    ) -> Result<(), ArchiveError>;
    /// Recover a table persisted under a stage label and quantity name
    fn read(&self, label: RunLabel, name: &str) -> Result<Array2<T>, ArchiveError>;
}

/// A plain-text archive rooted in one directory per temperature
pub struct DirectoryArchive {
    directory: PathBuf,
}

impl DirectoryArchive {
    /// Open, creating if needed, the archive directory for one temperature
    pub fn at_temperature(root: &Path, temperature_kelvin: f64) -> Result<Self, ArchiveError> {
        let directory = root.join(format!("T_{temperature_kelvin:.2}K"));
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    fn entry_path(&self, label: RunLabel, name: &str) -> PathBuf {
        self.directory.join(format!("{label}_{name}.dat"))
    }
}

impl<T: Copy + RealField + ToPrimitive> ResponseArchive<T> for DirectoryArchive {
    fn write(
        &self,
        label: RunLabel,
        name: &str,
        table: &Array2<T>,
        bands: Option<&[usize]>,
    ) -> Result<(), ArchiveError> {
        let mut file = fs::File::create(self.entry_path(label, name))?;
        let (rows, columns) = table.dim();
        writeln!(file, "{rows} {columns}")?;
        if let Some(bands) = bands {
            let listed = bands
                .iter()
                .map(|band| band.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(file, "# bands: {listed}")?;
        }
        for row in table.rows() {
            let line = row
                .iter()
                .map(|value| format!("{:e}", value.to_f64().unwrap()))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn read(&self, label: RunLabel, name: &str) -> Result<Array2<T>, ArchiveError> {
        let path = self.entry_path(label, name);
        if !path.exists() {
            return Err(ArchiveError::UnknownLabel(format!("{label}_{name}")));
        }
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines().filter(|line| !line.starts_with('#'));
        let header = lines
            .next()
            .ok_or_else(|| ArchiveError::Malformed("empty archive entry".into()))?;
        let mut extents = header.split_whitespace().map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| ArchiveError::Malformed(format!("bad extent {token}")))
        });
        let rows = extents
            .next()
            .ok_or_else(|| ArchiveError::Malformed("missing row extent".into()))??;
        let columns = extents
            .next()
            .ok_or_else(|| ArchiveError::Malformed("missing column extent".into()))??;

        let mut table = Array2::from_elem((rows, columns), T::zero());
        for (index, line) in lines.enumerate() {
            if index >= rows {
                return Err(ArchiveError::Malformed(format!(
                    "more than {rows} data rows"
                )));
            }
            let mut values = line.split_whitespace();
            for column in 0..columns {
                let token = values.next().ok_or_else(|| {
                    ArchiveError::Malformed(format!("row {index} is short of {columns} columns"))
                })?;
                let value = token
                    .parse::<f64>()
                    .map_err(|_| ArchiveError::Malformed(format!("bad value {token}")))?;
                table[(index, column)] = T::from_f64(value)
                    .ok_or_else(|| ArchiveError::Malformed(format!("unrepresentable {value}")))?;
            }
        }
        Ok(table)
    }
}

/// Read a table on the root rank and replicate it to every other rank
pub fn read_and_broadcast<T: Copy + RealField + ToPrimitive>(
    archive: &dyn ResponseArchive<T>,
    label: RunLabel,
    name: &str,
    communicator: &dyn Communicator<T>,
) -> Result<Array2<T>, ArchiveError> {
    let root = 0;
    let mut extents = [T::zero(); 2];
    let table = if communicator.rank() == root {
        let table = archive.read(label, name)?;
        extents[0] = T::from_usize(table.dim().0).unwrap();
        extents[1] = T::from_usize(table.dim().1).unwrap();
        Some(table)
    } else {
        None
    };
    communicator.broadcast(&mut extents, root);

    let (rows, columns) = match (extents[0].to_usize(), extents[1].to_usize()) {
        (Some(rows), Some(columns)) => (rows, columns),
        _ => return Err(ArchiveError::Malformed("unrepresentable extents".into())),
    };

    let mut table = table.unwrap_or_else(|| Array2::from_elem((rows, columns), T::zero()));
    communicator.broadcast(
        table.as_slice_mut().expect("archive table is contiguous"),
        root,
    );
    Ok(table)
}

#[cfg(test)]
mod test {
    use super::{DirectoryArchive, ResponseArchive, RunLabel};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn scratch_directory(tag: &str) -> std::path::PathBuf {
        let directory = std::env::temp_dir().join(format!(
            "entrain-archive-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn tables_round_trip_through_the_directory_archive() {
        let root = scratch_directory("roundtrip");
        let archive = DirectoryArchive::at_temperature(&root, 300.0).unwrap();
        let table = Array2::from_shape_fn((6, 3), |(row, column)| {
            0.1 * row as f64 - 1.7 * column as f64
        });
        archive
            .write(RunLabel::DragIterated(4), "electron_thermal", &table, Some(&[0, 1]))
            .unwrap();
        let recovered: Array2<f64> = archive
            .read(RunLabel::DragIterated(4), "electron_thermal")
            .unwrap();
        assert_eq!(recovered.dim(), (6, 3));
        for (expected, read) in table.iter().zip(recovered.iter()) {
            assert_relative_eq!(expected, read);
        }
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_labels_are_reported() {
        let root = scratch_directory("missing");
        let archive = DirectoryArchive::at_temperature(&root, 77.0).unwrap();
        let result: Result<Array2<f64>, _> = archive.read(RunLabel::Rta, "absent");
        assert!(result.is_err());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn labels_render_with_their_iteration() {
        assert_eq!(RunLabel::Rta.to_string(), "rta");
        assert_eq!(
            RunLabel::NodragIterated(12).to_string(),
            "nodrag_iterated_012"
        );
        assert_eq!(
            RunLabel::PartdcplIterated(3).to_string(),
            "partdcpl_iterated_003"
        );
    }
}
