//! File-backed process stores.
//!
//! Records are persisted one file per source state, located by a
//! synthesized name `<channel>_<state>.dat` under the store root. Each line
//! holds the whitespace-separated fields of one record. A missing file for
//! a requested state is an unknown-state error, not an empty record set:
//! the store and the band structure must agree on which states exist.

use super::processes::{
    ElectronElectronProcess, ImpurityProcess, MassDefectProcess, PhononElectronProcess,
    PhononMediatedProcess, PhononPartner, ThreePhononClass, ThreePhononProcess,
};
use super::store::{ElectronProcessStore, PhononProcessStore, StoreError};
use nalgebra::RealField;
use num_traits::ToPrimitive;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

fn record_path(root: &Path, channel: &str, state: usize) -> PathBuf {
    root.join(format!("{channel}_{state}.dat"))
}

fn read_lines(root: &Path, channel: &str, state: usize) -> Result<Vec<Vec<String>>, StoreError> {
    let path = record_path(root, channel, state);
    if !path.exists() {
        return Err(StoreError::UnknownState(state));
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().map(str::to_owned).collect())
        .collect())
}

fn parse_index(fields: &[String], position: usize) -> Result<usize, StoreError> {
    fields
        .get(position)
        .ok_or_else(|| StoreError::Malformed(format!("missing field {position}")))?
        .parse::<usize>()
        .map_err(|error| StoreError::Malformed(error.to_string()))
}

fn parse_value<T: FromStr>(fields: &[String], position: usize) -> Result<T, StoreError>
where
    T::Err: Display,
{
    fields
        .get(position)
        .ok_or_else(|| StoreError::Malformed(format!("missing field {position}")))?
        .parse::<T>()
        .map_err(|error| StoreError::Malformed(error.to_string()))
}

/// Electron-side records persisted under one directory
pub struct DiskElectronStore {
    root: PathBuf,
}

impl DiskElectronStore {
    /// Open a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist the record set of one source state, overwriting any previous
    /// set
    pub fn write_phonon_mediated<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[PhononMediatedProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "eph", state))?;
        for record in records {
            writeln!(
                file,
                "{} {} {} {:e}",
                record.final_state,
                record.phonon.state,
                u8::from(record.phonon.reversed),
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }

    /// Persist the impurity records of one source state
    pub fn write_impurity<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[ImpurityProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "eimp", state))?;
        for record in records {
            writeln!(
                file,
                "{} {:e}",
                record.final_state,
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }

    /// Persist the electron-electron records of one source state
    pub fn write_electron_electron<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[ElectronElectronProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "eel", state))?;
        for record in records {
            writeln!(
                file,
                "{} {} {} {:e}",
                record.k2,
                record.k3,
                record.k4,
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }
}

impl<T: Copy + RealField> ElectronProcessStore<T> for DiskElectronStore {
    fn phonon_mediated(&self, state: usize) -> Result<Vec<PhononMediatedProcess<T>>, StoreError> {
        read_lines(&self.root, "eph", state)?
            .iter()
            .map(|fields| {
                Ok(PhononMediatedProcess {
                    final_state: parse_index(fields, 0)?,
                    phonon: PhononPartner {
                        state: parse_index(fields, 1)?,
                        reversed: parse_index(fields, 2)? != 0,
                    },
                    weight: T::from_f64(parse_value::<f64>(fields, 3)?).unwrap(),
                })
            })
            .collect()
    }

    fn impurity(&self, state: usize) -> Result<Vec<ImpurityProcess<T>>, StoreError> {
        read_lines(&self.root, "eimp", state)?
            .iter()
            .map(|fields| {
                Ok(ImpurityProcess {
                    final_state: parse_index(fields, 0)?,
                    weight: T::from_f64(parse_value::<f64>(fields, 1)?).unwrap(),
                })
            })
            .collect()
    }

    fn electron_electron(
        &self,
        state: usize,
    ) -> Result<Vec<ElectronElectronProcess<T>>, StoreError> {
        read_lines(&self.root, "eel", state)?
            .iter()
            .map(|fields| {
                Ok(ElectronElectronProcess {
                    k2: parse_index(fields, 0)?,
                    k3: parse_index(fields, 1)?,
                    k4: parse_index(fields, 2)?,
                    weight: T::from_f64(parse_value::<f64>(fields, 3)?).unwrap(),
                })
            })
            .collect()
    }
}

/// Phonon-side records persisted under one directory
pub struct DiskPhononStore {
    root: PathBuf,
}

impl DiskPhononStore {
    /// Open a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist the three-phonon records of one source state
    pub fn write_three_phonon<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[ThreePhononProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "pp", state))?;
        for record in records {
            let class = match record.class {
                ThreePhononClass::Plus => "+",
                ThreePhononClass::Minus => "-",
            };
            writeln!(
                file,
                "{class} {} {} {:e}",
                record.q2,
                record.q3,
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }

    /// Persist the mass-defect records of one source state
    pub fn write_mass_defect<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[MassDefectProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "pmass", state))?;
        for record in records {
            writeln!(
                file,
                "{} {:e}",
                record.partner,
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }

    /// Persist the phonon-electron records of one source state
    pub fn write_phonon_electron<T: Copy + RealField + ToPrimitive>(
        &self,
        state: usize,
        records: &[PhononElectronProcess<T>],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let mut file = fs::File::create(record_path(&self.root, "pel", state))?;
        for record in records {
            writeln!(
                file,
                "{} {} {:e}",
                record.initial,
                record.final_state,
                record.weight.to_f64().unwrap()
            )?;
        }
        Ok(())
    }
}

impl<T: Copy + RealField> PhononProcessStore<T> for DiskPhononStore {
    fn three_phonon(&self, state: usize) -> Result<Vec<ThreePhononProcess<T>>, StoreError> {
        read_lines(&self.root, "pp", state)?
            .iter()
            .map(|fields| {
                let class = match fields
                    .first()
                    .ok_or_else(|| StoreError::Malformed("missing class field".into()))?
                    .as_str()
                {
                    "+" => ThreePhononClass::Plus,
                    "-" => ThreePhononClass::Minus,
                    other => {
                        return Err(StoreError::Malformed(format!(
                            "unknown three-phonon class {other:?}"
                        )))
                    }
                };
                Ok(ThreePhononProcess {
                    class,
                    q2: parse_index(fields, 1)?,
                    q3: parse_index(fields, 2)?,
                    weight: T::from_f64(parse_value::<f64>(fields, 3)?).unwrap(),
                })
            })
            .collect()
    }

    fn mass_defect(&self, state: usize) -> Result<Vec<MassDefectProcess<T>>, StoreError> {
        read_lines(&self.root, "pmass", state)?
            .iter()
            .map(|fields| {
                Ok(MassDefectProcess {
                    partner: parse_index(fields, 0)?,
                    weight: T::from_f64(parse_value::<f64>(fields, 1)?).unwrap(),
                })
            })
            .collect()
    }

    fn phonon_electron(
        &self,
        state: usize,
    ) -> Result<Vec<PhononElectronProcess<T>>, StoreError> {
        read_lines(&self.root, "pel", state)?
            .iter()
            .map(|fields| {
                Ok(PhononElectronProcess {
                    initial: parse_index(fields, 0)?,
                    final_state: parse_index(fields, 1)?,
                    weight: T::from_f64(parse_value::<f64>(fields, 2)?).unwrap(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::{DiskElectronStore, DiskPhononStore};
    use crate::scattering::{
        ElectronProcessStore, PhononMediatedProcess, PhononPartner, PhononProcessStore,
        StoreError, ThreePhononClass, ThreePhononProcess,
    };
    use approx::assert_relative_eq;

    fn scratch_directory(tag: &str) -> std::path::PathBuf {
        let directory = std::env::temp_dir().join(format!(
            "entrain-disk-store-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&directory);
        directory
    }

    #[test]
    fn electron_records_survive_a_round_trip() {
        let store = DiskElectronStore::new(scratch_directory("el"));
        let records = vec![
            PhononMediatedProcess {
                final_state: 3,
                phonon: PhononPartner {
                    state: 7,
                    reversed: true,
                },
                weight: 0.25_f64,
            },
            PhononMediatedProcess {
                final_state: 1,
                phonon: PhononPartner {
                    state: 2,
                    reversed: false,
                },
                weight: -1.5e-3,
            },
        ];
        store.write_phonon_mediated(0, &records).unwrap();
        let recovered: Vec<PhononMediatedProcess<f64>> = store.phonon_mediated(0).unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].final_state, 3);
        assert!(recovered[0].phonon.reversed);
        assert_relative_eq!(recovered[1].weight, -1.5e-3);
    }

    #[test]
    fn unknown_states_are_fatal() {
        let store = DiskPhononStore::new(scratch_directory("ph"));
        store
            .write_three_phonon::<f64>(
                4,
                &[ThreePhononProcess {
                    class: ThreePhononClass::Minus,
                    q2: 1,
                    q3: 2,
                    weight: 1.0,
                }],
            )
            .unwrap();
        let result: Result<Vec<ThreePhononProcess<f64>>, _> = store.three_phonon(5);
        assert!(matches!(result, Err(StoreError::UnknownState(5))));
    }
}
