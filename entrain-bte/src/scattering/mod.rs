//! Scattering rates and transition-probability records.
//!
//! Per-channel relaxation rates are tabulated over the irreducible states
//! and combined through Matthiessen's rule into one total rate per
//! temperature. Transition probabilities are served through keyed stores,
//! either persisted on disk, computed on the fly from the analytic model, or
//! held in memory for tests; all three sit behind the same traits.

pub mod delta;
pub mod disk;
pub mod model;
mod processes;
mod store;

pub use delta::{DeltaEvaluator, DeltaRule};
pub use processes::{
    ElectronElectronProcess, ImpurityProcess, MassDefectProcess, PhononElectronProcess,
    PhononMediatedProcess, PhononPartner, ThreePhononClass, ThreePhononProcess,
};
pub use store::{ElectronProcessStore, PhononProcessStore, StoreError};

use crate::carriers::CarrierSystem;
use crate::error::BuildError;
use entrain_bzgrid::BzMesh;
use nalgebra::RealField;
use ndarray::Array2;

/// A per-state scalar scattering rate over the irreducible wedge, one table
/// per channel, extents (irreducible wavevectors, bands)
#[derive(Clone, Debug)]
pub struct RateTable<T> {
    data: Array2<T>,
}

impl<T: Copy + RealField> RateTable<T> {
    /// Wrap a rate table
    pub fn new(data: Array2<T>) -> Self {
        Self { data }
    }

    /// Table extents as (irreducible wavevectors, bands)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// The rate of an irreducible state
    pub fn rate(&self, ibz_index: usize, band: usize) -> T {
        self.data[(ibz_index, band)]
    }

    /// The state lifetime. A vanishing rate is a normal condition for
    /// out-of-window or isolated states; such states carry no dynamics in
    /// the relaxation-time sense and take a zero lifetime rather than an
    /// error.
    pub fn lifetime(&self, ibz_index: usize, band: usize) -> T {
        let rate = self.rate(ibz_index, band);
        if rate == T::zero() {
            T::zero()
        } else {
            T::one() / rate
        }
    }

    /// Read access to the underlying table
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }
}

/// The boundary scattering channel. Unlike the bulk channels it is derived
/// from the already-aggregated bulk rate, so it enters aggregation in a
/// second pass.
#[derive(Clone, Copy, Debug)]
pub enum SurfaceChannel<T> {
    /// Casimir grain-boundary scattering at the ballistic rate `|v| / L`
    Grain {
        /// Grain size in metres
        length: T,
    },
    /// Thin-film suppression: the ballistic rate damped by the ratio of the
    /// bulk mean free path to the film thickness, recovering `|v| / L` when
    /// the bulk rate vanishes
    Film {
        /// Film thickness in metres
        thickness: T,
    },
}

impl<T: Copy + RealField> SurfaceChannel<T> {
    /// The surface rate of one state given its speed and the aggregated
    /// bulk rate
    fn rate(&self, speed: T, bulk_rate: T) -> T {
        match *self {
            SurfaceChannel::Grain { length } => speed / length,
            SurfaceChannel::Film { thickness } => {
                let ballistic = speed / thickness;
                if bulk_rate == T::zero() {
                    ballistic
                } else {
                    // Mean free path over thickness damps the ballistic rate
                    let knudsen = speed / (bulk_rate * thickness);
                    ballistic * (-T::one() / knudsen).exp()
                }
            }
        }
    }
}

/// Combine independent channel rates into one total rate through
/// Matthiessen's rule. Aggregation runs in two passes: the bulk channels are
/// summed element-wise, then the surface channel, which depends on the bulk
/// aggregate, is evaluated from that partial sum and added.
///
/// All tables must share their extents; `speeds` holds the group-velocity
/// magnitude of each irreducible state and is only consulted when a surface
/// channel is present.
pub fn aggregate_rates<T: Copy + RealField>(
    channels: &[RateTable<T>],
    surface: Option<(SurfaceChannel<T>, &Array2<T>)>,
) -> Result<RateTable<T>, BuildError> {
    let first = channels
        .first()
        .ok_or_else(|| BuildError::Extents("no channel rate tables supplied".into()))?;
    let extents = first.dim();
    for (channel, table) in channels.iter().enumerate() {
        if table.dim() != extents {
            return Err(BuildError::Extents(format!(
                "channel {channel} has extents {:?}, expected {extents:?}",
                table.dim()
            )));
        }
    }

    let mut total = first.data.clone();
    for table in &channels[1..] {
        total += &table.data;
    }

    if let Some((channel, speeds)) = surface {
        if speeds.dim() != extents {
            return Err(BuildError::Extents(format!(
                "speed table has extents {:?}, expected {extents:?}",
                speeds.dim()
            )));
        }
        let surface_rates =
            Array2::from_shape_fn(extents, |index| channel.rate(speeds[index], total[index]));
        total += &surface_rates;
    }

    Ok(RateTable::new(total))
}

/// Per-channel relaxation rates of the electrons, one table per channel in
/// the order phonon-mediated, impurity, electron-electron. States outside
/// the transport window carry a vanishing rate.
pub fn electron_channel_rates<T: Copy + RealField>(
    mesh: &BzMesh<T>,
    system: &dyn CarrierSystem<T>,
    store: &dyn ElectronProcessStore<T>,
) -> Result<Vec<RateTable<T>>, StoreError> {
    let bands = system.bands();
    let extents = (mesh.num_irreducible_points(), bands);
    let mut phonon_mediated = Array2::from_elem(extents, T::zero());
    let mut impurity = Array2::from_elem(extents, T::zero());
    let mut electron_electron = Array2::from_elem(extents, T::zero());
    for ibz_index in 0..extents.0 {
        for band in 0..bands {
            let representative = mesh.representative(ibz_index) * bands + band;
            if system.active_index(representative).is_none() {
                continue;
            }
            let source = ibz_index * bands + band;
            phonon_mediated[(ibz_index, band)] = store
                .phonon_mediated(source)?
                .iter()
                .fold(T::zero(), |acc, process| acc + process.weight);
            impurity[(ibz_index, band)] = store
                .impurity(source)?
                .iter()
                .fold(T::zero(), |acc, process| acc + process.weight);
            electron_electron[(ibz_index, band)] = store
                .electron_electron(source)?
                .iter()
                .fold(T::zero(), |acc, process| acc + process.weight);
        }
    }
    Ok(vec![
        RateTable::new(phonon_mediated),
        RateTable::new(impurity),
        RateTable::new(electron_electron),
    ])
}

/// Per-channel relaxation rates of the phonons, one table per channel in
/// the order three-phonon, mass-defect, phonon-electron. Decay events enter
/// with the half factor compensating the double count of their products.
pub fn phonon_channel_rates<T: Copy + RealField>(
    mesh: &BzMesh<T>,
    system: &dyn CarrierSystem<T>,
    store: &dyn PhononProcessStore<T>,
) -> Result<Vec<RateTable<T>>, StoreError> {
    let branches = system.bands();
    let extents = (mesh.num_irreducible_points(), branches);
    let half = T::one() / (T::one() + T::one());
    let mut three_phonon = Array2::from_elem(extents, T::zero());
    let mut mass_defect = Array2::from_elem(extents, T::zero());
    let mut phonon_electron = Array2::from_elem(extents, T::zero());
    for ibz_index in 0..extents.0 {
        for branch in 0..branches {
            let source = ibz_index * branches + branch;
            three_phonon[(ibz_index, branch)] =
                store
                    .three_phonon(source)?
                    .iter()
                    .fold(T::zero(), |acc, process| match process.class {
                        ThreePhononClass::Plus => acc + process.weight,
                        ThreePhononClass::Minus => acc + process.weight * half,
                    });
            mass_defect[(ibz_index, branch)] = store
                .mass_defect(source)?
                .iter()
                .fold(T::zero(), |acc, process| acc + process.weight);
            phonon_electron[(ibz_index, branch)] = store
                .phonon_electron(source)?
                .iter()
                .fold(T::zero(), |acc, process| acc + process.weight);
        }
    }
    Ok(vec![
        RateTable::new(three_phonon),
        RateTable::new(mass_defect),
        RateTable::new(phonon_electron),
    ])
}

/// Group-velocity magnitudes at the orbit representatives, the speed table
/// consumed by the surface channel
pub fn representative_speeds<T: Copy + RealField>(
    mesh: &BzMesh<T>,
    system: &dyn CarrierSystem<T>,
) -> Array2<T> {
    let bands = system.bands();
    Array2::from_shape_fn((mesh.num_irreducible_points(), bands), |(ibz_index, band)| {
        system
            .velocity(mesh.representative(ibz_index) * bands + band)
            .norm()
    })
}
