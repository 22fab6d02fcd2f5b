use nalgebra::{Matrix3, RealField};

/// A point-group operation, carried in both the fractional basis (integer
/// matrix acting on reduced wavevector coordinates) and the cartesian basis
/// (acting on velocities and response vectors).
#[derive(Clone, Debug)]
pub struct Rotation<T: RealField> {
    /// Integer representation acting on fractional coordinates
    pub fractional: Matrix3<i32>,
    /// Real representation acting on cartesian vectors
    pub cartesian: Matrix3<T>,
}

impl<T: Copy + RealField> Rotation<T> {
    pub fn identity() -> Self {
        Self::from_orthogonal(Matrix3::identity())
    }

    pub fn inversion() -> Self {
        Self::from_orthogonal(-Matrix3::<i32>::identity())
    }

    /// Build a rotation for a cell with orthogonal axes, where the cartesian
    /// representation coincides with the fractional one
    pub fn from_orthogonal(fractional: Matrix3<i32>) -> Self {
        let cartesian =
            Matrix3::from_iterator(fractional.iter().map(|&entry| match entry.signum() {
                1 => T::one(),
                -1 => -T::one(),
                _ => T::zero(),
            }));
        Self {
            fractional,
            cartesian,
        }
    }
}

/// The point group of the crystal, a closed set of rotations with the
/// identity stored first
#[derive(Clone, Debug)]
pub struct SymmetryGroup<T: RealField> {
    rotations: Vec<Rotation<T>>,
}

impl<T: Copy + RealField> SymmetryGroup<T> {
    /// The trivial group containing only the identity
    pub fn identity() -> Self {
        Self {
            rotations: vec![Rotation::identity()],
        }
    }

    /// The two-element group generated by spatial inversion
    pub fn with_inversion() -> Self {
        Self {
            rotations: vec![Rotation::identity(), Rotation::inversion()],
        }
    }

    /// Build a group from an explicit list of operations. The identity must
    /// be the first entry, as orbit construction tags each irreducible
    /// representative with rotation index zero.
    pub fn from_rotations(rotations: Vec<Rotation<T>>) -> Self {
        assert!(
            !rotations.is_empty() && rotations[0].fractional == Matrix3::identity(),
            "the identity operation must be the first group element"
        );
        Self { rotations }
    }

    pub fn order(&self) -> usize {
        self.rotations.len()
    }

    pub fn rotation(&self, index: usize) -> &Rotation<T> {
        &self.rotations[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rotation<T>> {
        self.rotations.iter()
    }
}

#[cfg(test)]
mod test {
    use super::{Rotation, SymmetryGroup};
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn inversion_negates_cartesian_vectors() {
        let inversion: Rotation<f64> = Rotation::inversion();
        let vector = Vector3::new(0.3, -1.2, 5.0);
        let rotated = inversion.cartesian * vector;
        assert_eq!(rotated, -vector);
    }

    #[test]
    #[should_panic]
    fn group_without_leading_identity_is_rejected() {
        let _group: SymmetryGroup<f64> = SymmetryGroup::from_rotations(vec![
            Rotation::inversion(),
            Rotation::from_orthogonal(Matrix3::identity()),
        ]);
    }
}
