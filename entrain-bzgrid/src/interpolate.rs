use crate::mesh::BzMesh;
use nalgebra::RealField;
use num_traits::ToPrimitive;

/// A trilinear interpolation stencil from a coarse mesh onto a fine one.
///
/// For every fine-mesh wavevector the stencil stores the eight coarse-mesh
/// cell corners bracketing it together with their trilinear weights. The
/// stencil is precomputed once and read-only thereafter; when the two meshes
/// coincide the weight collapses onto a single corner and sampling is exact.
#[derive(Clone, Debug)]
pub struct InterpolationStencil<T: RealField> {
    corners: Vec<[usize; 8]>,
    weights: Vec<[T; 8]>,
}

impl<T: Copy + RealField + ToPrimitive> InterpolationStencil<T> {
    pub fn build(coarse: &BzMesh<T>, fine: &BzMesh<T>) -> Self {
        let mut corners = Vec::with_capacity(fine.num_points());
        let mut weights = Vec::with_capacity(fine.num_points());
        for index in 0..fine.num_points() {
            let fractional = fine.point(index);
            let mut cell = [0_usize; 3];
            let mut offset = [T::zero(); 3];
            for axis in 0..3 {
                let scaled =
                    fractional[axis] * T::from_usize(coarse.dimensions()[axis]).unwrap();
                let floor = scaled.floor();
                cell[axis] = floor.to_usize().unwrap() % coarse.dimensions()[axis];
                offset[axis] = scaled - floor;
            }
            let mut point_corners = [0_usize; 8];
            let mut point_weights = [T::zero(); 8];
            for corner in 0..8 {
                let shift = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
                let coords = [
                    cell[0] + shift[0],
                    cell[1] + shift[1],
                    cell[2] + shift[2],
                ];
                point_corners[corner] = coarse.index_of(&coords);
                let mut weight = T::one();
                for axis in 0..3 {
                    weight *= if shift[axis] == 1 {
                        offset[axis]
                    } else {
                        T::one() - offset[axis]
                    };
                }
                point_weights[corner] = weight;
            }
            corners.push(point_corners);
            weights.push(point_weights);
        }
        Self { corners, weights }
    }

    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    pub fn corners(&self, fine_index: usize) -> &[usize; 8] {
        &self.corners[fine_index]
    }

    pub fn weights(&self, fine_index: usize) -> &[T; 8] {
        &self.weights[fine_index]
    }

    /// Interpolate a scalar field sampled on the coarse mesh
    pub fn sample(&self, fine_index: usize, values: impl Fn(usize) -> T) -> T {
        self.corners[fine_index]
            .iter()
            .zip(self.weights[fine_index].iter())
            .fold(T::zero(), |acc, (&corner, &weight)| {
                acc + values(corner) * weight
            })
    }
}

#[cfg(test)]
mod test {
    use super::InterpolationStencil;
    use crate::{BzMesh, SymmetryGroup};
    use approx::assert_relative_eq;

    #[test]
    fn weights_sum_to_one() {
        let coarse: BzMesh<f64> = BzMesh::new([3, 3, 3], SymmetryGroup::identity());
        let fine: BzMesh<f64> = BzMesh::new([6, 6, 6], SymmetryGroup::identity());
        let stencil = InterpolationStencil::build(&coarse, &fine);
        for index in 0..stencil.len() {
            let total: f64 = stencil.weights(index).iter().sum();
            assert_relative_eq!(total, 1_f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn coincident_meshes_sample_exactly() {
        let mesh: BzMesh<f64> = BzMesh::new([4, 4, 4], SymmetryGroup::identity());
        let stencil = InterpolationStencil::build(&mesh, &mesh);
        let field: Vec<f64> = (0..mesh.num_points()).map(|i| i as f64 * 0.37).collect();
        for index in 0..mesh.num_points() {
            let sampled = stencil.sample(index, |corner| field[corner]);
            assert_relative_eq!(sampled, field[index], epsilon = 1e-12);
        }
    }

    #[test]
    fn midpoint_of_a_linear_field_is_the_mean_of_bracketing_corners() {
        let coarse: BzMesh<f64> = BzMesh::new([2, 1, 1], SymmetryGroup::identity());
        let fine: BzMesh<f64> = BzMesh::new([4, 1, 1], SymmetryGroup::identity());
        let stencil = InterpolationStencil::build(&coarse, &fine);
        // Coarse fractional points sit at 0 and 1/2; the fine point at 1/4
        // is the midpoint of the coarse cell
        let field = [1_f64, 3_f64];
        let sampled = stencil.sample(1, |corner| field[corner % 2]);
        assert_relative_eq!(sampled, 2_f64, epsilon = 1e-12);
    }
}
