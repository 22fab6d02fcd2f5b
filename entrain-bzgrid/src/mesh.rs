use crate::symmetry::SymmetryGroup;
use nalgebra::{Matrix3, RealField, Vector3};
use num_traits::ToPrimitive;

/// One symmetry-equivalent image of an irreducible wavevector: the index of
/// the image on the full mesh and the group operation carrying the
/// representative onto it
#[derive(Clone, Copy, Debug)]
pub struct Image {
    pub fbz_index: usize,
    pub rotation: usize,
}

/// The orbit of one irreducible wavevector under the point group. The first
/// image is always the representative itself, paired with the identity.
#[derive(Clone, Debug)]
pub struct Orbit {
    images: Vec<Image>,
}

impl Orbit {
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Number of distinct full-mesh points in the orbit
    pub fn multiplicity(&self) -> usize {
        self.images.len()
    }

    pub fn representative(&self) -> usize {
        self.images[0].fbz_index
    }
}

/// A regular wavevector mesh over the full Brillouin zone, reduced into
/// symmetry orbits. Immutable after construction: the orbit decomposition,
/// the inverse full-to-irreducible map and the per-point small-group
/// projectors are all built once from the mesh dimensions and the point
/// group.
#[derive(Clone, Debug)]
pub struct BzMesh<T: RealField> {
    dimensions: [usize; 3],
    coords: Vec<[usize; 3]>,
    group: SymmetryGroup<T>,
    orbits: Vec<Orbit>,
    fbz_to_ibz: Vec<(usize, usize)>,
    projectors: Vec<Matrix3<T>>,
}

impl<T: Copy + RealField> BzMesh<T> {
    /// Construct the mesh and its orbit decomposition. Every group operation
    /// must map the mesh onto itself; a mesh whose dimensions are
    /// incompatible with the supplied group cannot be reduced and is a
    /// construction error.
    pub fn new(dimensions: [usize; 3], group: SymmetryGroup<T>) -> Self {
        assert!(
            dimensions.iter().all(|&n| n > 0),
            "mesh dimensions must be nonzero"
        );
        let num_points = dimensions[0] * dimensions[1] * dimensions[2];
        let coords: Vec<[usize; 3]> = (0..num_points)
            .map(|index| unflatten(index, &dimensions))
            .collect();

        let mut orbits: Vec<Orbit> = Vec::new();
        let mut fbz_to_ibz = vec![(usize::MAX, usize::MAX); num_points];
        let mut visited = vec![false; num_points];
        for index in 0..num_points {
            if visited[index] {
                continue;
            }
            let orbit_index = orbits.len();
            let mut images = Vec::new();
            for (rotation_index, rotation) in group.iter().enumerate() {
                let image = apply_fractional(&rotation.fractional, &coords[index], &dimensions);
                let image_index = flatten(&image, &dimensions);
                if !visited[image_index] {
                    visited[image_index] = true;
                    images.push(Image {
                        fbz_index: image_index,
                        rotation: rotation_index,
                    });
                    fbz_to_ibz[image_index] = (orbit_index, rotation_index);
                }
            }
            orbits.push(Orbit { images });
        }

        let projectors = (0..num_points)
            .map(|index| {
                let mut projector = Matrix3::zeros();
                let mut order = T::zero();
                for rotation in group.iter() {
                    let image = apply_fractional(&rotation.fractional, &coords[index], &dimensions);
                    if flatten(&image, &dimensions) == index {
                        projector += rotation.cartesian;
                        order += T::one();
                    }
                }
                projector / order
            })
            .collect();

        Self {
            dimensions,
            coords,
            group,
            orbits,
            fbz_to_ibz,
            projectors,
        }
    }

    pub fn dimensions(&self) -> &[usize; 3] {
        &self.dimensions
    }

    /// Number of points on the full mesh
    pub fn num_points(&self) -> usize {
        self.coords.len()
    }

    /// Number of irreducible representatives
    pub fn num_irreducible_points(&self) -> usize {
        self.orbits.len()
    }

    /// Fractional coordinates of a full-mesh point, wrapped to [0, 1)
    pub fn point(&self, fbz_index: usize) -> Vector3<T> {
        let coords = &self.coords[fbz_index];
        Vector3::new(
            T::from_usize(coords[0]).unwrap() / T::from_usize(self.dimensions[0]).unwrap(),
            T::from_usize(coords[1]).unwrap() / T::from_usize(self.dimensions[1]).unwrap(),
            T::from_usize(coords[2]).unwrap() / T::from_usize(self.dimensions[2]).unwrap(),
        )
    }

    /// Fractional coordinates folded to the first zone, in [-1/2, 1/2)
    pub fn folded_point(&self, fbz_index: usize) -> Vector3<T> {
        let half = T::from_f64(0.5).unwrap();
        self.point(fbz_index).map(|x| if x < half { x } else { x - T::one() })
    }

    pub fn coords(&self, fbz_index: usize) -> &[usize; 3] {
        &self.coords[fbz_index]
    }

    pub fn index_of(&self, coords: &[usize; 3]) -> usize {
        let wrapped = [
            coords[0] % self.dimensions[0],
            coords[1] % self.dimensions[1],
            coords[2] % self.dimensions[2],
        ];
        flatten(&wrapped, &self.dimensions)
    }

    /// Index of the time-reversed point -q on the mesh
    pub fn negative_index(&self, fbz_index: usize) -> usize {
        let coords = &self.coords[fbz_index];
        let negated = [
            (self.dimensions[0] - coords[0]) % self.dimensions[0],
            (self.dimensions[1] - coords[1]) % self.dimensions[1],
            (self.dimensions[2] - coords[2]) % self.dimensions[2],
        ];
        flatten(&negated, &self.dimensions)
    }

    /// Neighbouring point displaced by one grid step along a cartesian axis
    pub fn neighbour(&self, fbz_index: usize, axis: usize, forward: bool) -> usize {
        let mut coords = *self.coords(fbz_index);
        let n = self.dimensions[axis];
        coords[axis] = if forward {
            (coords[axis] + 1) % n
        } else {
            (coords[axis] + n - 1) % n
        };
        flatten(&coords, &self.dimensions)
    }

    pub fn orbit(&self, ibz_index: usize) -> &Orbit {
        &self.orbits[ibz_index]
    }

    /// Full-mesh index of an irreducible representative
    pub fn representative(&self, ibz_index: usize) -> usize {
        self.orbits[ibz_index].representative()
    }

    /// The orbit index and rotation carrying the representative onto the
    /// given full-mesh point
    pub fn orbit_of(&self, fbz_index: usize) -> (usize, usize) {
        self.fbz_to_ibz[fbz_index]
    }

    pub fn group(&self) -> &SymmetryGroup<T> {
        &self.group
    }

    /// The small-group projector at a full-mesh point, the group average of
    /// all cartesian operations leaving the point fixed. Idempotent by
    /// construction.
    pub fn projector(&self, fbz_index: usize) -> &Matrix3<T> {
        &self.projectors[fbz_index]
    }
}

fn flatten(coords: &[usize; 3], dimensions: &[usize; 3]) -> usize {
    (coords[0] * dimensions[1] + coords[1]) * dimensions[2] + coords[2]
}

fn unflatten(index: usize, dimensions: &[usize; 3]) -> [usize; 3] {
    let k = index % dimensions[2];
    let j = (index / dimensions[2]) % dimensions[1];
    let i = index / (dimensions[1] * dimensions[2]);
    [i, j, k]
}

/// Apply an integer fractional rotation to grid coordinates, wrapping back
/// onto the mesh. The operation must map the grid onto itself.
fn apply_fractional(
    rotation: &Matrix3<i32>,
    coords: &[usize; 3],
    dimensions: &[usize; 3],
) -> [usize; 3] {
    // Work over the common denominator of the three mesh divisions so the
    // rotated coordinate can be checked for integrality exactly
    let denominator: i64 = dimensions.iter().map(|&n| n as i64).product();
    let mut image = [0_usize; 3];
    for (i, slot) in image.iter_mut().enumerate() {
        let mut numerator = 0_i64;
        for j in 0..3 {
            numerator += rotation[(i, j)].to_i64().unwrap()
                * coords[j] as i64
                * (denominator / dimensions[j] as i64);
        }
        let scaled = numerator * dimensions[i] as i64;
        assert!(
            scaled % denominator == 0,
            "group operation does not map the mesh onto itself"
        );
        let n = dimensions[i] as i64;
        *slot = (((scaled / denominator) % n + n) % n) as usize;
    }
    image
}
