/// Bounding volume and presentation transform for decoded meshes
use nalgebra::{Matrix4, Point3, Vector3};

use crate::geometry::ParsedMesh;
use crate::transform::Transform;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    /// Bounds of a point set; an empty set yields a zero-sized box at the origin.
    pub fn of(points: &[Point3<f32>]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: Point3::origin(),
                max: Point3::origin(),
            };
        };
        points.iter().skip(1).fold(
            Self {
                min: *first,
                max: *first,
            },
            |b, p| Self {
                min: b.min.inf(p),
                max: b.max.sup(p),
            },
        )
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

/// Centering translation plus uniform scale that fits a mesh into a
/// `[-1, 1]` cube along its longest axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedTransform {
    pub center_offset: Vector3<f32>,
    pub scale: f32,
}

impl NormalizedTransform {
    pub fn identity() -> Self {
        Self {
            center_offset: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Model matrix that recenters then scales.
    pub fn matrix(&self) -> Matrix4<f32> {
        let s = self.scale;
        Transform::scale_matrix(s, s, s)
            * Transform::translation_matrix(
                -self.center_offset.x,
                -self.center_offset.y,
                -self.center_offset.z,
            )
    }

    pub fn apply(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::from((point.coords - self.center_offset) * self.scale)
    }
}

impl Default for NormalizedTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Compute the presentation transform for `mesh` without touching it.
pub fn normalize(mesh: &ParsedMesh) -> NormalizedTransform {
    let bounds = Bounds::of(&mesh.vertices);
    let longest = bounds.extent().max();
    // Only a zero extent is degenerate; tiny meshes still fill the box.
    let scale = match 2.0 / longest {
        s if longest > 0.0 && s.is_finite() && s > 0.0 => s,
        _ => 1.0,
    };
    NormalizedTransform {
        center_offset: bounds.center().coords,
        scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_has_unit_scale() {
        let mesh = ParsedMesh::new(vec![Point3::new(3.0, -2.0, 7.5)], vec![]);
        let t = normalize(&mesh);
        assert_eq!(t.scale, 1.0);
        assert_eq!(t.center_offset, Vector3::new(3.0, -2.0, 7.5));
    }

    #[test]
    fn test_tiny_extent_is_still_scaled() {
        let mesh = ParsedMesh::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1e-8, 0.0, 0.0)],
            vec![],
        );
        let t = normalize(&mesh);
        assert!((t.scale / 2e8 - 1.0).abs() < 1e-3);
        let hi = t.apply(&mesh.vertices[1]);
        assert!((hi.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_mesh() {
        let t = normalize(&ParsedMesh::default());
        assert_eq!(t, NormalizedTransform::identity());
    }

    #[test]
    fn test_longest_axis_spans_two_units() {
        let mesh = ParsedMesh::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 1.0, 2.0)],
            vec![],
        );
        let t = normalize(&mesh);
        assert!((t.scale - 0.5).abs() < 1e-6);
        assert_eq!(t.center_offset, Vector3::new(2.0, 0.5, 1.0));

        let lo = t.apply(&mesh.vertices[0]);
        let hi = t.apply(&mesh.vertices[1]);
        assert!((lo.x + 1.0).abs() < 1e-6);
        assert!((hi.x - 1.0).abs() < 1e-6);

        let via_matrix = t.matrix().transform_point(&mesh.vertices[1]);
        assert!((via_matrix - hi).norm() < 1e-6);
    }

    #[test]
    fn test_mesh_is_not_mutated() {
        let mesh = ParsedMesh::unit_cube();
        let before = mesh.clone();
        let _ = normalize(&mesh);
        assert_eq!(mesh, before);
    }
}
