/// Geometry primitives for decoded model assets
use nalgebra::{Point3, Vector3};

use crate::error::GeometryError;

/// Indices of a triangle's three corners in the vertex buffer.
pub type TriangleIndices = [u32; 3];

/// A decoded asset: flat vertex buffer plus an optional triangle index buffer.
///
/// The mesh is never mutated once decoded; presentation transforms are applied
/// at render time so the same value can back any number of viewer sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMesh {
    pub vertices: Vec<Point3<f32>>,
    pub triangles: Vec<TriangleIndices>,
    /// Per-vertex RGB, present when the asset declares color properties.
    pub colors: Option<Vec<[u8; 3]>>,
}

impl ParsedMesh {
    pub fn new(vertices: Vec<Point3<f32>>, triangles: Vec<TriangleIndices>) -> Self {
        Self {
            vertices,
            triangles,
            colors: None,
        }
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// A mesh without triangles is displayed as a point set.
    pub fn is_point_cloud(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Check that the buffers can be turned into a renderable object.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.vertices.is_empty() {
            return Err(GeometryError::Empty);
        }
        if let Some(index) = self
            .vertices
            .iter()
            .position(|v| !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()))
        {
            return Err(GeometryError::NonFinite { index });
        }
        let count = self.vertices.len();
        for (triangle, corners) in self.triangles.iter().enumerate() {
            if let Some(&vertex) = corners.iter().find(|&&i| i as usize >= count) {
                return Err(GeometryError::IndexOutOfRange {
                    triangle,
                    vertex,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Per-vertex normals accumulated from face winding.
    ///
    /// Face normals are summed unnormalized, so larger faces weigh more.
    /// Vertices touched by no face (or only degenerate ones) get +Z.
    pub fn vertex_normals(&self) -> Vec<Vector3<f32>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for &[a, b, c] in &self.triangles {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            let (Some(v0), Some(v1), Some(v2)) = (
                self.vertices.get(a),
                self.vertices.get(b),
                self.vertices.get(c),
            ) else {
                continue;
            };
            let face = (v1 - v0).cross(&(v2 - v0));
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::z))
            .collect()
    }

    /// Axis-aligned unit cube centered on the origin, wound counter-clockwise
    /// when seen from outside.
    pub fn unit_cube() -> Self {
        let h = 0.5;
        let vertices = vec![
            Point3::new(-h, -h, -h),
            Point3::new(h, -h, -h),
            Point3::new(h, h, -h),
            Point3::new(-h, h, -h),
            Point3::new(-h, -h, h),
            Point3::new(h, -h, h),
            Point3::new(h, h, h),
            Point3::new(-h, h, h),
        ];
        let triangles = vec![
            // Front (+Z)
            [4, 5, 6],
            [4, 6, 7],
            // Back (-Z)
            [1, 0, 3],
            [1, 3, 2],
            // Top (+Y)
            [3, 7, 6],
            [3, 6, 2],
            // Bottom (-Y)
            [0, 1, 5],
            [0, 5, 4],
            // Right (+X)
            [1, 2, 6],
            [1, 6, 5],
            // Left (-X)
            [0, 4, 7],
            [0, 7, 3],
        ];
        Self::new(vertices, triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_normals_point_outward() {
        let cube = ParsedMesh::unit_cube();
        assert!(cube.validate().is_ok());
        for (vertex, normal) in cube.vertices.iter().zip(cube.vertex_normals()) {
            assert!(vertex.coords.dot(&normal) > 0.0);
            assert!((normal.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_point_cloud_normals_default() {
        let mesh = ParsedMesh::new(vec![Point3::new(1.0, 2.0, 3.0)], vec![]);
        assert!(mesh.is_point_cloud());
        assert_eq!(mesh.vertex_normals(), vec![Vector3::z()]);
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        assert_eq!(ParsedMesh::default().validate(), Err(GeometryError::Empty));

        let nan = ParsedMesh::new(vec![Point3::origin(), Point3::new(f32::NAN, 0.0, 0.0)], vec![]);
        assert_eq!(nan.validate(), Err(GeometryError::NonFinite { index: 1 }));

        let dangling = ParsedMesh::new(vec![Point3::origin(); 3], vec![[0, 1, 7]]);
        assert_eq!(
            dangling.validate(),
            Err(GeometryError::IndexOutOfRange {
                triangle: 0,
                vertex: 7,
                count: 3
            })
        );
    }
}
