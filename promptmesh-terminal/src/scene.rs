//! Scene graph owned by one viewer session: camera, two lights and the
//! displayed object.

use std::rc::Rc;

use nalgebra::{Matrix4, Vector3};
use promptmesh_core::{
    normalize, Camera, GeometryError, NormalizedTransform, ParsedMesh, RotationState, Transform,
    NORMALIZED_RADIUS,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in (normalized).
    pub direction: Vector3<f32>,
    pub intensity: f32,
}

/// Lighting and lens parameters for a new scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    pub ambient: f32,
    pub directional: f32,
    pub light_direction: Vector3<f32>,
    pub fov: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient: 0.3,
            directional: 0.8,
            light_direction: Vector3::new(-0.5, -1.0, -1.0),
            fov: std::f32::consts::FRAC_PI_4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Solid,
    Points,
}

/// Renderable built from a shared, never-mutated mesh.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh: Rc<ParsedMesh>,
    pub transform: NormalizedTransform,
    pub normals: Vec<Vector3<f32>>,
    pub kind: ObjectKind,
    rotation: Matrix4<f32>,
}

impl SceneObject {
    pub fn build(mesh: Rc<ParsedMesh>, transform: NormalizedTransform) -> Result<Self, GeometryError> {
        mesh.validate()?;
        let kind = if mesh.is_point_cloud() {
            ObjectKind::Points
        } else {
            ObjectKind::Solid
        };
        let normals = match kind {
            ObjectKind::Solid => mesh.vertex_normals(),
            ObjectKind::Points => Vec::new(),
        };
        Ok(Self {
            mesh,
            transform,
            normals,
            kind,
            rotation: Matrix4::identity(),
        })
    }

    /// The generic stand-in shown when an asset cannot be displayed.
    pub fn fallback_cube() -> Self {
        let cube = ParsedMesh::unit_cube();
        let transform = normalize(&cube);
        let normals = cube.vertex_normals();
        Self {
            mesh: Rc::new(cube),
            transform,
            normals,
            kind: ObjectKind::Solid,
            rotation: Matrix4::identity(),
        }
    }

    pub fn set_rotation(&mut self, rotation: &RotationState) {
        self.rotation = Transform::rotation_matrix(rotation);
    }

    pub fn rotation_matrix(&self) -> &Matrix4<f32> {
        &self.rotation
    }

    /// Rotation applied after recentering and scaling.
    pub fn model_matrix(&self) -> Matrix4<f32> {
        self.rotation * self.transform.matrix()
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub camera: Camera,
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    pub object: SceneObject,
}

impl Scene {
    pub fn new(object: SceneObject, settings: &SceneSettings) -> Self {
        let mut camera = Camera::default();
        camera.fov = settings.fov;
        camera.frame_sphere(NORMALIZED_RADIUS);
        Self {
            camera,
            ambient: AmbientLight {
                intensity: settings.ambient,
            },
            directional: DirectionalLight {
                direction: settings
                    .light_direction
                    .try_normalize(1e-12)
                    .unwrap_or_else(|| -Vector3::z()),
                intensity: settings.directional,
            },
            object,
        }
    }

    /// Recompute the camera for a new drawable size and keep the model framed.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.camera.set_viewport(width, height);
        self.camera.frame_sphere(NORMALIZED_RADIUS);
    }

    /// Lambert term plus ambient fill for a world-space normal, in `[0, 1]`.
    pub fn shade(&self, normal: &Vector3<f32>) -> f32 {
        let diffuse = normal.dot(&-self.directional.direction).max(0.0);
        (self.ambient.intensity + self.directional.intensity * diffuse).clamp(0.0, 1.0)
    }
}
