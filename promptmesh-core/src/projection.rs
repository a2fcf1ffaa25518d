/// Camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3};

/// Radius of the sphere enclosing a normalized mesh (half-diagonal of `[-1, 1]^3`).
pub const NORMALIZED_RADIUS: f32 = 1.732_050_8;

/// Camera configuration for 3D rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 5.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            fov: std::f32::consts::PI / 4.0, // 45 degrees
            aspect: aspect_ratio(width as f32, height as f32),
            near: 0.1,
            far: 100.0,
        }
    }

    /// Back the camera off along +Z until a sphere of `radius` at the origin
    /// fits the narrower field of view, with a small margin.
    pub fn frame_sphere(&mut self, radius: f32) {
        let half_vertical = self.fov / 2.0;
        let half_horizontal = (half_vertical.tan() * self.aspect).atan();
        let half = half_vertical.min(half_horizontal);
        let distance = radius / half.sin() * 1.05;
        self.target = Point3::origin();
        self.position = Point3::new(0.0, 0.0, distance);
        self.far = self.far.max(distance + radius * 2.0);
    }

    /// Update the aspect ratio after the drawing surface was resized.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.aspect = aspect_ratio(width, height);
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// Perspective projection matrix
    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    /// Combined projection * view matrix.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Project a point through a full model-view-projection matrix to screen
    /// space. Returns `(x, y, depth)` with depth in NDC (`-1` near, `1` far),
    /// or `None` when the point falls outside the view volume.
    pub fn project_to_screen(
        mvp: &Matrix4<f32>,
        point: &Point3<f32>,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32, f32)> {
        let clip = mvp * point.to_homogeneous();

        // Points at or behind the eye plane
        if clip.w <= 1e-6 {
            return None;
        }

        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let depth = clip.z / clip.w;

        // Clip test
        if !(-1.0..=1.0).contains(&ndc_x)
            || !(-1.0..=1.0).contains(&ndc_y)
            || !(-1.0..=1.0).contains(&depth)
        {
            return None;
        }

        // Convert to screen space
        let screen_x = (ndc_x + 1.0) * 0.5 * width as f32;
        let screen_y = (1.0 - ndc_y) * 0.5 * height as f32;

        Some((screen_x, screen_y, depth))
    }
}

fn aspect_ratio(width: f32, height: f32) -> f32 {
    if width > 0.0 && height > 0.0 {
        width / height
    } else {
        1.0
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}
