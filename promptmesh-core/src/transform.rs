/// 3D transformation matrices and damped rotation state
use nalgebra::{Matrix4, Vector3};

/// Per-frame exponential smoothing factor applied by viewer sessions.
pub const DEFAULT_SMOOTHING: f32 = 0.1;

/// Pitch (`x`) and yaw (`y`) of a displayed object, in radians.
///
/// `target_*` is written by input handling; `current_*` chases it once per
/// frame through [`RotationState::advance`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationState {
    pub current_x: f32,
    pub current_y: f32,
    pub target_x: f32,
    pub target_y: f32,
}

impl RotationState {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Add to the target angles (in radians). No clamping on either axis.
    pub fn nudge_target(&mut self, pitch: f32, yaw: f32) {
        self.target_x += pitch;
        self.target_y += yaw;
    }

    /// Move the current angles a `factor` fraction of the way to the target.
    pub fn advance(&mut self, factor: f32) {
        self.current_x += (self.target_x - self.current_x) * factor;
        self.current_y += (self.target_y - self.current_y) * factor;
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Rotation for the current pitch and yaw of a rotation state.
    pub fn rotation_matrix(rotation: &RotationState) -> Matrix4<f32> {
        let rx = Matrix4::new_rotation(Vector3::new(rotation.current_x, 0.0, 0.0));
        let ry = Matrix4::new_rotation(Vector3::new(0.0, rotation.current_y, 0.0));

        // Pitch is applied after yaw so dragging vertically always tilts toward the viewer.
        rx * ry
    }

    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Create a scale matrix
    pub fn scale_matrix(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }

    /// Create a model-view-projection matrix
    pub fn mvp_matrix(
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Matrix4<f32> {
        projection * view * model
    }
}
