use glam::{Mat3, Mat4, Vec3};
use texgrid_common::{CameraConfig, Rotation};

/// Position plus pitch/yaw/roll, producing a left-handed view matrix.
///
/// The view matrix is cached: setters only store values, and the matrix is
/// rebuilt by [`Camera::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    rotation: Rotation,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Camera at the origin looking down +Z, view matrix identity until the
    /// first `render`.
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Rotation::ZERO,
            view: Mat4::IDENTITY,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self::new();
        camera.position = config.position;
        camera.rotation = config.rotation;
        camera.render();
        camera
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Vec3::new(x, y, z);
    }

    /// Angles in degrees.
    pub fn set_rotation(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation = Rotation::new(pitch, yaw, roll);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rebuild the view matrix from the current position and rotation.
    ///
    /// Pitch is applied first, then yaw, then roll. The rotated `+Z` look
    /// vector and `+Y` up vector feed a left-handed look-at.
    pub fn render(&mut self) {
        let (pitch, yaw, roll) = self.rotation.to_radians();
        let orientation =
            Mat3::from_rotation_z(roll) * Mat3::from_rotation_y(yaw) * Mat3::from_rotation_x(pitch);

        let look = orientation * Vec3::Z;
        let up = orientation * Vec3::Y;
        self.view = Mat4::look_at_lh(self.position, self.position + look, up);
    }

    /// Matrix from the most recent [`Camera::render`].
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn unrotated_camera_is_a_translation() {
        let mut cam = Camera::new();
        cam.set_position(0.0, 0.0, -5.0);
        cam.set_rotation(0.0, 0.0, 0.0);
        cam.render();
        assert!(
            cam.view_matrix()
                .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)), 1e-6)
        );
    }

    #[test]
    fn pitch_applies_before_yaw() {
        let mut cam = Camera::new();
        cam.set_rotation(90.0, 90.0, 0.0);
        cam.render();
        // Row 2 of a left-handed look-at holds the forward axis.
        let forward = cam.view_matrix().row(2).truncate();
        assert!(forward.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-5), "{forward}");
    }

    #[test]
    fn yaw_applies_before_roll() {
        let mut cam = Camera::new();
        cam.set_rotation(0.0, 90.0, 90.0);
        cam.render();
        let view = cam.view_matrix();
        // Yaw swings +Z onto +X, then roll carries it up to +Y.
        assert!(view.row(2).truncate().abs_diff_eq(Vec3::Y, 1e-5), "{view}");
        assert!(view.row(1).truncate().abs_diff_eq(-Vec3::X, 1e-5), "{view}");
    }

    #[test]
    fn all_three_axes_compose_pitch_yaw_roll() {
        let mut cam = Camera::new();
        cam.set_position(0.0, 0.0, -15.0);
        cam.set_rotation(-30.0, 30.0, -53.0);
        cam.render();
        let view = cam.view_matrix();

        let right = Vec4::new(0.521_187, -0.691_639, -0.5, -7.5);
        let up = Vec4::new(0.541_185, 0.720_846, -0.433_013, -6.495_191);
        let forward = Vec4::new(0.659_911, -0.044_912, 0.75, 11.25);
        assert!(view.row(0).abs_diff_eq(right, 1e-5), "{view}");
        assert!(view.row(1).abs_diff_eq(up, 1e-5), "{view}");
        assert!(view.row(2).abs_diff_eq(forward, 1e-5), "{view}");
        assert_eq!(view.row(3), Vec4::W);
    }

    #[test]
    fn render_is_idempotent() {
        let mut cam = Camera::new();
        cam.set_position(0.0, 0.0, -15.0);
        cam.set_rotation(-30.0, 30.0, -53.0);
        cam.render();
        let first = cam.view_matrix().to_cols_array();
        cam.render();
        assert_eq!(cam.view_matrix().to_cols_array(), first);
    }

    #[test]
    fn setters_do_not_touch_the_view() {
        let mut cam = Camera::new();
        cam.set_position(1.0, 2.0, 3.0);
        cam.set_rotation(10.0, 20.0, 30.0);
        assert_eq!(cam.view_matrix(), Mat4::IDENTITY);
        assert_eq!(cam.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cam.rotation(), Rotation::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn from_config_renders_immediately() {
        let cam = Camera::from_config(&CameraConfig::default());
        assert_eq!(cam.position(), Vec3::new(0.0, 0.0, -5.0));
        assert_ne!(cam.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn view_maps_eye_to_origin() {
        let mut cam = Camera::new();
        cam.set_position(3.0, -4.0, 7.0);
        cam.set_rotation(-30.0, 30.0, -53.0);
        cam.render();
        let eye = cam.view_matrix().transform_point3(cam.position());
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-4), "{eye}");
    }
}
