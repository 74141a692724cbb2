use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec2, Vec3};

use crate::config::CameraConfig;
use crate::input::{FrameInput, MouseButton, NamedKey};

const PITCH_LIMIT_DEGREES: f32 = 89.0;
const SPEED_MULTIPLIER: f32 = 3.0;

/// Per-frame camera record read by the culling pass and both shading
/// paths. 208 bytes, matching the WGSL `CameraUniforms` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl CameraUniform {
    pub fn new(view: Mat4, proj: Mat4, viewport: UVec2, near_plane: f32, far_plane: f32) -> Self {
        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            inv_proj: proj.inverse().to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            viewport_width: viewport.x as f32,
            viewport_height: viewport.y as f32,
            near_plane,
            far_plane,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn inv_proj_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.inv_proj)
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }

    pub fn viewport(&self) -> Vec2 {
        Vec2::new(self.viewport_width, self.viewport_height)
    }
}

/// Right-handed perspective projection with `[0, 1]` depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub aspect: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near_plane, self.far_plane)
    }
}

/// Fly camera driven by one input sample per frame.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    yaw: f32,
    pitch: f32,
    move_speed: f32,
    sensitivity: f32,
    projection: Projection,
    viewport: UVec2,
}

impl Camera {
    pub fn new(config: &CameraConfig, viewport: UVec2) -> Self {
        let mut camera = Self {
            position: Vec3::new(-7.0, 2.0, 0.0),
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            yaw: 0.0,
            pitch: 0.0,
            move_speed: config.move_speed,
            sensitivity: config.sensitivity,
            projection: Projection {
                fov_y: config.fov_y_degrees.to_radians(),
                aspect: aspect(viewport),
                near_plane: config.near_plane,
                far_plane: config.far_plane,
            },
            viewport,
        };
        camera.rotate(0.0, 0.0);
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    pub fn resize(&mut self, viewport: UVec2) {
        self.viewport = viewport;
        self.projection.aspect = aspect(viewport);
    }

    /// Yaw right by `dx` and pitch up by `-dy`, both in degrees.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx;
        self.pitch = (self.pitch - dy).clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);

        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front =
            Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(Vec3::Y).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    /// Applies one frame of input. `delta_ms` is the frame time in
    /// milliseconds.
    pub fn process_input(&mut self, input: &FrameInput, delta_ms: f32) {
        if input.is_mouse_button_down(MouseButton::LEFT) && input.mouse_delta != Vec2::ZERO {
            let delta = input.mouse_delta * self.sensitivity;
            self.rotate(delta.x, delta.y);
        }

        let mut direction = Vec3::ZERO;
        for (key, axis) in [
            ('W', self.front),
            ('S', -self.front),
            ('D', self.right),
            ('A', -self.right),
            ('E', self.up),
            ('Q', -self.up),
        ] {
            if input.is_char_down(key) {
                direction += axis;
            }
        }

        let mut speed = self.move_speed * delta_ms;
        if input.any_down(&[NamedKey::LeftShift, NamedKey::RightShift]) {
            speed *= SPEED_MULTIPLIER;
        }
        if input.any_down(&[NamedKey::LeftAlt, NamedKey::RightAlt]) {
            speed /= SPEED_MULTIPLIER;
        }

        if direction.length_squared() > 0.0 {
            self.position += direction.normalize() * speed;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, Vec3::Y)
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform::new(
            self.view_matrix(),
            self.projection.matrix(),
            self.viewport,
            self.projection.near_plane,
            self.projection.far_plane,
        )
    }
}

fn aspect(viewport: UVec2) -> f32 {
    if viewport.y == 0 {
        1.0
    } else {
        viewport.x as f32 / viewport.y as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputState, KeyCode};

    fn camera() -> Camera {
        Camera::new(&CameraConfig::default(), UVec2::new(800, 600))
    }

    #[test]
    fn uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 208);
        let uniform = camera().uniform();
        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(f32::from_le_bytes(bytes[192..196].try_into().unwrap()), 800.0);
        assert_eq!(f32::from_le_bytes(bytes[200..204].try_into().unwrap()), 0.1);
        assert_eq!(f32::from_le_bytes(bytes[204..208].try_into().unwrap()), 1000.0);
    }

    #[test]
    fn starts_looking_down_positive_x() {
        let camera = camera();
        assert!((camera.front() - Vec3::X).length() < 1e-6);
        let view = camera.view_matrix();
        let ahead = view.transform_point3(camera.position() + Vec3::X * 5.0);
        assert!((ahead - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn forward_key_moves_along_front() {
        let mut camera = camera();
        let input = InputState::new();
        input.set_key_down(KeyCode::Character('W'));
        camera.process_input(&input.snapshot(), 1000.0);
        assert!((camera.position() - Vec3::new(-3.0, 2.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn shift_and_alt_scale_speed() {
        let input = InputState::new();
        input.set_key_down(KeyCode::Character('D'));
        input.set_key_down(KeyCode::Named(NamedKey::LeftShift));
        let mut fast = camera();
        fast.process_input(&input.snapshot(), 100.0);
        assert!((fast.position().z - 1.2).abs() < 1e-4);

        input.set_key_up(KeyCode::Named(NamedKey::LeftShift));
        input.set_key_down(KeyCode::Named(NamedKey::RightAlt));
        let mut slow = camera();
        slow.process_input(&input.snapshot(), 300.0);
        assert!((slow.position().z - 0.4).abs() < 1e-4);
    }

    #[test]
    fn mouse_rotates_only_while_dragging() {
        let input = InputState::new();
        input.add_mouse_motion(Vec2::new(100.0, 0.0));
        let mut camera = camera();
        camera.process_input(&input.snapshot(), 16.0);
        assert!((camera.front() - Vec3::X).length() < 1e-6);

        input.set_mouse_button_down(MouseButton::LEFT);
        input.add_mouse_motion(Vec2::new(600.0, 0.0));
        camera.process_input(&input.snapshot(), 16.0);
        assert!((camera.front() - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera();
        camera.rotate(0.0, -500.0);
        assert!(camera.front().y < 1.0);
        assert!((camera.front().y - 89f32.to_radians().sin()).abs() < 1e-5);
    }

    #[test]
    fn resize_updates_aspect_and_viewport() {
        let mut camera = camera();
        camera.resize(UVec2::new(1600, 400));
        assert_eq!(camera.projection().aspect, 4.0);
        assert_eq!(camera.uniform().viewport(), Vec2::new(1600.0, 400.0));
    }
}
