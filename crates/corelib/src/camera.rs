use crate::{Mat4, Vec3};

/// Lowest/highest pitch in degrees; past this the view would flip over the pole.
pub const PITCH_LIMIT: f32 = 89.0;
/// Zoom range for the vertical field of view, in degrees.
pub const FOV_MIN: f32 = 1.0;
pub const FOV_MAX: f32 = 90.0;

/// Keyboard movement relative to the view direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// First-person fly camera driven by pointer deltas, scroll and keys.
///
/// Angles are stored in degrees. `front` is always derived from yaw/pitch and
/// the right vector is derived on demand from `front` and `up`.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    yaw: f32,
    pitch: f32,
    fov: f32,
    sensitivity: f32,
    speed: f32,
    position: Vec3,
    front: Vec3,
    up: Vec3,
    world_up: Vec3,
    view: Mat4,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Camera at (0, 0, 3) looking down -Z: yaw -90°, pitch 0°, fov 45°.
    pub fn new() -> Self {
        let mut camera = Self {
            yaw: -90.0,
            pitch: 0.0,
            fov: 45.0,
            sensitivity: 0.05,
            speed: 0.0,
            position: Vec3::new(0.0, 0.0, 3.0),
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            world_up: Vec3::Y,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.refresh_front();
        camera.update_view();
        camera
    }

    /// Applies a pointer move from `(last_x, last_y)` to `(current_x, current_y)`.
    ///
    /// Moving the pointer up raises the pitch. Returns the new front vector.
    pub fn update_front(&mut self, current_x: f64, current_y: f64, last_x: f64, last_y: f64) -> Vec3 {
        let x_offset = (current_x - last_x) as f32 * self.sensitivity;
        let y_offset = (last_y - current_y) as f32 * self.sensitivity;
        self.yaw += x_offset;
        self.pitch = (self.pitch + y_offset).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.refresh_front();
        self.front
    }

    /// Applies a scroll step; positive `y_offset` zooms in.
    ///
    /// Inside the zoom range the offset is integrated and the result saturated
    /// to the range. A field of view already outside the range (set through
    /// [`set_fov`](Self::set_fov)) snaps to the nearer bound and the offset of
    /// that call is dropped.
    pub fn update_zoom(&mut self, _x_offset: f32, y_offset: f32) -> f32 {
        self.fov = if self.fov < FOV_MIN {
            FOV_MIN
        } else if self.fov > FOV_MAX {
            FOV_MAX
        } else {
            (self.fov - y_offset).clamp(FOV_MIN, FOV_MAX)
        };
        self.fov
    }

    /// Moves one step of [`speed`](Self::speed) along the view basis.
    pub fn process_keyboard(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.position += self.speed * self.front,
            Direction::Down => self.position -= self.speed * self.front,
            Direction::Left => self.position -= self.right() * self.speed,
            Direction::Right => self.position += self.right() * self.speed,
        }
    }

    /// Recomputes the cached view matrix, using world up as the reference.
    pub fn update_view(&mut self) -> Mat4 {
        self.view = Mat4::look_at_rh(self.position, self.position + self.front, self.world_up);
        self.view
    }

    /// Recomputes the cached perspective projection (depth range 0..1).
    pub fn update_projection(&mut self, width: f32, height: f32, near: f32, far: f32) -> Mat4 {
        let aspect = width / height.max(f32::EPSILON);
        self.projection = Mat4::perspective_rh(self.fov.to_radians(), aspect.max(1e-6), near, far);
        self.projection
    }

    /// `normalize(front × up)`, derived from the current orientation.
    #[inline]
    pub fn right(&self) -> Vec3 {
        self.front.cross(self.up).normalize_or_zero()
    }

    fn refresh_front(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
        self.refresh_front();
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Sets the pitch, clamped to ±[`PITCH_LIMIT`].
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.refresh_front();
    }

    #[inline]
    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// Sets the field of view verbatim; [`update_zoom`](Self::update_zoom) pulls it back into range.
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
    }

    #[inline]
    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Distance covered per key step: `multiplier * delta_time`.
    pub fn set_speed(&mut self, multiplier: f32, delta_time: f32) {
        self.speed = multiplier * delta_time;
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[inline]
    pub fn front(&self) -> Vec3 {
        self.front
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
    }

    #[inline]
    pub fn world_up(&self) -> Vec3 {
        self.world_up
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn defaults_look_down_negative_z() {
        let cam = Camera::new();
        assert_eq!(cam.yaw(), -90.0);
        assert_eq!(cam.pitch(), 0.0);
        assert_eq!(cam.fov(), 45.0);
        assert_eq!(cam.sensitivity(), 0.05);
        assert!(approx(cam.front(), Vec3::NEG_Z));
        assert!(approx(cam.right(), Vec3::X));
    }

    #[test]
    fn pointer_up_raises_pitch_and_clamps() {
        let mut cam = Camera::new();
        cam.set_sensitivity(1.0);
        // 120 pixels up at sensitivity 1 would be 120 degrees.
        cam.update_front(0.0, 0.0, 0.0, 120.0);
        assert_eq!(cam.pitch(), 89.0);
        assert!((cam.front().length() - 1.0).abs() < 1e-5);

        cam.update_front(0.0, 400.0, 0.0, 0.0);
        assert_eq!(cam.pitch(), -89.0);
    }

    #[test]
    fn horizontal_motion_turns_yaw() {
        let mut cam = Camera::new();
        let front = cam.update_front(1800.0, 0.0, 0.0, 0.0);
        // 1800 px * 0.05 = 90 degrees: from -Z to +X.
        assert!((cam.yaw() - 0.0).abs() < 1e-4);
        assert!(approx(front, Vec3::X));
        assert!(approx(cam.right(), Vec3::Z));
    }

    #[test]
    fn zoom_pins_at_lower_bound() {
        let mut cam = Camera::new();
        cam.set_fov(2.0);
        for _ in 0..5 {
            let fov = cam.update_zoom(0.0, 5.0);
            assert!(fov >= 1.0);
        }
        assert_eq!(cam.fov(), 1.0);
    }

    #[test]
    fn zoom_snaps_out_of_range_values() {
        let mut cam = Camera::new();
        cam.set_fov(120.0);
        assert_eq!(cam.update_zoom(0.0, 30.0), 90.0);
        cam.set_fov(-5.0);
        assert_eq!(cam.update_zoom(0.0, -30.0), 1.0);
        assert_eq!(cam.update_zoom(0.0, -4.0), 5.0);
    }

    #[test]
    fn keyboard_moves_along_basis() {
        let mut cam = Camera::new();
        cam.set_speed(2.5, 0.4);
        assert!((cam.speed() - 1.0).abs() < 1e-6);

        cam.process_keyboard(Direction::Up);
        assert!(approx(cam.position(), Vec3::new(0.0, 0.0, 2.0)));
        cam.process_keyboard(Direction::Right);
        assert!(approx(cam.position(), Vec3::new(1.0, 0.0, 2.0)));
        cam.process_keyboard(Direction::Left);
        cam.process_keyboard(Direction::Down);
        assert!(approx(cam.position(), Vec3::new(0.0, 0.0, 3.0)));
    }

    #[test]
    fn right_tracks_orientation_changes() {
        let mut cam = Camera::new();
        cam.set_yaw(0.0);
        cam.set_speed(1.0, 1.0);
        cam.process_keyboard(Direction::Right);
        assert!(approx(cam.position(), Vec3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn view_looks_along_front() {
        let mut cam = Camera::new();
        let view = cam.update_view();
        let ahead = view.transform_point3(cam.position() + cam.front());
        assert!(approx(ahead, Vec3::new(0.0, 0.0, -1.0)));
        assert_eq!(cam.view(), view);
    }

    #[test]
    fn projection_uses_fov_and_aspect() {
        let mut cam = Camera::new();
        let proj = cam.update_projection(1600.0, 900.0, 0.1, 100.0);
        let expected = Mat4::perspective_rh(45f32.to_radians(), 1600.0 / 900.0, 0.1, 100.0);
        assert_eq!(proj, expected);
        assert!(cam.proj_view().to_cols_array().iter().all(|f| f.is_finite()));
    }
}
