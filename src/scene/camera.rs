use glam::{Mat4, Quat, Vec3, Vec4};

use super::aabb::Aabb;

/// Six clip planes (`xyz` = inward normal, `w` = distance), extracted for
/// wgpu's `[0, 1]` depth range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_projection(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let length = plane.truncate().length();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    /// Conservative test: may report boxes near a frustum corner as visible.
    pub fn intersects_aabb(&self, bounds: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), bounds.max, bounds.min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }
}

/// Perspective camera with eagerly cached matrices.
///
/// Changing fov/aspect/near/far rebuilds the projection, changing the
/// transform rebuilds the view; either rebuilds the frustum.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Vec3,
    rotation: Quat,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: Frustum,
}

impl Camera {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y,
            aspect,
            near,
            far,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            frustum: Frustum::from_view_projection(Mat4::IDENTITY),
        };
        camera.rebuild_view();
        camera.rebuild_projection();
        camera
    }

    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation.normalize();
        self.rebuild_view();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.rebuild_view();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.rebuild_view();
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        let world = Mat4::look_at_rh(eye, target, up).inverse();
        let (_, rotation, _) = world.to_scale_rotation_translation();
        self.set_transform(eye, rotation);
    }

    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.rebuild_projection();
    }

    pub fn set_fov_y(&mut self, fov_y: f32) {
        self.fov_y = fov_y;
        self.rebuild_projection();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.rebuild_projection();
    }

    pub fn set_near(&mut self, near: f32) {
        self.near = near;
        self.rebuild_projection();
    }

    pub fn set_far(&mut self, far: f32) {
        self.far = far;
        self.rebuild_projection();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Distance of `point` in front of the camera along its view axis.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }

    fn rebuild_view(&mut self) {
        self.view = Mat4::from_rotation_translation(self.rotation, self.position).inverse();
        self.rebuild_frustum();
    }

    fn rebuild_projection(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        self.rebuild_frustum();
    }

    fn rebuild_frustum(&mut self) {
        self.view_projection = self.projection * self.view;
        self.frustum = Frustum::from_view_projection(self.view_projection);
    }
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self::new(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        camera.look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_proj_is_reasonable() {
        let cam = Camera::default();
        let vp = cam.view_projection();
        let id = vp * vp.inverse();
        assert!(id.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn look_at_matches_glam_view_matrix() {
        let mut cam = Camera::new(1.0, 1.5, 0.1, 50.0);
        let eye = Vec3::new(2.0, 3.0, 4.0);
        cam.look_at(eye, Vec3::ZERO, Vec3::Y);
        let expected = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        assert!(cam.view().abs_diff_eq(expected, 1e-5));
        assert!(cam.forward().abs_diff_eq(-eye.normalize(), 1e-5));
    }

    #[test]
    fn projection_follows_parameter_changes() {
        let mut cam = Camera::new(1.0, 1.0, 0.1, 10.0);
        cam.set_aspect(2.0);
        cam.set_far(500.0);
        let expected = Mat4::perspective_rh(1.0, 2.0, 0.1, 500.0);
        assert!(cam.projection().abs_diff_eq(expected, 1e-6));
        assert!(cam
            .view_projection()
            .abs_diff_eq(expected * cam.view(), 1e-6));
    }

    #[test]
    fn frustum_follows_camera_movement() {
        let mut cam = Camera::new(60f32.to_radians(), 1.0, 0.1, 100.0);
        let bounds = Aabb::new(Vec3::new(-0.5, -0.5, -5.5), Vec3::new(0.5, 0.5, -4.5));
        assert!(cam.frustum().intersects_aabb(&bounds));

        cam.set_rotation(Quat::from_rotation_y(std::f32::consts::PI));
        assert!(!cam.frustum().intersects_aabb(&bounds));
        assert!(cam.frustum().contains_point(Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn frustum_rejects_beyond_far_plane() {
        let cam = Camera::new(60f32.to_radians(), 1.0, 0.1, 10.0);
        let beyond = Aabb::new(Vec3::new(-0.5, -0.5, -20.5), Vec3::new(0.5, 0.5, -19.5));
        assert!(!cam.frustum().intersects_aabb(&beyond));
        assert!(!cam.frustum().contains_point(Vec3::new(0.0, 0.0, -0.05)));
    }
}
