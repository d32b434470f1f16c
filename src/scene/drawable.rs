use std::cell::Cell;

use glam::{Mat4, Quat, Vec3};

use super::aabb::Aabb;
use super::transform::Transform;
use crate::renderer::{MaterialHandle, MeshHandle};

/// One renderable instance: mesh + material + world transform + bounds.
///
/// The world box is split into a rotation/scale part, cached until rotation
/// or scale change, and the translation, applied on every query. Moving a
/// drawable therefore never recomputes the oriented extent.
#[derive(Clone, Debug)]
pub struct Drawable {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    transform: Transform,
    local_bounds: Aabb,
    oriented: Cell<Option<(Vec3, Vec3)>>,
}

impl Drawable {
    pub fn new(mesh: MeshHandle, material: MaterialHandle, local_bounds: Aabb) -> Self {
        Self {
            mesh,
            material,
            transform: Transform::default(),
            local_bounds,
            oriented: Cell::new(None),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.set_transform(transform);
        self
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if transform.rotation != self.transform.rotation || transform.scale != self.transform.scale
        {
            self.oriented.set(None);
        }
        self.transform = transform;
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.transform.translation = translation;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.oriented.set(None);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.oriented.set(None);
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }

    pub fn world_bounds(&self) -> Aabb {
        let (offset, extent) = match self.oriented.get() {
            Some(cached) => cached,
            None => {
                let fresh = self.local_bounds.transformed_by(self.transform.linear());
                self.oriented.set(Some(fresh));
                fresh
            }
        };
        Aabb::from_center_extent(self.transform.translation + offset, extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Arena;
    use crate::renderer::Mesh;
    use crate::scene::Material;

    fn handles() -> (MeshHandle, MaterialHandle) {
        let mut meshes: Arena<(), Mesh> = Arena::new();
        let mut materials: Arena<(), Material> = Arena::new();
        (meshes.insert(()), materials.insert(()))
    }

    fn unit_cube() -> Drawable {
        let (mesh, material) = handles();
        Drawable::new(mesh, material, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
    }

    #[test]
    fn translation_keeps_cached_extent() {
        let mut drawable = unit_cube();
        drawable.set_rotation(Quat::from_rotation_y(0.3));
        let _ = drawable.world_bounds();
        let cached = drawable.oriented.get();
        assert!(cached.is_some());

        drawable.set_translation(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(drawable.oriented.get(), cached);
        let bounds = drawable.world_bounds();
        assert!(bounds.center().abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn rotation_or_scale_invalidates_cache() {
        let mut drawable = unit_cube();
        let _ = drawable.world_bounds();
        drawable.set_scale(Vec3::splat(2.0));
        assert!(drawable.oriented.get().is_none());
        assert!(drawable.world_bounds().extent().abs_diff_eq(Vec3::ONE, 1e-6));

        drawable.set_transform(Transform::from_translation(Vec3::Y));
        assert!(drawable.oriented.get().is_none());
        assert!(drawable
            .world_bounds()
            .extent()
            .abs_diff_eq(Vec3::splat(0.5), 1e-6));
    }

    #[test]
    fn set_transform_with_same_orientation_keeps_cache() {
        let mut drawable = unit_cube();
        let _ = drawable.world_bounds();
        drawable.set_transform(Transform::from_translation(Vec3::new(0.0, 3.0, 0.0)));
        assert!(drawable.oriented.get().is_some());
        assert!(drawable
            .world_bounds()
            .min
            .abs_diff_eq(Vec3::new(-0.5, 2.5, -0.5), 1e-6));
    }
}
