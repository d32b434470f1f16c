//! Data the renderer consumes from the scene each frame.
//!
//! The scene owns all of it; the renderer only borrows it for the duration
//! of one `FramePipeline::render` call.

mod aabb;
mod camera;
mod drawable;
mod light;
mod material;
mod transform;

pub use aabb::Aabb;
pub use camera::{Camera, Frustum};
pub use drawable::Drawable;
pub use light::{primary_directional, Light};
pub use material::{Material, MaterialFlags, TextureSlot};
pub use transform::Transform;

/// Everything one frame needs, already split by the caller.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    pub camera: &'a Camera,
    pub lights: &'a [Light],
    pub opaque: &'a [Drawable],
    pub transparent: &'a [Drawable],
    pub shadow_casters: &'a [Drawable],
}

impl<'a> FrameInput<'a> {
    /// Opaque geometry that also casts shadows.
    pub fn opaque_only(camera: &'a Camera, lights: &'a [Light], opaque: &'a [Drawable]) -> Self {
        Self {
            camera,
            lights,
            opaque,
            transparent: &[],
            shadow_casters: opaque,
        }
    }
}
