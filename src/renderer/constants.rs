//! Uniform and storage blocks shared with the shader programs.
//!
//! Every block is `#[repr(C)]` and built only from 16-byte columns
//! (`vec4`/`mat4x4`), so the Rust layout matches WGSL without padding rules.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::cascades::{Cascade, MAX_CASCADES};
use super::ssao::MAX_SSAO_SAMPLES;
use crate::scene::{Camera, Light, Material};

pub const MAX_POINT_LIGHTS: usize = 16;

type Mat4Raw = [[f32; 4]; 4];

bitflags! {
    /// Which optional passes produced valid output this frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u32 {
        const SHADOWS = 1 << 0;
        const SSAO = 1 << 1;
        const TRANSPARENCY = 1 << 2;
        const BLOOM = 1 << 3;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct FrameConstants {
    pub view: Mat4Raw,
    pub proj: Mat4Raw,
    pub view_proj: Mat4Raw,
    pub inv_view_proj: Mat4Raw,
    pub inv_proj: Mat4Raw,
    pub camera_position: [f32; 4],
    /// width, height, 1/width, 1/height
    pub screen: [f32; 4],
    /// near, far
    pub clip: [f32; 4],
}

impl FrameConstants {
    pub fn new(camera: &Camera, width: u32, height: u32) -> Self {
        let view_proj = camera.view_projection();
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view: camera.view().to_cols_array_2d(),
            proj: camera.projection().to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            inv_proj: camera.projection().inverse().to_cols_array_2d(),
            camera_position: camera.position().extend(1.0).to_array(),
            screen: [w, h, 1.0 / w, 1.0 / h],
            clip: [camera.near(), camera.far(), 0.0, 0.0],
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.proj)
    }

    pub fn view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }

    pub fn inv_view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.inv_view_proj)
    }

    pub fn inv_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.inv_proj)
    }

    pub fn camera_position(&self) -> Vec3 {
        Vec4::from_array(self.camera_position).truncate()
    }
}

/// One element of the per-object storage buffer, indexed by instance.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ObjectConstants {
    pub world: Mat4Raw,
    pub normal_matrix: Mat4Raw,
    /// rgb diffuse, a opacity
    pub diffuse: [f32; 4],
    /// specular, roughness, metalness
    pub surface: [f32; 4],
    /// bound-texture mask, material flags
    pub flags: [u32; 4],
}

impl ObjectConstants {
    pub fn new(world: Mat4, material: &Material) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            normal_matrix: world.inverse().transpose().to_cols_array_2d(),
            diffuse: material.diffuse.extend(material.opacity).to_array(),
            surface: [
                material.specular,
                material.roughness,
                material.metalness,
                0.0,
            ],
            flags: [
                material.bound_texture_mask(),
                material.flags.bits(),
                0,
                0,
            ],
        }
    }

    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }

    pub fn normal_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.normal_matrix)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct CascadeConstants {
    pub view_proj: Mat4Raw,
}

impl CascadeConstants {
    pub fn new(cascade: &Cascade) -> Self {
        Self {
            view_proj: cascade.view_proj.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ShadowConstants {
    pub view_proj: [Mat4Raw; MAX_CASCADES],
    /// far distance of each cascade
    pub splits: [f32; 4],
    /// depth bias, sample spread in texels, 1/resolution
    pub params: [f32; 4],
    /// cascade count, sample count
    pub counts: [u32; 4],
}

impl ShadowConstants {
    pub fn new(
        cascades: &[Cascade],
        bias: f32,
        spread: f32,
        resolution: u32,
        sample_count: u32,
    ) -> Self {
        let mut constants = Self::zeroed();
        for (i, cascade) in cascades.iter().take(MAX_CASCADES).enumerate() {
            constants.view_proj[i] = cascade.view_proj.to_cols_array_2d();
            constants.splits[i] = cascade.far;
        }
        constants.params = [bias, spread, 1.0 / resolution.max(1) as f32, 0.0];
        constants.counts = [
            cascades.len().min(MAX_CASCADES) as u32,
            sample_count.max(1),
            0,
            0,
        ];
        constants
    }

    pub fn cascade_view_proj(&self, index: usize) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj[index])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LightConstants {
    /// xyz travel direction, w = 1 when a directional light is present
    pub sun_direction: [f32; 4],
    /// rgb colour, a intensity
    pub sun_color: [f32; 4],
    pub ambient: [f32; 4],
    pub clear_color: [f32; 4],
    /// xyz position, w radius
    pub point_position: [[f32; 4]; MAX_POINT_LIGHTS],
    /// rgb colour, a intensity
    pub point_color: [[f32; 4]; MAX_POINT_LIGHTS],
    /// point light count, feature flags
    pub counts: [u32; 4],
}

impl LightConstants {
    /// Packs the first directional light and up to `MAX_POINT_LIGHTS` point lights.
    pub fn new(lights: &[Light], ambient: Vec3, clear_color: Vec3, features: FeatureFlags) -> Self {
        let mut constants = Self::zeroed();
        let mut points = 0usize;
        let mut has_sun = false;

        for light in lights {
            match *light {
                Light::Directional {
                    direction,
                    color,
                    intensity,
                } if !has_sun => {
                    has_sun = true;
                    constants.sun_direction = direction.extend(1.0).to_array();
                    constants.sun_color = color.extend(intensity).to_array();
                }
                Light::Directional { .. } => {}
                Light::Point {
                    position,
                    radius,
                    color,
                    intensity,
                } if points < MAX_POINT_LIGHTS => {
                    constants.point_position[points] = position.extend(radius).to_array();
                    constants.point_color[points] = color.extend(intensity).to_array();
                    points += 1;
                }
                Light::Point { .. } => {}
            }
        }

        constants.ambient = ambient.extend(1.0).to_array();
        constants.clear_color = clear_color.extend(1.0).to_array();
        constants.counts = [points as u32, features.bits(), 0, 0];
        constants
    }

    pub fn features(&self) -> FeatureFlags {
        FeatureFlags::from_bits_truncate(self.counts[1])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SsaoConstants {
    pub kernel: [[f32; 4]; MAX_SSAO_SAMPLES],
    /// radius, bias, intensity
    pub params: [f32; 4],
    /// screen size / noise size
    pub noise_scale: [f32; 4],
    /// sample count
    pub counts: [u32; 4],
}

impl SsaoConstants {
    pub fn new(kernel: &[Vec4], radius: f32, bias: f32, intensity: f32, noise_scale: Vec2) -> Self {
        let mut constants = Self::zeroed();
        let count = kernel.len().min(MAX_SSAO_SAMPLES);
        for (dst, src) in constants.kernel.iter_mut().zip(kernel.iter()).take(count) {
            *dst = src.to_array();
        }
        constants.params = [radius, bias, intensity, 0.0];
        constants.noise_scale = [noise_scale.x, noise_scale.y, 0.0, 0.0];
        constants.counts = [count as u32, 0, 0, 0];
        constants
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BloomConstants {
    /// 1/width, 1/height of the level being read
    pub source_texel: [f32; 4],
    /// threshold, filter radius
    pub params: [f32; 4],
}

impl BloomConstants {
    pub fn new(source_width: u32, source_height: u32, threshold: f32, filter_radius: f32) -> Self {
        Self {
            source_texel: [
                1.0 / source_width.max(1) as f32,
                1.0 / source_height.max(1) as f32,
                0.0,
                0.0,
            ],
            params: [threshold, filter_radius, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ToneMapConstants {
    /// exposure, bloom strength
    pub params: [f32; 4],
    /// feature flags
    pub flags: [u32; 4],
}

impl ToneMapConstants {
    pub fn new(exposure: f32, bloom_strength: f32, features: FeatureFlags) -> Self {
        Self {
            params: [exposure, bloom_strength, 0.0, 0.0],
            flags: [features.bits(), 0, 0, 0],
        }
    }

    pub fn features(&self) -> FeatureFlags {
        FeatureFlags::from_bits_truncate(self.flags[0])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DebugConstants {
    /// view selector, cascade layer
    pub mode: [u32; 4],
    /// near, far
    pub params: [f32; 4],
}

impl DebugConstants {
    pub fn new(view: u32, cascade_layer: u32, near: f32, far: f32) -> Self {
        Self {
            mode: [view, cascade_layer, 0, 0],
            params: [near, far, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn blocks_are_multiples_of_sixteen_bytes() {
        for size in [
            size_of::<FrameConstants>(),
            size_of::<ObjectConstants>(),
            size_of::<CascadeConstants>(),
            size_of::<ShadowConstants>(),
            size_of::<LightConstants>(),
            size_of::<SsaoConstants>(),
            size_of::<BloomConstants>(),
            size_of::<ToneMapConstants>(),
            size_of::<DebugConstants>(),
        ] {
            assert_eq!(size % 16, 0);
        }
        assert_eq!(size_of::<FrameConstants>(), 5 * 64 + 3 * 16);
        assert_eq!(size_of::<ObjectConstants>(), 2 * 64 + 3 * 16);
    }

    #[test]
    fn only_first_directional_light_is_packed() {
        let lights = [
            Light::directional(Vec3::NEG_Y, Vec3::ONE, 2.0),
            Light::directional(Vec3::X, Vec3::new(1.0, 0.0, 0.0), 9.0),
            Light::point(Vec3::ONE, 3.0, Vec3::ONE, 1.0),
        ];
        let constants = LightConstants::new(&lights, Vec3::ZERO, Vec3::ZERO, FeatureFlags::SSAO);
        assert_eq!(constants.sun_direction, [0.0, -1.0, 0.0, 1.0]);
        assert_eq!(constants.sun_color[3], 2.0);
        assert_eq!(constants.counts[0], 1);
        assert_eq!(constants.features(), FeatureFlags::SSAO);
    }

    #[test]
    fn point_lights_beyond_capacity_are_dropped() {
        let lights: Vec<Light> = (0..MAX_POINT_LIGHTS + 5)
            .map(|i| Light::point(Vec3::splat(i as f32), 1.0, Vec3::ONE, 1.0))
            .collect();
        let constants =
            LightConstants::new(&lights, Vec3::ZERO, Vec3::ZERO, FeatureFlags::empty());
        assert_eq!(constants.counts[0] as usize, MAX_POINT_LIGHTS);
        assert_eq!(constants.sun_direction[3], 0.0);
    }

    #[test]
    fn object_normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let object = ObjectConstants::new(world, &Material::default());
        let n = object
            .normal_matrix()
            .transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!(n.abs_diff_eq(Vec3::new(0.5, 1.0, 0.0), 1e-6));
    }
}
