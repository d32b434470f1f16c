use bitflags::bitflags;
use glam::Vec3;

use crate::gpu::TextureHandle;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const DOUBLE_SIDED = 1 << 0;
    }
}

/// Optional texture inputs of a material, in shader binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
    Metallic,
    Roughness,
    Occlusion,
    Opacity,
}

impl TextureSlot {
    pub const COUNT: usize = 6;
    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Metallic,
        TextureSlot::Roughness,
        TextureSlot::Occlusion,
        TextureSlot::Opacity,
    ];

    /// Bit set in the per-object "is bound" mask shaders test before sampling.
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub diffuse: Vec3,
    pub specular: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub flags: MaterialFlags,
    textures: [Option<TextureHandle>; TextureSlot::COUNT],
}

impl Material {
    pub fn new(diffuse: Vec3) -> Self {
        Self {
            diffuse,
            specular: 0.04,
            roughness: 0.8,
            metalness: 0.0,
            opacity: 1.0,
            flags: MaterialFlags::empty(),
            textures: [None; TextureSlot::COUNT],
        }
    }

    pub fn grey(value: f32) -> Self {
        Self::new(Vec3::splat(value))
    }

    pub fn with_specular(mut self, specular: f32) -> Self {
        self.specular = specular.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_metalness(mut self, metalness: f32) -> Self {
        self.metalness = metalness.clamp(0.0, 1.0);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn double_sided(mut self) -> Self {
        self.flags |= MaterialFlags::DOUBLE_SIDED;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: TextureHandle) -> Self {
        self.textures[slot as usize] = Some(texture);
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.textures[slot as usize]
    }

    pub fn is_double_sided(&self) -> bool {
        self.flags.contains(MaterialFlags::DOUBLE_SIDED)
    }

    pub fn bound_texture_mask(&self) -> u32 {
        TextureSlot::ALL
            .iter()
            .filter(|slot| self.texture(**slot).is_some())
            .fold(0, |mask, slot| mask | slot.bit())
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::grey(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untextured_material_has_empty_mask() {
        assert_eq!(Material::grey(0.5).bound_texture_mask(), 0);
    }

    #[test]
    fn slot_bits_are_distinct() {
        let mask = TextureSlot::ALL.iter().fold(0u32, |m, s| {
            assert_eq!(m & s.bit(), 0);
            m | s.bit()
        });
        assert_eq!(mask, 0b11_1111);
    }

    #[test]
    fn scalar_builders_clamp() {
        let m = Material::default()
            .with_opacity(1.5)
            .with_roughness(-1.0)
            .double_sided();
        assert_eq!(m.opacity, 1.0);
        assert_eq!(m.roughness, 0.0);
        assert!(m.is_double_sided());
    }
}
