use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use glam::{Vec2, Vec4};
use half::f16;

use crate::gpu::types::{AddressMode, FilterMode, SamplerDesc, TextureData, TextureDesc, TextureFormat};

/// CPU texture: one `f32` per channel, one vector per array layer.
pub struct SoftTexture {
    pub(super) layers: RwLock<Vec<Vec<f32>>>,
}

impl SoftTexture {
    pub(super) fn new(desc: &TextureDesc) -> Self {
        let texels = desc.width as usize * desc.height as usize * desc.format.channels();
        let fill = if desc.format.is_depth() { 1.0 } else { 0.0 };
        Self {
            layers: RwLock::new(vec![vec![fill; texels]; desc.layers as usize]),
        }
    }

    pub(super) fn read(&self) -> RwLockReadGuard<'_, Vec<Vec<f32>>> {
        self.layers.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn upload(&self, desc: &TextureDesc, layer: u32, data: &[u8]) {
        let decoded = desc.format.decode(data);
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers[layer as usize] = decoded;
    }

    pub(super) fn download(&self, desc: &TextureDesc, layer: u32) -> TextureData {
        TextureData {
            width: desc.width,
            height: desc.height,
            channels: desc.format.channels(),
            texels: self.read()[layer as usize].clone(),
        }
    }
}

/// Rounds `value` to what `format` can actually store.
pub(super) fn quantize(format: TextureFormat, value: f32) -> f32 {
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::R8Unorm => {
            (value.clamp(0.0, 1.0) * 255.0).round() / 255.0
        }
        TextureFormat::Rgba16Float | TextureFormat::R16Float => f16::from_f32(value).to_f32(),
        TextureFormat::Rgba32Float | TextureFormat::Depth32Float => value,
    }
}

/// Read-only view of a bound texture, optionally pinned to one layer.
pub(super) struct View<'a> {
    pub desc: &'a TextureDesc,
    pub layers: RwLockReadGuard<'a, Vec<Vec<f32>>>,
    pub layer: Option<u32>,
}

impl View<'_> {
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    fn texels(&self, layer: u32) -> &[f32] {
        let index = self.layer.unwrap_or(layer) as usize;
        &self.layers[index.min(self.layers.len() - 1)]
    }

    fn fetch(&self, texels: &[f32], x: u32, y: u32) -> Vec4 {
        let channels = self.desc.format.channels();
        let base = (y as usize * self.desc.width as usize + x as usize) * channels;
        if channels == 1 {
            Vec4::new(texels[base], 0.0, 0.0, 1.0)
        } else {
            Vec4::from_slice(&texels[base..base + 4])
        }
    }

    /// `textureLoad` with coordinates clamped to the edge.
    pub fn load(&self, x: i32, y: i32, layer: u32) -> Vec4 {
        let x = x.clamp(0, self.desc.width as i32 - 1) as u32;
        let y = y.clamp(0, self.desc.height as i32 - 1) as u32;
        self.fetch(self.texels(layer), x, y)
    }

    /// Texel under `uv`, no filtering.
    pub fn load_uv(&self, uv: Vec2, layer: u32) -> Vec4 {
        let x = (uv.x * self.desc.width as f32).floor() as i32;
        let y = (uv.y * self.desc.height as f32).floor() as i32;
        self.load(x, y, layer)
    }

    pub fn sample(&self, sampler: &SamplerDesc, uv: Vec2, layer: u32) -> Vec4 {
        let texels = self.texels(layer);
        match sampler.filter {
            FilterMode::Nearest => {
                let (x, y) = self.nearest(sampler.address_mode, uv);
                self.fetch(texels, x, y)
            }
            FilterMode::Linear => {
                let ([x0, x1, y0, y1], f) = self.footprint(sampler.address_mode, uv);
                let top = self.fetch(texels, x0, y0).lerp(self.fetch(texels, x1, y0), f.x);
                let bottom = self.fetch(texels, x0, y1).lerp(self.fetch(texels, x1, y1), f.x);
                top.lerp(bottom, f.y)
            }
        }
    }

    /// Depth comparison sample: the fraction of taps where `reference` passes.
    pub fn sample_compare(&self, sampler: &SamplerDesc, uv: Vec2, layer: u32, reference: f32) -> f32 {
        let Some(compare) = sampler.compare else {
            return self.sample(sampler, uv, layer).x;
        };
        let texels = self.texels(layer);
        let test = |x: u32, y: u32| {
            if compare.passes(reference, self.fetch(texels, x, y).x) {
                1.0
            } else {
                0.0
            }
        };
        match sampler.filter {
            FilterMode::Nearest => {
                let (x, y) = self.nearest(sampler.address_mode, uv);
                test(x, y)
            }
            FilterMode::Linear => {
                let ([x0, x1, y0, y1], f) = self.footprint(sampler.address_mode, uv);
                let top = test(x0, y0) + (test(x1, y0) - test(x0, y0)) * f.x;
                let bottom = test(x0, y1) + (test(x1, y1) - test(x0, y1)) * f.x;
                top + (bottom - top) * f.y
            }
        }
    }

    fn nearest(&self, mode: AddressMode, uv: Vec2) -> (u32, u32) {
        let x = (uv.x * self.desc.width as f32).floor() as i32;
        let y = (uv.y * self.desc.height as f32).floor() as i32;
        (
            address(mode, x, self.desc.width),
            address(mode, y, self.desc.height),
        )
    }

    fn footprint(&self, mode: AddressMode, uv: Vec2) -> ([u32; 4], Vec2) {
        let tx = uv.x * self.desc.width as f32 - 0.5;
        let ty = uv.y * self.desc.height as f32 - 0.5;
        let (fx, fy) = (tx.floor(), ty.floor());
        let (x0, y0) = (fx as i32, fy as i32);
        (
            [
                address(mode, x0, self.desc.width),
                address(mode, x0 + 1, self.desc.width),
                address(mode, y0, self.desc.height),
                address(mode, y0 + 1, self.desc.height),
            ],
            Vec2::new(tx - fx, ty - fy),
        )
    }
}

fn address(mode: AddressMode, coord: i32, size: u32) -> u32 {
    match mode {
        AddressMode::ClampToEdge => coord.clamp(0, size as i32 - 1) as u32,
        AddressMode::Repeat => coord.rem_euclid(size as i32) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::types::CompareFunction;

    fn sampler(filter: FilterMode, address_mode: AddressMode) -> SamplerDesc {
        SamplerDesc {
            label: "test".into(),
            address_mode,
            filter,
            compare: None,
        }
    }

    fn texture_2x1(format: TextureFormat, texels: &[f32]) -> (TextureDesc, SoftTexture) {
        let desc = TextureDesc::uploaded("t", 2, 1, format);
        let texture = SoftTexture::new(&desc);
        texture.layers.write().unwrap()[0] = texels.to_vec();
        (desc, texture)
    }

    #[test]
    fn unorm_quantization_rounds_to_nearest_step() {
        assert_eq!(quantize(TextureFormat::Rgba8Unorm, 0.5), 128.0 / 255.0);
        assert_eq!(quantize(TextureFormat::R8Unorm, 2.0), 1.0);
        assert_eq!(quantize(TextureFormat::Rgba16Float, 0.1), f16::from_f32(0.1).to_f32());
    }

    #[test]
    fn linear_sampling_blends_neighbours() {
        let (desc, texture) = texture_2x1(TextureFormat::R8Unorm, &[0.0, 1.0]);
        let view = View {
            desc: &desc,
            layers: texture.read(),
            layer: None,
        };
        let clamp = sampler(FilterMode::Linear, AddressMode::ClampToEdge);
        assert!((view.sample(&clamp, Vec2::new(0.5, 0.5), 0).x - 0.5).abs() < 1e-6);
        assert_eq!(view.sample(&clamp, Vec2::new(0.0, 0.5), 0).x, 0.0);

        let wrap = sampler(FilterMode::Nearest, AddressMode::Repeat);
        assert_eq!(view.sample(&wrap, Vec2::new(1.25, 0.5), 0).x, 0.0);
        assert_eq!(view.sample(&wrap, Vec2::new(-0.25, 0.5), 0).x, 1.0);
    }

    #[test]
    fn compare_sampling_counts_passing_taps() {
        let (desc, texture) = texture_2x1(TextureFormat::Depth32Float, &[0.25, 0.75]);
        let view = View {
            desc: &desc,
            layers: texture.read(),
            layer: None,
        };
        let mut shadow = sampler(FilterMode::Nearest, AddressMode::ClampToEdge);
        shadow.compare = Some(CompareFunction::LessEqual);
        assert_eq!(view.sample_compare(&shadow, Vec2::new(0.25, 0.5), 0, 0.5), 0.0);
        assert_eq!(view.sample_compare(&shadow, Vec2::new(0.75, 0.5), 0, 0.5), 1.0);

        shadow.filter = FilterMode::Linear;
        let half = view.sample_compare(&shadow, Vec2::new(0.5, 0.5), 0, 0.5);
        assert!((half - 0.5).abs() < 1e-6);
    }
}
