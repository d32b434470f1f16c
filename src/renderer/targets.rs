//! Render targets connecting the frame passes.
//!
//! Every target is created at startup and only recreated between frames,
//! when the resolution, shadow settings or bloom chain change. Replaced
//! textures are retired, not dropped, so passes already submitted against
//! them stay valid until the next frame begins.

use log::debug;

use super::bloom::{chain_extents, Extent};
use crate::error::Result;
use crate::gpu::{Backend, ResourceManager, TextureDesc, TextureHandle};

/// Formats of the intermediate targets. Pipelines are built against these.
pub mod formats {
    use crate::gpu::TextureFormat;

    pub const ALBEDO: TextureFormat = TextureFormat::Rgba8Unorm;
    /// View-independent world-space normal in xyz.
    pub const NORMAL: TextureFormat = TextureFormat::Rgba16Float;
    /// specular, roughness, metalness, occlusion
    pub const MATERIAL: TextureFormat = TextureFormat::Rgba8Unorm;
    pub const DEPTH: TextureFormat = TextureFormat::Depth32Float;
    /// Premultiplied colour and coverage of transparent surfaces.
    pub const TRANSPARENCY: TextureFormat = TextureFormat::Rgba16Float;
    pub const SHADOW_MASK: TextureFormat = TextureFormat::R8Unorm;
    pub const AO: TextureFormat = TextureFormat::R8Unorm;
    pub const HDR: TextureFormat = TextureFormat::Rgba16Float;
    pub const BLOOM: TextureFormat = TextureFormat::Rgba16Float;
    pub const OUTPUT: TextureFormat = TextureFormat::Rgba8Unorm;
    pub const SHADOW_ATLAS: TextureFormat = TextureFormat::Depth32Float;
    pub const SSAO_NOISE: TextureFormat = TextureFormat::Rgba32Float;
}

/// Screen-sized targets, the bloom chain and the cascaded shadow atlas.
pub struct RenderTargets {
    width: u32,
    height: u32,
    pub albedo: TextureHandle,
    pub normal: TextureHandle,
    pub material: TextureHandle,
    pub depth: TextureHandle,
    pub transparency: TextureHandle,
    pub shadow_mask: TextureHandle,
    /// Unblurred occlusion written by the SSAO pass.
    pub ao_raw: TextureHandle,
    pub ao: TextureHandle,
    pub hdr: TextureHandle,
    pub output: TextureHandle,
    /// Level 0 is full resolution, each further level halves both axes.
    pub bloom: Vec<TextureHandle>,
    bloom_extents: Vec<Extent>,
    /// One layer per cascade.
    pub shadow_atlas: TextureHandle,
    shadow_resolution: u32,
    cascade_count: u32,
}

struct ScreenTargets {
    albedo: TextureHandle,
    normal: TextureHandle,
    material: TextureHandle,
    depth: TextureHandle,
    transparency: TextureHandle,
    shadow_mask: TextureHandle,
    ao_raw: TextureHandle,
    ao: TextureHandle,
    hdr: TextureHandle,
    output: TextureHandle,
}

impl ScreenTargets {
    fn create<B: Backend>(
        resources: &mut ResourceManager<B>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut target = |label: &str, format| {
            resources.create_texture(TextureDesc::target(label, width, height, format))
        };
        Ok(Self {
            albedo: target("GBufferAlbedo", formats::ALBEDO)?,
            normal: target("GBufferNormal", formats::NORMAL)?,
            material: target("GBufferMaterial", formats::MATERIAL)?,
            depth: target("GBufferDepth", formats::DEPTH)?,
            transparency: target("Transparency", formats::TRANSPARENCY)?,
            shadow_mask: target("ShadowMask", formats::SHADOW_MASK)?,
            ao_raw: target("SsaoRaw", formats::AO)?,
            ao: target("Ssao", formats::AO)?,
            hdr: target("SceneHdr", formats::HDR)?,
            output: target("Output", formats::OUTPUT)?,
        })
    }
}

fn create_bloom_chain<B: Backend>(
    resources: &mut ResourceManager<B>,
    width: u32,
    height: u32,
    levels: usize,
) -> Result<(Vec<TextureHandle>, Vec<Extent>)> {
    let extents = chain_extents(width, height, levels)?;
    let mut handles = Vec::with_capacity(extents.len());
    for (level, extent) in extents.iter().enumerate() {
        handles.push(resources.create_texture(TextureDesc::target(
            &format!("Bloom{level}"),
            extent.width,
            extent.height,
            formats::BLOOM,
        ))?);
    }
    Ok((handles, extents))
}

fn create_shadow_atlas<B: Backend>(
    resources: &mut ResourceManager<B>,
    resolution: u32,
    cascades: u32,
) -> Result<TextureHandle> {
    Ok(resources.create_texture(
        TextureDesc::target(
            "ShadowAtlas",
            resolution,
            resolution,
            formats::SHADOW_ATLAS,
        )
        .with_layers(cascades),
    )?)
}

impl RenderTargets {
    pub fn new<B: Backend>(
        resources: &mut ResourceManager<B>,
        width: u32,
        height: u32,
        bloom_levels: usize,
        shadow_resolution: u32,
        cascade_count: u32,
    ) -> Result<Self> {
        let screen = ScreenTargets::create(resources, width, height)?;
        let (bloom, bloom_extents) = create_bloom_chain(resources, width, height, bloom_levels)?;
        let shadow_atlas = create_shadow_atlas(resources, shadow_resolution, cascade_count)?;

        Ok(Self {
            width,
            height,
            albedo: screen.albedo,
            normal: screen.normal,
            material: screen.material,
            depth: screen.depth,
            transparency: screen.transparency,
            shadow_mask: screen.shadow_mask,
            ao_raw: screen.ao_raw,
            ao: screen.ao,
            hdr: screen.hdr,
            output: screen.output,
            bloom,
            bloom_extents,
            shadow_atlas,
            shadow_resolution,
            cascade_count,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bloom_extents(&self) -> &[Extent] {
        &self.bloom_extents
    }

    pub fn shadow_resolution(&self) -> u32 {
        self.shadow_resolution
    }

    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    fn screen_handles(&self) -> [TextureHandle; 10] {
        [
            self.albedo,
            self.normal,
            self.material,
            self.depth,
            self.transparency,
            self.shadow_mask,
            self.ao_raw,
            self.ao,
            self.hdr,
            self.output,
        ]
    }

    /// Recreates every screen-sized target and the bloom chain.
    pub fn resize<B: Backend>(
        &mut self,
        resources: &mut ResourceManager<B>,
        width: u32,
        height: u32,
        bloom_levels: usize,
    ) -> Result<()> {
        // Validate the chain before anything is replaced.
        chain_extents(width, height, bloom_levels)?;
        debug!("Resizing render targets to {}x{}", width, height);

        let screen = ScreenTargets::create(resources, width, height)?;
        for handle in self.screen_handles() {
            resources.retire_texture(handle);
        }
        self.albedo = screen.albedo;
        self.normal = screen.normal;
        self.material = screen.material;
        self.depth = screen.depth;
        self.transparency = screen.transparency;
        self.shadow_mask = screen.shadow_mask;
        self.ao_raw = screen.ao_raw;
        self.ao = screen.ao;
        self.hdr = screen.hdr;
        self.output = screen.output;
        self.width = width;
        self.height = height;

        self.recreate_bloom(resources, bloom_levels)
    }

    pub fn recreate_bloom<B: Backend>(
        &mut self,
        resources: &mut ResourceManager<B>,
        levels: usize,
    ) -> Result<()> {
        let (bloom, extents) = create_bloom_chain(resources, self.width, self.height, levels)?;
        debug!("Recreated bloom chain with {} levels", levels);
        for handle in std::mem::replace(&mut self.bloom, bloom) {
            resources.retire_texture(handle);
        }
        self.bloom_extents = extents;
        Ok(())
    }

    pub fn recreate_shadow_atlas<B: Backend>(
        &mut self,
        resources: &mut ResourceManager<B>,
        resolution: u32,
        cascades: u32,
    ) -> Result<()> {
        let atlas = create_shadow_atlas(resources, resolution, cascades)?;
        debug!(
            "Recreated shadow atlas: {} cascades at {}x{}",
            cascades, resolution, resolution
        );
        resources.retire_texture(std::mem::replace(&mut self.shadow_atlas, atlas));
        self.shadow_resolution = resolution;
        self.cascade_count = cascades;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RendererError;
    use crate::gpu::SoftwareBackend;

    fn manager() -> ResourceManager<SoftwareBackend> {
        ResourceManager::new(SoftwareBackend::new())
    }

    #[test]
    fn bloom_levels_follow_the_size_law() {
        let mut resources = manager();
        let targets = RenderTargets::new(&mut resources, 64, 48, 6, 32, 2).unwrap();
        assert_eq!(targets.bloom.len(), 6);
        for (i, handle) in targets.bloom.iter().enumerate() {
            let desc = resources.texture_desc(*handle).unwrap();
            assert_eq!(desc.width, 64 >> i);
            assert_eq!(desc.height, 48 >> i);
        }
        let atlas = resources.texture_desc(targets.shadow_atlas).unwrap();
        assert_eq!((atlas.width, atlas.layers), (32, 2));
    }

    #[test]
    fn resize_retires_previous_targets() {
        let mut resources = manager();
        resources.begin_frame(1);
        let mut targets = RenderTargets::new(&mut resources, 16, 16, 3, 16, 1).unwrap();
        let old_albedo = targets.albedo;

        targets.resize(&mut resources, 32, 8, 3).unwrap();
        assert!(resources.contains_texture(old_albedo));
        assert_eq!(resources.texture_desc(targets.albedo).unwrap().width, 32);

        resources.begin_frame(2);
        assert!(!resources.contains_texture(old_albedo));
        assert!(resources.contains_texture(targets.albedo));
    }

    #[test]
    fn resize_rejects_a_chain_that_collapses() {
        let mut resources = manager();
        let mut targets = RenderTargets::new(&mut resources, 16, 16, 3, 16, 1).unwrap();
        let before = targets.albedo;
        let err = targets.resize(&mut resources, 2, 2, 3).unwrap_err();
        assert!(matches!(err, RendererError::InvalidBloomChain { .. }));
        assert_eq!(targets.albedo, before);
    }
}
