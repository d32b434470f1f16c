//! Explicit renderer state owned by the caller.
//!
//! Everything a pass needs lives here: the resource manager, pipelines,
//! render targets, constant buffers, samplers, mesh and material
//! registries and the active settings. Several contexts can coexist, each
//! with its own backend.

use std::mem::size_of;

use bitflags::bitflags;
use bytemuck::Pod;
use glam::Vec4;
use log::{debug, info};

use super::bloom::BLOOM_CHAIN_LENGTH;
use super::cascades::MAX_CASCADES;
use super::constants::{
    BloomConstants, CascadeConstants, DebugConstants, FrameConstants, LightConstants,
    ObjectConstants, ShadowConstants, SsaoConstants, ToneMapConstants,
};
use super::mesh::{bounds_of, MaterialHandle, Mesh, MeshHandle, Vertex};
use super::pipelines::PipelineLibrary;
use super::ssao::{generate_kernel, generate_noise, NOISE_SIZE};
use super::stats::FrameStats;
use super::targets::{formats, RenderTargets};
use crate::error::{RendererError, Result};
use crate::gpu::{
    AddressMode, Arena, Backend, BufferDesc, BufferHandle, CompareFunction, FilterMode,
    ResourceManager, SamplerDesc, SamplerHandle, TextureData, TextureDesc, TextureFormat,
    TextureHandle,
};
use crate::scene::Material;
use crate::settings::{DebugView, RenderSettings, Resolution};
use crate::time::PassTimings;

const INITIAL_OBJECT_CAPACITY: usize = 256;

bitflags! {
    /// Settings changes waiting for the next frame start.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DirtyFlags: u32 {
        const RESOLUTION = 1 << 0;
        const SHADOW_TARGETS = 1 << 1;
        const BLOOM_CHAIN = 1 << 2;
        const SSAO_KERNEL = 1 << 3;
    }
}

pub struct Samplers {
    pub linear_clamp: SamplerHandle,
    pub material: SamplerHandle,
    pub noise: SamplerHandle,
    pub shadow: SamplerHandle,
}

impl Samplers {
    fn create<B: Backend>(resources: &mut ResourceManager<B>) -> Result<Self> {
        let mut sampler = |label: &str, address_mode, filter, compare| {
            resources.create_sampler(SamplerDesc {
                label: label.to_string(),
                address_mode,
                filter,
                compare,
            })
        };
        Ok(Self {
            linear_clamp: sampler(
                "LinearClamp",
                AddressMode::ClampToEdge,
                FilterMode::Linear,
                None,
            )?,
            material: sampler("Material", AddressMode::Repeat, FilterMode::Linear, None)?,
            noise: sampler("SsaoNoise", AddressMode::Repeat, FilterMode::Nearest, None)?,
            shadow: sampler(
                "ShadowCompare",
                AddressMode::ClampToEdge,
                FilterMode::Linear,
                Some(CompareFunction::LessEqual),
            )?,
        })
    }
}

/// Constant buffers; sized at startup and rewritten every frame.
pub struct ConstantBuffers {
    pub frame: BufferHandle,
    pub objects: BufferHandle,
    object_capacity: usize,
    /// One per cascade, read by the shadow depth pass.
    pub cascades: Vec<BufferHandle>,
    pub shadow: BufferHandle,
    pub lights: BufferHandle,
    pub ssao: BufferHandle,
    /// Downsample steps first, then upsample steps.
    pub bloom: Vec<BufferHandle>,
    pub tonemap: BufferHandle,
    pub debug: BufferHandle,
}

fn uniform<T: Pod, B: Backend>(
    resources: &mut ResourceManager<B>,
    label: &str,
) -> Result<BufferHandle> {
    Ok(resources.create_buffer(BufferDesc::uniform(label, size_of::<T>() as u64))?)
}

impl ConstantBuffers {
    fn create<B: Backend>(resources: &mut ResourceManager<B>) -> Result<Self> {
        let cascades = (0..MAX_CASCADES)
            .map(|i| uniform::<CascadeConstants, B>(resources, &format!("Cascade{i}Constants")))
            .collect::<Result<Vec<_>>>()?;
        let bloom = (0..2 * BLOOM_CHAIN_LENGTH)
            .map(|i| uniform::<BloomConstants, B>(resources, &format!("Bloom{i}Constants")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frame: uniform::<FrameConstants, B>(resources, "FrameConstants")?,
            objects: resources.create_buffer(BufferDesc::storage(
                "ObjectConstants",
                (INITIAL_OBJECT_CAPACITY * size_of::<ObjectConstants>()) as u64,
            ))?,
            object_capacity: INITIAL_OBJECT_CAPACITY,
            cascades,
            shadow: uniform::<ShadowConstants, B>(resources, "ShadowConstants")?,
            lights: uniform::<LightConstants, B>(resources, "LightConstants")?,
            ssao: uniform::<SsaoConstants, B>(resources, "SsaoConstants")?,
            bloom,
            tonemap: uniform::<ToneMapConstants, B>(resources, "ToneMapConstants")?,
            debug: uniform::<DebugConstants, B>(resources, "DebugConstants")?,
        })
    }

    pub fn bloom_downsample(&self, level: usize) -> BufferHandle {
        self.bloom[level]
    }

    pub fn bloom_upsample(&self, level: usize) -> BufferHandle {
        self.bloom[BLOOM_CHAIN_LENGTH + level]
    }

    pub fn object_capacity(&self) -> usize {
        self.object_capacity
    }
}

/// The renderer's whole state, passed explicitly to every pass.
pub struct RendererContext<B: Backend> {
    pub(crate) resources: ResourceManager<B>,
    pub(crate) pipelines: PipelineLibrary,
    pub(crate) targets: RenderTargets,
    pub(crate) buffers: ConstantBuffers,
    pub(crate) samplers: Samplers,
    /// Bound to material slots without a texture.
    pub(crate) white: TextureHandle,
    pub(crate) noise: TextureHandle,
    pub(crate) kernel: Vec<Vec4>,
    pub(crate) meshes: Arena<Mesh>,
    pub(crate) materials: Arena<Material>,
    pub(crate) settings: RenderSettings,
    dirty: DirtyFlags,
    pub(crate) frame_index: u64,
    pub(crate) stats: FrameStats,
    pub(crate) timings: PassTimings,
    /// Directional lights past the first in the last reported frame.
    pub(crate) ignored_suns: usize,
}

impl<B: Backend> RendererContext<B> {
    /// Creates every pipeline, target and buffer.
    ///
    /// Any failure aborts startup with one [`RendererError::Init`] that
    /// lists what went wrong.
    pub fn new(backend: B, settings: RenderSettings, width: u32, height: u32) -> Result<Self> {
        let mut settings = settings;
        settings.resolution = Resolution { width, height };
        let settings = settings.validate();

        Self::create(ResourceManager::new(backend), settings).map_err(|err| match err {
            RendererError::Init { .. } => err,
            other => RendererError::init(&[other.to_string()]),
        })
    }

    fn create(mut resources: ResourceManager<B>, settings: RenderSettings) -> Result<Self> {
        let pipelines = PipelineLibrary::new(&mut resources)?;
        let Resolution { width, height } = settings.resolution;
        let targets = RenderTargets::new(
            &mut resources,
            width,
            height,
            settings.bloom_chain_length(),
            settings.shadow.resolution,
            settings.shadow.cascade_count,
        )?;
        let buffers = ConstantBuffers::create(&mut resources)?;
        let samplers = Samplers::create(&mut resources)?;

        let white = resources.create_texture(TextureDesc::uploaded(
            "DefaultWhite",
            1,
            1,
            TextureFormat::Rgba8Unorm,
        ))?;
        resources.write_texture(white, 0, &[255; 4]);

        let noise = resources.create_texture(TextureDesc::uploaded(
            "SsaoNoise",
            NOISE_SIZE,
            NOISE_SIZE,
            formats::SSAO_NOISE,
        ))?;
        resources.write_texture(noise, 0, bytemuck::cast_slice(&generate_noise()));

        let kernel = generate_kernel(settings.ssao.sample_count);

        info!(
            "Renderer ready: {}x{}, {} cascades at {}, bloom chain {}",
            width,
            height,
            settings.shadow.cascade_count,
            settings.shadow.resolution,
            settings.bloom_chain_length()
        );

        Ok(Self {
            resources,
            pipelines,
            targets,
            buffers,
            samplers,
            white,
            noise,
            kernel,
            meshes: Arena::new(),
            materials: Arena::new(),
            settings,
            dirty: DirtyFlags::empty(),
            frame_index: 0,
            stats: FrameStats::default(),
            timings: PassTimings::default(),
            ignored_suns: 0,
        })
    }

    /// Uploads an indexed triangle list.
    pub fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> Result<MeshHandle> {
        let vertex_buffer = self.resources.create_buffer(BufferDesc::vertex(
            &format!("{label}Vertices"),
            std::mem::size_of_val(vertices) as u64,
        ))?;
        self.resources
            .write_buffer(vertex_buffer, 0, bytemuck::cast_slice(vertices));

        let index_buffer = self.resources.create_buffer(BufferDesc::index(
            &format!("{label}Indices"),
            std::mem::size_of_val(indices) as u64,
        ))?;
        self.resources
            .write_buffer(index_buffer, 0, bytemuck::cast_slice(indices));

        debug!(
            "Created mesh '{}' ({} vertices, {} indices)",
            label,
            vertices.len(),
            indices.len()
        );
        Ok(self.meshes.insert(Mesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            bounds: bounds_of(vertices),
        }))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    /// Releases the mesh's buffers after the current frame.
    pub fn release_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(handle) {
            self.resources.retire_buffer(mesh.vertex_buffer);
            self.resources.retire_buffer(mesh.index_buffer);
        }
    }

    pub fn create_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.insert(material)
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    /// Uploads tightly packed RGBA8 texels for use as a material texture.
    pub fn create_texture_rgba8(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        texels: &[u8],
    ) -> Result<TextureHandle> {
        let texture = self.resources.create_texture(TextureDesc::uploaded(
            label,
            width,
            height,
            TextureFormat::Rgba8Unorm,
        ))?;
        self.resources.write_texture(texture, 0, texels);
        Ok(texture)
    }

    /// Loads an image file into a material texture.
    pub fn load_texture<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<TextureHandle> {
        let path = path.as_ref();
        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Texture".to_string());
        self.create_texture_rgba8(&label, width, height, image.as_raw())
    }

    /// Requests new screen targets; they are created at the next frame start.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.update_settings(|settings| settings.resolution = Resolution { width, height });
    }

    /// Replaces every tunable at once. Changes that need new targets are
    /// applied at the next frame start.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        let next = settings.validate();
        let current = &self.settings;

        if next.resolution != current.resolution {
            self.dirty |= DirtyFlags::RESOLUTION;
        }
        if next.shadow.resolution != current.shadow.resolution
            || next.shadow.cascade_count != current.shadow.cascade_count
        {
            self.dirty |= DirtyFlags::SHADOW_TARGETS;
        }
        if next.bloom_chain_length() != current.bloom_chain_length() {
            self.dirty |= DirtyFlags::BLOOM_CHAIN;
        }
        if next.ssao.sample_count != current.ssao.sample_count {
            self.dirty |= DirtyFlags::SSAO_KERNEL;
        }
        self.settings = next;
    }

    fn update_settings(&mut self, change: impl FnOnce(&mut RenderSettings)) {
        let mut next = self.settings.clone();
        change(&mut next);
        self.set_settings(next);
    }

    pub fn set_ssao_enabled(&mut self, enabled: bool) {
        self.update_settings(|s| s.ssao.enabled = enabled);
    }

    pub fn set_ssao_radius(&mut self, radius: f32) {
        self.update_settings(|s| s.ssao.radius = radius);
    }

    pub fn set_ssao_bias(&mut self, bias: f32) {
        self.update_settings(|s| s.ssao.bias = bias);
    }

    pub fn set_ssao_sample_count(&mut self, count: u32) {
        self.update_settings(|s| s.ssao.sample_count = count);
    }

    pub fn set_ssao_intensity(&mut self, intensity: f32) {
        self.update_settings(|s| s.ssao.intensity = intensity);
    }

    pub fn set_shadows_enabled(&mut self, enabled: bool) {
        self.update_settings(|s| s.shadow.enabled = enabled);
    }

    pub fn set_shadow_resolution(&mut self, resolution: u32) {
        self.update_settings(|s| s.shadow.resolution = resolution);
    }

    pub fn set_cascade_count(&mut self, count: u32) {
        self.update_settings(|s| s.shadow.cascade_count = count);
    }

    pub fn set_cascade_lambda(&mut self, lambda: f32) {
        self.update_settings(|s| s.shadow.lambda = lambda);
    }

    pub fn set_shadow_sample_count(&mut self, count: u32) {
        self.update_settings(|s| s.shadow.sample_count = count);
    }

    pub fn set_shadow_spread(&mut self, spread: f32) {
        self.update_settings(|s| s.shadow.spread = spread);
    }

    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.update_settings(|s| s.bloom.enabled = enabled);
    }

    pub fn set_bloom_strength(&mut self, strength: f32) {
        self.update_settings(|s| s.bloom.strength = strength);
    }

    pub fn set_bloom_threshold(&mut self, threshold: f32) {
        self.update_settings(|s| s.bloom.threshold = threshold);
    }

    pub fn set_bloom_filter_radius(&mut self, radius: f32) {
        self.update_settings(|s| s.bloom.filter_radius = radius);
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.update_settings(|s| s.tone_mapping.exposure = exposure);
    }

    pub fn set_debug_view(&mut self, view: DebugView) {
        self.update_settings(|s| s.debug.view = view);
    }

    pub fn set_debug_cascade_layer(&mut self, layer: u32) {
        self.update_settings(|s| s.debug.cascade_layer = layer);
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn pending_changes(&self) -> DirtyFlags {
        self.dirty
    }

    /// Recreates whatever the settings changes since the last frame require.
    /// Called once at frame start, before any pass records.
    pub(crate) fn apply_pending_changes(&mut self) -> Result<()> {
        let dirty = std::mem::take(&mut self.dirty);
        if dirty.is_empty() {
            return Ok(());
        }
        debug!("Applying settings changes {:?}", dirty);

        if dirty.contains(DirtyFlags::RESOLUTION) {
            let Resolution { width, height } = self.settings.resolution;
            self.targets.resize(
                &mut self.resources,
                width,
                height,
                self.settings.bloom_chain_length(),
            )?;
        } else if dirty.contains(DirtyFlags::BLOOM_CHAIN) {
            self.targets
                .recreate_bloom(&mut self.resources, self.settings.bloom_chain_length())?;
        }
        if dirty.contains(DirtyFlags::SHADOW_TARGETS) {
            self.targets.recreate_shadow_atlas(
                &mut self.resources,
                self.settings.shadow.resolution,
                self.settings.shadow.cascade_count,
            )?;
        }
        if dirty.contains(DirtyFlags::SSAO_KERNEL) {
            // Always reseeded, so equal sample counts give equal kernels.
            self.kernel = generate_kernel(self.settings.ssao.sample_count);
        }
        Ok(())
    }

    /// Grows the object buffer to hold at least `count` entries. The old
    /// buffer is retired, not dropped.
    pub(crate) fn reserve_objects(&mut self, count: usize) -> Result<()> {
        if count <= self.buffers.object_capacity {
            return Ok(());
        }
        let capacity = count.next_power_of_two();
        let objects = self.resources.create_buffer(BufferDesc::storage(
            "ObjectConstants",
            (capacity * size_of::<ObjectConstants>()) as u64,
        ))?;
        debug!("Grew object buffer to {} entries", capacity);
        self.resources
            .retire_buffer(std::mem::replace(&mut self.buffers.objects, objects));
        self.buffers.object_capacity = capacity;
        Ok(())
    }

    pub(crate) fn upload<T: Pod>(&mut self, buffer: BufferHandle, value: &T) {
        self.resources
            .write_buffer(buffer, 0, bytemuck::bytes_of(value));
    }

    /// Statistics of the last rendered frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Per-pass timings of the last rendered frame.
    pub fn timings(&self) -> &PassTimings {
        &self.timings
    }

    pub fn draw_call_count(&self) -> u32 {
        self.stats.draw_calls
    }

    pub fn triangle_count(&self) -> u64 {
        self.stats.triangles
    }

    pub fn material_count(&self) -> u32 {
        self.stats.materials
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// The tone-mapped (or debug) image of the last frame.
    pub fn output_texture(&self) -> TextureHandle {
        self.targets.output
    }

    pub fn resources(&self) -> &ResourceManager<B> {
        &self.resources
    }

    pub fn backend(&self) -> &B {
        self.resources.backend()
    }

    /// Copies one layer of `texture` back to the CPU. Waits for the GPU.
    pub fn read_texture(&mut self, texture: TextureHandle, layer: u32) -> Result<TextureData> {
        Ok(self.resources.read_texture(texture, layer)?)
    }

    /// The output image as RGBA8, ready for encoding.
    pub fn read_output_rgba8(&mut self) -> Result<image::RgbaImage> {
        let data = self.read_texture(self.targets.output, 0)?;
        let bytes = data
            .texels
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        image::RgbaImage::from_raw(data.width, data.height, bytes).ok_or_else(|| {
            RendererError::Gpu(crate::error::GpuError::Readback(
                "output size does not match its texels".into(),
            ))
        })
    }
}
