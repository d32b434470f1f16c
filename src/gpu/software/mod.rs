//! Deterministic CPU backend.
//!
//! Implements the same contract as the wgpu backend with a small triangle
//! rasterizer and CPU versions of every shader program. Needs no adapter,
//! so the test-suite and the demo run on machines without a GPU.

mod programs;
mod raster;
mod texture;

use std::mem::size_of;
use std::ops::Range;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec4;
use log::{debug, trace};
use rayon::prelude::*;

use self::programs::{blend, Bound, Fullscreen, MeshDraw, Slots};
use self::raster::{clip_near, rasterize};
use self::texture::{quantize, View};
pub use self::texture::SoftTexture;
use super::backend::{
    Backend, PassExecution, ResolvedBinding, ResolvedCommand, ResolvedTexture,
};
use super::types::{
    BufferDesc, LoadOp, PipelineDesc, Program, SamplerDesc, TextureData, TextureDesc,
    TextureDimension, TextureFormat, VertexLayout,
};
use crate::error::GpuError;
use crate::renderer::Vertex;

pub struct SoftBuffer {
    bytes: RwLock<Vec<u8>>,
}

pub struct SoftPipeline {
    program: Program,
}

#[derive(Default)]
pub struct SoftwareBackend {
    frames: u64,
    passes: u64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes executed since creation.
    pub fn passes_executed(&self) -> u64 {
        self.passes
    }
}

/// One attachment layer, locked for writing for the duration of a pass.
struct Target<'a> {
    layers: RwLockWriteGuard<'a, Vec<Vec<f32>>>,
    layer: usize,
    format: TextureFormat,
    width: usize,
}

impl<'a> Target<'a> {
    fn lock(texture: &ResolvedTexture<'a, SoftwareBackend>, layer: u32) -> Self {
        Self {
            layers: texture
                .resource
                .layers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            layer: layer as usize,
            format: texture.desc.format,
            width: texture.desc.width as usize,
        }
    }

    fn texels(&mut self) -> &mut [f32] {
        &mut self.layers[self.layer]
    }

    fn clear(&mut self, value: [f32; 4]) {
        let format = self.format;
        let channels = format.channels();
        let value = value.map(|v| quantize(format, v));
        for texel in self.texels().chunks_exact_mut(channels) {
            texel.copy_from_slice(&value[..channels]);
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width + x as usize) * self.format.channels()
    }

    fn get(&self, x: u32, y: u32) -> Vec4 {
        read_texel(&self.layers[self.layer], self.index(x, y), self.format.channels())
    }

    fn put(&mut self, x: u32, y: u32, value: Vec4) {
        let index = self.index(x, y);
        let format = self.format;
        write_texel(self.texels(), index, format, value);
    }
}

fn read_texel(texels: &[f32], index: usize, channels: usize) -> Vec4 {
    if channels == 1 {
        Vec4::new(texels[index], 0.0, 0.0, 1.0)
    } else {
        Vec4::from_slice(&texels[index..index + 4])
    }
}

fn write_texel(texels: &mut [f32], index: usize, format: TextureFormat, value: Vec4) {
    let value = value.to_array();
    for (c, texel) in texels[index..index + format.channels()].iter_mut().enumerate() {
        *texel = quantize(format, value[c]);
    }
}

impl SoftwareBackend {
    fn draw_fullscreen(
        pipeline: &PipelineDesc,
        slots: &Slots<'_>,
        colors: &mut [Target<'_>],
        width: u32,
        height: u32,
    ) {
        let program = Fullscreen::prepare(pipeline.program, slots);
        let Some((target, state)) = colors.first_mut().zip(pipeline.color_targets.first()) else {
            return;
        };
        let format = target.format;
        let channels = format.channels();
        let blend_state = state.blend;

        target
            .texels()
            .par_chunks_mut(width as usize * channels)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width {
                    let src = program.shade(slots, x, y as u32, width, height);
                    let index = x as usize * channels;
                    let dst = read_texel(row, index, channels);
                    write_texel(row, index, format, blend(blend_state, src, dst));
                }
            });
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_indexed(
        pipeline: &PipelineDesc,
        slots: &Slots<'_>,
        colors: &mut [Target<'_>],
        mut depth: Option<&mut Target<'_>>,
        vertex_buffer: &SoftBuffer,
        index_buffer: &SoftBuffer,
        indices: Range<u32>,
        instances: Range<u32>,
        (width, height): (u32, u32),
    ) {
        let draw = MeshDraw::prepare(pipeline.program, slots);

        let vertex_bytes = vertex_buffer.read();
        let vertices: Vec<Vertex> = vertex_bytes
            .chunks_exact(size_of::<Vertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        let index_bytes = index_buffer.read();
        let index_list: Vec<usize> = index_bytes
            [indices.start as usize * 4..indices.end as usize * 4]
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .collect();

        for instance_index in instances {
            let instance = draw.instance(instance_index);
            let transformed: Vec<_> = vertices.iter().map(|v| draw.vertex(&instance, v)).collect();

            for triangle in index_list.chunks_exact(3) {
                let triangle = [
                    transformed[triangle[0]],
                    transformed[triangle[1]],
                    transformed[triangle[2]],
                ];
                for piece in clip_near(triangle) {
                    rasterize(&piece, width, height, pipeline.cull_mode, |fragment| {
                        if let (Some(state), Some(target)) = (pipeline.depth, depth.as_deref_mut()) {
                            let z = fragment.depth
                                + state.bias.constant as f32 / (1u32 << 24) as f32
                                + state.bias.slope_scale * fragment.slope;
                            if !state.compare.passes(z, target.get(fragment.x, fragment.y).x) {
                                return;
                            }
                            if state.write {
                                target.put(fragment.x, fragment.y, Vec4::splat(z));
                            }
                        }
                        if colors.is_empty() {
                            return;
                        }
                        let outputs = draw.fragment(&instance, &fragment);
                        for ((target, state), src) in colors
                            .iter_mut()
                            .zip(&pipeline.color_targets)
                            .zip(outputs)
                        {
                            let dst = target.get(fragment.x, fragment.y);
                            target.put(fragment.x, fragment.y, blend(state.blend, src, dst));
                        }
                    });
                }
            }
        }
    }
}

impl SoftBuffer {
    fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for SoftwareBackend {
    type Texture = SoftTexture;
    type Buffer = SoftBuffer;
    type Sampler = SamplerDesc;
    type Pipeline = SoftPipeline;

    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<SoftTexture, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::TextureCreation {
                label: desc.label.clone(),
                message: format!("zero-sized extent {}x{}", desc.width, desc.height),
            });
        }
        if desc.dimension == TextureDimension::D2 && desc.layers != 1 {
            return Err(GpuError::TextureCreation {
                label: desc.label.clone(),
                message: format!("2D texture with {} layers", desc.layers),
            });
        }
        Ok(SoftTexture::new(desc))
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<SoftBuffer, GpuError> {
        if desc.size == 0 {
            return Err(GpuError::BufferCreation {
                label: desc.label.clone(),
                message: "zero-sized buffer".into(),
            });
        }
        Ok(SoftBuffer {
            bytes: RwLock::new(vec![0; desc.size as usize]),
        })
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerDesc, GpuError> {
        Ok(desc.clone())
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<SoftPipeline, GpuError> {
        let mesh = desc.program.uses_mesh_vertices();
        let expected_targets = match desc.program {
            Program::ShadowDepth => 0,
            Program::GBuffer => 3,
            _ => 1,
        };
        let problem = if mesh != (desc.vertex_layout == VertexLayout::Mesh) {
            Some(format!("{:?} needs vertex layout {}", desc.program, if mesh { "Mesh" } else { "None" }))
        } else if desc.color_targets.len() != expected_targets {
            Some(format!(
                "{:?} writes {expected_targets} colour targets, pipeline declares {}",
                desc.program,
                desc.color_targets.len()
            ))
        } else if desc.program == Program::ShadowDepth && desc.depth.is_none() {
            Some("depth-only program without a depth state".to_string())
        } else {
            None
        };

        match problem {
            Some(message) => Err(GpuError::PipelineCreation {
                label: desc.label.clone(),
                message,
            }),
            None => Ok(SoftPipeline {
                program: desc.program,
            }),
        }
    }

    fn write_buffer(&mut self, buffer: &SoftBuffer, offset: u64, data: &[u8]) {
        let mut bytes = buffer.bytes.write().unwrap_or_else(PoisonError::into_inner);
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
    }

    fn write_texture(&mut self, texture: &SoftTexture, desc: &TextureDesc, layer: u32, data: &[u8]) {
        texture.upload(desc, layer, data);
    }

    fn begin_frame(&mut self) {
        self.frames += 1;
        trace!("Software frame {} begins", self.frames);
    }

    fn execute_pass(&mut self, pass: &PassExecution<'_, Self>) {
        self.passes += 1;
        let extent = pass.extent();

        let mut colors: Vec<Target<'_>> = pass
            .colors
            .iter()
            .map(|color| {
                let mut target = Target::lock(&color.texture, color.layer);
                if let LoadOp::Clear(value) = color.load {
                    target.clear(value);
                }
                target
            })
            .collect();
        let mut depth = pass.depth.as_ref().map(|attachment| {
            let mut target = Target::lock(&attachment.texture, attachment.layer);
            if let LoadOp::Clear(value) = attachment.load {
                target.clear([value; 4]);
            }
            target
        });

        let mut pipeline: Option<&PipelineDesc> = None;
        let mut slots = Slots::default();
        let mut vertex_buffer: Option<&SoftBuffer> = None;
        let mut index_buffer: Option<&SoftBuffer> = None;
        let mut draws = 0usize;

        for command in &pass.commands {
            match command {
                ResolvedCommand::SetPipeline(resource, desc) => {
                    debug_assert_eq!(resource.program, desc.program);
                    slots.reset(desc.slots.len());
                    pipeline = Some(*desc);
                }
                ResolvedCommand::Bind { slot, binding } => {
                    let bound = match binding {
                        ResolvedBinding::Buffer(buffer) => Bound::Buffer(buffer.read()),
                        ResolvedBinding::Texture { texture, layer } => Bound::Texture(View {
                            desc: texture.desc,
                            layers: texture.resource.read(),
                            layer: *layer,
                        }),
                        ResolvedBinding::Sampler(_, desc) => Bound::Sampler(desc),
                    };
                    slots.set(*slot, bound);
                }
                ResolvedCommand::SetVertexBuffer(buffer) => vertex_buffer = Some(*buffer),
                ResolvedCommand::SetIndexBuffer(buffer) => index_buffer = Some(*buffer),
                ResolvedCommand::Draw { .. } => {
                    if let Some(desc) = pipeline {
                        Self::draw_fullscreen(desc, &slots, &mut colors, extent.0, extent.1);
                        draws += 1;
                    }
                }
                ResolvedCommand::DrawIndexed { indices, instances } => {
                    let (Some(desc), Some(vertices), Some(index_data)) =
                        (pipeline, vertex_buffer, index_buffer)
                    else {
                        panic!("pass '{}': indexed draw without pipeline or buffers", pass.label);
                    };
                    Self::draw_indexed(
                        desc,
                        &slots,
                        &mut colors,
                        depth.as_mut(),
                        vertices,
                        index_data,
                        indices.clone(),
                        instances.clone(),
                        extent,
                    );
                    draws += 1;
                }
            }
        }
        debug!("Software pass '{}': {} draws", pass.label, draws);
    }

    fn end_frame(&mut self) {
        trace!("Software frame {} ends after {} passes", self.frames, self.passes);
    }

    fn read_texture(
        &mut self,
        texture: &SoftTexture,
        desc: &TextureDesc,
        layer: u32,
    ) -> Result<TextureData, GpuError> {
        Ok(texture.download(desc, layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BufferUsages, ColorTarget, BlendState, CullMode, PassRecording, ResourceManager, SlotKind};

    #[test]
    fn pipeline_with_wrong_vertex_layout_is_rejected() {
        let mut backend = SoftwareBackend::new();
        let desc = PipelineDesc {
            label: "Broken".into(),
            program: Program::GBuffer,
            vertex_layout: VertexLayout::None,
            cull_mode: CullMode::Back,
            depth: None,
            color_targets: Vec::new(),
            slots: Vec::new(),
        };
        let err = backend.create_pipeline(&desc).err().unwrap();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn clear_and_blur_a_target() {
        let mut resources = ResourceManager::new(SoftwareBackend::new());
        let source = resources
            .create_texture(TextureDesc::target("Source", 8, 8, TextureFormat::R8Unorm))
            .unwrap();
        let target = resources
            .create_texture(TextureDesc::target("Target", 8, 8, TextureFormat::R8Unorm))
            .unwrap();
        let blur = resources
            .create_pipeline(PipelineDesc {
                label: "Blur".into(),
                program: Program::SsaoBlur,
                vertex_layout: VertexLayout::None,
                cull_mode: CullMode::None,
                depth: None,
                color_targets: vec![ColorTarget {
                    format: TextureFormat::R8Unorm,
                    blend: BlendState::Replace,
                }],
                slots: vec![SlotKind::texture()],
            })
            .unwrap();

        resources.submit(&PassRecording::new("Clear").with_color(source, LoadOp::Clear([1.0; 4])));
        let mut pass = PassRecording::new("Blur").with_color(target, LoadOp::Clear([0.0; 4]));
        pass.set_pipeline(blur);
        pass.bind_texture(0, source);
        pass.draw_fullscreen();
        resources.submit(&pass);

        let data = resources.read_texture(target, 0).unwrap();
        assert!(data.channel(0).all(|v| v == 1.0));
        assert_eq!(resources.backend().passes_executed(), 2);
    }

    #[test]
    fn buffer_writes_land_at_offset() {
        let mut backend = SoftwareBackend::new();
        let buffer = backend
            .create_buffer(&BufferDesc {
                label: "B".into(),
                size: 8,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            })
            .unwrap();
        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(*buffer.read(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
    }
}
