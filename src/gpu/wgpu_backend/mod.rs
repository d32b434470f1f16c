//! Hardware backend on top of wgpu.
//!
//! Runs headless: no surface is created, the final image stays in a render
//! target and is read back on request. Every pass is submitted on its own so
//! buffer writes issued between passes are ordered exactly as recorded.

mod convert;
mod pipeline_builder;
mod shaders;

use std::borrow::Cow;
use std::sync::mpsc;

use log::{debug, info, trace, warn};

use self::pipeline_builder::PipelineBuilder;
use self::shaders::shader_source;
use super::backend::{Backend, PassExecution, ResolvedBinding, ResolvedCommand};
use super::types::{
    BufferDesc, LoadOp, PipelineDesc, SamplerDesc, TextureData, TextureDesc, TextureDimension,
    VertexLayout,
};
use crate::error::GpuError;
use crate::renderer::Vertex;

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// One 2D view per layer of an array texture; empty for plain 2D textures.
    layer_views: Vec<wgpu::TextureView>,
}

impl WgpuTexture {
    fn layer_view(&self, layer: u32) -> &wgpu::TextureView {
        self.layer_views
            .get(layer as usize)
            .unwrap_or(&self.view)
    }
}

pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    slot_count: usize,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: wgpu::AdapterInfo,
    submissions: u64,
}

impl WgpuBackend {
    /// Blocks on adapter and device creation.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Deferred Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let info = adapter.get_info();
        info!("Using adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            device,
            queue,
            adapter: info,
            submissions: 0,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter
    }

    /// Runs `create` inside a validation error scope and reports what the
    /// device rejected.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    /// Bind group for the next draw; `None` when a slot was left unbound.
    fn bind_group(
        &self,
        label: &str,
        pipeline: Option<&WgpuPipeline>,
        slots: &[Option<wgpu::BindingResource<'_>>],
    ) -> Option<wgpu::BindGroup> {
        let Some(pipeline) = pipeline else {
            warn!("Pass '{label}': draw without a pipeline");
            return None;
        };
        let entries = slots
            .iter()
            .enumerate()
            .map(|(binding, resource)| {
                resource.clone().map(|resource| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource,
                })
            })
            .collect::<Option<Vec<_>>>();
        let Some(entries) = entries else {
            warn!("Pass '{label}': draw with unbound slots skipped");
            return None;
        };
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &pipeline.bind_layout,
            entries: &entries,
        }))
    }

    fn wait_idle(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            warn!("Device poll failed: {e}");
        }
    }
}

impl Backend for WgpuBackend {
    type Texture = WgpuTexture;
    type Buffer = wgpu::Buffer;
    type Sampler = wgpu::Sampler;
    type Pipeline = WgpuPipeline;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<WgpuTexture, GpuError> {
        let array = desc.dimension == TextureDimension::D2Array;
        self.scoped(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: desc.layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: convert::texture_format(desc.format),
                usage: convert::texture_usages(desc.usage),
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&desc.label),
                dimension: Some(if array {
                    wgpu::TextureViewDimension::D2Array
                } else {
                    wgpu::TextureViewDimension::D2
                }),
                ..Default::default()
            });
            let layer_views = if array {
                (0..desc.layers)
                    .map(|layer| {
                        texture.create_view(&wgpu::TextureViewDescriptor {
                            label: Some(&desc.label),
                            dimension: Some(wgpu::TextureViewDimension::D2),
                            base_array_layer: layer,
                            array_layer_count: Some(1),
                            ..Default::default()
                        })
                    })
                    .collect()
            } else {
                Vec::new()
            };
            WgpuTexture {
                texture,
                view,
                layer_views,
            }
        })
        .map_err(|message| GpuError::TextureCreation {
            label: desc.label.clone(),
            message,
        })
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<wgpu::Buffer, GpuError> {
        if desc.size == 0 {
            return Err(GpuError::BufferCreation {
                label: desc.label.clone(),
                message: "size must be non-zero".into(),
            });
        }
        self.scoped(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size: desc.size,
                usage: convert::buffer_usages(desc.usage),
                mapped_at_creation: false,
            })
        })
        .map_err(|message| GpuError::BufferCreation {
            label: desc.label.clone(),
            message,
        })
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<wgpu::Sampler, GpuError> {
        let address = convert::address_mode(desc.address_mode);
        let filter = convert::filter_mode(desc.filter);
        self.scoped(|device| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(&desc.label),
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: filter,
                min_filter: filter,
                compare: desc.compare.map(convert::compare_function),
                ..Default::default()
            })
        })
        .map_err(|message| GpuError::SamplerCreation {
            label: desc.label.clone(),
            message,
        })
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<WgpuPipeline, GpuError> {
        let source = shader_source(desc.program);
        let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .slots
            .iter()
            .enumerate()
            .map(|(binding, kind)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: convert::binding_type(*kind),
                count: None,
            })
            .collect();

        let built = self.scoped(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&source.source)),
            });
            let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&desc.label),
                entries: &entries,
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });

            let mut builder = PipelineBuilder::new(device, &layout, &shader)
                .with_label(&desc.label)
                .with_vertex_entry(source.vertex_entry)
                .with_fragment_entry(source.fragment_entry)
                .with_color_targets(&desc.color_targets)
                .with_depth(desc.depth)
                .with_cull_mode(desc.cull_mode);
            if desc.vertex_layout == VertexLayout::Mesh {
                builder = builder.with_vertex_buffer(Vertex::layout());
            }
            (builder.build(), bind_layout)
        });

        match built {
            Ok((pipeline, bind_layout)) => {
                debug!("Created pipeline '{}'", desc.label);
                Ok(WgpuPipeline {
                    pipeline,
                    bind_layout,
                    slot_count: desc.slots.len(),
                })
            }
            Err(message) => Err(GpuError::PipelineCreation {
                label: desc.label.clone(),
                message,
            }),
        }
    }

    fn write_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn write_texture(&mut self, texture: &WgpuTexture, desc: &TextureDesc, layer: u32, data: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_texel()),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn begin_frame(&mut self) {
        trace!("wgpu frame begins at submission {}", self.submissions);
    }

    fn execute_pass(&mut self, pass: &PassExecution<'_, Self>) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pass
                .colors
                .iter()
                .map(|color| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: color.texture.resource.layer_view(color.layer),
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: match color.load {
                                LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                    r: r as f64,
                                    g: g as f64,
                                    b: b as f64,
                                    a: a as f64,
                                }),
                                LoadOp::Load => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();

            let depth_attachment =
                pass.depth
                    .as_ref()
                    .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                        view: depth.texture.resource.layer_view(depth.layer),
                        depth_ops: Some(wgpu::Operations {
                            load: match depth.load {
                                LoadOp::Clear(value) => wgpu::LoadOp::Clear(value),
                                LoadOp::Load => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut pipeline: Option<&WgpuPipeline> = None;
            let mut slots: Vec<Option<wgpu::BindingResource>> = Vec::new();
            let mut draws = 0usize;

            for command in &pass.commands {
                match command {
                    ResolvedCommand::SetPipeline(resource, _) => {
                        render_pass.set_pipeline(&resource.pipeline);
                        slots.clear();
                        slots.resize(resource.slot_count, None);
                        pipeline = Some(*resource);
                    }
                    ResolvedCommand::Bind { slot, binding } => {
                        let resource = match binding {
                            ResolvedBinding::Buffer(buffer) => buffer.as_entire_binding(),
                            ResolvedBinding::Texture { texture, layer } => {
                                wgpu::BindingResource::TextureView(match layer {
                                    Some(layer) => texture.resource.layer_view(*layer),
                                    None => &texture.resource.view,
                                })
                            }
                            ResolvedBinding::Sampler(sampler, _) => {
                                wgpu::BindingResource::Sampler(sampler)
                            }
                        };
                        if let Some(entry) = slots.get_mut(*slot as usize) {
                            *entry = Some(resource);
                        }
                    }
                    ResolvedCommand::SetVertexBuffer(buffer) => {
                        render_pass.set_vertex_buffer(0, buffer.slice(..));
                    }
                    ResolvedCommand::SetIndexBuffer(buffer) => {
                        render_pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                    }
                    ResolvedCommand::Draw {
                        vertices,
                        instances,
                    } => {
                        if let Some(bind_group) = self.bind_group(pass.label, pipeline, &slots) {
                            render_pass.set_bind_group(0, &bind_group, &[]);
                            render_pass.draw(vertices.clone(), instances.clone());
                            draws += 1;
                        }
                    }
                    ResolvedCommand::DrawIndexed { indices, instances } => {
                        if let Some(bind_group) = self.bind_group(pass.label, pipeline, &slots) {
                            render_pass.set_bind_group(0, &bind_group, &[]);
                            render_pass.draw_indexed(indices.clone(), 0, instances.clone());
                            draws += 1;
                        }
                    }
                }
            }
            debug!("wgpu pass '{}': {} draws", pass.label, draws);
        }

        self.queue.submit(Some(encoder.finish()));
        self.submissions += 1;
    }

    fn end_frame(&mut self) {
        trace!("wgpu frame ends at submission {}", self.submissions);
    }

    fn read_texture(
        &mut self,
        texture: &WgpuTexture,
        desc: &TextureDesc,
        layer: u32,
    ) -> Result<TextureData, GpuError> {
        let bytes_per_texel = desc.format.bytes_per_texel();
        let unpadded = desc.width * bytes_per_texel;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * desc.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: if desc.format.is_depth() {
                    wgpu::TextureAspect::DepthOnly
                } else {
                    wgpu::TextureAspect::All
                },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(desc.height),
                },
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));
        self.submissions += 1;

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait_idle();

        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mut bytes = Vec::with_capacity((unpadded * desc.height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded as usize).take(desc.height as usize) {
                bytes.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        staging.unmap();

        Ok(TextureData {
            width: desc.width,
            height: desc.height,
            channels: desc.format.channels(),
            texels: desc.format.decode(&bytes),
        })
    }
}
