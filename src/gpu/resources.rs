use log::{debug, info};

use super::backend::{
    Backend, Binding, Command, PassExecution, PassRecording, ResolvedBinding, ResolvedColor,
    ResolvedCommand, ResolvedDepth, ResolvedTexture,
};
use super::handle::Arena;
use super::types::{
    markers, BufferDesc, BufferHandle, PipelineDesc, PipelineHandle, SampleKind, SamplerDesc,
    SamplerHandle, SamplerKind, SlotKind, TextureData, TextureDesc, TextureHandle, TextureUsages,
};
use crate::error::GpuError;

struct Entry<R, D> {
    desc: D,
    resource: R,
}

type TextureTable<B> = Arena<Entry<<B as Backend>::Texture, TextureDesc>, markers::Texture>;
type BufferTable<B> = Arena<Entry<<B as Backend>::Buffer, BufferDesc>, markers::Buffer>;
type SamplerTable<B> = Arena<Entry<<B as Backend>::Sampler, SamplerDesc>, markers::Sampler>;
type PipelineTable<B> = Arena<Entry<<B as Backend>::Pipeline, PipelineDesc>, markers::Pipeline>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RetiredResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub textures: usize,
    pub buffers: usize,
    pub samplers: usize,
    pub pipelines: usize,
    pub retired: usize,
}

/// Sole owner of every GPU object the renderer uses.
///
/// Passes only ever hold handles. Recreated resources are retired rather
/// than dropped: a resource retired during frame `N` still resolves until
/// frame `N + 1` begins, so work already recorded against it is never left
/// pointing at a destroyed object.
pub struct ResourceManager<B: Backend> {
    backend: B,
    textures: TextureTable<B>,
    buffers: BufferTable<B>,
    samplers: SamplerTable<B>,
    pipelines: PipelineTable<B>,
    retired: Vec<(RetiredResource, u64)>,
    frame_index: u64,
}

impl<B: Backend> ResourceManager<B> {
    pub fn new(backend: B) -> Self {
        info!("Resource manager using '{}' backend", backend.name());
        Self {
            backend,
            textures: Arena::new(),
            buffers: Arena::new(),
            samplers: Arena::new(),
            pipelines: Arena::new(),
            retired: Vec::new(),
            frame_index: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureHandle, GpuError> {
        debug!(
            "Creating texture '{}' {}x{}x{} {:?}",
            desc.label, desc.width, desc.height, desc.layers, desc.format
        );
        let resource = self.backend.create_texture(&desc)?;
        Ok(self.textures.insert(Entry { desc, resource }))
    }

    pub fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferHandle, GpuError> {
        debug!("Creating buffer '{}' ({} bytes)", desc.label, desc.size);
        let resource = self.backend.create_buffer(&desc)?;
        Ok(self.buffers.insert(Entry { desc, resource }))
    }

    pub fn create_sampler(&mut self, desc: SamplerDesc) -> Result<SamplerHandle, GpuError> {
        let resource = self.backend.create_sampler(&desc)?;
        Ok(self.samplers.insert(Entry { desc, resource }))
    }

    pub fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<PipelineHandle, GpuError> {
        info!("Creating pipeline '{}' ({:?})", desc.label, desc.program);
        let resource = self.backend.create_pipeline(&desc)?;
        Ok(self.pipelines.insert(Entry { desc, resource }))
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(handle).map(|entry| &entry.desc)
    }

    pub fn buffer_desc(&self, handle: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(handle).map(|entry| &entry.desc)
    }

    pub fn pipeline_desc(&self, handle: PipelineHandle) -> Option<&PipelineDesc> {
        self.pipelines.get(handle).map(|entry| &entry.desc)
    }

    pub fn contains_texture(&self, handle: TextureHandle) -> bool {
        self.textures.contains(handle)
    }

    pub fn contains_buffer(&self, handle: BufferHandle) -> bool {
        self.buffers.contains(handle)
    }

    pub fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) {
        let entry = self
            .buffers
            .get(handle)
            .unwrap_or_else(|| panic!("write to stale buffer handle {handle:?}"));
        assert!(
            offset + data.len() as u64 <= entry.desc.size,
            "write of {} bytes at {} overflows buffer '{}' ({} bytes)",
            data.len(),
            offset,
            entry.desc.label,
            entry.desc.size
        );
        self.backend.write_buffer(&entry.resource, offset, data);
    }

    pub fn write_texture(&mut self, handle: TextureHandle, layer: u32, data: &[u8]) {
        let entry = self
            .textures
            .get(handle)
            .unwrap_or_else(|| panic!("write to stale texture handle {handle:?}"));
        assert!(
            entry.desc.usage.contains(TextureUsages::COPY_DST),
            "texture '{}' is not an upload target",
            entry.desc.label
        );
        let expected = entry.desc.width as usize
            * entry.desc.height as usize
            * entry.desc.format.bytes_per_texel() as usize;
        assert_eq!(
            data.len(),
            expected,
            "upload size mismatch for texture '{}'",
            entry.desc.label
        );
        self.backend
            .write_texture(&entry.resource, &entry.desc, layer, data);
    }

    pub fn retire_texture(&mut self, handle: TextureHandle) {
        self.retired
            .push((RetiredResource::Texture(handle), self.frame_index));
    }

    pub fn retire_buffer(&mut self, handle: BufferHandle) {
        self.retired
            .push((RetiredResource::Buffer(handle), self.frame_index));
    }

    /// Starts frame `frame_index`, dropping everything retired in earlier frames.
    pub fn begin_frame(&mut self, frame_index: u64) {
        self.frame_index = frame_index;
        let textures = &mut self.textures;
        let buffers = &mut self.buffers;
        self.retired.retain(|(resource, retired_at)| {
            if *retired_at >= frame_index {
                return true;
            }
            match resource {
                RetiredResource::Texture(handle) => {
                    if let Some(entry) = textures.remove(*handle) {
                        debug!("Released retired texture '{}'", entry.desc.label);
                    }
                }
                RetiredResource::Buffer(handle) => {
                    if let Some(entry) = buffers.remove(*handle) {
                        debug!("Released retired buffer '{}'", entry.desc.label);
                    }
                }
            }
            false
        });
        self.backend.begin_frame();
    }

    pub fn end_frame(&mut self) {
        self.backend.end_frame();
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            textures: self.textures.len(),
            buffers: self.buffers.len(),
            samplers: self.samplers.len(),
            pipelines: self.pipelines.len(),
            retired: self.retired.len(),
        }
    }

    pub fn read_texture(
        &mut self,
        handle: TextureHandle,
        layer: u32,
    ) -> Result<TextureData, GpuError> {
        let entry = self
            .textures
            .get(handle)
            .unwrap_or_else(|| panic!("readback of stale texture handle {handle:?}"));
        assert!(layer < entry.desc.layers, "layer {layer} out of range");
        self.backend.read_texture(&entry.resource, &entry.desc, layer)
    }

    /// Validates a recorded pass and hands it to the backend.
    ///
    /// # Panics
    ///
    /// On stale handles, wrong resource kinds, unbound slots, and on any
    /// texture that is both sampled and written by the pass.
    pub fn submit(&mut self, pass: &PassRecording) {
        let textures = &self.textures;
        let buffers = &self.buffers;
        let samplers = &self.samplers;
        let pipelines = &self.pipelines;
        let label = pass.label.as_str();

        let mut written = Vec::with_capacity(pass.colors.len() + 1);
        let mut extent = None;

        let mut colors = Vec::with_capacity(pass.colors.len());
        for attachment in &pass.colors {
            let texture = resolve_texture::<B>(textures, attachment.texture, label);
            assert!(
                !texture.desc.format.is_depth(),
                "pass '{label}': depth texture '{}' used as colour attachment",
                texture.desc.label
            );
            check_attachment(label, texture.desc, attachment.layer, &mut extent);
            written.push(attachment.texture);
            colors.push(ResolvedColor {
                texture,
                layer: attachment.layer,
                load: attachment.load,
            });
        }

        let depth = pass.depth.map(|attachment| {
            let texture = resolve_texture::<B>(textures, attachment.texture, label);
            assert!(
                texture.desc.format.is_depth(),
                "pass '{label}': colour texture '{}' used as depth attachment",
                texture.desc.label
            );
            check_attachment(label, texture.desc, attachment.layer, &mut extent);
            written.push(attachment.texture);
            ResolvedDepth {
                texture,
                layer: attachment.layer,
                load: attachment.load,
            }
        });

        let mut commands = Vec::with_capacity(pass.commands.len());
        let mut current: Option<&PipelineDesc> = None;
        let mut bound: Vec<bool> = Vec::new();

        for command in &pass.commands {
            let resolved = match command {
                Command::SetPipeline(handle) => {
                    let entry = pipelines
                        .get(*handle)
                        .unwrap_or_else(|| panic!("pass '{label}': stale pipeline handle"));
                    current = Some(&entry.desc);
                    bound = vec![false; entry.desc.slots.len()];
                    ResolvedCommand::SetPipeline(&entry.resource, &entry.desc)
                }
                Command::Bind { slot, binding } => {
                    let pipeline = current.unwrap_or_else(|| {
                        panic!("pass '{label}': bind before a pipeline was set")
                    });
                    let kind = *pipeline.slots.get(*slot as usize).unwrap_or_else(|| {
                        panic!(
                            "pass '{label}': pipeline '{}' has no slot {slot}",
                            pipeline.label
                        )
                    });
                    if let Binding::Texture(texture) | Binding::TextureLayer(texture, _) = binding
                    {
                        assert!(
                            !written.contains(texture),
                            "pass '{label}' samples a texture it is rendering into"
                        );
                    }
                    bound[*slot as usize] = true;
                    ResolvedCommand::Bind {
                        slot: *slot,
                        binding: resolve_binding::<B>(
                            textures, buffers, samplers, *binding, kind, label,
                        ),
                    }
                }
                Command::SetVertexBuffer(handle) => ResolvedCommand::SetVertexBuffer(
                    &buffers
                        .get(*handle)
                        .unwrap_or_else(|| panic!("pass '{label}': stale vertex buffer"))
                        .resource,
                ),
                Command::SetIndexBuffer(handle) => ResolvedCommand::SetIndexBuffer(
                    &buffers
                        .get(*handle)
                        .unwrap_or_else(|| panic!("pass '{label}': stale index buffer"))
                        .resource,
                ),
                Command::Draw {
                    vertices,
                    instances,
                } => {
                    check_bound(label, current, &bound);
                    ResolvedCommand::Draw {
                        vertices: vertices.clone(),
                        instances: instances.clone(),
                    }
                }
                Command::DrawIndexed { indices, instances } => {
                    check_bound(label, current, &bound);
                    ResolvedCommand::DrawIndexed {
                        indices: indices.clone(),
                        instances: instances.clone(),
                    }
                }
            };
            commands.push(resolved);
        }

        let execution = PassExecution {
            label,
            colors,
            depth,
            commands,
        };
        self.backend.execute_pass(&execution);
    }
}

fn resolve_texture<'a, B: Backend>(
    textures: &'a TextureTable<B>,
    handle: TextureHandle,
    pass: &str,
) -> ResolvedTexture<'a, B> {
    let entry = textures
        .get(handle)
        .unwrap_or_else(|| panic!("pass '{pass}': stale texture handle {handle:?}"));
    ResolvedTexture {
        handle,
        resource: &entry.resource,
        desc: &entry.desc,
    }
}

fn resolve_binding<'a, B: Backend>(
    textures: &'a TextureTable<B>,
    buffers: &'a BufferTable<B>,
    samplers: &'a SamplerTable<B>,
    binding: Binding,
    kind: SlotKind,
    pass: &str,
) -> ResolvedBinding<'a, B> {
    match (binding, kind) {
        (Binding::Buffer(handle), SlotKind::Uniform | SlotKind::Storage) => {
            let entry = buffers
                .get(handle)
                .unwrap_or_else(|| panic!("pass '{pass}': stale buffer handle {handle:?}"));
            ResolvedBinding::Buffer(&entry.resource)
        }
        (Binding::Texture(handle), SlotKind::Texture { sample, .. }) => {
            let texture = resolve_texture::<B>(textures, handle, pass);
            check_sample_kind(pass, texture.desc, sample);
            ResolvedBinding::Texture {
                texture,
                layer: None,
            }
        }
        (Binding::TextureLayer(handle, layer), SlotKind::Texture { sample, array: false }) => {
            let texture = resolve_texture::<B>(textures, handle, pass);
            check_sample_kind(pass, texture.desc, sample);
            assert!(
                layer < texture.desc.layers,
                "pass '{pass}': layer {layer} out of range for '{}'",
                texture.desc.label
            );
            ResolvedBinding::Texture {
                texture,
                layer: Some(layer),
            }
        }
        (Binding::Sampler(handle), SlotKind::Sampler(sampler_kind)) => {
            let entry = samplers
                .get(handle)
                .unwrap_or_else(|| panic!("pass '{pass}': stale sampler handle {handle:?}"));
            assert_eq!(
                entry.desc.compare.is_some(),
                sampler_kind == SamplerKind::Comparison,
                "pass '{pass}': sampler '{}' does not match slot kind {sampler_kind:?}",
                entry.desc.label
            );
            ResolvedBinding::Sampler(&entry.resource, &entry.desc)
        }
        (binding, kind) => {
            panic!("pass '{pass}': {binding:?} cannot be bound to a {kind:?} slot")
        }
    }
}

fn check_sample_kind(pass: &str, desc: &TextureDesc, sample: SampleKind) {
    assert!(
        desc.usage.contains(TextureUsages::SAMPLED),
        "pass '{pass}': texture '{}' is not sampleable",
        desc.label
    );
    let ok = match sample {
        SampleKind::Depth => desc.format.is_depth(),
        SampleKind::Float => !desc.format.is_depth() && desc.format.is_filterable(),
        SampleKind::UnfilterableFloat => !desc.format.is_depth(),
    };
    assert!(
        ok,
        "pass '{pass}': texture '{}' ({:?}) does not match {sample:?} slot",
        desc.label, desc.format
    );
}

fn check_attachment(pass: &str, desc: &TextureDesc, layer: u32, extent: &mut Option<(u32, u32)>) {
    assert!(
        desc.usage.contains(TextureUsages::RENDER_TARGET),
        "pass '{pass}': texture '{}' is not a render target",
        desc.label
    );
    assert!(
        layer < desc.layers,
        "pass '{pass}': layer {layer} out of range for '{}'",
        desc.label
    );
    let size = (desc.width, desc.height);
    match extent {
        Some(existing) => assert_eq!(
            *existing, size,
            "pass '{pass}': attachment '{}' differs in size",
            desc.label
        ),
        None => *extent = Some(size),
    }
}

fn check_bound(pass: &str, pipeline: Option<&PipelineDesc>, bound: &[bool]) {
    let pipeline = pipeline.unwrap_or_else(|| panic!("pass '{pass}': draw without a pipeline"));
    if let Some(slot) = bound.iter().position(|is_bound| !is_bound) {
        panic!(
            "pass '{pass}': slot {slot} of pipeline '{}' is unbound",
            pipeline.label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::software::SoftwareBackend;
    use crate::gpu::types::{LoadOp, Program, TextureFormat, VertexLayout, CullMode, ColorTarget, BlendState};

    fn manager() -> ResourceManager<SoftwareBackend> {
        ResourceManager::new(SoftwareBackend::new())
    }

    #[test]
    fn retired_texture_survives_until_next_frame() {
        let mut resources = manager();
        resources.begin_frame(1);
        let texture = resources
            .create_texture(TextureDesc::target("A", 4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();

        resources.retire_texture(texture);
        assert!(resources.contains_texture(texture));
        assert_eq!(resources.counts().retired, 1);

        resources.begin_frame(2);
        assert!(!resources.contains_texture(texture));
        assert_eq!(resources.counts().retired, 0);
        assert_eq!(resources.counts().textures, 0);
    }

    fn tonemap_like_pipeline(resources: &mut ResourceManager<SoftwareBackend>) -> PipelineHandle {
        resources
            .create_pipeline(PipelineDesc {
                label: "Blit".into(),
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
            .unwrap()
    }

    #[test]
    #[should_panic(expected = "samples a texture it is rendering into")]
    fn reading_the_target_being_written_panics() {
        let mut resources = manager();
        let target = resources
            .create_texture(TextureDesc::target("Ao", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        let pipeline = tonemap_like_pipeline(&mut resources);

        let mut pass = PassRecording::new("Hazard").with_color(target, LoadOp::Load);
        pass.set_pipeline(pipeline);
        pass.bind_texture(0, target);
        pass.draw_fullscreen();
        resources.submit(&pass);
    }

    #[test]
    #[should_panic(expected = "is unbound")]
    fn drawing_with_an_unbound_slot_panics() {
        let mut resources = manager();
        let target = resources
            .create_texture(TextureDesc::target("Ao", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        let pipeline = tonemap_like_pipeline(&mut resources);

        let mut pass = PassRecording::new("Unbound").with_color(target, LoadOp::Load);
        pass.set_pipeline(pipeline);
        pass.draw_fullscreen();
        resources.submit(&pass);
    }

    #[test]
    #[should_panic(expected = "cannot be bound")]
    fn binding_a_buffer_to_a_texture_slot_panics() {
        let mut resources = manager();
        let target = resources
            .create_texture(TextureDesc::target("Ao", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        let buffer = resources
            .create_buffer(BufferDesc::uniform("U", 16))
            .unwrap();
        let pipeline = tonemap_like_pipeline(&mut resources);

        let mut pass = PassRecording::new("WrongKind").with_color(target, LoadOp::Load);
        pass.set_pipeline(pipeline);
        pass.bind_buffer(0, buffer);
        resources.submit(&pass);
    }
}
