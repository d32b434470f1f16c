//! The narrow contract between the renderer and a GPU implementation.
//!
//! Passes record [`PassRecording`]s in terms of handles; the resource
//! manager resolves the handles and hands the backend a [`PassExecution`]
//! that borrows the backend's own objects.

use std::ops::Range;

use super::types::{
    BufferDesc, BufferHandle, LoadOp, PipelineDesc, PipelineHandle, SamplerDesc, SamplerHandle,
    TextureData, TextureDesc, TextureHandle,
};
use crate::error::GpuError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Buffer(BufferHandle),
    /// Whole texture, viewed with its own dimension.
    Texture(TextureHandle),
    /// A single layer of an array texture, viewed as 2D.
    TextureLayer(TextureHandle, u32),
    Sampler(SamplerHandle),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SetPipeline(PipelineHandle),
    Bind { slot: u32, binding: Binding },
    SetVertexBuffer(BufferHandle),
    SetIndexBuffer(BufferHandle),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        instances: Range<u32>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub layer: u32,
    pub load: LoadOp<[f32; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureHandle,
    pub layer: u32,
    pub load: LoadOp<f32>,
}

/// One render pass worth of attachments and commands, expressed in handles.
#[derive(Clone, Debug, PartialEq)]
pub struct PassRecording {
    pub label: String,
    pub colors: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
    pub commands: Vec<Command>,
}

impl PassRecording {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            colors: Vec::new(),
            depth: None,
            commands: Vec::new(),
        }
    }

    pub fn with_color(mut self, texture: TextureHandle, load: LoadOp<[f32; 4]>) -> Self {
        self.colors.push(ColorAttachment {
            texture,
            layer: 0,
            load,
        });
        self
    }

    pub fn with_depth(mut self, texture: TextureHandle, layer: u32, load: LoadOp<f32>) -> Self {
        self.depth = Some(DepthAttachment {
            texture,
            layer,
            load,
        });
        self
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    pub fn bind(&mut self, slot: u32, binding: Binding) {
        self.commands.push(Command::Bind { slot, binding });
    }

    pub fn bind_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.bind(slot, Binding::Buffer(buffer));
    }

    pub fn bind_texture(&mut self, slot: u32, texture: TextureHandle) {
        self.bind(slot, Binding::Texture(texture));
    }

    pub fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle) {
        self.bind(slot, Binding::Sampler(sampler));
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(Command::SetVertexBuffer(buffer));
    }

    pub fn set_index_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(Command::SetIndexBuffer(buffer));
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed { indices, instances });
    }

    /// Full-screen triangle; programs without a vertex layout synthesize it.
    pub fn draw_fullscreen(&mut self) {
        self.commands.push(Command::Draw {
            vertices: 0..3,
            instances: 0..1,
        });
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .count()
    }
}

pub struct ResolvedTexture<'a, B: Backend + ?Sized> {
    pub handle: TextureHandle,
    pub resource: &'a B::Texture,
    pub desc: &'a TextureDesc,
}

pub enum ResolvedBinding<'a, B: Backend + ?Sized> {
    Buffer(&'a B::Buffer),
    Texture {
        texture: ResolvedTexture<'a, B>,
        layer: Option<u32>,
    },
    Sampler(&'a B::Sampler, &'a SamplerDesc),
}

pub enum ResolvedCommand<'a, B: Backend + ?Sized> {
    SetPipeline(&'a B::Pipeline, &'a PipelineDesc),
    Bind {
        slot: u32,
        binding: ResolvedBinding<'a, B>,
    },
    SetVertexBuffer(&'a B::Buffer),
    SetIndexBuffer(&'a B::Buffer),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        instances: Range<u32>,
    },
}

pub struct ResolvedColor<'a, B: Backend + ?Sized> {
    pub texture: ResolvedTexture<'a, B>,
    pub layer: u32,
    pub load: LoadOp<[f32; 4]>,
}

pub struct ResolvedDepth<'a, B: Backend + ?Sized> {
    pub texture: ResolvedTexture<'a, B>,
    pub layer: u32,
    pub load: LoadOp<f32>,
}

/// A [`PassRecording`] with every handle replaced by the backend object.
pub struct PassExecution<'a, B: Backend + ?Sized> {
    pub label: &'a str,
    pub colors: Vec<ResolvedColor<'a, B>>,
    pub depth: Option<ResolvedDepth<'a, B>>,
    pub commands: Vec<ResolvedCommand<'a, B>>,
}

impl<B: Backend + ?Sized> PassExecution<'_, B> {
    /// Size of the render area, taken from the first attachment.
    pub fn extent(&self) -> (u32, u32) {
        if let Some(color) = self.colors.first() {
            return (color.texture.desc.width, color.texture.desc.height);
        }
        self.depth
            .as_ref()
            .map(|depth| (depth.texture.desc.width, depth.texture.desc.height))
            .unwrap_or((0, 0))
    }
}

/// Creation, upload, pass execution and readback.
///
/// Submission is fire-and-forget: nothing here waits for the GPU except
/// [`Backend::read_texture`].
pub trait Backend {
    type Texture;
    type Buffer;
    type Sampler;
    type Pipeline;

    fn name(&self) -> &'static str;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture, GpuError>;
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Self::Buffer, GpuError>;
    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<Self::Sampler, GpuError>;
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<Self::Pipeline, GpuError>;

    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);
    fn write_texture(
        &mut self,
        texture: &Self::Texture,
        desc: &TextureDesc,
        layer: u32,
        data: &[u8],
    );

    fn begin_frame(&mut self);
    fn execute_pass(&mut self, pass: &PassExecution<'_, Self>);
    fn end_frame(&mut self);

    fn read_texture(
        &mut self,
        texture: &Self::Texture,
        desc: &TextureDesc,
        layer: u32,
    ) -> Result<TextureData, GpuError>;
}
