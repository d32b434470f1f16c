//! Backend-neutral resource descriptors.
//!
//! Everything the renderer asks of a GPU backend is described with these
//! plain values; both the wgpu backend and the software backend translate
//! them into their own objects.

use bitflags::bitflags;
use half::f16;

use super::handle::Handle;

/// Marker types for [`Handle`]s owned by the resource manager.
pub mod markers {
    pub enum Texture {}
    pub enum Buffer {}
    pub enum Sampler {}
    pub enum Pipeline {}
}

pub type TextureHandle = Handle<markers::Texture>;
pub type BufferHandle = Handle<markers::Buffer>;
pub type SamplerHandle = Handle<markers::Sampler>;
pub type PipelineHandle = Handle<markers::Pipeline>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R8Unorm,
    R16Float,
    Depth32Float,
}

impl TextureFormat {
    pub const fn channels(self) -> usize {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba16Float | TextureFormat::Rgba32Float => 4,
            TextureFormat::R8Unorm | TextureFormat::R16Float | TextureFormat::Depth32Float => 1,
        }
    }

    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::R8Unorm => 1,
            TextureFormat::R16Float => 2,
            TextureFormat::Depth32Float => 4,
        }
    }

    pub const fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    /// Whether a linear filtering sampler may be used on this format.
    pub const fn is_filterable(self) -> bool {
        !matches!(
            self,
            TextureFormat::Rgba32Float | TextureFormat::Depth32Float
        )
    }

    /// Expands tightly packed texel bytes into one `f32` per channel.
    pub fn decode(self, data: &[u8]) -> Vec<f32> {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::R8Unorm => {
                data.iter().map(|&b| f32::from(b) / 255.0).collect()
            }
            TextureFormat::Rgba16Float | TextureFormat::R16Float => data
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            TextureFormat::Rgba32Float | TextureFormat::Depth32Float => data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D2Array,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u32 {
        const SAMPLED = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const COPY_DST = 1 << 2;
        const COPY_SRC = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub usage: TextureUsages,
}

impl TextureDesc {
    /// A single-layer texture that passes render into and later passes sample.
    pub fn target(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            layers: 1,
            format,
            dimension: TextureDimension::D2,
            usage: TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED | TextureUsages::COPY_SRC,
        }
    }

    /// A texture whose contents are uploaded from the CPU.
    pub fn uploaded(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            layers: 1,
            format,
            dimension: TextureDimension::D2,
            usage: TextureUsages::SAMPLED | TextureUsages::COPY_DST,
        }
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self.dimension = TextureDimension::D2Array;
        self
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.layers as usize
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const COPY_DST = 1 << 4;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsages,
}

impl BufferDesc {
    pub fn uniform(label: &str, size: u64) -> Self {
        Self {
            label: label.to_string(),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        }
    }

    pub fn storage(label: &str, size: u64) -> Self {
        Self {
            label: label.to_string(),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        }
    }

    pub fn vertex(label: &str, size: u64) -> Self {
        Self {
            label: label.to_string(),
            size,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        }
    }

    pub fn index(label: &str, size: u64) -> Self {
        Self {
            label: label.to_string(),
            size,
            usage: BufferUsages::INDEX | BufferUsages::COPY_DST,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    Always,
}

impl CompareFunction {
    pub fn passes(self, value: f32, reference: f32) -> bool {
        match self {
            CompareFunction::Less => value < reference,
            CompareFunction::LessEqual => value <= reference,
            CompareFunction::Greater => value > reference,
            CompareFunction::GreaterEqual => value >= reference,
            CompareFunction::Equal => value == reference,
            CompareFunction::Always => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SamplerDesc {
    pub label: String,
    pub address_mode: AddressMode,
    pub filter: FilterMode,
    pub compare: Option<CompareFunction>,
}

/// Shader program identity. Each backend maps a program to its own
/// implementation (WGSL module or CPU function).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    ShadowDepth,
    GBuffer,
    Transparent,
    ShadowResolve,
    Ssao,
    SsaoBlur,
    Lighting,
    BloomPrefilter,
    BloomDownsample,
    BloomUpsample,
    ToneMap,
    Debug,
}

impl Program {
    pub fn uses_mesh_vertices(self) -> bool {
        matches!(
            self,
            Program::ShadowDepth | Program::GBuffer | Program::Transparent
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendState {
    Replace,
    /// Premultiplied "over": `src + dst * (1 - src.a)`.
    PremultipliedAlpha,
    Additive,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthState {
    pub format: TextureFormat,
    pub write: bool,
    pub compare: CompareFunction,
    pub bias: DepthBias,
}

impl DepthState {
    pub fn read_write() -> Self {
        Self {
            format: TextureFormat::Depth32Float,
            write: true,
            compare: CompareFunction::LessEqual,
            bias: DepthBias {
                constant: 0,
                slope_scale: 0.0,
            },
        }
    }

    pub fn read_only() -> Self {
        Self {
            write: false,
            ..Self::read_write()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Full-screen triangle generated from the vertex index.
    None,
    /// Interleaved `Vertex` (position, normal, uv).
    Mesh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Float,
    UnfilterableFloat,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Filtering,
    NonFiltering,
    Comparison,
}

/// Kind of resource expected at a pipeline parameter slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Uniform,
    Storage,
    Texture { sample: SampleKind, array: bool },
    Sampler(SamplerKind),
}

impl SlotKind {
    pub const fn texture() -> Self {
        SlotKind::Texture {
            sample: SampleKind::Float,
            array: false,
        }
    }

    pub const fn depth_texture() -> Self {
        SlotKind::Texture {
            sample: SampleKind::Depth,
            array: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTarget {
    pub format: TextureFormat,
    pub blend: BlendState,
}

/// Immutable pipeline-state description; created once and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineDesc {
    pub label: String,
    pub program: Program,
    pub vertex_layout: VertexLayout,
    pub cull_mode: CullMode,
    pub depth: Option<DepthState>,
    pub color_targets: Vec<ColorTarget>,
    pub slots: Vec<SlotKind>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

/// CPU copy of one texture layer, expanded to `f32` channels.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub texels: Vec<f32>,
}

impl TextureData {
    /// Texel at `(x, y)` padded to four channels (missing channels read 0, alpha 1).
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let base = (y as usize * self.width as usize + x as usize) * self.channels;
        let mut out = [0.0, 0.0, 0.0, 1.0];
        for (c, slot) in out.iter_mut().enumerate().take(self.channels) {
            *slot = self.texels[base + c];
        }
        out
    }

    /// Texels of channel `c` across the whole layer.
    pub fn channel(&self, c: usize) -> impl Iterator<Item = f32> + '_ {
        self.texels.iter().skip(c).step_by(self.channels).copied()
    }
}
