//! Pipeline-state objects used by the frame passes.
//!
//! Every pipeline is described once here and created up front; passes look
//! them up by [`PipelineId`]. The binding slot of each parameter equals its
//! `@binding` index in group 0 of the matching WGSL program.

use log::info;

use crate::error::{RendererError, Result};
use crate::gpu::{
    Backend, BlendState, ColorTarget, CullMode, DepthBias, DepthState,
    PipelineDesc, PipelineHandle, Program, ResourceManager, SampleKind, SamplerKind, SlotKind,
    TextureFormat, VertexLayout,
};
use crate::scene::TextureSlot;

use super::targets::formats;

/// Binding slot indices, per program.
pub mod slot {
    pub mod shadow_depth {
        pub const CASCADE: u32 = 0;
        pub const OBJECTS: u32 = 1;
    }

    /// G-buffer and transparency programs.
    pub mod geometry {
        pub const FRAME: u32 = 0;
        pub const OBJECTS: u32 = 1;
        /// First material texture; the rest follow in `TextureSlot` order.
        pub const TEXTURES: u32 = 2;
        pub const SAMPLER: u32 = 8;
        /// Transparency only.
        pub const LIGHTS: u32 = 9;
    }

    pub mod shadow_resolve {
        pub const FRAME: u32 = 0;
        pub const SHADOW: u32 = 1;
        pub const DEPTH: u32 = 2;
        pub const ATLAS: u32 = 3;
        pub const SAMPLER: u32 = 4;
    }

    pub mod ssao {
        pub const FRAME: u32 = 0;
        pub const PARAMS: u32 = 1;
        pub const DEPTH: u32 = 2;
        pub const NORMAL: u32 = 3;
        pub const NOISE: u32 = 4;
        pub const NOISE_SAMPLER: u32 = 5;
    }

    pub mod ssao_blur {
        pub const INPUT: u32 = 0;
    }

    pub mod lighting {
        pub const FRAME: u32 = 0;
        pub const LIGHTS: u32 = 1;
        pub const ALBEDO: u32 = 2;
        pub const NORMAL: u32 = 3;
        pub const MATERIAL: u32 = 4;
        pub const DEPTH: u32 = 5;
        pub const SHADOW_MASK: u32 = 6;
        pub const AO: u32 = 7;
        pub const TRANSPARENCY: u32 = 8;
    }

    /// Prefilter, downsample and upsample share one layout.
    pub mod bloom {
        pub const PARAMS: u32 = 0;
        pub const SOURCE: u32 = 1;
        pub const SAMPLER: u32 = 2;
    }

    pub mod tonemap {
        pub const PARAMS: u32 = 0;
        pub const HDR: u32 = 1;
        pub const BLOOM: u32 = 2;
        pub const SAMPLER: u32 = 3;
    }

    pub mod debug {
        pub const PARAMS: u32 = 0;
        pub const ALBEDO: u32 = 1;
        pub const NORMAL: u32 = 2;
        pub const MATERIAL: u32 = 3;
        pub const DEPTH: u32 = 4;
        pub const AO: u32 = 5;
        pub const SHADOW_MASK: u32 = 6;
        pub const BLOOM: u32 = 7;
        pub const CASCADE: u32 = 8;
        pub const TRANSPARENCY: u32 = 9;
    }
}

/// Identity of each pipeline. The discriminant doubles as the shader-program
/// id packed into draw keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineId {
    ShadowDepth,
    Opaque,
    OpaqueDoubleSided,
    Transparent,
    TransparentDoubleSided,
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

impl PipelineId {
    pub const ALL: [PipelineId; 14] = [
        PipelineId::ShadowDepth,
        PipelineId::Opaque,
        PipelineId::OpaqueDoubleSided,
        PipelineId::Transparent,
        PipelineId::TransparentDoubleSided,
        PipelineId::ShadowResolve,
        PipelineId::Ssao,
        PipelineId::SsaoBlur,
        PipelineId::Lighting,
        PipelineId::BloomPrefilter,
        PipelineId::BloomDownsample,
        PipelineId::BloomUpsample,
        PipelineId::ToneMap,
        PipelineId::Debug,
    ];

    pub const fn program_id(self) -> u32 {
        self as u32
    }

    /// Geometry pipeline for a material's sidedness.
    pub fn geometry(transparent: bool, double_sided: bool) -> Self {
        match (transparent, double_sided) {
            (false, false) => PipelineId::Opaque,
            (false, true) => PipelineId::OpaqueDoubleSided,
            (true, false) => PipelineId::Transparent,
            (true, true) => PipelineId::TransparentDoubleSided,
        }
    }

    pub fn from_program_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

fn color(format: TextureFormat) -> ColorTarget {
    ColorTarget {
        format,
        blend: BlendState::Replace,
    }
}

fn geometry_slots(with_lights: bool) -> Vec<SlotKind> {
    let mut slots = vec![SlotKind::Uniform, SlotKind::Storage];
    slots.extend(std::iter::repeat(SlotKind::texture()).take(TextureSlot::COUNT));
    slots.push(SlotKind::Sampler(SamplerKind::Filtering));
    if with_lights {
        slots.push(SlotKind::Uniform);
    }
    slots
}

fn fullscreen(label: &str, program: Program, target: ColorTarget, slots: Vec<SlotKind>) -> PipelineDesc {
    PipelineDesc {
        label: label.to_string(),
        program,
        vertex_layout: VertexLayout::None,
        cull_mode: CullMode::None,
        depth: None,
        color_targets: vec![target],
        slots,
    }
}

/// Immutable description of pipeline `id`.
pub fn describe(id: PipelineId) -> PipelineDesc {
    let texture = SlotKind::texture();
    let depth = SlotKind::depth_texture();
    let linear = SlotKind::Sampler(SamplerKind::Filtering);

    match id {
        PipelineId::ShadowDepth => PipelineDesc {
            label: "ShadowDepthPipeline".into(),
            program: Program::ShadowDepth,
            vertex_layout: VertexLayout::Mesh,
            // Both faces so thin and open meshes still cast.
            cull_mode: CullMode::None,
            depth: Some(DepthState {
                bias: DepthBias {
                    constant: 2,
                    slope_scale: 2.0,
                },
                ..DepthState::read_write()
            }),
            color_targets: Vec::new(),
            slots: vec![SlotKind::Uniform, SlotKind::Storage],
        },
        PipelineId::Opaque | PipelineId::OpaqueDoubleSided => PipelineDesc {
            label: if id == PipelineId::Opaque {
                "GBufferPipeline".into()
            } else {
                "GBufferDoubleSidedPipeline".into()
            },
            program: Program::GBuffer,
            vertex_layout: VertexLayout::Mesh,
            cull_mode: if id == PipelineId::Opaque {
                CullMode::Back
            } else {
                CullMode::None
            },
            depth: Some(DepthState::read_write()),
            color_targets: vec![
                color(formats::ALBEDO),
                color(formats::NORMAL),
                color(formats::MATERIAL),
            ],
            slots: geometry_slots(false),
        },
        PipelineId::Transparent | PipelineId::TransparentDoubleSided => PipelineDesc {
            label: if id == PipelineId::Transparent {
                "TransparentPipeline".into()
            } else {
                "TransparentDoubleSidedPipeline".into()
            },
            program: Program::Transparent,
            vertex_layout: VertexLayout::Mesh,
            cull_mode: if id == PipelineId::Transparent {
                CullMode::Back
            } else {
                CullMode::None
            },
            depth: Some(DepthState::read_only()),
            color_targets: vec![ColorTarget {
                format: formats::TRANSPARENCY,
                blend: BlendState::PremultipliedAlpha,
            }],
            slots: geometry_slots(true),
        },
        PipelineId::ShadowResolve => fullscreen(
            "ShadowResolvePipeline",
            Program::ShadowResolve,
            color(formats::SHADOW_MASK),
            vec![
                SlotKind::Uniform,
                SlotKind::Uniform,
                depth,
                SlotKind::Texture {
                    sample: SampleKind::Depth,
                    array: true,
                },
                SlotKind::Sampler(SamplerKind::Comparison),
            ],
        ),
        PipelineId::Ssao => fullscreen(
            "SsaoPipeline",
            Program::Ssao,
            color(formats::AO),
            vec![
                SlotKind::Uniform,
                SlotKind::Uniform,
                depth,
                texture,
                SlotKind::Texture {
                    sample: SampleKind::UnfilterableFloat,
                    array: false,
                },
                SlotKind::Sampler(SamplerKind::NonFiltering),
            ],
        ),
        PipelineId::SsaoBlur => fullscreen(
            "SsaoBlurPipeline",
            Program::SsaoBlur,
            color(formats::AO),
            vec![texture],
        ),
        PipelineId::Lighting => fullscreen(
            "LightingPipeline",
            Program::Lighting,
            color(formats::HDR),
            vec![
                SlotKind::Uniform,
                SlotKind::Uniform,
                texture,
                texture,
                texture,
                depth,
                texture,
                texture,
                texture,
            ],
        ),
        PipelineId::BloomPrefilter => fullscreen(
            "BloomPrefilterPipeline",
            Program::BloomPrefilter,
            color(formats::BLOOM),
            vec![SlotKind::Uniform, texture, linear],
        ),
        PipelineId::BloomDownsample => fullscreen(
            "BloomDownsamplePipeline",
            Program::BloomDownsample,
            color(formats::BLOOM),
            vec![SlotKind::Uniform, texture, linear],
        ),
        PipelineId::BloomUpsample => fullscreen(
            "BloomUpsamplePipeline",
            Program::BloomUpsample,
            ColorTarget {
                format: formats::BLOOM,
                blend: BlendState::Additive,
            },
            vec![SlotKind::Uniform, texture, linear],
        ),
        PipelineId::ToneMap => fullscreen(
            "ToneMapPipeline",
            Program::ToneMap,
            color(formats::OUTPUT),
            vec![SlotKind::Uniform, texture, texture, linear],
        ),
        PipelineId::Debug => fullscreen(
            "DebugPipeline",
            Program::Debug,
            color(formats::OUTPUT),
            vec![
                SlotKind::Uniform,
                texture,
                texture,
                texture,
                depth,
                texture,
                texture,
                texture,
                depth,
                texture,
            ],
        ),
    }
}

/// Every pipeline the frame needs, created once at startup.
pub struct PipelineLibrary {
    handles: Vec<PipelineHandle>,
}

impl PipelineLibrary {
    /// Creates all pipelines, reporting every failure at once.
    pub fn new<B: Backend>(resources: &mut ResourceManager<B>) -> Result<Self> {
        let mut handles = Vec::with_capacity(PipelineId::ALL.len());
        let mut failures = Vec::new();

        for id in PipelineId::ALL {
            match resources.create_pipeline(describe(id)) {
                Ok(handle) => handles.push(handle),
                Err(err) => failures.push(err.to_string()),
            }
        }

        if !failures.is_empty() {
            return Err(RendererError::init(&failures));
        }
        info!("Created {} pipelines", handles.len());
        Ok(Self { handles })
    }

    pub fn get(&self, id: PipelineId) -> PipelineHandle {
        self.handles[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CompareFunction;

    #[test]
    fn program_ids_round_trip() {
        for id in PipelineId::ALL {
            assert_eq!(PipelineId::from_program_id(id.program_id()), Some(id));
        }
        assert_eq!(PipelineId::from_program_id(99), None);
    }

    #[test]
    fn slot_constants_match_descriptors() {
        let geometry = describe(PipelineId::Transparent);
        assert_eq!(geometry.slots.len() as u32, slot::geometry::LIGHTS + 1);
        assert_eq!(
            geometry.slots[slot::geometry::SAMPLER as usize],
            SlotKind::Sampler(SamplerKind::Filtering)
        );
        assert_eq!(
            describe(PipelineId::Opaque).slots.len() as u32,
            slot::geometry::SAMPLER + 1
        );
        assert_eq!(
            describe(PipelineId::Lighting).slots.len() as u32,
            slot::lighting::TRANSPARENCY + 1
        );
        assert_eq!(
            describe(PipelineId::Debug).slots.len() as u32,
            slot::debug::TRANSPARENCY + 1
        );
        assert_eq!(
            describe(PipelineId::ShadowResolve).slots[slot::shadow_resolve::SAMPLER as usize],
            SlotKind::Sampler(SamplerKind::Comparison)
        );
    }

    #[test]
    fn double_sided_variants_disable_culling() {
        assert_eq!(describe(PipelineId::Opaque).cull_mode, CullMode::Back);
        assert_eq!(describe(PipelineId::OpaqueDoubleSided).cull_mode, CullMode::None);
        assert_eq!(
            describe(PipelineId::TransparentDoubleSided).depth.map(|d| d.write),
            Some(false)
        );
        assert_eq!(
            describe(PipelineId::ShadowDepth).depth.map(|d| d.compare),
            Some(CompareFunction::LessEqual)
        );
    }
}
