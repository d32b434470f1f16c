use crate::gpu::types::Program;

const COMMON: &str = include_str!("../../shader/common.wgsl");
const GEOMETRY: &str = include_str!("../../shader/geometry.wgsl");

/// WGSL source and entry points of a program.
pub(super) struct ShaderSource {
    pub source: String,
    pub vertex_entry: &'static str,
    pub fragment_entry: Option<&'static str>,
}

pub(super) fn shader_source(program: Program) -> ShaderSource {
    let (body, vertex_entry, fragment_entry) = match program {
        Program::ShadowDepth => (
            include_str!("../../shader/shadow_depth.wgsl"),
            "vs_main",
            None,
        ),
        Program::GBuffer => (
            include_str!("../../shader/gbuffer.wgsl"),
            "vs_main",
            Some("fs_main"),
        ),
        Program::Transparent => (
            include_str!("../../shader/transparent.wgsl"),
            "vs_main",
            Some("fs_main"),
        ),
        Program::ShadowResolve => (
            include_str!("../../shader/shadow_resolve.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
        Program::Ssao => (
            include_str!("../../shader/ssao.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
        Program::SsaoBlur => (
            include_str!("../../shader/ssao_blur.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
        Program::Lighting => (
            include_str!("../../shader/lighting.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
        Program::BloomPrefilter => (
            include_str!("../../shader/bloom.wgsl"),
            "vs_fullscreen",
            Some("fs_prefilter"),
        ),
        Program::BloomDownsample => (
            include_str!("../../shader/bloom.wgsl"),
            "vs_fullscreen",
            Some("fs_downsample"),
        ),
        Program::BloomUpsample => (
            include_str!("../../shader/bloom.wgsl"),
            "vs_fullscreen",
            Some("fs_upsample"),
        ),
        Program::ToneMap => (
            include_str!("../../shader/tonemap.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
        Program::Debug => (
            include_str!("../../shader/debug.wgsl"),
            "vs_fullscreen",
            Some("fs_main"),
        ),
    };

    let source = if matches!(program, Program::GBuffer | Program::Transparent) {
        format!("{COMMON}\n{GEOMETRY}\n{body}")
    } else {
        format!("{COMMON}\n{body}")
    };

    ShaderSource {
        source,
        vertex_entry,
        fragment_entry,
    }
}
