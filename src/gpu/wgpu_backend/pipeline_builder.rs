use super::convert;
use crate::gpu::types::{ColorTarget, CullMode, DepthState};

/// Fluent construction of a `wgpu::RenderPipeline` from backend-neutral
/// pipeline state.
pub(super) struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    vertex_entry: &'a str,
    fragment_entry: Option<&'a str>,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            shader,
            vertex_entry: "vs_main",
            fragment_entry: Some("fs_main"),
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_vertex_entry(mut self, entry: &'a str) -> Self {
        self.vertex_entry = entry;
        self
    }

    /// `None` builds a depth-only pipeline.
    pub fn with_fragment_entry(mut self, entry: Option<&'a str>) -> Self {
        self.fragment_entry = entry;
        self
    }

    pub fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    pub fn with_color_targets(mut self, targets: &[ColorTarget]) -> Self {
        self.color_targets.extend(targets.iter().map(|target| {
            Some(wgpu::ColorTargetState {
                format: convert::texture_format(target.format),
                blend: Some(convert::blend_state(target.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })
        }));
        self
    }

    pub fn with_depth(mut self, depth: Option<DepthState>) -> Self {
        self.depth_stencil = depth.map(|state| wgpu::DepthStencilState {
            format: convert::texture_format(state.format),
            depth_write_enabled: state.write,
            depth_compare: convert::compare_function(state.compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: state.bias.constant,
                slope_scale: state.bias.slope_scale,
                clamp: 0.0,
            },
        });
        self
    }

    pub fn with_cull_mode(mut self, cull: CullMode) -> Self {
        self.primitive.cull_mode = convert::cull_mode(cull);
        self
    }

    pub fn build(self) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.shader,
                    entry_point: Some(self.vertex_entry),
                    buffers: &self.vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: self.fragment_entry.map(|entry| wgpu::FragmentState {
                    module: self.shader,
                    entry_point: Some(entry),
                    targets: &self.color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: self.primitive,
                depth_stencil: self.depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}
