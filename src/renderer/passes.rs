//! The frame passes, one plain function each.
//!
//! A pass records its attachments, binds its pipeline and inputs, issues
//! draws in draw-key order and submits. Inputs are always outputs of an
//! earlier pass or persistent resources, never a target the pass writes.

use super::context::RendererContext;
use super::draw_list::{DrawList, DrawListKind};
use super::frame::PreparedFrame;
use super::pipelines::{slot, PipelineId};
use super::stats::PassStats;
use crate::gpu::{Backend, Binding, LoadOp, PassRecording};
use crate::scene::TextureSlot;

const CLEAR_BLACK: LoadOp<[f32; 4]> = LoadOp::Clear([0.0, 0.0, 0.0, 0.0]);
const CLEAR_WHITE: LoadOp<[f32; 4]> = LoadOp::Clear([1.0, 1.0, 1.0, 1.0]);

/// Records every batch of `list`. `bind_shared` rebinds the per-pass slots
/// after each pipeline switch, since switching clears all bindings.
fn record_batches<B: Backend>(
    pass: &mut PassRecording,
    ctx: &RendererContext<B>,
    list: &DrawList,
    bind_shared: impl Fn(&mut PassRecording),
) -> PassStats {
    let mut stats = PassStats::default();
    let mut pipeline = None;
    let mut material = None;
    let mut mesh_bound = None;

    for batch in &list.batches {
        if pipeline != Some(batch.pipeline) {
            pass.set_pipeline(ctx.pipelines.get(batch.pipeline));
            bind_shared(pass);
            pipeline = Some(batch.pipeline);
            material = None;
        }

        if list.kind != DrawListKind::Shadow && material != Some(batch.material) {
            let bound = ctx.materials.get(batch.material);
            for input in TextureSlot::ALL {
                let texture = bound.and_then(|m| m.texture(input)).unwrap_or(ctx.white);
                pass.bind_texture(slot::geometry::TEXTURES + input as u32, texture);
            }
            material = Some(batch.material);
        }

        let mesh = ctx
            .meshes
            .get(batch.mesh)
            .unwrap_or_else(|| panic!("batch references a released mesh {:?}", batch.mesh));
        if mesh_bound != Some(batch.mesh) {
            pass.set_vertex_buffer(mesh.vertex_buffer);
            pass.set_index_buffer(mesh.index_buffer);
            mesh_bound = Some(batch.mesh);
        }
        pass.draw_indexed(0..mesh.index_count, batch.instances.clone());

        stats += PassStats {
            draw_calls: 1,
            triangles: u64::from(mesh.triangle_count()) * u64::from(batch.instance_count()),
        };
    }
    stats
}

/// Renders shadow casters into one atlas layer per cascade, nearest first.
pub fn shadow_depth<B: Backend>(ctx: &mut RendererContext<B>, frame: &PreparedFrame) -> PassStats {
    let mut stats = PassStats::default();
    let objects = ctx.buffers.objects;

    for index in 0..frame.cascades.len() {
        let cascade = ctx.buffers.cascades[index];
        let mut pass = PassRecording::new(format!("ShadowDepth{index}")).with_depth(
            ctx.targets.shadow_atlas,
            index as u32,
            LoadOp::Clear(1.0),
        );
        stats += record_batches(&mut pass, ctx, &frame.lists.shadow, |pass| {
            pass.bind_buffer(slot::shadow_depth::CASCADE, cascade);
            pass.bind_buffer(slot::shadow_depth::OBJECTS, objects);
        });
        ctx.resources.submit(&pass);
    }
    stats
}

/// Opaque geometry into albedo, normal, material and depth.
pub fn gbuffer<B: Backend>(ctx: &mut RendererContext<B>, frame: &PreparedFrame) -> PassStats {
    let targets = &ctx.targets;
    let mut pass = PassRecording::new("GBuffer")
        .with_color(targets.albedo, CLEAR_BLACK)
        .with_color(targets.normal, CLEAR_BLACK)
        .with_color(targets.material, CLEAR_BLACK)
        .with_depth(targets.depth, 0, LoadOp::Clear(1.0));

    let (frame_buffer, objects, sampler) = (
        ctx.buffers.frame,
        ctx.buffers.objects,
        ctx.samplers.material,
    );
    let stats = record_batches(&mut pass, ctx, &frame.lists.opaque, |pass| {
        pass.bind_buffer(slot::geometry::FRAME, frame_buffer);
        pass.bind_buffer(slot::geometry::OBJECTS, objects);
        pass.bind_sampler(slot::geometry::SAMPLER, sampler);
    });
    ctx.resources.submit(&pass);
    stats
}

/// Lit transparent surfaces, back to front, tested against opaque depth.
pub fn transparency<B: Backend>(ctx: &mut RendererContext<B>, frame: &PreparedFrame) -> PassStats {
    let targets = &ctx.targets;
    let mut pass = PassRecording::new("Transparency")
        .with_color(targets.transparency, CLEAR_BLACK)
        .with_depth(targets.depth, 0, LoadOp::Load);

    let buffers = &ctx.buffers;
    let (frame_buffer, objects, lights, sampler) = (
        buffers.frame,
        buffers.objects,
        buffers.lights,
        ctx.samplers.material,
    );
    let stats = record_batches(&mut pass, ctx, &frame.lists.transparent, |pass| {
        pass.bind_buffer(slot::geometry::FRAME, frame_buffer);
        pass.bind_buffer(slot::geometry::OBJECTS, objects);
        pass.bind_sampler(slot::geometry::SAMPLER, sampler);
        pass.bind_buffer(slot::geometry::LIGHTS, lights);
    });
    ctx.resources.submit(&pass);
    stats
}

/// Screen-space sun visibility from the shadow atlas.
pub fn shadow_resolve<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::shadow_resolve as s;

    let targets = &ctx.targets;
    let mut pass = PassRecording::new("ShadowResolve").with_color(targets.shadow_mask, CLEAR_WHITE);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::ShadowResolve));
    pass.bind_buffer(s::FRAME, ctx.buffers.frame);
    pass.bind_buffer(s::SHADOW, ctx.buffers.shadow);
    pass.bind_texture(s::DEPTH, targets.depth);
    pass.bind_texture(s::ATLAS, targets.shadow_atlas);
    pass.bind_sampler(s::SAMPLER, ctx.samplers.shadow);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}

/// Hemisphere-sampled occlusion from depth and normals.
pub fn ssao<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::ssao as s;

    let targets = &ctx.targets;
    let mut pass = PassRecording::new("Ssao").with_color(targets.ao_raw, CLEAR_WHITE);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::Ssao));
    pass.bind_buffer(s::FRAME, ctx.buffers.frame);
    pass.bind_buffer(s::PARAMS, ctx.buffers.ssao);
    pass.bind_texture(s::DEPTH, targets.depth);
    pass.bind_texture(s::NORMAL, targets.normal);
    pass.bind_texture(s::NOISE, ctx.noise);
    pass.bind_sampler(s::NOISE_SAMPLER, ctx.samplers.noise);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}

/// 4x4 box blur matching the noise tile.
pub fn ssao_blur<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    let targets = &ctx.targets;
    let mut pass = PassRecording::new("SsaoBlur").with_color(targets.ao, CLEAR_WHITE);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::SsaoBlur));
    pass.bind_texture(slot::ssao_blur::INPUT, targets.ao_raw);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}

/// Deferred resolve into the HDR buffer.
pub fn lighting<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::lighting as s;

    let targets = &ctx.targets;
    let mut pass = PassRecording::new("Lighting").with_color(targets.hdr, CLEAR_BLACK);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::Lighting));
    pass.bind_buffer(s::FRAME, ctx.buffers.frame);
    pass.bind_buffer(s::LIGHTS, ctx.buffers.lights);
    pass.bind_texture(s::ALBEDO, targets.albedo);
    pass.bind_texture(s::NORMAL, targets.normal);
    pass.bind_texture(s::MATERIAL, targets.material);
    pass.bind_texture(s::DEPTH, targets.depth);
    pass.bind_texture(s::SHADOW_MASK, targets.shadow_mask);
    pass.bind_texture(s::AO, targets.ao);
    pass.bind_texture(s::TRANSPARENCY, targets.transparency);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}

/// Bright-pass into level 0, then each level from the one above.
pub fn bloom_downsample<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::bloom as s;

    let levels = ctx.targets.bloom.len();
    for level in 0..levels {
        let (pipeline, source) = if level == 0 {
            (PipelineId::BloomPrefilter, ctx.targets.hdr)
        } else {
            (PipelineId::BloomDownsample, ctx.targets.bloom[level - 1])
        };
        let mut pass = PassRecording::new(format!("BloomDownsample{level}"))
            .with_color(ctx.targets.bloom[level], CLEAR_BLACK);
        pass.set_pipeline(ctx.pipelines.get(pipeline));
        pass.bind_buffer(s::PARAMS, ctx.buffers.bloom_downsample(level));
        pass.bind_texture(s::SOURCE, source);
        pass.bind_sampler(s::SAMPLER, ctx.samplers.linear_clamp);
        pass.draw_fullscreen();
        ctx.resources.submit(&pass);
    }
    PassStats::fullscreen(levels as u32)
}

/// Smallest to largest, each level blended additively onto the next larger.
pub fn bloom_upsample<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::bloom as s;

    let levels = ctx.targets.bloom.len();
    for level in (1..levels).rev() {
        let mut pass = PassRecording::new(format!("BloomUpsample{level}"))
            .with_color(ctx.targets.bloom[level - 1], LoadOp::Load);
        pass.set_pipeline(ctx.pipelines.get(PipelineId::BloomUpsample));
        pass.bind_buffer(s::PARAMS, ctx.buffers.bloom_upsample(level));
        pass.bind_texture(s::SOURCE, ctx.targets.bloom[level]);
        pass.bind_sampler(s::SAMPLER, ctx.samplers.linear_clamp);
        pass.draw_fullscreen();
        ctx.resources.submit(&pass);
    }
    PassStats::fullscreen(levels.saturating_sub(1) as u32)
}

/// Exposure, bloom composite and ACES into the 8-bit output.
pub fn tone_map<B: Backend>(ctx: &mut RendererContext<B>, _frame: &PreparedFrame) -> PassStats {
    use slot::tonemap as s;

    let targets = &ctx.targets;
    let mut pass = PassRecording::new("ToneMap").with_color(targets.output, CLEAR_BLACK);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::ToneMap));
    pass.bind_buffer(s::PARAMS, ctx.buffers.tonemap);
    pass.bind_texture(s::HDR, targets.hdr);
    pass.bind_texture(s::BLOOM, targets.bloom[0]);
    pass.bind_sampler(s::SAMPLER, ctx.samplers.linear_clamp);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}

/// Replaces the output with the selected intermediate target.
pub fn debug<B: Backend>(ctx: &mut RendererContext<B>, frame: &PreparedFrame) -> PassStats {
    use slot::debug as s;

    let targets = &ctx.targets;
    let mut pass = PassRecording::new("Debug").with_color(targets.output, CLEAR_BLACK);
    pass.set_pipeline(ctx.pipelines.get(PipelineId::Debug));
    pass.bind_buffer(s::PARAMS, ctx.buffers.debug);
    pass.bind_texture(s::ALBEDO, targets.albedo);
    pass.bind_texture(s::NORMAL, targets.normal);
    pass.bind_texture(s::MATERIAL, targets.material);
    pass.bind_texture(s::DEPTH, targets.depth);
    pass.bind_texture(s::AO, targets.ao);
    pass.bind_texture(s::SHADOW_MASK, targets.shadow_mask);
    pass.bind_texture(s::BLOOM, targets.bloom[0]);
    pass.bind(
        s::CASCADE,
        Binding::TextureLayer(targets.shadow_atlas, frame.debug_layer),
    );
    pass.bind_texture(s::TRANSPARENCY, targets.transparency);
    pass.draw_fullscreen();
    ctx.resources.submit(&pass);
    PassStats::fullscreen(1)
}
