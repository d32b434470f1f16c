//! Frame orchestration.
//!
//! A [`FramePipeline`] is an ordered list of [`PassDescriptor`]s. Rendering
//! a frame applies pending settings changes, prepares cascades, draw lists
//! and constants, then runs every enabled pass in order. Feature toggles
//! skip passes; nothing ever reorders them.

use glam::Vec2;
use log::debug;

use super::cascades::{fit_cascades, Cascade, CascadeConfig};
use super::constants::{
    BloomConstants, CascadeConstants, DebugConstants, FeatureFlags, FrameConstants,
    LightConstants, ShadowConstants, SsaoConstants, ToneMapConstants,
};
use super::context::RendererContext;
use super::draw_list::{FrameDrawLists, ShadowBound};
use super::passes;
use super::ssao::NOISE_SIZE;
use super::stats::{FrameStats, PassStats};
use crate::error::Result;
use crate::gpu::Backend;
use crate::scene::{primary_directional, FrameInput};
use crate::settings::DebugView;
use crate::time::timed;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassId {
    ShadowDepth,
    GBuffer,
    Transparency,
    ShadowResolve,
    Ssao,
    SsaoBlur,
    Lighting,
    BloomDownsample,
    BloomUpsample,
    ToneMap,
    Debug,
}

impl PassId {
    pub const COUNT: usize = 11;

    pub const ALL: [PassId; Self::COUNT] = [
        PassId::ShadowDepth,
        PassId::GBuffer,
        PassId::Transparency,
        PassId::ShadowResolve,
        PassId::Ssao,
        PassId::SsaoBlur,
        PassId::Lighting,
        PassId::BloomDownsample,
        PassId::BloomUpsample,
        PassId::ToneMap,
        PassId::Debug,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            PassId::ShadowDepth => "Shadow Depth",
            PassId::GBuffer => "G-Buffer",
            PassId::Transparency => "Transparency",
            PassId::ShadowResolve => "Shadow Resolve",
            PassId::Ssao => "SSAO",
            PassId::SsaoBlur => "SSAO Blur",
            PassId::Lighting => "Lighting",
            PassId::BloomDownsample => "Bloom Downsample",
            PassId::BloomUpsample => "Bloom Upsample",
            PassId::ToneMap => "Tone Mapping",
            PassId::Debug => "Debug",
        }
    }

    /// Whether the pass runs for `frame`.
    pub fn is_enabled(self, frame: &PreparedFrame) -> bool {
        match self {
            PassId::ShadowDepth | PassId::ShadowResolve => {
                frame.features.contains(FeatureFlags::SHADOWS)
            }
            PassId::Transparency => frame.features.contains(FeatureFlags::TRANSPARENCY),
            PassId::Ssao | PassId::SsaoBlur => frame.features.contains(FeatureFlags::SSAO),
            PassId::BloomDownsample | PassId::BloomUpsample => {
                frame.features.contains(FeatureFlags::BLOOM)
            }
            PassId::Debug => frame.debug_view != DebugView::None,
            PassId::GBuffer | PassId::Lighting | PassId::ToneMap => true,
        }
    }
}

/// Everything the passes read that is derived once per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedFrame {
    pub features: FeatureFlags,
    /// Empty when no shadows are rendered.
    pub cascades: Vec<Cascade>,
    pub lists: FrameDrawLists,
    pub debug_view: DebugView,
    pub debug_layer: u32,
}

pub type PassFn<B> = fn(&mut RendererContext<B>, &PreparedFrame) -> PassStats;

pub struct PassDescriptor<B: Backend> {
    pub id: PassId,
    pub run: PassFn<B>,
}

impl<B: Backend> Clone for PassDescriptor<B> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            run: self.run,
        }
    }
}

impl<B: Backend> PassDescriptor<B> {
    pub fn label(&self) -> &'static str {
        self.id.label()
    }
}

pub struct FramePipeline<B: Backend> {
    passes: Vec<PassDescriptor<B>>,
}

impl<B: Backend> FramePipeline<B> {
    /// # Panics
    ///
    /// If the passes are not in strictly ascending [`PassId`] order.
    pub fn new(passes: Vec<PassDescriptor<B>>) -> Self {
        assert!(
            passes.windows(2).all(|pair| pair[0].id < pair[1].id),
            "frame passes must keep the fixed pass order"
        );
        Self { passes }
    }

    /// Every pass, in the fixed frame order.
    pub fn standard() -> Self {
        let pass = |id, run: PassFn<B>| PassDescriptor { id, run };
        Self::new(vec![
            pass(PassId::ShadowDepth, passes::shadow_depth),
            pass(PassId::GBuffer, passes::gbuffer),
            pass(PassId::Transparency, passes::transparency),
            pass(PassId::ShadowResolve, passes::shadow_resolve),
            pass(PassId::Ssao, passes::ssao),
            pass(PassId::SsaoBlur, passes::ssao_blur),
            pass(PassId::Lighting, passes::lighting),
            pass(PassId::BloomDownsample, passes::bloom_downsample),
            pass(PassId::BloomUpsample, passes::bloom_upsample),
            pass(PassId::ToneMap, passes::tone_map),
            pass(PassId::Debug, passes::debug),
        ])
    }

    pub fn passes(&self) -> &[PassDescriptor<B>] {
        &self.passes
    }

    /// Renders one frame into the context's output target.
    ///
    /// Target recreation requested since the last frame happens here,
    /// before the first pass records.
    pub fn render(&self, ctx: &mut RendererContext<B>, input: &FrameInput<'_>) -> Result<()> {
        ctx.frame_index += 1;
        ctx.resources.begin_frame(ctx.frame_index);
        ctx.apply_pending_changes()?;

        let frame = prepare(ctx, input)?;

        let mut stats = FrameStats {
            frame_index: ctx.frame_index,
            materials: frame.lists.material_count() as u32,
            opaque_objects: frame.lists.opaque.len() as u32,
            transparent_objects: frame.lists.transparent.len() as u32,
            shadow_casters: frame.lists.shadow.len() as u32,
            cascades: frame.cascades.len() as u32,
            features: frame.features,
            ..FrameStats::default()
        };
        ctx.timings.clear();

        for pass in &self.passes {
            if !pass.id.is_enabled(&frame) {
                continue;
            }
            let (pass_stats, elapsed) = timed(|| (pass.run)(ctx, &frame));
            ctx.timings.record(pass.id, elapsed);
            stats.add_pass(pass_stats);
        }

        ctx.resources.end_frame();
        ctx.stats = stats;
        Ok(())
    }
}

impl<B: Backend> Default for FramePipeline<B> {
    fn default() -> Self {
        Self::standard()
    }
}

/// Records how many directional lights go unused. True when that number
/// changed to something non-zero, so the light list is reported once.
fn note_ignored_suns(reported: &mut usize, directional_count: usize) -> bool {
    let ignored = directional_count.saturating_sub(1);
    let changed = ignored != *reported;
    *reported = ignored;
    changed && ignored > 0
}

/// Picks the sun, fits cascades, builds draw lists and uploads every
/// constant block the passes read.
pub fn prepare<B: Backend>(
    ctx: &mut RendererContext<B>,
    input: &FrameInput<'_>,
) -> Result<PreparedFrame> {
    let settings = ctx.settings.clone();
    let camera = input.camera;
    let width = ctx.targets.width();
    let height = ctx.targets.height();

    let directional_count = input.lights.iter().filter(|l| l.is_directional()).count();
    if note_ignored_suns(&mut ctx.ignored_suns, directional_count) {
        debug!(
            "{} directional lights; only the first one is used",
            directional_count
        );
    }
    let sun = primary_directional(input.lights);

    let cascades = match sun {
        Some((_, direction, _, _)) if settings.shadow.enabled => fit_cascades(
            camera,
            direction,
            &CascadeConfig {
                count: ctx.targets.cascade_count() as usize,
                lambda: settings.shadow.lambda,
                resolution: ctx.targets.shadow_resolution(),
                z_multiplier: settings.shadow.z_multiplier,
            },
        ),
        _ => Vec::new(),
    };
    let shadow_bound = match (sun, cascades.last()) {
        (Some((_, direction, _, _)), Some(last)) => {
            Some(ShadowBound::new(camera, last.far, direction))
        }
        _ => None,
    };

    let lists = FrameDrawLists::build(input, &ctx.meshes, &ctx.materials, shadow_bound.as_ref());

    let mut features = FeatureFlags::empty();
    features.set(FeatureFlags::SHADOWS, !cascades.is_empty());
    features.set(FeatureFlags::SSAO, settings.ssao.enabled);
    features.set(FeatureFlags::TRANSPARENCY, !lists.transparent.is_empty());
    features.set(FeatureFlags::BLOOM, settings.bloom.enabled);

    ctx.upload(ctx.buffers.frame, &FrameConstants::new(camera, width, height));

    ctx.reserve_objects(lists.objects.len())?;
    if !lists.objects.is_empty() {
        ctx.resources
            .write_buffer(ctx.buffers.objects, 0, bytemuck::cast_slice(&lists.objects));
    }

    for (i, cascade) in cascades.iter().enumerate() {
        ctx.upload(ctx.buffers.cascades[i], &CascadeConstants::new(cascade));
    }
    ctx.upload(
        ctx.buffers.shadow,
        &ShadowConstants::new(
            &cascades,
            settings.shadow.depth_bias,
            settings.shadow.spread,
            ctx.targets.shadow_resolution(),
            settings.shadow.sample_count,
        ),
    );
    ctx.upload(
        ctx.buffers.lights,
        &LightConstants::new(
            input.lights,
            settings.ambient(),
            settings.clear_color(),
            features,
        ),
    );

    let noise_scale = Vec2::new(width as f32, height as f32) / NOISE_SIZE as f32;
    let ssao = SsaoConstants::new(
        &ctx.kernel,
        settings.ssao.radius,
        settings.ssao.bias,
        settings.ssao.intensity,
        noise_scale,
    );
    ctx.upload(ctx.buffers.ssao, &ssao);

    let extents = ctx.targets.bloom_extents().to_vec();
    for (level, extent) in extents.iter().enumerate() {
        let (source_width, source_height) = match level {
            0 => (width, height),
            _ => (extents[level - 1].width, extents[level - 1].height),
        };
        ctx.upload(
            ctx.buffers.bloom_downsample(level),
            &BloomConstants::new(
                source_width,
                source_height,
                settings.bloom.threshold,
                settings.bloom.filter_radius,
            ),
        );
        ctx.upload(
            ctx.buffers.bloom_upsample(level),
            &BloomConstants::new(
                extent.width,
                extent.height,
                settings.bloom.threshold,
                settings.bloom.filter_radius,
            ),
        );
    }

    ctx.upload(
        ctx.buffers.tonemap,
        &ToneMapConstants::new(
            settings.tone_mapping.exposure,
            settings.bloom.strength,
            features,
        ),
    );
    let debug_layer = settings
        .debug
        .cascade_layer
        .min(ctx.targets.cascade_count().saturating_sub(1));
    ctx.upload(
        ctx.buffers.debug,
        &DebugConstants::new(
            settings.debug.view.index(),
            debug_layer,
            camera.near(),
            camera.far(),
        ),
    );

    Ok(PreparedFrame {
        features,
        cascades,
        lists,
        debug_view: settings.debug.view,
        debug_layer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareBackend;
    use crate::renderer::draw_list::{DrawList, DrawListKind};

    #[test]
    fn pass_ids_follow_the_frame_order() {
        for (index, id) in PassId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, index);
        }
    }

    #[test]
    fn standard_pipeline_lists_every_pass_once() {
        let pipeline = FramePipeline::<SoftwareBackend>::standard();
        let ids: Vec<PassId> = pipeline.passes().iter().map(|p| p.id).collect();
        assert_eq!(ids, PassId::ALL.to_vec());
    }

    #[test]
    #[should_panic(expected = "fixed pass order")]
    fn reordered_pipelines_are_rejected() {
        let standard = FramePipeline::<SoftwareBackend>::standard();
        let mut passes = standard.passes().to_vec();
        passes.swap(1, 2);
        let _ = FramePipeline::new(passes);
    }

    #[test]
    fn extra_suns_are_reported_once_per_change() {
        let mut reported = 0;
        assert!(!note_ignored_suns(&mut reported, 1));
        assert!(note_ignored_suns(&mut reported, 3));
        assert!(!note_ignored_suns(&mut reported, 3));
        assert!(note_ignored_suns(&mut reported, 2));
        assert!(!note_ignored_suns(&mut reported, 0));
        assert!(note_ignored_suns(&mut reported, 2));
    }

    #[test]
    fn feature_toggles_gate_their_passes() {
        let frame = PreparedFrame {
            features: FeatureFlags::SSAO,
            cascades: Vec::new(),
            lists: FrameDrawLists {
                opaque: empty_list(DrawListKind::Opaque),
                transparent: empty_list(DrawListKind::Transparent),
                shadow: empty_list(DrawListKind::Shadow),
                objects: Vec::new(),
            },
            debug_view: DebugView::None,
            debug_layer: 0,
        };
        let enabled: Vec<PassId> = PassId::ALL
            .into_iter()
            .filter(|id| id.is_enabled(&frame))
            .collect();
        assert_eq!(
            enabled,
            vec![
                PassId::GBuffer,
                PassId::Ssao,
                PassId::SsaoBlur,
                PassId::Lighting,
                PassId::ToneMap
            ]
        );
    }

    fn empty_list(kind: DrawListKind) -> DrawList {
        DrawList {
            kind,
            items: Vec::new(),
            batches: Vec::new(),
        }
    }
}
