//! CPU versions of the shader programs.
//!
//! Each program here mirrors the WGSL module of the same name under
//! `src/shader/`: same constant blocks, same binding slots, same math.

use std::mem::size_of;
use std::sync::RwLockReadGuard;

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::raster::{ClipVertex, Fragment, Varyings};
use super::texture::View;
use crate::gpu::types::{BlendState, Program, SamplerDesc};
use crate::renderer::cascades::MAX_CASCADES;
use crate::renderer::constants::{
    BloomConstants, CascadeConstants, DebugConstants, FeatureFlags, FrameConstants,
    LightConstants, ObjectConstants, ShadowConstants, SsaoConstants, ToneMapConstants,
    MAX_POINT_LIGHTS,
};
use crate::renderer::pipelines::slot;
use crate::renderer::ssao::MAX_SSAO_SAMPLES;
use crate::renderer::Vertex;
use crate::scene::TextureSlot;
use crate::settings::DebugView;

pub(super) enum Bound<'a> {
    Buffer(RwLockReadGuard<'a, Vec<u8>>),
    Texture(View<'a>),
    Sampler(&'a SamplerDesc),
}

/// Resources bound to the current pipeline's parameter slots.
#[derive(Default)]
pub(super) struct Slots<'a> {
    bound: Vec<Option<Bound<'a>>>,
}

impl<'a> Slots<'a> {
    pub fn reset(&mut self, count: usize) {
        self.bound.clear();
        self.bound.resize_with(count, || None);
    }

    pub fn set(&mut self, slot: u32, bound: Bound<'a>) {
        self.bound[slot as usize] = Some(bound);
    }

    fn get(&self, slot: u32) -> &Bound<'a> {
        self.bound[slot as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("slot {slot} is unbound"))
    }

    /// Element `index` of a buffer viewed as an array of `T`.
    pub fn element<T: Pod>(&self, slot: u32, index: usize) -> T {
        match self.get(slot) {
            Bound::Buffer(bytes) => {
                let start = index * size_of::<T>();
                bytemuck::pod_read_unaligned(&bytes[start..start + size_of::<T>()])
            }
            _ => panic!("slot {slot} does not hold a buffer"),
        }
    }

    pub fn uniform<T: Pod>(&self, slot: u32) -> T {
        self.element(slot, 0)
    }

    pub fn texture(&self, slot: u32) -> &View<'a> {
        match self.get(slot) {
            Bound::Texture(view) => view,
            _ => panic!("slot {slot} does not hold a texture"),
        }
    }

    pub fn sampler(&self, slot: u32) -> &SamplerDesc {
        match self.get(slot) {
            Bound::Sampler(desc) => desc,
            _ => panic!("slot {slot} does not hold a sampler"),
        }
    }
}

pub(super) fn blend(state: BlendState, src: Vec4, dst: Vec4) -> Vec4 {
    match state {
        BlendState::Replace => src,
        BlendState::PremultipliedAlpha => src + dst * (1.0 - src.w),
        BlendState::Additive => src + dst,
    }
}

fn uv_to_ndc(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

/// Position behind screen point `uv` at device depth `depth`.
fn unproject(inverse: Mat4, uv: Vec2, depth: f32) -> Vec3 {
    inverse.project_point3(uv_to_ndc(uv).extend(depth))
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Some unit vector perpendicular to `n`.
fn perpendicular(n: Vec3) -> Vec3 {
    let axis = if n.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    n.cross(axis).normalize()
}

fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.y.abs() < 0.999 { Vec3::Y } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    (tangent, n.cross(tangent))
}

/// Narkowicz's fit of the ACES filmic curve.
fn aces(x: Vec3) -> Vec3 {
    let num = x * (x * 2.51 + 0.03);
    let den = x * (x * 2.43 + 0.59) + 0.14;
    (num / den).clamp(Vec3::ZERO, Vec3::ONE)
}

struct Surface {
    position: Vec3,
    normal: Vec3,
    albedo: Vec3,
    specular: f32,
    roughness: f32,
    metalness: f32,
    occlusion: f32,
}

/// Lambert diffuse plus Blinn-Phong specular for one light direction.
fn brdf(surface: &Surface, view: Vec3, light: Vec3) -> Vec3 {
    let n_dot_l = surface.normal.dot(light).max(0.0);
    if n_dot_l <= 0.0 {
        return Vec3::ZERO;
    }
    let half = (light + view).normalize_or_zero();
    let shininess = 256.0 + (4.0 - 256.0) * surface.roughness.clamp(0.0, 1.0);
    let diffuse = surface.albedo * (1.0 - surface.metalness);
    let f0 = Vec3::splat(surface.specular).lerp(surface.albedo, surface.metalness);
    let specular = f0 * surface.normal.dot(half).max(0.0).powf(shininess);
    (diffuse + specular) * n_dot_l
}

/// Sun (scaled by `sun_visibility`) plus every point light in range.
fn direct_lighting(surface: &Surface, view: Vec3, lights: &LightConstants, sun_visibility: f32) -> Vec3 {
    let mut color = Vec3::ZERO;

    if lights.sun_direction[3] > 0.5 {
        let to_sun = -Vec4::from(lights.sun_direction).truncate();
        let sun = Vec4::from(lights.sun_color);
        color += brdf(surface, view, to_sun) * sun.truncate() * sun.w * sun_visibility;
    }

    let points = (lights.counts[0] as usize).min(MAX_POINT_LIGHTS);
    for i in 0..points {
        let position = Vec4::from(lights.point_position[i]);
        let to_light = position.truncate() - surface.position;
        let distance = to_light.length();
        if distance <= 0.0 || distance >= position.w {
            continue;
        }
        let falloff = 1.0 - (distance / position.w).powi(2);
        let light = Vec4::from(lights.point_color[i]);
        color += brdf(surface, view, to_light / distance)
            * light.truncate()
            * light.w
            * falloff
            * falloff;
    }
    color
}

/// A full-screen program with its constant blocks read once per draw.
pub(super) enum Fullscreen {
    ShadowResolve {
        frame: Box<FrameConstants>,
        shadow: Box<ShadowConstants>,
    },
    Ssao {
        frame: Box<FrameConstants>,
        ssao: Box<SsaoConstants>,
    },
    SsaoBlur,
    Lighting {
        frame: Box<FrameConstants>,
        lights: Box<LightConstants>,
    },
    BloomPrefilter(BloomConstants),
    BloomDownsample(BloomConstants),
    BloomUpsample(BloomConstants),
    ToneMap(ToneMapConstants),
    Debug(DebugConstants),
}

impl Fullscreen {
    pub fn prepare(program: Program, slots: &Slots<'_>) -> Self {
        match program {
            Program::ShadowResolve => Fullscreen::ShadowResolve {
                frame: Box::new(slots.uniform(slot::shadow_resolve::FRAME)),
                shadow: Box::new(slots.uniform(slot::shadow_resolve::SHADOW)),
            },
            Program::Ssao => Fullscreen::Ssao {
                frame: Box::new(slots.uniform(slot::ssao::FRAME)),
                ssao: Box::new(slots.uniform(slot::ssao::PARAMS)),
            },
            Program::SsaoBlur => Fullscreen::SsaoBlur,
            Program::Lighting => Fullscreen::Lighting {
                frame: Box::new(slots.uniform(slot::lighting::FRAME)),
                lights: Box::new(slots.uniform(slot::lighting::LIGHTS)),
            },
            Program::BloomPrefilter => {
                Fullscreen::BloomPrefilter(slots.uniform(slot::bloom::PARAMS))
            }
            Program::BloomDownsample => {
                Fullscreen::BloomDownsample(slots.uniform(slot::bloom::PARAMS))
            }
            Program::BloomUpsample => Fullscreen::BloomUpsample(slots.uniform(slot::bloom::PARAMS)),
            Program::ToneMap => Fullscreen::ToneMap(slots.uniform(slot::tonemap::PARAMS)),
            Program::Debug => Fullscreen::Debug(slots.uniform(slot::debug::PARAMS)),
            Program::ShadowDepth | Program::GBuffer | Program::Transparent => {
                panic!("{program:?} draws meshes, not a full-screen triangle")
            }
        }
    }

    /// Colour of pixel `(x, y)` of a `width` x `height` target.
    pub fn shade(&self, slots: &Slots<'_>, x: u32, y: u32, width: u32, height: u32) -> Vec4 {
        let uv = Vec2::new(
            (x as f32 + 0.5) / width as f32,
            (y as f32 + 0.5) / height as f32,
        );
        match self {
            Fullscreen::ShadowResolve { frame, shadow } => {
                let depth = slots.texture(slot::shadow_resolve::DEPTH).load_uv(uv, 0).x;
                if depth >= 1.0 {
                    return Vec4::ONE;
                }
                Vec4::splat(shadow_visibility(frame, shadow, slots, uv, depth))
            }
            Fullscreen::Ssao { frame, ssao } => {
                let depth = slots.texture(slot::ssao::DEPTH).load_uv(uv, 0).x;
                if depth >= 1.0 {
                    return Vec4::ONE;
                }
                Vec4::splat(ambient_occlusion(frame, ssao, slots, uv, depth))
            }
            Fullscreen::SsaoBlur => {
                let input = slots.texture(slot::ssao_blur::INPUT);
                let px = (uv.x * input.width() as f32).floor() as i32;
                let py = (uv.y * input.height() as f32).floor() as i32;
                let mut sum = 0.0;
                for dy in -2..2 {
                    for dx in -2..2 {
                        sum += input.load(px + dx, py + dy, 0).x;
                    }
                }
                Vec4::splat(sum / 16.0)
            }
            Fullscreen::Lighting { frame, lights } => lighting(frame, lights, slots, uv),
            Fullscreen::BloomPrefilter(params) => {
                let color = box_downsample(params, slots, uv);
                let brightness = color.max_element();
                let contribution = (brightness - params.params[0]).max(0.0) / brightness.max(1e-4);
                (color * contribution).extend(1.0)
            }
            Fullscreen::BloomDownsample(params) => box_downsample(params, slots, uv).extend(1.0),
            Fullscreen::BloomUpsample(params) => {
                let source = slots.texture(slot::bloom::SOURCE);
                let sampler = slots.sampler(slot::bloom::SAMPLER);
                let r = params.params[1];
                let mut sum = Vec3::ZERO;
                for (dy, wy) in [(-1.0, 1.0), (0.0, 2.0), (1.0, 1.0)] {
                    for (dx, wx) in [(-1.0, 1.0), (0.0, 2.0), (1.0, 1.0)] {
                        let tap = source.sample(sampler, uv + Vec2::new(dx, dy) * r, 0);
                        sum += tap.truncate() * (wx * wy);
                    }
                }
                (sum / 16.0).extend(0.0)
            }
            Fullscreen::ToneMap(params) => {
                let sampler = slots.sampler(slot::tonemap::SAMPLER);
                let hdr = slots.texture(slot::tonemap::HDR).sample(sampler, uv, 0).truncate();
                let bloom = if params.features().contains(FeatureFlags::BLOOM) {
                    slots.texture(slot::tonemap::BLOOM).sample(sampler, uv, 0).truncate()
                } else {
                    Vec3::ZERO
                };
                let [exposure, strength, ..] = params.params;
                let mapped = aces((hdr + bloom * strength) * exposure);
                mapped.powf(1.0 / 2.2).extend(1.0)
            }
            Fullscreen::Debug(params) => debug_view(params, slots, uv),
        }
    }
}

fn shadow_visibility(
    frame: &FrameConstants,
    shadow: &ShadowConstants,
    slots: &Slots<'_>,
    uv: Vec2,
    depth: f32,
) -> f32 {
    let world = unproject(frame.inv_view_proj(), uv, depth);
    let view_depth = -frame.view().transform_point3(world).z;
    let count = (shadow.counts[0] as usize).min(MAX_CASCADES);
    let Some(cascade) = (0..count).find(|&i| view_depth <= shadow.splits[i]) else {
        return 1.0;
    };

    let clip = shadow.cascade_view_proj(cascade) * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    let shadow_uv = ndc_to_uv(ndc.truncate());
    if shadow_uv.cmplt(Vec2::ZERO).any() || shadow_uv.cmpgt(Vec2::ONE).any() || ndc.z > 1.0 {
        return 1.0;
    }

    let atlas = slots.texture(slot::shadow_resolve::ATLAS);
    let sampler = slots.sampler(slot::shadow_resolve::SAMPLER);
    let [bias, spread, texel, _] = shadow.params;
    let reference = ndc.z - bias;
    let taps = shadow.counts[1].max(1);
    let grid = (taps as f32).sqrt().ceil() as u32;
    let centre = (grid - 1) as f32 * 0.5;
    let step = spread * texel;

    let mut lit = 0.0;
    for tap in 0..taps {
        let offset = Vec2::new((tap % grid) as f32 - centre, (tap / grid) as f32 - centre) * step;
        lit += atlas.sample_compare(sampler, shadow_uv + offset, cascade as u32, reference);
    }
    lit / taps as f32
}

fn ambient_occlusion(
    frame: &FrameConstants,
    ssao: &SsaoConstants,
    slots: &Slots<'_>,
    uv: Vec2,
    depth: f32,
) -> f32 {
    let depth_texture = slots.texture(slot::ssao::DEPTH);
    let inv_proj = frame.inv_proj();
    let proj = frame.proj();

    let position = unproject(inv_proj, uv, depth);
    let world_normal = slots.texture(slot::ssao::NORMAL).load_uv(uv, 0).truncate();
    let normal = frame.view().transform_vector3(world_normal).normalize_or_zero();
    if normal == Vec3::ZERO {
        return 1.0;
    }

    let noise_uv = uv * Vec2::new(ssao.noise_scale[0], ssao.noise_scale[1]);
    let random = slots
        .texture(slot::ssao::NOISE)
        .sample(slots.sampler(slot::ssao::NOISE_SAMPLER), noise_uv, 0)
        .truncate();
    let mut tangent = random - normal * random.dot(normal);
    tangent = if tangent.length_squared() < 1e-6 {
        perpendicular(normal)
    } else {
        tangent.normalize()
    };
    let bitangent = normal.cross(tangent);

    let [radius, bias, intensity, _] = ssao.params;
    let count = (ssao.counts[0] as usize).clamp(1, MAX_SSAO_SAMPLES);
    let mut occlusion = 0.0;
    for k in &ssao.kernel[..count] {
        let sample = position + (tangent * k[0] + bitangent * k[1] + normal * k[2]) * radius;
        let clip = proj * sample.extend(1.0);
        if clip.w <= 0.0 {
            continue;
        }
        let sample_uv = ndc_to_uv(clip.truncate().truncate() / clip.w);
        let scene_depth = depth_texture.load_uv(sample_uv, 0).x;
        let scene_z = unproject(inv_proj, sample_uv, scene_depth).z;
        let range = smoothstep(0.0, 1.0, radius / (position.z - scene_z).abs().max(1e-5));
        if scene_z >= sample.z + bias {
            occlusion += range;
        }
    }
    (1.0 - occlusion / count as f32).max(0.0).powf(intensity)
}

fn lighting(frame: &FrameConstants, lights: &LightConstants, slots: &Slots<'_>, uv: Vec2) -> Vec4 {
    let features = lights.features();
    let accum = if features.contains(FeatureFlags::TRANSPARENCY) {
        slots.texture(slot::lighting::TRANSPARENCY).load_uv(uv, 0)
    } else {
        Vec4::ZERO
    };

    let depth = slots.texture(slot::lighting::DEPTH).load_uv(uv, 0).x;
    let color = if depth >= 1.0 {
        Vec4::from(lights.clear_color).truncate()
    } else {
        let material = slots.texture(slot::lighting::MATERIAL).load_uv(uv, 0);
        let surface = Surface {
            position: unproject(frame.inv_view_proj(), uv, depth),
            normal: slots
                .texture(slot::lighting::NORMAL)
                .load_uv(uv, 0)
                .truncate()
                .normalize_or_zero(),
            albedo: slots.texture(slot::lighting::ALBEDO).load_uv(uv, 0).truncate(),
            specular: material.x,
            roughness: material.y,
            metalness: material.z,
            occlusion: material.w,
        };
        let ao = if features.contains(FeatureFlags::SSAO) {
            slots.texture(slot::lighting::AO).load_uv(uv, 0).x
        } else {
            1.0
        };
        let shadow = if features.contains(FeatureFlags::SHADOWS) {
            slots.texture(slot::lighting::SHADOW_MASK).load_uv(uv, 0).x
        } else {
            1.0
        };
        let view = (frame.camera_position() - surface.position).normalize_or_zero();
        let ambient = Vec4::from(lights.ambient).truncate();
        ambient * surface.albedo * ao * surface.occlusion
            + direct_lighting(&surface, view, lights, shadow)
    };

    (accum.truncate() + color * (1.0 - accum.w)).extend(1.0)
}

fn box_downsample(params: &BloomConstants, slots: &Slots<'_>, uv: Vec2) -> Vec3 {
    let source = slots.texture(slot::bloom::SOURCE);
    let sampler = slots.sampler(slot::bloom::SAMPLER);
    let texel = Vec2::new(params.source_texel[0], params.source_texel[1]);
    let mut sum = Vec3::ZERO;
    for offset in [
        Vec2::new(-1.0, -1.0),
        Vec2::new(1.0, -1.0),
        Vec2::new(-1.0, 1.0),
        Vec2::new(1.0, 1.0),
    ] {
        sum += source.sample(sampler, uv + offset * texel, 0).truncate();
    }
    sum * 0.25
}

fn debug_view(params: &DebugConstants, slots: &Slots<'_>, uv: Vec2) -> Vec4 {
    let load = |slot: u32| slots.texture(slot).load_uv(uv, 0);
    let grey = |v: f32| Vec3::splat(v).extend(1.0);
    let [near, far, ..] = params.params;

    match DebugView::from_index(params.mode[0]) {
        Some(DebugView::Albedo) => load(slot::debug::ALBEDO).truncate().extend(1.0),
        Some(DebugView::Normals) => {
            (load(slot::debug::NORMAL).truncate() * 0.5 + Vec3::splat(0.5)).extend(1.0)
        }
        Some(DebugView::Material) => load(slot::debug::MATERIAL).truncate().extend(1.0),
        Some(DebugView::Depth) => {
            let d = load(slot::debug::DEPTH).x;
            let linear = far * near / (far - d * (far - near));
            grey(linear / far)
        }
        Some(DebugView::Ssao) => grey(load(slot::debug::AO).x),
        Some(DebugView::ShadowMask) => grey(load(slot::debug::SHADOW_MASK).x),
        Some(DebugView::Bloom) => load(slot::debug::BLOOM)
            .truncate()
            .clamp(Vec3::ZERO, Vec3::ONE)
            .extend(1.0),
        Some(DebugView::ShadowCascade) => grey(load(slot::debug::CASCADE).x),
        Some(DebugView::Transparency) => load(slot::debug::TRANSPARENCY).truncate().extend(1.0),
        Some(DebugView::None) | None => Vec4::new(0.0, 0.0, 0.0, 1.0),
    }
}

/// Per-instance matrices, derived once from the object block.
pub(super) struct Instance {
    world: Mat4,
    normal_matrix: Mat4,
    object: ObjectConstants,
}

/// A mesh program with its per-draw constants read once.
pub(super) struct MeshDraw<'s, 'a> {
    program: Program,
    slots: &'s Slots<'a>,
    objects: u32,
    view_proj: Mat4,
    frame: Option<Box<FrameConstants>>,
    lights: Option<Box<LightConstants>>,
}

impl<'s, 'a> MeshDraw<'s, 'a> {
    pub fn prepare(program: Program, slots: &'s Slots<'a>) -> Self {
        match program {
            Program::ShadowDepth => {
                let cascade: CascadeConstants = slots.uniform(slot::shadow_depth::CASCADE);
                Self {
                    program,
                    slots,
                    objects: slot::shadow_depth::OBJECTS,
                    view_proj: Mat4::from_cols_array_2d(&cascade.view_proj),
                    frame: None,
                    lights: None,
                }
            }
            Program::GBuffer | Program::Transparent => {
                let frame: FrameConstants = slots.uniform(slot::geometry::FRAME);
                let lights = (program == Program::Transparent)
                    .then(|| Box::new(slots.uniform(slot::geometry::LIGHTS)));
                Self {
                    program,
                    slots,
                    objects: slot::geometry::OBJECTS,
                    view_proj: frame.view_proj(),
                    frame: Some(Box::new(frame)),
                    lights,
                }
            }
            _ => panic!("{program:?} is a full-screen program"),
        }
    }

    pub fn instance(&self, index: u32) -> Instance {
        let object: ObjectConstants = self.slots.element(self.objects, index as usize);
        Instance {
            world: object.world(),
            normal_matrix: object.normal_matrix(),
            object,
        }
    }

    pub fn vertex(&self, instance: &Instance, vertex: &Vertex) -> ClipVertex {
        let world = instance.world.transform_point3(Vec3::from_array(vertex.pos));
        ClipVertex {
            clip: self.view_proj * world.extend(1.0),
            varyings: Varyings {
                world,
                normal: instance
                    .normal_matrix
                    .transform_vector3(Vec3::from_array(vertex.normal)),
                uv: Vec2::from_array(vertex.uv),
            },
        }
    }

    /// Colour outputs in attachment order; unused entries are zero.
    pub fn fragment(&self, instance: &Instance, fragment: &Fragment) -> [Vec4; 3] {
        match self.program {
            Program::GBuffer => {
                let (surface, _) = self.surface(instance, fragment);
                [
                    surface.albedo.extend(1.0),
                    surface.normal.extend(1.0),
                    Vec4::new(
                        surface.specular,
                        surface.roughness,
                        surface.metalness,
                        surface.occlusion,
                    ),
                ]
            }
            Program::Transparent => {
                let (surface, alpha) = self.surface(instance, fragment);
                let (Some(frame), Some(lights)) = (&self.frame, &self.lights) else {
                    return [Vec4::ZERO; 3];
                };
                let view = (frame.camera_position() - surface.position).normalize_or_zero();
                let ambient = Vec4::from(lights.ambient).truncate();
                let color = ambient * surface.albedo * surface.occlusion
                    + direct_lighting(&surface, view, lights, 1.0);
                [(color * alpha).extend(alpha), Vec4::ZERO, Vec4::ZERO]
            }
            _ => [Vec4::ZERO; 3],
        }
    }

    fn material_texture(&self, instance: &Instance, input: TextureSlot, uv: Vec2) -> Option<Vec4> {
        (instance.object.flags[0] & input.bit() != 0).then(|| {
            self.slots
                .texture(slot::geometry::TEXTURES + input as u32)
                .sample(self.slots.sampler(slot::geometry::SAMPLER), uv, 0)
        })
    }

    fn surface(&self, instance: &Instance, fragment: &Fragment) -> (Surface, f32) {
        let object = &instance.object;
        let uv = fragment.varyings.uv;

        let diffuse = Vec4::from(object.diffuse);
        let mut albedo = diffuse.truncate();
        let mut alpha = diffuse.w;
        if let Some(texel) = self.material_texture(instance, TextureSlot::Diffuse, uv) {
            albedo *= texel.truncate();
            alpha *= texel.w;
        }
        if let Some(texel) = self.material_texture(instance, TextureSlot::Opacity, uv) {
            alpha *= texel.x;
        }

        let mut normal = fragment.varyings.normal.normalize_or_zero();
        if !fragment.front_facing {
            normal = -normal;
        }
        if let Some(texel) = self.material_texture(instance, TextureSlot::Normal, uv) {
            let t = texel.truncate() * 2.0 - Vec3::ONE;
            let (tangent, bitangent) = tangent_frame(normal);
            normal = (tangent * t.x + bitangent * t.y + normal * t.z).normalize_or_zero();
        }

        let [specular, mut roughness, mut metalness, _] = object.surface;
        if let Some(texel) = self.material_texture(instance, TextureSlot::Metallic, uv) {
            metalness *= texel.x;
        }
        if let Some(texel) = self.material_texture(instance, TextureSlot::Roughness, uv) {
            roughness *= texel.x;
        }
        let occlusion = self
            .material_texture(instance, TextureSlot::Occlusion, uv)
            .map_or(1.0, |texel| texel.x);

        (
            Surface {
                position: fragment.varyings.world,
                normal,
                albedo,
                specular,
                roughness,
                metalness,
                occlusion,
            },
            alpha,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_modes() {
        let src = Vec4::new(0.2, 0.0, 0.0, 0.5);
        let dst = Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert_eq!(blend(BlendState::Replace, src, dst), src);
        assert!(blend(BlendState::PremultipliedAlpha, src, dst)
            .abs_diff_eq(Vec4::new(0.2, 0.5, 0.0, 1.0), 1e-6));
        assert_eq!(blend(BlendState::Additive, src, dst), src + dst);
    }

    #[test]
    fn aces_maps_zero_to_black_and_saturates() {
        assert!(aces(Vec3::ZERO).abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!(aces(Vec3::splat(1.0e4)).abs_diff_eq(Vec3::ONE, 1e-2));
        let mid = aces(Vec3::splat(0.5)).x;
        assert!(mid > 0.5 && mid < 0.7, "{mid}");
    }

    #[test]
    fn facing_light_is_brighter_than_grazing() {
        let surface = Surface {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            albedo: Vec3::splat(0.5),
            specular: 0.04,
            roughness: 0.8,
            metalness: 0.0,
            occlusion: 1.0,
        };
        let facing = brdf(&surface, Vec3::Y, Vec3::Y);
        let grazing = brdf(&surface, Vec3::Y, Vec3::new(1.0, 0.1, 0.0).normalize());
        let behind = brdf(&surface, Vec3::Y, Vec3::NEG_Y);
        assert!(facing.x > grazing.x);
        assert_eq!(behind, Vec3::ZERO);
    }

    #[test]
    fn unproject_inverts_projection() {
        let proj = Mat4::perspective_rh(1.0, 1.5, 0.1, 50.0);
        let point = Vec3::new(0.3, -0.2, -4.0);
        let ndc = proj.project_point3(point);
        let back = unproject(proj.inverse(), ndc_to_uv(ndc.truncate()), ndc.z);
        assert!(back.abs_diff_eq(point, 1e-3));
    }
}
