use glam::{Mat4, Quat, Vec3, Vec4};
use wgpu_deferred::renderer::cascades::{fit_cascades, CascadeConfig};
use wgpu_deferred::renderer::constants::{CascadeConstants, ObjectConstants, ShadowConstants};
use wgpu_deferred::renderer::draw_list::ShadowBound;
use wgpu_deferred::scene::{Aabb, Camera, Material};

const EPSILON: f32 = 1e-5;

/// Vertex stage of the shadow depth program: object transform, then the
/// cascade's light view-projection.
fn shadow_vertex(object: &ObjectConstants, cascade: &CascadeConstants, pos: Vec3) -> Vec4 {
    let world = object.world() * pos.extend(1.0);
    Mat4::from_cols_array_2d(&cascade.view_proj) * world
}

/// Lookup done by shadow resolve: NDC to atlas UV with the Y flip, depth kept.
fn project_shadow(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    if clip.w <= 0.0 {
        return Vec3::splat(-1.0);
    }
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5, ndc.z)
}

fn scene_camera() -> Camera {
    let mut camera = Camera::new(45f32.to_radians(), 1.0, 0.1, 40.0);
    camera.look_at(Vec3::new(8.0, 10.0, 8.0), Vec3::ZERO, Vec3::Y);
    camera
}

fn config() -> CascadeConfig {
    CascadeConfig {
        count: 2,
        lambda: 0.5,
        resolution: 2048,
        z_multiplier: 10.0,
    }
}

#[test]
fn depth_pass_and_resolve_agree_on_shadow_coordinates() {
    let camera = scene_camera();
    let light_direction = Vec3::new(0.4, -1.0, 0.2).normalize();
    let cascades = fit_cascades(&camera, light_direction, &config());
    let shadow = ShadowConstants::new(&cascades, 0.0005, 1.0, 2048, 16);

    let model = Mat4::from_rotation_translation(Quat::from_rotation_y(0.7), Vec3::new(0.5, 0.0, -0.5));
    let object = ObjectConstants::new(model, &Material::grey(0.5));

    let positions = [
        Vec3::new(-1.5, 0.0, -1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.5, -0.5, -1.0),
    ];

    for (index, cascade) in cascades.iter().enumerate() {
        let constants = CascadeConstants::new(cascade);
        for pos in positions {
            let clip = shadow_vertex(&object, &constants, pos);
            let ndc = clip.truncate() / clip.w;
            let world = model.transform_point3(pos);
            let projected = project_shadow(shadow.cascade_view_proj(index), world);

            let expected = Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z);
            assert!(projected.abs_diff_eq(expected, EPSILON), "{projected:?} != {expected:?}");
            assert!(projected.z >= -EPSILON && projected.z <= 1.0 + EPSILON);
        }
    }
}

#[test]
fn shadow_texture_axis_is_flipped_from_clip_space() {
    let camera = scene_camera();
    let cascades = fit_cascades(&camera, Vec3::NEG_Y, &config());
    let view_proj = cascades[0].view_proj;

    // Straight-down light uses +Z as the view up vector.
    let centre = camera.position() + camera.forward() * 2.0;
    let top_world = centre + Vec3::Z * 0.5;
    let bottom_world = centre - Vec3::Z * 0.5;

    let ndc_top = view_proj.project_point3(top_world);
    let ndc_bottom = view_proj.project_point3(bottom_world);
    assert!(ndc_top.y > ndc_bottom.y);

    let tex_top = project_shadow(view_proj, top_world);
    let tex_bottom = project_shadow(view_proj, bottom_world);
    assert!(tex_top.y < tex_bottom.y);
    assert!((tex_top.z - ndc_top.z).abs() < EPSILON);
    assert!((tex_bottom.z - ndc_bottom.z).abs() < EPSILON);
}

#[test]
fn casters_upstream_of_the_light_are_kept() {
    let camera = scene_camera();
    let bound = ShadowBound::new(&camera, camera.far(), Vec3::NEG_Y);

    // Far above the view, but its shadow falls straight into it.
    let tower = Aabb::from_center_extent(bound.center + Vec3::Y * 200.0, Vec3::splat(1.0));
    assert!(bound.may_cast(&tower));

    // Below the shadowed region: the light carries its shadow away.
    let buried = Aabb::from_center_extent(
        bound.center - Vec3::Y * (bound.radius + 50.0),
        Vec3::splat(1.0),
    );
    assert!(!bound.may_cast(&buried));

    // Off to the side: the swept volume misses the sphere.
    let distant = Aabb::from_center_extent(
        bound.center + Vec3::X * (bound.radius + 20.0),
        Vec3::splat(1.0),
    );
    assert!(!bound.may_cast(&distant));
}
