use glam::{Mat4, Vec3};
use wgpu_deferred::renderer::cascades::{
    compute_splits, fit_cascades, slice_corners, CascadeConfig,
};
use wgpu_deferred::renderer::constants::ShadowConstants;
use wgpu_deferred::scene::Camera;

/// Texel snapping may move the projection by up to one texel of a 1024 map.
const EPSILON: f32 = 1.0 / 1024.0 + 1e-4;

fn config(count: usize) -> CascadeConfig {
    CascadeConfig {
        count,
        lambda: 0.5,
        resolution: 1024,
        z_multiplier: 10.0,
    }
}

fn camera_at(eye: Vec3) -> Camera {
    let mut camera = Camera::new(60f32.to_radians(), 16.0 / 9.0, 0.1, 80.0);
    camera.look_at(eye, Vec3::ZERO, Vec3::Y);
    camera
}

fn project_shadow(view_proj: Mat4, world: Vec3) -> Vec3 {
    let clip = view_proj * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
}

#[test]
fn cascades_tile_the_view_range_without_gaps() {
    let camera = camera_at(Vec3::new(4.0, 6.0, 10.0));
    let cascades = fit_cascades(&camera, Vec3::new(0.3, -1.0, 0.2), &config(4));

    assert_eq!(cascades.len(), 4);
    assert_eq!(cascades[0].near, camera.near());
    assert_eq!(cascades[3].far, camera.far());
    for pair in cascades.windows(2) {
        assert_eq!(pair[0].far, pair[1].near);
        assert!(pair[0].radius <= pair[1].radius);
    }
}

#[test]
fn every_slice_corner_lands_inside_its_shadow_map() {
    let camera = camera_at(Vec3::new(-3.0, 5.0, 8.0));
    let light = Vec3::new(0.4, -1.0, 0.2).normalize();
    let cascades = fit_cascades(&camera, light, &config(3));

    for cascade in &cascades {
        for corner in slice_corners(&camera, cascade.near, cascade.far) {
            let uvz = project_shadow(cascade.view_proj, corner);
            assert!(
                (-EPSILON..=1.0 + EPSILON).contains(&uvz.x)
                    && (-EPSILON..=1.0 + EPSILON).contains(&uvz.y),
                "corner {corner:?} -> {uvz:?}"
            );
            assert!((-EPSILON..=1.0 + EPSILON).contains(&uvz.z), "depth {}", uvz.z);
        }
    }
}

#[test]
fn light_facing_points_are_closer_in_shadow_depth() {
    let camera = camera_at(Vec3::new(0.0, 4.0, 6.0));
    let cascades = fit_cascades(&camera, Vec3::NEG_Y, &config(1));
    let view_proj = cascades[0].view_proj;

    let target = camera.position() + camera.forward() * 5.0;
    let above = project_shadow(view_proj, target + Vec3::Y);
    let below = project_shadow(view_proj, target - Vec3::Y);
    assert!(above.z < below.z, "above {} below {}", above.z, below.z);
}

#[test]
fn translating_the_camera_by_whole_texels_keeps_the_snapped_grid() {
    let light = Vec3::NEG_Y;
    let a = fit_cascades(&camera_at(Vec3::new(0.0, 5.0, 5.0)), light, &config(1));
    let mut moved = camera_at(Vec3::new(0.0, 5.0, 5.0));
    moved.set_position(moved.position() + Vec3::new(0.013, 0.0, 0.0));
    let b = fit_cascades(&moved, light, &config(1));

    assert_eq!(a[0].radius, b[0].radius);
    let texel = 2.0 * a[0].radius / 1024.0;
    let origin_a = project_shadow(a[0].view_proj, Vec3::ZERO);
    let origin_b = project_shadow(b[0].view_proj, Vec3::ZERO);
    let shift = (origin_b.x - origin_a.x) * 2.0 * a[0].radius / texel;
    assert!((shift - shift.round()).abs() < 1e-2, "shift {shift} texels");
}

#[test]
fn shadow_block_packs_cascades_in_order() {
    let camera = camera_at(Vec3::new(2.0, 3.0, 4.0));
    let cascades = fit_cascades(&camera, Vec3::new(0.0, -1.0, -1.0), &config(2));
    let constants = ShadowConstants::new(&cascades, 0.001, 1.5, 2048, 16);

    assert_eq!(constants.counts[..2], [2, 16]);
    assert_eq!(constants.splits[1], camera.far());
    assert_eq!(constants.splits[2], 0.0);
    assert!(constants
        .cascade_view_proj(0)
        .abs_diff_eq(cascades[0].view_proj, 1e-6));
    assert_eq!(constants.params[2], 1.0 / 2048.0);
}

#[test]
fn splits_increase_strictly_and_end_at_far() {
    let (near, far) = (0.1, 1000.0);
    for count in 1..=4 {
        for lambda in [0.0, 0.25, 0.5, 1.0] {
            let splits = compute_splits(count, near, far, lambda);
            assert_eq!(splits.len(), count);
            assert_eq!(splits[count - 1], far, "count {count} lambda {lambda}");
            assert!(splits[0] > near, "count {count} lambda {lambda}: {splits:?}");
            assert!(
                splits.windows(2).all(|pair| pair[0] < pair[1]),
                "count {count} lambda {lambda}: {splits:?}"
            );
        }
    }
}

#[test]
fn fitting_is_bit_for_bit_repeatable() {
    let camera = camera_at(Vec3::new(3.0, 7.0, -9.0));
    let light = Vec3::new(-0.2, -1.0, 0.5).normalize();
    let first = fit_cascades(&camera, light, &config(4));
    let second = fit_cascades(&camera, light, &config(4));

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(
            a.view_proj.to_cols_array().map(f32::to_bits),
            b.view_proj.to_cols_array().map(f32::to_bits)
        );
        assert_eq!(a.near.to_bits(), b.near.to_bits());
        assert_eq!(a.far.to_bits(), b.far.to_bits());
    }
}
