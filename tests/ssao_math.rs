//! Screen-space depth/position math shared by the SSAO, lighting and depth
//! debug programs.
//!
//! Conventions:
//! - Right-handed view space (camera looks down -Z).
//! - Clip/NDC depth range is [0, 1] (wgpu/D3D). Near -> 0, Far -> 1.
//! - Fullscreen UVs have origin at top-left (v = 0 at top, v = 1 at bottom).
//!
use glam::{Mat4, Vec2, Vec3, Vec4};
use wgpu_deferred::renderer::constants::{FrameConstants, SsaoConstants};
use wgpu_deferred::renderer::ssao::{generate_kernel, generate_noise, NOISE_SIZE};
use wgpu_deferred::scene::Camera;

fn ndc_xy_to_uv(ndc_xy: Vec2) -> Vec2 {
    Vec2::new(ndc_xy.x * 0.5 + 0.5, 0.5 - ndc_xy.y * 0.5)
}

fn project_view_to_uv_depth(proj: Mat4, view_pos: Vec3) -> (Vec2, f32) {
    let clip: Vec4 = proj * view_pos.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    (ndc_xy_to_uv(ndc.truncate()), ndc.z)
}

fn reconstruct_view_position(uv: Vec2, depth: f32, proj_inv: Mat4) -> Vec3 {
    let ndc = Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth);
    let view = proj_inv * ndc.extend(1.0);
    view.truncate() / view.w
}

fn camera(near: f32, far: f32) -> Camera {
    let mut camera = Camera::new(60f32.to_radians(), 16.0 / 9.0, near, far);
    camera.look_at(Vec3::new(2.0, 3.0, 6.0), Vec3::ZERO, Vec3::Y);
    camera
}

#[test]
fn camera_projection_maps_near_far_to_wgpu_depth_range() {
    let constants = FrameConstants::new(&camera(0.1, 100.0), 1280, 720);

    let (_, depth_near) = project_view_to_uv_depth(constants.proj(), Vec3::new(0.0, 0.0, -0.1));
    let (_, depth_far) = project_view_to_uv_depth(constants.proj(), Vec3::new(0.0, 0.0, -100.0));

    assert!(depth_near.abs() < 1e-5, "near -> depth {depth_near}");
    assert!((depth_far - 1.0).abs() < 1e-5, "far -> depth {depth_far}");
}

#[test]
fn view_positions_reconstruct_from_depth_through_inverse_projection() {
    let constants = FrameConstants::new(&camera(0.1, 50.0), 1280, 720);

    let points = [
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.2, -0.1, -2.5),
        Vec3::new(1.0, 0.5, -3.0),
        Vec3::new(-0.75, 0.25, -5.0),
    ];

    for &p_view in &points {
        let (uv, depth) = project_view_to_uv_depth(constants.proj(), p_view);
        assert!(depth > 0.0 && depth < 1.0, "depth {depth} for {p_view:?}");

        let recon = reconstruct_view_position(uv, depth, constants.inv_proj());
        assert!(
            recon.abs_diff_eq(p_view, 1e-4),
            "orig={p_view:?}, recon={recon:?}, uv={uv:?}, depth={depth}"
        );
    }
}

#[test]
fn world_positions_reconstruct_through_inverse_view_projection() {
    let camera = camera(0.1, 50.0);
    let constants = FrameConstants::new(&camera, 640, 480);
    let world = Vec3::new(0.5, 0.25, -0.5);

    let clip = constants.view_proj() * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    let recon = constants.inv_view_proj().project_point3(ndc);

    assert!(recon.abs_diff_eq(world, 1e-4), "{recon:?}");
    assert!(constants.camera_position().abs_diff_eq(camera.position(), 1e-6));
}

#[test]
fn ssao_block_carries_kernel_and_noise_tiling() {
    let kernel = generate_kernel(16);
    let scale = Vec2::new(1280.0, 720.0) / NOISE_SIZE as f32;
    let constants = SsaoConstants::new(&kernel, 0.5, 0.025, 1.0, scale);

    assert_eq!(constants.counts[0], 16);
    assert_eq!(constants.kernel[0], kernel[0].to_array());
    assert_eq!(constants.kernel[16], [0.0; 4]);
    assert_eq!(constants.params, [0.5, 0.025, 1.0, 0.0]);
    assert_eq!(constants.noise_scale[..2], [320.0, 180.0]);
}

#[test]
fn kernel_grows_outwards_and_noise_rotates_around_z() {
    let kernel = generate_kernel(64);
    let inner: f32 = kernel[..8].iter().map(|s| s.truncate().length()).sum::<f32>() / 8.0;
    let outer: f32 = kernel[56..].iter().map(|s| s.truncate().length()).sum::<f32>() / 8.0;
    assert!(inner < outer, "inner {inner} outer {outer}");

    for texel in generate_noise() {
        assert!(texel[0].abs() <= 1.0 && texel[1].abs() <= 1.0);
        assert_eq!(texel[2], 0.0);
    }
}
