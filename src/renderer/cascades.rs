//! Cascaded shadow-map fitting.
//!
//! Pure math, no GPU access: split the camera depth range, then fit a
//! texel-snapped orthographic light projection around each slice.

use glam::{Mat4, Vec3, Vec4};

use crate::scene::Camera;

pub const MAX_CASCADES: usize = 4;

/// Bounding-sphere radii are rounded up to this step so the projection size
/// only changes in discrete jumps.
const RADIUS_QUANTUM: f32 = 1.0 / 16.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeConfig {
    pub count: usize,
    /// 0 = logarithmic splits, 1 = uniform splits.
    pub lambda: f32,
    /// Shadow map edge length in texels.
    pub resolution: u32,
    /// Depth range of the light projection as a multiple of the slice radius.
    pub z_multiplier: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cascade {
    pub near: f32,
    pub far: f32,
    pub radius: f32,
    pub view_proj: Mat4,
}

/// Far distance of every cascade: `d_i = log_i + (uniform_i - log_i) * lambda`.
///
/// The last split is exactly `far`.
///
/// # Panics
///
/// If `count` is zero.
#[must_use]
pub fn compute_splits(count: usize, near: f32, far: f32, lambda: f32) -> Vec<f32> {
    assert!(count >= 1, "at least one shadow cascade is required");

    let mut splits: Vec<f32> = (1..=count)
        .map(|i| {
            let p = i as f32 / count as f32;
            let log_split = near * (far / near).powf(p);
            let uniform_split = near + (far - near) * p;
            log_split + (uniform_split - log_split) * lambda
        })
        .collect();
    splits[count - 1] = far;
    splits
}

/// World-space corners of the view frustum between `near` and `far`,
/// reconstructed through the inverse view-projection of that sub-range.
#[must_use]
pub fn slice_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
    let projection = Mat4::perspective_rh(camera.fov_y(), camera.aspect(), near, far);
    let inverse = (projection * camera.view()).inverse();

    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for z in [0.0, 1.0] {
        for y in [-1.0, 1.0] {
            for x in [-1.0, 1.0] {
                corners[i] = inverse.project_point3(Vec3::new(x, y, z));
                i += 1;
            }
        }
    }
    corners
}

/// Orthographic light view-projection that encloses `corners`.
///
/// The enclosing sphere keeps the projection size independent of camera
/// rotation; the origin is then snapped to whole shadow texels so moving
/// the camera does not make shadow edges crawl.
#[must_use]
pub fn fit_light_projection(
    corners: &[Vec3; 8],
    light_direction: Vec3,
    resolution: u32,
    z_multiplier: f32,
) -> (Mat4, f32) {
    let direction = light_direction.try_normalize().unwrap_or(Vec3::NEG_Y);

    let centroid = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(centroid))
        .fold(0.0f32, f32::max);
    let radius = ((radius / RADIUS_QUANTUM).ceil() * RADIUS_QUANTUM).max(RADIUS_QUANTUM);

    let up = if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(centroid, centroid + direction, up);
    let depth = radius * z_multiplier.max(1.0);
    let mut projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, -depth, depth);

    let half_resolution = resolution as f32 * 0.5;
    let origin = (projection * view) * Vec4::W;
    let texel = origin.truncate().truncate() * half_resolution;
    let offset = (texel.round() - texel) / half_resolution;
    projection.w_axis.x += offset.x;
    projection.w_axis.y += offset.y;

    (projection * view, radius)
}

/// Fits one cascade per split, in ascending split order.
///
/// # Panics
///
/// If `config.count` is zero.
#[must_use]
pub fn fit_cascades(camera: &Camera, light_direction: Vec3, config: &CascadeConfig) -> Vec<Cascade> {
    let splits = compute_splits(config.count, camera.near(), camera.far(), config.lambda);

    let mut near = camera.near();
    splits
        .into_iter()
        .map(|far| {
            let corners = slice_corners(camera, near, far);
            let (view_proj, radius) = fit_light_projection(
                &corners,
                light_direction,
                config.resolution,
                config.z_multiplier,
            );
            let cascade = Cascade {
                near,
                far,
                radius,
                view_proj,
            };
            near = far;
            cascade
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lambda_one_gives_uniform_splits() {
        let splits = compute_splits(4, 1.0, 101.0, 1.0);
        let expected = [26.0, 51.0, 76.0, 101.0];
        for (s, e) in splits.iter().zip(expected) {
            assert!((s - e).abs() < 1e-3, "{splits:?}");
        }
    }

    #[test]
    fn lambda_zero_gives_logarithmic_splits() {
        let splits = compute_splits(4, 0.1, 1000.0, 0.0);
        let expected = [1.0, 10.0, 100.0, 1000.0];
        for (s, e) in splits.iter().zip(expected) {
            assert!((s - e).abs() / e < 1e-4, "{splits:?}");
        }
    }

    #[test]
    #[should_panic(expected = "at least one shadow cascade")]
    fn zero_cascades_panics() {
        let _ = compute_splits(0, 0.1, 10.0, 0.5);
    }

    #[test]
    fn slice_corners_sit_on_slice_planes() {
        let mut camera = Camera::new(60f32.to_radians(), 1.5, 0.1, 100.0);
        camera.look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y);
        let corners = slice_corners(&camera, 2.0, 8.0);
        for (i, corner) in corners.iter().enumerate() {
            let expected = if i < 4 { 2.0 } else { 8.0 };
            assert!((camera.view_depth(*corner) - expected).abs() < 1e-3);
        }
    }
}
