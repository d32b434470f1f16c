//! Triangle setup and scan conversion for the software backend.
//!
//! Conventions follow wgpu: clip-space depth is `[0, w]`, NDC `+y` is up,
//! framebuffer `y` grows downwards, counter-clockwise triangles face front.

use std::ops::{Add, Mul};

use glam::{Vec2, Vec3, Vec4};

use crate::gpu::types::CullMode;

/// Per-vertex outputs interpolated across a triangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(super) struct Varyings {
    pub world: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Add for Varyings {
    type Output = Varyings;

    fn add(self, rhs: Varyings) -> Varyings {
        Varyings {
            world: self.world + rhs.world,
            normal: self.normal + rhs.normal,
            uv: self.uv + rhs.uv,
        }
    }
}

impl Mul<f32> for Varyings {
    type Output = Varyings;

    fn mul(self, rhs: f32) -> Varyings {
        Varyings {
            world: self.world * rhs,
            normal: self.normal * rhs,
            uv: self.uv * rhs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct ClipVertex {
    pub clip: Vec4,
    pub varyings: Varyings,
}

impl ClipVertex {
    fn lerp(self, other: ClipVertex, t: f32) -> ClipVertex {
        ClipVertex {
            clip: self.clip.lerp(other.clip, t),
            varyings: self.varyings * (1.0 - t) + other.varyings * t,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    /// Largest screen-space depth derivative, for slope-scaled bias.
    pub slope: f32,
    pub front_facing: bool,
    pub varyings: Varyings,
}

/// Clips a triangle against the near plane (`z >= 0`), returning zero, one
/// or two triangles.
pub(super) fn clip_near(triangle: [ClipVertex; 3]) -> Vec<[ClipVertex; 3]> {
    let inside = triangle.map(|v| v.clip.z >= 0.0);
    if inside.iter().all(|&i| i) {
        return vec![triangle];
    }
    if !inside.iter().any(|&i| i) {
        return Vec::new();
    }

    let mut polygon = Vec::with_capacity(4);
    for i in 0..3 {
        let current = triangle[i];
        let next = triangle[(i + 1) % 3];
        let (a, b) = (current.clip.z, next.clip.z);
        if a >= 0.0 {
            polygon.push(current);
        }
        if (a >= 0.0) != (b >= 0.0) {
            polygon.push(current.lerp(next, a / (a - b)));
        }
    }

    (1..polygon.len() - 1)
        .map(|i| [polygon[0], polygon[i], polygon[i + 1]])
        .collect()
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Scan-converts one near-clipped triangle, calling `emit` for every covered
/// pixel center whose depth lies in `[0, 1]`.
pub(super) fn rasterize(
    triangle: &[ClipVertex; 3],
    width: u32,
    height: u32,
    cull: CullMode,
    mut emit: impl FnMut(Fragment),
) {
    let inv_w = triangle.map(|v| 1.0 / v.clip.w);
    let ndc = [0, 1, 2].map(|i| triangle[i].clip.truncate() * inv_w[i]);

    let ndc_area = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
        - (ndc[2].x - ndc[0].x) * (ndc[1].y - ndc[0].y);
    if ndc_area == 0.0 || !ndc_area.is_finite() {
        return;
    }
    let front_facing = ndc_area > 0.0;
    if cull == CullMode::Back && !front_facing {
        return;
    }

    let (w, h) = (width as f32, height as f32);
    let screen = ndc.map(|p| Vec2::new((p.x * 0.5 + 0.5) * w, (0.5 - p.y * 0.5) * h));
    let depth = ndc.map(|p| p.z);

    let area = edge(screen[0], screen[1], screen[2]);
    let sign = area.signum();
    let area = area.abs();

    // Depth plane derivatives for slope-scaled bias.
    let (d1, d2) = (screen[1] - screen[0], screen[2] - screen[0]);
    let (z1, z2) = (depth[1] - depth[0], depth[2] - depth[0]);
    let det = d1.x * d2.y - d2.x * d1.y;
    let slope = if det != 0.0 {
        let dzdx = (z1 * d2.y - z2 * d1.y) / det;
        let dzdy = (z2 * d1.x - z1 * d2.x) / det;
        dzdx.abs().max(dzdy.abs())
    } else {
        0.0
    };

    let min = screen[0].min(screen[1]).min(screen[2]);
    let max = screen[0].max(screen[1]).max(screen[2]);
    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = (max.x.ceil().min(w) as u32).min(width);
    let y1 = (max.y.ceil().min(h) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let b0 = edge(screen[1], screen[2], p) * sign;
            let b1 = edge(screen[2], screen[0], p) * sign;
            let b2 = edge(screen[0], screen[1], p) * sign;
            if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                continue;
            }
            let (l0, l1, l2) = (b0 / area, b1 / area, b2 / area);

            let z = l0 * depth[0] + l1 * depth[1] + l2 * depth[2];
            if !(0.0..=1.0).contains(&z) {
                continue;
            }

            let q = [l0 * inv_w[0], l1 * inv_w[1], l2 * inv_w[2]];
            let norm = 1.0 / (q[0] + q[1] + q[2]);
            let varyings = triangle[0].varyings * (q[0] * norm)
                + triangle[1].varyings * (q[1] * norm)
                + triangle[2].varyings * (q[2] * norm);

            emit(Fragment {
                x,
                y,
                depth: z,
                slope,
                front_facing,
                varyings,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex {
            clip: Vec4::new(x, y, z, w),
            varyings: Varyings::default(),
        }
    }

    fn covered(triangle: [ClipVertex; 3], cull: CullMode) -> usize {
        let mut count = 0;
        rasterize(&triangle, 8, 8, cull, |_| count += 1);
        count
    }

    #[test]
    fn fullscreen_quad_half_covers_half_the_pixels() {
        let ccw = [
            vertex(-1.0, -1.0, 0.5, 1.0),
            vertex(1.0, -1.0, 0.5, 1.0),
            vertex(1.0, 1.0, 0.5, 1.0),
        ];
        let n = covered(ccw, CullMode::Back);
        assert!((28..=36).contains(&n), "covered {n}");
    }

    #[test]
    fn back_faces_are_culled_only_when_requested() {
        let cw = [
            vertex(-1.0, -1.0, 0.5, 1.0),
            vertex(1.0, 1.0, 0.5, 1.0),
            vertex(1.0, -1.0, 0.5, 1.0),
        ];
        assert_eq!(covered(cw, CullMode::Back), 0);
        assert!(covered(cw, CullMode::None) > 0);
    }

    #[test]
    fn near_clipping_splits_crossing_triangles() {
        let crossing = [
            vertex(0.0, 0.0, -1.0, 1.0),
            vertex(1.0, 0.0, 1.0, 1.0),
            vertex(0.0, 1.0, 1.0, 1.0),
        ];
        let pieces = clip_near(crossing);
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            assert!(piece.iter().all(|v| v.clip.z >= -1e-6));
        }

        let behind = [
            vertex(0.0, 0.0, -1.0, 1.0),
            vertex(1.0, 0.0, -2.0, 1.0),
            vertex(0.0, 1.0, -0.5, 1.0),
        ];
        assert!(clip_near(behind).is_empty());
    }

    #[test]
    fn interpolation_is_perspective_correct() {
        let near = vertex(-1.0, -1.0, 0.0, 1.0);
        let mut far = vertex(3.0, -3.0, 0.0, 3.0);
        far.varyings.uv = Vec2::new(1.0, 0.0);
        let top = vertex(-1.0, 1.0, 0.0, 1.0);

        let mut u = None;
        rasterize(&[near, far, top], 64, 64, CullMode::None, |f| {
            if (f.x, f.y) == (31, 63) {
                u = Some(f.varyings.uv.x);
            }
        });
        // Halfway across the bottom edge in screen space is a quarter of the
        // way in world space when the far end is three times as deep.
        let u = u.unwrap();
        assert!((u - 0.25).abs() < 0.03, "u = {u}");
    }
}
