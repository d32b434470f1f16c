use std::f32::consts::PI;
use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::gpu::{BufferHandle, Handle};
use crate::scene::{Aabb, Material};

pub type MeshHandle = Handle<Mesh>;
pub type MaterialHandle = Handle<Material>;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Vertex {
    Vertex { pos, normal, uv }
}

/// GPU-resident indexed triangle list.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub bounds: Aabb,
}

impl Mesh {
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

pub fn bounds_of(vertices: &[Vertex]) -> Aabb {
    Aabb::from_points(vertices.iter().map(|vertex| Vec3::from_array(vertex.pos)))
        .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
}

/// Unit cube centered on the origin, counter-clockwise seen from outside.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // normal, u axis, v axis
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    for (normal, u_axis, v_axis) in faces {
        let n = Vec3::from_array(normal);
        let u = Vec3::from_array(u_axis);
        let w = Vec3::from_array(v_axis);
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let pos = (n + u * su + w * sv) * 0.5;
            vertices.push(v(pos.to_array(), normal, [su * 0.5 + 0.5, 0.5 - sv * 0.5]));
        }
    }

    let indices = (0..6u32)
        .flat_map(|f| {
            let o = f * 4;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect();

    (vertices, indices)
}

/// Plane in XZ facing +Y, centered on the origin.
pub fn plane_mesh(width: f32, depth: f32) -> (Vec<Vertex>, Vec<u32>) {
    let (hw, hd) = (width * 0.5, depth * 0.5);
    let up = [0.0, 1.0, 0.0];
    let vertices = vec![
        v([-hw, 0.0, -hd], up, [0.0, 0.0]),
        v([-hw, 0.0, hd], up, [0.0, 1.0]),
        v([hw, 0.0, hd], up, [1.0, 1.0]),
        v([hw, 0.0, -hd], up, [1.0, 0.0]),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Unit-radius UV sphere.
pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let (ring_radius, y) = phi.sin_cos();
        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let p = [ring_radius * theta.cos(), y, ring_radius * theta.sin()];
            vertices.push(v(
                p,
                p,
                [segment as f32 / segments as f32, ring as f32 / rings as f32],
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, current + 1, next, current + 1, next + 1, next]);
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_winding(vertices: &[Vertex], indices: &[u32]) {
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| vertices[i as usize]);
            let pa = Vec3::from_array(a.pos);
            let face = (Vec3::from_array(b.pos) - pa).cross(Vec3::from_array(c.pos) - pa);
            if face.length_squared() < 1e-12 {
                continue;
            }
            let normal = Vec3::from_array(a.normal) + Vec3::from_array(b.normal) + Vec3::from_array(c.normal);
            assert!(face.dot(normal) > 0.0, "triangle {tri:?} winds inwards");
        }
    }

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            Vertex::layout().array_stride,
            std::mem::size_of::<Vertex>() as wgpu::BufferAddress
        );
    }

    #[test]
    fn cube_counts_and_winding() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
        assert_outward_winding(&v, &i);
        let bounds = bounds_of(&v);
        assert_eq!(bounds.min, Vec3::splat(-0.5));
        assert_eq!(bounds.max, Vec3::splat(0.5));
    }

    #[test]
    fn plane_and_sphere_wind_outwards() {
        let (v, i) = plane_mesh(4.0, 2.0);
        assert_outward_winding(&v, &i);
        let (v, i) = sphere_mesh(16, 8);
        assert_outward_winding(&v, &i);
    }
}
