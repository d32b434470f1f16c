//! Per-frame draw lists: culling, sort keys and instance batching.
//!
//! Each list is sorted by [`DrawKey`] and then split into batches: runs of
//! consecutive items that share pipeline, mesh and material become one
//! instanced draw. Object constants are laid out in the same sorted order,
//! opaque list first, then transparent, then shadow casters, so a batch is
//! a contiguous instance range of the per-object storage buffer.

use std::ops::Range;

use glam::Vec3;

use super::cascades::slice_corners;
use super::constants::ObjectConstants;
use super::draw_key::{quantize_depth, DrawKey};
use super::mesh::{MaterialHandle, Mesh, MeshHandle};
use super::pipelines::PipelineId;
use crate::gpu::Arena;
use crate::scene::{Aabb, Camera, Drawable, FrameInput, Material};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawListKind {
    Opaque,
    Transparent,
    Shadow,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub key: DrawKey,
    pub pipeline: PipelineId,
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub object: ObjectConstants,
}

/// One instanced draw over a contiguous range of object constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub pipeline: PipelineId,
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub instances: Range<u32>,
}

impl Batch {
    pub fn instance_count(&self) -> u32 {
        self.instances.end - self.instances.start
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawList {
    pub kind: DrawListKind,
    pub items: Vec<DrawItem>,
    pub batches: Vec<Batch>,
}

impl DrawList {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Sphere around the shadowed part of the view frustum plus the light
/// direction, used to decide which drawables can cast into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowBound {
    pub center: Vec3,
    pub radius: f32,
    /// Direction the light travels.
    pub direction: Vec3,
}

impl ShadowBound {
    /// Bounds the camera slice `[near, far]`.
    pub fn new(camera: &Camera, far: f32, direction: Vec3) -> Self {
        let corners = slice_corners(camera, camera.near(), far);
        let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
        let radius = corners
            .iter()
            .map(|corner| corner.distance(center))
            .fold(0.0, f32::max);
        Self {
            center,
            radius,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Whether the shadow volume swept from `bounds` along the light reaches
    /// the sphere.
    pub fn may_cast(&self, bounds: &Aabb) -> bool {
        let origin = bounds.center();
        let reach = self.radius + bounds.extent().length();
        let t = (self.center - origin).dot(self.direction).max(0.0);
        let closest = origin + self.direction * t;
        closest.distance_squared(self.center) <= reach * reach
    }
}

/// The three sorted lists of a frame and the object constants they index.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDrawLists {
    pub opaque: DrawList,
    pub transparent: DrawList,
    pub shadow: DrawList,
    pub objects: Vec<ObjectConstants>,
}

impl FrameDrawLists {
    /// Culls, keys, sorts and batches the frame's drawables.
    ///
    /// `shadow` is `None` when no cascade is rendered this frame.
    ///
    /// # Panics
    ///
    /// If a drawable references a material or mesh that no longer exists,
    /// or a material index exceeds the draw-key budget.
    pub fn build(
        input: &FrameInput<'_>,
        meshes: &Arena<Mesh>,
        materials: &Arena<Material>,
        shadow: Option<&ShadowBound>,
    ) -> Self {
        let camera = input.camera;
        let frustum = camera.frustum();

        let opaque = collect(
            DrawListKind::Opaque,
            input
                .opaque
                .iter()
                .filter(|d| frustum.intersects_aabb(&d.world_bounds())),
            camera,
            meshes,
            materials,
        );
        let transparent = collect(
            DrawListKind::Transparent,
            input
                .transparent
                .iter()
                .filter(|d| frustum.intersects_aabb(&d.world_bounds())),
            camera,
            meshes,
            materials,
        );
        let shadow = match shadow {
            Some(bound) => collect(
                DrawListKind::Shadow,
                input
                    .shadow_casters
                    .iter()
                    .filter(|d| bound.may_cast(&d.world_bounds())),
                camera,
                meshes,
                materials,
            ),
            None => Vec::new(),
        };

        let mut objects = Vec::with_capacity(opaque.len() + transparent.len() + shadow.len());
        let opaque = finish(DrawListKind::Opaque, opaque, &mut objects);
        let transparent = finish(DrawListKind::Transparent, transparent, &mut objects);
        let shadow = finish(DrawListKind::Shadow, shadow, &mut objects);

        Self {
            opaque,
            transparent,
            shadow,
            objects,
        }
    }

    /// Number of distinct materials drawn by the camera lists.
    pub fn material_count(&self) -> usize {
        let mut materials: Vec<MaterialHandle> = self
            .opaque
            .items
            .iter()
            .chain(&self.transparent.items)
            .map(|item| item.material)
            .collect();
        materials.sort_by_key(|handle| (handle.index(), handle.generation()));
        materials.dedup();
        materials.len()
    }
}

fn collect<'a>(
    kind: DrawListKind,
    drawables: impl Iterator<Item = &'a Drawable>,
    camera: &Camera,
    meshes: &Arena<Mesh>,
    materials: &Arena<Material>,
) -> Vec<DrawItem> {
    drawables
        .map(|drawable| {
            assert!(
                meshes.contains(drawable.mesh),
                "drawable references a released mesh {:?}",
                drawable.mesh
            );
            let material = materials.get(drawable.material).unwrap_or_else(|| {
                panic!(
                    "drawable references a released material {:?}",
                    drawable.material
                )
            });

            let pipeline = match kind {
                DrawListKind::Opaque => PipelineId::geometry(false, material.is_double_sided()),
                DrawListKind::Transparent => {
                    PipelineId::geometry(true, material.is_double_sided())
                }
                DrawListKind::Shadow => PipelineId::ShadowDepth,
            };
            // The shadow pass only switches meshes, so the mesh takes the
            // material field of its key.
            let state_id = match kind {
                DrawListKind::Shadow => drawable.mesh.index(),
                _ => drawable.material.index(),
            };
            let distance = camera.view_depth(drawable.world_bounds().center());
            let key = DrawKey::new(
                kind == DrawListKind::Transparent,
                pipeline.program_id(),
                state_id,
                quantize_depth(distance, camera.near(), camera.far()),
            );

            DrawItem {
                key,
                pipeline,
                mesh: drawable.mesh,
                material: drawable.material,
                object: ObjectConstants::new(drawable.world_matrix(), material),
            }
        })
        .collect()
}

fn finish(
    kind: DrawListKind,
    mut items: Vec<DrawItem>,
    objects: &mut Vec<ObjectConstants>,
) -> DrawList {
    items.sort_by_key(|item| item.key);

    let mut batches: Vec<Batch> = Vec::new();
    for item in &items {
        let index = objects.len() as u32;
        objects.push(item.object);

        let joins = batches.last().is_some_and(|batch| {
            batch.pipeline == item.pipeline
                && batch.mesh == item.mesh
                && (kind == DrawListKind::Shadow || batch.material == item.material)
        });
        match batches.last_mut() {
            Some(batch) if joins => batch.instances.end = index + 1,
            _ => batches.push(Batch {
                pipeline: item.pipeline,
                mesh: item.mesh,
                material: item.material,
                instances: index..index + 1,
            }),
        }
    }

    DrawList {
        kind,
        items,
        batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::markers;
    use crate::scene::{Light, Transform};
    use glam::Quat;

    struct Fixture {
        camera: Camera,
        meshes: Arena<Mesh>,
        materials: Arena<Material>,
        cube: MeshHandle,
        grey: MaterialHandle,
        red: MaterialHandle,
    }

    fn fixture() -> Fixture {
        let mut camera = Camera::new(60f32.to_radians(), 1.0, 0.1, 100.0);
        camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);

        let mut buffers: Arena<(), markers::Buffer> = Arena::new();
        let mut meshes = Arena::new();
        let cube = meshes.insert(Mesh {
            vertex_buffer: buffers.insert(()),
            index_buffer: buffers.insert(()),
            index_count: 36,
            bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
        });
        let mut materials = Arena::new();
        let grey = materials.insert(Material::grey(0.5));
        let red = materials.insert(Material::new(Vec3::X).with_opacity(0.5));

        Fixture {
            camera,
            meshes,
            materials,
            cube,
            grey,
            red,
        }
    }

    fn at(f: &Fixture, material: MaterialHandle, position: Vec3) -> Drawable {
        Drawable::new(f.cube, material, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)))
            .with_transform(Transform::from_trs(position, Quat::IDENTITY, Vec3::ONE))
    }

    #[test]
    fn opaque_items_share_a_batch_and_transparent_sort_back_to_front() {
        let f = fixture();
        let opaque = [
            at(&f, f.grey, Vec3::new(1.0, 0.0, 0.0)),
            at(&f, f.grey, Vec3::new(-1.0, 0.0, -2.0)),
        ];
        let transparent = [
            at(&f, f.red, Vec3::new(0.0, 0.0, 2.0)),
            at(&f, f.red, Vec3::new(0.0, 0.0, -3.0)),
        ];
        let lights = [Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0)];
        let input = FrameInput {
            camera: &f.camera,
            lights: &lights,
            opaque: &opaque,
            transparent: &transparent,
            shadow_casters: &opaque,
        };

        let lists = FrameDrawLists::build(&input, &f.meshes, &f.materials, None);
        assert_eq!(lists.opaque.batches.len(), 1);
        assert_eq!(lists.opaque.batches[0].instances, 0..2);
        assert!(lists.shadow.is_empty());
        assert_eq!(lists.objects.len(), 4);

        let depths: Vec<u32> = lists
            .transparent
            .items
            .iter()
            .map(|item| item.key.depth_id())
            .collect();
        assert!(depths[0] > depths[1], "farthest transparent item first");
        assert_eq!(lists.transparent.batches[0].instances.start, 2);
        assert_eq!(lists.material_count(), 2);
    }

    #[test]
    fn objects_outside_the_frustum_are_culled() {
        let f = fixture();
        let opaque = [
            at(&f, f.grey, Vec3::ZERO),
            at(&f, f.grey, Vec3::new(0.0, 0.0, 20.0)),
        ];
        let input = FrameInput::opaque_only(&f.camera, &[], &opaque);
        let lists = FrameDrawLists::build(&input, &f.meshes, &f.materials, None);
        assert_eq!(lists.opaque.len(), 1);
    }

    #[test]
    fn shadow_casters_behind_the_camera_still_cast_into_view() {
        let f = fixture();
        let bound = ShadowBound::new(&f.camera, 20.0, Vec3::new(0.0, 0.0, -1.0));

        // Behind the camera, but its shadow travels into the frustum.
        let behind = Aabb::from_center_extent(Vec3::new(0.0, 0.0, 30.0), Vec3::splat(0.5));
        assert!(bound.may_cast(&behind));

        // Far to the side with the light pointing away from the view.
        let aside = Aabb::from_center_extent(Vec3::new(500.0, 0.0, 0.0), Vec3::splat(0.5));
        assert!(!bound.may_cast(&aside));
    }

    #[test]
    fn shadow_list_batches_by_mesh_only() {
        let f = fixture();
        let casters = [
            at(&f, f.grey, Vec3::ZERO),
            at(&f, f.red, Vec3::new(1.0, 0.0, 0.0)),
        ];
        let input = FrameInput {
            camera: &f.camera,
            lights: &[],
            opaque: &[],
            transparent: &[],
            shadow_casters: &casters,
        };
        let bound = ShadowBound::new(&f.camera, 100.0, Vec3::NEG_Y);
        let lists = FrameDrawLists::build(&input, &f.meshes, &f.materials, Some(&bound));
        assert_eq!(lists.shadow.len(), 2);
        assert_eq!(lists.shadow.batches.len(), 1);
        assert!(lists
            .shadow
            .items
            .iter()
            .all(|item| item.pipeline == PipelineId::ShadowDepth));
    }
}
