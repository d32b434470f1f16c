//! The deferred renderer.
//!
//! [`RendererContext`] owns targets, constant buffers, pipelines and the
//! mesh/material arenas; [`FramePipeline`] turns a [`crate::scene::FrameInput`]
//! into a finished image by running its passes in a fixed order.

pub mod bloom;
pub mod cascades;
pub mod constants;
pub mod context;
pub mod draw_key;
pub mod draw_list;
pub mod frame;
pub mod mesh;
pub mod passes;
pub mod pipelines;
pub mod ssao;
pub mod stats;
pub mod targets;

pub use context::{DirtyFlags, RendererContext};
pub use draw_key::DrawKey;
pub use frame::{FramePipeline, PassDescriptor, PassId, PreparedFrame};
pub use mesh::{cube_mesh, plane_mesh, sphere_mesh, MaterialHandle, Mesh, MeshHandle, Vertex};
pub use stats::{FrameStats, PassStats};
