//! GPU resource abstraction.
//!
//! The renderer talks to the GPU only through [`ResourceManager`], which owns
//! every texture, buffer, sampler and pipeline behind generational handles
//! and forwards recorded passes to a [`Backend`].

mod backend;
mod handle;
mod resources;
pub mod software;
mod types;
pub mod wgpu_backend;

pub use backend::{
    Backend, Binding, ColorAttachment, Command, DepthAttachment, PassExecution, PassRecording,
    ResolvedBinding, ResolvedColor, ResolvedCommand, ResolvedDepth, ResolvedTexture,
};
pub use handle::{Arena, Handle};
pub use resources::{ResourceCounts, ResourceManager};
pub use software::SoftwareBackend;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
