//! Error types.
//!
//! [`GpuError`] covers failures reported by a backend while creating or
//! reading resources. [`RendererError`] is what the public API returns;
//! initialization failures are folded into a single [`RendererError::Init`]
//! with a readable message so the caller can decide whether to retry with a
//! different configuration.
//!
//! Contract violations (draw-key overflow, reading a target while writing it,
//! stale handles) are not represented here: they panic.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Failed to request GPU adapter: {0}")]
    AdapterRequestFailed(String),

    #[error("Failed to create GPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    #[error("Texture '{label}' could not be created: {message}")]
    TextureCreation { label: String, message: String },

    #[error("Buffer '{label}' could not be created: {message}")]
    BufferCreation { label: String, message: String },

    #[error("Sampler '{label}' could not be created: {message}")]
    SamplerCreation { label: String, message: String },

    #[error("Pipeline '{label}' failed to compile or link: {message}")]
    PipelineCreation { label: String, message: String },

    #[error("Texture readback failed: {0}")]
    Readback(String),
}

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Renderer initialization failed: {message}")]
    Init { message: String },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("Bloom chain of {levels} levels does not fit {width}x{height}")]
    InvalidBloomChain { width: u32, height: u32, levels: usize },

    #[error("Settings IO error: {0}")]
    SettingsIo(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    SettingsParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl RendererError {
    /// Wraps every failure collected during startup into one `Init` error.
    pub fn init(failures: &[String]) -> Self {
        RendererError::Init {
            message: failures.join("; "),
        }
    }
}

pub type Result<T> = std::result::Result<T, RendererError>;
