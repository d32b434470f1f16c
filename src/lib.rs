pub mod error;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod time;

pub use error::{GpuError, RendererError, Result};
pub use renderer::{FramePipeline, RendererContext};
pub use settings::RenderSettings;

use env_logger::{Builder, Env, DEFAULT_FILTER_ENV};

/// Installs the `env_logger` logger at `info` unless `RUST_LOG` says
/// otherwise. Calling it twice is harmless.
pub fn init_logging() {
    let _ = logger_builder(DEFAULT_FILTER_ENV).try_init();
}

/// Logger configured from the filter variable `filter_var`, `info` when unset.
fn logger_builder(filter_var: &str) -> Builder {
    Builder::from_env(Env::new().filter_or(filter_var, "info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn filter_variable_overrides_the_info_default() {
        const VAR: &str = "WGPU_DEFERRED_TEST_LOG";

        std::env::remove_var(VAR);
        assert_eq!(logger_builder(VAR).build().filter(), LevelFilter::Info);

        std::env::set_var(VAR, "debug");
        assert_eq!(logger_builder(VAR).build().filter(), LevelFilter::Debug);
        std::env::remove_var(VAR);
    }
}
