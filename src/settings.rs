use std::fs;
use std::path::Path;

use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::bloom::{max_chain_length, BLOOM_CHAIN_LENGTH};
use crate::renderer::cascades::MAX_CASCADES;
use crate::renderer::ssao::MAX_SSAO_SAMPLES;

/// Every tunable of the renderer, loadable from `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub shadow: ShadowSettings,
    #[serde(default)]
    pub ssao: SsaoSettings,
    #[serde(default)]
    pub bloom: BloomSettings,
    #[serde(default)]
    pub tone_mapping: ToneMappingSettings,
    #[serde(default = "RenderSettings::default_ambient")]
    pub ambient: [f32; 3],
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 3],
    #[serde(default)]
    pub debug: DebugSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            shadow: ShadowSettings::default(),
            ssao: SsaoSettings::default(),
            bloom: BloomSettings::default(),
            tone_mapping: ToneMappingSettings::default(),
            ambient: Self::default_ambient(),
            clear_color: Self::default_clear_color(),
            debug: DebugSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Reads and validates `path`; any failure falls back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    /// Strict variant of [`RenderSettings::load_from_path`] for tools that
    /// want to report a broken file instead of silently using defaults.
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings: RenderSettings = serde_json::from_str(&contents)?;
        Ok(settings.validate())
    }

    /// Replaces every out-of-range value with its default.
    pub fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }
        self.shadow = self.shadow.validate();
        self.ssao = self.ssao.validate();
        self.bloom = self.bloom.validate();
        self.tone_mapping = self.tone_mapping.validate();
        if self.debug.cascade_layer >= self.shadow.cascade_count {
            warn!(
                "Debug cascade layer {} does not exist. Using layer 0.",
                self.debug.cascade_layer
            );
            self.debug.cascade_layer = 0;
        }
        self
    }

    /// Bloom levels the current resolution can hold. The requested length
    /// stays in `bloom.chain_length`, so growing the window restores it.
    pub fn bloom_chain_length(&self) -> usize {
        let Resolution { width, height } = self.resolution;
        self.bloom
            .chain_length
            .min(max_chain_length(width, height))
    }

    pub fn ambient(&self) -> Vec3 {
        Vec3::from_array(self.ambient)
    }

    pub fn clear_color(&self) -> Vec3 {
        Vec3::from_array(self.clear_color)
    }

    const fn default_ambient() -> [f32; 3] {
        [0.03, 0.03, 0.03]
    }

    const fn default_clear_color() -> [f32; 3] {
        [0.0, 0.0, 0.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    /// Edge length of each cascade's shadow map in texels.
    pub resolution: u32,
    pub cascade_count: u32,
    /// 0 = logarithmic splits, 1 = uniform splits.
    pub lambda: f32,
    pub z_multiplier: f32,
    /// Comparison taps per shaded pixel.
    pub sample_count: u32,
    /// Distance between taps, in shadow texels.
    pub spread: f32,
    pub depth_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 2048,
            cascade_count: 4,
            lambda: 0.5,
            z_multiplier: 10.0,
            sample_count: 16,
            spread: 1.0,
            depth_bias: 0.0005,
        }
    }
}

impl ShadowSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if self.resolution == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.resolution = defaults.resolution;
        }
        if self.cascade_count == 0 || self.cascade_count as usize > MAX_CASCADES {
            warn!(
                "Cascade count {} outside 1..={}. Using default value.",
                self.cascade_count, MAX_CASCADES
            );
            self.cascade_count = defaults.cascade_count;
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            warn!("Cascade lambda {} outside [0, 1]. Clamping.", self.lambda);
            self.lambda = self.lambda.clamp(0.0, 1.0);
        }
        if !(self.z_multiplier >= 1.0) {
            warn!("Shadow z multiplier must be at least 1. Using default value.");
            self.z_multiplier = defaults.z_multiplier;
        }
        if self.sample_count == 0 {
            warn!("Shadow sample count must be greater than zero. Using 1 instead.");
            self.sample_count = 1;
        }
        if !(self.spread >= 0.0) {
            warn!("Shadow spread must not be negative. Using default value.");
            self.spread = defaults.spread;
        }
        if !(self.depth_bias >= 0.0) {
            warn!("Shadow depth bias must not be negative. Using default value.");
            self.depth_bias = defaults.depth_bias;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub radius: f32,
    pub bias: f32,
    pub sample_count: u32,
    pub intensity: f32,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            sample_count: 32,
            intensity: 1.0,
        }
    }
}

impl SsaoSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !(self.radius > 0.0) {
            warn!("SSAO radius must be positive. Using default value.");
            self.radius = defaults.radius;
        }
        if !(self.bias >= 0.0) {
            warn!("SSAO bias must not be negative. Using default value.");
            self.bias = defaults.bias;
        }
        if self.sample_count == 0 || self.sample_count as usize > MAX_SSAO_SAMPLES {
            warn!(
                "SSAO sample count {} outside 1..={}. Using default value.",
                self.sample_count, MAX_SSAO_SAMPLES
            );
            self.sample_count = defaults.sample_count;
        }
        if !(self.intensity >= 0.0) {
            warn!("SSAO intensity must not be negative. Using default value.");
            self.intensity = defaults.intensity;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub strength: f32,
    /// Upsample tap distance in uv units.
    pub filter_radius: f32,
    pub chain_length: usize,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            strength: 0.04,
            filter_radius: 0.005,
            chain_length: BLOOM_CHAIN_LENGTH,
        }
    }
}

impl BloomSettings {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !(self.threshold >= 0.0) {
            warn!("Bloom threshold must not be negative. Using default value.");
            self.threshold = defaults.threshold;
        }
        if !(self.strength >= 0.0) {
            warn!("Bloom strength must not be negative. Using default value.");
            self.strength = defaults.strength;
        }
        if !(self.filter_radius >= 0.0) {
            warn!("Bloom filter radius must not be negative. Using default value.");
            self.filter_radius = defaults.filter_radius;
        }
        if self.chain_length == 0 || self.chain_length > BLOOM_CHAIN_LENGTH {
            warn!(
                "Bloom chain length must be between 1 and {}. Using default value.",
                BLOOM_CHAIN_LENGTH
            );
            self.chain_length = defaults.chain_length;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMappingSettings {
    pub exposure: f32,
}

impl Default for ToneMappingSettings {
    fn default() -> Self {
        Self { exposure: 1.0 }
    }
}

impl ToneMappingSettings {
    fn validate(mut self) -> Self {
        if !(self.exposure > 0.0) {
            warn!("Exposure must be positive. Using 1.0 instead.");
            self.exposure = 1.0;
        }
        self
    }
}

/// Intermediate target shown instead of the tone-mapped frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugView {
    #[default]
    None,
    Albedo,
    Normals,
    Material,
    Depth,
    Ssao,
    ShadowMask,
    Bloom,
    ShadowCascade,
    Transparency,
}

impl DebugView {
    pub const ALL: [DebugView; 10] = [
        DebugView::None,
        DebugView::Albedo,
        DebugView::Normals,
        DebugView::Material,
        DebugView::Depth,
        DebugView::Ssao,
        DebugView::ShadowMask,
        DebugView::Bloom,
        DebugView::ShadowCascade,
        DebugView::Transparency,
    ];

    /// Selector value written into the debug constant block.
    pub const fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub view: DebugView,
    pub cascade_layer: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "ssao": { "radius": 2.0 } }"#).unwrap();
        assert_eq!(settings.ssao.radius, 2.0);
        assert_eq!(settings.ssao.sample_count, SsaoSettings::default().sample_count);
        assert_eq!(settings.shadow, ShadowSettings::default());
        assert_eq!(settings.debug.view, DebugView::None);
    }

    #[test]
    fn validate_replaces_out_of_range_values() {
        let mut settings = RenderSettings::default();
        settings.shadow.cascade_count = 9;
        settings.shadow.lambda = 1.5;
        settings.ssao.sample_count = 0;
        settings.tone_mapping.exposure = -1.0;
        settings.debug.cascade_layer = 7;

        let settings = settings.validate();
        assert_eq!(settings.shadow.cascade_count, 4);
        assert_eq!(settings.shadow.lambda, 1.0);
        assert_eq!(settings.ssao.sample_count, 32);
        assert_eq!(settings.tone_mapping.exposure, 1.0);
        assert_eq!(settings.debug.cascade_layer, 0);
    }

    #[test]
    fn bloom_chain_is_shortened_for_tiny_resolutions() {
        let mut settings = RenderSettings::default();
        settings.resolution = Resolution {
            width: 8,
            height: 8,
        };
        let settings = settings.validate();
        assert_eq!(settings.bloom.chain_length, BLOOM_CHAIN_LENGTH);
        assert_eq!(settings.bloom_chain_length(), 4);
    }

    #[test]
    fn out_of_range_bloom_chain_length_falls_back() {
        let mut settings = RenderSettings::default();
        settings.bloom.chain_length = 9;
        assert_eq!(settings.validate().bloom.chain_length, BLOOM_CHAIN_LENGTH);
    }

    #[test]
    fn debug_view_indices_round_trip() {
        for view in DebugView::ALL {
            assert_eq!(DebugView::from_index(view.index()), Some(view));
        }
        assert_eq!(DebugView::from_index(42), None);
        let parsed: DebugView = serde_json::from_str("\"shadow_cascade\"").unwrap();
        assert_eq!(parsed, DebugView::ShadowCascade);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(settings, RenderSettings::default());
    }
}
