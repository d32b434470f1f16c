use std::ops::AddAssign;

use super::constants::FeatureFlags;

/// Draws issued by one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub draw_calls: u32,
    pub triangles: u64,
}

impl PassStats {
    pub fn fullscreen(draws: u32) -> Self {
        Self {
            draw_calls: draws,
            triangles: u64::from(draws),
        }
    }
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draw_calls += rhs.draw_calls;
        self.triangles += rhs.triangles;
    }
}

/// Counters for the last rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub draw_calls: u32,
    pub triangles: u64,
    /// Distinct materials drawn by the camera passes.
    pub materials: u32,
    pub opaque_objects: u32,
    pub transparent_objects: u32,
    pub shadow_casters: u32,
    pub cascades: u32,
    pub passes_run: u32,
    pub features: FeatureFlags,
}

impl FrameStats {
    pub fn add_pass(&mut self, pass: PassStats) {
        self.draw_calls += pass.draw_calls;
        self.triangles += pass.triangles;
        self.passes_run += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_accumulate_into_frame_totals() {
        let mut stats = FrameStats::default();
        let mut geometry = PassStats {
            draw_calls: 2,
            triangles: 24,
        };
        geometry += PassStats {
            draw_calls: 1,
            triangles: 12,
        };
        stats.add_pass(geometry);
        stats.add_pass(PassStats::fullscreen(1));

        assert_eq!(stats.draw_calls, 4);
        assert_eq!(stats.triangles, 37);
        assert_eq!(stats.passes_run, 2);
        assert!(stats.features.is_empty());
    }
}
