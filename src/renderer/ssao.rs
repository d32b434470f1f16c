//! SSAO sample kernel and rotation noise.
//!
//! Both are generated from fixed seeds and reseeded on every call, so a
//! kernel regenerated after a sample-count change is reproducible.

use glam::{Vec3, Vec4};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const MAX_SSAO_SAMPLES: usize = 64;
pub const NOISE_SIZE: u32 = 4;

const KERNEL_SEED: u64 = 0x55A0_5EED;
const NOISE_SEED: u64 = 0x0000_A015_E5EE;

pub fn clamp_sample_count(sample_count: u32) -> usize {
    (sample_count as usize).clamp(1, MAX_SSAO_SAMPLES)
}

/// Hemisphere kernel (`z >= 0`) with samples clustered towards the origin.
///
/// Sample counts outside `1..=64` are clamped.
#[must_use]
pub fn generate_kernel(sample_count: u32) -> Vec<Vec4> {
    let count = clamp_sample_count(sample_count);
    let mut rng = SmallRng::seed_from_u64(KERNEL_SEED);

    (0..count)
        .map(|i| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(0.0..=1.0),
            )
            .normalize_or_zero();
            let sample = direction * rng.gen_range(0.0..=1.0f32);

            let t = i as f32 / count as f32;
            let scale = lerp(0.1, 1.0, t * t);
            (sample * scale).extend(0.0)
        })
        .collect()
}

/// 4x4 tile of random rotation vectors around the view-space Z axis,
/// stored as RGBA32F texels (`z = 0`, `w = 0`).
#[must_use]
pub fn generate_noise() -> Vec<[f32; 4]> {
    let mut rng = SmallRng::seed_from_u64(NOISE_SEED);
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| {
            [
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                0.0,
                0.0,
            ]
        })
        .collect()
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stays_in_unit_hemisphere() {
        for sample in generate_kernel(64) {
            assert!(sample.z >= 0.0);
            assert!(sample.truncate().length() <= 1.0 + 1e-6);
            assert_eq!(sample.w, 0.0);
        }
    }

    #[test]
    fn sample_count_is_clamped() {
        assert_eq!(generate_kernel(0).len(), 1);
        assert_eq!(generate_kernel(500).len(), MAX_SSAO_SAMPLES);
    }

    #[test]
    fn first_sample_direction_does_not_depend_on_count() {
        let a = generate_kernel(8)[0].truncate().normalize_or_zero();
        let b = generate_kernel(32)[0].truncate().normalize_or_zero();
        assert!(a.abs_diff_eq(b, 1e-6));
    }

    #[test]
    fn noise_is_a_flat_four_by_four_tile() {
        let noise = generate_noise();
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|texel| texel[2] == 0.0));
        assert_eq!(noise, generate_noise());
    }
}
