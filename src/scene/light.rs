use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Light {
    Directional {
        /// Direction the light travels in (towards the lit surface).
        direction: Vec3,
        color: Vec3,
        intensity: f32,
    },
    Point {
        position: Vec3,
        radius: f32,
        color: Vec3,
        intensity: f32,
    },
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Light::Directional {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }

    pub fn point(position: Vec3, radius: f32, color: Vec3, intensity: f32) -> Self {
        Light::Point {
            position,
            radius,
            color,
            intensity,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self, Light::Directional { .. })
    }
}

/// The one directional light that drives shadows and sun lighting: the first
/// in the list. Returns its index so callers can report the ones ignored.
pub fn primary_directional(lights: &[Light]) -> Option<(usize, Vec3, Vec3, f32)> {
    lights.iter().enumerate().find_map(|(index, light)| match *light {
        Light::Directional {
            direction,
            color,
            intensity,
        } => Some((index, direction, color, intensity)),
        Light::Point { .. } => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_directional_light_wins() {
        let lights = [
            Light::point(Vec3::ONE, 2.0, Vec3::ONE, 1.0),
            Light::directional(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE, 1.0),
            Light::directional(Vec3::X, Vec3::new(1.0, 0.0, 0.0), 5.0),
        ];
        let (index, direction, _, intensity) = primary_directional(&lights).unwrap();
        assert_eq!(index, 1);
        assert!(direction.abs_diff_eq(Vec3::NEG_Y, 1e-6));
        assert_eq!(intensity, 1.0);
    }

    #[test]
    fn no_directional_light_yields_none() {
        let lights = [Light::point(Vec3::ZERO, 1.0, Vec3::ONE, 1.0)];
        assert!(primary_directional(&lights).is_none());
    }
}
