use glam::{Mat3, Vec3};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |bounds, p| Self {
            min: bounds.min.min(p),
            max: bounds.max.max(p),
        }))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis.
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Center offset and extent of this box after a linear (rotation/scale) map.
    pub fn transformed_by(&self, linear: Mat3) -> (Vec3, Vec3) {
        let abs = Mat3::from_cols(
            linear.x_axis.abs(),
            linear.y_axis.abs(),
            linear.z_axis.abs(),
        );
        (linear * self.center(), abs * self.extent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotated_unit_box_grows_to_cover_diagonal() {
        let bounds = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let rotation = Mat3::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let (center, extent) = bounds.transformed_by(rotation);

        assert!(center.abs_diff_eq(Vec3::ZERO, 1e-6));
        let half_diagonal = 0.5 * std::f32::consts::SQRT_2;
        assert!(extent.abs_diff_eq(Vec3::new(half_diagonal, 0.5, half_diagonal), 1e-5));
    }

    #[test]
    fn from_points_covers_every_point() {
        let points = [
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-1.0, 3.0, 2.0),
            Vec3::new(0.5, 0.0, -4.0),
        ];
        let bounds = Aabb::from_points(points).unwrap();
        for p in points {
            assert!(bounds.contains_point(p));
        }
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, -4.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 3.0, 2.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
