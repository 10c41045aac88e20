use glam::Vec3;

/// 包围体：以 origin 为中心的 AABB（半长 extents）以及包围球
///
/// sphere_radius 取 |extents|，保证包围球同时包住 AABB
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub origin: Vec3,
    pub sphere_radius: f32,
    pub extents: Vec3,
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let extents = (max - min) / 2.0;
        Self {
            origin: (max + min) / 2.0,
            sphere_radius: extents.length(),
            extents,
        }
    }

    /// 没有任何点时返回 None
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_min_max(min, max))
    }

    /// AABB 的 8 个角点
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            *corner = self.origin + sign * self.extents;
        }
        corners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_encloses_all() {
        let points = [Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 4.0, -2.0), Vec3::new(0.5, 1.0, 0.0)];
        let bounds = Bounds::from_points(points).unwrap();
        assert_eq!(bounds.origin, Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(bounds.extents, Vec3::new(2.0, 2.0, 2.0));
        assert!((bounds.sphere_radius - 12.0_f32.sqrt()).abs() < 1e-5);

        for p in points {
            let d = (p - bounds.origin).abs();
            assert!(d.cmple(bounds.extents + 1e-5).all());
            assert!((p - bounds.origin).length() <= bounds.sphere_radius + 1e-5);
        }
    }

    #[test]
    fn test_empty_points() {
        assert!(Bounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_corners_are_distinct() {
        let bounds = Bounds::from_min_max(Vec3::ZERO, Vec3::ONE);
        let corners = bounds.corners();
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(corners.contains(&Vec3::ZERO));
        assert!(corners.contains(&Vec3::ONE));
    }
}
