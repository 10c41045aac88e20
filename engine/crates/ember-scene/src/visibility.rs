use glam::{Mat4, Vec4};

use crate::bounds::Bounds;

/// 保守的视锥剔除
///
/// 将包围盒的 8 个角点变换到齐次裁剪空间，只要所有角点都位于某一个裁剪平面的外侧，
/// 物体就一定不可见。裁剪体积为 -w <= x <= w, -w <= y <= w, 0 <= z <= w。
/// 在齐次坐标下做平面测试，角点位于相机后方（w <= 0）时同样成立，不会出现漏画。
pub fn is_visible(transform: Mat4, bounds: &Bounds, viewproj: Mat4) -> bool {
    let matrix = viewproj * transform;
    let clip: [Vec4; 8] = bounds.corners().map(|corner| matrix * corner.extend(1.0));

    let all_outside = |outside: fn(&Vec4) -> bool| clip.iter().all(outside);

    let culled = all_outside(|v| v.x > v.w)
        || all_outside(|v| v.x < -v.w)
        || all_outside(|v| v.y > v.w)
        || all_outside(|v| v.y < -v.w)
        || all_outside(|v| v.z < 0.0)
        || all_outside(|v| v.z > v.w);
    !culled
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::camera::Camera;

    fn viewproj() -> Mat4 {
        // 相机位于原点，看向 -Z
        Camera::default().view_proj(16.0 / 9.0)
    }

    fn unit_bounds() -> Bounds {
        Bounds::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    #[test]
    fn test_in_front_is_visible() {
        let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        assert!(is_visible(transform, &unit_bounds(), viewproj()));
    }

    #[test]
    fn test_behind_is_culled() {
        let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        assert!(!is_visible(transform, &unit_bounds(), viewproj()));
    }

    #[test]
    fn test_far_to_the_side_is_culled() {
        let transform = Mat4::from_translation(Vec3::new(100.0, 0.0, -5.0));
        assert!(!is_visible(transform, &unit_bounds(), viewproj()));
        let transform = Mat4::from_translation(Vec3::new(0.0, -100.0, -5.0));
        assert!(!is_visible(transform, &unit_bounds(), viewproj()));
    }

    #[test]
    fn test_straddling_is_visible() {
        // 横跨视锥左侧平面
        let transform = Mat4::from_translation(Vec3::new(-7.0, 0.0, -5.0)) * Mat4::from_scale(Vec3::splat(8.0));
        assert!(is_visible(transform, &unit_bounds(), viewproj()));

        // 包住相机的物体有角点在相机后方
        let transform = Mat4::from_scale(Vec3::splat(10.0));
        assert!(is_visible(transform, &unit_bounds(), viewproj()));
    }
}
