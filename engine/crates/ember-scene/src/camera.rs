use glam::{Mat4, Vec3};

/// 只有 yaw 和 pitch 的自由相机
///
/// 没有旋转时看向 -Z，投影使用 reversed-Z：近处深度为 1，远处深度为 0
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,

    pub euler_yaw_deg: f32,
    pub euler_pitch_deg: f32,

    pub fov_y_deg: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            euler_yaw_deg: 0.0,
            euler_pitch_deg: 0.0,
            fov_y_deg: 70.0,
        }
    }
}

impl Camera {
    /// 相机的上参考向量
    const CAMERA_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    /// YXZ 表示 Y(yaw)-X(Pitch)-Z(Roll) 的旋转顺序
    const CAMERA_EULER: glam::EulerRot = glam::EulerRot::YXZ;

    /// 没有旋转的情况下，相机看向的是 -Z
    const CAMERA_FORWAED: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    const CAMERA_RIGHT: Vec3 = Vec3::new(1.0, 0.0, 0.0);

    const K_PITCH: f32 = 89.5;

    /// reversed-Z：near 与 far 互换传入
    const Z_NEAR: f32 = 10000.0;
    const Z_FAR: f32 = 0.1;

    #[inline]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    #[inline]
    fn rotation(&self) -> Mat4 {
        Mat4::from_euler(Self::CAMERA_EULER, self.euler_yaw_deg.to_radians(), self.euler_pitch_deg.to_radians(), 0.0)
    }

    pub fn camera_forward(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_FORWAED)
    }

    pub fn camera_right(&self) -> Vec3 {
        self.rotation().transform_vector3(Self::CAMERA_RIGHT)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.camera_forward(), Self::CAMERA_UP)
    }

    /// Vulkan 的 NDC y 轴朝下，这里翻转 y
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y_deg.to_radians(), aspect_ratio, Self::Z_NEAR, Self::Z_FAR);
        proj.y_axis.y *= -1.0;
        proj
    }

    #[inline]
    pub fn view_proj(&self, aspect_ratio: f32) -> Mat4 {
        self.projection_matrix(aspect_ratio) * self.view_matrix()
    }

    /// 朝相机看向的方向进行移动
    pub fn move_forward(&mut self, length: f32) {
        self.position += self.camera_forward() * length;
    }

    pub fn move_right(&mut self, length: f32) {
        self.position += self.camera_right() * length;
    }

    /// 朝世界的 Up 进行移动
    pub fn move_up(&mut self, length: f32) {
        self.position += Self::CAMERA_UP * length;
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        self.euler_yaw_deg = (self.euler_yaw_deg + angle).rem_euclid(360.0);
    }

    pub fn rotate_pitch(&mut self, angle: f32) {
        self.euler_pitch_deg = (self.euler_pitch_deg + angle).clamp(-Self::K_PITCH, Self::K_PITCH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_depth() {
        let camera = Camera::default();
        let viewproj = camera.view_proj(1.0);

        let near = viewproj.project_point3(Vec3::new(0.0, 0.0, -1.0));
        let far = viewproj.project_point3(Vec3::new(0.0, 0.0, -1000.0));
        assert!(near.z > far.z);
        assert!((0.0..=1.0).contains(&near.z));
        assert!((0.0..=1.0).contains(&far.z));
    }

    #[test]
    fn test_y_is_flipped() {
        let viewproj = Camera::default().view_proj(1.0);
        let up = viewproj.project_point3(Vec3::new(0.0, 1.0, -5.0));
        assert!(up.y < 0.0);
    }

    #[test]
    fn test_rotation_limits() {
        let mut camera = Camera::default();
        camera.rotate_pitch(200.0);
        assert_eq!(camera.euler_pitch_deg, 89.5);
        camera.rotate_yaw(-90.0);
        assert_eq!(camera.euler_yaw_deg, 270.0);

        // yaw 270 度之后看向 +X
        let forward = Camera {
            euler_yaw_deg: 270.0,
            ..Default::default()
        }
        .camera_forward();
        assert!((forward - Vec3::X).length() < 1e-5);
    }
}
