use ember_scene::camera::Camera;
use winit::keyboard::KeyCode;

use crate::input_state::InputState;

/// WASD 水平移动，E/Q 上下移动，按住鼠标右键拖动旋转
pub struct CameraController {
    /// 每秒移动的距离
    pub move_speed: f32,
    /// 鼠标移动多少像素旋转 1 度
    pub mouse_sensitivity: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            move_speed: 320.0,
            mouse_sensitivity: 7.0,
        }
    }
}

impl CameraController {
    /// 根据输入更新相机状态
    pub fn update(&self, input_state: &InputState, camera: &mut Camera, delta_time_s: f32) {
        if input_state.is_right_button_pressed() {
            let mouse_delta = input_state.mouse_delta();
            camera.rotate_yaw(-mouse_delta[0] as f32 / self.mouse_sensitivity);
            camera.rotate_pitch(-mouse_delta[1] as f32 / self.mouse_sensitivity);
        }

        let distance = delta_time_s * self.move_speed;
        let axis = |positive: KeyCode, negative: KeyCode| {
            input_state.is_key_pressed(positive) as i32 - input_state.is_key_pressed(negative) as i32
        };

        let forward = axis(KeyCode::KeyW, KeyCode::KeyS);
        let right = axis(KeyCode::KeyD, KeyCode::KeyA);
        let up = axis(KeyCode::KeyE, KeyCode::KeyQ);
        if forward != 0 {
            camera.move_forward(forward as f32 * distance);
        }
        if right != 0 {
            camera.move_right(right as f32 * distance);
        }
        if up != 0 {
            camera.move_up(up as f32 * distance);
        }
    }
}

#[cfg(test)]
mod tests {
    use ember_scene::camera::Camera;

    use super::*;

    #[test]
    fn test_forward_moves_towards_neg_z() {
        let controller = CameraController {
            move_speed: 10.0,
            ..Default::default()
        };
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyW, true);

        let mut camera = Camera::default();
        controller.update(&input, &mut camera, 0.5);
        assert!((camera.position.z + 5.0).abs() < 1e-5);
        assert!(camera.position.x.abs() < 1e-5);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let controller = CameraController::default();
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyA, true);
        input.set_key(KeyCode::KeyD, true);

        let mut camera = Camera::default();
        controller.update(&input, &mut camera, 1.0);
        assert_eq!(camera.position, glam::Vec3::ZERO);
    }

    #[test]
    fn test_rotation_needs_right_button() {
        let controller = CameraController::default();
        let mut input = InputState::default();
        input.add_mouse_delta(70.0, 0.0);

        let mut camera = Camera::default();
        controller.update(&input, &mut camera, 0.0);
        assert_eq!(camera.euler_yaw_deg, 0.0);

        input.set_right_button(true);
        controller.update(&input, &mut camera, 0.0);
        assert!((camera.euler_yaw_deg - 350.0).abs() < 1e-4);
    }
}
