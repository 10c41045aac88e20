use std::collections::HashSet;

use winit::keyboard::KeyCode;

/// 当前帧的输入状态
///
/// 按键与鼠标按钮保持到松开为止，鼠标位移在每帧结束时清零
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    right_button_pressed: bool,
    mouse_delta: [f64; 2],
}

// update
impl InputState {
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.pressed_keys.insert(key);
        } else {
            self.pressed_keys.remove(&key);
        }
    }

    #[inline]
    pub fn set_right_button(&mut self, pressed: bool) {
        self.right_button_pressed = pressed;
    }

    #[inline]
    pub fn add_mouse_delta(&mut self, dx: f64, dy: f64) {
        self.mouse_delta[0] += dx;
        self.mouse_delta[1] += dy;
    }

    #[inline]
    pub fn end_frame(&mut self) {
        self.mouse_delta = [0.0, 0.0];
    }

    /// 窗口失去焦点时收不到松开事件
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.right_button_pressed = false;
        self.mouse_delta = [0.0, 0.0];
    }
}
// getters
impl InputState {
    #[inline]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    #[inline]
    pub fn is_right_button_pressed(&self) -> bool {
        self.right_button_pressed
    }

    #[inline]
    pub fn mouse_delta(&self) -> [f64; 2] {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyW, true);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        input.set_key(KeyCode::KeyW, false);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_mouse_delta_resets_each_frame() {
        let mut input = InputState::default();
        input.add_mouse_delta(3.0, -1.0);
        input.add_mouse_delta(1.0, -1.0);
        assert_eq!(input.mouse_delta(), [4.0, -2.0]);
        input.end_frame();
        assert_eq!(input.mouse_delta(), [0.0, 0.0]);
    }
}
