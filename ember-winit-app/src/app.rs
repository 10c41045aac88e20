use std::{ffi::CStr, time::Duration};

use anyhow::Context;
use ash::vk;
use ember_crate_tools::init_log::init_log;
use ember_renderer::{engine::Engine, settings::EngineConfig};
use itertools::Itertools;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{camera_controller::CameraController, input_state::InputState};

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

pub struct WinitApp {
    config: EngineConfig,

    engine: Option<Engine>,
    window: Option<Window>,

    camera_controller: CameraController,
    input_state: InputState,

    /// 窗口尺寸变化之后，在下一次绘制前重建 swapchain
    pending_resize: bool,
    /// 初始化或者渲染时发生的致命错误，事件循环退出后返回给调用者
    fatal_error: Option<anyhow::Error>,
}
// 总的 main 函数
impl WinitApp {
    pub fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();

        tracy_client::Client::start();
        tracy_client::set_thread_name!("MainThread");
    }

    /// 阻塞直到窗口关闭或者发生致命错误
    pub fn run(config: EngineConfig) -> anyhow::Result<()> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = Self {
            config,
            engine: None,
            window: None,
            camera_controller: CameraController::default(),
            input_state: InputState::default(),
            pending_resize: false,
            fatal_error: None,
        };
        event_loop.run_app(&mut app).context("event loop terminated with error")?;

        log::info!("end run.");
        app.destroy()
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Engine
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attr = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.window_width, self.config.window_height));
        let window = event_loop.create_window(window_attr).context("failed to create window")?;

        let raw_display_handle = window.display_handle()?.as_raw();
        let raw_window_handle = window.window_handle()?.as_raw();

        // 追加 window system 需要的 extension，在 windows 下也就是 khr::Surface
        let extra_instance_exts = ash_window::enumerate_required_extensions(raw_display_handle)?
            .iter()
            .map(|&ext| -> &'static CStr { unsafe { CStr::from_ptr(ext) } })
            .collect_vec();

        let size = window.inner_size();
        let window_extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let engine =
            Engine::init(&self.config, raw_display_handle, raw_window_handle, window_extent, &extra_instance_exts)?;

        self.engine = Some(engine);
        self.window = Some(window);
        Ok(())
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.take() {
            engine.cleanup();
        }
        self.window = None;

        match self.fatal_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn exit_with_error(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.fatal_error.get_or_insert(error);
        event_loop.exit();
    }
}
// update
impl WinitApp {
    const TITLE_REFRESH_FRAMES: u64 = 60;
    const MINIMIZED_SLEEP: Duration = Duration::from_millis(100);

    fn update_frame(&mut self, event_loop: &ActiveEventLoop) {
        let _span = tracy_client::span!("WinitApp::update_frame");
        let (Some(window), Some(engine)) = (self.window.as_ref(), self.engine.as_mut()) else {
            return;
        };

        if engine.stop_rendering {
            std::thread::sleep(Self::MINIMIZED_SLEEP);
            return;
        }

        if self.pending_resize || engine.resize_requested() {
            let size = window.inner_size();
            if size.width == 0 || size.height == 0 {
                return;
            }
            if let Err(e) = engine.resize_swapchain(vk::Extent2D {
                width: size.width,
                height: size.height,
            }) {
                self.exit_with_error(event_loop, e);
                return;
            }
            self.pending_resize = false;
        }

        let delta_time_s = engine.stats().frame_time_ms / 1000.0;
        self.camera_controller.update(&self.input_state, &mut engine.camera, delta_time_s);
        self.input_state.end_frame();

        if let Err(e) = engine.draw() {
            self.exit_with_error(event_loop, e);
            return;
        }

        if engine.frame_counter().frame_number() % Self::TITLE_REFRESH_FRAMES == 0 {
            let stats = engine.stats();
            window.set_title(&format!(
                "{} | {:.2} ms | scene {:.2} ms | draw {:.2} ms | {} tris | {} draws",
                self.config.title,
                stats.frame_time_ms,
                stats.scene_update_time_ms,
                stats.mesh_draw_time_ms,
                stats.triangle_count,
                stats.drawcall_count
            ));
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode, pressed: bool) {
        self.input_state.set_key(key, pressed);
        if !pressed {
            return;
        }

        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::Digit1 | KeyCode::Digit2 => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_background_effect(if key == KeyCode::Digit1 { 0 } else { 1 });
                }
            }
            _ => {}
        }
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    // 建议在这里创建 window 和 Engine
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("winit event: resumed");

        if let Err(e) = self.init_after_window(event_loop) {
            self.exit_with_error(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.stop_rendering = size.width == 0 || size.height == 0;
                }
                self.pending_resize = true;
            }
            WindowEvent::Occluded(occluded) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.stop_rendering = occluded;
                }
            }
            WindowEvent::Focused(false) => {
                self.input_state.clear();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.handle_key(event_loop, key, event.state.is_pressed());
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.input_state.set_right_button(state.is_pressed());
            }
            WindowEvent::RedrawRequested => {
                self.update_frame(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input_state.add_mouse_delta(delta.0, delta.1);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }
}
