use anyhow::Context;
use ash::vk;
use ash::vk::Handle;

use crate::{foundation::debug_messenger::DebugType, gfx::Gfx};

/// 窗口对应的 surface
///
/// # Destroy
/// 需要在 swapchain 销毁之后手动调用 `destroy`
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
}

impl GfxSurface {
    pub fn new(
        gfx: &Gfx,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let instance = gfx.instance().ash_instance();
        let surface_pf = ash::khr::surface::Instance::new(gfx.vk_entry(), instance);

        let surface = unsafe {
            ash_window::create_surface(gfx.vk_entry(), instance, raw_display_handle, raw_window_handle, None)
                .context("failed to create window surface")?
        };

        let physical_device = gfx.physical_device().vk_handle;
        let family_index = gfx.physical_device().gfx_queue_family.queue_family_index;
        let present_supported = unsafe {
            surface_pf
                .get_physical_device_surface_support(physical_device, family_index, surface)
                .context("failed to query surface support")?
        };
        if !present_supported {
            unsafe { surface_pf.destroy_surface(surface, None) };
            anyhow::bail!("gfx queue family {family_index} can not present to the window surface");
        }

        let surface = GfxSurface {
            handle: surface,
            pf: surface_pf,
            physical_device,
        };
        gfx.device().set_debug_name(&surface, "main");

        Ok(surface)
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn get_capabilities(&self) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.pf
                .get_physical_device_surface_capabilities(self.physical_device, self.handle)
                .context("failed to query surface capabilities")
        }
    }

    pub fn get_formats(&self) -> anyhow::Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.pf
                .get_physical_device_surface_formats(self.physical_device, self.handle)
                .context("failed to query surface formats")
        }
    }

    pub fn get_present_modes(&self) -> anyhow::Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.pf
                .get_physical_device_surface_present_modes(self.physical_device, self.handle)
                .context("failed to query surface present modes")
        }
    }
}

// destroy
impl GfxSurface {
    pub fn destroy(mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
        self.handle = vk::SurfaceKHR::null();
    }
}
impl Drop for GfxSurface {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxSurface must be destroyed before drop");
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
