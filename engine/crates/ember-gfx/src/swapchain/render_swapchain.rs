use anyhow::Context;
use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore},
    gfx::Gfx,
    swapchain::surface::GfxSurface,
};

/// 交换链以及每个 image 的 view
///
/// surface 由外部持有，resize 时只需要重建交换链
pub struct GfxRenderSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    swapchain_image_index: usize,

    color_format: vk::Format,
    swapchain_extent: vk::Extent2D,
}

// new & init
impl GfxRenderSwapchain {
    pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    pub fn new(
        gfx: &Gfx,
        surface: &GfxSurface,
        present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxRenderSwapchain::new");

        let surface_capabilities = surface.get_capabilities()?;
        let surface_format = Self::choose_surface_format(&surface.get_formats()?)
            .context("surface reports no supported format")?;
        let present_mode = Self::choose_present_mode(&surface.get_present_modes()?, present_mode);

        // 确定 window 的 extent 尺寸
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}, format: {:?}, present mode: {:?}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(Self::choose_image_count(&surface_capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // 画面由 draw image blit 而来，overlay 直接作为 color attachment 绘制
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let device = gfx.device();
        let swapchain_handle = unsafe {
            device.swapchain().create_swapchain(&create_info, None).context("failed to create swapchain")?
        };
        device.set_object_debug_name(swapchain_handle, "GfxSwapchain::main");

        let mut swapchain = Self {
            swapchain_handle,
            swapchain_images: vec![],
            swapchain_image_views: vec![],
            swapchain_image_index: 0,
            swapchain_extent: extent,
            color_format: surface_format.format,
        };
        // 后续步骤失败时，已经创建的对象需要释放
        if let Err(e) = swapchain.create_image_views(gfx) {
            swapchain.destroy(gfx);
            return Err(e);
        }
        Ok(swapchain)
    }

    fn create_image_views(&mut self, gfx: &Gfx) -> anyhow::Result<()> {
        let device = gfx.device();
        self.swapchain_images = unsafe {
            device.swapchain().get_swapchain_images(self.swapchain_handle).context("failed to get swapchain images")?
        };
        for (idx, &image) in self.swapchain_images.iter().enumerate() {
            let view_ci = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.color_format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            let view = unsafe {
                device.create_image_view(&view_ci, None).context("failed to create swapchain image view")?
            };
            device.set_object_debug_name(image, format!("GfxSwapchainImage::{idx}"));
            device.set_object_debug_name(view, format!("GfxSwapchainImageView::{idx}"));
            self.swapchain_image_views.push(view);
        }
        Ok(())
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn current_image(&self) -> vk::Image {
        self.swapchain_images[self.swapchain_image_index]
    }

    #[inline]
    pub fn current_image_view(&self) -> vk::ImageView {
        self.swapchain_image_views[self.swapchain_image_index]
    }
}

// tools
impl GfxRenderSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn choose_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }

    pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
        formats
            .iter()
            .find(|f| {
                f.format == Self::PREFERRED_FORMAT.format && f.color_space == Self::PREFERRED_FORMAT.color_space
            })
            .or_else(|| formats.first())
            .copied()
    }

    /// FIFO 是规范要求必须支持的模式
    pub fn choose_present_mode(
        available: &[vk::PresentModeKHR],
        requested: vk::PresentModeKHR,
    ) -> vk::PresentModeKHR {
        if available.contains(&requested) {
            requested
        } else {
            log::warn!("present mode {:?} is not supported, fallback to FIFO", requested);
            vk::PresentModeKHR::FIFO
        }
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    /// return: need recreate
    pub fn acquire_next_image(&mut self, gfx: &Gfx, semaphore: &GfxSemaphore, timeout: u64) -> anyhow::Result<bool> {
        let result = unsafe {
            gfx.device().swapchain().acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.swapchain_image_index = image_index as usize;
                Ok(is_suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(true)
            }
            Err(e) => Err(e).context("failed to acquire next swapchain image"),
        }
    }

    /// return: need recreate
    pub fn present_image(
        &self,
        gfx: &Gfx,
        queue: &GfxCommandQueue,
        wait_semaphores: &[&GfxSemaphore],
    ) -> anyhow::Result<bool> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [self.swapchain_image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { gfx.device().swapchain().queue_present(queue.handle(), &present_info) };
        match result {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", self.swapchain_image_index);
                }
                Ok(is_suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                Ok(true)
            }
            Err(e) => Err(e).context("failed to present swapchain image"),
        }
    }
}

// destroy
impl GfxRenderSwapchain {
    pub fn destroy(mut self, gfx: &Gfx) {
        log::info!("destroying swapchain");
        let device = gfx.device();
        unsafe {
            for view in self.swapchain_image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            device.swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
        self.swapchain_handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.swapchain_handle.is_null(), "GfxRenderSwapchain must be destroyed before drop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: vk::Extent2D, min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface_or_window() {
        let fixed = caps(vk::Extent2D { width: 800, height: 600 }, 2, 3);
        let window = vk::Extent2D {
            width: 1700,
            height: 900,
        };
        assert_eq!(GfxRenderSwapchain::calculate_swapchain_extent(&fixed, window), fixed.current_extent);

        let free = caps(
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            2,
            3,
        );
        assert_eq!(GfxRenderSwapchain::calculate_swapchain_extent(&free, window), window);

        let huge = vk::Extent2D {
            width: 9000,
            height: 10,
        };
        assert_eq!(
            GfxRenderSwapchain::calculate_swapchain_extent(&free, huge),
            vk::Extent2D {
                width: 4096,
                height: 10
            }
        );
    }

    #[test]
    fn test_image_count() {
        let extent = vk::Extent2D { width: 1, height: 1 };
        assert_eq!(GfxRenderSwapchain::choose_image_count(&caps(extent, 2, 0)), 3);
        assert_eq!(GfxRenderSwapchain::choose_image_count(&caps(extent, 2, 2)), 2);
    }

    #[test]
    fn test_surface_format_and_present_mode_fallback() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = |formats: &[vk::SurfaceFormatKHR]| GfxRenderSwapchain::choose_surface_format(formats).map(|f| f.format);
        assert_eq!(chosen(&[srgb]), Some(vk::Format::R8G8B8A8_SRGB));
        assert_eq!(chosen(&[srgb, GfxRenderSwapchain::PREFERRED_FORMAT]), Some(vk::Format::B8G8R8A8_UNORM));
        assert_eq!(chosen(&[]), None);

        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }
}
