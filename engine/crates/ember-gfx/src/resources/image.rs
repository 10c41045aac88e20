use anyhow::Context;
use ash::vk;
use ash::vk::Handle;
use vk_mem::Alloc;

use crate::{
    commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer, command_buffer::color_layers},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 指定格式下每个像素需要的字节数，只覆盖引擎会上传的格式
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
        match format {
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R32_SFLOAT
            | vk::Format::D32_SFLOAT => Some(4),
            vk::Format::R16G16B16A16_SFLOAT => Some(8),
            vk::Format::R32G32B32A32_SFLOAT => Some(16),
            _ => None,
        }
    }

    /// 完整 mip chain 的层数：floor(log2(max(w, h))) + 1
    pub fn mip_level_count(extent: vk::Extent2D) -> u32 {
        let max_dim = extent.width.max(extent.height).max(1);
        u32::BITS - max_dim.leading_zeros()
    }

    #[inline]
    pub fn aspect_of(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// image 的 handle 视图，所有权仍然在 `GfxImage` 上
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxImageHandle {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
}
impl GfxImageHandle {
    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }
}

/// 由 vma 分配的 2D image，附带一个覆盖所有 mip 的默认 view
///
/// # Destroy
/// 需要手动调用 `destroy`，通常是把它交给 deletion queue
pub struct GfxImage {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,

    extent: vk::Extent3D,
    format: vk::Format,
    mip_levels: u32,

    name: String,
}
// new & init
impl GfxImage {
    pub fn new(gfx: &Gfx, image_info: &GfxImageCreateInfo, debug_name: &str) -> anyhow::Result<Self> {
        let allocator = gfx.allocator();
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };
        let (image, mut alloc) = unsafe {
            allocator
                .create_image(&image_info.inner, &alloc_info)
                .with_context(|| format!("failed to create image {debug_name}"))?
        };

        let format = image_info.inner.format;
        let mip_levels = image_info.inner.mip_levels;
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(VulkanFormatUtils::aspect_of(format))
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = match unsafe { gfx.device().create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(image, &mut alloc) };
                return Err(e).with_context(|| format!("failed to create image view {debug_name}"));
            }
        };

        let image = Self {
            handle: image,
            view,
            allocation: alloc,
            extent: image_info.inner.extent,
            format,
            mip_levels,
            name: debug_name.to_string(),
        };
        gfx.device().set_debug_name(&image, debug_name);
        gfx.device().set_object_debug_name(view, format!("GfxImageView::{debug_name}"));
        Ok(image)
    }

    /// 根据像素数据创建 image，mipmapped 时会通过 blit 生成完整的 mip chain
    ///
    /// 上传完成后 image 处于 SHADER_READ_ONLY_OPTIMAL
    pub fn from_pixels(
        gfx: &Gfx,
        data: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mipmapped: bool,
        name: &str,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("GfxImage::from_pixels");

        let pixel_size = VulkanFormatUtils::pixel_size_in_bytes(format)
            .with_context(|| format!("image {name}: unsupported upload format {format:?}"))?;
        let expected = pixel_size * extent.width as usize * extent.height as usize;
        anyhow::ensure!(data.len() == expected, "image {name}: expect {expected} bytes, got {}", data.len());

        let image_ci = GfxImageCreateInfo::new_image_2d_info(
            extent,
            format,
            usage | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
        )
        .mipmapped(mipmapped);
        let image = Self::new(gfx, &image_ci, name)?;

        let stage_buffer = match GfxBuffer::new_stage_buffer(gfx, data.len() as vk::DeviceSize, format!("{name}-stage")) {
            Ok(buffer) => buffer,
            Err(e) => {
                image.destroy(gfx);
                return Err(e);
            }
        };
        let result = stage_buffer
            .write_by_mmap(gfx, 0, data)
            .and_then(|_| gfx.immediate_submit(name, |cmd| image.record_upload(cmd, &stage_buffer)));
        stage_buffer.destroy(gfx);

        match result {
            Ok(()) => Ok(image),
            Err(e) => {
                image.destroy(gfx);
                Err(e)
            }
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn handle_view(&self) -> GfxImageHandle {
        GfxImageHandle {
            image: self.handle,
            view: self.view,
            extent: self.extent,
            format: self.format,
        }
    }
}
// tools
impl GfxImage {
    /// 1. 转换到 TRANSFER_DST
    /// 2. 将 stage buffer 拷贝到 mip 0
    /// 3. 生成 mip chain，或者直接转换到 SHADER_READ_ONLY
    fn record_upload(&self, cmd: &GfxCommandBuffer, stage_buffer: &GfxBuffer) {
        cmd.transition_image(self.handle, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let buffer_image_copy = vk::BufferImageCopy2::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_offset(vk::Offset3D::default())
            .image_extent(self.extent)
            .image_subresource(color_layers(0));
        cmd.cmd_copy_buffer_to_image(
            &vk::CopyBufferToImageInfo2::default()
                .src_buffer(stage_buffer.vk_buffer())
                .dst_image(self.handle)
                .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .regions(std::slice::from_ref(&buffer_image_copy)),
        );

        if self.mip_levels > 1 {
            self.record_generate_mipmaps(cmd);
        } else {
            cmd.transition_image(
                self.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
    }

    /// 要求所有 mip 都处于 TRANSFER_DST，结束时所有 mip 都处于 SHADER_READ_ONLY
    fn record_generate_mipmaps(&self, cmd: &GfxCommandBuffer) {
        let mut mip_size = self.extent_2d();
        for mip in 0..self.mip_levels {
            let half_size = vk::Extent2D {
                width: (mip_size.width / 2).max(1),
                height: (mip_size.height / 2).max(1),
            };

            let to_src = GfxImageBarrier::new()
                .image(self.handle)
                .mip_level(mip)
                .src_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_WRITE)
                .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
            cmd.image_memory_barrier(vk::DependencyFlags::empty(), std::slice::from_ref(&to_src));

            if mip + 1 < self.mip_levels {
                let blit_region = vk::ImageBlit2::default()
                    .src_offsets([
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: mip_size.width as i32,
                            y: mip_size.height as i32,
                            z: 1,
                        },
                    ])
                    .dst_offsets([
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: half_size.width as i32,
                            y: half_size.height as i32,
                            z: 1,
                        },
                    ])
                    .src_subresource(color_layers(mip))
                    .dst_subresource(color_layers(mip + 1));
                cmd.cmd_blit_image(
                    &vk::BlitImageInfo2::default()
                        .src_image(self.handle)
                        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .dst_image(self.handle)
                        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .filter(vk::Filter::LINEAR)
                        .regions(std::slice::from_ref(&blit_region)),
                );
                mip_size = half_size;
            }
        }

        cmd.transition_image(
            self.handle,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }
}
// destroy
impl GfxImage {
    pub fn destroy(mut self, gfx: &Gfx) {
        log::debug!("destroying image: {}", self.name);
        unsafe {
            gfx.device().destroy_image_view(self.view, None);
            gfx.allocator().destroy_image(self.handle, &mut self.allocation);
        }
        self.handle = vk::Image::null();
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage {} must be destroyed before drop", self.name);
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,
}
impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
        }
    }

    /// builder
    #[inline]
    pub fn mipmapped(mut self, mipmapped: bool) -> Self {
        self.inner.mip_levels = if mipmapped {
            VulkanFormatUtils::mip_level_count(vk::Extent2D {
                width: self.inner.extent.width,
                height: self.inner.extent.height,
            })
        } else {
            1
        };
        self
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.inner.mip_levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(VulkanFormatUtils::mip_level_count(vk::Extent2D { width: 1, height: 1 }), 1);
        assert_eq!(VulkanFormatUtils::mip_level_count(vk::Extent2D { width: 16, height: 16 }), 5);
        assert_eq!(VulkanFormatUtils::mip_level_count(vk::Extent2D { width: 1024, height: 300 }), 11);
        assert_eq!(VulkanFormatUtils::mip_level_count(vk::Extent2D { width: 17, height: 3 }), 5);
    }

    #[test]
    fn test_mipmapped_create_info() {
        let info = GfxImageCreateInfo::new_image_2d_info(
            vk::Extent2D { width: 256, height: 64 },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(info.mip_levels(), 1);
        assert_eq!(info.mipmapped(true).mip_levels(), 9);
    }

    #[test]
    fn test_pixel_size() {
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::BC7_SRGB_BLOCK), None);
    }
}
