use std::{ffi::CStr, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, command_queue::GfxCommandQueue, immediate::GfxImmediateSubmit},
    foundation::{
        debug_messenger::GfxDebugMsger, device::GfxDevice, instance::GfxInstance, mem_allocator::GfxMemAllocator,
        physical_device::GfxPhysicalDevice,
    },
};

/// Vulkan 图形上下文
///
/// 管理实例、设备、队列、内存分配器以及 immediate submit 所需的命令对象。
/// 由引擎创建并持有，以 `&Gfx` 的形式显式传给每个需要访问 GPU 的入口。
///
/// ```ignore
/// let gfx = Gfx::new("scene-viewer", &extra_exts, true)?;
/// let buffer = GfxBuffer::new(&gfx, size, usage, false, "vertex")?;
/// buffer.destroy(&gfx);
/// gfx.destroy();
/// ```
pub struct Gfx {
    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    vk_entry: ash::Entry,

    instance: GfxInstance,
    debug_msger: GfxDebugMsger,
    physical_device: GfxPhysicalDevice,

    /// 命令缓冲与队列需要频繁调用设备函数，通过 Rc 共享函数指针集合
    device: Rc<GfxDevice>,
    allocator: GfxMemAllocator,

    gfx_queue: GfxCommandQueue,

    immediate: GfxImmediateSubmit,
}

// new & init
impl Gfx {
    const ENGINE_NAME: &'static str = "Ember";

    pub fn new(
        app_name: &str,
        instance_extra_exts: &[&'static CStr],
        enable_validation: bool,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Gfx::new");

        let vk_entry = unsafe { ash::Entry::load().context("failed to load vulkan entry")? };
        let instance =
            GfxInstance::new(&vk_entry, app_name, Self::ENGINE_NAME, instance_extra_exts, enable_validation)?;
        let debug_msger = GfxDebugMsger::new(&vk_entry, instance.ash_instance())?;
        let physical_device = GfxPhysicalDevice::new_descrete_physical_device(instance.ash_instance())?;

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(physical_device.gfx_queue_family.queue_family_index)
            .queue_priorities(&queue_priorities)];
        let device =
            Rc::new(GfxDevice::new(instance.ash_instance(), physical_device.vk_handle, &queue_create_infos)?);

        let gfx_queue = GfxCommandQueue::new(device.clone(), physical_device.gfx_queue_family.clone(), 0);
        log::info!("gfx queue's queue family:\n{:#?}", gfx_queue.queue_family());

        let allocator = GfxMemAllocator::new(instance.ash_instance(), physical_device.vk_handle, &device)?;
        let immediate = GfxImmediateSubmit::new(device.clone(), &physical_device.gfx_queue_family)?;

        device.set_object_debug_name(instance.vk_instance(), "GfxInstance");
        device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
        device.set_object_debug_name(device.vk_handle(), "GfxDevice");
        device.set_object_debug_name(gfx_queue.handle(), "GfxQueue-gfx");

        Ok(Self {
            vk_entry,
            instance,
            debug_msger,
            physical_device,
            device,
            allocator,
            gfx_queue,
            immediate,
        })
    }
}
// getters
impl Gfx {
    #[inline]
    pub fn vk_entry(&self) -> &ash::Entry {
        &self.vk_entry
    }

    #[inline]
    pub fn instance(&self) -> &GfxInstance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn device(&self) -> &GfxDevice {
        &self.device
    }

    /// 需要长期持有设备函数的对象（命令缓冲、队列）通过这个获取
    #[inline]
    pub fn device_rc(&self) -> Rc<GfxDevice> {
        self.device.clone()
    }

    #[inline]
    pub fn allocator(&self) -> &GfxMemAllocator {
        &self.allocator
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxCommandQueue {
        &self.gfx_queue
    }

    /// 当 uniform buffer 的 descriptor 在更新时，其 offset 必须是这个值的整数倍
    ///
    /// 注：这个值一定是 power of 2
    #[inline]
    pub fn min_ubo_offset_align(&self) -> vk::DeviceSize {
        self.physical_device.basic_props.limits.min_uniform_buffer_offset_alignment
    }
}
// tools
impl Gfx {
    /// 根据给定的格式，返回支持的格式，顺序与 candidates 一致
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Vec<vk::Format> {
        candidates
            .iter()
            .filter(|f| {
                let props = unsafe {
                    self.instance
                        .ash_instance()
                        .get_physical_device_format_properties(self.physical_device.vk_handle, **f)
                };
                format_supports(&props, tiling, features)
            })
            .copied()
            .collect()
    }

    /// 立即执行某个 command，并同步等待执行结果
    ///
    /// 闭包里不能再嵌套调用 immediate_submit，两者共享同一个 command buffer
    pub fn immediate_submit<F, R>(&self, name: &str, func: F) -> anyhow::Result<R>
    where
        F: FnOnce(&GfxCommandBuffer) -> R,
    {
        self.immediate.submit(&self.gfx_queue, name, func)
    }

    #[inline]
    pub fn wait_idle(&self) -> anyhow::Result<()> {
        self.device.wait_idle()
    }
}
/// 只认 LINEAR 与 OPTIMAL 两种 tiling
fn format_supports(props: &vk::FormatProperties, tiling: vk::ImageTiling, features: vk::FormatFeatureFlags) -> bool {
    match tiling {
        vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
        vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
        _ => false,
    }
}

// destroy
impl Gfx {
    /// 调用前需要确保所有 GPU 资源已经释放，并且 device 处于 idle
    pub fn destroy(self) {
        log::info!("destroying gfx context");
        self.immediate.destroy();
        self.allocator.destroy();
        self.device.destroy();
        self.debug_msger.destroy();
        self.instance.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_supports_checks_tiling() {
        let props = vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        };
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert!(format_supports(&props, vk::ImageTiling::OPTIMAL, depth));
        assert!(!format_supports(&props, vk::ImageTiling::LINEAR, depth));
        assert!(!format_supports(
            &props,
            vk::ImageTiling::OPTIMAL,
            depth | vk::FormatFeatureFlags::COLOR_ATTACHMENT
        ));
        assert!(!format_supports(&props, vk::ImageTiling::DRM_FORMAT_MODIFIER_EXT, depth));
    }
}
